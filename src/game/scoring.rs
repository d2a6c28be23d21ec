//! Scoring Engine
//!
//! Pure functions from (question, choice) to correctness and from
//! correctness to points. Timeouts are a `None` choice.

use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::game::question::Question;

/// Points awarded for a correct answer unless configured otherwise.
pub const DEFAULT_BASE_POINTS: u32 = 10;

/// How answers turn into points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Points for a correct answer.
    pub base_points: u32,
    /// Maximum speed bonus for an instant correct answer.
    ///
    /// Scales linearly down to zero at the time limit. `None` disables it.
    pub speed_bonus: Option<u32>,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            base_points: DEFAULT_BASE_POINTS,
            speed_bonus: None,
        }
    }
}

impl ScoringPolicy {
    /// Points for a resolution.
    ///
    /// Incorrect answers and timeouts always score zero.
    pub fn points(&self, correct: bool, elapsed: Duration, limit: Duration) -> u32 {
        if !correct {
            return 0;
        }
        self.base_points + self.bonus(elapsed, limit)
    }

    /// Speed bonus for a correct answer after `elapsed` of `limit`.
    pub fn bonus(&self, elapsed: Duration, limit: Duration) -> u32 {
        let max_bonus = match self.speed_bonus {
            Some(max) => max as u128,
            None => return 0,
        };
        let limit_ms = limit.as_millis();
        if limit_ms == 0 {
            return 0;
        }
        let remaining_ms = limit_ms.saturating_sub(elapsed.as_millis());
        (max_bonus * remaining_ms / limit_ms) as u32
    }
}

/// Whether a choice answers the question correctly. `None` is a timeout.
#[inline]
pub fn is_correct(question: &Question, choice: Option<u8>) -> bool {
    choice == Some(question.correct_index)
}
