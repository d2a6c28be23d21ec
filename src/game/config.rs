//! Match Configuration
//!
//! Per-match knobs: length, round size, timer, chooser rotation and scoring.

use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::game::scoring::ScoringPolicy;
use crate::game::state::Seat;

/// Categories offered to the chooser each round.
pub const DEFAULT_OFFER_COUNT: usize = 3;

/// Match length presets. Participants are only paired with the same type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// 3 rounds of 3 questions, 15 s each.
    Quick,
    /// 5 rounds of 3 questions, 20 s each.
    #[default]
    Standard,
    /// 5 rounds of 10 questions, 30 s each.
    Marathon,
}

impl MatchType {
    /// All match types.
    pub const ALL: [MatchType; 3] = [MatchType::Quick, MatchType::Standard, MatchType::Marathon];

    /// Configuration for this match type.
    pub fn config(self) -> MatchConfig {
        let (total_rounds, round_size, secs) = match self {
            MatchType::Quick => (3, 3, 15),
            MatchType::Standard => (5, 3, 20),
            MatchType::Marathon => (5, 10, 30),
        };
        MatchConfig {
            match_type: self,
            total_rounds,
            round_size,
            offer_count: DEFAULT_OFFER_COUNT,
            question_time: Duration::from_secs(secs),
            chooser: ChooserPolicy::Alternating,
            scoring: ScoringPolicy::default(),
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            MatchType::Quick => "quick",
            MatchType::Standard => "standard",
            MatchType::Marathon => "marathon",
        }
    }
}

/// Who picks the category each round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChooserPolicy {
    /// Round 1 goes to the first-queued participant, then the role alternates.
    #[default]
    Alternating,
    /// The same seat chooses every round.
    Fixed(Seat),
}

impl ChooserPolicy {
    /// Seat that chooses in round `round` (1-based).
    pub fn chooser_for(self, round: u32) -> Seat {
        match self {
            ChooserPolicy::Alternating if round % 2 == 0 => Seat::Second,
            ChooserPolicy::Alternating => Seat::First,
            ChooserPolicy::Fixed(seat) => seat,
        }
    }
}

/// Match configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Preset this configuration came from.
    pub match_type: MatchType,
    /// Rounds per match.
    pub total_rounds: u32,
    /// Questions per round.
    pub round_size: usize,
    /// Categories offered per round.
    pub offer_count: usize,
    /// Time limit per question.
    pub question_time: Duration,
    /// Chooser rotation.
    pub chooser: ChooserPolicy,
    /// Points per answer.
    pub scoring: ScoringPolicy,
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchType::Standard.config()
    }
}
