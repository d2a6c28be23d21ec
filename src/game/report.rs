//! Match Reports
//!
//! The record handed to result sinks once a match reaches game over.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::config::MatchType;
use crate::game::round::RoundSummary;
use crate::game::state::{MatchOutcome, MatchState, PlayerId};

/// One participant's line in a report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerReport {
    /// Participant.
    pub player_id: PlayerId,
    /// Display name at match time.
    pub display_name: String,
    /// Final score.
    pub score: u32,
}

/// Final record of a match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchReport {
    /// Session identifier (UUID string).
    pub session_id: String,
    /// Match type played.
    pub match_type: MatchType,
    /// Participants in seat order.
    pub players: Vec<PlayerReport>,
    /// Sealed rounds.
    pub rounds: Vec<RoundSummary>,
    /// Round that was interrupted by abandonment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unfinished_round: Option<RoundSummary>,
    /// Winner, tie, abandonment or abort.
    pub outcome: MatchOutcome,
    /// When the match started.
    pub started_at: DateTime<Utc>,
    /// When the match ended.
    pub ended_at: DateTime<Utc>,
}

impl MatchReport {
    /// Build a report from a finished match. `None` while the match is live.
    pub fn from_state(
        session_id: &str,
        state: &MatchState,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Option<Self> {
        let outcome = state.outcome()?.clone();

        Some(Self {
            session_id: session_id.to_string(),
            match_type: state.config().match_type,
            players: state.players().iter()
                .map(|p| PlayerReport {
                    player_id: p.id,
                    display_name: p.display_name.clone(),
                    score: p.score,
                })
                .collect(),
            rounds: state.history().iter().map(|r| r.summary()).collect(),
            unfinished_round: state.current_round().map(|r| r.summary()),
            outcome,
            started_at,
            ended_at,
        })
    }

    /// Winning participant, if any.
    pub fn winner(&self) -> Option<PlayerId> {
        self.outcome.winner()
    }

    /// Match duration in whole seconds.
    pub fn duration_secs(&self) -> i64 {
        (self.ended_at - self.started_at).num_seconds()
    }

    /// Serialize as a single JSON line.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
