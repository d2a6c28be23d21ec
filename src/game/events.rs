//! Game Events
//!
//! Events generated by match transitions. The host drains them after each
//! operation and turns them into wire messages and log lines.

use serde::{Serialize, Deserialize};

use crate::game::catalog::Category;
use crate::game::config::MatchType;
use crate::game::question::QuestionView;
use crate::game::round::RoundSummary;
use crate::game::state::{MatchOutcome, PlayerId, PlayerScore, QuestionKey};

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEventData {
    /// Match left matchmaking.
    MatchStarted {
        players: [PlayerId; 2],
        match_type: MatchType,
    },

    /// A round's category offer was drawn.
    CategoriesOffered {
        round: u32,
        chooser: PlayerId,
        categories: Vec<Category>,
    },

    /// The chooser picked a category.
    CategoryChosen {
        round: u32,
        chooser: PlayerId,
        category: Category,
    },

    /// A question became pending.
    QuestionIssued {
        key: QuestionKey,
        question: QuestionView,
        time_limit_ms: u64,
    },

    /// One participant's question was resolved.
    AnswerResolved {
        key: QuestionKey,
        player_id: PlayerId,
        correct: bool,
        points: u32,
        timed_out: bool,
        score: u32,
    },

    /// Both participants resolved the question; the answer may be revealed.
    QuestionResolved {
        key: QuestionKey,
        correct_index: u8,
    },

    /// Round sealed.
    RoundSealed {
        summary: RoundSummary,
        scores: Vec<PlayerScore>,
    },

    /// Match reached game over.
    MatchEnded {
        outcome: MatchOutcome,
        scores: Vec<PlayerScore>,
    },
}

/// A game event with its position in the match's event stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Monotonic sequence number within the match
    pub sequence: u32,

    /// Player involved, if any
    pub player_id: Option<PlayerId>,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(sequence: u32, data: GameEventData) -> Self {
        let player_id = match &data {
            GameEventData::CategoriesOffered { chooser, .. } => Some(*chooser),
            GameEventData::CategoryChosen { chooser, .. } => Some(*chooser),
            GameEventData::AnswerResolved { player_id, .. } => Some(*player_id),
            GameEventData::MatchEnded { outcome, .. } => outcome.winner(),
            _ => None,
        };

        Self {
            sequence,
            player_id,
            data,
        }
    }

    /// Whether this event ends the match.
    pub fn is_terminal(&self) -> bool {
        matches!(self.data, GameEventData::MatchEnded { .. })
    }
}
