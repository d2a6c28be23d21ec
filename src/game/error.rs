//! Game Errors
//!
//! Rejections produced by the match state machine and the content loader.

use thiserror::Error;

use crate::game::catalog::CategoryId;
use crate::game::state::{MatchPhase, PlayerId};

/// Errors returned by match operations.
///
/// Every variant leaves the match state unchanged, except the two
/// content-exhaustion variants, which end the match as aborted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// The action is not accepted in the current phase.
    #[error("cannot {action} during {phase:?}")]
    InvalidStateTransition {
        /// Action that was attempted.
        action: &'static str,
        /// Phase the match was in.
        phase: MatchPhase,
    },

    /// The question was already resolved for this participant.
    #[error("question already answered")]
    AlreadyAnswered,

    /// The catalog cannot supply the requested offer.
    #[error("need {requested} categories, catalog has {available}")]
    InsufficientCategories {
        /// Categories requested.
        requested: usize,
        /// Categories in the catalog.
        available: usize,
    },

    /// The bank ran out of unissued questions for a category.
    #[error("need {requested} questions in category {category}, {available} left")]
    InsufficientQuestions {
        /// Category drawn from.
        category: CategoryId,
        /// Questions requested.
        requested: usize,
        /// Unissued questions left for this match.
        available: usize,
    },

    /// A participant left the match.
    #[error("participant {0} abandoned the match")]
    ParticipantAbandoned(PlayerId),

    /// The player is not seated in this match.
    #[error("player is not a participant in this match")]
    NotParticipant,

    /// Only the round's chooser may pick the category.
    #[error("player is not the chooser for this round")]
    NotChooser,

    /// The category was not part of this round's offer.
    #[error("category {0} was not offered this round")]
    CategoryNotOffered(CategoryId),

    /// Choice index outside the question's choices.
    #[error("choice {choice} out of range for {choices} choices")]
    InvalidChoice {
        /// Submitted index.
        choice: u8,
        /// Number of choices on the question.
        choices: usize,
    },
}

/// Errors raised while loading trivia content.
#[derive(Debug, Error)]
pub enum ContentError {
    /// Reading a content file failed.
    #[error("failed to read content: {0}")]
    Io(#[from] std::io::Error),

    /// Content file is not valid JSON in the expected layout.
    #[error("malformed content: {0}")]
    Json(#[from] serde_json::Error),

    /// A question failed validation.
    #[error("invalid question {id}: {reason}")]
    InvalidQuestion {
        /// Question identifier.
        id: u32,
        /// What was wrong with it.
        reason: String,
    },

    /// A question references a category the catalog does not know.
    #[error("unknown category {0}")]
    UnknownCategory(CategoryId),
}
