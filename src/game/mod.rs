//! Game Logic Module
//!
//! The match rules. 100% deterministic: no I/O, no wall clock.
//!
//! ## Module Structure
//!
//! - `catalog`: Selectable categories and offer sampling
//! - `question`: Question bank, per-match deck, content loading
//! - `scoring`: Correctness and points
//! - `round`: Per-round resolutions and sealing
//! - `config`: Match types and per-match settings
//! - `state`: Match state machine
//! - `events`: Events emitted by transitions
//! - `report`: Game-over report

pub mod catalog;
pub mod question;
pub mod scoring;
pub mod round;
pub mod config;
pub mod state;
pub mod events;
pub mod report;
pub mod error;

// Re-export key types
pub use catalog::{Category, CategoryCatalog, CategoryId};
pub use question::{Question, QuestionBank, QuestionDeck, QuestionView, TriviaContent};
pub use scoring::ScoringPolicy;
pub use round::{Round, RoundOutcome, RoundSummary};
pub use config::{ChooserPolicy, MatchConfig, MatchType};
pub use state::{
    MatchState, MatchPhase, MatchOutcome, Player, PlayerId, PlayerScore, QuestionKey, Seat,
    AnswerOutcome, ExpiryOutcome, Progress,
};
pub use events::{GameEvent, GameEventData};
pub use report::MatchReport;
pub use error::{MatchError, ContentError};
