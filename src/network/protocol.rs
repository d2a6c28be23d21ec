//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are serialized as JSON for debugging ease. Answer
//! submissions may also arrive as binary (bincode) frames.

use serde::{Serialize, Deserialize};

use crate::game::catalog::{Category, CategoryId};
use crate::game::config::MatchType;
use crate::game::error::MatchError;
use crate::game::question::QuestionView;
use crate::game::round::RoundSummary;
use crate::game::state::{MatchOutcome, PlayerId, PlayerScore, QuestionKey};
use crate::network::arbiter::ArbiterError;
use crate::network::session::SessionSnapshot;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with the server.
    Auth(AuthRequest),

    /// Join the matchmaking queue.
    FindMatch(FindMatchRequest),

    /// Leave the matchmaking queue.
    CancelMatch,

    /// Chooser picks this round's category.
    ChooseCategory { category_id: CategoryId },

    /// Answer the pending question.
    SubmitAnswer(AnswerSubmission),

    /// Abandon the current match.
    Leave,

    /// Request the current match state.
    Snapshot,

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

/// Authentication request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Player id (UUID or hex). Only trusted when server auth is off.
    #[serde(default)]
    pub player_id: String,
    /// Authentication token (JWT).
    #[serde(default)]
    pub token: String,
    /// Display name. Only used when server auth is off.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Client version for compatibility check.
    #[serde(default)]
    pub client_version: String,
}

/// Matchmaking request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindMatchRequest {
    /// Requested match length.
    #[serde(default)]
    pub match_type: MatchType,
}

/// An answer to the pending question.
///
/// Without `round`/`index` the answer targets whatever question is pending
/// when it arrives. With them, an answer that arrives late is rejected as
/// already answered instead of landing on the next question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSubmission {
    /// Chosen index.
    pub choice: u8,
    /// Round the client is answering.
    #[serde(default)]
    pub round: Option<u32>,
    /// Question index the client is answering.
    #[serde(default)]
    pub index: Option<usize>,
}

impl AnswerSubmission {
    /// Targeted question, if the client named one.
    pub fn key(&self) -> Option<QuestionKey> {
        match (self.round, self.index) {
            (Some(round), Some(index)) => Some(QuestionKey::new(round, index)),
            _ => None,
        }
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// Matchmaking status update.
    Matchmaking(MatchmakingResponse),

    /// Paired with an opponent; the match is starting.
    MatchFound(MatchFoundInfo),

    /// A round's category offer.
    CategoriesOffered {
        round: u32,
        chooser: PlayerId,
        categories: Vec<Category>,
    },

    /// A question is pending.
    Question(QuestionInfo),

    /// Your resolution of a question.
    AnswerResult(AnswerResultInfo),

    /// Both participants resolved a question.
    QuestionResolved {
        round: u32,
        index: usize,
        correct_index: u8,
        scores: Vec<PlayerScore>,
    },

    /// A round was sealed.
    RoundResults {
        summary: RoundSummary,
        scores: Vec<PlayerScore>,
    },

    /// The match is over.
    GameOver {
        outcome: MatchOutcome,
        scores: Vec<PlayerScore>,
    },

    /// Current match state.
    Snapshot(SessionSnapshot),

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether auth succeeded.
    pub success: bool,
    /// Resolved player id if successful.
    pub player_id: Option<PlayerId>,
    /// Resolved display name if successful.
    pub display_name: Option<String>,
    /// Error message if failed.
    pub error: Option<String>,
    /// Server version.
    pub server_version: String,
}

/// Matchmaking status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchmakingResponse {
    /// Current status.
    pub status: MatchmakingStatus,
    /// Queue the participant is (or was) in.
    pub match_type: Option<MatchType>,
    /// 1-based queue position while searching.
    pub position: Option<usize>,
}

/// Matchmaking status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchmakingStatus {
    /// Waiting for an opponent.
    Searching,
    /// Cancelled by player.
    Cancelled,
    /// Waited too long without an opponent.
    Failed,
}

/// A participant as shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    /// Identity.
    pub player_id: PlayerId,
    /// Display name.
    pub display_name: String,
    /// Avatar reference.
    pub avatar: Option<String>,
}

/// Information about a found match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFoundInfo {
    /// Session identifier (UUID string).
    pub session_id: String,
    /// Match type.
    pub match_type: MatchType,
    /// Both participants in seat order.
    pub players: Vec<PlayerInfo>,
    /// Rounds in the match.
    pub total_rounds: u32,
    /// Questions per round.
    pub round_size: usize,
    /// Time limit per question in milliseconds.
    pub question_time_ms: u64,
}

/// A pending question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionInfo {
    /// Round ordinal.
    pub round: u32,
    /// Index within the round.
    pub index: usize,
    /// Question without its answer key.
    pub question: QuestionView,
    /// Time limit in milliseconds.
    pub time_limit_ms: u64,
}

/// One participant's resolution of a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResultInfo {
    /// Round ordinal.
    pub round: u32,
    /// Index within the round.
    pub index: usize,
    /// Whether the answer was correct.
    pub correct: bool,
    /// Points awarded.
    pub points: u32,
    /// Resolved by the timer rather than an answer.
    pub timed_out: bool,
    /// Cumulative score afterwards.
    pub score: u32,
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Authentication failed.
    AuthFailed,
    /// Not authenticated.
    NotAuthenticated,
    /// JWT token has expired.
    TokenExpired,
    /// Invalid JWT token (signature, format, claims).
    InvalidToken,
    /// Malformed message or argument.
    InvalidInput,
    /// Match not found.
    MatchNotFound,
    /// Already in match.
    AlreadyInMatch,
    /// Not in match.
    NotInMatch,
    /// Action not allowed in the current phase.
    InvalidState,
    /// Question already resolved for this participant.
    AlreadyAnswered,
    /// Only the chooser may pick the category.
    NotChooser,
    /// Category not part of the offer.
    InvalidCategory,
    /// Opponent left the match.
    OpponentLeft,
    /// Match ran out of content.
    ContentExhausted,
    /// Server overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl ServerError {
    /// Build an error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&ArbiterError> for ServerError {
    fn from(err: &ArbiterError) -> Self {
        let code = match err {
            ArbiterError::SessionNotFound => ErrorCode::MatchNotFound,
            ArbiterError::AlreadyInMatch => ErrorCode::AlreadyInMatch,
            ArbiterError::NotInMatch => ErrorCode::NotInMatch,
            ArbiterError::Match(e) => match e {
                MatchError::InvalidStateTransition { .. } => ErrorCode::InvalidState,
                MatchError::AlreadyAnswered => ErrorCode::AlreadyAnswered,
                MatchError::InsufficientCategories { .. }
                | MatchError::InsufficientQuestions { .. } => ErrorCode::ContentExhausted,
                MatchError::ParticipantAbandoned(_) => ErrorCode::OpponentLeft,
                MatchError::NotParticipant => ErrorCode::NotInMatch,
                MatchError::NotChooser => ErrorCode::NotChooser,
                MatchError::CategoryNotOffered(_) => ErrorCode::InvalidCategory,
                MatchError::InvalidChoice { .. } => ErrorCode::InvalidInput,
            },
        };
        Self::new(code, err.to_string())
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Error message shorthand.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::MatchPhase;

    #[test]
    fn test_client_message_json_roundtrip() {
        let json = r#"{"type":"submit_answer","choice":2,"round":1,"index":0}"#;
        let parsed = ClientMessage::from_json(json).unwrap();

        if let ClientMessage::SubmitAnswer(submission) = parsed {
            assert_eq!(submission.choice, 2);
            assert_eq!(submission.key(), Some(QuestionKey::new(1, 0)));
        } else {
            panic!("Wrong message type");
        }

        let bare = ClientMessage::from_json(r#"{"type":"submit_answer","choice":1}"#).unwrap();
        if let ClientMessage::SubmitAnswer(submission) = bare {
            assert_eq!(submission.key(), None);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_client_message_names() {
        let cases = [
            (r#"{"type":"auth","token":"t"}"#, "auth"),
            (r#"{"type":"find_match","match_type":"quick"}"#, "find_match"),
            (r#"{"type":"find_match"}"#, "find_match"),
            (r#"{"type":"cancel_match"}"#, "cancel_match"),
            (r#"{"type":"choose_category","category_id":3}"#, "choose_category"),
            (r#"{"type":"leave"}"#, "leave"),
            (r#"{"type":"snapshot"}"#, "snapshot"),
            (r#"{"type":"ping","timestamp":5}"#, "ping"),
        ];
        for (json, name) in cases {
            let msg = ClientMessage::from_json(json).unwrap();
            assert!(msg.to_json().unwrap().contains(&format!("\"type\":\"{}\"", name)));
        }

        if let ClientMessage::FindMatch(req) = ClientMessage::from_json(r#"{"type":"find_match"}"#).unwrap() {
            assert_eq!(req.match_type, MatchType::Standard);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_binary_answer_submission() {
        // Tagged enums are not supported by bincode, so only the flat
        // submission struct travels in binary frames.
        let submission = AnswerSubmission { choice: 3, round: Some(2), index: Some(1) };
        let bytes = submission.to_bytes().unwrap();
        assert_eq!(AnswerSubmission::from_bytes(&bytes).unwrap(), submission);
    }

    #[test]
    fn test_server_message_json_roundtrip() {
        let msg = ServerMessage::QuestionResolved {
            round: 2,
            index: 1,
            correct_index: 3,
            scores: vec![PlayerScore { player_id: PlayerId::new([1; 16]), score: 20 }],
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"question_resolved\""));

        if let ServerMessage::QuestionResolved { correct_index, scores, .. } = ServerMessage::from_json(&json).unwrap() {
            assert_eq!(correct_index, 3);
            assert_eq!(scores[0].score, 20);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_game_over_outcome_tagging() {
        let msg = ServerMessage::GameOver {
            outcome: MatchOutcome::Abandoned {
                by: PlayerId::new([1; 16]),
                winner: PlayerId::new([2; 16]),
            },
            scores: vec![],
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"game_over\""));
        assert!(json.contains("\"result\":\"abandoned\""));
    }

    #[test]
    fn test_matchmaking_response() {
        let msg = ServerMessage::Matchmaking(MatchmakingResponse {
            status: MatchmakingStatus::Searching,
            match_type: Some(MatchType::Quick),
            position: Some(1),
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains("searching"));
        assert!(json.contains("quick"));
    }

    #[test]
    fn test_error_codes() {
        let err = ArbiterError::Match(MatchError::InvalidStateTransition {
            action: "choose category",
            phase: MatchPhase::QuestionActive,
        });
        let server_error = ServerError::from(&err);
        assert_eq!(server_error.code, ErrorCode::InvalidState);

        let json = ServerMessage::Error(server_error).to_json().unwrap();
        assert!(json.contains("invalid_state"));

        assert_eq!(ServerError::from(&ArbiterError::AlreadyInMatch).code, ErrorCode::AlreadyInMatch);
        assert_eq!(
            ServerError::from(&ArbiterError::Match(MatchError::AlreadyAnswered)).code,
            ErrorCode::AlreadyAnswered
        );
    }
}
