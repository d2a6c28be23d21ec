//! Network Layer
//!
//! Hosts matches for real-time play over WebSocket.
//! This layer is **non-deterministic** - all match rules run through `game/`.

pub mod arbiter;
pub mod auth;
pub mod matchmaking;
pub mod protocol;
pub mod results;
pub mod server;
pub mod session;
pub mod timer;

pub use arbiter::{Arbiter, ArbiterConfig, ArbiterError, MatchRequest, ParticipantStatus};
pub use auth::{AuthConfig, TokenClaims, AuthError, authenticate, validate_token};
pub use protocol::{
    ClientMessage, ServerMessage, AnswerSubmission, MatchmakingResponse, ErrorCode,
};
pub use results::{ResultSink, LogSink, JsonLinesSink, SinkError};
pub use session::{MatchSession, SessionId, SessionManager, SessionSnapshot};
pub use server::{GameServer, ServerConfig, GameServerError};
pub use timer::{RoundTimer, TimerKind, TimerSignal};
