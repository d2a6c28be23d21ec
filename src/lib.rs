//! # Trivia Duel Server
//!
//! Authoritative match server for head-to-head trivia duels.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TRIVIA DUEL SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  └── rng.rs      - Xorshift128+ PRNG, match seed derivation  │
//! │                                                              │
//! │  game/           - Match rules (deterministic)               │
//! │  ├── catalog.rs  - Categories and offer sampling             │
//! │  ├── question.rs - Question bank, per-match deck, loading    │
//! │  ├── scoring.rs  - Correctness and points                    │
//! │  ├── round.rs    - Per-round resolutions and sealing         │
//! │  ├── config.rs   - Match types                               │
//! │  ├── state.rs    - Match state machine                       │
//! │  ├── events.rs   - Events emitted by transitions             │
//! │  └── report.rs   - Game-over report                          │
//! │                                                              │
//! │  network/        - Hosting (non-deterministic)               │
//! │  ├── timer.rs    - Cancellable question/intermission timers  │
//! │  ├── matchmaking.rs - Waiting queue and pairing              │
//! │  ├── session.rs  - Hosted sessions                           │
//! │  ├── arbiter.rs  - Authoritative match operations            │
//! │  ├── results.rs  - Result sinks                              │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── auth.rs     - JWT identity                              │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules never read the clock or do I/O:
//! - Answer times are measured by the host and passed in
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - All randomness from a seeded Xorshift128+ derived from the session
//!   and participant ids
//!
//! Given the same seed, content and intents, a match plays out
//! **identically**, so any match can be replayed from its log.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use game::config::{MatchConfig, MatchType};
pub use game::error::MatchError;
pub use game::state::{MatchState, MatchPhase, Player, PlayerId};
pub use network::arbiter::Arbiter;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Base points for a correct answer.
pub const BASE_POINTS: u32 = game::scoring::DEFAULT_BASE_POINTS;
