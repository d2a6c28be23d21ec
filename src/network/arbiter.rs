//! Match Arbiter
//!
//! The authoritative owner of matchmaking and every hosted session. All
//! participant intents pass through here, whatever transport delivered
//! them, and every timer signal comes back here to be applied under the
//! session's lock.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::core::rng::DeterministicRng;
use crate::game::catalog::{CategoryCatalog, CategoryId};
use crate::game::config::MatchType;
use crate::game::error::MatchError;
use crate::game::question::{QuestionBank, TriviaContent};
use crate::game::state::{AnswerOutcome, MatchOutcome, MatchPhase, MatchState, Player, PlayerId, QuestionKey};
use crate::network::matchmaking::{Matchmaker, QueueEntry, QueueOutcome};
use crate::network::protocol::{MatchmakingResponse, MatchmakingStatus, ServerMessage};
use crate::network::results::ResultSink;
use crate::network::session::{MatchSession, SessionId, SessionManager, SessionSnapshot};
use crate::network::timer::{TimerKind, TimerSignal};

/// Errors returned by arbiter operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArbiterError {
    /// No such session.
    #[error("session not found")]
    SessionNotFound,

    /// The participant is already seated in a live match.
    #[error("already in a match")]
    AlreadyInMatch,

    /// The participant has no match.
    #[error("not in a match")]
    NotInMatch,

    /// The match rejected the operation.
    #[error(transparent)]
    Match(#[from] MatchError),
}

/// Arbiter timings.
#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    /// Pause between a round's results and the next category offer.
    pub intermission: Duration,
    /// Longest a participant may wait for an opponent.
    pub queue_timeout: Duration,
    /// How long a finished session stays queryable.
    pub archive_grace: Duration,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            intermission: Duration::from_secs(5),
            queue_timeout: Duration::from_secs(120),
            archive_grace: Duration::from_secs(5),
        }
    }
}

/// Result of [`Arbiter::request_match`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchRequest {
    /// Paired; the session has started.
    Paired(SessionId),
    /// Waiting for a compatible opponent.
    Queued {
        /// 1-based queue position.
        position: usize,
    },
}

/// Where a participant currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParticipantStatus {
    /// Neither queued nor in a live match.
    Idle,
    /// Waiting for an opponent.
    Queued {
        /// Requested match type.
        match_type: MatchType,
        /// 1-based queue position.
        position: usize,
    },
    /// Seated in a live match.
    InMatch {
        /// Session.
        session_id: SessionId,
        /// Phase of the match.
        phase: MatchPhase,
    },
}

/// Authoritative match host.
pub struct Arbiter {
    config: ArbiterConfig,
    catalog: Arc<CategoryCatalog>,
    bank: Arc<QuestionBank>,
    sessions: Arc<SessionManager>,
    /// The one shared queue; pairing happens under this lock.
    matchmaker: Mutex<Matchmaker>,
    /// Outbound channels of connected participants.
    connections: RwLock<BTreeMap<PlayerId, mpsc::Sender<ServerMessage>>>,
    timer_tx: mpsc::UnboundedSender<TimerSignal>,
    results: Arc<dyn ResultSink>,
}

impl Arbiter {
    /// Create an arbiter and spawn its timer loop. Requires a tokio runtime.
    pub fn new(content: TriviaContent, results: Arc<dyn ResultSink>, config: ArbiterConfig) -> Arc<Self> {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let arbiter = Arc::new(Self {
            config,
            catalog: Arc::new(content.catalog),
            bank: Arc::new(content.bank),
            sessions: Arc::new(SessionManager::new()),
            matchmaker: Mutex::new(Matchmaker::new()),
            connections: RwLock::new(BTreeMap::new()),
            timer_tx,
            results,
        });

        tokio::spawn(Self::run_timer_loop(Arc::downgrade(&arbiter), timer_rx));
        arbiter
    }

    /// Arbiter timings.
    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    /// Hosted sessions.
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    // -------------------------------------------------------------------------
    // Connections
    // -------------------------------------------------------------------------

    /// Route a participant's messages to `sender`, including those of a
    /// match they are already seated in.
    pub async fn register_connection(&self, player_id: PlayerId, sender: mpsc::Sender<ServerMessage>) {
        let mut connections = self.connections.write().await;
        connections.insert(player_id, sender.clone());
        if let Some(session) = self.sessions.get_player_session(&player_id).await {
            session.write().await.attach(player_id, sender);
        }
    }

    /// Stop routing messages to a participant if `sender` is still their
    /// current connection. Returns false when they have reconnected since.
    pub async fn unregister_connection(&self, player_id: &PlayerId, sender: &mpsc::Sender<ServerMessage>) -> bool {
        // Held until the session is detached so a reconnect cannot interleave
        let mut connections = self.connections.write().await;
        match connections.get(player_id) {
            Some(current) if current.same_channel(sender) => {
                connections.remove(player_id);
            }
            _ => return false,
        }
        if let Some(session) = self.sessions.get_player_session(player_id).await {
            session.write().await.detach(player_id);
        }
        true
    }

    // -------------------------------------------------------------------------
    // Matchmaking
    // -------------------------------------------------------------------------

    /// Queue for a match, or pair with the longest-waiting participant who
    /// asked for the same match type. Pairing starts the session.
    pub async fn request_match(&self, player: Player, match_type: MatchType) -> Result<MatchRequest, ArbiterError> {
        let mut matchmaker = self.matchmaker.lock().await;

        if self.live_session_of(&player.id).await.is_some() {
            return Err(ArbiterError::AlreadyInMatch);
        }

        match matchmaker.enqueue(player, match_type) {
            QueueOutcome::Waiting { position } => {
                debug!(position, match_type = match_type.as_str(), "participant queued");
                Ok(MatchRequest::Queued { position })
            }
            QueueOutcome::Paired { first, second } => {
                // Still holding the queue lock, so neither can be paired again
                let session_id = self.create_session(first, second, match_type).await;
                Ok(MatchRequest::Paired(session_id))
            }
        }
    }

    /// Leave the matchmaking queue. Returns whether the participant was queued.
    pub async fn cancel_match(&self, player_id: &PlayerId) -> bool {
        self.matchmaker.lock().await.cancel(*player_id).is_some()
    }

    /// Expire queue entries older than the queue timeout and tell those
    /// participants matchmaking failed.
    pub async fn sweep_queue(&self) -> usize {
        let expired = self.matchmaker.lock().await.expire_stale(self.config.queue_timeout);
        if expired.is_empty() {
            return 0;
        }

        let connections = self.connections.read().await;
        for entry in &expired {
            debug!(player = %entry.player.id.short(), "matchmaking timed out");
            if let Some(sender) = connections.get(&entry.player.id) {
                let _ = sender.try_send(ServerMessage::Matchmaking(MatchmakingResponse {
                    status: MatchmakingStatus::Failed,
                    match_type: Some(entry.match_type),
                    position: None,
                }));
            }
        }
        expired.len()
    }

    /// Waiting participants.
    pub async fn queue_size(&self) -> usize {
        self.matchmaker.lock().await.len()
    }

    async fn create_session(&self, first: QueueEntry, second: QueueEntry, match_type: MatchType) -> SessionId {
        let session_id = *uuid::Uuid::new_v4().as_bytes();
        let players = [first.player, second.player];
        let rng = DeterministicRng::for_match(
            &session_id,
            &[*players[0].id.as_bytes(), *players[1].id.as_bytes()],
        );

        let state = MatchState::new(
            players,
            match_type.config(),
            Arc::clone(&self.catalog),
            Arc::clone(&self.bank),
            rng,
        );
        let mut session = MatchSession::new(session_id, state, self.timer_tx.clone(), self.config.intermission);

        {
            let connections = self.connections.read().await;
            for player_id in session.state().player_ids() {
                if let Some(sender) = connections.get(&player_id) {
                    session.attach(player_id, sender.clone());
                }
            }
        }

        let session = self.sessions.insert(session).await;
        let mut session = session.write().await;
        if let Err(e) = session.start() {
            warn!(session = %hex::encode(&session_id[..4]), "match could not start: {}", e);
        }
        self.settle(&mut session);

        info!(
            session = %hex::encode(&session_id[..4]),
            match_type = match_type.as_str(),
            "paired {} vs {}",
            session.state().players()[0].id.short(),
            session.state().players()[1].id.short(),
        );
        session_id
    }

    // -------------------------------------------------------------------------
    // Match operations
    // -------------------------------------------------------------------------

    /// Session the participant is mapped to, finished or not.
    pub async fn session_of(&self, player_id: &PlayerId) -> Option<SessionId> {
        self.sessions.player_session_id(player_id).await
    }

    /// Chooser picks the round's category.
    pub async fn choose_category(
        &self,
        session_id: &SessionId,
        player: PlayerId,
        category: CategoryId,
    ) -> Result<QuestionKey, ArbiterError> {
        let session = self.sessions.get_session(session_id).await.ok_or(ArbiterError::SessionNotFound)?;
        let mut session = session.write().await;
        let result = session.choose_category(player, category);
        self.settle(&mut session);
        Ok(result?)
    }

    /// Submit an answer. Without a key the pending question is targeted.
    pub async fn submit_answer(
        &self,
        session_id: &SessionId,
        player: PlayerId,
        key: Option<QuestionKey>,
        choice: u8,
    ) -> Result<AnswerOutcome, ArbiterError> {
        let session = self.sessions.get_session(session_id).await.ok_or(ArbiterError::SessionNotFound)?;
        let mut session = session.write().await;
        let result = session.submit_answer(player, key, choice);
        self.settle(&mut session);
        Ok(result?)
    }

    /// Current view of a session.
    pub async fn get_session_snapshot(&self, session_id: &SessionId) -> Result<SessionSnapshot, ArbiterError> {
        let session = self.sessions.get_session(session_id).await.ok_or(ArbiterError::SessionNotFound)?;
        let snapshot = session.read().await.snapshot();
        Ok(snapshot)
    }

    /// A participant abandons the match.
    pub async fn abandon(&self, session_id: &SessionId, player: PlayerId) -> Result<MatchOutcome, ArbiterError> {
        let session = self.sessions.get_session(session_id).await.ok_or(ArbiterError::SessionNotFound)?;
        let mut session = session.write().await;
        let result = session.abandon(player);
        self.settle(&mut session);
        Ok(result?)
    }

    /// Leave everything: the queue and any live match. Used for explicit
    /// leave and for disconnects.
    pub async fn leave(&self, player_id: PlayerId) -> Option<MatchOutcome> {
        if self.cancel_match(&player_id).await {
            debug!(player = %player_id.short(), "left matchmaking");
        }

        let session_id = self.live_session_of(&player_id).await?;
        match self.abandon(&session_id, player_id).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                debug!(player = %player_id.short(), "leave: {}", e);
                None
            }
        }
    }

    /// Where the participant currently is.
    pub async fn participant_status(&self, player_id: &PlayerId) -> ParticipantStatus {
        if let Some(session_id) = self.live_session_of(player_id).await {
            if let Some(session) = self.sessions.get_session(&session_id).await {
                let phase = session.read().await.state().phase();
                return ParticipantStatus::InMatch { session_id, phase };
            }
        }

        match self.matchmaker.lock().await.position_of(*player_id) {
            Some((match_type, position)) => ParticipantStatus::Queued { match_type, position },
            None => ParticipantStatus::Idle,
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    async fn live_session_of(&self, player_id: &PlayerId) -> Option<SessionId> {
        let session_id = self.sessions.player_session_id(player_id).await?;
        let session = self.sessions.get_session(&session_id).await?;
        let live = !session.read().await.is_over();
        live.then_some(session_id)
    }

    /// After an operation: record a finished match once and schedule its
    /// removal.
    fn settle(&self, session: &mut MatchSession) {
        let Some(report) = session.take_report() else {
            return;
        };

        if let Err(e) = self.results.record(&report) {
            error!(session = %report.session_id, "failed to record result: {}", e);
        }

        let sessions = Arc::clone(&self.sessions);
        let session_id = session.id;
        let grace = self.config.archive_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            sessions.remove_session(&session_id).await;
            trace!(session = %hex::encode(&session_id[..4]), "session archived");
        });
    }

    async fn on_timer(&self, signal: TimerSignal) {
        let Some(session) = self.sessions.get_session(&signal.session_id).await else {
            return;
        };
        let mut session = session.write().await;

        match signal.kind {
            TimerKind::Question(key) => match session.expire(key) {
                Ok(outcome) => {
                    debug!(question = %key, timed_out = outcome.timed_out.len(), "question expired");
                }
                // Lost the race to an answer or an abandonment
                Err(e) => trace!(question = %key, "stale expiry: {}", e),
            },
            TimerKind::Intermission { round } => {
                if let Some(Err(e)) = session.end_intermission(round) {
                    warn!(round, "advance after intermission failed: {}", e);
                }
            }
        }

        self.settle(&mut session);
    }

    async fn run_timer_loop(arbiter: Weak<Self>, mut timer_rx: mpsc::UnboundedReceiver<TimerSignal>) {
        while let Some(signal) = timer_rx.recv().await {
            let Some(arbiter) = arbiter.upgrade() else {
                break;
            };
            arbiter.on_timer(signal).await;
        }
    }
}
