//! Match Session Management
//!
//! Hosts each deterministic [`MatchState`] inside the async server: owns the
//! session's timers, measures answer times, and turns game events into
//! messages for the two connected participants.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::game::catalog::{Category, CategoryId};
use crate::game::config::MatchType;
use crate::game::error::MatchError;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::report::MatchReport;
use crate::game::state::{
    AnswerOutcome, ExpiryOutcome, MatchOutcome, MatchPhase, MatchState, PlayerId, PlayerScore,
    Progress, QuestionKey,
};
use crate::network::protocol::{
    AnswerResultInfo, MatchFoundInfo, PlayerInfo, QuestionInfo, ServerMessage,
};
use crate::network::timer::{RoundTimer, TimerKind, TimerSignal};

/// Unique session identifier.
pub type SessionId = [u8; 16];

/// Session id as a UUID string.
pub fn session_id_string(id: &SessionId) -> String {
    uuid::Uuid::from_bytes(*id).to_string()
}

/// Point-in-time view of a session. Never exposes an answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub session_id: String,
    /// Match type.
    pub match_type: MatchType,
    /// Lifecycle phase.
    pub phase: MatchPhase,
    /// Current round ordinal.
    pub round: u32,
    /// Rounds in the match.
    pub total_rounds: u32,
    /// Participants in seat order.
    pub players: Vec<PlayerInfo>,
    /// Cumulative scores in seat order.
    pub scores: Vec<PlayerScore>,
    /// Who picks the category this round.
    pub chooser: PlayerId,
    /// Offer while in category selection.
    pub offered: Vec<Category>,
    /// Pending question while one is active.
    pub pending_question: Option<QuestionInfo>,
    /// Time left on the pending question.
    pub time_remaining_ms: Option<u64>,
    /// Outcome once the match is over.
    pub outcome: Option<MatchOutcome>,
}

/// A hosted match.
pub struct MatchSession {
    /// Unique session identifier.
    pub id: SessionId,
    state: MatchState,
    /// Message channels of connected participants.
    senders: BTreeMap<PlayerId, mpsc::Sender<ServerMessage>>,
    timer_tx: mpsc::UnboundedSender<TimerSignal>,
    question_timer: Option<RoundTimer>,
    intermission_timer: Option<RoundTimer>,
    /// Pause between a round's results and the next offer.
    intermission: Duration,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    reported: bool,
}

impl MatchSession {
    /// Host a paired match. Call [`MatchSession::start`] to begin round 1.
    pub fn new(
        id: SessionId,
        state: MatchState,
        timer_tx: mpsc::UnboundedSender<TimerSignal>,
        intermission: Duration,
    ) -> Self {
        Self {
            id,
            state,
            senders: BTreeMap::new(),
            timer_tx,
            question_timer: None,
            intermission_timer: None,
            intermission,
            started_at: Utc::now(),
            ended_at: None,
            reported: false,
        }
    }

    /// Route a participant's messages to `sender`.
    pub fn attach(&mut self, player_id: PlayerId, sender: mpsc::Sender<ServerMessage>) {
        self.senders.insert(player_id, sender);
    }

    /// Stop sending to a participant.
    pub fn detach(&mut self, player_id: &PlayerId) {
        self.senders.remove(player_id);
    }

    /// Hosted match state.
    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Whether the match reached game over.
    pub fn is_over(&self) -> bool {
        self.state.phase().is_terminal()
    }

    /// When the match ended.
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Time left on the pending question.
    pub fn question_time_remaining(&self) -> Option<Duration> {
        self.state.pending_key()?;
        self.question_timer.as_ref().map(|t| t.remaining())
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Begin round 1.
    pub fn start(&mut self) -> Result<(), MatchError> {
        let result = self.state.start();
        self.flush();
        result
    }

    /// Chooser picks a category; the first question's timer starts.
    pub fn choose_category(&mut self, player: PlayerId, category: CategoryId) -> Result<QuestionKey, MatchError> {
        let result = self.state.choose_category(player, category);
        if let Ok(key) = result {
            self.start_question_timer(key);
        }
        self.flush();
        result
    }

    /// Answer a question. Without a key the pending question is targeted.
    pub fn submit_answer(
        &mut self,
        player: PlayerId,
        key: Option<QuestionKey>,
        choice: u8,
    ) -> Result<AnswerOutcome, MatchError> {
        let key = match key.or_else(|| self.state.pending_key()) {
            Some(key) => key,
            None => return Err(self.nothing_pending("submit answer")),
        };
        let elapsed = self.question_timer.as_ref()
            .map(|t| t.elapsed())
            .unwrap_or_default();

        let result = self.state.submit_answer(player, key, choice, elapsed);
        if let Ok(outcome) = &result {
            self.on_progress(outcome.progress);
        }
        self.flush();
        result
    }

    /// Question timer ran out.
    pub fn expire(&mut self, key: QuestionKey) -> Result<ExpiryOutcome, MatchError> {
        let result = self.state.expire_question(key);
        if let Ok(outcome) = &result {
            self.on_progress(outcome.progress);
        }
        self.flush();
        result
    }

    /// Leave round results now.
    pub fn advance(&mut self) -> Result<MatchPhase, MatchError> {
        self.intermission_timer = None;
        let result = self.state.advance();
        self.flush();
        result
    }

    /// Intermission after `round` ran out. Ignored unless that round's
    /// results are still showing.
    pub fn end_intermission(&mut self, round: u32) -> Option<Result<MatchPhase, MatchError>> {
        if self.state.phase() != MatchPhase::RoundResults || self.state.round_number() != round {
            return None;
        }
        Some(self.advance())
    }

    /// A participant leaves; the match ends and all timers stop.
    pub fn abandon(&mut self, player: PlayerId) -> Result<MatchOutcome, MatchError> {
        let result = self.state.abandon(player);
        self.flush();
        result
    }

    /// Report for the result sink. Produced once, after game over.
    pub fn take_report(&mut self) -> Option<MatchReport> {
        if self.reported || !self.is_over() {
            return None;
        }
        self.reported = true;
        let ended_at = self.ended_at.unwrap_or_else(Utc::now);
        MatchReport::from_state(&session_id_string(&self.id), &self.state, self.started_at, ended_at)
    }

    /// Current state for clients.
    pub fn snapshot(&self) -> SessionSnapshot {
        let config = self.state.config();
        let pending_question = self.state.pending_key()
            .zip(self.state.pending_question())
            .map(|(key, question)| QuestionInfo {
                round: key.round,
                index: key.index,
                question,
                time_limit_ms: config.question_time.as_millis() as u64,
            });

        SessionSnapshot {
            session_id: session_id_string(&self.id),
            match_type: config.match_type,
            phase: self.state.phase(),
            round: self.state.round_number(),
            total_rounds: config.total_rounds,
            players: self.player_infos(),
            scores: self.state.scores(),
            chooser: self.state.chooser(),
            offered: self.state.offered().to_vec(),
            pending_question,
            time_remaining_ms: self.question_time_remaining().map(|d| d.as_millis() as u64),
            outcome: self.state.outcome().cloned(),
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn nothing_pending(&self, action: &'static str) -> MatchError {
        match self.state.outcome() {
            Some(MatchOutcome::Abandoned { by, .. }) => MatchError::ParticipantAbandoned(*by),
            _ => MatchError::InvalidStateTransition {
                action,
                phase: self.state.phase(),
            },
        }
    }

    fn on_progress(&mut self, progress: Progress) {
        match progress {
            Progress::AwaitingOpponent => {}
            Progress::NextQuestion(key) => self.start_question_timer(key),
            Progress::RoundSealed => {
                self.question_timer = None;
                let signal = TimerSignal {
                    session_id: self.id,
                    kind: TimerKind::Intermission { round: self.state.round_number() },
                };
                self.intermission_timer = Some(RoundTimer::start(self.intermission, signal, self.timer_tx.clone()));
            }
        }
    }

    /// Replacing the previous timer drops, and so cancels, it.
    fn start_question_timer(&mut self, key: QuestionKey) {
        let signal = TimerSignal {
            session_id: self.id,
            kind: TimerKind::Question(key),
        };
        let duration = self.state.config().question_time;
        self.question_timer = Some(RoundTimer::start(duration, signal, self.timer_tx.clone()));
    }

    /// Deliver pending game events to the participants.
    fn flush(&mut self) {
        for event in self.state.drain_events() {
            self.dispatch(event);
        }

        if self.is_over() && self.ended_at.is_none() {
            self.question_timer = None;
            self.intermission_timer = None;
            self.ended_at = Some(Utc::now());
        }
    }

    fn dispatch(&self, event: GameEvent) {
        let short_id = hex::encode(&self.id[..4]);
        match event.data {
            GameEventData::MatchStarted { match_type, .. } => {
                info!(session = %short_id, match_type = match_type.as_str(), "match started");
                self.broadcast(ServerMessage::MatchFound(self.match_found_info()));
            }
            GameEventData::CategoriesOffered { round, chooser, categories } => {
                self.broadcast(ServerMessage::CategoriesOffered { round, chooser, categories });
            }
            GameEventData::CategoryChosen { round, chooser, category } => {
                debug!(session = %short_id, round, chooser = %chooser.short(), category = %category.name, "category chosen");
            }
            GameEventData::QuestionIssued { key, question, time_limit_ms } => {
                self.broadcast(ServerMessage::Question(QuestionInfo {
                    round: key.round,
                    index: key.index,
                    question,
                    time_limit_ms,
                }));
            }
            GameEventData::AnswerResolved { key, player_id, correct, points, timed_out, score } => {
                self.send_to(&player_id, ServerMessage::AnswerResult(AnswerResultInfo {
                    round: key.round,
                    index: key.index,
                    correct,
                    points,
                    timed_out,
                    score,
                }));
            }
            GameEventData::QuestionResolved { key, correct_index } => {
                self.broadcast(ServerMessage::QuestionResolved {
                    round: key.round,
                    index: key.index,
                    correct_index,
                    scores: self.state.scores(),
                });
            }
            GameEventData::RoundSealed { summary, scores } => {
                debug!(session = %short_id, round = summary.number, "round sealed");
                self.broadcast(ServerMessage::RoundResults { summary, scores });
            }
            GameEventData::MatchEnded { outcome, scores } => {
                info!(session = %short_id, outcome = outcome.label(), "match ended");
                self.broadcast(ServerMessage::GameOver { outcome, scores });
            }
        }
    }

    fn send_to(&self, player_id: &PlayerId, message: ServerMessage) {
        if let Some(sender) = self.senders.get(player_id) {
            // Never block while the session lock is held
            if let Err(e) = sender.try_send(message) {
                warn!(player = %player_id.short(), "dropping message: {}", e);
            }
        }
    }

    fn broadcast(&self, message: ServerMessage) {
        for player_id in self.senders.keys() {
            self.send_to(player_id, message.clone());
        }
    }

    fn player_infos(&self) -> Vec<PlayerInfo> {
        self.state.players().iter()
            .map(|p| PlayerInfo {
                player_id: p.id,
                display_name: p.display_name.clone(),
                avatar: p.avatar.clone(),
            })
            .collect()
    }

    fn match_found_info(&self) -> MatchFoundInfo {
        let config = self.state.config();
        MatchFoundInfo {
            session_id: session_id_string(&self.id),
            match_type: config.match_type,
            players: self.player_infos(),
            total_rounds: config.total_rounds,
            round_size: config.round_size,
            question_time_ms: config.question_time.as_millis() as u64,
        }
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Manages all active sessions.
pub struct SessionManager {
    /// Active sessions.
    sessions: RwLock<BTreeMap<SessionId, Arc<RwLock<MatchSession>>>>,
    /// Player to session mapping.
    player_sessions: RwLock<BTreeMap<PlayerId, SessionId>>,
}

impl SessionManager {
    /// Create new session manager.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            player_sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add a session and map both participants to it.
    pub async fn insert(&self, session: MatchSession) -> Arc<RwLock<MatchSession>> {
        let id = session.id;
        let players = session.state().player_ids();
        let session = Arc::new(RwLock::new(session));

        self.sessions.write().await.insert(id, Arc::clone(&session));
        let mut player_sessions = self.player_sessions.write().await;
        for player_id in players {
            player_sessions.insert(player_id, id);
        }

        session
    }

    /// Get a session by ID.
    pub async fn get_session(&self, id: &SessionId) -> Option<Arc<RwLock<MatchSession>>> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    /// Session a player is mapped to.
    pub async fn player_session_id(&self, player_id: &PlayerId) -> Option<SessionId> {
        self.player_sessions.read().await.get(player_id).copied()
    }

    /// Get session for a player.
    pub async fn get_player_session(&self, player_id: &PlayerId) -> Option<Arc<RwLock<MatchSession>>> {
        let session_id = self.player_session_id(player_id).await?;
        self.get_session(&session_id).await
    }

    /// Remove a session, and the player mappings that still point at it.
    pub async fn remove_session(&self, id: &SessionId) {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            let mut player_sessions = self.player_sessions.write().await;
            player_sessions.retain(|_, session_id| session_id != id);
        }
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Remove finished sessions that ended more than `max_age` ago.
    pub async fn cleanup(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::zero());
        let mut to_remove = Vec::new();

        {
            let sessions = self.sessions.read().await;
            for (id, session) in sessions.iter() {
                let s = session.read().await;
                if s.is_over() && s.ended_at().map(|t| t <= cutoff).unwrap_or(false) {
                    to_remove.push(*id);
                }
            }
        }

        for id in &to_remove {
            self.remove_session(id).await;
        }
        to_remove.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
