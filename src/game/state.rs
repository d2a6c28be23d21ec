//! Match State Machine
//!
//! One match's lifecycle, from pairing to game over:
//!
//! ```text
//! Matchmaking -> CategorySelection -> QuestionActive -> RoundResults
//!                      ^                                    |
//!                      +------------- advance --------------+--> GameOver
//! ```
//!
//! Everything here is deterministic. Elapsed time is supplied by the host
//! and timer expiry arrives as an explicit [`MatchState::expire_question`]
//! call, so a match can be replayed from its seed and inputs.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::catalog::{Category, CategoryCatalog, CategoryId};
use crate::game::config::MatchConfig;
use crate::game::error::MatchError;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::question::{QuestionBank, QuestionDeck, QuestionView};
use crate::game::round::{Resolution, Round};
use crate::game::scoring::is_correct;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique player identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Short hex prefix for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uuid_string())
    }
}

// =============================================================================
// PARTICIPANTS
// =============================================================================

/// Position of a participant in the match.
///
/// `First` is the participant who entered the queue first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    /// First-queued participant.
    First,
    /// Second participant.
    Second,
}

impl Seat {
    /// Both seats in order.
    pub const BOTH: [Seat; 2] = [Seat::First, Seat::Second];

    /// Array index for per-seat storage.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Seat::First => 0,
            Seat::Second => 1,
        }
    }

    /// The opposing seat.
    #[inline]
    pub fn other(self) -> Seat {
        match self {
            Seat::First => Seat::Second,
            Seat::Second => Seat::First,
        }
    }
}

/// A participant in a match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Identity.
    pub id: PlayerId,
    /// Display name.
    pub display_name: String,
    /// Avatar reference.
    pub avatar: Option<String>,
    /// Cumulative score. Only the state machine changes it.
    pub score: u32,
}

impl Player {
    /// Create a participant with zero score.
    pub fn new(id: PlayerId, display_name: impl Into<String>, avatar: Option<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            avatar,
            score: 0,
        }
    }
}

/// A participant's score at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerScore {
    /// Participant.
    pub player_id: PlayerId,
    /// Cumulative score.
    pub score: u32,
}

// =============================================================================
// PHASES AND OUTCOMES
// =============================================================================

/// Identifies one question of one round.
///
/// Orders by round, then question index, matching the order questions are
/// asked in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuestionKey {
    /// Round ordinal, starting at 1.
    pub round: u32,
    /// Question index within the round.
    pub index: usize,
}

impl QuestionKey {
    /// Create a key.
    pub const fn new(round: u32, index: usize) -> Self {
        Self { round, index }
    }
}

impl fmt::Display for QuestionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}q{}", self.round, self.index)
    }
}

/// Lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Not queued and not in a match.
    Idle,
    /// Waiting for an opponent, or paired but not started.
    Matchmaking,
    /// Waiting for the chooser to pick a category.
    CategorySelection,
    /// A question is pending.
    QuestionActive,
    /// Round sealed, waiting for the host to advance.
    RoundResults,
    /// Terminal.
    GameOver,
}

impl MatchPhase {
    /// Whether the phase is terminal.
    pub fn is_terminal(self) -> bool {
        self == MatchPhase::GameOver
    }
}

/// How a match ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MatchOutcome {
    /// Strictly higher cumulative score.
    Winner {
        /// Winning participant.
        player_id: PlayerId,
    },
    /// Equal scores.
    Tie,
    /// A participant left; the other is recorded as winner.
    Abandoned {
        /// Participant who left.
        by: PlayerId,
        /// Remaining participant.
        winner: PlayerId,
    },
    /// Content ran out mid-match.
    Aborted {
        /// Error that ended the match.
        reason: String,
    },
}

impl MatchOutcome {
    /// Winning participant, if there is one.
    pub fn winner(&self) -> Option<PlayerId> {
        match self {
            MatchOutcome::Winner { player_id } => Some(*player_id),
            MatchOutcome::Abandoned { winner, .. } => Some(*winner),
            MatchOutcome::Tie | MatchOutcome::Aborted { .. } => None,
        }
    }

    /// Short label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            MatchOutcome::Winner { .. } => "winner",
            MatchOutcome::Tie => "tie",
            MatchOutcome::Abandoned { .. } => "abandoned",
            MatchOutcome::Aborted { .. } => "aborted",
        }
    }
}

/// What a resolution did to the match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    /// The other participant still has to resolve the question.
    AwaitingOpponent,
    /// Both resolved; this question is now pending.
    NextQuestion(QuestionKey),
    /// Both resolved the last question; the round is sealed.
    RoundSealed,
}

impl Progress {
    /// Whether the pending question changed, so its timer is done.
    pub fn question_closed(self) -> bool {
        !matches!(self, Progress::AwaitingOpponent)
    }
}

/// Result of a submitted answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnswerOutcome {
    /// Question answered.
    pub key: QuestionKey,
    /// Whether the answer was correct.
    pub correct: bool,
    /// Points awarded.
    pub points: u32,
    /// Submitter's cumulative score afterwards.
    pub score: u32,
    /// Effect on the match.
    pub progress: Progress,
}

/// Result of a question timer expiring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpiryOutcome {
    /// Question that expired.
    pub key: QuestionKey,
    /// Participants resolved with a timeout.
    pub timed_out: Vec<PlayerId>,
    /// Effect on the match.
    pub progress: Progress,
}

// =============================================================================
// MATCH STATE
// =============================================================================

/// Authoritative state of one match.
#[derive(Clone, Debug)]
pub struct MatchState {
    config: MatchConfig,
    catalog: Arc<CategoryCatalog>,
    deck: QuestionDeck,
    rng: DeterministicRng,

    players: [Player; 2],
    phase: MatchPhase,

    round_number: u32,
    chooser: Seat,
    offered: Vec<Category>,
    current: Option<Round>,
    pending: Option<usize>,
    history: Vec<Round>,

    outcome: Option<MatchOutcome>,
    events: Vec<GameEvent>,
    next_sequence: u32,
}

impl MatchState {
    /// Create a paired match in `Matchmaking`.
    ///
    /// `players[0]` is the first-queued participant.
    pub fn new(
        players: [Player; 2],
        config: MatchConfig,
        catalog: Arc<CategoryCatalog>,
        bank: Arc<QuestionBank>,
        rng: DeterministicRng,
    ) -> Self {
        Self {
            config,
            catalog,
            deck: QuestionDeck::new(bank),
            rng,
            players,
            phase: MatchPhase::Matchmaking,
            round_number: 0,
            chooser: Seat::First,
            offered: Vec::new(),
            current: None,
            pending: None,
            history: Vec::new(),
            outcome: None,
            events: Vec::new(),
            next_sequence: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// `Matchmaking -> CategorySelection`: round 1 and its offer.
    ///
    /// If the catalog cannot fill the offer the match is aborted and the
    /// error returned.
    pub fn start(&mut self) -> Result<(), MatchError> {
        self.expect_phase("start match", MatchPhase::Matchmaking)?;

        let players = [self.players[0].id, self.players[1].id];
        self.emit(GameEventData::MatchStarted {
            players,
            match_type: self.config.match_type,
        });

        self.round_number = 1;
        self.begin_selection()
    }

    /// `CategorySelection -> QuestionActive`: the chooser picks an offered
    /// category and the round's questions are issued.
    ///
    /// Returns the key of the first pending question. If the bank cannot
    /// fill the round the match is aborted and the error returned.
    pub fn choose_category(&mut self, player: PlayerId, category: CategoryId) -> Result<QuestionKey, MatchError> {
        self.expect_phase("choose category", MatchPhase::CategorySelection)?;
        let seat = self.seat_of(player)?;
        if seat != self.chooser {
            return Err(MatchError::NotChooser);
        }
        let category = self.offered.iter()
            .find(|c| c.id == category)
            .cloned()
            .ok_or(MatchError::CategoryNotOffered(category))?;

        let questions = match self.deck.issue_questions(category.id, self.config.round_size, &mut self.rng) {
            Ok(questions) => questions,
            Err(e) => {
                self.abort(&e);
                return Err(e);
            }
        };

        let chooser = self.players[self.chooser.index()].id;
        self.emit(GameEventData::CategoryChosen {
            round: self.round_number,
            chooser,
            category: category.clone(),
        });

        let ids = [self.players[0].id, self.players[1].id];
        self.current = Some(Round::new(self.round_number, category, chooser, ids, questions));
        self.offered.clear();
        self.phase = MatchPhase::QuestionActive;

        let key = QuestionKey::new(self.round_number, 0);
        self.issue(key.index);
        Ok(key)
    }

    /// Resolve the pending question for `player` with a submitted choice.
    ///
    /// `elapsed` is the time since the question was issued, measured by the
    /// host; it only affects the speed bonus.
    pub fn submit_answer(
        &mut self,
        player: PlayerId,
        key: QuestionKey,
        choice: u8,
        elapsed: Duration,
    ) -> Result<AnswerOutcome, MatchError> {
        let index = self.check_key("submit answer", key)?;
        let seat = self.seat_of(player)?;

        let choices = self.current.as_ref()
            .and_then(|round| round.question(index))
            .map(|q| q.choice_count())
            .unwrap_or(0);
        if choice as usize >= choices {
            return Err(MatchError::InvalidChoice { choice, choices });
        }

        let resolution = self.resolve(seat, index, Some(choice), elapsed)?;
        let progress = self.after_resolution(index)?;

        Ok(AnswerOutcome {
            key,
            correct: resolution.correct,
            points: resolution.points,
            score: self.players[seat.index()].score,
            progress,
        })
    }

    /// Timer expiry for `key`: every participant who has not resolved it
    /// yet is resolved with a timeout.
    ///
    /// An expiry for a question that is no longer pending is stale and
    /// fails with [`MatchError::AlreadyAnswered`].
    pub fn expire_question(&mut self, key: QuestionKey) -> Result<ExpiryOutcome, MatchError> {
        let index = self.check_key("expire question", key)?;

        let seats = self.current.as_ref()
            .map(|round| round.unresolved_seats(index))
            .unwrap_or_default();

        let limit = self.config.question_time;
        let mut timed_out = Vec::with_capacity(seats.len());
        for seat in seats {
            self.resolve(seat, index, None, limit)?;
            timed_out.push(self.players[seat.index()].id);
        }

        let progress = self.after_resolution(index)?;
        Ok(ExpiryOutcome { key, timed_out, progress })
    }

    /// Leave `RoundResults`: the next round's selection, or game over after
    /// the last round.
    pub fn advance(&mut self) -> Result<MatchPhase, MatchError> {
        self.expect_phase("advance", MatchPhase::RoundResults)?;

        if self.round_number < self.config.total_rounds {
            self.round_number += 1;
            self.begin_selection()?;
        } else {
            let [first, second] = &self.players;
            let outcome = match first.score.cmp(&second.score) {
                std::cmp::Ordering::Greater => MatchOutcome::Winner { player_id: first.id },
                std::cmp::Ordering::Less => MatchOutcome::Winner { player_id: second.id },
                std::cmp::Ordering::Equal => MatchOutcome::Tie,
            };
            self.finish(outcome);
        }

        Ok(self.phase)
    }

    /// A participant leaves. Valid in every non-terminal phase.
    pub fn abandon(&mut self, player: PlayerId) -> Result<MatchOutcome, MatchError> {
        if let Some(MatchOutcome::Abandoned { by, .. }) = self.outcome {
            return Err(MatchError::ParticipantAbandoned(by));
        }
        if self.phase.is_terminal() {
            return Err(MatchError::InvalidStateTransition {
                action: "abandon",
                phase: self.phase,
            });
        }
        let seat = self.seat_of(player)?;

        let outcome = MatchOutcome::Abandoned {
            by: player,
            winner: self.players[seat.other().index()].id,
        };
        self.finish(outcome.clone());
        Ok(outcome)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Current phase.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Configuration.
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Current round ordinal (0 before start).
    pub fn round_number(&self) -> u32 {
        self.round_number
    }

    /// Both participants in seat order.
    pub fn players(&self) -> &[Player; 2] {
        &self.players
    }

    /// Participant ids in seat order.
    pub fn player_ids(&self) -> [PlayerId; 2] {
        [self.players[0].id, self.players[1].id]
    }

    /// Seat of a participant.
    pub fn seat_of(&self, player: PlayerId) -> Result<Seat, MatchError> {
        Seat::BOTH.into_iter()
            .find(|seat| self.players[seat.index()].id == player)
            .ok_or(MatchError::NotParticipant)
    }

    /// The participant opposite `player`.
    pub fn opponent_of(&self, player: PlayerId) -> Result<PlayerId, MatchError> {
        let seat = self.seat_of(player)?;
        Ok(self.players[seat.other().index()].id)
    }

    /// Cumulative score of a participant.
    pub fn score(&self, player: PlayerId) -> Result<u32, MatchError> {
        let seat = self.seat_of(player)?;
        Ok(self.players[seat.index()].score)
    }

    /// Both scores in seat order.
    pub fn scores(&self) -> Vec<PlayerScore> {
        self.players.iter()
            .map(|p| PlayerScore { player_id: p.id, score: p.score })
            .collect()
    }

    /// Chooser of the current round.
    pub fn chooser(&self) -> PlayerId {
        self.players[self.chooser.index()].id
    }

    /// Categories offered this round (empty outside `CategorySelection`).
    pub fn offered(&self) -> &[Category] {
        &self.offered
    }

    /// Key of the pending question.
    pub fn pending_key(&self) -> Option<QuestionKey> {
        self.pending.map(|index| QuestionKey::new(self.round_number, index))
    }

    /// Pending question without its answer key.
    pub fn pending_question(&self) -> Option<QuestionView> {
        let index = self.pending?;
        self.current.as_ref()?.question(index).map(|q| q.view())
    }

    /// Whether `player` has resolved the pending question.
    pub fn has_resolved_pending(&self, player: PlayerId) -> bool {
        match (self.pending, self.current.as_ref(), self.seat_of(player)) {
            (Some(index), Some(round), Ok(seat)) => round.resolution(seat, index).is_some(),
            _ => false,
        }
    }

    /// The round in progress, if any. Also holds the unfinished round of an
    /// abandoned match.
    pub fn current_round(&self) -> Option<&Round> {
        self.current.as_ref()
    }

    /// Sealed rounds in order.
    pub fn history(&self) -> &[Round] {
        &self.history
    }

    /// Terminal outcome.
    pub fn outcome(&self) -> Option<&MatchOutcome> {
        self.outcome.as_ref()
    }

    /// Catalog the offers are drawn from.
    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    /// Take the events emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Score recomputed from per-question points of every round.
    ///
    /// Always equal to the participant's cumulative score.
    pub fn score_from_rounds(&self, seat: Seat) -> u32 {
        self.history.iter()
            .chain(self.current.iter())
            .map(|round| round.points(seat))
            .sum()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn emit(&mut self, data: GameEventData) {
        let event = GameEvent::new(self.next_sequence, data);
        self.next_sequence += 1;
        self.events.push(event);
    }

    fn expect_phase(&self, action: &'static str, expected: MatchPhase) -> Result<(), MatchError> {
        if let Some(MatchOutcome::Abandoned { by, .. }) = self.outcome {
            return Err(MatchError::ParticipantAbandoned(by));
        }
        if self.phase != expected {
            return Err(MatchError::InvalidStateTransition {
                action,
                phase: self.phase,
            });
        }
        Ok(())
    }

    /// First question that is not fully resolved yet.
    fn frontier(&self) -> QuestionKey {
        match self.phase {
            MatchPhase::QuestionActive => {
                QuestionKey::new(self.round_number, self.pending.unwrap_or(0))
            }
            MatchPhase::RoundResults => QuestionKey::new(self.round_number + 1, 0),
            MatchPhase::CategorySelection => QuestionKey::new(self.round_number, 0),
            _ => QuestionKey::new(1, 0),
        }
    }

    /// Validate a question key against the pending question.
    fn check_key(&self, action: &'static str, key: QuestionKey) -> Result<usize, MatchError> {
        if let Some(MatchOutcome::Abandoned { by, .. }) = self.outcome {
            return Err(MatchError::ParticipantAbandoned(by));
        }
        if self.phase.is_terminal() {
            return Err(MatchError::InvalidStateTransition { action, phase: self.phase });
        }
        if key < self.frontier() {
            return Err(MatchError::AlreadyAnswered);
        }
        match self.pending_key() {
            Some(pending) if self.phase == MatchPhase::QuestionActive && pending == key => Ok(key.index),
            _ => Err(MatchError::InvalidStateTransition { action, phase: self.phase }),
        }
    }

    fn begin_selection(&mut self) -> Result<(), MatchError> {
        self.chooser = self.config.chooser.chooser_for(self.round_number);

        // Only categories that can still fill a whole round
        let round_size = self.config.round_size;
        let deck = &self.deck;
        let offer = match self.catalog.sample_categories_where(
            self.config.offer_count,
            &mut self.rng,
            |c| deck.remaining_in(c.id) >= round_size,
        ) {
            Ok(offer) => offer,
            Err(e) => {
                self.abort(&e);
                return Err(e);
            }
        };

        self.offered = offer.clone();
        self.phase = MatchPhase::CategorySelection;
        self.emit(GameEventData::CategoriesOffered {
            round: self.round_number,
            chooser: self.players[self.chooser.index()].id,
            categories: offer,
        });
        Ok(())
    }

    fn issue(&mut self, index: usize) {
        self.pending = Some(index);
        let view = self.current.as_ref()
            .and_then(|round| round.question(index))
            .map(|q| q.view());
        if let Some(question) = view {
            self.emit(GameEventData::QuestionIssued {
                key: QuestionKey::new(self.round_number, index),
                question,
                time_limit_ms: self.config.question_time.as_millis() as u64,
            });
        }
    }

    /// Record one participant's resolution and add its points.
    fn resolve(
        &mut self,
        seat: Seat,
        index: usize,
        choice: Option<u8>,
        elapsed: Duration,
    ) -> Result<Resolution, MatchError> {
        let round = self.current.as_mut().ok_or(MatchError::InvalidStateTransition {
            action: "resolve question",
            phase: self.phase,
        })?;
        let question = round.question(index).cloned().ok_or(MatchError::InvalidStateTransition {
            action: "resolve question",
            phase: self.phase,
        })?;

        let correct = is_correct(&question, choice);
        let points = self.config.scoring.points(correct, elapsed, self.config.question_time);
        let resolution = Resolution {
            choice,
            correct,
            points,
            elapsed_ms: elapsed.as_millis() as u64,
        };
        round.resolve(seat, index, resolution)?;

        let player = &mut self.players[seat.index()];
        player.score += points;
        let (player_id, score) = (player.id, player.score);

        self.emit(GameEventData::AnswerResolved {
            key: QuestionKey::new(self.round_number, index),
            player_id,
            correct,
            points,
            timed_out: choice.is_none(),
            score,
        });
        Ok(resolution)
    }

    /// Move on once both participants resolved question `index`.
    fn after_resolution(&mut self, index: usize) -> Result<Progress, MatchError> {
        let (resolved, len, correct_index) = match self.current.as_ref() {
            Some(round) => (
                round.is_question_resolved(index),
                round.len(),
                round.question(index).map(|q| q.correct_index).unwrap_or(0),
            ),
            None => return Ok(Progress::AwaitingOpponent),
        };
        if !resolved {
            return Ok(Progress::AwaitingOpponent);
        }

        self.emit(GameEventData::QuestionResolved {
            key: QuestionKey::new(self.round_number, index),
            correct_index,
        });

        if index + 1 < len {
            self.issue(index + 1);
            return Ok(Progress::NextQuestion(QuestionKey::new(self.round_number, index + 1)));
        }

        if let Some(mut round) = self.current.take() {
            if let Err(e) = round.seal() {
                self.current = Some(round);
                return Err(e);
            }
            let summary = round.summary();
            self.history.push(round);
            self.pending = None;
            self.phase = MatchPhase::RoundResults;
            let scores = self.scores();
            self.emit(GameEventData::RoundSealed { summary, scores });
        }
        Ok(Progress::RoundSealed)
    }

    fn abort(&mut self, error: &MatchError) {
        self.finish(MatchOutcome::Aborted { reason: error.to_string() });
    }

    fn finish(&mut self, outcome: MatchOutcome) {
        self.phase = MatchPhase::GameOver;
        self.pending = None;
        self.offered.clear();
        self.outcome = Some(outcome.clone());
        let scores = self.scores();
        self.emit(GameEventData::MatchEnded { outcome, scores });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::game::config::{ChooserPolicy, MatchType};
    use crate::game::question::{Difficulty, Question, TriviaContent};
    use crate::game::round::RoundOutcome;

    const A: PlayerId = PlayerId::new([1; 16]);
    const B: PlayerId = PlayerId::new([2; 16]);
    const OUTSIDER: PlayerId = PlayerId::new([9; 16]);

    /// Choice 0 is always correct, 1 always wrong.
    fn content(categories: u32, per_category: u32) -> (Arc<CategoryCatalog>, Arc<QuestionBank>) {
        let names: Vec<String> = (1..=categories).map(|i| format!("Cat{}", i)).collect();
        let catalog = CategoryCatalog::from_names(&names);
        let mut questions = Vec::new();
        let mut id = 1;
        for c in 1..=categories {
            for _ in 0..per_category {
                questions.push(Question::new(
                    id,
                    format!("Q{}", id),
                    vec!["right".into(), "wrong".into(), "other".into()],
                    0,
                    CategoryId(c),
                    Difficulty::Medium,
                ).unwrap());
                id += 1;
            }
        }
        let bank = QuestionBank::new(questions, &catalog).unwrap();
        (Arc::new(catalog), Arc::new(bank))
    }

    fn new_match(config: MatchConfig) -> MatchState {
        let (catalog, bank) = content(5, 40);
        MatchState::new(
            [Player::new(A, "alice", None), Player::new(B, "bob", None)],
            config,
            catalog,
            bank,
            DeterministicRng::new(42),
        )
    }

    fn three_question_config(rounds: u32) -> MatchConfig {
        MatchConfig {
            total_rounds: rounds,
            round_size: 3,
            ..MatchConfig::default()
        }
    }

    fn pick_category(state: &mut MatchState) -> QuestionKey {
        let chooser = state.chooser();
        let category = state.offered()[0].id;
        state.choose_category(chooser, category).unwrap()
    }

    /// Play one round. `None` means the participant lets the timer run out.
    fn play_round(state: &mut MatchState, a: &[Option<bool>], b: &[Option<bool>]) {
        pick_category(state);
        for (qa, qb) in a.iter().zip(b.iter()) {
            let key = state.pending_key().unwrap();
            let secs = Duration::from_secs(2);
            if let Some(correct) = qa {
                state.submit_answer(A, key, if *correct { 0 } else { 1 }, secs).unwrap();
            }
            if let Some(correct) = qb {
                state.submit_answer(B, key, if *correct { 0 } else { 1 }, secs).unwrap();
            }
            if qa.is_none() || qb.is_none() {
                state.expire_question(key).unwrap();
            }
        }
        assert_eq!(state.phase(), MatchPhase::RoundResults);
    }

    #[test]
    fn test_start_offers_categories() {
        let mut state = new_match(MatchConfig::default());
        assert_eq!(state.phase(), MatchPhase::Matchmaking);

        state.start().unwrap();
        assert_eq!(state.phase(), MatchPhase::CategorySelection);
        assert_eq!(state.round_number(), 1);
        assert_eq!(state.offered().len(), 3);
        assert_eq!(state.chooser(), A);

        let events = state.drain_events();
        assert!(matches!(events[0].data, GameEventData::MatchStarted { .. }));
        assert!(matches!(events[1].data, GameEventData::CategoriesOffered { round: 1, .. }));
        assert!(state.drain_events().is_empty());
    }

    #[test]
    fn test_choose_category_outside_selection_rejected() {
        let mut state = new_match(MatchConfig::default());
        let result = state.choose_category(A, CategoryId(1));
        assert_eq!(result, Err(MatchError::InvalidStateTransition {
            action: "choose category",
            phase: MatchPhase::Matchmaking,
        }));

        state.start().unwrap();
        let key = pick_category(&mut state);
        assert_eq!(key, QuestionKey::new(1, 0));

        let before = state.pending_key();
        let result = state.choose_category(A, CategoryId(1));
        assert!(matches!(result, Err(MatchError::InvalidStateTransition { phase: MatchPhase::QuestionActive, .. })));
        assert_eq!(state.pending_key(), before);
        assert_eq!(state.phase(), MatchPhase::QuestionActive);
    }

    #[test]
    fn test_choose_category_validation() {
        let mut state = new_match(MatchConfig::default());
        state.start().unwrap();
        let offered = state.offered()[0].id;
        let not_offered = state.catalog().iter()
            .map(|c| c.id)
            .find(|id| !state.offered().iter().any(|o| o.id == *id))
            .unwrap();

        assert_eq!(state.choose_category(B, offered), Err(MatchError::NotChooser));
        assert_eq!(state.choose_category(OUTSIDER, offered), Err(MatchError::NotParticipant));
        assert_eq!(state.choose_category(A, not_offered), Err(MatchError::CategoryNotOffered(not_offered)));
        assert_eq!(state.phase(), MatchPhase::CategorySelection);

        assert!(state.choose_category(A, offered).is_ok());
        assert_eq!(state.current_round().unwrap().len(), 3);
    }

    #[test]
    fn test_round_correctness_and_points() {
        let mut state = new_match(three_question_config(2));
        state.start().unwrap();

        // A: correct, incorrect, timeout
        play_round(&mut state, &[Some(true), Some(false), None], &[Some(false), Some(false), Some(false)]);
        let round = &state.history()[0];
        assert_eq!(round.correctness(Seat::First), vec![true, false, false]);
        assert_eq!(round.points(Seat::First), 10);
        assert_eq!(state.score(A).unwrap(), 10);

        state.advance().unwrap();
        play_round(&mut state, &[Some(true), Some(false), None], &[Some(false), Some(false), Some(false)]);
        assert_eq!(state.score(A).unwrap(), 20);
        assert_eq!(state.score_from_rounds(Seat::First), 20);
        assert_eq!(state.score(B).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_submission_rejected() {
        let mut state = new_match(MatchConfig::default());
        state.start().unwrap();
        let key = pick_category(&mut state);

        let first = state.submit_answer(A, key, 0, Duration::from_secs(1)).unwrap();
        assert!(first.correct);
        assert_eq!(first.points, 10);
        assert_eq!(first.progress, Progress::AwaitingOpponent);

        let again = state.submit_answer(A, key, 0, Duration::from_secs(2));
        assert_eq!(again, Err(MatchError::AlreadyAnswered));
        assert_eq!(state.score(A).unwrap(), 10);
    }

    #[test]
    fn test_both_answers_advance_question() {
        let mut state = new_match(MatchConfig::default());
        state.start().unwrap();
        let key = pick_category(&mut state);
        state.drain_events();

        state.submit_answer(A, key, 1, Duration::from_secs(1)).unwrap();
        let outcome = state.submit_answer(B, key, 0, Duration::from_secs(1)).unwrap();
        assert_eq!(outcome.progress, Progress::NextQuestion(QuestionKey::new(1, 1)));
        assert_eq!(state.pending_key(), Some(QuestionKey::new(1, 1)));

        // Answer is revealed only once both resolved
        let events = state.drain_events();
        let reveal = events.iter()
            .position(|e| matches!(e.data, GameEventData::QuestionResolved { .. }))
            .unwrap();
        let resolutions = events.iter()
            .filter(|e| matches!(e.data, GameEventData::AnswerResolved { .. }))
            .count();
        assert_eq!(resolutions, 2);
        assert_eq!(reveal, 2);
    }

    #[test]
    fn test_expiry_resolves_remaining_as_timeout() {
        let mut state = new_match(MatchConfig::default());
        state.start().unwrap();
        let key = pick_category(&mut state);

        state.submit_answer(A, key, 0, Duration::from_secs(1)).unwrap();
        let expiry = state.expire_question(key).unwrap();
        assert_eq!(expiry.timed_out, vec![B]);
        assert_eq!(expiry.progress, Progress::NextQuestion(QuestionKey::new(1, 1)));

        let resolution = state.current_round().unwrap().resolution(Seat::Second, 0).unwrap();
        assert!(resolution.timed_out());
        assert_eq!(resolution.points, 0);

        // Answer arriving after the timeout lost the race
        assert_eq!(state.submit_answer(B, key, 0, Duration::from_secs(20)), Err(MatchError::AlreadyAnswered));
    }

    #[test]
    fn test_stale_expiry_rejected() {
        let mut state = new_match(MatchConfig::default());
        state.start().unwrap();
        let key = pick_category(&mut state);

        state.submit_answer(A, key, 0, Duration::from_secs(1)).unwrap();
        state.submit_answer(B, key, 0, Duration::from_secs(1)).unwrap();

        assert_eq!(state.expire_question(key), Err(MatchError::AlreadyAnswered));
        assert_eq!(state.score(A).unwrap(), 10);
        assert_eq!(state.score(B).unwrap(), 10);
    }

    #[test]
    fn test_question_keys() {
        let mut state = new_match(three_question_config(2));
        state.start().unwrap();
        play_round(&mut state, &[Some(true); 3], &[Some(true); 3]);

        // Sealed round: too late
        let late = state.submit_answer(A, QuestionKey::new(1, 2), 0, Duration::ZERO);
        assert_eq!(late, Err(MatchError::AlreadyAnswered));

        // Nothing pending during results
        let early = state.submit_answer(A, QuestionKey::new(2, 0), 0, Duration::ZERO);
        assert!(matches!(early, Err(MatchError::InvalidStateTransition { phase: MatchPhase::RoundResults, .. })));

        state.advance().unwrap();
        let key = pick_category(&mut state);
        let future = state.submit_answer(A, QuestionKey::new(2, 1), 0, Duration::ZERO);
        assert!(matches!(future, Err(MatchError::InvalidStateTransition { .. })));
        assert!(state.submit_answer(A, key, 0, Duration::ZERO).is_ok());
    }

    #[test]
    fn test_invalid_choice() {
        let mut state = new_match(MatchConfig::default());
        state.start().unwrap();
        let key = pick_category(&mut state);

        assert_eq!(
            state.submit_answer(A, key, 3, Duration::ZERO),
            Err(MatchError::InvalidChoice { choice: 3, choices: 3 })
        );
        assert!(!state.has_resolved_pending(A));
        assert_eq!(state.submit_answer(OUTSIDER, key, 0, Duration::ZERO), Err(MatchError::NotParticipant));
    }

    #[test]
    fn test_chooser_alternates() {
        let mut state = new_match(three_question_config(3));
        state.start().unwrap();
        assert_eq!(state.chooser(), A);
        play_round(&mut state, &[Some(true); 3], &[Some(true); 3]);
        state.advance().unwrap();
        assert_eq!(state.chooser(), B);
        play_round(&mut state, &[Some(true); 3], &[Some(true); 3]);
        state.advance().unwrap();
        assert_eq!(state.chooser(), A);
        assert_eq!(state.history()[1].chooser, B);
    }

    #[test]
    fn test_fixed_chooser() {
        let mut state = new_match(MatchConfig {
            chooser: ChooserPolicy::Fixed(Seat::Second),
            ..three_question_config(2)
        });
        state.start().unwrap();
        assert_eq!(state.chooser(), B);
        play_round(&mut state, &[Some(true); 3], &[Some(true); 3]);
        state.advance().unwrap();
        assert_eq!(state.chooser(), B);
    }

    #[test]
    fn test_points_decide_match_not_round_wins() {
        let mut state = new_match(three_question_config(5));
        state.start().unwrap();

        // A wins rounds 1-3 by one answer each
        for _ in 0..3 {
            play_round(&mut state, &[Some(true), Some(true), Some(false)], &[Some(true), Some(false), Some(false)]);
            state.advance().unwrap();
        }
        // B sweeps rounds 4-5
        play_round(&mut state, &[Some(false); 3], &[Some(true); 3]);
        state.advance().unwrap();
        play_round(&mut state, &[None; 3], &[Some(true); 3]);

        let round_wins_a = state.history().iter()
            .filter(|r| r.outcome() == RoundOutcome::Winner(A))
            .count();
        assert_eq!(round_wins_a, 3);

        assert_eq!(state.advance().unwrap(), MatchPhase::GameOver);
        assert_eq!(state.score(A).unwrap(), 60);
        assert_eq!(state.score(B).unwrap(), 90);
        assert_eq!(state.outcome(), Some(&MatchOutcome::Winner { player_id: B }));
    }

    #[test]
    fn test_equal_scores_tie() {
        let mut state = new_match(MatchType::Quick.config());
        state.start().unwrap();
        for round in 1..=3 {
            play_round(&mut state, &[Some(true), Some(false), None], &[None, Some(true), Some(false)]);
            let phase = state.advance().unwrap();
            if round < 3 {
                assert_eq!(phase, MatchPhase::CategorySelection);
            }
        }
        assert_eq!(state.phase(), MatchPhase::GameOver);
        assert_eq!(state.outcome(), Some(&MatchOutcome::Tie));
        assert_eq!(state.advance(), Err(MatchError::InvalidStateTransition {
            action: "advance",
            phase: MatchPhase::GameOver,
        }));
    }

    #[test]
    fn test_abandon_mid_question() {
        let mut state = new_match(MatchConfig::default());
        state.start().unwrap();
        let key = pick_category(&mut state);
        state.submit_answer(A, key, 0, Duration::from_secs(1)).unwrap();

        let outcome = state.abandon(B).unwrap();
        assert_eq!(outcome, MatchOutcome::Abandoned { by: B, winner: A });
        assert_eq!(state.phase(), MatchPhase::GameOver);
        assert_eq!(state.pending_key(), None);

        assert_eq!(state.submit_answer(B, key, 0, Duration::ZERO), Err(MatchError::ParticipantAbandoned(B)));
        assert_eq!(state.expire_question(key), Err(MatchError::ParticipantAbandoned(B)));
        assert_eq!(state.abandon(A), Err(MatchError::ParticipantAbandoned(B)));

        let last = state.drain_events().pop().unwrap();
        assert!(last.is_terminal());
        assert_eq!(last.player_id, Some(A));
    }

    #[test]
    fn test_abandon_before_start() {
        let mut state = new_match(MatchConfig::default());
        assert!(state.abandon(A).is_ok());
        assert_eq!(state.start(), Err(MatchError::ParticipantAbandoned(A)));
        assert_eq!(state.abandon(OUTSIDER), Err(MatchError::ParticipantAbandoned(A)));
    }

    #[test]
    fn test_insufficient_categories_aborts() {
        let (catalog, bank) = content(2, 10);
        let mut state = MatchState::new(
            [Player::new(A, "alice", None), Player::new(B, "bob", None)],
            MatchConfig::default(),
            catalog,
            bank,
            DeterministicRng::new(1),
        );

        assert_eq!(state.start(), Err(MatchError::InsufficientCategories { requested: 3, available: 2 }));
        assert_eq!(state.phase(), MatchPhase::GameOver);
        assert!(matches!(state.outcome(), Some(MatchOutcome::Aborted { .. })));
    }

    #[test]
    fn test_offer_skips_used_up_categories() {
        let (catalog, bank) = content(4, 4);
        let mut state = MatchState::new(
            [Player::new(A, "alice", None), Player::new(B, "bob", None)],
            three_question_config(3),
            catalog,
            bank,
            DeterministicRng::new(1),
        );
        state.start().unwrap();
        let first = state.offered()[0].id;

        let all = [Some(true), Some(true), Some(true)];
        play_round(&mut state, &all, &all);
        state.advance().unwrap();
        assert_eq!(state.offered().len(), 3);
        assert!(state.offered().iter().all(|c| c.id != first));

        // Two categories left with a full round each
        play_round(&mut state, &all, &all);
        let result = state.advance();
        assert_eq!(result, Err(MatchError::InsufficientCategories { requested: 3, available: 2 }));
        assert_eq!(state.phase(), MatchPhase::GameOver);
        assert_eq!(state.outcome().unwrap().label(), "aborted");
        assert!(state.outcome().unwrap().winner().is_none());
    }

    #[test]
    fn test_bundled_content_plays_marathon() {
        let content = TriviaContent::bundled(3).unwrap();
        let catalog = Arc::new(content.catalog);
        let bank = Arc::new(content.bank);

        for seed in 0..50u64 {
            let mut state = MatchState::new(
                [Player::new(A, "alice", None), Player::new(B, "bob", None)],
                MatchType::Marathon.config(),
                Arc::clone(&catalog),
                Arc::clone(&bank),
                DeterministicRng::new(seed),
            );
            state.start().unwrap();

            let answers = vec![Some(true); 10];
            for round in 1..=5 {
                assert_eq!(state.round_number(), round);
                play_round(&mut state, &answers, &answers);
                state.advance().unwrap();
            }
            assert_eq!(state.phase(), MatchPhase::GameOver);
            assert_eq!(state.outcome(), Some(&MatchOutcome::Tie));
        }
    }

    #[test]
    fn test_speed_bonus_applied() {
        let mut config = MatchConfig::default();
        config.scoring.speed_bonus = Some(10);
        let mut state = new_match(config);
        state.start().unwrap();
        let key = pick_category(&mut state);

        let fast = state.submit_answer(A, key, 0, Duration::ZERO).unwrap();
        assert_eq!(fast.points, 20);
        let wrong = state.submit_answer(B, key, 1, Duration::ZERO).unwrap();
        assert_eq!(wrong.points, 0);
    }

    fn resolution_strategy() -> impl Strategy<Value = Option<bool>> {
        prop_oneof![Just(None), Just(Some(true)), Just(Some(false))]
    }

    proptest! {
        #[test]
        fn prop_score_equals_sum_of_deltas(
            a in proptest::collection::vec(resolution_strategy(), 9),
            b in proptest::collection::vec(resolution_strategy(), 9),
        ) {
            let mut state = new_match(MatchType::Quick.config());
            state.start().unwrap();

            for round in 0..3 {
                let range = round * 3..round * 3 + 3;
                play_round(&mut state, &a[range.clone()], &b[range]);
                state.advance().unwrap();
            }

            prop_assert_eq!(state.phase(), MatchPhase::GameOver);
            prop_assert_eq!(state.history().len(), 3);
            for seat in Seat::BOTH {
                prop_assert_eq!(state.players()[seat.index()].score, state.score_from_rounds(seat));
                for round in state.history() {
                    prop_assert_eq!(round.correctness(seat).len(), 3);
                }
            }

            let expected_a = a.iter().filter(|r| **r == Some(true)).count() as u32 * 10;
            prop_assert_eq!(state.score(A).unwrap(), expected_a);
        }
    }
}
