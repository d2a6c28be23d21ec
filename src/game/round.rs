//! Rounds
//!
//! One category-scoped batch of questions and both participants'
//! resolutions for it.

use std::sync::Arc;
use serde::{Serialize, Deserialize};

use crate::game::catalog::{Category, CategoryId};
use crate::game::error::MatchError;
use crate::game::question::Question;
use crate::game::state::{MatchPhase, PlayerId, Seat};

/// How one participant's question was resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Submitted choice, `None` on timeout.
    pub choice: Option<u8>,
    /// Whether the choice was correct.
    pub correct: bool,
    /// Points awarded.
    pub points: u32,
    /// Time from question issue to resolution.
    pub elapsed_ms: u64,
}

impl Resolution {
    /// Timeout resolution: never correct, never scores.
    pub fn timeout(elapsed_ms: u64) -> Self {
        Self {
            choice: None,
            correct: false,
            points: 0,
            elapsed_ms,
        }
    }

    /// Whether the question ran out of time for this participant.
    pub fn timed_out(&self) -> bool {
        self.choice.is_none()
    }
}

/// Display-only result of a single round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "player", rename_all = "snake_case")]
pub enum RoundOutcome {
    /// More correct answers than the opponent.
    Winner(PlayerId),
    /// Same number of correct answers.
    Tied,
}

/// One round of a match.
#[derive(Clone, Debug)]
pub struct Round {
    /// Ordinal, starting at 1.
    pub number: u32,
    /// Chosen category.
    pub category: Category,
    /// Participant who chose the category.
    pub chooser: PlayerId,
    players: [PlayerId; 2],
    questions: Vec<Arc<Question>>,
    resolutions: [Vec<Option<Resolution>>; 2],
    sealed: bool,
}

impl Round {
    /// Create an open round for the issued questions.
    pub fn new(
        number: u32,
        category: Category,
        chooser: PlayerId,
        players: [PlayerId; 2],
        questions: Vec<Arc<Question>>,
    ) -> Self {
        let len = questions.len();
        Self {
            number,
            category,
            chooser,
            players,
            questions,
            resolutions: [vec![None; len], vec![None; len]],
            sealed: false,
        }
    }

    /// Issued questions in order.
    pub fn questions(&self) -> &[Arc<Question>] {
        &self.questions
    }

    /// Question at `index`.
    pub fn question(&self, index: usize) -> Option<&Arc<Question>> {
        self.questions.get(index)
    }

    /// Number of questions in the round.
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Whether the round has no questions.
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// A participant's resolution of one question.
    pub fn resolution(&self, seat: Seat, index: usize) -> Option<&Resolution> {
        self.resolutions[seat.index()].get(index).and_then(Option::as_ref)
    }

    /// Record a participant's resolution. At most once per question.
    pub fn resolve(&mut self, seat: Seat, index: usize, resolution: Resolution) -> Result<(), MatchError> {
        if self.sealed {
            return Err(MatchError::AlreadyAnswered);
        }
        let slot = self.resolutions[seat.index()]
            .get_mut(index)
            .ok_or(MatchError::InvalidStateTransition {
                action: "answer",
                phase: MatchPhase::QuestionActive,
            })?;
        if slot.is_some() {
            return Err(MatchError::AlreadyAnswered);
        }
        *slot = Some(resolution);
        Ok(())
    }

    /// Seats that have not resolved question `index` yet.
    pub fn unresolved_seats(&self, index: usize) -> Vec<Seat> {
        Seat::BOTH.into_iter()
            .filter(|seat| self.resolution(*seat, index).is_none())
            .collect()
    }

    /// Whether both participants resolved question `index`.
    pub fn is_question_resolved(&self, index: usize) -> bool {
        self.unresolved_seats(index).is_empty()
    }

    /// Whether every question is resolved for both participants.
    pub fn is_complete(&self) -> bool {
        self.resolutions.iter().all(|v| v.iter().all(Option::is_some))
    }

    /// Seal the round. Fails while any question is unresolved.
    pub fn seal(&mut self) -> Result<(), MatchError> {
        if !self.is_complete() {
            return Err(MatchError::InvalidStateTransition {
                action: "seal round",
                phase: MatchPhase::QuestionActive,
            });
        }
        self.sealed = true;
        Ok(())
    }

    /// Whether the round is sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Correctness vector in question order. Unresolved entries read as false.
    pub fn correctness(&self, seat: Seat) -> Vec<bool> {
        self.resolutions[seat.index()]
            .iter()
            .map(|r| r.map(|r| r.correct).unwrap_or(false))
            .collect()
    }

    /// Correct answers for a participant.
    pub fn correct_count(&self, seat: Seat) -> usize {
        self.resolutions[seat.index()]
            .iter()
            .filter(|r| r.map(|r| r.correct).unwrap_or(false))
            .count()
    }

    /// Points a participant earned in this round.
    pub fn points(&self, seat: Seat) -> u32 {
        self.resolutions[seat.index()]
            .iter()
            .flatten()
            .map(|r| r.points)
            .sum()
    }

    /// Round winner by correct-answer count.
    pub fn outcome(&self) -> RoundOutcome {
        let first = self.correct_count(Seat::First);
        let second = self.correct_count(Seat::Second);
        match first.cmp(&second) {
            std::cmp::Ordering::Greater => RoundOutcome::Winner(self.players[0]),
            std::cmp::Ordering::Less => RoundOutcome::Winner(self.players[1]),
            std::cmp::Ordering::Equal => RoundOutcome::Tied,
        }
    }

    /// Serializable summary for clients and reports.
    pub fn summary(&self) -> RoundSummary {
        RoundSummary {
            number: self.number,
            category: self.category.id,
            category_name: self.category.name.clone(),
            chooser: self.chooser,
            players: Seat::BOTH.into_iter()
                .map(|seat| PlayerRoundSummary {
                    player_id: self.players[seat.index()],
                    correct: self.correctness(seat),
                    points: self.points(seat),
                })
                .collect(),
            outcome: self.outcome(),
        }
    }
}

/// One participant's line in a round summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRoundSummary {
    /// Participant.
    pub player_id: PlayerId,
    /// Correctness vector in question order.
    pub correct: Vec<bool>,
    /// Points earned in the round.
    pub points: u32,
}

/// Round summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    /// Round ordinal.
    pub number: u32,
    /// Category id.
    pub category: CategoryId,
    /// Category name.
    pub category_name: String,
    /// Who chose the category.
    pub chooser: PlayerId,
    /// Per-participant results, in seat order.
    pub players: Vec<PlayerRoundSummary>,
    /// Round winner or tie.
    pub outcome: RoundOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::question::Difficulty;

    const A: PlayerId = PlayerId::new([1; 16]);
    const B: PlayerId = PlayerId::new([2; 16]);

    fn round(size: u32) -> Round {
        let questions = (1..=size)
            .map(|i| Arc::new(Question::new(
                i,
                format!("Q{}", i),
                vec!["a".into(), "b".into()],
                0,
                CategoryId(1),
                Difficulty::Easy,
            ).unwrap()))
            .collect();
        Round::new(1, Category::new(1, "Science", "", ""), A, [A, B], questions)
    }

    fn answered(correct: bool, points: u32) -> Resolution {
        Resolution {
            choice: Some(if correct { 0 } else { 1 }),
            correct,
            points,
            elapsed_ms: 1000,
        }
    }

    #[test]
    fn test_resolve_once() {
        let mut r = round(3);
        r.resolve(Seat::First, 0, answered(true, 10)).unwrap();
        assert_eq!(r.resolve(Seat::First, 0, answered(false, 0)), Err(MatchError::AlreadyAnswered));
        assert_eq!(r.resolution(Seat::First, 0).unwrap().points, 10);

        // Other seat is independent
        assert!(r.resolve(Seat::Second, 0, answered(false, 0)).is_ok());
        assert!(r.is_question_resolved(0));
    }

    #[test]
    fn test_cannot_seal_incomplete() {
        let mut r = round(2);
        r.resolve(Seat::First, 0, answered(true, 10)).unwrap();
        r.resolve(Seat::Second, 0, answered(true, 10)).unwrap();
        r.resolve(Seat::First, 1, answered(true, 10)).unwrap();

        assert!(r.seal().is_err());
        assert_eq!(r.unresolved_seats(1), vec![Seat::Second]);

        r.resolve(Seat::Second, 1, Resolution::timeout(15_000)).unwrap();
        assert!(r.seal().is_ok());
        assert!(r.is_sealed());
        assert_eq!(r.resolve(Seat::Second, 1, answered(true, 10)), Err(MatchError::AlreadyAnswered));
    }

    #[test]
    fn test_vector_and_points() {
        let mut r = round(3);
        r.resolve(Seat::First, 0, answered(true, 10)).unwrap();
        r.resolve(Seat::First, 1, answered(false, 0)).unwrap();
        r.resolve(Seat::First, 2, Resolution::timeout(15_000)).unwrap();

        assert_eq!(r.correctness(Seat::First), vec![true, false, false]);
        assert_eq!(r.points(Seat::First), 10);
        assert!(r.resolution(Seat::First, 2).unwrap().timed_out());
    }

    #[test]
    fn test_outcome() {
        let mut r = round(2);
        for i in 0..2 {
            r.resolve(Seat::First, i, answered(true, 10)).unwrap();
            r.resolve(Seat::Second, i, answered(i == 0, if i == 0 { 10 } else { 0 })).unwrap();
        }
        assert_eq!(r.outcome(), RoundOutcome::Winner(A));

        let mut tied = round(1);
        tied.resolve(Seat::First, 0, answered(false, 0)).unwrap();
        tied.resolve(Seat::Second, 0, Resolution::timeout(15_000)).unwrap();
        assert_eq!(tied.outcome(), RoundOutcome::Tied);

        let summary = tied.summary();
        assert_eq!(summary.players.len(), 2);
        assert_eq!(summary.players[1].player_id, B);
        assert_eq!(summary.players[1].correct, vec![false]);
    }
}
