//! Matchmaking Queue
//!
//! First-come, first-served pairing per match type. The queue itself is
//! synchronous; the arbiter holds it behind one mutex so a participant can
//! never be paired twice.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

use crate::game::config::MatchType;
use crate::game::state::{Player, PlayerId};

/// A participant waiting for an opponent.
#[derive(Clone, Debug)]
pub struct QueueEntry {
    /// Who is waiting.
    pub player: Player,
    /// Requested match type.
    pub match_type: MatchType,
    /// When they joined the queue.
    pub queued_at: Instant,
}

/// Result of joining the queue.
#[derive(Clone, Debug)]
pub enum QueueOutcome {
    /// Still waiting; 1-based position in the match type's queue.
    Waiting {
        /// Position in the queue.
        position: usize,
    },
    /// Paired with the longest-waiting compatible participant.
    Paired {
        /// Earlier of the two (seat `First`).
        first: QueueEntry,
        /// The requester.
        second: QueueEntry,
    },
}

/// Waiting participants, one FIFO queue per match type.
#[derive(Debug, Default)]
pub struct Matchmaker {
    queues: BTreeMap<MatchType, VecDeque<QueueEntry>>,
}

impl Matchmaker {
    /// Empty matchmaker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the queue, or pair with whoever has waited longest.
    ///
    /// A participant already waiting for the same match type keeps their
    /// place; waiting for a different type moves them to that queue.
    pub fn enqueue(&mut self, player: Player, match_type: MatchType) -> QueueOutcome {
        if let Some((queued_type, position)) = self.position_of(player.id) {
            if queued_type == match_type {
                return QueueOutcome::Waiting { position };
            }
            self.cancel(player.id);
        }

        let entry = QueueEntry {
            player,
            match_type,
            queued_at: Instant::now(),
        };

        let queue = self.queues.entry(match_type).or_default();
        match queue.pop_front() {
            Some(first) => QueueOutcome::Paired { first, second: entry },
            None => {
                queue.push_back(entry);
                QueueOutcome::Waiting { position: 1 }
            }
        }
    }

    /// Leave the queue. Returns the removed entry.
    pub fn cancel(&mut self, player: PlayerId) -> Option<QueueEntry> {
        for queue in self.queues.values_mut() {
            if let Some(idx) = queue.iter().position(|e| e.player.id == player) {
                return queue.remove(idx);
            }
        }
        None
    }

    /// Queue and 1-based position of a waiting participant.
    pub fn position_of(&self, player: PlayerId) -> Option<(MatchType, usize)> {
        self.queues.iter().find_map(|(match_type, queue)| {
            queue.iter()
                .position(|e| e.player.id == player)
                .map(|idx| (*match_type, idx + 1))
        })
    }

    /// Remove entries that have waited longer than `max_wait`.
    pub fn expire_stale(&mut self, max_wait: Duration) -> Vec<QueueEntry> {
        let now = Instant::now();
        let mut expired = Vec::new();
        for queue in self.queues.values_mut() {
            let (stale, fresh): (Vec<_>, Vec<_>) = queue.drain(..)
                .partition(|e| now.duration_since(e.queued_at) > max_wait);
            expired.extend(stale);
            queue.extend(fresh);
        }
        expired
    }

    /// Participants waiting across all match types.
    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    /// Whether nobody is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
