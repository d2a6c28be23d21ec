//! Round Timer
//!
//! Cancellable countdowns owned by a hosted session. When a timer runs out
//! it sends a [`TimerSignal`] to the arbiter; cancelling aborts the task,
//! and cancelling a timer that already fired does nothing.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

use crate::game::state::QuestionKey;
use crate::network::session::SessionId;

/// What a timer was counting down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// Time limit of one question.
    Question(QuestionKey),
    /// Pause after a round's results.
    Intermission {
        /// Round whose results are showing.
        round: u32,
    },
}

/// Sent to the arbiter when a timer runs out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerSignal {
    /// Session the timer belongs to.
    pub session_id: SessionId,
    /// What expired.
    pub kind: TimerKind,
}

/// A running countdown. Dropping it cancels it.
#[derive(Debug)]
pub struct RoundTimer {
    started_at: Instant,
    duration: Duration,
    handle: JoinHandle<()>,
}

impl RoundTimer {
    /// Start a countdown that sends `signal` on `tx` after `duration`.
    pub fn start(
        duration: Duration,
        signal: TimerSignal,
        tx: mpsc::UnboundedSender<TimerSignal>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trace!(kind = ?signal.kind, "timer fired");
            // Receiver gone means the arbiter is shutting down
            let _ = tx.send(signal);
        });

        Self {
            started_at: Instant::now(),
            duration,
            handle,
        }
    }

    /// Time since the timer started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Time left before expiry, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.elapsed())
    }

    /// Stop the countdown. No-op if it already fired.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
