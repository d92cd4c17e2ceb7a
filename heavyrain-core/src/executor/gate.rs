use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Shared iteration budget and deadline for all workers of a run.
///
/// With neither limit set the gate never closes, and the run lasts until cancelled.
#[derive(Debug)]
pub struct IterationGate {
    counter: AtomicU64,
    iterations: Option<u64>,
    duration: Option<Duration>,
    deadline: OnceLock<Instant>,
}

impl IterationGate {
    pub fn new(iterations: Option<u64>, duration: Option<Duration>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            iterations,
            duration,
            deadline: OnceLock::new(),
        }
    }

    pub fn start_at(&self, started: Instant) {
        if let Some(duration) = self.duration {
            let _ = self.deadline.set(started + duration);
        }
    }

    pub fn start(&self) {
        self.start_at(Instant::now());
    }

    /// Claims the next iteration. Returns false once the budget is spent or time is up.
    pub fn next(&self) -> bool {
        if self.duration.is_some() {
            let now = Instant::now();
            if self.deadline.get().is_none() {
                self.start_at(now);
            }
            if let Some(deadline) = self.deadline.get()
                && now >= *deadline
            {
                return false;
            }
        }

        if let Some(total) = self.iterations {
            let idx = self.counter.fetch_add(1, Ordering::Relaxed);
            if idx >= total {
                return false;
            }
        }

        true
    }

    /// Time left before the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .get()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}
