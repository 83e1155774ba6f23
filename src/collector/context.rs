//! Deadline and cancellation state for a single scrape.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Bounds passed to every data source call of one scrape.
///
/// Source implementations use [`ScrapeContext::call_timeout`] to bound each
/// blocking call. The collector checks [`ScrapeContext::is_cancelled`] between
/// databases and collections and stops early once it returns `true`.
#[derive(Debug, Clone)]
pub struct ScrapeContext {
    started: Instant,
    deadline: Option<Instant>,
    query_timeout: Option<Duration>,
    shutdown: Arc<AtomicBool>,
}

impl ScrapeContext {
    /// Creates a context without deadline that is cancelled through `shutdown`.
    pub fn new(shutdown: Arc<AtomicBool>) -> Self {
        Self {
            started: Instant::now(),
            deadline: None,
            query_timeout: None,
            shutdown,
        }
    }

    /// Creates a context with no deadline and its own cancellation flag.
    pub fn unbounded() -> Self {
        Self::new(Arc::new(AtomicBool::new(false)))
    }

    /// Sets the overall scrape deadline, measured from now.
    pub fn with_deadline(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    /// Sets the upper bound for a single source call.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Requests cancellation of the scrape (and every context sharing the flag).
    pub fn cancel(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Returns `true` once cancelled externally or past the deadline.
    pub fn is_cancelled(&self) -> bool {
        self.shutdown.load(Ordering::Acquire) || self.deadline_exceeded()
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Time left until the deadline, `None` if the scrape is unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Timeout to apply to the next source call.
    ///
    /// The smaller of the per-query timeout and the time remaining until the
    /// deadline. `None` means the call is unbounded.
    pub fn call_timeout(&self) -> Option<Duration> {
        match (self.query_timeout, self.remaining()) {
            (Some(query), Some(remaining)) => Some(query.min(remaining)),
            (query, remaining) => query.or(remaining),
        }
    }

    /// Time since the scrape started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
