//! Worker counters for the /health endpoint.
//! Updated by the orchestrator, read by the API.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::error::AppError;

#[derive(Default)]
pub struct HealthState {
    /// Workers (processes or tasks) currently running.
    pub in_flight: AtomicU64,
    pub completed: AtomicU64,
    /// Runs that ended in a process-level failure (timeout, crash, no payload).
    pub failed: AtomicU64,
    pub timeouts: AtomicU64,
}

pub struct InFlight<'a>(&'a HealthState);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WorkerCounters {
    pub in_flight: u64,
    pub completed: u64,
    pub failed: u64,
    pub timeouts: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a run as in flight until the returned guard drops, which also
    /// covers runs cancelled with their request.
    pub fn worker_started(&self) -> InFlight<'_> {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlight(self)
    }

    /// Record how a run ended. Domain errors (unknown player, upstream outage)
    /// count as completed runs.
    pub fn worker_finished<T>(&self, result: &Result<T, AppError>) {
        match result {
            Err(AppError::Timeout { .. }) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(AppError::Invocation { .. } | AppError::PayloadMissing { .. } | AppError::TaskFailed(_)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> WorkerCounters {
        WorkerCounters {
            in_flight: self.in_flight.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}
