//! Run counters, created once per run and passed by reference.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct Telemetry {
    recomputes: AtomicUsize,
    sim_jobs: AtomicUsize,
    sim_failures: AtomicUsize,
    candidates: AtomicUsize,
    accepted: AtomicUsize,
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub recomputes: usize,
    pub sim_jobs: usize,
    pub sim_failures: usize,
    pub candidates: usize,
    pub accepted: usize,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_recompute(&self) {
        self.recomputes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sim_job(&self) {
        self.sim_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sim_failure(&self) {
        self.sim_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_candidate(&self) {
        self.candidates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            recomputes: self.recomputes.load(Ordering::Relaxed),
            sim_jobs: self.sim_jobs.load(Ordering::Relaxed),
            sim_failures: self.sim_failures.load(Ordering::Relaxed),
            candidates: self.candidates.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
        }
    }
}
