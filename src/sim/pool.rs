//! Worker pool for the decks of one candidate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::warn;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{Result, TileError};
use crate::sim::{failed, RawMeasurements, SimJob, Simulator};
use crate::telemetry::Telemetry;

/// Set once the user interrupts the run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the token on SIGINT.
    pub fn install_handler(&self) -> Result<()> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            warn!("Interrupted; stopping after the current candidate");
            token.cancel();
        })
        .map_err(|e| TileError::Environment(format!("cannot install interrupt handler: {e}")))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct SimPool {
    pool: ThreadPool,
    cancel: CancelToken,
}

impl SimPool {
    pub fn new(jobs: usize, cancel: CancelToken) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .thread_name(|i| format!("sim-{i}"))
            .build()
            .map_err(|e| TileError::Environment(format!("cannot start simulation workers: {e}")))?;
        Ok(Self { pool, cancel })
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Runs every job and blocks until all have finished. Simulation
    /// failures and jobs started after cancellation come back with every
    /// measurement missing; environment errors abort the batch.
    pub fn run(
        &self,
        simulator: &dyn Simulator,
        jobs: &[SimJob],
        telemetry: &Telemetry,
    ) -> Result<Vec<RawMeasurements>> {
        let results: Vec<Result<RawMeasurements>> = self.pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    if self.cancel.is_cancelled() {
                        return Ok(failed(job));
                    }
                    telemetry.record_sim_job();
                    match simulator.simulate(job) {
                        Ok(raw) => Ok(raw),
                        Err(e @ TileError::Environment(_)) => Err(e),
                        Err(e) => {
                            warn!("{e}");
                            telemetry.record_sim_failure();
                            Ok(failed(job))
                        }
                    }
                })
                .collect()
        });
        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::tests::FixedSimulator;
    use crate::sim::PassThrough;

    struct Crashing;

    impl Simulator for Crashing {
        fn simulate(&self, job: &SimJob) -> Result<RawMeasurements> {
            Err(TileError::Simulation {
                testbench: job.deck.clone(),
                reason: "segfault".into(),
            })
        }
    }

    fn jobs(n: usize) -> Vec<SimJob> {
        (0..n)
            .map(|i| {
                SimJob::builder()
                    .deck(format!("deck_{i}"))
                    .run_dir("/tmp/run")
                    .measures(vec!["meas_total_trise".to_string()])
                    .build()
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_results_keep_job_order() {
        let pool = SimPool::new(4, CancelToken::new()).unwrap();
        let telemetry = Telemetry::new();
        let sim = FixedSimulator {
            edge: 5e-11,
            power: 1e-6,
        };
        let results = pool.run(&sim, &jobs(16), &telemetry).unwrap();
        assert_eq!(results.len(), 16);
        assert!(results.iter().all(|r| r["meas_total_trise"] == Some(5e-11)));
        assert_eq!(telemetry.snapshot().sim_jobs, 16);
    }

    #[test]
    fn test_failures_are_absorbed() {
        let pool = SimPool::new(2, CancelToken::new()).unwrap();
        let telemetry = Telemetry::new();
        let results = pool.run(&Crashing, &jobs(3), &telemetry).unwrap();
        assert!(results.iter().all(|r| r["meas_total_trise"].is_none()));
        assert_eq!(telemetry.snapshot().sim_failures, 3);
    }

    #[test]
    fn test_cancelled_jobs_do_not_run() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let pool = SimPool::new(2, cancel).unwrap();
        let telemetry = Telemetry::new();
        pool.run(&PassThrough, &jobs(3), &telemetry).unwrap();
        assert_eq!(telemetry.snapshot().sim_jobs, 0);
    }
}
