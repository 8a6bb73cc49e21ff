//! Evaluation of one sizing candidate: tile recomputation, parameter
//! files, simulation and cost.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};

use crate::error::{Result, TileError};
use crate::maps::{is_valid_delay, Delays, Powers, Sizes};
use crate::opt::cost::{cost, CostWeights};
use crate::sim::path::{DelayPlan, REP_CRIT_PATH};
use crate::sim::{merge, DeckResult, SimJob, SimPool, Simulator};
use crate::spice::params::write_parameter_files;
use crate::telemetry::Telemetry;
use crate::testbench::{self, Deck, FINE_STEP, STEP};
use crate::tile::{TileModel, TileState};

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub sizes: Sizes,
    pub state: TileState,
    pub delays: Delays,
    pub powers: Powers,
    pub cost: f64,
}

impl Evaluation {
    pub fn tile_area(&self) -> f64 {
        self.state.tile_area()
    }

    pub fn rep_crit_path(&self) -> f64 {
        self.delays
            .get(REP_CRIT_PATH)
            .copied()
            .unwrap_or(crate::maps::SENTINEL_DELAY)
    }

    /// Whether every entry of the representative path was measured.
    pub fn feasible(&self) -> bool {
        is_valid_delay(self.rep_crit_path()) && self.cost.is_finite()
    }
}

pub struct Evaluator<'a> {
    model: &'a TileModel,
    simulator: &'a dyn Simulator,
    pool: &'a SimPool,
    telemetry: &'a Telemetry,
    run_dir: PathBuf,
    decks: Vec<Deck>,
    plan: DelayPlan,
    weights: CostWeights,
    timeout: Duration,
}

impl<'a> Evaluator<'a> {
    /// Writes the library bundle and every deck into `run_dir`.
    pub fn new(
        model: &'a TileModel,
        simulator: &'a dyn Simulator,
        pool: &'a SimPool,
        telemetry: &'a Telemetry,
        run_dir: impl AsRef<Path>,
        weights: CostWeights,
        timeout: Duration,
    ) -> Result<Self> {
        let run_dir = run_dir.as_ref().to_path_buf();
        let decks = testbench::decks(model)?;
        testbench::write_bundle(&run_dir, model)?;
        testbench::write_decks(&run_dir, &decks, STEP)?;
        debug!("Wrote {} decks to {run_dir:?}", decks.len());
        Ok(Self {
            model,
            simulator,
            pool,
            telemetry,
            run_dir,
            decks,
            plan: DelayPlan::new(model.config(), model.library()),
            weights,
            timeout,
        })
    }

    pub fn model(&self) -> &TileModel {
        self.model
    }

    pub fn plan(&self) -> &DelayPlan {
        &self.plan
    }

    pub fn decks(&self) -> &[Deck] {
        &self.decks
    }

    pub fn telemetry(&self) -> &Telemetry {
        self.telemetry
    }

    pub fn cancelled(&self) -> bool {
        self.pool.cancel_token().is_cancelled()
    }

    pub fn evaluate(&self, sizes: &Sizes) -> Result<Evaluation> {
        self.telemetry.record_candidate();
        let state = self.model.recompute(sizes)?;
        self.telemetry.record_recompute();
        write_parameter_files(&self.run_dir, sizes, &state.rc, self.model.area_model())?;

        let jobs = self
            .decks
            .iter()
            .map(|deck| {
                SimJob::builder()
                    .deck(deck.name.as_str())
                    .run_dir(self.run_dir.as_path())
                    .measures(deck.measure_names())
                    .timeout(self.timeout)
                    .build()
                    .map_err(|e| TileError::generation(deck.name.as_str(), e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        let raw = self.pool.run(self.simulator, &jobs, self.telemetry)?;

        let vdd = self.model.config().process.vdd;
        let results: Vec<DeckResult> = self
            .decks
            .iter()
            .zip(&raw)
            .map(|(deck, raw)| DeckResult::from_raw(deck, raw, vdd))
            .collect();
        let merged = merge(&self.decks, &results);
        let mut delays = merged.delays;
        self.plan.compose(self.model, &mut delays);

        let rep = delays
            .get(REP_CRIT_PATH)
            .copied()
            .unwrap_or(crate::maps::SENTINEL_DELAY);
        let cost = cost(state.tile_area(), rep, self.weights);
        Ok(Evaluation {
            sizes: sizes.clone(),
            state,
            delays,
            powers: merged.powers,
            cost,
        })
    }

    /// Evaluates with the fine transient step, then restores the decks.
    pub fn evaluate_fine(&self, sizes: &Sizes) -> Result<Evaluation> {
        testbench::write_decks(&self.run_dir, &self.decks, FINE_STEP)?;
        let result = self.evaluate(sizes);
        testbench::write_decks(&self.run_dir, &self.decks, STEP)?;
        if let Ok(eval) = &result {
            if !eval.state.converged {
                warn!("Tile geometry did not settle for a fine re-evaluation");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::sim::tests::FixedSimulator;
    use crate::sim::{CancelToken, PassThrough};
    use crate::tile::tests::minimal_model;

    #[test]
    fn test_pass_through_cost_is_area() {
        let dir = tempfile::tempdir().unwrap();
        let model = minimal_model();
        let pool = SimPool::new(2, CancelToken::new()).unwrap();
        let telemetry = Telemetry::new();
        let eval = Evaluator::new(
            &model,
            &PassThrough,
            &pool,
            &telemetry,
            dir.path(),
            CostWeights::default(),
            Duration::from_secs(1),
        )
        .unwrap();
        let sizes = model.library().initial_sizes();
        let result = eval.evaluate(&sizes).unwrap();
        assert!(!result.feasible());
        assert_eq!(result.delays["cb_mux"], crate::maps::SENTINEL_DELAY);
        assert_relative_eq!(result.cost, result.tile_area());
        assert!(dir.path().join("sweep_data.l").exists());
        assert!(dir.path().join("wire_RC.l").exists());
        assert!(dir.path().join("lut_a").join("lut_a.sp").exists());
    }

    #[test]
    fn test_fixed_simulator_cost() {
        let dir = tempfile::tempdir().unwrap();
        let model = minimal_model();
        let pool = SimPool::new(2, CancelToken::new()).unwrap();
        let telemetry = Telemetry::new();
        let sim = FixedSimulator {
            edge: 50e-12,
            power: 1e-6,
        };
        let eval = Evaluator::new(
            &model,
            &sim,
            &pool,
            &telemetry,
            dir.path(),
            CostWeights::default(),
            Duration::from_secs(1),
        )
        .unwrap();
        let result = eval.evaluate(&model.library().initial_sizes()).unwrap();
        assert!(result.feasible());
        let weight_sum: f64 = eval.plan().entries().iter().map(|(_, w)| w).sum();
        assert_relative_eq!(result.rep_crit_path(), 50e-12 * weight_sum, max_relative = 1e-9);
        assert_relative_eq!(
            result.cost,
            result.tile_area() * result.rep_crit_path(),
            max_relative = 1e-12
        );
        assert_eq!(telemetry.snapshot().sim_jobs, eval.decks().len());
    }
}
