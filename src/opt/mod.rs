//! Transistor sizing search.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TileError};
use crate::eval::{Evaluation, Evaluator};
use crate::maps::Sizes;
use crate::report::CsvLogs;

pub mod checkpoint;
pub mod cost;
pub mod sweep;

use checkpoint::Checkpoint;
use sweep::{Candidate, SweepParams};

/// Consecutive low-improvement passes that end the search.
pub const STALL_LIMIT: usize = 2;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OptMode {
    /// Accept the best candidate of each subcircuit in turn.
    Local,
    /// Move every subcircuit in lockstep, re-simulating the top candidates.
    Global,
}

#[derive(Debug, Clone, PartialEq, Builder)]
pub struct OptParams {
    #[builder(default = "OptMode::Global")]
    pub mode: OptMode,
    #[builder(default = "6")]
    pub max_iterations: usize,
    #[builder(default = "1")]
    pub re_erf: usize,
    /// Relative cost improvement below which a pass counts as stalled.
    #[builder(default = "1e-3")]
    pub epsilon: f64,
    #[builder(default)]
    pub sweep: SweepParams,
}

impl OptParams {
    #[inline]
    pub fn builder() -> OptParamsBuilder {
        OptParamsBuilder::default()
    }
}

/// Where the search begins.
#[derive(Debug, Clone, PartialEq)]
pub struct Start {
    pub sizes: Sizes,
    pub iteration: usize,
    pub stall_passes: usize,
}

impl Start {
    pub fn fresh(sizes: Sizes) -> Self {
        Self {
            sizes,
            iteration: 0,
            stall_passes: 0,
        }
    }
}

impl From<Checkpoint> for Start {
    fn from(cp: Checkpoint) -> Self {
        Self {
            sizes: cp.sizes,
            iteration: cp.iteration,
            stall_passes: cp.stall_passes,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Termination {
    /// Sizing disabled; only the starting point was evaluated.
    Skipped,
    Stalled,
    NoChange,
    IterationCap,
}

/// Sizes chosen by a search, before the final evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Search {
    pub sizes: Sizes,
    pub passes: usize,
    pub stall_passes: usize,
    pub termination: Termination,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Final full evaluation of the chosen sizes.
    pub evaluation: Evaluation,
    /// Passes completed, including those of a resumed run.
    pub passes: usize,
    pub termination: Termination,
    pub warnings: Vec<String>,
}

struct PassStats {
    evaluated: usize,
    feasible: usize,
    changed: bool,
}

pub struct Optimiser<'e, 'a> {
    eval: &'e Evaluator<'a>,
    params: OptParams,
    out_dir: PathBuf,
    logs: CsvLogs,
}

impl<'e, 'a> Optimiser<'e, 'a> {
    pub fn new(eval: &'e Evaluator<'a>, params: OptParams, out_dir: impl AsRef<Path>) -> Self {
        let out_dir = out_dir.as_ref().to_path_buf();
        Self {
            eval,
            params,
            logs: CsvLogs::new(&out_dir),
            out_dir,
        }
    }

    /// Searches from `start`, then evaluates the result once more.
    pub fn run(&mut self, start: Start) -> Result<RunOutcome> {
        let search = self.search(start)?;
        self.conclude(search)
    }

    /// The starting point as the answer, without searching.
    pub fn skip(&self, start: Start) -> Search {
        Search {
            sizes: start.sizes,
            passes: start.iteration,
            stall_passes: start.stall_passes,
            termination: Termination::Skipped,
        }
    }

    /// Final full evaluation of a search result.
    pub fn conclude(&mut self, search: Search) -> Result<RunOutcome> {
        let evaluation = self.eval.evaluate(&search.sizes)?;
        if search.termination == Termination::Skipped {
            self.logs.append(search.passes, &evaluation)?;
        }
        let mut warnings = geometry_warnings(&evaluation);
        if search.termination == Termination::IterationCap && search.stall_passes < STALL_LIMIT {
            warnings.push(format!(
                "sizing stopped at the iteration cap ({}) before the cost settled",
                self.params.max_iterations
            ));
        }
        for w in &warnings {
            warn!("{w}");
        }
        Ok(RunOutcome {
            evaluation,
            passes: search.passes,
            termination: search.termination,
            warnings,
        })
    }

    /// Runs sizing passes until the cost stalls, nothing changes or the
    /// iteration cap is reached. A checkpoint is written after every pass.
    pub fn search(&mut self, start: Start) -> Result<Search> {
        let mut iteration = start.iteration;
        let mut stall = start.stall_passes;
        let mut current = self.eval.evaluate(&start.sizes)?;
        info!(
            "Starting {:?} sizing at pass {iteration} with cost {:.6e}",
            self.params.mode, current.cost
        );

        let termination = loop {
            if iteration >= self.params.max_iterations {
                break Termination::IterationCap;
            }
            iteration += 1;
            let before = current.cost;
            let stats = match self.params.mode {
                OptMode::Local => self.local_pass(iteration, &mut current),
                OptMode::Global => self.global_pass(iteration, &mut current),
            };
            let stats = match stats {
                Err(TileError::Cancelled) => {
                    let path = Checkpoint::new(iteration - 1, stall, &current).save(&self.out_dir)?;
                    warn!("Saved interrupted state to {path:?}");
                    return Err(TileError::Cancelled);
                }
                other => other?,
            };
            if stats.evaluated > 0 && stats.feasible == 0 {
                return Err(TileError::AllCandidatesInfeasible { pass: iteration });
            }

            if improvement(before, current.cost) < self.params.epsilon {
                stall += 1;
            } else {
                stall = 0;
            }
            Checkpoint::new(iteration, stall, &current).save(&self.out_dir)?;
            self.logs.append(iteration, &current)?;
            info!(
                "Pass {iteration}: cost {:.6e}, tile area {:.4e} nm^2, {} candidates",
                current.cost,
                current.tile_area(),
                stats.evaluated
            );

            if !stats.changed {
                break Termination::NoChange;
            }
            if stall >= STALL_LIMIT {
                break Termination::Stalled;
            }
        };

        Ok(Search {
            sizes: current.sizes,
            passes: iteration,
            stall_passes: stall,
            termination,
        })
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.eval.cancelled() {
            Err(TileError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Evaluates every candidate of one subcircuit against `current`.
    /// Returns the feasible results, best first.
    fn sweep_subcircuit(
        &self,
        name: &str,
        rotation: usize,
        current: &Evaluation,
        stats: &mut PassStats,
    ) -> Result<Vec<(Evaluation, Candidate)>> {
        let model = self.eval.model();
        let Some(sub) = model.library().get(name) else {
            return Ok(Vec::new());
        };
        let candidates = sweep::candidates(
            &sub.transistors(),
            &current.sizes,
            &model.config().pn_ratios,
            &self.params.sweep,
            rotation,
        )?;
        debug!("Sweeping `{name}` over {} candidates", candidates.len());

        let mut results = Vec::new();
        for candidate in candidates {
            self.check_cancelled()?;
            let mut sizes = current.sizes.clone();
            candidate.apply(&mut sizes);
            let result = self.eval.evaluate(&sizes)?;
            stats.evaluated += 1;
            if result.feasible() {
                stats.feasible += 1;
                results.push((result, candidate));
            }
        }
        results.sort_by(|a, b| a.0.cost.total_cmp(&b.0.cost));
        Ok(results)
    }

    fn local_pass(&self, pass: usize, current: &mut Evaluation) -> Result<PassStats> {
        let mut stats = PassStats {
            evaluated: 0,
            feasible: 0,
            changed: false,
        };
        let swept = self.eval.plan().swept(self.eval.model().library());
        for (i, name) in swept.iter().enumerate() {
            let ranked = self.sweep_subcircuit(name, pass + i, current, &mut stats)?;
            if let Some((best, _)) = ranked.into_iter().next() {
                if best.cost < current.cost {
                    debug!("Accepted `{name}`: cost {:.6e} -> {:.6e}", current.cost, best.cost);
                    *current = best;
                    stats.changed = true;
                    self.eval.telemetry().record_accepted();
                }
            }
        }
        Ok(stats)
    }

    fn global_pass(&self, pass: usize, current: &mut Evaluation) -> Result<PassStats> {
        let mut stats = PassStats {
            evaluated: 0,
            feasible: 0,
            changed: false,
        };
        let re_erf = self.params.re_erf.max(1);
        let swept = self.eval.plan().swept(self.eval.model().library());
        let mut ranked: Vec<Vec<Candidate>> = Vec::with_capacity(swept.len());
        for (i, name) in swept.iter().enumerate() {
            let improving = self
                .sweep_subcircuit(name, pass + i, current, &mut stats)?
                .into_iter()
                .filter(|(e, _)| e.cost < current.cost)
                .take(re_erf)
                .map(|(_, c)| c)
                .collect();
            ranked.push(improving);
        }
        if ranked.iter().all(Vec::is_empty) {
            return Ok(stats);
        }

        self.check_cancelled()?;
        let baseline = self.eval.evaluate_fine(&current.sizes)?;
        let mut best: Option<Evaluation> = None;
        for k in 0..re_erf {
            if k > 0 && ranked.iter().all(|r| r.len() <= k) {
                break;
            }
            self.check_cancelled()?;
            let mut sizes = current.sizes.clone();
            for r in &ranked {
                if let Some(c) = r.get(k).or_else(|| r.last()) {
                    c.apply(&mut sizes);
                }
            }
            let result = self.eval.evaluate_fine(&sizes)?;
            if result.feasible() && best.as_ref().map(|b| result.cost < b.cost).unwrap_or(true) {
                best = Some(result);
            }
        }

        let Some(best) = best.filter(|b| b.cost < baseline.cost) else {
            return Ok(stats);
        };
        // Costs are only comparable at the same step.
        let moved = self.eval.evaluate(&best.sizes)?;
        if moved.cost < current.cost {
            debug!(
                "Accepted lockstep move: fine cost {:.6e} -> {:.6e}, cost {:.6e} -> {:.6e}",
                baseline.cost, best.cost, current.cost, moved.cost
            );
            *current = moved;
            stats.changed = true;
            self.eval.telemetry().record_accepted();
        } else {
            debug!(
                "Rejected lockstep move: cost {:.6e} would rise to {:.6e}",
                current.cost, moved.cost
            );
        }
        Ok(stats)
    }
}

/// Relative cost improvement from `before` to `after`.
fn improvement(before: f64, after: f64) -> f64 {
    if !before.is_finite() {
        return if after.is_finite() { 1.0 } else { 0.0 };
    }
    if before <= 0.0 {
        return 0.0;
    }
    (before - after) / before
}

fn geometry_warnings(eval: &Evaluation) -> Vec<String> {
    if eval.state.converged {
        Vec::new()
    } else {
        vec![format!(
            "wire lengths did not settle after {} tile recomputations",
            eval.state.iterations
        )]
    }
}
