//! One sizing run from a validated configuration to the written report.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;

use crate::asic::{characterise, AsicFlow};
use crate::cli::progress::{StepContext, TaskKey};
use crate::config::TileConfig;
use crate::error::{Result, TileError};
use crate::eval::Evaluator;
use crate::maps::Sizes;
use crate::opt::checkpoint::{apply_initial_sizes, resume};
use crate::opt::cost::CostWeights;
use crate::opt::{OptParams, Optimiser, RunOutcome, Start};
use crate::report::Report;
use crate::sim::{CancelToken, SimPool, Simulator};
use crate::telemetry::{Telemetry, TelemetrySnapshot};
use crate::tile::TileModel;

pub struct ExecuteRunParams<'a> {
    pub out_dir: &'a Path,
    pub config: TileConfig,
    pub simulator: &'a dyn Simulator,
    pub flow: &'a dyn AsicFlow,
    pub cancel: CancelToken,
    /// Search for better sizes. Otherwise the starting sizes are evaluated
    /// and reported.
    pub sizing: bool,
    pub weights: CostWeights,
    pub opt: OptParams,
    pub initial_sizes: Option<&'a Path>,
    pub checkpoint_dirs: &'a [PathBuf],
    pub jobs: usize,
    pub sim_timeout: Duration,
    /// Echoed at the top of the report.
    pub options: Vec<(String, String)>,
    pub ctx: Option<&'a mut StepContext>,
}

#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub outcome: RunOutcome,
    pub report: PathBuf,
    pub telemetry: TelemetrySnapshot,
}

macro_rules! try_finish_task {
    ( $ctx:expr, $task:expr ) => {
        if let Some(ctx) = $ctx.as_mut() {
            ctx.finish($task);
        }
    };
}

/// Starting sizes: library defaults, then the initial-sizes file, then
/// checkpoints.
fn starting_point(
    base: Sizes,
    initial_sizes: Option<&Path>,
    checkpoint_dirs: &[PathBuf],
) -> Result<Start> {
    let mut sizes = match initial_sizes {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                TileError::Environment(format!("cannot read initial sizes {path:?}: {e}"))
            })?;
            apply_initial_sizes(&text, &base)?
        }
        None => base,
    };
    let Some(cp) = resume(checkpoint_dirs)? else {
        return Ok(Start::fresh(sizes));
    };
    info!("Resuming after pass {}", cp.iteration);
    for (device, size) in cp.sizes.iter() {
        if let Some(s) = sizes.get_mut(device) {
            *s = *size;
        }
    }
    Ok(Start {
        sizes,
        iteration: cp.iteration,
        stall_passes: cp.stall_passes,
    })
}

pub fn execute_run(params: ExecuteRunParams) -> Result<RunArtifacts> {
    let ExecuteRunParams {
        out_dir,
        config,
        simulator,
        flow,
        cancel,
        sizing,
        weights,
        opt,
        initial_sizes,
        checkpoint_dirs,
        jobs,
        sim_timeout,
        options,
        mut ctx,
    } = params;

    std::fs::create_dir_all(out_dir)?;

    let hb_cores = characterise(&config.hardblocks, flow)?;
    let model = TileModel::new(config, hb_cores)?;
    info!("Library holds {} subcircuits", model.library().len());
    try_finish_task!(ctx, TaskKey::BuildTile);

    let telemetry = Telemetry::new();
    let pool = SimPool::new(jobs, cancel)?;
    let eval = Evaluator::new(
        &model,
        simulator,
        &pool,
        &telemetry,
        out_dir,
        weights,
        sim_timeout,
    )?;
    try_finish_task!(ctx, TaskKey::GenerateLibrary);

    let start = starting_point(
        model.library().initial_sizes(),
        initial_sizes,
        checkpoint_dirs,
    )?;
    let mut optimiser = Optimiser::new(&eval, opt, out_dir);
    let search = if sizing {
        let search = optimiser.search(start)?;
        try_finish_task!(ctx, TaskKey::SizeTransistors);
        search
    } else {
        optimiser.skip(start)
    };

    let outcome = optimiser.conclude(search)?;
    try_finish_task!(ctx, TaskKey::FinalEvaluation);

    let snapshot = telemetry.snapshot();
    let report = Report {
        model: &model,
        outcome: &outcome,
        options,
        telemetry: snapshot,
    }
    .write(out_dir)?;
    try_finish_task!(ctx, TaskKey::WriteReport);

    Ok(RunArtifacts {
        outcome,
        report,
        telemetry: snapshot,
    })
}
