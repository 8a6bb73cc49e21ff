use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use approx::assert_relative_eq;
use clap::Parser;
use tilesizer::asic::UnsizedFlow;
use tilesizer::cli::args::Args;
use tilesizer::config::TileConfig;
use tilesizer::error::Result;
use tilesizer::maps::SENTINEL_DELAY;
use tilesizer::opt::cost::CostWeights;
use tilesizer::opt::sweep::SweepParams;
use tilesizer::opt::{OptMode, OptParams, Termination};
use tilesizer::plan::{execute_run, ExecuteRunParams, RunArtifacts};
use tilesizer::report::Report;
use tilesizer::sim::path::{DelayPlan, REP_CRIT_PATH};
use tilesizer::sim::{CancelToken, PassThrough, RawMeasurements, SimJob, Simulator};
use tilesizer::testbench::MEAS_AVG_POWER;
use tilesizer::tile::TileModel;

const MINIMAL: &str = "
N: 4
K: 4
I: 16
W: 100
Fs: 3
Fcin: 0.2
Fcout: 0.1
Fclocal: 0.5
Rsel: z
Rfb: z
use_fluts: false
enable_carry_chain: 0
enable_bram_block: 0
switch_type: pass_transistor
transistor_type: bulk
vdd: 0.8
min_tran_width: 45
";

/// Every edge takes `edge` seconds, except in the decks listed in `slow`.
struct Stub {
    edge: f64,
    slow: BTreeMap<&'static str, f64>,
}

impl Stub {
    fn flat(edge: f64) -> Self {
        Self {
            edge,
            slow: BTreeMap::new(),
        }
    }
}

impl Simulator for Stub {
    fn simulate(&self, job: &SimJob) -> Result<RawMeasurements> {
        let edge = self.slow.get(job.deck.as_str()).copied().unwrap_or(self.edge);
        Ok(job
            .measures
            .iter()
            .map(|m| {
                let v = if m.ends_with("_trise") || m.ends_with("_tfall") {
                    edge
                } else if m == MEAS_AVG_POWER {
                    1e-6
                } else {
                    0.0
                };
                (m.clone(), Some(v))
            })
            .collect())
    }
}

/// Delays fall with the square of the total transistor width read back from
/// the parameter file the run just wrote. Growing a lightly replicated
/// device then lowers the cost, so every pass finds a move.
struct WidthSensitive;

impl Simulator for WidthSensitive {
    fn simulate(&self, job: &SimJob) -> Result<RawMeasurements> {
        let text = std::fs::read_to_string(job.run_dir.join("sweep_data.l"))?;
        let total: f64 = text
            .lines()
            .filter_map(|l| l.split('=').nth(1))
            .filter_map(|v| v.trim().trim_end_matches('n').parse::<f64>().ok())
            .sum();
        Stub::flat(1e-2 / (total * total)).simulate(job)
    }
}

fn config(extra: &str) -> TileConfig {
    TileConfig::from_yaml(&format!("{MINIMAL}{extra}")).unwrap()
}

fn with(replacements: &[(&str, &str)], extra: &str) -> TileConfig {
    let mut yaml = MINIMAL.to_string();
    for (from, to) in replacements {
        yaml = yaml.replace(from, to);
    }
    TileConfig::from_yaml(&format!("{yaml}{extra}")).unwrap()
}

struct Run<'a> {
    sizing: bool,
    opt: OptParams,
    checkpoint_dirs: &'a [PathBuf],
}

fn try_run(
    config: TileConfig,
    simulator: &dyn Simulator,
    out_dir: &Path,
    settings: Run<'_>,
) -> Result<RunArtifacts> {
    execute_run(ExecuteRunParams {
        out_dir,
        config,
        simulator,
        flow: &UnsizedFlow,
        cancel: CancelToken::new(),
        sizing: settings.sizing,
        weights: CostWeights::default(),
        opt: settings.opt,
        initial_sizes: None,
        checkpoint_dirs: settings.checkpoint_dirs,
        jobs: 4,
        sim_timeout: Duration::from_secs(5),
        options: Vec::new(),
        ctx: None,
    })
}

fn run(
    config: TileConfig,
    simulator: &dyn Simulator,
    out_dir: &Path,
    settings: Run<'_>,
) -> RunArtifacts {
    try_run(config, simulator, out_dir, settings).unwrap()
}

fn single_pass() -> OptParams {
    OptParams::builder().max_iterations(1).build().unwrap()
}

#[test]
fn test_pass_through_reports_initial_sizes() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = run(
        config(""),
        &PassThrough,
        dir.path(),
        Run {
            sizing: false,
            opt: single_pass(),
            checkpoint_dirs: &[],
        },
    );
    let eval = &artifacts.outcome.evaluation;
    let model = TileModel::new(config(""), BTreeMap::new()).unwrap();
    assert_eq!(eval.sizes, model.library().initial_sizes());
    assert_relative_eq!(eval.cost, eval.tile_area());
    assert_eq!(eval.delays[REP_CRIT_PATH], SENTINEL_DELAY);

    let report = Report {
        model: &model,
        outcome: &artifacts.outcome,
        options: Vec::new(),
        telemetry: artifacts.telemetry,
    };
    let rows = report.rows();
    assert_eq!(
        rows,
        vec![
            "sb_mux_L4",
            "cb_mux",
            "local_mux",
            "lut_a",
            "lut_b",
            "lut_c",
            "lut_d",
            "lut",
            "local_ble_output",
            "general_ble_output",
            "ff"
        ]
    );
    for row in &rows {
        assert_eq!(eval.delays[row], SENTINEL_DELAY, "{row}");
    }
    let text = std::fs::read_to_string(&artifacts.report).unwrap();
    assert!(text.contains("SUMMARY"));
    assert!(dir.path().join("sweep_data.l").exists());
    assert!(dir.path().join("sizes.csv").exists());
}

#[test]
fn test_pass_through_command_line_skips_sizing() {
    let dir = tempfile::tempdir().unwrap();
    let args = Args::try_parse_from([
        "tilesizer",
        "arch.yaml",
        "-o",
        "run",
        "--pass-through",
        "--max-iterations",
        "1",
    ])
    .unwrap();
    let opt = OptParams::builder()
        .max_iterations(args.max_iterations)
        .build()
        .unwrap();
    let artifacts = run(
        config(""),
        &PassThrough,
        dir.path(),
        Run {
            sizing: args.sizing(),
            opt,
            checkpoint_dirs: &[],
        },
    );
    let outcome = &artifacts.outcome;
    assert_eq!(outcome.termination, Termination::Skipped);
    assert_eq!(outcome.passes, 0);
    let model = TileModel::new(config(""), BTreeMap::new()).unwrap();
    assert_eq!(outcome.evaluation.sizes, model.library().initial_sizes());
    assert_relative_eq!(outcome.evaluation.cost, outcome.evaluation.tile_area());
    assert!(!dir.path().join("checkpoints").join("pass_1.json").exists());
}

#[test]
fn test_sizing_without_delays_is_infeasible() {
    let dir = tempfile::tempdir().unwrap();
    let err = try_run(
        config(""),
        &PassThrough,
        dir.path(),
        Run {
            sizing: true,
            opt: single_pass(),
            checkpoint_dirs: &[],
        },
    )
    .err()
    .unwrap();
    assert_eq!(err.exit_code(), 5);
}

#[test]
fn test_stub_simulator_rep_path() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = run(
        config(""),
        &Stub::flat(50e-12),
        dir.path(),
        Run {
            sizing: false,
            opt: single_pass(),
            checkpoint_dirs: &[],
        },
    );
    let model = TileModel::new(config(""), BTreeMap::new()).unwrap();
    let plan = DelayPlan::new(model.config(), model.library());
    let weights: f64 = plan.entries().iter().map(|(_, w)| w).sum();
    let eval = &artifacts.outcome.evaluation;
    assert_relative_eq!(eval.delays[REP_CRIT_PATH], 50e-12 * weights, max_relative = 1e-9);
    assert!(eval.cost > 0.0 && eval.cost.is_finite());
    assert_relative_eq!(eval.powers["cb_mux"], 1e-6);
}

#[test]
fn test_fracturable_input_uses_output_mux() {
    let dir = tempfile::tempdir().unwrap();
    let config = with(
        &[
            ("K: 4", "K: 6"),
            ("use_fluts: false", "use_fluts: true"),
            ("enable_carry_chain: 0", "enable_carry_chain: 1"),
        ],
        "FAs_per_flut: 2\ncarry_chain_type: ripple\n",
    );
    let sim = Stub {
        edge: 50e-12,
        slow: BTreeMap::from([("flut_mux", 80e-12)]),
    };
    let artifacts = run(
        config,
        &sim,
        dir.path(),
        Run {
            sizing: false,
            opt: single_pass(),
            checkpoint_dirs: &[],
        },
    );
    let delays = &artifacts.outcome.evaluation.delays;
    assert_relative_eq!(delays["lut_f"], 80e-12, max_relative = 1e-9);
    assert_relative_eq!(delays["lut_e"], 50e-12, max_relative = 1e-9);
}

#[test]
fn test_skip_chain_periphery() {
    let config = with(
        &[
            ("N: 4", "N: 10"),
            ("K: 4", "K: 6"),
            ("use_fluts: false", "use_fluts: true"),
            ("enable_carry_chain: 0", "enable_carry_chain: 1"),
        ],
        "FAs_per_flut: 2\ncarry_chain_type: skip\nskip_size: 5\n",
    );
    let model = TileModel::new(config, BTreeMap::new()).unwrap();
    let and = model.library().get("carry_chain_skip_and").unwrap();
    assert_eq!(and.per_tile(), 4);
    assert_eq!(
        model
            .library()
            .get("carry_chain_skip_mux")
            .unwrap()
            .per_tile(),
        4
    );
}

#[test]
fn test_bram_row_decoder_path() {
    let config = with(
        &[("enable_bram_block: 0", "enable_bram_block: 1")],
        "row_decoder_bits: 7\ncol_decoder_bits: 3\nconf_decoder_bits: 4\nnumber_of_banks: 1\nmemory_technology: SRAM\n",
    );
    let dir = tempfile::tempdir().unwrap();
    let sim = Stub {
        edge: 10e-12,
        slow: BTreeMap::from([("row_decoder_stage1_3", 30e-12)]),
    };
    let artifacts = run(
        config.clone(),
        &sim,
        dir.path(),
        Run {
            sizing: false,
            opt: single_pass(),
            checkpoint_dirs: &[],
        },
    );
    let model = TileModel::new(config, BTreeMap::new()).unwrap();
    let stage1: Vec<String> = model
        .library()
        .iter()
        .map(|s| s.name().to_string())
        .filter(|n| n.starts_with("row_decoder_stage1_"))
        .collect();
    assert_eq!(stage1, vec!["row_decoder_stage1_2", "row_decoder_stage1_3"]);
    assert!(model.library().get("row_decoder_stage0").is_some());

    // stage0 + the slower predecoder + stage3 + wordline driver
    let delays = &artifacts.outcome.evaluation.delays;
    assert_relative_eq!(delays["row_decoder_path"], 60e-12, max_relative = 1e-9);
    assert!(artifacts.outcome.evaluation.feasible());
}

#[test]
fn test_resumed_run_matches_uninterrupted_run() {
    // A zero threshold never counts a pass as stalled.
    let opt = |max_iterations| {
        OptParams::builder()
            .mode(OptMode::Local)
            .max_iterations(max_iterations)
            .epsilon(0.0)
            .sweep(SweepParams {
                steps: 1,
                max_combinations: 8,
                ..Default::default()
            })
            .build()
            .unwrap()
    };
    let straight = tempfile::tempdir().unwrap();
    let first = tempfile::tempdir().unwrap();
    let resumed = tempfile::tempdir().unwrap();

    let full = run(
        config(""),
        &WidthSensitive,
        straight.path(),
        Run {
            sizing: true,
            opt: opt(2),
            checkpoint_dirs: &[],
        },
    );
    assert_eq!(full.outcome.termination, Termination::IterationCap);
    assert_eq!(full.outcome.passes, 2);

    let interrupted = run(
        config(""),
        &WidthSensitive,
        first.path(),
        Run {
            sizing: true,
            opt: opt(1),
            checkpoint_dirs: &[],
        },
    );
    assert_eq!(interrupted.outcome.termination, Termination::IterationCap);
    assert_eq!(interrupted.outcome.passes, 1);
    assert!(first.path().join("checkpoints").join("pass_1.json").exists());
    assert!(interrupted.outcome.evaluation.cost > full.outcome.evaluation.cost);

    let second = run(
        config(""),
        &WidthSensitive,
        resumed.path(),
        Run {
            sizing: true,
            opt: opt(2),
            checkpoint_dirs: &[first.path().to_path_buf()],
        },
    );

    assert_eq!(second.outcome.termination, Termination::IterationCap);
    assert_eq!(full.outcome.evaluation.sizes, second.outcome.evaluation.sizes);
    assert_eq!(full.outcome.evaluation.cost, second.outcome.evaluation.cost);
    assert_eq!(full.outcome.passes, second.outcome.passes);
}
