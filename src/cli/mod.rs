use std::collections::HashSet;
use std::fs::canonicalize;
use std::time::Duration;

use clap::Parser;

use crate::asic::CommandFlow;
use crate::cli::args::Args;
use crate::cli::progress::{StepContext, TaskKey};
use crate::config::{parse_tile_config, TileConfig};
use crate::error::TileError;
use crate::opt::cost::CostWeights;
use crate::opt::OptParams;
use crate::plan::{execute_run, ExecuteRunParams};
use crate::rrg::RrgData;
use crate::sim::{CancelToken, Hspice, PassThrough, Simulator};
use crate::Result;

pub mod args;
pub mod progress;

pub const BANNER: &str = r"
 _   _ _                _
| |_(_) | ___  ___  ___(_)_______ _ __
| __| | |/ _ \/ __|/ _ \ |_  / _ \ '__|
| |_| | |  __/\__ \  __/ |/ /  __/ |
 \__|_|_|\___||___/\___|_/___\___|_|

FPGA tile sizing v0.2
";

fn load_config(args: &Args) -> crate::error::Result<TileConfig> {
    let config_path = canonicalize(&args.config).map_err(|e| {
        TileError::Environment(format!("cannot open configuration {:?}: {e}", args.config))
    })?;
    println!("Configuration file: {:?}", &config_path);
    let mut config = parse_tile_config(&config_path)?;
    if let Some(dir) = &args.rrg_data_dir {
        RrgData::load(dir)?.apply(&mut config)?;
    }
    Ok(config)
}

pub fn run() -> Result<()> {
    let args = Args::parse();

    println!("{BANNER}");

    let sizing = args.sizing();
    let mut disabled = HashSet::new();
    if !sizing {
        disabled.insert(TaskKey::SizeTransistors);
    }

    println!("Reading configuration file...\n");
    let config = load_config(&args);
    if let Ok(config) = &config {
        let arch = &config.arch;
        println!("Architecture parameters:");
        println!("\tCluster size (N): {}", arch.n);
        println!("\tLUT size (K): {}", arch.k.inputs());
        println!("\tChannel width (W): {}", arch.w);
        println!("\tCluster inputs (I): {}", arch.i);
        println!("\tWire types: {}", arch.wires.len());
        println!("\tBRAM: {}", config.bram.is_some());
        println!("\tHard blocks: {}\n", config.hardblocks.len());
    }

    let mut ctx = StepContext::new(&disabled);
    let config = ctx.check(config)?;
    ctx.finish(TaskKey::ParseConfig);

    std::fs::create_dir_all(&args.output_dir)?;
    let out_dir = canonicalize(&args.output_dir)?;

    let cancel = CancelToken::new();
    ctx.check(cancel.install_handler())?;

    let hspice = Hspice::new(&args.simulator);
    let simulator: &dyn Simulator = if args.pass_through {
        &PassThrough
    } else {
        &hspice
    };
    let opt = OptParams::builder()
        .mode(args.opt_type)
        .max_iterations(args.max_iterations)
        .re_erf(args.re_erf)
        .build()?;

    let res = execute_run(ExecuteRunParams {
        out_dir: &out_dir,
        config,
        simulator,
        flow: &CommandFlow::new(out_dir.join("asic")),
        cancel,
        sizing,
        weights: CostWeights {
            area: args.area_opt_weight,
            delay: args.delay_opt_weight,
        },
        opt,
        initial_sizes: args.initial_sizes.as_deref(),
        checkpoint_dirs: &args.checkpoint_dirs,
        jobs: args.jobs,
        sim_timeout: Duration::from_secs(args.sim_timeout),
        options: args.echo(),
        ctx: Some(&mut ctx),
    });

    let artifacts = ctx.check(res)?;
    let eval = &artifacts.outcome.evaluation;
    println!(
        "Tile area: {:.4} um^2, cost: {:.6e}",
        eval.tile_area() / 1e6,
        eval.cost
    );
    println!("Report saved to: {:?}\n", &artifacts.report);

    Ok(())
}
