use std::path::PathBuf;

use clap::Parser;

use crate::opt::OptMode;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about,
    help_template(
        "{before-help}{name} {version}\n{author-with-newline}{about-with-newline}\n{usage-heading} {usage}\n\n{all-args}{after-help}"
    )
)]
pub struct Args {
    /// Path to the architecture configuration file (YAML or TOML).
    pub config: PathBuf,

    /// Directory to which run artifacts should be saved.
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Evaluate the initial sizes only.
    #[arg(long)]
    pub no_sizing: bool,

    /// Area exponent of the cost function.
    #[arg(long, default_value_t = 1.0)]
    pub area_opt_weight: f64,

    /// Delay exponent of the cost function.
    #[arg(long, default_value_t = 1.0)]
    pub delay_opt_weight: f64,

    /// Maximum number of sizing passes.
    #[arg(long, default_value_t = 6)]
    pub max_iterations: usize,

    /// Candidates re-simulated with the fine time step in global mode.
    #[arg(long, default_value_t = 1)]
    pub re_erf: usize,

    #[arg(long, value_enum, default_value_t = OptMode::Global)]
    pub opt_type: OptMode,

    /// Skip the analog simulator. Every delay is reported as invalid.
    #[arg(long)]
    pub pass_through: bool,

    /// `name = value` file with starting transistor sizes.
    #[arg(long)]
    pub initial_sizes: Option<PathBuf>,

    /// Resume from the newest checkpoint of each directory, in order.
    #[arg(long, num_args = 1..)]
    pub checkpoint_dirs: Vec<PathBuf>,

    /// Directory holding routing resource graph CSV files.
    #[arg(long)]
    pub rrg_data_dir: Option<PathBuf>,

    /// Number of concurrent simulations.
    #[arg(short, long, default_value_t = 4)]
    pub jobs: usize,

    /// Per-testbench simulation timeout in seconds.
    #[arg(long, default_value_t = 600)]
    pub sim_timeout: u64,

    /// Simulator executable.
    #[arg(long, default_value = "hspice")]
    pub simulator: PathBuf,
}

impl Args {
    /// Whether the sizing search runs. Pass-through mode has no delays to
    /// compare, so it always evaluates the starting sizes only.
    pub fn sizing(&self) -> bool {
        !self.no_sizing && !self.pass_through
    }

    /// Options echoed at the top of the report.
    pub fn echo(&self) -> Vec<(String, String)> {
        let paths = |v: &[PathBuf]| {
            v.iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let opt_path = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none".to_string())
        };
        vec![
            ("config".into(), self.config.display().to_string()),
            ("output_dir".into(), self.output_dir.display().to_string()),
            ("sizing".into(), self.sizing().to_string()),
            ("area_opt_weight".into(), self.area_opt_weight.to_string()),
            ("delay_opt_weight".into(), self.delay_opt_weight.to_string()),
            ("max_iterations".into(), self.max_iterations.to_string()),
            ("re_erf".into(), self.re_erf.to_string()),
            ("opt_type".into(), format!("{:?}", self.opt_type).to_lowercase()),
            ("pass_through".into(), self.pass_through.to_string()),
            ("initial_sizes".into(), opt_path(&self.initial_sizes)),
            ("checkpoint_dirs".into(), paths(&self.checkpoint_dirs)),
            ("rrg_data_dir".into(), opt_path(&self.rrg_data_dir)),
            ("jobs".into(), self.jobs.to_string()),
            ("sim_timeout".into(), format!("{} s", self.sim_timeout)),
            ("simulator".into(), self.simulator.display().to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["tilesizer", "arch.yaml", "-o", "run"]).unwrap();
        assert_eq!(args.max_iterations, 6);
        assert_eq!(args.opt_type, OptMode::Global);
        assert_eq!(args.area_opt_weight, 1.0);
        assert!(!args.pass_through);
        assert!(args.checkpoint_dirs.is_empty());
    }

    #[test]
    fn test_full_command_line() {
        let args = Args::try_parse_from([
            "tilesizer",
            "arch.yaml",
            "--output-dir",
            "run",
            "--opt-type",
            "local",
            "--delay-opt-weight",
            "2",
            "--checkpoint-dirs",
            "a",
            "b",
            "--pass-through",
        ])
        .unwrap();
        assert_eq!(args.opt_type, OptMode::Local);
        assert_eq!(args.delay_opt_weight, 2.0);
        assert_eq!(args.checkpoint_dirs, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert!(args.echo().contains(&("opt_type".to_string(), "local".to_string())));
    }

    #[test]
    fn test_pass_through_disables_sizing() {
        let args =
            Args::try_parse_from(["tilesizer", "arch.yaml", "-o", "run", "--pass-through"]).unwrap();
        assert!(!args.no_sizing);
        assert!(!args.sizing());
        assert!(args.echo().contains(&("sizing".to_string(), "false".to_string())));

        let args = Args::try_parse_from(["tilesizer", "arch.yaml", "-o", "run"]).unwrap();
        assert!(args.sizing());
    }

    #[test]
    fn test_output_dir_is_required() {
        assert!(Args::try_parse_from(["tilesizer", "arch.yaml"]).is_err());
    }
}
