//! Numbered step display for a command line run.

use std::collections::HashSet;
use std::time::Duration;

use colored::{ColoredString, Colorize};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::warn;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TaskKey {
    ParseConfig,
    BuildTile,
    GenerateLibrary,
    SizeTransistors,
    FinalEvaluation,
    WriteReport,
}

impl TaskKey {
    /// Tasks in the order a run completes them.
    pub const ORDER: [TaskKey; 6] = [
        TaskKey::ParseConfig,
        TaskKey::BuildTile,
        TaskKey::GenerateLibrary,
        TaskKey::SizeTransistors,
        TaskKey::FinalEvaluation,
        TaskKey::WriteReport,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::ParseConfig => "Parse configuration",
            Self::BuildTile => "Build tile",
            Self::GenerateLibrary => "Generate library",
            Self::SizeTransistors => "Size transistors",
            Self::FinalEvaluation => "Final evaluation",
            Self::WriteReport => "Write report",
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Status {
    Waiting,
    Running,
    Done,
    Off,
    Skipped,
    Failed,
}

impl Status {
    fn badge(self) -> ColoredString {
        match self {
            Self::Waiting => "waiting".blue(),
            Self::Running => "running".bright_white().bold(),
            Self::Done => "done".green().bold(),
            Self::Off => "off".dimmed(),
            Self::Skipped => "skipped".yellow(),
            Self::Failed => "FAILED".bright_white().on_red().bold(),
        }
    }
}

struct Row {
    key: TaskKey,
    enabled: bool,
    status: Status,
    bar: ProgressBar,
}

impl Row {
    fn show(&mut self, status: Status) {
        self.status = status;
        let lead = if status == Status::Running {
            "{spinner:.cyan}"
        } else {
            " "
        };
        let template = format!("{lead} {:>9} {{msg}}", status.badge());
        if let Ok(style) = ProgressStyle::with_template(&template) {
            self.bar.set_style(style);
        }
        match status {
            Status::Running => self.bar.enable_steady_tick(Duration::from_millis(120)),
            Status::Waiting => {}
            _ => self.bar.finish(),
        }
    }
}

/// One row per [`TaskKey`]. Exactly one enabled row runs at a time.
pub struct StepContext {
    rows: Vec<Row>,
    cursor: usize,
    _bars: MultiProgress,
}

impl StepContext {
    pub fn new(disabled: &HashSet<TaskKey>) -> Self {
        println!("Steps:");
        Self::with_target(disabled, ProgressDrawTarget::stderr())
    }

    fn with_target(disabled: &HashSet<TaskKey>, target: ProgressDrawTarget) -> Self {
        let bars = MultiProgress::with_draw_target(target);
        let total = TaskKey::ORDER
            .iter()
            .filter(|k| !disabled.contains(k))
            .count();
        let mut number = 0;
        let rows = TaskKey::ORDER
            .iter()
            .map(|&key| {
                let enabled = !disabled.contains(&key);
                let tag = if enabled {
                    number += 1;
                    format!("{number}/{total}")
                } else {
                    "-".to_string()
                };
                let bar = bars.add(ProgressBar::new_spinner());
                bar.set_message(format!("{tag:>5}  {}", key.label()));
                Row {
                    key,
                    enabled,
                    status: Status::Waiting,
                    bar,
                }
            })
            .collect();

        let mut ctx = Self {
            rows,
            cursor: 0,
            _bars: bars,
        };
        for row in ctx.rows.iter_mut() {
            row.show(if row.enabled {
                Status::Waiting
            } else {
                Status::Off
            });
        }
        ctx.start(0);
        ctx
    }

    /// Runs the first enabled row at or after `from`.
    fn start(&mut self, from: usize) {
        self.cursor = self
            .rows
            .iter()
            .skip(from)
            .position(|r| r.enabled)
            .map_or(self.rows.len(), |p| from + p);
        match self.rows.get_mut(self.cursor) {
            Some(row) => row.show(Status::Running),
            None => println!("\n\nCompleted all steps"),
        }
    }

    /// On error, fails the running row and skips every enabled row after it.
    pub fn check<T, E>(&mut self, res: Result<T, E>) -> Result<T, E> {
        if res.is_err() && self.cursor < self.rows.len() {
            let failed = self.cursor;
            for (idx, row) in self.rows.iter_mut().enumerate().skip(failed) {
                if idx == failed {
                    row.show(Status::Failed);
                } else if row.enabled {
                    row.show(Status::Skipped);
                }
            }
            self.cursor = self.rows.len();
            println!("\n");
        }
        res
    }

    pub fn finish(&mut self, key: TaskKey) {
        match self.rows.get_mut(self.cursor) {
            Some(row) if row.key == key => row.show(Status::Done),
            Some(_) => {
                warn!("Step {key:?} finished out of order");
                return;
            }
            None => {
                warn!("Step {key:?} finished with no step running");
                return;
            }
        }
        self.start(self.cursor + 1);
    }
}
