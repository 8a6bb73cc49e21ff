//! Sizing state saved after every pass, and the other ways a run can be
//! seeded.

use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TileError};
use crate::eval::Evaluation;
use crate::maps::{Areas, Delays, Sizes, Widths, Wires};
use crate::paths::{out_checkpoint, out_checkpoints};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Passes completed.
    pub iteration: usize,
    pub cost: f64,
    /// Consecutive passes whose improvement fell below the threshold.
    pub stall_passes: usize,
    pub sizes: Sizes,
    pub areas: Areas,
    pub widths: Widths,
    pub wires: Wires,
    pub delays: Delays,
}

impl Checkpoint {
    pub fn new(iteration: usize, stall_passes: usize, eval: &Evaluation) -> Self {
        Self {
            iteration,
            cost: eval.cost,
            stall_passes,
            sizes: eval.sizes.clone(),
            areas: eval.state.areas.clone(),
            widths: eval.state.widths.clone(),
            wires: eval.state.wires.clone(),
            delays: eval.delays.clone(),
        }
    }

    /// Writes `checkpoints/pass_<iteration>.json` under `out_dir`.
    pub fn save(&self, out_dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = out_checkpoint(&out_dir, self.iteration);
        std::fs::create_dir_all(out_checkpoints(&out_dir))?;
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// The checkpoint with the highest pass number in `dir`.
    ///
    /// `dir` may be a run directory or its `checkpoints` subdirectory.
    pub fn latest(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let nested = out_checkpoints(dir);
        let dir = if nested.is_dir() { nested } else { dir.to_path_buf() };
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| TileError::Environment(format!("cannot read checkpoints in {dir:?}: {e}")))?;

        let mut newest: Option<(usize, PathBuf)> = None;
        for entry in entries {
            let path = entry?.path();
            let pass = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("pass_"))
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<usize>().ok());
            if let Some(pass) = pass {
                if newest.as_ref().map(|(p, _)| pass > *p).unwrap_or(true) {
                    newest = Some((pass, path));
                }
            }
        }
        let (_, path) = newest
            .ok_or_else(|| TileError::Environment(format!("no checkpoints found in {dir:?}")))?;
        info!("Loading checkpoint {path:?}");
        Self::load(path)
    }
}

/// Loads the newest checkpoint of each directory in order. Sizes from
/// later directories override earlier ones; the counters come from the
/// last directory.
pub fn resume(dirs: &[PathBuf]) -> Result<Option<Checkpoint>> {
    let mut merged: Option<Checkpoint> = None;
    for dir in dirs {
        let next = Checkpoint::latest(dir)?;
        merged = Some(match merged {
            None => next,
            Some(mut prev) => {
                let mut sizes = std::mem::take(&mut prev.sizes);
                sizes.extend(next.sizes.clone());
                Checkpoint { sizes, ..next }
            }
        });
    }
    Ok(merged)
}

/// Applies a `name = value` sizes file on top of `base`.
///
/// Names are device names (`inv_lut_a_driver_1_nmos`) or transistor names,
/// which set every device of the transistor.
pub fn apply_initial_sizes(text: &str, base: &Sizes) -> Result<Sizes> {
    let mut sizes = base.clone();
    for (n, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once('=')
            .ok_or_else(|| TileError::FileFormat(format!("initial sizes line {}: expected `name = value`", n + 1)))?;
        let name = name.trim();
        let value: f64 = value.trim().parse().map_err(|_| {
            TileError::FileFormat(format!("initial sizes line {}: invalid size for `{name}`", n + 1))
        })?;
        if !(value > 0.0) || !value.is_finite() {
            return Err(TileError::FileFormat(format!(
                "initial sizes line {}: size of `{name}` must be positive",
                n + 1
            )));
        }

        if base.contains_key(name) {
            sizes.insert(name.to_string(), value);
            continue;
        }
        let devices: Vec<String> = ["nmos", "pmos"]
            .iter()
            .map(|d| format!("{name}_{d}"))
            .filter(|d| base.contains_key(d))
            .collect();
        if devices.is_empty() {
            return Err(TileError::generation("initial sizes", name));
        }
        for device in devices {
            sizes.insert(device, value);
        }
    }
    Ok(sizes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::tests::minimal_model;

    fn checkpoint(iteration: usize, size: f64) -> Checkpoint {
        let mut sizes = Sizes::new();
        sizes.insert("inv_cb_mux_1_nmos".into(), size);
        sizes.insert(format!("ptran_pass_{iteration}_nmos"), 1.0);
        let mut delays = Delays::new();
        delays.insert("cb_mux".into(), 41.5e-12);
        Checkpoint {
            iteration,
            cost: 3.25e-5,
            stall_passes: 1,
            sizes,
            areas: Areas::new(),
            widths: Widths::new(),
            wires: Wires::new(),
            delays,
        }
    }

    #[test]
    fn test_save_and_reload_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let cp = checkpoint(2, 3.0);
        let path = cp.save(dir.path()).unwrap();
        assert!(path.ends_with("checkpoints/pass_2.json"));
        assert_eq!(Checkpoint::load(&path).unwrap(), cp);
    }

    #[test]
    fn test_latest_picks_highest_pass() {
        let dir = tempfile::tempdir().unwrap();
        checkpoint(2, 3.0).save(dir.path()).unwrap();
        checkpoint(10, 5.0).save(dir.path()).unwrap();
        checkpoint(9, 4.0).save(dir.path()).unwrap();
        assert_eq!(Checkpoint::latest(dir.path()).unwrap().iteration, 10);
    }

    #[test]
    fn test_later_directories_override() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        checkpoint(1, 3.0).save(a.path()).unwrap();
        checkpoint(4, 6.0).save(b.path()).unwrap();
        let cp = resume(&[a.path().to_path_buf(), b.path().to_path_buf()])
            .unwrap()
            .unwrap();
        assert_eq!(cp.iteration, 4);
        assert_eq!(cp.sizes["inv_cb_mux_1_nmos"], 6.0);
        assert!(cp.sizes.contains_key("ptran_pass_1_nmos"));
        assert!(cp.sizes.contains_key("ptran_pass_4_nmos"));
    }

    #[test]
    fn test_missing_checkpoint_is_environment_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = resume(&[dir.path().join("nope")]).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_initial_sizes_file() {
        let model = minimal_model();
        let base = model.library().initial_sizes();
        let (device, transistor) = {
            let t = model
                .library()
                .get("cb_mux")
                .unwrap()
                .transistors()
                .into_iter()
                .find(|t| t.follower().is_some())
                .unwrap();
            (t.nmos(), t)
        };
        let text = format!(
            "# seeded from a previous run\n{device} = 7\n\n{} = 3 # both devices\n",
            transistor.name
        );
        let sizes = apply_initial_sizes(&text, &base).unwrap();
        assert_eq!(sizes[&transistor.nmos()], 3.0);
        assert_eq!(sizes[&transistor.pmos()], 3.0);
        assert_eq!(sizes.len(), base.len());

        let err = apply_initial_sizes("inv_nothing_nmos = 2", &base).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(apply_initial_sizes("inv_x", &base).is_err());
    }
}
