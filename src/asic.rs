//! Hard block characterisation.
//!
//! The standard-cell flow that implements a hard block's core lives
//! outside this crate. It is reached through [`AsicFlow`], which returns
//! the core's area and critical path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::HardBlockParams;
use crate::error::{Result, TileError};

/// Area and delay of a hard block core, after scaling.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardBlockCore {
    /// nm^2.
    pub area: f64,
    /// Seconds.
    pub delay: f64,
}

pub trait AsicFlow: Send + Sync {
    fn synthesise(&self, hb: &HardBlockParams) -> Result<HardBlockCore>;
}

/// Used when no flow is available: the core occupies no area and its
/// delay is the user's lower bound.
#[derive(Debug, Default, Copy, Clone)]
pub struct UnsizedFlow;

impl AsicFlow for UnsizedFlow {
    fn synthesise(&self, hb: &HardBlockParams) -> Result<HardBlockCore> {
        Ok(HardBlockCore {
            area: 0.0,
            delay: hb.lower_bound_delay,
        })
    }
}

/// Runs each block's `flow_command` with the block name as its only
/// argument. The command prints `{"area": <nm^2>, "delay": <s>}` on
/// stdout. Blocks without a command are left unsized.
#[derive(Debug, Clone)]
pub struct CommandFlow {
    work_dir: PathBuf,
}

impl CommandFlow {
    pub fn new(work_dir: impl AsRef<Path>) -> Self {
        Self {
            work_dir: work_dir.as_ref().to_path_buf(),
        }
    }
}

impl AsicFlow for CommandFlow {
    fn synthesise(&self, hb: &HardBlockParams) -> Result<HardBlockCore> {
        let Some(command) = &hb.flow_command else {
            return UnsizedFlow.synthesise(hb);
        };
        let dir = self.work_dir.join(format!("hb_{}", hb.name));
        std::fs::create_dir_all(&dir)?;
        info!("Running ASIC flow for hard block `{}`", hb.name);

        let output = Command::new(command)
            .arg(&hb.name)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                TileError::Environment(format!("cannot run ASIC flow {command:?}: {e}"))
            })?;
        std::fs::write(dir.join("flow.err"), &output.stderr)?;
        if !output.status.success() {
            return Err(TileError::Environment(format!(
                "ASIC flow for `{}` exited with {}",
                hb.name, output.status
            )));
        }
        let core: HardBlockCore = serde_json::from_slice(&output.stdout)?;
        Ok(core)
    }
}

/// Characterises every hard block and applies its scale factors.
pub fn characterise(
    hardblocks: &[HardBlockParams],
    flow: &dyn AsicFlow,
) -> Result<BTreeMap<String, HardBlockCore>> {
    let mut cores = BTreeMap::new();
    for hb in hardblocks {
        let raw = flow.synthesise(hb)?;
        if raw.area == 0.0 {
            warn!("Hard block `{}` is unsized; using its lower bound delay", hb.name);
        }
        let delay = raw.delay.max(hb.lower_bound_delay) / hb.freq_scale;
        cores.insert(
            hb.name.clone(),
            HardBlockCore {
                area: raw.area * hb.area_scale,
                delay,
            },
        );
    }
    Ok(cores)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::blocks::hardblock::tests::dsp;

    struct FixedFlow;

    impl AsicFlow for FixedFlow {
        fn synthesise(&self, _hb: &HardBlockParams) -> Result<HardBlockCore> {
            Ok(HardBlockCore {
                area: 1.0e9,
                delay: 2.0e-9,
            })
        }
    }

    #[test]
    fn test_unsized_block() {
        let cores = characterise(&[dsp()], &UnsizedFlow).unwrap();
        assert_eq!(cores["dsp"].area, 0.0);
        assert_relative_eq!(cores["dsp"].delay, 1.0e-9);
    }

    #[test]
    fn test_scale_factors() {
        let mut hb = dsp();
        hb.area_scale = 0.5;
        hb.freq_scale = 2.0;
        let cores = characterise(&[hb], &FixedFlow).unwrap();
        assert_relative_eq!(cores["dsp"].area, 5.0e8);
        assert_relative_eq!(cores["dsp"].delay, 1.0e-9);
    }

    #[test]
    fn test_missing_flow_binary() {
        let dir = tempfile::tempdir().unwrap();
        let mut hb = dsp();
        hb.flow_command = Some(PathBuf::from("/nonexistent/asic_flow"));
        let err = CommandFlow::new(dir.path()).synthesise(&hb).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
