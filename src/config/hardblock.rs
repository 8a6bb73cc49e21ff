use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TileError};

/// A hard block (DSP, multiplier, ...) that sits in its own tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardBlockParams {
    pub name: String,
    pub num_gen_inputs: usize,
    pub num_gen_outputs: usize,
    pub num_dedicated_outputs: usize,
    /// Fraction of the hard-block tile inputs each local crossbar mux sees.
    pub crossbar_population: f64,
    pub area_scale: f64,
    pub freq_scale: f64,
    /// Critical path assumed when no ASIC flow sizes the block, in seconds.
    pub lower_bound_delay: f64,
    /// External ASIC flow command; `None` selects the unsized mode.
    pub flow_command: Option<PathBuf>,
}

impl HardBlockParams {
    pub fn local_mux_size(&self) -> usize {
        ((self.crossbar_population * self.num_gen_inputs as f64).ceil() as usize).max(2)
    }

    pub fn validate(&self) -> Result<()> {
        let option = format!("hardblocks.{}", self.name);
        if self.name.is_empty() || !self.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(TileError::config(
                "hardblocks.name",
                "names must be non-empty identifiers",
            ));
        }
        if self.num_gen_inputs == 0 || self.num_gen_outputs == 0 {
            return Err(TileError::config(
                option,
                "needs at least one general input and output",
            ));
        }
        if !(self.crossbar_population > 0.0 && self.crossbar_population <= 1.0) {
            return Err(TileError::config(
                option,
                "crossbar_population must be in (0, 1]",
            ));
        }
        if self.area_scale <= 0.0 || self.freq_scale <= 0.0 {
            return Err(TileError::config(option, "scale factors must be positive"));
        }
        if self.lower_bound_delay < 0.0 {
            return Err(TileError::config(
                option,
                "lower_bound_delay must not be negative",
            ));
        }
        Ok(())
    }
}
