use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TileError};

/// Resistance and capacitance per nm of one metal layer.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetalLayer {
    /// Ohms per nm.
    pub r_per_nm: f64,
    /// Femtofarads per nm.
    pub c_per_nm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessParams {
    pub vdd: f64,
    pub vsram: f64,
    pub vsram_n: f64,
    /// Gate length in nm.
    pub gate_length: f64,
    /// Minimum transistor width in nm (or fins, for FinFET processes).
    pub min_tran_width: f64,
    /// Area of a minimum-width transistor in nm^2.
    pub min_width_tran_area: f64,
    /// SRAM cell area in minimum-width transistor areas.
    pub sram_cell_area: f64,
    pub rest_length_factor: f64,
    pub trans_diffusion_length: f64,
    pub model_path: PathBuf,
    pub model_library: String,
    /// Lower indices are thinner, lower layers.
    pub metal: Vec<MetalLayer>,
    /// Average routing metal pitch in nm.
    pub metal_pitch: f64,
}

impl ProcessParams {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("vdd", self.vdd),
            ("vsram", self.vsram),
            ("gate_length", self.gate_length),
            ("min_tran_width", self.min_tran_width),
            ("min_width_tran_area", self.min_width_tran_area),
            ("sram_cell_area", self.sram_cell_area),
            ("rest_length_factor", self.rest_length_factor),
            ("metal_pitch", self.metal_pitch),
        ] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(TileError::config(name, "must be a positive number"));
            }
        }
        if self.vsram_n > 0.0 {
            return Err(TileError::config("vsram_n", "must not be positive"));
        }
        if self.metal.is_empty() {
            return Err(TileError::config("metal", "at least one metal layer"));
        }
        for (idx, layer) in self.metal.iter().enumerate() {
            if layer.r_per_nm < 0.0 || layer.c_per_nm < 0.0 {
                return Err(TileError::config(
                    "metal",
                    format!("layer {idx} has negative resistance or capacitance"),
                ));
            }
        }
        Ok(())
    }

    /// Area of one SRAM configuration cell in nm^2.
    #[inline]
    pub fn sram_area_nm2(&self) -> f64 {
        self.sram_cell_area * self.min_width_tran_area
    }
}

/// Metal stack of a 22nm-class bulk process.
pub fn default_metal_stack() -> Vec<MetalLayer> {
    [
        (0.054825, 0.000175),
        (0.007862, 0.000215),
        (0.02924, 0.000139),
        (0.227273, 0.000201),
    ]
    .into_iter()
    .map(|(r_per_nm, c_per_nm)| MetalLayer { r_per_nm, c_per_nm })
    .collect()
}
