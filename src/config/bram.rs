use serde::{Deserialize, Serialize};

use crate::error::{Result, TileError};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MemoryTechnology {
    #[serde(rename = "SRAM")]
    Sram,
    #[serde(rename = "MTJ")]
    Mtj,
}

/// Resistances of an MTJ storage element, in ohms.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtjResistance {
    pub r_high_worstcase: f64,
    pub r_low_worstcase: f64,
    pub r_high_nominal: f64,
    pub r_low_nominal: f64,
}

impl Default for MtjResistance {
    fn default() -> Self {
        Self {
            r_high_worstcase: 3_060.0,
            r_low_worstcase: 2_270.0,
            r_high_nominal: 6_250.0,
            r_low_nominal: 2_500.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BramParams {
    pub row_decoder_bits: usize,
    pub col_decoder_bits: usize,
    pub conf_decoder_bits: usize,
    pub number_of_banks: usize,
    pub memory_technology: MemoryTechnology,
    pub mtj: MtjResistance,
    pub vref: f64,
    pub vclmp: f64,
    pub sense_dv: f64,
}

impl BramParams {
    #[inline]
    pub fn rows(&self) -> usize {
        1 << self.row_decoder_bits
    }

    /// Widest configurable word.
    #[inline]
    pub fn max_word_width(&self) -> usize {
        1 << self.conf_decoder_bits
    }

    #[inline]
    pub fn cols(&self) -> usize {
        (1 << self.col_decoder_bits) * self.max_word_width()
    }

    pub fn bits(&self) -> usize {
        self.rows() * self.cols() * self.number_of_banks
    }

    pub fn validate(&self) -> Result<()> {
        if !(4..=9).contains(&self.row_decoder_bits) {
            return Err(TileError::config(
                "row_decoder_bits",
                "must be between 4 and 9",
            ));
        }
        if !(1..=4).contains(&self.col_decoder_bits) {
            return Err(TileError::config(
                "col_decoder_bits",
                "must be between 1 and 4",
            ));
        }
        if !(2..=6).contains(&self.conf_decoder_bits) {
            return Err(TileError::config(
                "conf_decoder_bits",
                "must be between 2 and 6",
            ));
        }
        if !(1..=2).contains(&self.number_of_banks) {
            return Err(TileError::config("number_of_banks", "must be 1 or 2"));
        }
        if self.sense_dv <= 0.0 {
            return Err(TileError::config("sense_dv", "must be positive"));
        }
        Ok(())
    }
}

/// Splits decoder address bits into predecoder groups of two and three bits.
///
/// Returns `(groups_of_two, groups_of_three)`. A single bit needs no
/// predecoding.
pub fn predecoder_groups(bits: usize) -> (usize, usize) {
    match bits % 3 {
        0 => (0, bits / 3),
        1 if bits >= 4 => (2, (bits - 4) / 3),
        1 => (0, 0),
        _ => (1, (bits - 2) / 3),
    }
}
