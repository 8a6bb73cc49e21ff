use serde::{Deserialize, Serialize};

/// Weights of the representative critical path.
///
/// The defaults do not sum to exactly one; the remainder stands for
/// flip-flop, IO and DSP delays that are not modelled here.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DelayWeights {
    pub sb_mux: f64,
    pub cb_mux: f64,
    pub local_mux: f64,
    pub lut_a: f64,
    pub lut_b: f64,
    pub lut_c: f64,
    pub lut_d: f64,
    pub lut_e: f64,
    pub lut_f: f64,
    pub local_ble_output: f64,
    pub general_ble_output: f64,
    pub ram: f64,
    pub carry_chain: f64,
    pub hardblock: f64,
}

impl DelayWeights {
    pub fn lut_input(&self, input: char) -> f64 {
        match input {
            'a' => self.lut_a,
            'b' => self.lut_b,
            'c' => self.lut_c,
            'd' => self.lut_d,
            'e' => self.lut_e,
            'f' => self.lut_f,
            _ => 0.0,
        }
    }
}

impl Default for DelayWeights {
    fn default() -> Self {
        Self {
            sb_mux: 0.4107,
            cb_mux: 0.0989,
            local_mux: 0.0736,
            lut_a: 0.0396,
            lut_b: 0.0379,
            lut_c: 0.0704,
            lut_d: 0.0202,
            lut_e: 0.0121,
            lut_f: 0.0186,
            local_ble_output: 0.0267,
            general_ble_output: 0.0326,
            ram: 0.15,
            carry_chain: 0.0,
            hardblock: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_lut_weights_sum() {
        let w = DelayWeights::default();
        let sum: f64 = "abcdef".chars().map(|c| w.lut_input(c)).sum();
        assert_relative_eq!(sum, 0.1988, epsilon = 1e-9);
        assert_eq!(w.lut_input('g'), 0.0);
    }
}
