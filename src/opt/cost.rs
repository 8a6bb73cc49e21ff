use serde::{Deserialize, Serialize};

/// Exponents of the area-delay cost.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostWeights {
    pub area: f64,
    pub delay: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            area: 1.0,
            delay: 1.0,
        }
    }
}

/// `tile_area^α · rep_crit_path^β`. Non-finite inputs give an infinite cost.
pub fn cost(tile_area: f64, rep_crit_path: f64, weights: CostWeights) -> f64 {
    let c = tile_area.powf(weights.area) * rep_crit_path.powf(weights.delay);
    if c.is_finite() {
        c
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::maps::SENTINEL_DELAY;

    #[test]
    fn test_sentinel_delay_leaves_area_cost() {
        let c = cost(2.5e6, SENTINEL_DELAY, CostWeights::default());
        assert_relative_eq!(c, 2.5e6);
    }

    #[test]
    fn test_exponents() {
        let w = CostWeights {
            area: 1.0,
            delay: 2.0,
        };
        assert_relative_eq!(cost(4.0, 3.0, w), 36.0);
        assert_eq!(cost(4.0, f64::NAN, w), f64::INFINITY);
    }
}
