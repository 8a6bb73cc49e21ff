//! Candidate sizes for the transistors of one subcircuit.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::maps::Sizes;
use crate::tech::Transistor;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepParams {
    /// Half-width of the sweep band relative to the current size.
    pub delta: f64,
    /// Steps taken on each side of the current size.
    pub steps: usize,
    /// Upper bound on candidates per subcircuit.
    pub max_combinations: usize,
}

impl Default for SweepParams {
    fn default() -> Self {
        Self {
            delta: 0.5,
            steps: 2,
            max_combinations: 64,
        }
    }
}

/// One point of a subcircuit's sweep, as device sizes to overwrite.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub changes: Vec<(String, f64)>,
}

impl Candidate {
    pub fn apply(&self, sizes: &mut Sizes) {
        for (device, size) in &self.changes {
            sizes.insert(device.clone(), *size);
        }
    }
}

/// Sizes `v + k·step` for `k` in `-n..=n`, clamped to `range`.
pub fn band(v: f64, range: (f64, f64), delta: f64, n: usize) -> Vec<f64> {
    let (lo, hi) = range;
    let n = n.max(1);
    let step = (v * delta / n as f64).round().max(1.0);
    let n = n as i64;
    let mut values: Vec<f64> = (-n..=n)
        .map(|k| (v + k as f64 * step).clamp(lo, hi))
        .collect();
    values.dedup();
    values
}

/// Every candidate for `transistors` around the current `sizes`, excluding
/// the current assignment itself.
///
/// When even single steps give more than `max_combinations` points, only a
/// window of transistors moves; `rotation` picks where the window starts so
/// successive passes reach all of them.
pub fn candidates(
    transistors: &[Transistor],
    sizes: &Sizes,
    pn_ratios: &BTreeMap<String, f64>,
    params: &SweepParams,
    rotation: usize,
) -> Result<Vec<Candidate>> {
    let swept: Vec<&Transistor> = transistors
        .iter()
        .filter(|t| {
            let (lo, hi) = t.kind.size_range();
            t.kind.is_swept() && hi > lo
        })
        .collect();
    if swept.is_empty() {
        return Ok(Vec::new());
    }

    let mut current = Vec::with_capacity(swept.len());
    let mut ratios = Vec::with_capacity(swept.len());
    for t in &swept {
        let v = sizes.require(&t.primary(), &t.name)?;
        let ratio = match t.follower() {
            Some(follower) => match pn_ratios.get(&t.name) {
                Some(r) => *r,
                None => sizes.require(&follower, &t.name)? / v,
            },
            None => 1.0,
        };
        current.push(v);
        ratios.push(ratio);
    }

    let bands = |n: usize| -> Vec<Vec<f64>> {
        swept
            .iter()
            .zip(&current)
            .map(|(t, v)| band(*v, t.kind.size_range(), params.delta, n))
            .collect()
    };
    let product = |lists: &[Vec<f64>]| lists.iter().map(Vec::len).product::<usize>();

    let mut n = params.steps.max(1);
    let mut lists = bands(n);
    while n > 1 && product(&lists) > params.max_combinations {
        n -= 1;
        lists = bands(n);
    }

    if product(&lists) > params.max_combinations {
        let count = lists.len();
        let start = rotation % count;
        let mut total = 1;
        for offset in 0..count {
            let i = (start + offset) % count;
            if total * lists[i].len() <= params.max_combinations {
                total *= lists[i].len();
            } else {
                lists[i] = vec![current[i]];
            }
        }
    }

    let candidates = lists
        .iter()
        .map(|l| l.iter().copied())
        .multi_cartesian_product()
        .filter(|combo| combo != &current)
        .map(|combo| {
            let mut changes = Vec::new();
            for ((t, value), ratio) in swept.iter().zip(combo).zip(&ratios) {
                changes.push((t.primary(), value));
                if let Some(follower) = t.follower() {
                    changes.push((follower, value * ratio));
                }
            }
            Candidate { changes }
        })
        .collect();
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::tech::TransistorKind;

    fn inv(tag: &str) -> Transistor {
        Transistor::new(TransistorKind::Inv, "cb_mux", tag)
    }

    #[test]
    fn test_band_clamps_to_range() {
        assert_eq!(band(4.0, (1.0, 24.0), 0.5, 2), vec![2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(band(1.0, (1.0, 12.0), 0.5, 2), vec![1.0, 2.0, 3.0]);
        assert_eq!(band(12.0, (1.0, 12.0), 0.5, 1), vec![6.0, 12.0]);
    }

    #[test]
    fn test_excludes_current_and_follows_ratio() {
        let t = inv("1");
        let mut sizes = Sizes::new();
        sizes.set_transistor(&t, 2.0, 4.0);
        let params = SweepParams {
            steps: 1,
            ..Default::default()
        };
        let cands = candidates(&[t.clone()], &sizes, &BTreeMap::new(), &params, 0).unwrap();
        assert_eq!(cands.len(), 2);
        for c in &cands {
            let mut s = sizes.clone();
            c.apply(&mut s);
            assert_relative_eq!(s[&t.pmos()], 2.0 * s[&t.nmos()]);
            assert_ne!(s[&t.nmos()], 2.0);
        }
    }

    #[test]
    fn test_pn_ratio_binding() {
        let t = inv("2");
        let mut sizes = Sizes::new();
        sizes.set_transistor(&t, 4.0, 4.0);
        let ratios = BTreeMap::from([(t.name.clone(), 1.5)]);
        let cands = candidates(&[t.clone()], &sizes, &ratios, &SweepParams::default(), 0).unwrap();
        for c in &cands {
            let mut s = sizes.clone();
            c.apply(&mut s);
            assert_relative_eq!(s[&t.pmos()], 1.5 * s[&t.nmos()]);
        }
    }

    #[test]
    fn test_combinations_are_bounded() {
        let ts: Vec<Transistor> = (0..4).map(|i| inv(&i.to_string())).collect();
        let mut sizes = Sizes::new();
        for t in &ts {
            sizes.set_transistor(t, 4.0, 8.0);
        }
        let params = SweepParams::default();
        let first = candidates(&ts, &sizes, &BTreeMap::new(), &params, 0).unwrap();
        assert!(first.len() < params.max_combinations);
        // 3^3 points, minus the current one
        assert_eq!(first.len(), 26);
        let moved = |cands: &[Candidate]| {
            cands
                .iter()
                .flat_map(|c| c.changes.iter())
                .filter(|(d, v)| d.ends_with("_nmos") && *v != 4.0)
                .map(|(d, _)| d.clone())
                .unique()
                .count()
        };
        assert_eq!(moved(&first), 3);
        let second = candidates(&ts, &sizes, &BTreeMap::new(), &params, 3).unwrap();
        assert!(second
            .iter()
            .flat_map(|c| c.changes.iter())
            .any(|(d, v)| d == &ts[3].nmos() && *v != 4.0));
    }

    #[test]
    fn test_restorers_are_not_swept() {
        let rest = Transistor::new(TransistorKind::Rest, "local_mux", "");
        let mut sizes = Sizes::new();
        sizes.set_transistor(&rest, 1.0, 1.0);
        let cands = candidates(&[rest], &sizes, &BTreeMap::new(), &SweepParams::default(), 0).unwrap();
        assert!(cands.is_empty());
    }
}
