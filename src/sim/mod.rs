//! Simulator driver: runs decks and turns raw measurements into merged
//! delay and power entries.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;

use crate::error::Result;
use crate::maps::{Delays, Powers, SENTINEL_DELAY};
use crate::testbench::{Deck, MEAS_AVG_POWER, MEAS_LOGIC_LOW};

pub mod hspice;
pub mod mt0;
pub mod path;
pub mod pool;

pub use hspice::Hspice;
pub use pool::{CancelToken, SimPool};

/// Measurement values by name. Failed measurements are `None`.
pub type RawMeasurements = BTreeMap<String, Option<f64>>;

#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct SimJob {
    pub deck: String,
    /// Run directory holding the library bundle and deck directories.
    pub run_dir: PathBuf,
    pub measures: Vec<String>,
    #[builder(default = "Duration::from_secs(600)")]
    pub timeout: Duration,
}

impl SimJob {
    #[inline]
    pub fn builder() -> SimJobBuilder {
        SimJobBuilder::default()
    }
}

pub trait Simulator: Send + Sync {
    fn simulate(&self, job: &SimJob) -> Result<RawMeasurements>;
}

/// Skips simulation entirely. Every measurement fails, so every delay is
/// the sentinel.
#[derive(Debug, Default, Copy, Clone)]
pub struct PassThrough;

impl Simulator for PassThrough {
    fn simulate(&self, job: &SimJob) -> Result<RawMeasurements> {
        Ok(failed(job))
    }
}

/// A result with every declared measurement missing.
pub fn failed(job: &SimJob) -> RawMeasurements {
    job.measures.iter().map(|m| (m.clone(), None)).collect()
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Timing {
    /// Seconds.
    pub trise: f64,
    pub tfall: f64,
    pub valid: bool,
}

/// Measurements of one deck, checked for validity.
#[derive(Debug, Clone, PartialEq)]
pub struct DeckResult {
    pub weight: f64,
    /// By probe key.
    pub timings: BTreeMap<String, Timing>,
    /// Watts.
    pub power: f64,
    pub valid: bool,
}

impl DeckResult {
    /// A timing is valid when both edges were measured and are positive.
    /// The whole deck is invalid when any timing is, or when the output
    /// is not at logic low where it should be.
    pub fn from_raw(deck: &Deck, raw: &RawMeasurements, vdd: f64) -> Self {
        let value = |name: &str| raw.get(name).copied().flatten();
        let mut timings = BTreeMap::new();
        for probe in deck.probes() {
            let names = deck.measures_of(probe);
            let (trise, tfall) = (value(&names.trise), value(&names.tfall));
            let valid = matches!((trise, tfall), (Some(r), Some(f)) if r > 0.0 && f > 0.0);
            timings.insert(
                probe.key.clone(),
                Timing {
                    trise: trise.unwrap_or(SENTINEL_DELAY),
                    tfall: tfall.unwrap_or(SENTINEL_DELAY),
                    valid,
                },
            );
        }
        let logic_low = match value(MEAS_LOGIC_LOW) {
            Some(v) => v <= vdd / 2.0,
            None => true,
        };
        let valid = logic_low && timings.values().all(|t| t.valid);
        Self {
            weight: deck.weight,
            timings,
            power: value(MEAS_AVG_POWER).unwrap_or(0.0),
            valid,
        }
    }
}

/// Merged measurements of a candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Merged {
    pub delays: Delays,
    pub powers: Powers,
}

/// Merges deck results by key: edges and power are averaged with the
/// environment weights, validity is combined with AND and the delay is
/// the slower edge. Invalid keys get the sentinel delay.
pub fn merge(decks: &[Deck], results: &[DeckResult]) -> Merged {
    #[derive(Default)]
    struct Acc {
        weight: f64,
        trise: f64,
        tfall: f64,
        valid: bool,
        seen: bool,
    }

    let mut timing: BTreeMap<String, Acc> = BTreeMap::new();
    let mut power: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for (deck, result) in decks.iter().zip(results) {
        for (key, t) in &result.timings {
            let acc = timing.entry(key.clone()).or_default();
            acc.valid = (!acc.seen || acc.valid) && t.valid && result.valid;
            acc.seen = true;
            acc.weight += result.weight;
            acc.trise += result.weight * t.trise;
            acc.tfall += result.weight * t.tfall;
        }
        let p = power.entry(deck.primary.key.clone()).or_default();
        p.0 += result.weight;
        p.1 += result.weight * result.power;
    }

    let mut merged = Merged::default();
    for (key, acc) in timing {
        let delay = if acc.valid && acc.weight > 0.0 {
            (acc.trise / acc.weight).max(acc.tfall / acc.weight)
        } else {
            SENTINEL_DELAY
        };
        merged.delays.insert(key, delay);
    }
    for (key, (weight, total)) in power {
        let avg = if weight > 0.0 { total / weight } else { 0.0 };
        merged.powers.insert(key, avg);
    }
    merged
}

#[cfg(test)]
pub(crate) mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::testbench::Probe;

    /// Answers every timing measurement with fixed edges and power.
    #[derive(Debug, Clone, Copy)]
    pub(crate) struct FixedSimulator {
        pub edge: f64,
        pub power: f64,
    }

    impl Simulator for FixedSimulator {
        fn simulate(&self, job: &SimJob) -> Result<RawMeasurements> {
            Ok(job
                .measures
                .iter()
                .map(|m| {
                    let value = if m.ends_with("_trise") || m.ends_with("_tfall") {
                        self.edge
                    } else if m == MEAS_AVG_POWER {
                        self.power
                    } else {
                        0.0
                    };
                    (m.clone(), Some(value))
                })
                .collect())
        }
    }

    fn deck(key: &str, weight: f64) -> Deck {
        Deck {
            name: key.into(),
            description: String::new(),
            weight,
            stop_ns: 4.0,
            primary: Probe::new(key, "n_1", "n_2", false),
            subs: vec![],
            complement: false,
            clocked: false,
            elements: vec![],
        }
    }

    fn raw(trise: Option<f64>, tfall: Option<f64>, low: f64) -> RawMeasurements {
        RawMeasurements::from([
            ("meas_total_trise".to_string(), trise),
            ("meas_total_tfall".to_string(), tfall),
            (MEAS_AVG_POWER.to_string(), Some(1e-6)),
            (MEAS_LOGIC_LOW.to_string(), Some(low)),
        ])
    }

    #[test]
    fn test_validity_rules() {
        let d = deck("cb_mux", 1.0);
        assert!(DeckResult::from_raw(&d, &raw(Some(5e-11), Some(4e-11), 0.0), 0.8).valid);
        assert!(!DeckResult::from_raw(&d, &raw(None, Some(4e-11), 0.0), 0.8).valid);
        assert!(!DeckResult::from_raw(&d, &raw(Some(-1e-12), Some(4e-11), 0.0), 0.8).valid);
        assert!(!DeckResult::from_raw(&d, &raw(Some(5e-11), Some(4e-11), 0.6), 0.8).valid);
    }

    #[test]
    fn test_weighted_merge() {
        let decks = vec![deck("sb_mux_L4", 0.25), deck("sb_mux_L4", 0.75)];
        let results = vec![
            DeckResult::from_raw(&decks[0], &raw(Some(40e-12), Some(20e-12), 0.0), 0.8),
            DeckResult::from_raw(&decks[1], &raw(Some(80e-12), Some(100e-12), 0.0), 0.8),
        ];
        let merged = merge(&decks, &results);
        // trise 70 ps, tfall 80 ps
        assert_relative_eq!(merged.delays["sb_mux_L4"], 80e-12, max_relative = 1e-12);
        assert_relative_eq!(merged.powers["sb_mux_L4"], 1e-6);
    }

    #[test]
    fn test_one_invalid_environment_poisons_key() {
        let decks = vec![deck("cb_mux", 0.5), deck("cb_mux", 0.5)];
        let results = vec![
            DeckResult::from_raw(&decks[0], &raw(Some(40e-12), Some(20e-12), 0.0), 0.8),
            DeckResult::from_raw(&decks[1], &raw(None, None, 0.0), 0.8),
        ];
        let merged = merge(&decks, &results);
        assert_eq!(merged.delays["cb_mux"], SENTINEL_DELAY);
    }

    #[test]
    fn test_pass_through_fails_everything() {
        let job = SimJob::builder()
            .deck("lut")
            .run_dir("/tmp/run")
            .measures(vec!["meas_total_tfall".to_string()])
            .build()
            .unwrap();
        assert_eq!(PassThrough.simulate(&job).unwrap()["meas_total_tfall"], None);
    }
}
