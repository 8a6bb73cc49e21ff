//! Composite delay entries and the representative critical path.

use std::collections::{BTreeMap, BTreeSet};

use crate::blocks::{hardblock, Library};
use crate::config::TileConfig;
use crate::maps::{is_valid_delay, Delays, SENTINEL_DELAY};
use crate::tile::TileModel;

pub const REP_CRIT_PATH: &str = "rep_crit_path";

const RAM_READ: [&str; 3] = ["precharge", "sense_amp", "output_crossbar"];
const RAM_WRITE: [&str; 1] = ["write_driver"];
const RAM_DECODER: [&str; 3] = ["row_decoder_stage0", "row_decoder_stage3", "wordline_driver"];

fn delay(delays: &Delays, key: &str) -> f64 {
    delays.get(key).copied().unwrap_or(SENTINEL_DELAY)
}

/// Sum of `parts`, or the sentinel if any part is invalid.
fn chain(parts: &[f64]) -> f64 {
    if parts.iter().all(|d| is_valid_delay(*d)) {
        parts.iter().sum()
    } else {
        SENTINEL_DELAY
    }
}

/// Which entries make up the representative path and which subcircuits
/// feed each entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayPlan {
    /// Entries with a positive weight, in report order.
    entries: Vec<(String, f64)>,
    /// Subcircuit name to the entries it contributes to.
    contributors: BTreeMap<String, BTreeSet<String>>,
}

impl DelayPlan {
    pub fn new(config: &TileConfig, library: &Library) -> Self {
        let arch = &config.arch;
        let weights = &config.weights;
        let mut entries = Vec::new();
        let mut contributors: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut contribute = |sub: &str, entry: &str| {
            contributors
                .entry(sub.to_string())
                .or_default()
                .insert(entry.to_string());
        };

        entries.push(("sb_mux".to_string(), weights.sb_mux));
        for wire in &arch.wires {
            contribute(&format!("sb_mux_{}", wire.name), "sb_mux");
        }
        entries.push(("cb_mux".to_string(), weights.cb_mux));
        contribute("cb_mux", "cb_mux");
        entries.push(("local_mux".to_string(), weights.local_mux));
        contribute("local_mux", "local_mux");

        let fracturable = arch.fracturable_input();
        for x in arch.lut_inputs() {
            let entry = format!("lut_{x}");
            entries.push((entry.clone(), weights.lut_input(x)));
            if Some(x) == fracturable {
                contribute("flut_mux", &entry);
            } else {
                contribute("lut", &entry);
                contribute(&format!("lut_{x}_driver"), &entry);
                contribute(&format!("lut_{x}_not_driver"), &entry);
            }
        }

        entries.push(("local_ble_output".to_string(), weights.local_ble_output));
        contribute("local_ble_output", "local_ble_output");
        entries.push(("general_ble_output".to_string(), weights.general_ble_output));
        contribute("general_ble_output", "general_ble_output");

        if arch.carry_chain_enabled() {
            entries.push(("carry_chain".to_string(), weights.carry_chain));
            contribute("carry_chain", "carry_chain");
            contribute("carry_chain_mux", "carry_chain");
        }

        if config.bram.is_some() {
            entries.push(("ram".to_string(), weights.ram));
            for s in library.iter() {
                let name = s.name();
                if RAM_READ.contains(&name.as_str())
                    || RAM_WRITE.contains(&name.as_str())
                    || RAM_DECODER.contains(&name.as_str())
                    || name.starts_with("row_decoder_stage1_")
                {
                    contribute(&name, "ram");
                }
            }
        }

        for hb in &config.hardblocks {
            let entry = format!("hb_{}", hb.name);
            entries.push((entry.clone(), weights.hardblock));
            contribute(&hardblock::local_mux_name(hb), &entry);
            contribute(&hardblock::dedicated_out_name(hb), &entry);
        }

        entries.retain(|(_, w)| *w > 0.0);
        Self {
            entries,
            contributors,
        }
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.entries
    }

    fn participates(&self, entry: &str) -> bool {
        self.entries.iter().any(|(e, _)| e == entry)
    }

    /// Whether sizing `subcircuit` can change the representative path.
    pub fn contributes(&self, subcircuit: &str) -> bool {
        self.contributors
            .get(subcircuit)
            .map(|entries| entries.iter().any(|e| self.participates(e)))
            .unwrap_or(false)
    }

    /// Names of subcircuits the optimiser sweeps, in library order.
    pub fn swept(&self, library: &Library) -> Vec<String> {
        library
            .iter()
            .filter(|s| s.swept() && self.contributes(&s.name()))
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Adds composite entries and the representative path to merged
    /// measurements.
    pub fn compose(&self, model: &TileModel, delays: &mut Delays) {
        let config = model.config();
        let arch = &config.arch;
        let library = model.library();

        let mut total = 0.0;
        let mut weighted = 0.0;
        let mut valid = true;
        for wire in &arch.wires {
            let key = format!("sb_mux_{}", wire.name);
            let d = delay(delays, &key);
            let n = library.get(&key).map(|s| s.per_tile()).unwrap_or(1) as f64;
            valid &= is_valid_delay(d);
            total += n;
            weighted += n * d;
        }
        let sb = if valid && total > 0.0 {
            weighted / total
        } else {
            SENTINEL_DELAY
        };
        delays.insert("sb_mux".into(), sb);

        let fracturable = arch.fracturable_input();
        for x in arch.lut_inputs() {
            let key = format!("lut_{x}");
            let d = if Some(x) == fracturable {
                delay(delays, "flut_mux")
            } else {
                let d = delay(delays, &key).max(delay(delays, &format!("lut_{x}_not")));
                if is_valid_delay(d) {
                    d
                } else {
                    SENTINEL_DELAY
                }
            };
            delays.insert(key, d);
        }

        if arch.carry_chain_enabled() {
            let d = chain(&[delay(delays, "carry_chain"), delay(delays, "carry_chain_mux")]);
            delays.insert("carry_chain".into(), d);
        }

        if config.bram.is_some() {
            let stage1 = library
                .iter()
                .filter(|s| s.name().starts_with("row_decoder_stage1_"))
                .map(|s| delay(delays, &s.name()))
                .fold(0.0, f64::max);
            let mut decoder: Vec<f64> = RAM_DECODER.iter().map(|k| delay(delays, k)).collect();
            decoder.push(stage1);
            let decoder = chain(&decoder);
            let mut read = vec![decoder];
            read.extend(RAM_READ.iter().map(|k| delay(delays, k)));
            let mut write = vec![decoder];
            write.extend(RAM_WRITE.iter().map(|k| delay(delays, k)));
            let ram = chain(&read).max(chain(&write));
            delays.insert("row_decoder_path".into(), decoder);
            delays.insert("ram".into(), ram);
        }

        for hb in &config.hardblocks {
            let core = model
                .hb_core(&hb.name)
                .map(|c| c.delay)
                .unwrap_or(SENTINEL_DELAY);
            let mut parts = vec![delay(delays, &hardblock::local_mux_name(hb)), core];
            let dedicated = hardblock::dedicated_out_name(hb);
            if library.get(&dedicated).is_some() {
                parts.push(delay(delays, &dedicated));
            }
            delays.insert(format!("hb_{}", hb.name), chain(&parts));
        }

        let parts: Vec<(f64, f64)> = self
            .entries
            .iter()
            .map(|(key, w)| (*w, delay(delays, key)))
            .collect();
        let rep = if parts.iter().all(|(_, d)| is_valid_delay(*d)) {
            parts.iter().map(|(w, d)| w * d).sum()
        } else {
            SENTINEL_DELAY
        };
        delays.insert(REP_CRIT_PATH.into(), rep);
    }
}
