//! Simulation decks.
//!
//! A deck is a series of library cells between the pulse source `n_in`
//! and a terminal load. Cells under test are powered from `vdd_dut` so
//! their power is integrated separately from the wave-shaping stages.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;
use tera::Context;

use crate::error::Result;
use crate::paths::{out_deck, out_deck_dir};
use crate::spice::primitives::{self, BASIC_SUBCIRCUITS, INCLUDES, PROCESS_DATA, SUBCIRCUITS};
use crate::tile::TileModel;
use crate::TEMPLATES;

pub mod coverage;

pub use coverage::decks;

/// Transient step of ordinary candidate evaluations.
pub const STEP: &str = "1p";
/// Transient step used when re-evaluating the best candidates.
pub const FINE_STEP: &str = "0.1p";

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Rail {
    /// Wave shaping and loads.
    Env,
    /// Cells whose power is measured.
    Dut,
}

impl Rail {
    fn net(&self) -> &'static str {
        match self {
            Rail::Env => "vdd",
            Rail::Dut => "vdd_dut",
        }
    }
}

/// A delay measured between two deck nodes and stored under `key`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Probe {
    pub key: String,
    pub from: String,
    pub to: String,
    pub inverting: bool,
}

impl Probe {
    pub fn new(key: impl Into<String>, from: &str, to: &str, inverting: bool) -> Self {
        Self {
            key: key.into(),
            from: from.to_string(),
            to: to.to_string(),
            inverting,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deck {
    pub name: String,
    pub description: String,
    /// Share of this environment when several decks measure one key.
    pub weight: f64,
    pub stop_ns: f64,
    pub primary: Probe,
    pub subs: Vec<Probe>,
    /// Drives `n_in_n` with the complement of `n_in`.
    pub complement: bool,
    /// Measures from the rising edges of `clk` instead of `n_in`.
    pub clocked: bool,
    pub elements: Vec<String>,
}

/// Measurement names of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeMeasures {
    pub tfall: String,
    pub trise: String,
}

pub const MEAS_AVG_POWER: &str = "meas_avg_power";
pub const MEAS_LOGIC_LOW: &str = "meas_logic_low_voltage";

#[derive(Serialize)]
struct MeasureLine {
    name: String,
    trig: String,
    trig_edge: &'static str,
    targ: String,
    targ_edge: &'static str,
}

#[derive(Serialize)]
struct ClockContext {
    delay: String,
    width: String,
    period: String,
}

#[derive(Serialize)]
struct DeckContext<'a> {
    name: &'a str,
    description: &'a str,
    includes: String,
    step: &'a str,
    stop: String,
    t_edge: String,
    width: String,
    complement: bool,
    clock: Option<ClockContext>,
    elements: &'a [String],
    measures: Vec<MeasureLine>,
    probe_out: &'a str,
    quiet: String,
}

fn ns(value: f64) -> String {
    format!("{}n", (value * 1e4).round() / 1e4)
}

impl Deck {
    pub fn probes(&self) -> impl Iterator<Item = &Probe> {
        std::iter::once(&self.primary).chain(self.subs.iter())
    }

    pub fn measures_of(&self, probe: &Probe) -> ProbeMeasures {
        let stem = if probe == &self.primary {
            "total".to_string()
        } else {
            probe.key.to_lowercase()
        };
        ProbeMeasures {
            tfall: format!("meas_{stem}_tfall"),
            trise: format!("meas_{stem}_trise"),
        }
    }

    /// Every measurement the deck declares.
    pub fn measure_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for probe in self.probes() {
            let m = self.measures_of(probe);
            names.push(m.tfall);
            names.push(m.trise);
        }
        names.push("meas_current".into());
        names.push(MEAS_AVG_POWER.into());
        names.push(MEAS_LOGIC_LOW.into());
        names
    }

    fn measure_lines(&self) -> Vec<MeasureLine> {
        let mut lines = Vec::new();
        for probe in self.probes() {
            let m = self.measures_of(probe);
            let (fall_trig, rise_trig, trig) = if self.clocked && probe == &self.primary {
                ("RISE=1", "RISE=2", "clk".to_string())
            } else if probe.inverting {
                ("RISE=1", "FALL=1", probe.from.clone())
            } else {
                ("FALL=1", "RISE=1", probe.from.clone())
            };
            lines.push(MeasureLine {
                name: m.tfall,
                trig: trig.clone(),
                trig_edge: fall_trig,
                targ: probe.to.clone(),
                targ_edge: "FALL=1",
            });
            lines.push(MeasureLine {
                name: m.trise,
                trig,
                trig_edge: rise_trig,
                targ: probe.to.clone(),
                targ_edge: "RISE=1",
            });
        }
        lines
    }

    /// Time at which the primary output should sit at logic low.
    fn quiet_time(&self) -> f64 {
        let stop = self.stop_ns;
        if self.clocked {
            0.65 * stop
        } else if self.primary.inverting {
            0.95 * stop
        } else {
            0.45 * stop
        }
    }

    pub fn render(&self, step: &str) -> Result<String> {
        let stop = self.stop_ns;
        let clock = self.clocked.then(|| ClockContext {
            delay: ns(0.3 * stop),
            width: ns(0.2 * stop),
            period: ns(0.4 * stop),
        });
        let ctx = DeckContext {
            name: &self.name,
            description: &self.description,
            includes: Path::new("..").join(INCLUDES).display().to_string(),
            step,
            stop: ns(stop),
            t_edge: ns(0.1 * stop),
            width: ns(0.4 * stop),
            complement: self.complement,
            clock,
            elements: &self.elements,
            measures: self.measure_lines(),
            probe_out: &self.primary.to,
            quiet: ns(self.quiet_time()),
        };
        Ok(TEMPLATES.render("testbench.sp", &Context::from_serialize(ctx)?)?)
    }

    /// Writes `<run_dir>/<name>/<name>.sp`.
    pub fn write(&self, run_dir: impl AsRef<Path>, step: &str) -> Result<PathBuf> {
        let dir = out_deck_dir(&run_dir, &self.name);
        std::fs::create_dir_all(&dir)?;
        let path = out_deck(&run_dir, &self.name);
        std::fs::write(&path, self.render(step)?)?;
        Ok(path)
    }
}

/// Assembles the element list of one deck and tracks the polarity of
/// every node relative to `n_in`.
#[derive(Debug)]
pub(crate) struct DeckBuilder {
    node: String,
    count: usize,
    labels: BTreeMap<String, usize>,
    inverted: BTreeMap<String, bool>,
    elements: Vec<String>,
}

impl DeckBuilder {
    pub(crate) fn new() -> Self {
        let mut inverted = BTreeMap::new();
        inverted.insert("n_in".to_string(), false);
        inverted.insert("n_in_n".to_string(), true);
        Self {
            node: "n_in".to_string(),
            count: 0,
            labels: BTreeMap::new(),
            inverted,
            elements: Vec::new(),
        }
    }

    pub(crate) fn at(&self) -> String {
        self.node.clone()
    }

    pub(crate) fn goto(&mut self, node: &str) {
        self.node = node.to_string();
    }

    /// Whether the current node carries the complement of `n_in`.
    pub(crate) fn inverted(&self) -> bool {
        self.inverted.get(&self.node).copied().unwrap_or(false)
    }

    fn fresh(&mut self, inverting: bool) -> String {
        self.count += 1;
        let node = format!("n_{}", self.count);
        let polarity = self.inverted() ^ inverting;
        self.inverted.insert(node.clone(), polarity);
        node
    }

    fn label(&mut self, cell: &str) -> String {
        let idx = self.labels.entry(cell.to_string()).or_default();
        let label = format!("{cell}_{idx}");
        *idx += 1;
        label
    }

    fn gated(&mut self, cell: &str, rail: Rail, inverting: bool, gate: &str, gate_n: &str) -> String {
        let input = self.node.clone();
        let output = self.fresh(inverting);
        let label = self.label(cell);
        self.elements.push(format!(
            "X{label} {input} {output} {gate} {gate_n} {} gnd {cell}",
            rail.net()
        ));
        self.node = output.clone();
        output
    }

    /// Appends a cell with its switches on and returns its output node.
    pub(crate) fn stage(&mut self, cell: &str, rail: Rail, inverting: bool) -> String {
        self.gated(cell, rail, inverting, "vdd", "gnd")
    }

    pub(crate) fn clocked_stage(&mut self, cell: &str, rail: Rail, inverting: bool) -> String {
        self.gated(cell, rail, inverting, "clk", "clk_n")
    }

    /// Appends a LUT body whose SRAM input is the current node and whose
    /// selects are held so that every level passes its first branch.
    pub(crate) fn lut(&mut self, inputs: &[char], rail: Rail) -> String {
        let input = self.node.clone();
        self.lut_instance(&input, inputs, None, rail, true)
    }

    /// Appends a LUT body with its SRAM cells at logic low and input `x`
    /// driven by `sel`/`sel_n`. The output follows `sel`.
    pub(crate) fn selected_lut(
        &mut self,
        inputs: &[char],
        x: char,
        sel: &str,
        sel_n: &str,
        rail: Rail,
    ) -> String {
        self.node = sel.to_string();
        self.lut_instance("gnd", inputs, Some((x, sel, sel_n)), rail, false)
    }

    fn lut_instance(
        &mut self,
        sram: &str,
        inputs: &[char],
        toggled: Option<(char, &str, &str)>,
        rail: Rail,
        inverting: bool,
    ) -> String {
        let output = self.fresh(inverting);
        let label = self.label("lut");
        let mut line = format!("X{label} {sram} {output}");
        for x in inputs {
            match toggled {
                Some((t, sel, sel_n)) if t == *x => line.push_str(&format!(" {sel} {sel_n}")),
                _ => line.push_str(" vdd gnd"),
            }
        }
        line.push_str(&format!(" {} gnd lut", rail.net()));
        self.elements.push(line);
        self.node = output.clone();
        output
    }

    /// A probe between two nodes of this deck.
    pub(crate) fn probe(&self, key: &str, from: &str, to: &str) -> Probe {
        let polarity = |node: &str| self.inverted.get(node).copied().unwrap_or(false);
        Probe::new(key, from, to, polarity(from) != polarity(to))
    }

    pub(crate) fn finish(self) -> Vec<String> {
        self.elements
    }
}

/// Writes the shared library bundle into `run_dir`.
pub fn write_bundle(run_dir: impl AsRef<Path>, model: &TileModel) -> Result<()> {
    let run_dir = run_dir.as_ref();
    std::fs::create_dir_all(run_dir)?;
    let config = model.config();
    let family = &config.arch.family;

    std::fs::write(
        run_dir.join(BASIC_SUBCIRCUITS),
        primitives::basic_subcircuits(family)?,
    )?;
    std::fs::write(
        run_dir.join(PROCESS_DATA),
        primitives::process_data(&config.process, config.bram.as_ref())?,
    )?;
    std::fs::write(
        run_dir.join(INCLUDES),
        primitives::includes(&config.process.model_path, &config.process.model_library)?,
    )?;
    std::fs::write(run_dir.join(SUBCIRCUITS), model.library().netlist()?)?;
    debug!("Wrote library bundle to {run_dir:?}");
    Ok(())
}

/// Writes every deck and returns their paths in order.
pub fn write_decks(run_dir: impl AsRef<Path>, decks: &[Deck], step: &str) -> Result<Vec<PathBuf>> {
    decks.iter().map(|deck| deck.write(&run_dir, step)).collect()
}
