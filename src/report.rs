//! `report.txt` and the per-pass CSV logs.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tera::Context;

use crate::blocks::BlockClass;
use crate::error::Result;
use crate::eval::Evaluation;
use crate::maps::is_valid_delay;
use crate::opt::RunOutcome;
use crate::paths::{out_csv, out_report};
use crate::tech::TransistorKind;
use crate::telemetry::TelemetrySnapshot;
use crate::tile::TileModel;
use crate::TEMPLATES;

const NM2_PER_UM2: f64 = 1e6;

pub const CSV_CATEGORIES: [&str; 4] = ["sizes", "areas", "wire_lengths", "delays"];

#[derive(Debug, Clone, Serialize)]
struct Entry {
    label: String,
    value: String,
}

fn entry(label: impl Into<String>, value: impl Display) -> Entry {
    Entry {
        label: label.into(),
        value: value.to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
struct Summary {
    tile_area: String,
    rep_crit_path: String,
    cost: String,
}

#[derive(Debug, Clone, Serialize)]
struct ReportContext {
    options: Vec<Entry>,
    arch: Vec<Entry>,
    process: Vec<Entry>,
    table_header: String,
    table: Vec<String>,
    blocks: Vec<Entry>,
    vpr_delays: Vec<Entry>,
    vpr_areas: Vec<Entry>,
    warnings: Vec<String>,
    telemetry: TelemetrySnapshot,
    summary: Summary,
}

fn fmt_delay_ps(delay: Option<f64>) -> String {
    match delay {
        Some(d) if is_valid_delay(d) => format!("{:.3} ps", d * 1e12),
        Some(_) => "1 s (invalid)".to_string(),
        None => "-".to_string(),
    }
}

fn fmt_delay_s(delay: Option<f64>) -> String {
    match delay {
        Some(d) if is_valid_delay(d) => format!("{d:.6e}"),
        _ => "invalid".to_string(),
    }
}

fn table_row(name: &str, area: f64, delay: Option<f64>, power: Option<f64>) -> String {
    let power = power
        .map(|p| format!("{:.4}", p * 1e6))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{name:<32} {:>14.4} {:>16} {:>12}",
        area / NM2_PER_UM2,
        fmt_delay_ps(delay),
        power
    )
}

/// The LUT input an input driver name belongs to.
fn driver_input(name: &str) -> Option<&str> {
    name.strip_prefix("lut_")?
        .strip_suffix("_driver")
        .filter(|x| !x.ends_with("_not"))
}

pub struct Report<'a> {
    pub model: &'a TileModel,
    pub outcome: &'a RunOutcome,
    /// Run options as given on the command line.
    pub options: Vec<(String, String)>,
    pub telemetry: TelemetrySnapshot,
}

impl<'a> Report<'a> {
    /// Names of the rows in the subcircuit table, in order.
    pub fn rows(&self) -> Vec<String> {
        self.table().into_iter().map(|(name, _)| name).collect()
    }

    fn table(&self) -> Vec<(String, String)> {
        let eval = &self.outcome.evaluation;
        let areas = &eval.state.areas;
        let area = |name: &str| areas.with_sram(name).unwrap_or(0.0);
        let mut rows = Vec::new();
        for s in self.model.library().iter() {
            let name = s.name();
            if s.class() == BlockClass::Load || name.ends_with("_not_driver") {
                continue;
            }
            let (key, total) = match driver_input(&name) {
                Some(x) => {
                    let key = format!("lut_{x}");
                    let total = area(&name) + area(&format!("lut_{x}_not_driver"));
                    (key, total)
                }
                None => (name.to_string(), area(&name)),
            };
            let line = table_row(
                &key,
                total,
                eval.delays.get(&key).copied(),
                eval.powers.get(&key).copied(),
            );
            rows.push((key, line));
        }
        for hb in &self.model.config().hardblocks {
            let key = format!("hb_{}", hb.name);
            let line = table_row(&key, area(&key), eval.delays.get(&key).copied(), None);
            rows.push((key, line));
        }
        if self.model.config().bram.is_some() {
            let line = table_row("ram", area("ram"), eval.delays.get("ram").copied(), None);
            rows.push(("ram".to_string(), line));
        }
        rows
    }

    fn arch(&self) -> Vec<Entry> {
        let arch = &self.model.config().arch;
        let mut entries = vec![
            entry("N", arch.n),
            entry("K", arch.k.inputs()),
            entry("W", arch.w),
            entry("L", arch.l),
            entry("I", arch.i),
            entry("Fs", arch.fs),
            entry("Fcin", arch.fcin),
            entry("Fcout", arch.fcout),
            entry("Fclocal", arch.fclocal),
            entry("Ofb", arch.ofb),
            entry("Or", arch.or),
            entry(
                "Rsel",
                arch.rsel.map(String::from).unwrap_or_else(|| "z".to_string()),
            ),
            entry(
                "Rfb",
                if arch.rfb.is_empty() {
                    "z".to_string()
                } else {
                    arch.rfb.iter().collect()
                },
            ),
            entry("use_fluts", arch.use_fluts),
            entry("switch_type", format!("{:?}", arch.family.switch)),
            entry("transistor_type", format!("{:?}", arch.family.transistor)),
        ];
        match &arch.carry_chain {
            Some(cc) => {
                entries.push(entry("carry_chain_type", format!("{:?}", cc.kind)));
                entries.push(entry("FAs_per_flut", cc.fas_per_flut));
                entries.push(entry("skip_size", cc.skip_size));
            }
            None => entries.push(entry("enable_carry_chain", 0)),
        }
        for wire in &arch.wires {
            entries.push(entry(
                format!("wire {}", wire.name),
                format!(
                    "length {}, freq {}, metal {}, {} tracks",
                    wire.length,
                    wire.freq,
                    wire.metal,
                    arch.tracks(wire)
                ),
            ));
        }
        if let Some(bram) = &self.model.config().bram {
            entries.push(entry("row_decoder_bits", bram.row_decoder_bits));
            entries.push(entry("col_decoder_bits", bram.col_decoder_bits));
            entries.push(entry("conf_decoder_bits", bram.conf_decoder_bits));
            entries.push(entry("number_of_banks", bram.number_of_banks));
            entries.push(entry("memory_technology", format!("{:?}", bram.memory_technology)));
        }
        for hb in &self.model.config().hardblocks {
            entries.push(entry(format!("hardblock {}", hb.name), "enabled"));
        }
        entries
    }

    fn process(&self) -> Vec<Entry> {
        let p = &self.model.config().process;
        vec![
            entry("vdd", p.vdd),
            entry("vsram", p.vsram),
            entry("vsram_n", p.vsram_n),
            entry("gate_length", p.gate_length),
            entry("min_tran_width", p.min_tran_width),
            entry("min_width_tran_area", p.min_width_tran_area),
            entry("sram_cell_area", p.sram_cell_area),
            entry("rest_length_factor", p.rest_length_factor),
            entry("trans_diffusion_length", p.trans_diffusion_length),
            entry("model_path", p.model_path.display()),
            entry("model_library", &p.model_library),
            entry("metal_layers", p.metal.len()),
            entry("metal_pitch", p.metal_pitch),
        ]
    }

    fn blocks(&self) -> Vec<Entry> {
        let areas = &self.outcome.evaluation.state.areas;
        let mut keys: Vec<String> = [
            "sb_total",
            "cb_total",
            "local_mux_total",
            "lut_total",
            "ff_total",
            "ble_output_total",
            "cc_area_total",
            "logic_cluster",
            "tile_nonactive",
            "tile",
            "ram",
        ]
        .iter()
        .map(|k| k.to_string())
        .collect();
        keys.extend(
            self.model
                .config()
                .hardblocks
                .iter()
                .map(|hb| format!("hb_{}", hb.name)),
        );
        keys.into_iter()
            .filter_map(|k| {
                let v = areas.get(&k)?;
                Some(entry(k, format!("{:.4}", v / NM2_PER_UM2)))
            })
            .collect()
    }

    fn vpr_delays(&self) -> Vec<Entry> {
        let delays = &self.outcome.evaluation.delays;
        let d = |key: &str| fmt_delay_s(delays.get(key).copied());
        let arch = &self.model.config().arch;
        let mut entries = vec![
            entry("T_sb", d("sb_mux")),
            entry("T_ipin_cblock", d("cb_mux")),
            entry("T_local_mux", d("local_mux")),
        ];
        for x in arch.lut_inputs() {
            entries.push(entry(format!("T_lut_{x}"), d(&format!("lut_{x}"))));
        }
        entries.push(entry("T_clk_to_Q", d("ff")));
        entries.push(entry("T_local_ble_output", d("local_ble_output")));
        entries.push(entry("T_comb", d("general_ble_output")));
        if arch.carry_chain_enabled() {
            entries.push(entry("T_carry_chain", d("carry_chain")));
        }
        if self.model.config().bram.is_some() {
            entries.push(entry("T_ram", d("ram")));
        }
        entries
    }

    fn vpr_areas(&self) -> Vec<Entry> {
        let eval = &self.outcome.evaluation;
        let mwta = self.model.area_model().min_width_tran_area;
        let mut entries = vec![entry(
            "grid_logic_tile_area",
            format!("{:.3}", eval.tile_area() / mwta),
        )];
        if let Some(wire) = self.model.config().arch.wires.first() {
            let name = format!("sb_mux_{}", wire.name);
            if let Some(sb) = self.model.library().get(&name) {
                let transistors = sb.transistors();
                if let Some(pass) = transistors
                    .iter()
                    .find(|t| matches!(t.kind, TransistorKind::Ptran | TransistorKind::Tgate))
                {
                    if let Some(size) = eval.sizes.get(&pass.primary()) {
                        entries.push(entry("mux_trans_size", size));
                    }
                }
                let buf: f64 = transistors
                    .iter()
                    .filter(|t| t.kind == TransistorKind::Inv)
                    .filter_map(|t| eval.state.areas.get(&t.name))
                    .sum();
                entries.push(entry("buf_size", format!("{:.3}", buf / mwta)));
            }
        }
        entries
    }

    pub fn render(&self) -> Result<String> {
        let eval = &self.outcome.evaluation;
        let rep = eval.rep_crit_path();
        let ctx = ReportContext {
            options: self
                .options
                .iter()
                .map(|(k, v)| entry(k.as_str(), v))
                .collect(),
            arch: self.arch(),
            process: self.process(),
            table_header: format!(
                "{:<32} {:>14} {:>16} {:>12}",
                "subcircuit", "area (um^2)", "delay", "power (uW)"
            ),
            table: self.table().into_iter().map(|(_, line)| line).collect(),
            blocks: self.blocks(),
            vpr_delays: self.vpr_delays(),
            vpr_areas: self.vpr_areas(),
            warnings: self.outcome.warnings.clone(),
            telemetry: self.telemetry,
            summary: Summary {
                tile_area: format!("{:.4}", eval.tile_area() / NM2_PER_UM2),
                rep_crit_path: fmt_delay_ps(Some(rep)),
                cost: format!("{:.6e}", eval.cost),
            },
        };
        Ok(TEMPLATES.render("report.txt", &Context::from_serialize(ctx)?)?)
    }

    pub fn write(&self, out_dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = out_report(out_dir);
        std::fs::write(&path, self.render()?)?;
        Ok(path)
    }
}

/// Appends one row per pass to `sizes.csv`, `areas.csv`,
/// `wire_lengths.csv` and `delays.csv`. The first row of a run truncates
/// the files and writes the header.
#[derive(Debug, Clone)]
pub struct CsvLogs {
    dir: PathBuf,
    headers: BTreeMap<&'static str, Vec<String>>,
}

impl CsvLogs {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            headers: BTreeMap::new(),
        }
    }

    pub fn append(&mut self, iteration: usize, eval: &Evaluation) -> Result<()> {
        let wire_lengths: BTreeMap<String, f64> = eval
            .state
            .wires
            .iter()
            .map(|(k, w)| (k.clone(), w.length))
            .collect();
        self.write_row("sizes", iteration, &eval.sizes)?;
        self.write_row("areas", iteration, &eval.state.areas)?;
        self.write_row("wire_lengths", iteration, &wire_lengths)?;
        self.write_row("delays", iteration, &eval.delays)?;
        Ok(())
    }

    fn write_row(
        &mut self,
        category: &'static str,
        iteration: usize,
        values: &BTreeMap<String, f64>,
    ) -> Result<()> {
        let path = out_csv(&self.dir, category);
        let mut file = if self.headers.contains_key(category) {
            OpenOptions::new().append(true).open(&path)?
        } else {
            let keys: Vec<String> = values.keys().cloned().collect();
            let mut file = std::fs::File::create(&path)?;
            writeln!(file, "iteration,{}", keys.join(","))?;
            self.headers.insert(category, keys);
            file
        };
        let mut line = iteration.to_string();
        for key in self.headers.get(category).into_iter().flatten() {
            line.push(',');
            if let Some(v) = values.get(key) {
                line.push_str(&v.to_string());
            }
        }
        writeln!(file, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::eval::Evaluator;
    use crate::opt::cost::CostWeights;
    use crate::opt::Termination;
    use crate::sim::{CancelToken, PassThrough, SimPool};
    use crate::telemetry::Telemetry;
    use crate::tile::tests::minimal_model;

    fn outcome(model: &TileModel, dir: &Path) -> RunOutcome {
        let pool = SimPool::new(2, CancelToken::new()).unwrap();
        let telemetry = Telemetry::new();
        let eval = Evaluator::new(
            model,
            &PassThrough,
            &pool,
            &telemetry,
            dir,
            CostWeights::default(),
            Duration::from_secs(1),
        )
        .unwrap();
        RunOutcome {
            evaluation: eval.evaluate(&model.library().initial_sizes()).unwrap(),
            passes: 0,
            termination: Termination::Skipped,
            warnings: vec!["wire lengths did not settle".to_string()],
        }
    }

    #[test]
    fn test_driver_input() {
        assert_eq!(driver_input("lut_c_driver"), Some("c"));
        assert_eq!(driver_input("lut_c_not_driver"), None);
        assert_eq!(driver_input("lut_output_load"), None);
    }

    #[test]
    fn test_report_sections() {
        let dir = tempfile::tempdir().unwrap();
        let model = minimal_model();
        let outcome = outcome(&model, dir.path());
        let report = Report {
            model: &model,
            outcome: &outcome,
            options: vec![("pass_through".to_string(), "true".to_string())],
            telemetry: TelemetrySnapshot::default(),
        };
        assert_eq!(
            report.rows(),
            vec![
                "sb_mux_L4",
                "cb_mux",
                "local_mux",
                "lut_a",
                "lut_b",
                "lut_c",
                "lut_d",
                "lut",
                "local_ble_output",
                "general_ble_output",
                "ff"
            ]
        );
        let path = report.write(dir.path()).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let order = [
            "RUN OPTIONS",
            "ARCHITECTURE PARAMETERS",
            "PROCESS PARAMETERS",
            "SUBCIRCUIT AREA",
            "BLOCK AREAS",
            "VPR DELAYS",
            "VPR AREAS",
            "WARNINGS",
            "TELEMETRY",
            "SUMMARY",
        ];
        let positions: Vec<usize> = order.iter().map(|s| text.find(s).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(text.contains("pass_through: true"));
        assert!(text.contains("1 s (invalid)"));
        assert!(text.contains("grid_logic_tile_area"));
    }

    #[test]
    fn test_csv_logs() {
        let dir = tempfile::tempdir().unwrap();
        let model = minimal_model();
        let outcome = outcome(&model, dir.path());
        let mut logs = CsvLogs::new(dir.path());
        logs.append(0, &outcome.evaluation).unwrap();
        logs.append(1, &outcome.evaluation).unwrap();
        for category in CSV_CATEGORIES {
            let text = std::fs::read_to_string(out_csv(dir.path(), category)).unwrap();
            let lines: Vec<&str> = text.lines().collect();
            assert_eq!(lines.len(), 3);
            assert!(lines[0].starts_with("iteration,"));
            assert!(lines[2].starts_with("1,"));
            assert_eq!(
                lines[0].split(',').count(),
                lines[1].split(',').count()
            );
        }
    }
}
