//! Primitive devices and process-wide parameters shared by every deck.

use std::path::Path;

use crate::config::{BramParams, CircuitFamily, ProcessParams};
use crate::error::Result;
use crate::spice::SpiceWriter;

pub const BASIC_SUBCIRCUITS: &str = "basic_subcircuits.l";
pub const SUBCIRCUITS: &str = "subcircuits.l";
pub const PROCESS_DATA: &str = "process_data.l";
pub const INCLUDES: &str = "includes.l";
pub const SWEEP_DATA: &str = "sweep_data.l";
pub const WIRE_RC: &str = "wire_RC.l";

struct DeviceModels {
    nmos: &'static str,
    pmos: &'static str,
    width_key: &'static str,
}

impl DeviceModels {
    fn new(family: &CircuitFamily) -> Self {
        let (nmos, pmos) = if family.low_power {
            ("nmos_lp", "pmos_lp")
        } else {
            ("nmos", "pmos")
        };
        let width_key = if family.use_finfet() { "nfin" } else { "W" };
        Self {
            nmos,
            pmos,
            width_key,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn mos(&self, name: &str, d: &str, g: &str, s: &str, b: &str, pmos: bool, w: &str, l: &str) -> String {
        let model = if pmos { self.pmos } else { self.nmos };
        if self.width_key == "W" {
            format!(
                "M{name} {d} {g} {s} {b} {model} L={l} W={w} AS='{w}*trans_diffusion_length' AD='{w}*trans_diffusion_length' PS='{w}+2*trans_diffusion_length' PD='{w}+2*trans_diffusion_length'"
            )
        } else {
            format!("M{name} {d} {g} {s} {b} {model} L={l} nfin={w}")
        }
    }
}

/// Renders `basic_subcircuits.l`.
pub fn basic_subcircuits(family: &CircuitFamily) -> Result<String> {
    let m = DeviceModels::new(family);
    let l = "gate_length";
    let mut w = SpiceWriter::new();
    w.comment("Primitive devices")?;
    w.blank()?;

    w.subcircuit("ptran", &["n_in", "n_out", "n_gate", "n_gnd", "Wn=1"])?;
    w.element(m.mos("0", "n_in", "n_gate", "n_out", "n_gnd", false, "Wn", l))?;
    w.end_subcircuit()?;

    w.subcircuit("rest", &["n_pull", "n_gate", "n_vdd", "Wp=1"])?;
    w.element(m.mos(
        "0",
        "n_pull",
        "n_gate",
        "n_vdd",
        "n_vdd",
        true,
        "Wp",
        "'gate_length*rest_length_factor'",
    ))?;
    w.end_subcircuit()?;

    w.subcircuit("tran", &["n_d", "n_g", "n_s", "n_gnd", "Wn=1"])?;
    w.element(m.mos("0", "n_d", "n_g", "n_s", "n_gnd", false, "Wn", l))?;
    w.end_subcircuit()?;

    w.subcircuit("inv", &["n_in", "n_out", "n_vdd", "n_gnd", "Wn=1", "Wp=1"])?;
    w.element(m.mos("0", "n_out", "n_in", "n_gnd", "n_gnd", false, "Wn", l))?;
    w.element(m.mos("1", "n_out", "n_in", "n_vdd", "n_vdd", true, "Wp", l))?;
    w.end_subcircuit()?;

    w.subcircuit(
        "tgate",
        &["n_in", "n_out", "n_gate", "n_gate_n", "n_vdd", "n_gnd", "Wn=1", "Wp=1"],
    )?;
    w.element(m.mos("0", "n_in", "n_gate", "n_out", "n_gnd", false, "Wn", l))?;
    w.element(m.mos("1", "n_in", "n_gate_n", "n_out", "n_vdd", true, "Wp", l))?;
    w.end_subcircuit()?;

    w.subcircuit("nand2", &["n_a", "n_b", "n_out", "n_vdd", "n_gnd", "Wn=1", "Wp=1"])?;
    w.element(m.mos("0", "n_out", "n_a", "n_1", "n_gnd", false, "Wn", l))?;
    w.element(m.mos("1", "n_1", "n_b", "n_gnd", "n_gnd", false, "Wn", l))?;
    w.element(m.mos("2", "n_out", "n_a", "n_vdd", "n_vdd", true, "Wp", l))?;
    w.element(m.mos("3", "n_out", "n_b", "n_vdd", "n_vdd", true, "Wp", l))?;
    w.end_subcircuit()?;

    w.subcircuit(
        "nand3",
        &["n_a", "n_b", "n_c", "n_out", "n_vdd", "n_gnd", "Wn=1", "Wp=1"],
    )?;
    w.element(m.mos("0", "n_out", "n_a", "n_1", "n_gnd", false, "Wn", l))?;
    w.element(m.mos("1", "n_1", "n_b", "n_2", "n_gnd", false, "Wn", l))?;
    w.element(m.mos("2", "n_2", "n_c", "n_gnd", "n_gnd", false, "Wn", l))?;
    w.element(m.mos("3", "n_out", "n_a", "n_vdd", "n_vdd", true, "Wp", l))?;
    w.element(m.mos("4", "n_out", "n_b", "n_vdd", "n_vdd", true, "Wp", l))?;
    w.element(m.mos("5", "n_out", "n_c", "n_vdd", "n_vdd", true, "Wp", l))?;
    w.end_subcircuit()?;

    w.subcircuit("wire", &["n_in", "n_out", "Rw=1", "Cw=1f"])?;
    w.element("C0 n_in gnd Cw")?;
    w.element("R0 n_in n_out Rw")?;
    w.element("C1 n_out gnd Cw")?;
    w.end_subcircuit()?;

    w.subcircuit("mtj", &["n_a", "n_b", "Rmtj=1k"])?;
    w.element("R0 n_a n_b Rmtj")?;
    w.end_subcircuit()?;

    Ok(w.finish())
}

/// Renders `process_data.l`.
pub fn process_data(process: &ProcessParams, bram: Option<&BramParams>) -> Result<String> {
    let mut w = SpiceWriter::new();
    w.comment("Process data")?;
    w.param("supply_v", process.vdd)?;
    w.param("sram_v", process.vsram)?;
    w.param("sram_n_v", process.vsram_n)?;
    w.param("gate_length", format!("{}n", process.gate_length))?;
    w.param(
        "trans_diffusion_length",
        format!("{}n", process.trans_diffusion_length),
    )?;
    w.param("rest_length_factor", process.rest_length_factor)?;
    w.param("min_tran_width", format!("{}n", process.min_tran_width))?;
    if let Some(bram) = bram {
        w.blank()?;
        w.comment("Block RAM")?;
        w.param("vref", bram.vref)?;
        w.param("vclmp", bram.vclmp)?;
        w.param("sense_dv", bram.sense_dv)?;
        w.param("mtj_rhigh_worst", bram.mtj.r_high_worstcase)?;
        w.param("mtj_rlow_worst", bram.mtj.r_low_worstcase)?;
        w.param("mtj_rhigh_nominal", bram.mtj.r_high_nominal)?;
        w.param("mtj_rlow_nominal", bram.mtj.r_low_nominal)?;
    }
    Ok(w.finish())
}

/// Renders `includes.l`. Paths are relative to a deck directory one level
/// below the run directory.
pub fn includes(model_path: &Path, model_library: &str) -> Result<String> {
    let mut w = SpiceWriter::new();
    w.comment("Shared library bundle")?;
    w.lib(model_path, model_library)?;
    for file in [PROCESS_DATA, BASIC_SUBCIRCUITS, SWEEP_DATA, WIRE_RC, SUBCIRCUITS] {
        w.include(Path::new("..").join(file))?;
    }
    Ok(w.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::process::tests::bulk_22nm;
    use crate::config::TransistorType;

    #[test]
    fn test_bulk_primitives() {
        let text = basic_subcircuits(&CircuitFamily::default()).unwrap();
        for cell in ["ptran", "rest", "tran", "inv", "tgate", "nand2", "nand3", "wire", "mtj"] {
            assert!(text.contains(&format!(".SUBCKT {cell} ")), "missing {cell}");
        }
        assert!(text.contains("nmos L=gate_length W=Wn"));
        assert!(!text.contains("nfin"));
    }

    #[test]
    fn test_finfet_low_power_primitives() {
        let family = CircuitFamily {
            transistor: TransistorType::Finfet,
            low_power: true,
            ..Default::default()
        };
        let text = basic_subcircuits(&family).unwrap();
        assert!(text.contains("nmos_lp L=gate_length nfin=Wn"));
        assert!(text.contains("pmos_lp"));
    }

    #[test]
    fn test_includes_are_relative() {
        let process = bulk_22nm();
        let text = includes(&process.model_path, &process.model_library).unwrap();
        assert!(text.contains(".LIB \"models/ptm_22nm.l\" 22NM_BULK_HP"));
        assert!(text.contains(".INCLUDE \"../sweep_data.l\""));
        assert!(text.contains(".INCLUDE \"../wire_RC.l\""));
    }

    #[test]
    fn test_process_data() {
        let text = process_data(&bulk_22nm(), None).unwrap();
        assert!(text.contains(".PARAM supply_v = 0.8"));
        assert!(text.contains(".PARAM gate_length = 22n"));
        assert!(!text.contains("vref"));
    }
}
