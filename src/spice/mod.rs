use std::fmt::Display;
use std::io::Write;
use std::path::Path;

use crate::error::Result;

pub mod params;
pub mod primitives;

/// Port order shared by every generated subcircuit.
pub const PORTS: [&str; 6] = ["n_in", "n_out", "n_gate", "n_gate_n", "n_vdd", "n_gnd"];

/// Accumulates SPICE text for one library file or deck.
#[derive(Debug, Default)]
pub struct SpiceWriter {
    out: Vec<u8>,
    counter: u64,
}

impl SpiceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subcircuit(&mut self, name: &str, ports: &[&str]) -> Result<()> {
        write!(self.out, ".SUBCKT {name}")?;
        for port in ports {
            write!(self.out, " {port}")?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    /// Opens a subcircuit with the standard [`PORTS`].
    pub fn standard_subcircuit(&mut self, name: &str) -> Result<()> {
        self.subcircuit(name, &PORTS)
    }

    pub fn end_subcircuit(&mut self) -> Result<()> {
        writeln!(self.out, ".ENDS\n")?;
        Ok(())
    }

    pub fn instance(
        &mut self,
        name: &str,
        terminals: &[&str],
        cell: &str,
        params: &[(&str, String)],
    ) -> Result<()> {
        write!(self.out, "X{name}")?;
        for t in terminals {
            write!(self.out, " {t}")?;
        }
        write!(self.out, " {cell}")?;
        for (key, value) in params {
            write!(self.out, " {key}={value}")?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    /// Writes a raw element line such as a MOSFET or a source.
    pub fn element(&mut self, line: impl Display) -> Result<()> {
        writeln!(self.out, "{line}")?;
        Ok(())
    }

    pub fn param(&mut self, name: &str, value: impl Display) -> Result<()> {
        writeln!(self.out, ".PARAM {name} = {value}")?;
        Ok(())
    }

    pub fn include(&mut self, path: impl AsRef<Path>) -> Result<()> {
        writeln!(self.out, ".INCLUDE \"{}\"", path.as_ref().display())?;
        Ok(())
    }

    pub fn lib(&mut self, lib_file: impl AsRef<Path>, lib_name: &str) -> Result<()> {
        writeln!(self.out, ".LIB \"{}\" {}", lib_file.as_ref().display(), lib_name)?;
        Ok(())
    }

    pub fn comment(&mut self, comment: &str) -> Result<()> {
        writeln!(self.out, "* {comment}")?;
        Ok(())
    }

    pub fn blank(&mut self) -> Result<()> {
        writeln!(self.out)?;
        Ok(())
    }

    pub fn temp_net(&mut self) -> String {
        self.counter += 1;
        format!("n_int_{}", self.counter)
    }

    pub fn finish(self) -> String {
        String::from_utf8_lossy(&self.out).into_owned()
    }

    pub fn save(self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.out)?;
        Ok(())
    }
}

/// Parameter expression naming the R of `wire`.
pub fn wire_res(wire: &str) -> String {
    format!("{wire}_res")
}

/// Parameter expression naming the C of `wire`.
pub fn wire_cap(wire: &str) -> String {
    format!("{wire}_cap")
}

/// Convenience for instances of the `wire` primitive.
pub fn wire_params(wire: &str) -> Vec<(&'static str, String)> {
    vec![("Rw", wire_res(wire)), ("Cw", wire_cap(wire))]
}

/// Like [`wire_params`] but for one of `segments` equal pieces of `wire`.
pub fn wire_segment_params(wire: &str, segments: usize) -> Vec<(&'static str, String)> {
    if segments <= 1 {
        return wire_params(wire);
    }
    vec![
        ("Rw", format!("'{}/{}'", wire_res(wire), segments)),
        ("Cw", format!("'{}/{}'", wire_cap(wire), segments)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subcircuit_text() {
        let mut w = SpiceWriter::new();
        w.standard_subcircuit("cb_mux_on").unwrap();
        w.instance(
            "inv_1",
            &["n_in", "n_out", "n_vdd", "n_gnd"],
            "inv",
            &[("Wn", "inv_cb_mux_1_nmos".into()), ("Wp", "inv_cb_mux_1_pmos".into())],
        )
        .unwrap();
        let net = w.temp_net();
        w.end_subcircuit().unwrap();
        let text = w.finish();
        assert_eq!(net, "n_int_1");
        assert!(text.starts_with(".SUBCKT cb_mux_on n_in n_out n_gate n_gate_n n_vdd n_gnd\n"));
        assert!(text.contains("Xinv_1 n_in n_out n_vdd n_gnd inv Wn=inv_cb_mux_1_nmos Wp=inv_cb_mux_1_pmos\n"));
        assert!(text.ends_with(".ENDS\n\n"));
    }

    #[test]
    fn test_wire_segments() {
        let params = wire_segment_params("wire_gen_routing_L4", 4);
        assert_eq!(params[0].1, "'wire_gen_routing_L4_res/4'");
        assert_eq!(wire_segment_params("w", 1), wire_params("w"));
    }
}
