use std::fmt::Debug;

use arcstr::ArcStr;
use serde::Serialize;

use crate::config::{ArchParams, TileConfig};
use crate::error::{Result, TileError};
use crate::maps::{Areas, Sizes, Widths, WireSpec, Wires};
use crate::spice::SpiceWriter;
use crate::tech::{AreaModel, Transistor, TransistorKind};
use crate::tile::floorplan::Floorplan;

pub mod ble;
pub mod carry_chain;
pub mod chain;
pub mod hardblock;
pub mod loads;
pub mod lut;
pub mod mux;
pub mod ram;
pub mod routing;

/// Which area total a subcircuit is counted towards.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub enum BlockClass {
    SwitchBlock,
    ConnectionBlock,
    LocalMux,
    /// LUT bodies, input drivers and the fracturable output mux.
    Lut,
    BleOutput,
    FlipFlop,
    CarryChain,
    Ram,
    HardBlock(String),
    /// Wire and fan-out models. These own wires but no area.
    Load,
}

/// A wire owned by a subcircuit.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize)]
pub struct WireDef {
    pub name: String,
    /// Index into the metal stack.
    pub layer: usize,
}

impl WireDef {
    pub fn new(name: impl Into<String>, layer: usize) -> Self {
        Self {
            name: name.into(),
            layer,
        }
    }
}

/// Geometry available when wire lengths are computed.
#[derive(Debug, Clone, Copy)]
pub struct WireContext<'a> {
    pub arch: &'a ArchParams,
    pub areas: &'a Areas,
    pub widths: &'a Widths,
    pub floorplan: &'a Floorplan,
}

impl<'a> WireContext<'a> {
    #[inline]
    pub fn width(&self, key: &str, owner: &str) -> Result<f64> {
        self.widths.require(key, owner)
    }
}

pub trait Subcircuit: Debug + Send + Sync {
    fn name(&self) -> ArcStr;

    fn class(&self) -> BlockClass;

    /// Instances of this subcircuit in the tile it belongs to.
    fn per_tile(&self) -> usize;

    /// Sized transistors in sizing order, input stage first.
    fn transistors(&self) -> Vec<Transistor>;

    fn wires(&self) -> Vec<WireDef>;

    fn initial_sizes(&self) -> Sizes;

    /// Whether the optimiser may change this subcircuit's sizes.
    fn swept(&self) -> bool {
        true
    }

    /// Whether the measured path through this subcircuit inverts.
    fn inverting(&self) -> bool {
        false
    }

    /// Netlist cell that carries a signal through this subcircuit.
    fn cell(&self) -> String {
        self.name().to_string()
    }

    fn emit_netlist(&self, out: &mut SpiceWriter) -> Result<()>;

    /// Writes `areas[name]`, `widths[name]` and, for subcircuits with
    /// configuration memory, `areas[name + "_sram"]`. Transistor areas must
    /// already be present in `areas`.
    fn compute_area(&self, model: &AreaModel, areas: &mut Areas, widths: &mut Widths) -> Result<()>;

    fn update_wires(&self, ctx: &WireContext<'_>, wires: &mut Wires) -> Result<()>;
}

/// Sums transistor areas for one subcircuit.
pub(crate) struct AreaSum<'a> {
    areas: &'a Areas,
    owner: &'a str,
    total: f64,
}

impl<'a> AreaSum<'a> {
    pub(crate) fn new(areas: &'a Areas, owner: &'a str) -> Self {
        Self {
            areas,
            owner,
            total: 0.0,
        }
    }

    pub(crate) fn add(&mut self, transistor: &Transistor, count: f64) -> Result<&mut Self> {
        self.total += count * self.areas.require(&transistor.name, self.owner)?;
        Ok(self)
    }

    pub(crate) fn add_all<'t>(
        &mut self,
        transistors: impl IntoIterator<Item = &'t Transistor>,
    ) -> Result<&mut Self> {
        for t in transistors {
            self.add(t, 1.0)?;
        }
        Ok(self)
    }

    pub(crate) fn total(&self) -> f64 {
        self.total
    }
}

pub(crate) fn store_area(
    name: &str,
    core: f64,
    sram: Option<f64>,
    areas: &mut Areas,
    widths: &mut Widths,
) {
    areas.insert(name.to_string(), core);
    widths.insert(name.to_string(), core.sqrt());
    if let Some(sram) = sram {
        areas.insert(format!("{name}_sram"), core + sram);
    }
}

pub(crate) fn set_wire(wires: &mut Wires, def: &WireDef, length: f64) {
    wires.insert(
        def.name.clone(),
        WireSpec {
            length,
            layer: def.layer,
        },
    );
}

pub(crate) fn init_sizes(pairs: &[(&Transistor, f64, f64)]) -> Sizes {
    let mut sizes = Sizes::new();
    for (t, nmos, pmos) in pairs {
        sizes.set_transistor(t, *nmos, *pmos);
    }
    sizes
}

/// Terminal list and parameters of a primitive instance of `t`.
pub(crate) fn device_params(t: &Transistor) -> Vec<(&'static str, String)> {
    match t.kind {
        TransistorKind::Ptran | TransistorKind::Tran => vec![("Wn", t.nmos())],
        TransistorKind::Rest => vec![("Wp", t.pmos())],
        TransistorKind::Inv | TransistorKind::Tgate | TransistorKind::Nand => {
            vec![("Wn", t.nmos()), ("Wp", t.pmos())]
        }
    }
}

/// Every subcircuit of one run, in sizing order.
#[derive(Debug)]
pub struct Library {
    subcircuits: Vec<Box<dyn Subcircuit>>,
}

impl Library {
    pub fn build(config: &TileConfig) -> Result<Self> {
        let arch = &config.arch;
        let family = arch.family;
        let mut subcircuits: Vec<Box<dyn Subcircuit>> = Vec::new();

        for wire in &arch.wires {
            subcircuits.push(Box::new(routing::sb_mux(arch, wire)));
        }
        subcircuits.push(Box::new(routing::cb_mux(arch)));
        subcircuits.push(Box::new(routing::local_mux(arch)));

        for input in arch.lut_inputs() {
            subcircuits.push(Box::new(lut::input_driver(arch, input)));
            subcircuits.push(Box::new(lut::input_not_driver(arch, input)));
        }
        subcircuits.push(Box::new(lut::Lut::new(arch)));
        if arch.use_fluts {
            subcircuits.push(Box::new(ble::flut_mux(arch)));
        }
        subcircuits.push(Box::new(ble::local_ble_output(arch)));
        subcircuits.push(Box::new(ble::general_ble_output(arch)));
        subcircuits.push(Box::new(ble::FlipFlop::new(arch)));

        if let Some(cc) = arch.carry_chain {
            subcircuits.extend(carry_chain::build(arch, &cc)?);
        }

        if let Some(bram) = &config.bram {
            subcircuits.extend(ram::build(arch, bram)?);
        }

        for hb in &config.hardblocks {
            subcircuits.extend(hardblock::build(family, hb));
        }

        for wire in &arch.wires {
            subcircuits.push(Box::new(loads::routing_wire_load(arch, wire)));
        }
        subcircuits.push(Box::new(loads::local_routing_wire_load(arch)));
        subcircuits.push(Box::new(loads::lut_output_load(arch)));
        subcircuits.push(Box::new(loads::local_ble_output_load(arch)));
        subcircuits.push(Box::new(loads::general_ble_output_load(arch)));

        let library = Self { subcircuits };
        library.check_unique()?;
        Ok(library)
    }

    fn check_unique(&self) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for s in &self.subcircuits {
            for t in s.transistors() {
                if !seen.insert(t.name.clone()) {
                    return Err(TileError::generation(s.name().as_str(), t.name));
                }
            }
            for w in s.wires() {
                if !seen.insert(w.name.clone()) {
                    return Err(TileError::generation(s.name().as_str(), w.name));
                }
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Subcircuit> {
        self.subcircuits.iter().map(|s| s.as_ref())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Subcircuit> {
        self.iter().find(|s| s.name() == name)
    }

    pub fn len(&self) -> usize {
        self.subcircuits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subcircuits.is_empty()
    }

    pub fn initial_sizes(&self) -> Sizes {
        let mut sizes = Sizes::new();
        for s in self.iter() {
            sizes.extend(s.initial_sizes());
        }
        sizes
    }

    /// Checks that `sizes` covers every device of every subcircuit.
    pub fn check_sizes(&self, sizes: &Sizes) -> Result<()> {
        for s in self.iter() {
            for t in s.transistors() {
                sizes.check_transistor(&t, s.name().as_str())?;
            }
        }
        Ok(())
    }

    /// Renders `subcircuits.l`.
    pub fn netlist(&self) -> Result<String> {
        let mut out = SpiceWriter::new();
        for s in self.iter() {
            out.comment(&format!("{} ({:?})", s.name(), s.class()))?;
            s.emit_netlist(&mut out)?;
        }
        Ok(out.finish())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::arch::tests::minimal_arch;
    use crate::config::process::tests::bulk_22nm;
    use crate::config::{DelayWeights, Stripe};

    pub(crate) fn minimal_config() -> TileConfig {
        TileConfig {
            arch: minimal_arch(),
            process: bulk_22nm(),
            bram: None,
            hardblocks: vec![],
            weights: DelayWeights::default(),
            stripe_order: Stripe::ALL.to_vec(),
            pn_ratios: Default::default(),
        }
    }

    #[test]
    fn test_minimal_library() {
        let library = Library::build(&minimal_config()).unwrap();
        let names: Vec<String> = library.iter().map(|s| s.name().to_string()).collect();
        for expected in [
            "sb_mux_L4",
            "cb_mux",
            "local_mux",
            "lut_a_driver",
            "lut_d_not_driver",
            "lut",
            "local_ble_output",
            "general_ble_output",
            "ff",
            "routing_wire_load_L4",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        assert!(!names.iter().any(|n| n.starts_with("lut_e")));
        assert!(!names.iter().any(|n| n == "flut_mux"));
    }

    #[test]
    fn test_initial_sizes_cover_all_devices() {
        let library = Library::build(&minimal_config()).unwrap();
        let sizes = library.initial_sizes();
        library.check_sizes(&sizes).unwrap();
        assert_eq!(sizes["rest_cb_mux_pmos"], 1.0);
    }

    #[test]
    fn test_netlist_declares_every_subcircuit() {
        let library = Library::build(&minimal_config()).unwrap();
        let text = library.netlist().unwrap();
        for s in library.iter() {
            assert!(
                text.contains(&format!(".SUBCKT {}", s.name())),
                "no netlist for {}",
                s.name()
            );
        }
        for s in library.iter() {
            for t in s.transistors() {
                for device in t.devices() {
                    assert!(text.contains(&device), "{device} never referenced");
                }
            }
        }
    }
}
