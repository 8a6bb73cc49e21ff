use arcstr::ArcStr;

use crate::blocks::{device_params, init_sizes, set_wire, store_area, BlockClass, Subcircuit, WireContext, WireDef};
use crate::config::{BramParams, MemoryTechnology};
use crate::error::Result;
use crate::maps::{Areas, Sizes, Widths, Wires};
use crate::spice::{wire_params, SpiceWriter, PORTS};
use crate::tech::{AreaModel, Transistor, TransistorKind};

const CELL: &str = "memory_cell";

/// One storage cell of the block RAM array. Not sized.
///
/// The netlist models a column: the bitline runs from `n_in` to `n_out`
/// and, for MTJ arrays, the selected cell's access device and junction
/// hang off its end.
#[derive(Debug, Clone)]
pub struct MemoryCell {
    technology: MemoryTechnology,
    rows: usize,
    cols: usize,
    count: usize,
    access: Option<Transistor>,
}

impl MemoryCell {
    pub fn new(bram: &BramParams) -> Self {
        let access = (bram.memory_technology == MemoryTechnology::Mtj)
            .then(|| Transistor::new(TransistorKind::Tran, CELL, "access"));
        Self {
            technology: bram.memory_technology,
            rows: bram.rows(),
            cols: bram.cols(),
            count: bram.bits(),
            access,
        }
    }

    fn wordline(&self) -> WireDef {
        WireDef::new("wire_memory_cell_wordline", 0)
    }

    fn bitline(&self) -> WireDef {
        WireDef::new("wire_memory_cell_bitline", 0)
    }
}

impl Subcircuit for MemoryCell {
    fn name(&self) -> ArcStr {
        arcstr::literal!("memory_cell")
    }

    fn class(&self) -> BlockClass {
        BlockClass::Ram
    }

    fn per_tile(&self) -> usize {
        self.count
    }

    fn transistors(&self) -> Vec<Transistor> {
        self.access.iter().cloned().collect()
    }

    fn wires(&self) -> Vec<WireDef> {
        vec![self.wordline(), self.bitline()]
    }

    fn initial_sizes(&self) -> Sizes {
        match &self.access {
            Some(access) => init_sizes(&[(access, 3.0, 3.0)]),
            None => Sizes::new(),
        }
    }

    fn swept(&self) -> bool {
        false
    }

    fn emit_netlist(&self, out: &mut SpiceWriter) -> Result<()> {
        out.subcircuit(CELL, &PORTS)?;
        let bitline = self.bitline();
        let wordline = self.wordline();
        out.instance(&bitline.name, &["n_in", "n_out"], "wire", &wire_params(&bitline.name))?;
        out.instance(&wordline.name, &["n_gate", "n_wl_end"], "wire", &wire_params(&wordline.name))?;
        if let Some(access) = &self.access {
            out.instance(&access.name, &["n_out", "n_wl_end", "n_mtj", "n_gnd"], "tran", &device_params(access))?;
            out.instance("mtj", &["n_mtj", "n_gnd"], "mtj", &[("Rmtj", "mtj_rlow_nominal".to_string())])?;
        }
        out.end_subcircuit()
    }

    fn compute_area(&self, model: &AreaModel, areas: &mut Areas, widths: &mut Widths) -> Result<()> {
        let core = match (&self.technology, &self.access) {
            (MemoryTechnology::Mtj, Some(access)) => areas.require(&access.name, CELL)?,
            _ => model.sram_cell(),
        };
        store_area(CELL, core, None, areas, widths);
        Ok(())
    }

    fn update_wires(&self, ctx: &WireContext<'_>, wires: &mut Wires) -> Result<()> {
        let side = ctx.width(CELL, CELL)?;
        set_wire(wires, &self.wordline(), self.cols as f64 * side);
        set_wire(wires, &self.bitline(), self.rows as f64 * side);
        Ok(())
    }
}
