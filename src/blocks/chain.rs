//! Linear stage chains: buffers, drivers and decoder gates.

use arcstr::ArcStr;

use crate::blocks::{
    device_params, init_sizes, set_wire, store_area, AreaSum, BlockClass, Subcircuit, WireContext,
    WireDef,
};
use crate::config::CircuitFamily;
use crate::error::Result;
use crate::maps::{Areas, Sizes, Widths, Wires};
use crate::spice::{wire_params, SpiceWriter, PORTS};
use crate::tech::{AreaModel, Transistor, TransistorKind};
use crate::tile::floorplan::Link;

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub transistor: Transistor,
    pub init: (f64, f64),
    /// NAND fan-in. Inputs other than the measured one are tied high.
    pub fan_in: usize,
}

impl Stage {
    pub fn inv(subcircuit: &str, tag: &str, nmos: f64, pmos: f64) -> Self {
        Self {
            transistor: Transistor::new(TransistorKind::Inv, subcircuit, tag),
            init: (nmos, pmos),
            fan_in: 1,
        }
    }

    pub fn nand(subcircuit: &str, tag: &str, fan_in: usize, nmos: f64, pmos: f64) -> Self {
        Self {
            transistor: Transistor::new(TransistorKind::Nand, subcircuit, tag),
            init: (nmos, pmos),
            fan_in,
        }
    }

    /// A pass transistor, or a transmission gate in tgate families.
    pub fn switch(family: CircuitFamily, subcircuit: &str, tag: &str, size: f64) -> Self {
        let kind = if family.use_tgate() {
            TransistorKind::Tgate
        } else {
            TransistorKind::Ptran
        };
        Self {
            transistor: Transistor::new(kind, subcircuit, tag),
            init: (size, size),
            fan_in: 1,
        }
    }

    pub fn tran(subcircuit: &str, tag: &str, size: f64) -> Self {
        Self {
            transistor: Transistor::new(TransistorKind::Tran, subcircuit, tag),
            init: (size, size),
            fan_in: 1,
        }
    }

    pub fn rest(subcircuit: &str, tag: &str) -> Self {
        Self {
            transistor: Transistor::new(TransistorKind::Rest, subcircuit, tag),
            init: (1.0, 1.0),
            fan_in: 1,
        }
    }

    fn inverts(&self) -> bool {
        matches!(self.transistor.kind, TransistorKind::Inv | TransistorKind::Nand)
    }
}

/// How a chain wire's length follows the tile geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum Span {
    /// Mean width of the chain's gates.
    Stages,
    /// `factor` times the width of another block.
    Block(String, f64),
    /// Distance between two floorplan stripes.
    Link(Link),
    /// Tile height divided by a count.
    Height(usize),
}

impl Span {
    fn length(&self, ctx: &WireContext<'_>, chain: &Chain) -> Result<f64> {
        Ok(match self {
            Self::Stages => {
                let gates: Vec<&Stage> = chain.stages.iter().filter(|s| s.inverts()).collect();
                let mut sum = 0.0;
                for stage in &gates {
                    sum += ctx.width(&stage.transistor.name, &chain.name)?;
                }
                if gates.is_empty() {
                    0.0
                } else {
                    sum / gates.len() as f64
                }
            }
            Self::Block(key, factor) => factor * ctx.width(key, &chain.name)?,
            Self::Link(link) => ctx.floorplan.distance(*link),
            Self::Height(count) => ctx.floorplan.height / (*count).max(1) as f64,
        })
    }
}

/// A chain of gates and series devices from `n_in` to `n_out`.
///
/// Restorers pull up the node feeding the next gate. The internal wire, if
/// any, follows the first gate; the tail wire follows the last stage.
#[derive(Debug, Clone)]
pub struct Chain {
    name: ArcStr,
    class: BlockClass,
    per_tile: usize,
    stages: Vec<Stage>,
    internal: Option<Span>,
    tail: Option<(WireDef, Span)>,
    swept: bool,
    sram_bits: usize,
}

impl Chain {
    pub fn new(name: impl Into<ArcStr>, class: BlockClass, per_tile: usize) -> Self {
        Self {
            name: name.into(),
            class,
            per_tile,
            stages: Vec::new(),
            internal: None,
            tail: None,
            swept: true,
            sram_bits: 0,
        }
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn internal_wire(mut self, span: Span) -> Self {
        self.internal = Some(span);
        self
    }

    pub fn tail_wire(self, tag: &str, layer: usize, span: Span) -> Self {
        let name = format!("wire_{}_{}", self.name, tag);
        self.named_tail_wire(name, layer, span)
    }

    /// A tail wire whose name does not follow the chain's name.
    pub fn named_tail_wire(mut self, name: impl Into<String>, layer: usize, span: Span) -> Self {
        self.tail = Some((WireDef::new(name, layer), span));
        self
    }

    pub fn unswept(mut self) -> Self {
        self.swept = false;
        self
    }

    pub fn with_sram(mut self, bits: usize) -> Self {
        self.sram_bits = bits;
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    fn internal_def(&self) -> Option<WireDef> {
        self.internal
            .as_ref()
            .map(|_| WireDef::new(format!("wire_{}", self.name), 0))
    }

    fn last_gate(&self) -> Option<usize> {
        self.stages.iter().rposition(|s| s.inverts())
    }
}

impl Subcircuit for Chain {
    fn name(&self) -> ArcStr {
        self.name.clone()
    }

    fn class(&self) -> BlockClass {
        self.class.clone()
    }

    fn per_tile(&self) -> usize {
        self.per_tile
    }

    fn transistors(&self) -> Vec<Transistor> {
        self.stages.iter().map(|s| s.transistor.clone()).collect()
    }

    fn wires(&self) -> Vec<WireDef> {
        let mut wires: Vec<WireDef> = self.internal_def().into_iter().collect();
        wires.extend(self.tail.as_ref().map(|(def, _)| def.clone()));
        wires
    }

    fn initial_sizes(&self) -> Sizes {
        let pairs: Vec<(&Transistor, f64, f64)> = self
            .stages
            .iter()
            .map(|s| (&s.transistor, s.init.0, s.init.1))
            .collect();
        init_sizes(&pairs)
    }

    fn swept(&self) -> bool {
        self.swept
    }

    fn inverting(&self) -> bool {
        self.stages.iter().filter(|s| s.inverts()).count() % 2 == 1
    }

    fn emit_netlist(&self, out: &mut SpiceWriter) -> Result<()> {
        out.subcircuit(&self.name, &PORTS)?;
        let last_gate = self.last_gate();
        let last_stage = self.stages.len().saturating_sub(1);
        let internal = self.internal_def();
        let mut node = "n_in".to_string();
        let mut pending_rest: Option<(&Transistor, String)> = None;
        let mut wire_placed = false;

        for (idx, stage) in self.stages.iter().enumerate() {
            let t = &stage.transistor;
            let next = if idx == last_stage && self.tail.is_none() {
                "n_out".to_string()
            } else {
                format!("n_{}", idx + 1)
            };
            match t.kind {
                TransistorKind::Rest => {
                    pending_rest = Some((t, node.clone()));
                    continue;
                }
                TransistorKind::Inv => {
                    out.instance(&t.name, &[&node, &next, "n_vdd", "n_gnd"], "inv", &device_params(t))?;
                }
                TransistorKind::Nand => {
                    let cell = if stage.fan_in >= 3 { "nand3" } else { "nand2" };
                    let mut terms = vec![node.as_str()];
                    for _ in 1..stage.fan_in.clamp(2, 3) {
                        terms.push("n_vdd");
                    }
                    terms.extend([next.as_str(), "n_vdd", "n_gnd"]);
                    out.instance(&t.name, &terms, cell, &device_params(t))?;
                }
                TransistorKind::Ptran => {
                    out.instance(&t.name, &[&node, &next, "n_gate", "n_gnd"], "ptran", &device_params(t))?;
                }
                TransistorKind::Tran => {
                    out.instance(&t.name, &[&node, "n_gate", &next, "n_gnd"], "tran", &device_params(t))?;
                }
                TransistorKind::Tgate => {
                    out.instance(
                        &t.name,
                        &[&node, &next, "n_gate", "n_gate_n", "n_vdd", "n_gnd"],
                        "tgate",
                        &device_params(t),
                    )?;
                }
            }
            if stage.inverts() {
                if let Some((rest, pull)) = pending_rest.take() {
                    out.instance(&rest.name, &[&pull, &next, "n_vdd"], "rest", &device_params(rest))?;
                }
            }
            node = next;
            if let Some(def) = &internal {
                if !wire_placed && stage.inverts() && Some(idx) != last_gate {
                    let after = format!("{node}_w");
                    out.instance(&def.name, &[&node, &after], "wire", &wire_params(&def.name))?;
                    node = after;
                    wire_placed = true;
                }
            }
        }
        if let Some((def, _)) = &self.tail {
            out.instance(&def.name, &[&node, "n_out"], "wire", &wire_params(&def.name))?;
        }
        out.end_subcircuit()
    }

    fn compute_area(&self, model: &AreaModel, areas: &mut Areas, widths: &mut Widths) -> Result<()> {
        let transistors = self.transistors();
        let core = AreaSum::new(areas, &self.name).add_all(&transistors)?.total();
        let sram = (self.sram_bits > 0).then(|| self.sram_bits as f64 * model.sram_cell());
        store_area(&self.name, core, sram, areas, widths);
        Ok(())
    }

    fn update_wires(&self, ctx: &WireContext<'_>, wires: &mut Wires) -> Result<()> {
        if let (Some(def), Some(span)) = (self.internal_def(), &self.internal) {
            let length = span.length(ctx, self)?;
            set_wire(wires, &def, length);
        }
        if let Some((def, span)) = &self.tail {
            let length = span.length(ctx, self)?;
            set_wire(wires, def, length);
        }
        Ok(())
    }
}
