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

/// Switch arrangement of a mux.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MuxLevels {
    One(usize),
    Two { l1: usize, l2: usize },
}

impl MuxLevels {
    /// Two levels of roughly equal size for anything wider than 2:1.
    pub fn for_size(size: usize) -> Self {
        if size <= 2 {
            Self::One(size.max(2))
        } else {
            let l2 = (size as f64).sqrt().ceil() as usize;
            let l1 = (size + l2 - 1) / l2;
            Self::Two { l1, l2 }
        }
    }

    /// Inputs the switch arrangement can accept.
    pub fn capacity(&self) -> usize {
        match *self {
            Self::One(n) => n,
            Self::Two { l1, l2 } => l1 * l2,
        }
    }

    pub fn sram_bits(&self) -> usize {
        match *self {
            Self::One(2) => 1,
            Self::One(n) => n,
            Self::Two { l1, l2 } => l1 + l2,
        }
    }
}

/// Initial sizes of a mux. Switches are NMOS widths (or both tgate
/// devices); inverters are `(nmos, pmos)`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MuxSizing {
    pub l1: f64,
    pub l2: f64,
    pub inv1: (f64, f64),
    /// `None` for muxes with a single output inverter.
    pub inv2: Option<(f64, f64)>,
}

/// A configurable mux: pass-transistor or transmission-gate switches, a
/// level restorer when using pass transistors, and one or two output
/// inverters.
#[derive(Debug, Clone)]
pub struct Mux {
    name: ArcStr,
    class: BlockClass,
    per_tile: usize,
    size: usize,
    levels: MuxLevels,
    sw_l1: Transistor,
    sw_l2: Option<Transistor>,
    rest: Option<Transistor>,
    inv1: Transistor,
    inv2: Option<Transistor>,
    init: MuxSizing,
}

impl Mux {
    pub fn new(
        name: impl Into<ArcStr>,
        class: BlockClass,
        per_tile: usize,
        size: usize,
        family: CircuitFamily,
        init: MuxSizing,
    ) -> Self {
        let name = name.into();
        let levels = MuxLevels::for_size(size);
        let sw_kind = if family.use_tgate() {
            TransistorKind::Tgate
        } else {
            TransistorKind::Ptran
        };
        let sw_l1 = Transistor::new(sw_kind, &name, "L1");
        let sw_l2 = matches!(levels, MuxLevels::Two { .. })
            .then(|| Transistor::new(sw_kind, &name, "L2"));
        let rest = (!family.use_tgate()).then(|| Transistor::new(TransistorKind::Rest, &name, ""));
        let inv1 = Transistor::new(TransistorKind::Inv, &name, "1");
        let inv2 = init
            .inv2
            .map(|_| Transistor::new(TransistorKind::Inv, &name, "2"));
        Self {
            name,
            class,
            per_tile,
            size,
            levels,
            sw_l1,
            sw_l2,
            rest,
            inv1,
            inv2,
            init,
        }
    }

    /// Requested fan-in.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn levels(&self) -> MuxLevels {
        self.levels
    }

    /// The first-level switch, reported as the mux transistor size.
    pub fn switch(&self) -> &Transistor {
        &self.sw_l1
    }

    /// The inverter that drives the mux output.
    pub fn driver(&self) -> &Transistor {
        self.inv2.as_ref().unwrap_or(&self.inv1)
    }

    fn wire_l1(&self) -> WireDef {
        WireDef::new(format!("wire_{}_L1", self.name), 0)
    }

    fn wire_l2(&self) -> Option<WireDef> {
        self.sw_l2
            .as_ref()
            .map(|_| WireDef::new(format!("wire_{}_L2", self.name), 0))
    }

    fn wire_driver(&self) -> Option<WireDef> {
        self.inv2
            .as_ref()
            .map(|_| WireDef::new(format!("wire_{}_driver", self.name), 0))
    }

    fn switch_instance(
        out: &mut SpiceWriter,
        inst: &str,
        t: &Transistor,
        a: &str,
        b: &str,
        on: bool,
    ) -> Result<()> {
        let (gate, gate_n) = if on {
            ("n_gate", "n_gate_n")
        } else {
            ("n_gate_n", "n_gate")
        };
        match t.kind {
            TransistorKind::Tgate => out.instance(
                inst,
                &[a, b, gate, gate_n, "n_vdd", "n_gnd"],
                "tgate",
                &device_params(t),
            ),
            _ => out.instance(inst, &[a, b, gate, "n_gnd"], "ptran", &device_params(t)),
        }
    }

    fn emit_on(&self, out: &mut SpiceWriter) -> Result<()> {
        out.subcircuit(&format!("{}_on", self.name), &PORTS)?;
        let l1_wire = self.wire_l1();
        Self::switch_instance(out, "sw_L1", &self.sw_l1, "n_in", "n_1_1", true)?;
        out.instance("wire_L1", &["n_1_1", "n_1_2"], "wire", &wire_params(&l1_wire.name))?;

        let (first_off, mux_out) = match self.levels {
            MuxLevels::One(n) => (n - 1, "n_1_2"),
            MuxLevels::Two { l1, .. } => (l1 - 1, "n_2_2"),
        };
        for i in 0..first_off {
            Self::switch_instance(out, &format!("sw_L1_off_{i}"), &self.sw_l1, "n_gnd", "n_1_1", false)?;
        }
        if let (Some(sw_l2), Some(l2_wire), MuxLevels::Two { l2, .. }) =
            (&self.sw_l2, self.wire_l2(), self.levels)
        {
            Self::switch_instance(out, "sw_L2", sw_l2, "n_1_2", "n_2_1", true)?;
            out.instance("wire_L2", &["n_2_1", "n_2_2"], "wire", &wire_params(&l2_wire.name))?;
            for i in 0..l2 - 1 {
                Self::switch_instance(out, &format!("sw_L2_off_{i}"), sw_l2, "n_gnd", "n_2_1", false)?;
            }
        }

        let inv1_out = if self.inv2.is_some() { "n_3_1" } else { "n_out" };
        if let Some(rest) = &self.rest {
            out.instance("rest", &[mux_out, inv1_out, "n_vdd"], "rest", &device_params(rest))?;
        }
        out.instance(
            "inv_1",
            &[mux_out, inv1_out, "n_vdd", "n_gnd"],
            "inv",
            &device_params(&self.inv1),
        )?;
        if let (Some(inv2), Some(driver_wire)) = (&self.inv2, self.wire_driver()) {
            out.instance("wire_driver", &["n_3_1", "n_3_2"], "wire", &wire_params(&driver_wire.name))?;
            out.instance("inv_2", &["n_3_2", "n_out", "n_vdd", "n_gnd"], "inv", &device_params(inv2))?;
        }
        out.end_subcircuit()
    }

    fn emit_off(&self, out: &mut SpiceWriter) -> Result<()> {
        out.subcircuit(&format!("{}_off", self.name), &PORTS)?;
        Self::switch_instance(out, "sw_L1", &self.sw_l1, "n_in", "n_1_1", false)?;
        out.end_subcircuit()
    }

    fn emit_partial(&self, out: &mut SpiceWriter) -> Result<()> {
        out.subcircuit(&format!("{}_partial", self.name), &PORTS)?;
        Self::switch_instance(out, "sw_L1", &self.sw_l1, "n_in", "n_1_1", true)?;
        out.instance("wire_L1", &["n_1_1", "n_1_2"], "wire", &wire_params(&self.wire_l1().name))?;
        if let Some(sw_l2) = &self.sw_l2 {
            Self::switch_instance(out, "sw_L2", sw_l2, "n_1_2", "n_2_1", false)?;
        }
        out.end_subcircuit()
    }
}

impl Subcircuit for Mux {
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
        let mut ts = vec![self.sw_l1.clone()];
        ts.extend(self.sw_l2.clone());
        ts.extend(self.rest.clone());
        ts.push(self.inv1.clone());
        ts.extend(self.inv2.clone());
        ts
    }

    fn wires(&self) -> Vec<WireDef> {
        let mut wires = vec![self.wire_l1()];
        wires.extend(self.wire_l2());
        wires.extend(self.wire_driver());
        wires
    }

    fn initial_sizes(&self) -> Sizes {
        let mut pairs = vec![(&self.sw_l1, self.init.l1, self.init.l1)];
        if let Some(sw_l2) = &self.sw_l2 {
            pairs.push((sw_l2, self.init.l2, self.init.l2));
        }
        if let Some(rest) = &self.rest {
            pairs.push((rest, 1.0, 1.0));
        }
        pairs.push((&self.inv1, self.init.inv1.0, self.init.inv1.1));
        if let (Some(inv2), Some((n, p))) = (&self.inv2, self.init.inv2) {
            pairs.push((inv2, n, p));
        }
        init_sizes(&pairs)
    }

    fn inverting(&self) -> bool {
        self.inv2.is_none()
    }

    fn cell(&self) -> String {
        format!("{}_on", self.name)
    }

    fn emit_netlist(&self, out: &mut SpiceWriter) -> Result<()> {
        self.emit_on(out)?;
        self.emit_off(out)?;
        self.emit_partial(out)
    }

    fn compute_area(&self, model: &AreaModel, areas: &mut Areas, widths: &mut Widths) -> Result<()> {
        let name = self.name.clone();
        let mut sum = AreaSum::new(areas, &name);
        match self.levels {
            MuxLevels::One(n) => {
                sum.add(&self.sw_l1, n as f64)?;
            }
            MuxLevels::Two { l1, l2 } => {
                sum.add(&self.sw_l1, (l1 * l2) as f64)?;
                if let Some(sw_l2) = &self.sw_l2 {
                    sum.add(sw_l2, l2 as f64)?;
                }
            }
        }
        sum.add_all(self.rest.iter())?
            .add(&self.inv1, 1.0)?
            .add_all(self.inv2.iter())?;
        let core = sum.total();
        let sram = self.levels.sram_bits() as f64 * model.sram_cell();
        store_area(&name, core, Some(sram), areas, widths);
        Ok(())
    }

    fn update_wires(&self, ctx: &WireContext<'_>, wires: &mut Wires) -> Result<()> {
        let own = ctx.width(&self.name, &self.name)?;
        match self.levels {
            MuxLevels::One(_) => set_wire(wires, &self.wire_l1(), own),
            MuxLevels::Two { l1, .. } => {
                let sw = ctx.width(&self.sw_l1.name, &self.name)?;
                set_wire(wires, &self.wire_l1(), l1 as f64 * sw);
            }
        }
        if let Some(l2_wire) = self.wire_l2() {
            set_wire(wires, &l2_wire, own);
        }
        if let (Some(inv2), Some(driver_wire)) = (&self.inv2, self.wire_driver()) {
            let w1 = ctx.width(&self.inv1.name, &self.name)?;
            let w2 = ctx.width(&inv2.name, &self.name)?;
            set_wire(wires, &driver_wire, (w1 + w2) / 2.0);
        }
        Ok(())
    }
}
