//! LUT body and LUT input drivers.

use arcstr::ArcStr;

use crate::blocks::chain::{Chain, Span, Stage};
use crate::blocks::{
    device_params, init_sizes, set_wire, store_area, AreaSum, BlockClass, Subcircuit, WireContext,
    WireDef,
};
use crate::config::{ArchParams, LutDriverKind};
use crate::error::Result;
use crate::maps::{Areas, Sizes, Widths, Wires};
use crate::spice::{wire_params, SpiceWriter};
use crate::tech::{AreaModel, Transistor, TransistorKind};

pub const LUT: &str = "lut";

/// Driver of LUT input `input`. Register-feedback inputs start with a
/// select switch for the flip-flop feedback path; register-select inputs
/// have a select switch between the two inverters.
pub fn input_driver(arch: &ArchParams, input: char) -> Chain {
    let name = format!("lut_{input}_driver");
    let kind = arch.driver_kind(input);
    let family = arch.family;
    let mut chain = Chain::new(name.as_str(), BlockClass::Lut, arch.n);
    if kind.has_reg_fb() {
        chain = chain.stage(Stage::switch(family, &name, "reg_fb", 1.0));
        if !family.use_tgate() {
            chain = chain.stage(Stage::rest(&name, "reg_fb"));
        }
    }
    chain = chain.stage(Stage::inv(&name, "1", 1.0, 2.0));
    if kind.has_rsel() {
        chain = chain.stage(Stage::switch(family, &name, "rsel", 1.0));
        if !family.use_tgate() {
            chain = chain.stage(Stage::rest(&name, "rsel"));
        }
    }
    chain
        .stage(Stage::inv(&name, "2", 2.0, 4.0))
        .internal_wire(Span::Stages)
        .tail_wire("load", 0, Span::Block(LUT.to_string(), 1.0))
}

/// Driver of the complemented select line of LUT input `input`.
pub fn input_not_driver(arch: &ArchParams, input: char) -> Chain {
    let name = format!("lut_{input}_not_driver");
    Chain::new(name.as_str(), BlockClass::Lut, arch.n)
        .stage(Stage::inv(&name, "1", 1.0, 2.0))
        .stage(Stage::inv(&name, "2", 2.0, 4.0))
        .internal_wire(Span::Stages)
}

/// The LUT body: a binary tree of switches selecting one of `2^k` SRAM
/// cells, with a restoring buffer part way down the tree and an output
/// buffer. Fracturable LUTs hold two `(K-1)`-input bodies.
#[derive(Debug, Clone)]
pub struct Lut {
    per_tile: usize,
    bodies: usize,
    inputs: Vec<char>,
    int_level: usize,
    sram_driver: Transistor,
    levels: Vec<Transistor>,
    int_rest: Option<Transistor>,
    int_inv: [Transistor; 2],
    out_rest: Option<Transistor>,
    out_inv: [Transistor; 2],
    sram_bits: usize,
}

impl Lut {
    pub fn new(arch: &ArchParams) -> Self {
        let mut inputs = arch.lut_inputs();
        let bodies = if arch.use_fluts {
            inputs.pop();
            2
        } else {
            1
        };
        let k = inputs.len();
        let sw_kind = if arch.family.use_tgate() {
            TransistorKind::Tgate
        } else {
            TransistorKind::Ptran
        };
        let rest = |sub: &str| {
            (!arch.family.use_tgate()).then(|| Transistor::new(TransistorKind::Rest, sub, ""))
        };
        Self {
            per_tile: arch.n,
            bodies,
            int_level: if k <= 4 { 2 } else { 3 },
            sram_driver: Transistor::new(TransistorKind::Inv, LUT, "0"),
            levels: (1..=k)
                .map(|j| Transistor::new(sw_kind, LUT, &format!("L{j}")))
                .collect(),
            int_rest: rest("lut_int_buffer"),
            int_inv: [
                Transistor::new(TransistorKind::Inv, "lut_int_buffer", "1"),
                Transistor::new(TransistorKind::Inv, "lut_int_buffer", "2"),
            ],
            out_rest: rest("lut_out_buffer"),
            out_inv: [
                Transistor::new(TransistorKind::Inv, "lut_out_buffer", "1"),
                Transistor::new(TransistorKind::Inv, "lut_out_buffer", "2"),
            ],
            inputs,
            sram_bits: 1 << arch.k.inputs(),
        }
    }

    /// Inputs that select inside the body, in level order.
    pub fn inputs(&self) -> &[char] {
        &self.inputs
    }

    fn k(&self) -> usize {
        self.levels.len()
    }

    fn wire(&self, tag: &str) -> WireDef {
        WireDef::new(format!("wire_lut_{tag}"), 0)
    }

    #[allow(clippy::too_many_arguments)]
    fn switch(
        &self,
        out: &mut SpiceWriter,
        inst: &str,
        t: &Transistor,
        a: &str,
        b: &str,
        input: char,
        on: bool,
    ) -> Result<()> {
        let sel = format!("n_{input}");
        let sel_n = format!("n_{input}_n");
        let (gate, gate_n) = if on { (&sel, &sel_n) } else { (&sel_n, &sel) };
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

    fn buffer(
        &self,
        out: &mut SpiceWriter,
        rest: Option<&Transistor>,
        invs: &[Transistor; 2],
        wire: &WireDef,
        from: &str,
        to: &str,
    ) -> Result<()> {
        let mid = format!("{from}_b1");
        let mid_w = format!("{from}_b2");
        if let Some(rest) = rest {
            out.instance(&rest.name, &[from, &mid, "n_vdd"], "rest", &device_params(rest))?;
        }
        out.instance(&invs[0].name, &[from, &mid, "n_vdd", "n_gnd"], "inv", &device_params(&invs[0]))?;
        out.instance(&wire.name, &[&mid, &mid_w], "wire", &wire_params(&wire.name))?;
        out.instance(&invs[1].name, &[&mid_w, to, "n_vdd", "n_gnd"], "inv", &device_params(&invs[1]))
    }
}

impl Subcircuit for Lut {
    fn name(&self) -> ArcStr {
        arcstr::literal!("lut")
    }

    fn class(&self) -> BlockClass {
        BlockClass::Lut
    }

    fn per_tile(&self) -> usize {
        self.per_tile
    }

    fn transistors(&self) -> Vec<Transistor> {
        let mut ts = vec![self.sram_driver.clone()];
        ts.extend(self.levels.iter().cloned());
        ts.extend(self.int_rest.clone());
        ts.extend(self.int_inv.iter().cloned());
        ts.extend(self.out_rest.clone());
        ts.extend(self.out_inv.iter().cloned());
        ts
    }

    fn wires(&self) -> Vec<WireDef> {
        let mut wires = vec![self.wire("sram_driver")];
        wires.extend((1..=self.k()).map(|j| self.wire(&format!("L{j}"))));
        wires.push(self.wire("int_buffer"));
        wires.push(self.wire("out_buffer"));
        wires
    }

    fn initial_sizes(&self) -> Sizes {
        let mut pairs = vec![(&self.sram_driver, 2.0, 4.0)];
        for t in &self.levels {
            pairs.push((t, 2.0, 2.0));
        }
        for rest in self.int_rest.iter().chain(self.out_rest.iter()) {
            pairs.push((rest, 1.0, 1.0));
        }
        pairs.push((&self.int_inv[0], 1.0, 2.0));
        pairs.push((&self.int_inv[1], 2.0, 4.0));
        pairs.push((&self.out_inv[0], 2.0, 4.0));
        pairs.push((&self.out_inv[1], 4.0, 8.0));
        init_sizes(&pairs)
    }

    /// Measured from the SRAM side: one SRAM driver plus two buffers.
    fn inverting(&self) -> bool {
        true
    }

    fn emit_netlist(&self, out: &mut SpiceWriter) -> Result<()> {
        let mut ports = vec!["n_in".to_string(), "n_out".to_string()];
        for x in &self.inputs {
            ports.push(format!("n_{x}"));
            ports.push(format!("n_{x}_n"));
        }
        ports.push("n_vdd".into());
        ports.push("n_gnd".into());
        let ports: Vec<&str> = ports.iter().map(String::as_str).collect();
        out.subcircuit(LUT, &ports)?;

        let sram_wire = self.wire("sram_driver");
        out.instance(
            &self.sram_driver.name,
            &["n_in", "n_0_1", "n_vdd", "n_gnd"],
            "inv",
            &device_params(&self.sram_driver),
        )?;
        out.instance(&sram_wire.name, &["n_0_1", "n_0_2"], "wire", &wire_params(&sram_wire.name))?;

        let mut node = "n_0_2".to_string();
        for (idx, (t, input)) in self.levels.iter().zip(&self.inputs).enumerate() {
            let j = idx + 1;
            let sw_out = format!("n_{j}_1");
            let wire_out = format!("n_{j}_2");
            self.switch(out, &format!("sw_L{j}"), t, &node, &sw_out, *input, true)?;
            self.switch(out, &format!("sw_L{j}_off"), t, "n_gnd", &sw_out, *input, false)?;
            let wire = self.wire(&format!("L{j}"));
            out.instance(&wire.name, &[&sw_out, &wire_out], "wire", &wire_params(&wire.name))?;
            node = wire_out;
            if j == self.int_level {
                let buffered = format!("n_{j}_3");
                self.buffer(
                    out,
                    self.int_rest.as_ref(),
                    &self.int_inv,
                    &self.wire("int_buffer"),
                    &node,
                    &buffered,
                )?;
                node = buffered;
            }
        }
        self.buffer(
            out,
            self.out_rest.as_ref(),
            &self.out_inv,
            &self.wire("out_buffer"),
            &node,
            "n_out",
        )?;
        out.end_subcircuit()
    }

    fn compute_area(&self, model: &AreaModel, areas: &mut Areas, widths: &mut Widths) -> Result<()> {
        let k = self.k();
        let int_count = (1usize << k.saturating_sub(self.int_level)) as f64;
        let mut sum = AreaSum::new(areas, LUT);
        sum.add(&self.sram_driver, (1usize << k) as f64)?;
        for (idx, t) in self.levels.iter().enumerate() {
            sum.add(t, (1usize << (k - idx)) as f64)?;
        }
        for t in self.int_rest.iter().chain(self.int_inv.iter()) {
            sum.add(t, int_count)?;
        }
        sum.add_all(self.out_rest.iter())?
            .add_all(self.out_inv.iter())?;
        let core = sum.total() * self.bodies as f64;
        let sram = self.sram_bits as f64 * model.sram_cell();
        store_area(LUT, core, Some(sram), areas, widths);
        Ok(())
    }

    fn update_wires(&self, ctx: &WireContext<'_>, wires: &mut Wires) -> Result<()> {
        let sram_driver = ctx.width(&self.sram_driver.name, LUT)?;
        let l1 = match self.levels.first() {
            Some(t) => ctx.width(&t.name, LUT)?,
            None => 0.0,
        };
        set_wire(wires, &self.wire("sram_driver"), (sram_driver + l1) / 4.0);
        for j in 1..=self.k() {
            let length = (1usize << (j - 1)) as f64 * l1;
            set_wire(wires, &self.wire(&format!("L{j}")), length);
        }
        let int = (ctx.width(&self.int_inv[0].name, LUT)? + ctx.width(&self.int_inv[1].name, LUT)?) / 2.0;
        set_wire(wires, &self.wire("int_buffer"), int);
        let out = (ctx.width(&self.out_inv[0].name, LUT)? + ctx.width(&self.out_inv[1].name, LUT)?) / 2.0;
        set_wire(wires, &self.wire("out_buffer"), out);
        Ok(())
    }
}

/// The driver kinds present in an architecture, in a stable order.
pub fn driver_kinds(arch: &ArchParams) -> Vec<LutDriverKind> {
    let mut kinds: Vec<LutDriverKind> = Vec::new();
    for input in arch.lut_inputs() {
        let kind = arch.driver_kind(input);
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    kinds
}
