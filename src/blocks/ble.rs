//! BLE output muxes, the fracturable-LUT output mux and the flip-flop.

use arcstr::ArcStr;

use crate::blocks::mux::{Mux, MuxSizing};
use crate::blocks::{device_params, init_sizes, store_area, AreaSum, BlockClass, Subcircuit, WireContext, WireDef};
use crate::config::ArchParams;
use crate::error::Result;
use crate::maps::{Areas, Sizes, Widths, Wires};
use crate::spice::{SpiceWriter, PORTS};
use crate::tech::{AreaModel, Transistor, TransistorKind};

/// Selects between the two LUT halves of a fracturable LUT.
pub fn flut_mux(arch: &ArchParams) -> Mux {
    Mux::new(
        "flut_mux",
        BlockClass::Lut,
        arch.n,
        2,
        arch.family,
        MuxSizing {
            l1: 2.0,
            l2: 2.0,
            inv1: (2.0, 4.0),
            inv2: Some((4.0, 8.0)),
        },
    )
}

/// BLE output back into the local interconnect.
pub fn local_ble_output(arch: &ArchParams) -> Mux {
    Mux::new(
        "local_ble_output",
        BlockClass::BleOutput,
        arch.n * arch.ofb,
        2,
        arch.family,
        MuxSizing {
            l1: 2.0,
            l2: 2.0,
            inv1: (1.0, 2.0),
            inv2: Some((4.0, 8.0)),
        },
    )
}

/// BLE output onto general routing.
pub fn general_ble_output(arch: &ArchParams) -> Mux {
    Mux::new(
        "general_ble_output",
        BlockClass::BleOutput,
        arch.n * arch.or,
        2,
        arch.family,
        MuxSizing {
            l1: 2.0,
            l2: 2.0,
            inv1: (2.0, 4.0),
            inv2: Some((6.0, 12.0)),
        },
    )
}

const FF: &str = "ff";

fn inv(out: &mut SpiceWriter, t: &Transistor, a: &str, b: &str) -> Result<()> {
    out.instance(&t.name, &[a, b, "n_vdd", "n_gnd"], "inv", &device_params(t))
}

/// Master-slave flip-flop. `n_gate` is the clock. Area-counted only.
#[derive(Debug, Clone)]
pub struct FlipFlop {
    per_tile: usize,
    input_select: Transistor,
    input_rest: Option<Transistor>,
    input_inv: Transistor,
    master: Transistor,
    master_cc: [Transistor; 2],
    slave: Transistor,
    slave_cc: [Transistor; 2],
    output: Transistor,
}

impl FlipFlop {
    pub fn new(arch: &ArchParams) -> Self {
        let tgate = arch.family.use_tgate();
        let inv = |tag: &str| Transistor::new(TransistorKind::Inv, FF, tag);
        Self {
            per_tile: if arch.use_fluts { 2 * arch.n } else { arch.n },
            input_select: Transistor::new(
                if tgate {
                    TransistorKind::Tgate
                } else {
                    TransistorKind::Ptran
                },
                FF,
                "input_select",
            ),
            input_rest: (!tgate).then(|| Transistor::new(TransistorKind::Rest, FF, "input_select")),
            input_inv: inv("input_1"),
            master: Transistor::new(TransistorKind::Tgate, FF, "1"),
            master_cc: [inv("cc1_1"), inv("cc1_2")],
            slave: Transistor::new(TransistorKind::Tgate, FF, "2"),
            slave_cc: [inv("cc2_1"), inv("cc2_2")],
            output: inv("output_driver"),
        }
    }
}

impl Subcircuit for FlipFlop {
    fn name(&self) -> ArcStr {
        arcstr::literal!("ff")
    }

    fn class(&self) -> BlockClass {
        BlockClass::FlipFlop
    }

    fn per_tile(&self) -> usize {
        self.per_tile
    }

    fn transistors(&self) -> Vec<Transistor> {
        let mut ts = vec![self.input_select.clone()];
        ts.extend(self.input_rest.clone());
        ts.push(self.input_inv.clone());
        ts.push(self.master.clone());
        ts.extend(self.master_cc.iter().cloned());
        ts.push(self.slave.clone());
        ts.extend(self.slave_cc.iter().cloned());
        ts.push(self.output.clone());
        ts
    }

    fn wires(&self) -> Vec<WireDef> {
        Vec::new()
    }

    fn initial_sizes(&self) -> Sizes {
        let transistors = self.transistors();
        let pairs: Vec<(&Transistor, f64, f64)> = transistors
            .iter()
            .map(|t| {
                if t == &self.output {
                    (t, 2.0, 4.0)
                } else {
                    (t, 1.0, 1.0)
                }
            })
            .collect();
        init_sizes(&pairs)
    }

    fn swept(&self) -> bool {
        false
    }

    fn emit_netlist(&self, out: &mut SpiceWriter) -> Result<()> {
        out.subcircuit(FF, &PORTS)?;
        let sel = &self.input_select;
        match sel.kind {
            TransistorKind::Tgate => out.instance(
                &sel.name,
                &["n_in", "n_1", "n_vdd", "n_gnd", "n_vdd", "n_gnd"],
                "tgate",
                &device_params(sel),
            )?,
            _ => out.instance(&sel.name, &["n_in", "n_1", "n_vdd", "n_gnd"], "ptran", &device_params(sel))?,
        }
        if let Some(rest) = &self.input_rest {
            out.instance(&rest.name, &["n_1", "n_2", "n_vdd"], "rest", &device_params(rest))?;
        }
        inv(out, &self.input_inv, "n_1", "n_2")?;
        out.instance(
            &self.master.name,
            &["n_2", "n_3", "n_gate_n", "n_gate", "n_vdd", "n_gnd"],
            "tgate",
            &device_params(&self.master),
        )?;
        inv(out, &self.master_cc[0], "n_3", "n_4")?;
        inv(out, &self.master_cc[1], "n_4", "n_3")?;
        out.instance(
            &self.slave.name,
            &["n_4", "n_5", "n_gate", "n_gate_n", "n_vdd", "n_gnd"],
            "tgate",
            &device_params(&self.slave),
        )?;
        inv(out, &self.slave_cc[0], "n_5", "n_6")?;
        inv(out, &self.slave_cc[1], "n_6", "n_5")?;
        inv(out, &self.output, "n_6", "n_out")?;
        out.end_subcircuit()
    }

    fn compute_area(&self, _model: &AreaModel, areas: &mut Areas, widths: &mut Widths) -> Result<()> {
        let transistors = self.transistors();
        let core = AreaSum::new(areas, FF).add_all(&transistors)?.total();
        store_area(FF, core, None, areas, widths);
        Ok(())
    }

    fn update_wires(&self, _ctx: &WireContext<'_>, _wires: &mut Wires) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::mux::MuxLevels;
    use crate::config::arch::tests::minimal_arch;
    use crate::config::SwitchType;

    #[test]
    fn test_ble_output_counts() {
        let arch = minimal_arch();
        assert_eq!(local_ble_output(&arch).per_tile(), 4);
        assert_eq!(general_ble_output(&arch).per_tile(), 8);
        assert_eq!(flut_mux(&arch).levels(), MuxLevels::One(2));
    }

    #[test]
    fn test_ff_is_area_only() {
        let mut arch = minimal_arch();
        let ff = FlipFlop::new(&arch);
        assert!(!ff.swept());
        assert_eq!(ff.per_tile(), 4);
        assert_eq!(ff.transistors().len(), 10);
        assert_eq!(ff.initial_sizes()["inv_ff_output_driver_pmos"], 4.0);

        arch.use_fluts = true;
        arch.family.switch = SwitchType::TransmissionGate;
        let ff = FlipFlop::new(&arch);
        assert_eq!(ff.per_tile(), 8);
        assert_eq!(ff.transistors()[0].name, "tgate_ff_input_select");
        assert_eq!(ff.transistors().len(), 9);
    }
}
