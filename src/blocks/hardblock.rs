//! Interface circuitry of a hard block. The core itself is characterised
//! by the ASIC flow, not by this library.

use crate::blocks::chain::{Chain, Span, Stage};
use crate::blocks::mux::{Mux, MuxSizing};
use crate::blocks::{BlockClass, Subcircuit};
use crate::config::{CircuitFamily, HardBlockParams};

pub fn local_mux_name(hb: &HardBlockParams) -> String {
    format!("hb_{}_local_mux", hb.name)
}

pub fn dedicated_out_name(hb: &HardBlockParams) -> String {
    format!("hb_{}_dedicated_out", hb.name)
}

pub fn build(family: CircuitFamily, hb: &HardBlockParams) -> Vec<Box<dyn Subcircuit>> {
    let class = BlockClass::HardBlock(hb.name.clone());
    let mut out: Vec<Box<dyn Subcircuit>> = vec![Box::new(Mux::new(
        local_mux_name(hb),
        class.clone(),
        hb.num_gen_inputs,
        hb.local_mux_size(),
        family,
        MuxSizing {
            l1: 2.0,
            l2: 2.0,
            inv1: (2.0, 4.0),
            inv2: Some((4.0, 8.0)),
        },
    ))];
    if hb.num_dedicated_outputs > 0 {
        let name = dedicated_out_name(hb);
        out.push(Box::new(
            Chain::new(name.as_str(), class, hb.num_dedicated_outputs)
                .stage(Stage::inv(&name, "1", 2.0, 4.0))
                .stage(Stage::inv(&name, "2", 6.0, 12.0))
                .internal_wire(Span::Stages)
                .tail_wire("load", 0, Span::Block(format!("hb_{}", hb.name), 1.0)),
        ));
    }
    out
}
