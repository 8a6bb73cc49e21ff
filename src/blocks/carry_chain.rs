//! Ripple and skip carry chains.

use crate::blocks::chain::{Chain, Span, Stage};
use crate::blocks::loads::carry_chain_output_load;
use crate::blocks::mux::{Mux, MuxSizing};
use crate::blocks::{BlockClass, Subcircuit};
use crate::config::{ArchParams, CarryChain, CarryChainType};
use crate::error::{Result, TileError};
use crate::tile::floorplan::Link;

const OUTPUT_MUX: MuxSizing = MuxSizing {
    l1: 2.0,
    l2: 2.0,
    inv1: (1.0, 2.0),
    inv2: Some((2.0, 4.0)),
};

/// Every carry-chain subcircuit of one cluster.
pub fn build(arch: &ArchParams, cc: &CarryChain) -> Result<Vec<Box<dyn Subcircuit>>> {
    let adders = arch.full_adders();
    let mut out: Vec<Box<dyn Subcircuit>> = Vec::new();

    let name = "carry_chain";
    out.push(Box::new(
        Chain::new(name, BlockClass::CarryChain, adders)
            .stage(Stage::nand(name, "1", 2, 1.0, 2.0))
            .stage(Stage::inv(name, "1", 1.0, 2.0))
            .stage(Stage::inv(name, "2", 2.0, 4.0))
            .internal_wire(Span::Stages)
            .tail_wire("1", 0, Span::Height(adders)),
    ));

    let name = "carry_chain_per";
    out.push(Box::new(
        Chain::new(name, BlockClass::CarryChain, arch.n)
            .stage(Stage::inv(name, "1", 1.0, 2.0))
            .stage(Stage::inv(name, "2", 2.0, 4.0))
            .internal_wire(Span::Stages)
            .named_tail_wire("wire_lut_to_cc", 0, Span::Link(Link::LutCc)),
    ));

    out.push(Box::new(Mux::new(
        "carry_chain_mux",
        BlockClass::CarryChain,
        arch.n,
        2,
        arch.family,
        OUTPUT_MUX,
    )));
    out.push(Box::new(carry_chain_output_load()));

    let name = "carry_chain_inter";
    out.push(Box::new(
        Chain::new(name, BlockClass::CarryChain, 1)
            .stage(Stage::inv(name, "1", 2.0, 4.0))
            .stage(Stage::inv(name, "2", 4.0, 8.0))
            .internal_wire(Span::Height(1)),
    ));

    if cc.kind == CarryChainType::Skip {
        let (r1, r2) = cc
            .skip_nand_radix()
            .ok_or_else(|| TileError::config("skip_size", "must be between 4 and 9"))?;
        let groups = arch.skip_groups();
        let name = "carry_chain_skip_and";
        out.push(Box::new(
            Chain::new(name, BlockClass::CarryChain, groups)
                .stage(Stage::nand(name, "1", r1, 1.0, 2.0))
                .stage(Stage::inv(name, "1", 1.0, 2.0))
                .stage(Stage::nand(name, "2", r2, 1.0, 2.0))
                .stage(Stage::inv(name, "2", 2.0, 4.0))
                .internal_wire(Span::Stages),
        ));
        out.push(Box::new(Mux::new(
            "carry_chain_skip_mux",
            BlockClass::CarryChain,
            groups,
            2,
            arch.family,
            OUTPUT_MUX,
        )));
    }
    Ok(out)
}
