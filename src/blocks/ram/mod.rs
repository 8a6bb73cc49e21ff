//! Dual-port block RAM tile.

use crate::blocks::chain::{Chain, Span, Stage};
use crate::blocks::mux::{Mux, MuxSizing};
use crate::blocks::{BlockClass, Subcircuit};
use crate::config::{ArchParams, BramParams};
use crate::error::Result;

pub mod cell;
pub mod column;
pub mod decoder;

pub use cell::MemoryCell;

/// Every subcircuit of the RAM tile, input side first.
pub fn build(arch: &ArchParams, bram: &BramParams) -> Result<Vec<Box<dyn Subcircuit>>> {
    bram.validate()?;
    let banks = bram.number_of_banks;
    let mut out: Vec<Box<dyn Subcircuit>> = Vec::new();

    // Address, data and control inputs of both ports.
    let ram_inputs = 2 * (bram.row_decoder_bits + bram.col_decoder_bits + bram.max_word_width() + 2);
    out.push(Box::new(Mux::new(
        "ram_local_mux",
        BlockClass::Ram,
        ram_inputs,
        arch.local_mux_size(),
        arch.family,
        MuxSizing {
            l1: 2.0,
            l2: 2.0,
            inv1: (2.0, 4.0),
            inv2: Some((4.0, 8.0)),
        },
    )));

    out.extend(decoder::row_decoder(bram));
    out.push(Box::new(decoder::column_decoder(bram)));
    out.extend(decoder::configurable_decoder(bram));

    out.push(Box::new(column::precharge(bram)));
    out.push(Box::new(column::sense_amp(bram)));
    out.push(Box::new(column::write_driver(bram)));

    out.push(Box::new(Mux::new(
        "output_crossbar",
        BlockClass::Ram,
        bram.max_word_width() * banks,
        bram.conf_decoder_bits + 1,
        arch.family,
        MuxSizing {
            l1: 2.0,
            l2: 2.0,
            inv1: (2.0, 4.0),
            inv2: Some((6.0, 12.0)),
        },
    )));

    let name = "level_shifter";
    out.push(Box::new(
        Chain::new(name, BlockClass::Ram, bram.rows() * banks)
            .stage(Stage::inv(name, "1", 1.0, 2.0))
            .stage(Stage::inv(name, "2", 2.0, 4.0))
            .internal_wire(Span::Stages)
            .unswept(),
    ));

    out.push(Box::new(MemoryCell::new(bram)));
    Ok(out)
}
