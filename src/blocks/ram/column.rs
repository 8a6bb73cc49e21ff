//! Bitline periphery: precharge, sense amplifier and write driver.

use crate::blocks::chain::{Chain, Span, Stage};
use crate::blocks::BlockClass;
use crate::config::{BramParams, MemoryTechnology};

pub fn precharge(bram: &BramParams) -> Chain {
    let name = "precharge";
    Chain::new(name, BlockClass::Ram, bram.cols() * bram.number_of_banks)
        .stage(Stage::inv(name, "1", 1.0, 2.0))
        .stage(Stage::inv(name, "2", 2.0, 6.0))
        .internal_wire(Span::Stages)
        .tail_wire("bitline", 0, Span::Block("memory_cell".into(), bram.rows() as f64))
}

/// Sense amplifier. The two series devices form the evaluate path; the
/// output inverter drives the crossbar. MTJ arrays sense a current, so the
/// clamp device is wider.
pub fn sense_amp(bram: &BramParams) -> Chain {
    let name = "sense_amp";
    let clamp = match bram.memory_technology {
        MemoryTechnology::Sram => 1.0,
        MemoryTechnology::Mtj => 2.0,
    };
    Chain::new(name, BlockClass::Ram, bram.max_word_width() * bram.number_of_banks)
        .stage(Stage::tran(name, "1", clamp))
        .stage(Stage::tran(name, "2", 1.0))
        .stage(Stage::inv(name, "1", 1.0, 2.0))
        .stage(Stage::inv(name, "out", 2.0, 4.0))
        .internal_wire(Span::Stages)
}

pub fn write_driver(bram: &BramParams) -> Chain {
    let name = "write_driver";
    Chain::new(name, BlockClass::Ram, bram.max_word_width() * bram.number_of_banks)
        .stage(Stage::inv(name, "1", 1.0, 2.0))
        .stage(Stage::tran(name, "1", 2.0))
        .stage(Stage::inv(name, "2", 4.0, 8.0))
        .internal_wire(Span::Stages)
}
