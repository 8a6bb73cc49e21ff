//! Row, column and configurable decoders.
//!
//! Decoders are predecoded: address bits are split into two- and three-bit
//! groups, each decoded by a NAND stage, and a final NAND stage combines
//! one output of every group.

use crate::blocks::chain::{Chain, Span, Stage};
use crate::blocks::{BlockClass, Subcircuit};
use crate::config::bram::predecoder_groups;
use crate::config::BramParams;

/// Name of the predecoder stage of `prefix` with `radix` inputs.
pub fn predecoder_name(prefix: &str, radix: usize) -> String {
    format!("{prefix}_stage1_{radix}")
}

fn address_buffer(name: &str, count: usize) -> Chain {
    Chain::new(name, BlockClass::Ram, count)
        .stage(Stage::inv(name, "1", 1.0, 2.0))
        .stage(Stage::inv(name, "2", 2.0, 4.0))
        .internal_wire(Span::Stages)
        .tail_wire("load", 0, Span::Block("ram".into(), 0.5))
}

fn nand_stage(name: &str, fan_in: usize, count: usize, drive: f64) -> Chain {
    Chain::new(name, BlockClass::Ram, count)
        .stage(Stage::nand(name, "1", fan_in, 1.0, 2.0))
        .stage(Stage::inv(name, "1", drive, 2.0 * drive))
        .internal_wire(Span::Stages)
}

fn predecoders(prefix: &str, bits: usize, banks: usize) -> Vec<Box<dyn Subcircuit>> {
    let (twos, threes) = predecoder_groups(bits);
    let mut out: Vec<Box<dyn Subcircuit>> = Vec::new();
    if twos > 0 {
        out.push(Box::new(nand_stage(&predecoder_name(prefix, 2), 2, twos * 4 * banks, 2.0)));
    }
    if threes > 0 {
        out.push(Box::new(nand_stage(&predecoder_name(prefix, 3), 3, threes * 8 * banks, 2.0)));
    }
    out
}

/// Row decoder: address buffers, predecoders, final NAND and the
/// wordline driver.
pub fn row_decoder(bram: &BramParams) -> Vec<Box<dyn Subcircuit>> {
    let bits = bram.row_decoder_bits;
    let banks = bram.number_of_banks;
    let (twos, threes) = predecoder_groups(bits);
    let mut out: Vec<Box<dyn Subcircuit>> = vec![Box::new(address_buffer(
        "row_decoder_stage0",
        bits * banks,
    ))];
    out.extend(predecoders("row_decoder", bits, banks));
    out.push(Box::new(nand_stage(
        "row_decoder_stage3",
        twos + threes,
        bram.rows() * banks,
        1.0,
    )));

    let name = "wordline_driver";
    out.push(Box::new(
        Chain::new(name, BlockClass::Ram, bram.rows() * banks)
            .stage(Stage::inv(name, "1", 1.0, 2.0))
            .stage(Stage::inv(name, "2", 2.0, 4.0))
            .stage(Stage::inv(name, "3", 4.0, 8.0))
            .stage(Stage::inv(name, "4", 8.0, 16.0))
            .internal_wire(Span::Stages),
    ));
    out
}

/// Column decoder selecting one word of a row.
pub fn column_decoder(bram: &BramParams) -> Chain {
    let name = "column_decoder";
    Chain::new(name, BlockClass::Ram, (1 << bram.col_decoder_bits) * bram.number_of_banks)
        .stage(Stage::nand(name, "1", bram.col_decoder_bits.clamp(2, 3), 1.0, 2.0))
        .stage(Stage::inv(name, "1", 1.0, 2.0))
        .stage(Stage::inv(name, "2", 2.0, 4.0))
        .internal_wire(Span::Stages)
}

/// Decoder for the configurable word width.
pub fn configurable_decoder(bram: &BramParams) -> Vec<Box<dyn Subcircuit>> {
    let bits = bram.conf_decoder_bits;
    let banks = bram.number_of_banks;
    let (twos, threes) = predecoder_groups(bits);
    let mut out: Vec<Box<dyn Subcircuit>> = vec![Box::new(address_buffer(
        "configurable_decoder_stage0",
        bits * banks,
    ))];
    out.extend(predecoders("configurable_decoder", bits, banks));
    out.push(Box::new(nand_stage(
        "configurable_decoder_stage2",
        (twos + threes).max(2),
        bram.max_word_width() * banks,
        2.0,
    )));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::ram::tests::bram_7_3_4;

    #[test]
    fn test_row_decoder_stages() {
        let bram = bram_7_3_4();
        let stages = row_decoder(&bram);
        let names: Vec<String> = stages.iter().map(|s| s.name().to_string()).collect();
        // 7 bits predecode as 2 + 2 + 3
        assert_eq!(
            names,
            vec![
                "row_decoder_stage0",
                "row_decoder_stage1_2",
                "row_decoder_stage1_3",
                "row_decoder_stage3",
                "wordline_driver"
            ]
        );
        assert_eq!(stages[1].per_tile(), 8);
        assert_eq!(stages[2].per_tile(), 8);
        assert_eq!(stages[3].per_tile(), 128);
    }

    #[test]
    fn test_configurable_decoder_four_bits() {
        let bram = bram_7_3_4();
        let stages = configurable_decoder(&bram);
        let names: Vec<String> = stages.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "configurable_decoder_stage0",
                "configurable_decoder_stage1_2",
                "configurable_decoder_stage2"
            ]
        );
        assert_eq!(stages[2].per_tile(), 16);
    }
}
