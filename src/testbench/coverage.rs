//! Deck inventory: one deck per measured subcircuit and loading
//! environment.

use crate::blocks::{hardblock, BlockClass, Library};
use crate::config::{ArchParams, HardBlockParams, RoutingWire};
use crate::error::{Result, TileError};
use crate::testbench::{Deck, DeckBuilder, Probe, Rail};
use crate::tile::TileModel;

const STOP_SB: f64 = 8.0;
const STOP_FAST: f64 = 4.0;
const STOP_FLUT: f64 = 16.0;
const STOP_CARRY: f64 = 26.0;
const STOP_SLOW: f64 = 8.0;

/// RAM subcircuits measured through other decks or not at all.
const RAM_UNMEASURED: [&str; 2] = ["memory_cell", "level_shifter"];

/// Every deck of a tile, in library order.
pub fn decks(model: &TileModel) -> Result<Vec<Deck>> {
    let cov = Coverage::new(model);
    let mut decks = Vec::new();
    decks.extend(cov.sb_mux()?);
    decks.extend(cov.cb_mux()?);
    decks.extend(cov.local_mux()?);
    decks.push(cov.lut()?);
    for x in cov.body_inputs.clone() {
        decks.push(cov.lut_input(x, false)?);
        decks.push(cov.lut_input(x, true)?);
    }
    if let Some(f) = cov.arch.fracturable_input() {
        decks.push(cov.fracturable_driver(f, false)?);
        decks.push(cov.fracturable_driver(f, true)?);
        decks.push(cov.flut_mux()?);
    }
    decks.push(cov.ble_output("local_ble_output", "local_ble_output_load", "local_mux")?);
    let first = cov.first_wire()?;
    decks.push(cov.ble_output(
        "general_ble_output",
        "general_ble_output_load",
        &format!("sb_mux_{}", first.name),
    )?);
    decks.push(cov.ff()?);
    if cov.arch.carry_chain_enabled() {
        decks.extend(cov.carry_chain()?);
    }
    decks.extend(cov.ram()?);
    for hb in &model.config().hardblocks {
        decks.extend(cov.hardblock(hb)?);
    }
    Ok(decks)
}

struct Coverage<'a> {
    arch: &'a ArchParams,
    library: &'a Library,
    /// Inputs that select inside the LUT body.
    body_inputs: Vec<char>,
}

fn deck(
    name: impl Into<String>,
    description: impl Into<String>,
    stop_ns: f64,
    primary: Probe,
    b: DeckBuilder,
) -> Deck {
    Deck {
        name: name.into(),
        description: description.into(),
        weight: 1.0,
        stop_ns,
        primary,
        subs: Vec::new(),
        complement: false,
        clocked: false,
        elements: b.finish(),
    }
}

/// Appends `_<i>` to deck names of keys measured in several environments.
fn numbered(stem: &str, i: usize, count: usize) -> String {
    if count > 1 {
        format!("{stem}_{i}")
    } else {
        stem.to_string()
    }
}

impl<'a> Coverage<'a> {
    fn new(model: &'a TileModel) -> Self {
        let arch = &model.config().arch;
        let fracturable = arch.fracturable_input();
        Self {
            arch,
            library: model.library(),
            body_inputs: arch
                .lut_inputs()
                .into_iter()
                .filter(|x| Some(*x) != fracturable)
                .collect(),
        }
    }

    fn lut_stop(&self) -> f64 {
        if self.arch.use_fluts {
            STOP_FLUT
        } else {
            STOP_FAST
        }
    }

    fn first_wire(&self) -> Result<&'a RoutingWire> {
        self.arch
            .wires
            .first()
            .ok_or_else(|| TileError::config("wire_types", "at least one routing wire is required"))
    }

    fn inverting(&self, name: &str) -> Result<bool> {
        self.library
            .get(name)
            .map(|s| s.inverting())
            .ok_or_else(|| TileError::generation("testbench", name))
    }

    /// Appends subcircuit `name` and returns its output node.
    fn push(&self, b: &mut DeckBuilder, name: &str, rail: Rail) -> Result<String> {
        let s = self
            .library
            .get(name)
            .ok_or_else(|| TileError::generation("testbench", name))?;
        Ok(b.stage(&s.cell(), rail, s.inverting()))
    }

    /// LUT with static selects, followed by the fracturable output mux when
    /// present.
    fn lut_body(&self, b: &mut DeckBuilder) -> Result<String> {
        b.lut(&self.body_inputs, Rail::Env);
        if self.arch.use_fluts {
            self.push(b, "flut_mux", Rail::Env)?;
        }
        Ok(b.at())
    }

    /// One input of each LUT driver kind.
    fn driver_inputs(&self) -> Vec<char> {
        let mut seen = Vec::new();
        let mut inputs = Vec::new();
        for x in &self.body_inputs {
            let kind = self.arch.driver_kind(*x);
            if !seen.contains(&kind) {
                seen.push(kind);
                inputs.push(*x);
            }
        }
        inputs
    }

    /// Wires fed by the switch-block mux of `wire`, with normalised weights.
    fn sinks(&self, wire: &'a RoutingWire) -> Vec<(&'a RoutingWire, f64)> {
        let mut sinks: Vec<(&RoutingWire, f64)> = self
            .arch
            .wires
            .iter()
            .filter_map(|u| {
                self.arch
                    .sb_wire_sources(u)
                    .into_iter()
                    .find(|(id, frac)| *id == wire.id && *frac > 0.0)
                    .map(|(_, frac)| (u, frac))
            })
            .collect();
        let total: f64 = sinks.iter().map(|(_, f)| f).sum();
        if sinks.is_empty() || total <= 0.0 {
            return vec![(wire, 1.0)];
        }
        for sink in sinks.iter_mut() {
            sink.1 /= total;
        }
        sinks
    }

    fn sb_mux(&self) -> Result<Vec<Deck>> {
        let mut decks = Vec::new();
        for wire in &self.arch.wires {
            let dut = format!("sb_mux_{}", wire.name);
            let sinks = self.sinks(wire);
            let mut envs = Vec::new();
            for (id, frac) in self.arch.sb_wire_sources(wire) {
                let source = self.arch.wire(id).ok_or_else(|| {
                    TileError::config("wire_types", format!("unknown source wire {id} of {}", wire.name))
                })?;
                for (sink, sink_frac) in &sinks {
                    envs.push((source, *sink, frac * sink_frac));
                }
            }
            let count = envs.len();
            for (i, (source, sink, weight)) in envs.into_iter().enumerate() {
                let mut b = DeckBuilder::new();
                self.push(&mut b, &format!("sb_mux_{}", source.name), Rail::Env)?;
                self.push(&mut b, &format!("routing_wire_load_{}", source.name), Rail::Env)?;
                let from = b.at();
                self.push(&mut b, &dut, Rail::Dut)?;
                let to = self.push(&mut b, &format!("routing_wire_load_{}", wire.name), Rail::Env)?;
                self.push(&mut b, &format!("sb_mux_{}", sink.name), Rail::Env)?;
                let primary = b.probe(&dut, &from, &to);
                let mut d = deck(
                    numbered(&dut, i, count),
                    format!("{dut} from {} into {}", source.name, sink.name),
                    STOP_SB,
                    primary,
                    b,
                );
                d.weight = weight;
                decks.push(d);
            }
        }
        Ok(decks)
    }

    fn cb_mux(&self) -> Result<Vec<Deck>> {
        let mut feeding: Vec<&RoutingWire> = self.arch.wires.iter().filter(|w| w.feeds_cb).collect();
        if feeding.is_empty() {
            feeding = self.arch.wires.iter().collect();
        }
        let total: f64 = feeding.iter().map(|w| w.freq).sum();
        let drivers = self.driver_inputs();
        let count = feeding.len() * drivers.len();
        let mut decks = Vec::new();
        for (i, (wire, x)) in feeding
            .iter()
            .flat_map(|w| drivers.iter().map(move |x| (*w, *x)))
            .enumerate()
        {
            let mut b = DeckBuilder::new();
            self.push(&mut b, &format!("sb_mux_{}", wire.name), Rail::Env)?;
            self.push(&mut b, &format!("routing_wire_load_{}", wire.name), Rail::Env)?;
            let from = b.at();
            self.push(&mut b, "cb_mux", Rail::Dut)?;
            let to = self.push(&mut b, "local_routing_wire_load", Rail::Env)?;
            self.push(&mut b, "local_mux", Rail::Env)?;
            self.push(&mut b, &format!("lut_{x}_driver"), Rail::Env)?;
            let primary = b.probe("cb_mux", &from, &to);
            let mut d = deck(
                numbered("cb_mux", i, count),
                format!("cb_mux from {} towards lut_{x}", wire.name),
                STOP_FAST,
                primary,
                b,
            );
            d.weight = wire.freq / total / drivers.len() as f64;
            decks.push(d);
        }
        Ok(decks)
    }

    fn local_mux(&self) -> Result<Vec<Deck>> {
        let drivers = self.driver_inputs();
        let count = drivers.len();
        let mut decks = Vec::new();
        for (i, x) in drivers.into_iter().enumerate() {
            let mut b = DeckBuilder::new();
            self.push(&mut b, "cb_mux", Rail::Env)?;
            self.push(&mut b, "local_routing_wire_load", Rail::Env)?;
            let from = b.at();
            let to = self.push(&mut b, "local_mux", Rail::Dut)?;
            self.push(&mut b, &format!("lut_{x}_driver"), Rail::Env)?;
            let primary = b.probe("local_mux", &from, &to);
            let mut d = deck(
                numbered("local_mux", i, count),
                format!("local_mux into lut_{x}_driver"),
                STOP_FAST,
                primary,
                b,
            );
            d.weight = 1.0 / count as f64;
            decks.push(d);
        }
        Ok(decks)
    }

    /// SRAM-to-output path of the LUT body.
    fn lut(&self) -> Result<Deck> {
        let mut b = DeckBuilder::new();
        let to = b.lut(&self.body_inputs, Rail::Dut);
        if self.arch.use_fluts {
            self.push(&mut b, "flut_mux", Rail::Env)?;
        }
        self.push(&mut b, "lut_output_load", Rail::Env)?;
        self.push(&mut b, "local_ble_output", Rail::Env)?;
        let primary = b.probe("lut", "n_in", &to);
        Ok(deck("lut", "LUT body from the SRAM cells", self.lut_stop(), primary, b))
    }

    /// Path from the local mux through one input driver and the LUT body.
    /// With `not` set the complemented select line is the one measured.
    fn lut_input(&self, x: char, not: bool) -> Result<Deck> {
        let driver = format!("lut_{x}_driver");
        let not_driver = format!("lut_{x}_not_driver");
        let (dut, env) = if not {
            (&not_driver, &driver)
        } else {
            (&driver, &not_driver)
        };

        let mut b = DeckBuilder::new();
        self.push(&mut b, "cb_mux", Rail::Env)?;
        self.push(&mut b, "local_routing_wire_load", Rail::Env)?;
        let from = self.push(&mut b, "local_mux", Rail::Env)?;
        let dut_out = self.push(&mut b, dut, Rail::Dut)?;

        // The other select line starts from whichever input polarity makes
        // it the complement of the measured one.
        let complement = !b.inverted() ^ self.inverting(env)?;
        b.goto(if complement { "n_in_n" } else { "n_in" });
        let env_out = self.push(&mut b, env, Rail::Env)?;

        let (sel, sel_n) = if not {
            (env_out, dut_out.clone())
        } else {
            (dut_out.clone(), env_out)
        };
        let to = b.selected_lut(&self.body_inputs, x, &sel, &sel_n, Rail::Dut);
        if self.arch.use_fluts {
            self.push(&mut b, "flut_mux", Rail::Env)?;
        }
        self.push(&mut b, "lut_output_load", Rail::Env)?;
        self.push(&mut b, "local_ble_output", Rail::Env)?;

        let key = if not {
            format!("lut_{x}_not")
        } else {
            format!("lut_{x}")
        };
        let primary = b.probe(&key, &from, &to);
        let sub = b.probe(dut, &from, &dut_out);
        let mut d = deck(
            key.as_str(),
            format!("LUT input {x} through {dut}"),
            self.lut_stop(),
            primary,
            b,
        );
        d.subs.push(sub);
        d.complement = complement;
        Ok(d)
    }

    /// Drivers of the fracturable input feed the output mux select.
    fn fracturable_driver(&self, f: char, not: bool) -> Result<Deck> {
        let dut = if not {
            format!("lut_{f}_not_driver")
        } else {
            format!("lut_{f}_driver")
        };
        let mut b = DeckBuilder::new();
        self.push(&mut b, "cb_mux", Rail::Env)?;
        self.push(&mut b, "local_routing_wire_load", Rail::Env)?;
        let from = self.push(&mut b, "local_mux", Rail::Env)?;
        let to = self.push(&mut b, &dut, Rail::Dut)?;
        self.push(&mut b, "lut_output_load", Rail::Env)?;
        let primary = b.probe(&dut, &from, &to);
        Ok(deck(dut.as_str(), format!("{dut} into the output mux select"), STOP_FLUT, primary, b))
    }

    fn flut_mux(&self) -> Result<Deck> {
        let mut b = DeckBuilder::new();
        let from = b.lut(&self.body_inputs, Rail::Env);
        let to = self.push(&mut b, "flut_mux", Rail::Dut)?;
        self.push(&mut b, "lut_output_load", Rail::Env)?;
        self.push(&mut b, "local_ble_output", Rail::Env)?;
        let primary = b.probe("flut_mux", &from, &to);
        Ok(deck("flut_mux", "fracturable LUT output mux", STOP_FLUT, primary, b))
    }

    fn ble_output(&self, dut: &str, load: &str, terminal: &str) -> Result<Deck> {
        let mut b = DeckBuilder::new();
        self.lut_body(&mut b)?;
        self.push(&mut b, "lut_output_load", Rail::Env)?;
        let from = b.at();
        self.push(&mut b, dut, Rail::Dut)?;
        let to = self.push(&mut b, load, Rail::Env)?;
        self.push(&mut b, terminal, Rail::Env)?;
        let primary = b.probe(dut, &from, &to);
        Ok(deck(dut, format!("{dut} into {terminal}"), STOP_FAST, primary, b))
    }

    /// Clock-to-Q of the flip-flop.
    fn ff(&self) -> Result<Deck> {
        let ff = self
            .library
            .get("ff")
            .ok_or_else(|| TileError::generation("testbench", "ff"))?;
        let mut b = DeckBuilder::new();
        let to = b.clocked_stage(&ff.cell(), Rail::Dut, ff.inverting());
        self.push(&mut b, "local_ble_output", Rail::Env)?;
        let primary = Probe::new("ff", "clk", &to, false);
        let mut d = deck("ff", "flip-flop clock to Q", STOP_FAST, primary, b);
        d.clocked = true;
        Ok(d)
    }

    /// Measures `dut` between `before` and `after` environment stages.
    fn between(&self, dut: &str, before: &[&str], after: &[&str], stop: f64) -> Result<Deck> {
        let mut b = DeckBuilder::new();
        for name in before {
            self.push(&mut b, name, Rail::Env)?;
        }
        let from = b.at();
        let to = self.push(&mut b, dut, Rail::Dut)?;
        for name in after {
            self.push(&mut b, name, Rail::Env)?;
        }
        let primary = b.probe(dut, &from, &to);
        Ok(deck(dut, dut, stop, primary, b))
    }

    fn carry_chain(&self) -> Result<Vec<Deck>> {
        let mut decks = vec![
            self.between("carry_chain", &["carry_chain"], &["carry_chain"], STOP_CARRY)?,
            self.between(
                "carry_chain_mux",
                &["carry_chain", "carry_chain_output_load"],
                &["general_ble_output"],
                STOP_CARRY,
            )?,
            self.between("carry_chain_inter", &["carry_chain"], &["carry_chain"], STOP_CARRY)?,
        ];

        let mut b = DeckBuilder::new();
        let from = self.lut_body(&mut b)?;
        let to = self.push(&mut b, "carry_chain_per", Rail::Dut)?;
        self.push(&mut b, "carry_chain", Rail::Env)?;
        let primary = b.probe("carry_chain_per", &from, &to);
        decks.insert(1, deck("carry_chain_per", "LUT into the carry chain", STOP_CARRY, primary, b));

        if self.library.get("carry_chain_skip_and").is_some() {
            decks.push(self.between("carry_chain_skip_and", &[], &["carry_chain_skip_mux"], STOP_CARRY)?);
            decks.push(self.between(
                "carry_chain_skip_mux",
                &["carry_chain"],
                &["carry_chain"],
                STOP_CARRY,
            )?);
        }
        Ok(decks)
    }

    fn ram(&self) -> Result<Vec<Deck>> {
        let mut decks = Vec::new();
        for s in self.library.iter() {
            let name = s.name();
            if s.class() != BlockClass::Ram || RAM_UNMEASURED.contains(&name.as_str()) {
                continue;
            }
            decks.push(self.between(&name, &["level_shifter"], &["level_shifter"], STOP_SLOW)?);
        }
        Ok(decks)
    }

    fn hardblock(&self, hb: &HardBlockParams) -> Result<Vec<Deck>> {
        let local_mux = hardblock::local_mux_name(hb);
        let mut decks = vec![self.between(
            &local_mux,
            &["cb_mux", "local_routing_wire_load"],
            &["general_ble_output"],
            STOP_SLOW,
        )?];
        let dedicated = hardblock::dedicated_out_name(hb);
        if self.library.get(&dedicated).is_some() {
            decks.push(self.between(&dedicated, &[&local_mux], &[&local_mux], STOP_SLOW)?);
        }
        Ok(decks)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use approx::assert_relative_eq;

    use super::*;
    use crate::blocks::hardblock::tests::dsp;
    use crate::blocks::ram::tests::bram_7_3_4;
    use crate::blocks::tests::minimal_config;
    use crate::config::{CarryChain, CarryChainType, LutSize, MuxSource};
    use crate::tile::tests::minimal_model;

    fn names(decks: &[Deck]) -> Vec<String> {
        decks.iter().map(|d| d.name.clone()).collect()
    }

    #[test]
    fn test_k4_deck_set() {
        let decks = decks(&minimal_model()).unwrap();
        assert_eq!(
            names(&decks),
            vec![
                "sb_mux_L4",
                "cb_mux",
                "local_mux",
                "lut",
                "lut_a",
                "lut_a_not",
                "lut_b",
                "lut_b_not",
                "lut_c",
                "lut_c_not",
                "lut_d",
                "lut_d_not",
                "local_ble_output",
                "general_ble_output",
                "ff",
            ]
        );
        let sb = &decks[0];
        assert_eq!(
            sb.elements[2],
            "Xsb_mux_L4_on_1 n_2 n_3 vdd gnd vdd_dut gnd sb_mux_L4_on"
        );
        assert_eq!(sb.primary.from, "n_2");
        assert_eq!(sb.primary.to, "n_4");
        assert!(decks.iter().all(|d| d.weight == 1.0));
    }

    #[test]
    fn test_lut_input_select_lines_are_complementary() {
        let decks = decks(&minimal_model()).unwrap();
        let lut_a = decks.iter().find(|d| d.name == "lut_a").unwrap();
        // The local mux inverts, so the not-driver is fed from n_in.
        assert!(!lut_a.complement);
        assert!(!lut_a.primary.inverting);
        assert_eq!(lut_a.subs[0].key, "lut_a_driver");
        assert!(lut_a
            .elements
            .iter()
            .any(|e| e.starts_with("Xlut_a_not_driver_0 n_in ")));

        let lut_a_not = decks.iter().find(|d| d.name == "lut_a_not").unwrap();
        assert!(lut_a_not.primary.inverting);
        assert_eq!(lut_a_not.subs[0].key, "lut_a_not_driver");

        let lut = decks.iter().find(|d| d.name == "lut").unwrap();
        assert!(lut.primary.inverting);
    }

    #[test]
    fn test_sb_decks_follow_wire_sources() {
        let mut config = minimal_config();
        let mut long = config.arch.wires[0].clone();
        long.id = 1;
        long.name = "L16".into();
        long.length = 16;
        long.sources = vec![(MuxSource::Wire(0), 1.0), (MuxSource::Wire(1), 1.0)];
        config.arch.wires[0].sources = vec![(MuxSource::Wire(0), 1.0)];
        config.arch.wires.push(long);
        let model = TileModel::new(config, BTreeMap::new()).unwrap();
        let decks = decks(&model).unwrap();

        // L4 only takes L4 inputs but drives both wire types.
        let l4: Vec<&Deck> = decks.iter().filter(|d| d.primary.key == "sb_mux_L4").collect();
        assert_eq!(l4.len(), 2);
        for d in &l4 {
            assert!(d.elements[0].ends_with(" sb_mux_L4_on"));
        }
        assert!(l4[1].elements.last().unwrap().ends_with(" sb_mux_L16_on"));

        // L16 takes both and drives only itself.
        let l16: Vec<&Deck> = decks.iter().filter(|d| d.primary.key == "sb_mux_L16").collect();
        assert_eq!(l16.len(), 2);
        assert_eq!(l16[0].name, "sb_mux_L16_0");
        for d in &l16 {
            assert!(d.elements.last().unwrap().ends_with(" sb_mux_L16_on"));
        }
        let total: f64 = l16.iter().map(|d| d.weight).sum();
        assert_relative_eq!(total, 1.0);
    }

    #[test]
    fn test_fracturable_decks() {
        let mut config = minimal_config();
        config.arch.k = LutSize::K6;
        config.arch.use_fluts = true;
        config.arch.carry_chain = Some(CarryChain {
            kind: CarryChainType::Ripple,
            skip_size: 5,
            fas_per_flut: 2,
        });
        let model = TileModel::new(config, BTreeMap::new()).unwrap();
        let decks = decks(&model).unwrap();
        let names = names(&decks);
        assert!(names.contains(&"lut_e".to_string()));
        assert!(!names.contains(&"lut_f".to_string()));
        for expected in [
            "lut_f_driver",
            "lut_f_not_driver",
            "flut_mux",
            "carry_chain",
            "carry_chain_per",
            "carry_chain_mux",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        assert!(!names.iter().any(|n| n.starts_with("carry_chain_skip")));
        let lut = decks.iter().find(|d| d.name == "lut").unwrap();
        assert_eq!(lut.stop_ns, 16.0);
        assert!(lut.elements[0].ends_with(" vdd gnd vdd_dut gnd lut"));
        assert!(lut.elements[1].ends_with(" flut_mux_on"));
    }

    #[test]
    fn test_skip_chain_decks() {
        let mut config = minimal_config();
        config.arch.carry_chain = Some(CarryChain {
            kind: CarryChainType::Skip,
            skip_size: 5,
            fas_per_flut: 2,
        });
        let model = TileModel::new(config, BTreeMap::new()).unwrap();
        let decks = decks(&model).unwrap();
        let skip = decks.iter().find(|d| d.name == "carry_chain_skip_and").unwrap();
        assert_eq!(skip.primary.from, "n_in");
        assert_eq!(skip.stop_ns, 26.0);
        assert!(decks.iter().any(|d| d.name == "carry_chain_skip_mux"));
    }

    #[test]
    fn test_ram_and_hard_block_decks() {
        let mut config = minimal_config();
        config.bram = Some(bram_7_3_4());
        config.hardblocks = vec![dsp()];
        let hb_cores = BTreeMap::from([(
            "dsp".to_string(),
            crate::asic::HardBlockCore {
                area: 0.0,
                delay: 1.0e-9,
            },
        )]);
        let model = TileModel::new(config, hb_cores).unwrap();
        let names = names(&decks(&model).unwrap());
        for expected in [
            "ram_local_mux",
            "row_decoder_stage0",
            "row_decoder_stage1_2",
            "row_decoder_stage1_3",
            "row_decoder_stage3",
            "wordline_driver",
            "precharge",
            "sense_amp",
            "write_driver",
            "output_crossbar",
            "hb_dsp_local_mux",
            "hb_dsp_dedicated_out",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        assert!(!names.iter().any(|n| n == "memory_cell" || n == "level_shifter"));
    }
}
