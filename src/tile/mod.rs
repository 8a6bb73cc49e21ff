//! Tile composition: areas, widths, floorplan and wire parasitics for one
//! size assignment.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::asic::HardBlockCore;
use crate::blocks::{BlockClass, Library, WireContext};
use crate::config::{Stripe, TileConfig};
use crate::error::{Result, TileError};
use crate::maps::{Areas, Rc, RcMap, Sizes, Widths, Wires};
use crate::tech::AreaModel;

pub mod floorplan;

use floorplan::Floorplan;

/// Relative change below which wire lengths are considered settled.
pub const RECOMPUTE_TOLERANCE: f64 = 1e-3;
pub const MAX_RECOMPUTES: usize = 8;

/// Everything derived from one size assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct TileState {
    pub areas: Areas,
    pub widths: Widths,
    pub wires: Wires,
    pub rc: RcMap,
    pub floorplan: Floorplan,
    /// Wire passes run before the lengths settled.
    pub iterations: usize,
    pub converged: bool,
}

impl TileState {
    #[inline]
    pub fn tile_area(&self) -> f64 {
        self.areas.get("tile").copied().unwrap_or(0.0)
    }
}

#[derive(Debug)]
pub struct TileModel {
    library: Library,
    config: TileConfig,
    model: AreaModel,
    hb_cores: BTreeMap<String, HardBlockCore>,
}

impl TileModel {
    pub fn new(config: TileConfig, hb_cores: BTreeMap<String, HardBlockCore>) -> Result<Self> {
        let library = Library::build(&config)?;
        let model = AreaModel::new(&config.arch.family, &config.process);
        for hb in &config.hardblocks {
            if !hb_cores.contains_key(&hb.name) {
                return Err(TileError::generation(format!("hb_{}", hb.name), "core"));
            }
        }
        Ok(Self {
            library,
            config,
            model,
            hb_cores,
        })
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn config(&self) -> &TileConfig {
        &self.config
    }

    pub fn area_model(&self) -> &AreaModel {
        &self.model
    }

    pub fn hb_core(&self, name: &str) -> Option<&HardBlockCore> {
        self.hb_cores.get(name)
    }

    /// Iterates floorplan and wire passes until wire lengths settle.
    pub fn recompute(&self, sizes: &Sizes) -> Result<TileState> {
        let (areas, widths) = self.area_pass(sizes)?;
        let target = self.floorplan(&areas);

        let mut floorplan = Floorplan::flat();
        let mut previous: Option<Wires> = None;
        for iteration in 1..=MAX_RECOMPUTES {
            let wires = self.wire_pass(&areas, &widths, &floorplan)?;
            if let Some(previous) = &previous {
                if wires_settled(previous, &wires) {
                    debug!("Tile settled after {iteration} wire passes");
                    return self.finish(areas, widths, wires, floorplan, iteration, true);
                }
            }
            previous = Some(wires);
            floorplan = target.clone();
        }

        warn!("Tile wire lengths did not settle within {MAX_RECOMPUTES} passes");
        let wires = previous.unwrap_or_default();
        self.finish(areas, widths, wires, floorplan, MAX_RECOMPUTES, false)
    }

    /// One pass with a flat floorplan, then one with the floorplan built
    /// from the resulting tile area.
    pub fn recompute_two_pass(&self, sizes: &Sizes) -> Result<TileState> {
        let (areas, widths) = self.area_pass(sizes)?;
        self.wire_pass(&areas, &widths, &Floorplan::flat())?;
        let floorplan = self.floorplan(&areas);
        let wires = self.wire_pass(&areas, &widths, &floorplan)?;
        self.finish(areas, widths, wires, floorplan, 2, true)
    }

    fn area_pass(&self, sizes: &Sizes) -> Result<(Areas, Widths)> {
        self.library.check_sizes(sizes)?;
        let mut areas = Areas::new();
        let mut widths = Widths::new();

        for s in self.library.iter() {
            for t in s.transistors() {
                let mut area = 0.0;
                for device in t.devices() {
                    let size = sizes.require(&device, s.name().as_str())?;
                    area += self.model.device_area(t.kind.area_family(), size);
                }
                widths.insert(t.name.clone(), area.sqrt());
                areas.insert(t.name, area);
            }
        }
        for s in self.library.iter() {
            s.compute_area(&self.model, &mut areas, &mut widths)?;
        }

        self.aggregate(&mut areas, &mut widths)?;
        Ok((areas, widths))
    }

    /// Block totals, the logic tile and the separate RAM and hard block
    /// tiles.
    fn aggregate(&self, areas: &mut Areas, widths: &mut Widths) -> Result<()> {
        let mut totals: BTreeMap<&'static str, f64> = BTreeMap::new();
        let mut sb_count = 0usize;
        let mut hb_totals: BTreeMap<String, f64> = BTreeMap::new();

        for s in self.library.iter() {
            let name = s.name();
            let n = s.per_tile() as f64;
            let class = s.class();
            let (core, full) = (areas.require(&name, &name)?, areas.with_sram(&name)?);
            let (with_sram, no_sram) = match class {
                BlockClass::SwitchBlock => {
                    sb_count += s.per_tile();
                    *totals.entry("sb_mux").or_default() += n * core;
                    ("sb_total", "sb_total_no_sram")
                }
                BlockClass::ConnectionBlock => ("cb_total", "cb_total_no_sram"),
                BlockClass::LocalMux => ("local_mux_total", "local_mux_total_no_sram"),
                BlockClass::Lut => ("lut_total", "lut_total_no_sram"),
                BlockClass::FlipFlop => ("ff_total", "ff_total_no_sram"),
                BlockClass::BleOutput => ("ble_output_total", "ble_output_total_no_sram"),
                BlockClass::CarryChain => ("cc_area_total", "cc_area_total_no_sram"),
                BlockClass::Ram => ("ram", "ram_no_sram"),
                BlockClass::HardBlock(hb) => {
                    *hb_totals.entry(hb).or_default() += n * full;
                    continue;
                }
                BlockClass::Load => continue,
            };
            *totals.entry(with_sram).or_default() += n * full;
            *totals.entry(no_sram).or_default() += n * core;
        }
        if sb_count > 0 {
            if let Some(sum) = totals.get_mut("sb_mux") {
                *sum /= sb_count as f64;
            }
        }

        let get = |key: &str| totals.get(key).copied().unwrap_or(0.0);
        let logic_cluster = get("local_mux_total")
            + get("lut_total")
            + get("ff_total")
            + get("ble_output_total")
            + get("cc_area_total");
        let active = get("sb_total") + get("cb_total") + logic_cluster;

        let arch = &self.config.arch;
        let tracks = arch.w + arch.i + arch.n * (arch.or + arch.ofb);
        let min_side = self.config.process.metal_pitch * tracks as f64;
        let floor = min_side * min_side;
        let (tile, nonactive) = if floor > active {
            (floor, floor - active)
        } else {
            (active, 0.0)
        };

        for (key, value) in &totals {
            if *key == "ram" || *key == "ram_no_sram" {
                continue;
            }
            areas.insert(key.to_string(), *value);
        }
        areas.insert("logic_cluster".into(), logic_cluster);
        areas.insert("tile".into(), tile);
        areas.insert("tile_nonactive".into(), nonactive);
        widths.insert("logic_cluster".into(), logic_cluster.sqrt());
        widths.insert("tile".into(), tile.sqrt());

        if self.config.bram.is_some() {
            let ram = get("ram");
            areas.insert("ram".into(), ram);
            widths.insert("ram".into(), ram.sqrt());
        }
        for hb in &self.config.hardblocks {
            let core = self
                .hb_cores
                .get(&hb.name)
                .ok_or_else(|| TileError::generation(format!("hb_{}", hb.name), "core"))?;
            let key = format!("hb_{}", hb.name);
            let total = core.area + hb_totals.get(&hb.name).copied().unwrap_or(0.0);
            areas.insert(key.clone(), total);
            widths.insert(key, total.sqrt());
        }
        Ok(())
    }

    fn stripe_areas(&self, areas: &Areas) -> BTreeMap<Stripe, f64> {
        let get = |key: &str| areas.get(key).copied().unwrap_or(0.0);
        BTreeMap::from([
            (Stripe::SbSram, get("sb_total") - get("sb_total_no_sram")),
            (Stripe::Sb, get("sb_total_no_sram")),
            (Stripe::Cb, get("cb_total_no_sram")),
            (Stripe::CbSram, get("cb_total") - get("cb_total_no_sram")),
            (Stripe::Ic, get("local_mux_total_no_sram")),
            (
                Stripe::IcSram,
                get("local_mux_total") - get("local_mux_total_no_sram"),
            ),
            (Stripe::Lut, get("lut_total_no_sram")),
            (Stripe::LutSram, get("lut_total") - get("lut_total_no_sram")),
            (Stripe::Cc, get("cc_area_total")),
            (Stripe::Ffble, get("ff_total") + get("ble_output_total")),
        ])
    }

    fn floorplan(&self, areas: &Areas) -> Floorplan {
        let height = areas.get("tile").copied().unwrap_or(0.0).sqrt();
        Floorplan::build(&self.config.stripe_order, &self.stripe_areas(areas), height)
    }

    fn wire_pass(&self, areas: &Areas, widths: &Widths, floorplan: &Floorplan) -> Result<Wires> {
        let ctx = WireContext {
            arch: &self.config.arch,
            areas,
            widths,
            floorplan,
        };
        let mut wires = Wires::new();
        for s in self.library.iter() {
            s.update_wires(&ctx, &mut wires)?;
        }
        for s in self.library.iter() {
            for def in s.wires() {
                let spec = wires.require(&def.name, s.name().as_str())?;
                if !(spec.length >= 0.0) || !spec.length.is_finite() {
                    return Err(TileError::generation(s.name().as_str(), def.name));
                }
            }
        }
        Ok(wires)
    }

    fn rc_pass(&self, wires: &Wires) -> Result<RcMap> {
        let metal = &self.config.process.metal;
        let mut rc = RcMap::new();
        for (name, spec) in wires.iter() {
            let layer = metal
                .get(spec.layer)
                .ok_or_else(|| TileError::generation(name.as_str(), format!("metal{}", spec.layer)))?;
            rc.insert(
                name.clone(),
                Rc {
                    res: spec.length * layer.r_per_nm,
                    cap: spec.length * layer.c_per_nm / 2.0,
                },
            );
        }
        Ok(rc)
    }

    fn finish(
        &self,
        areas: Areas,
        widths: Widths,
        wires: Wires,
        floorplan: Floorplan,
        iterations: usize,
        converged: bool,
    ) -> Result<TileState> {
        let rc = self.rc_pass(&wires)?;
        Ok(TileState {
            areas,
            widths,
            wires,
            rc,
            floorplan,
            iterations,
            converged,
        })
    }
}

fn wires_settled(previous: &Wires, next: &Wires) -> bool {
    previous.len() == next.len()
        && next.iter().all(|(name, spec)| match previous.get(name) {
            Some(old) => {
                let scale = old.length.abs().max(spec.length.abs()).max(1.0);
                (old.length - spec.length).abs() / scale < RECOMPUTE_TOLERANCE
                    && old.layer == spec.layer
            }
            None => false,
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::blocks::hardblock::tests::dsp;
    use crate::blocks::ram::tests::bram_7_3_4;
    use crate::blocks::tests::minimal_config;
    use crate::config::{CarryChain, CarryChainType, LutSize};

    pub(crate) fn minimal_model() -> TileModel {
        TileModel::new(minimal_config(), BTreeMap::new()).unwrap()
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let model = minimal_model();
        let sizes = model.library().initial_sizes();
        let a = model.recompute(&sizes).unwrap();
        let b = model.recompute(&sizes).unwrap();
        assert_eq!(a, b);
        assert!(a.converged);
        assert!(a.iterations <= MAX_RECOMPUTES);
    }

    #[test]
    fn test_two_pass_agrees_with_fixed_point() {
        let model = minimal_model();
        let sizes = model.library().initial_sizes();
        let fixed = model.recompute(&sizes).unwrap();
        let two = model.recompute_two_pass(&sizes).unwrap();
        assert_eq!(fixed.areas, two.areas);
        for (name, spec) in fixed.wires.iter() {
            assert_relative_eq!(spec.length, two.wires[name].length, max_relative = 1e-3);
        }
    }

    #[test]
    fn test_widths_are_square_roots() {
        let model = minimal_model();
        let state = model.recompute(&model.library().initial_sizes()).unwrap();
        for s in model.library().iter() {
            let name = s.name();
            assert_relative_eq!(
                state.widths[name.as_str()],
                state.areas[name.as_str()].sqrt(),
                max_relative = 1e-12
            );
        }
        assert_relative_eq!(state.widths["tile"], state.tile_area().sqrt());
    }

    #[test]
    fn test_every_wire_has_parasitics() {
        let model = minimal_model();
        let state = model.recompute(&model.library().initial_sizes()).unwrap();
        for s in model.library().iter() {
            for def in s.wires() {
                let rc = state.rc[&def.name];
                assert!(rc.res >= 0.0 && rc.cap >= 0.0, "{}", def.name);
                assert!(state.wires.contains_key(&def.name));
            }
        }
    }

    #[test]
    fn test_tile_area_is_monotone() {
        let model = minimal_model();
        let sizes = model.library().initial_sizes();
        let base = model.recompute(&sizes).unwrap().tile_area();
        for device in ["ptran_sb_mux_L4_L1_nmos", "inv_lut_out_buffer_2_pmos", "inv_ff_output_driver_nmos"] {
            let mut bigger = sizes.clone();
            *bigger.get_mut(device).unwrap() += 2.0;
            let tile = model.recompute(&bigger).unwrap().tile_area();
            assert!(tile >= base, "{device}");
        }
    }

    #[test]
    fn test_tile_totals() {
        let model = minimal_model();
        let state = model.recompute(&model.library().initial_sizes()).unwrap();
        let a = &state.areas;
        assert_relative_eq!(
            a["logic_cluster"],
            a["local_mux_total"] + a["lut_total"] + a["ff_total"] + a["ble_output_total"],
            max_relative = 1e-12
        );
        assert_relative_eq!(
            a["tile"] - a["tile_nonactive"],
            a["sb_total"] + a["cb_total"] + a["logic_cluster"],
            max_relative = 1e-9
        );
        assert!(a["sb_total"] > a["sb_total_no_sram"]);
        assert!(!a.contains_key("ram"));
    }

    #[test]
    fn test_metal_pitch_floor() {
        let mut config = minimal_config();
        config.process.metal_pitch = 1.0e4;
        let model = TileModel::new(config, BTreeMap::new()).unwrap();
        let state = model.recompute(&model.library().initial_sizes()).unwrap();
        // 100 + 16 + 4 * 3 tracks
        let side = 1.0e4 * 128.0;
        assert_relative_eq!(state.tile_area(), side * side);
        assert!(state.areas["tile_nonactive"] > 0.0);
    }

    #[test]
    fn test_ram_and_hard_block_tiles_are_separate() {
        let mut config = minimal_config();
        config.bram = Some(bram_7_3_4());
        config.hardblocks = vec![dsp()];
        let cores = BTreeMap::from([(
            "dsp".to_string(),
            HardBlockCore {
                area: 5.0e9,
                delay: 1.0e-9,
            },
        )]);
        let model = TileModel::new(config, cores).unwrap();
        let state = model.recompute(&model.library().initial_sizes()).unwrap();
        assert!(state.areas["ram"] > 0.0);
        assert!(state.areas["hb_dsp"] > 5.0e9);
        let logic = minimal_model()
            .recompute(&minimal_model().library().initial_sizes())
            .unwrap();
        assert_relative_eq!(state.tile_area(), logic.tile_area());
    }

    #[test]
    fn test_missing_hard_block_core() {
        let mut config = minimal_config();
        config.hardblocks = vec![dsp()];
        let err = TileModel::new(config, BTreeMap::new()).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_subcircuit_area_covers_its_transistors() {
        let mut full = minimal_config();
        full.arch.k = LutSize::K6;
        full.arch.use_fluts = true;
        full.arch.carry_chain = Some(CarryChain {
            kind: CarryChainType::Skip,
            skip_size: 5,
            fas_per_flut: 2,
        });
        full.bram = Some(bram_7_3_4());
        full.hardblocks = vec![dsp()];
        let cores = BTreeMap::from([(
            "dsp".to_string(),
            HardBlockCore {
                area: 5.0e9,
                delay: 1.0e-9,
            },
        )]);

        for model in [minimal_model(), TileModel::new(full, cores).unwrap()] {
            let state = model.recompute(&model.library().initial_sizes()).unwrap();
            for s in model.library().iter() {
                let name = s.name();
                let transistors: f64 = s
                    .transistors()
                    .iter()
                    .map(|t| state.areas[t.name.as_str()])
                    .sum();
                assert!(
                    state.areas[name.as_str()] >= transistors * (1.0 - 1e-12),
                    "{name}: {} < {transistors}",
                    state.areas[name.as_str()]
                );
            }
        }
    }

    #[test]
    fn test_missing_size_is_generation_error() {
        let model = minimal_model();
        let mut sizes = model.library().initial_sizes();
        sizes.remove("inv_cb_mux_1_nmos");
        assert!(matches!(
            model.recompute(&sizes),
            Err(TileError::Generation { .. })
        ));
    }
}
