//! Wire-and-fan-out models placed between measured subcircuits.
//!
//! A load owns one wire. Its netlist splits the wire into segments and
//! hangs the muxes tapping the wire off each segment end. The terminal
//! mux the signal actually goes to is instantiated by the testbench at
//! `n_out`.

use arcstr::ArcStr;

use crate::blocks::{set_wire, store_area, BlockClass, Subcircuit, WireContext, WireDef};
use crate::config::{ArchParams, RoutingWire};
use crate::error::Result;
use crate::maps::{Areas, Sizes, Widths, Wires};
use crate::spice::{wire_segment_params, SpiceWriter, PORTS};
use crate::tech::{AreaModel, Transistor};
use crate::tile::floorplan::Link;

#[derive(Debug, Clone, PartialEq)]
enum LoadSpan {
    /// A number of tile side lengths.
    Tiles(usize),
    Link(Link),
}

/// Cells hanging off each segment end.
#[derive(Debug, Clone, PartialEq)]
pub struct Tap {
    pub cell: String,
    pub count: usize,
}

impl Tap {
    fn new(cell: impl Into<String>, count: usize) -> Self {
        Self {
            cell: cell.into(),
            count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WireLoad {
    name: ArcStr,
    wire: WireDef,
    span: LoadSpan,
    segments: usize,
    taps: Vec<Tap>,
}

impl WireLoad {
    pub fn wire(&self) -> &WireDef {
        &self.wire
    }

    pub fn taps(&self) -> &[Tap] {
        &self.taps
    }

    pub fn segments(&self) -> usize {
        self.segments
    }
}

/// Off and partially-on copies of a mux hanging on one node: one partial
/// load and `total - 1` off loads.
fn mux_taps(mux: &str, total: usize) -> Vec<Tap> {
    let mut taps = Vec::new();
    if total >= 1 {
        taps.push(Tap::new(format!("{mux}_partial"), 1));
    }
    if total >= 2 {
        taps.push(Tap::new(format!("{mux}_off"), total - 1));
    }
    taps
}

/// Local muxes reached by one local routing or feedback wire.
pub fn local_mux_fanout(arch: &ArchParams) -> usize {
    let inputs = arch.n * arch.k.inputs() * arch.local_mux_size();
    let sources = arch.i + arch.n * arch.ofb;
    ((inputs + sources - 1) / sources).max(1)
}

/// Loading on one general routing track of type `wire`.
pub fn routing_wire_load(arch: &ArchParams, wire: &RoutingWire) -> WireLoad {
    let (sb, cb) = wire.taps.unwrap_or_else(|| {
        let sb = arch.fs.saturating_sub(1).max(1);
        let cb = if wire.feeds_cb {
            ((arch.i as f64 * arch.fcin) / 2.0).ceil() as usize
        } else {
            0
        };
        (sb, cb)
    });
    let mut taps = mux_taps(&format!("sb_mux_{}", wire.name), sb);
    if cb > 0 {
        taps.push(Tap::new("cb_mux_off", cb));
    }
    WireLoad {
        name: format!("routing_wire_load_{}", wire.name).into(),
        wire: WireDef::new(format!("wire_gen_routing_{}", wire.name), wire.metal),
        span: LoadSpan::Tiles(wire.length),
        segments: wire.length,
        taps,
    }
}

/// Cluster input wire from the connection block into the local muxes.
pub fn local_routing_wire_load(arch: &ArchParams) -> WireLoad {
    WireLoad {
        name: arcstr::literal!("local_routing_wire_load"),
        wire: WireDef::new("wire_local_routing", 0),
        span: LoadSpan::Link(Link::CbIc),
        segments: 1,
        taps: mux_taps("local_mux", local_mux_fanout(arch).saturating_sub(1)),
    }
}

/// LUT output into the flip-flop and both BLE output muxes.
pub fn lut_output_load(arch: &ArchParams) -> WireLoad {
    WireLoad {
        name: arcstr::literal!("lut_output_load"),
        wire: WireDef::new("wire_lut_output_load", 0),
        span: LoadSpan::Link(Link::LutFfble),
        segments: 1,
        taps: vec![
            Tap::new("ff", 1),
            Tap::new("local_ble_output_partial", arch.ofb),
            Tap::new("general_ble_output_partial", arch.or),
        ],
    }
}

/// Local feedback from a BLE output back into the local muxes.
pub fn local_ble_output_load(arch: &ArchParams) -> WireLoad {
    WireLoad {
        name: arcstr::literal!("local_ble_output_load"),
        wire: WireDef::new("wire_local_ble_output_feedback", 0),
        span: LoadSpan::Link(Link::FfbleIc),
        segments: 1,
        taps: mux_taps("local_mux", local_mux_fanout(arch).saturating_sub(1)),
    }
}

/// General BLE output into the switch-block muxes it may drive.
pub fn general_ble_output_load(arch: &ArchParams) -> WireLoad {
    let fanout = ((arch.fcout * arch.w as f64).round() as usize).max(1);
    let first = arch.wires.first().map(|w| w.name.as_str()).unwrap_or("L4");
    WireLoad {
        name: arcstr::literal!("general_ble_output_load"),
        wire: WireDef::new("wire_general_ble_output", 0),
        span: LoadSpan::Link(Link::FfbleSb),
        segments: 1,
        taps: mux_taps(&format!("sb_mux_{first}"), fanout.saturating_sub(1)),
    }
}

/// Carry-chain sum output into the carry-chain output mux.
pub fn carry_chain_output_load() -> WireLoad {
    WireLoad {
        name: arcstr::literal!("carry_chain_output_load"),
        wire: WireDef::new("wire_cc_to_ffble", 0),
        span: LoadSpan::Link(Link::CcFfble),
        segments: 1,
        taps: Vec::new(),
    }
}

impl Subcircuit for WireLoad {
    fn name(&self) -> ArcStr {
        self.name.clone()
    }

    fn class(&self) -> BlockClass {
        BlockClass::Load
    }

    fn per_tile(&self) -> usize {
        0
    }

    fn transistors(&self) -> Vec<Transistor> {
        Vec::new()
    }

    fn wires(&self) -> Vec<WireDef> {
        vec![self.wire.clone()]
    }

    fn initial_sizes(&self) -> Sizes {
        Sizes::new()
    }

    fn swept(&self) -> bool {
        false
    }

    fn emit_netlist(&self, out: &mut SpiceWriter) -> Result<()> {
        out.subcircuit(&self.name, &PORTS)?;
        let params = wire_segment_params(&self.wire.name, self.segments);
        let mut node = "n_in".to_string();
        for seg in 0..self.segments {
            let next = if seg + 1 == self.segments {
                "n_out".to_string()
            } else {
                format!("n_seg_{}", seg + 1)
            };
            out.instance(&format!("{}_{seg}", self.wire.name), &[&node, &next], "wire", &params)?;
            for tap in &self.taps {
                for i in 0..tap.count {
                    let dangling = out.temp_net();
                    out.instance(
                        &format!("{}_{seg}_{i}", tap.cell),
                        &[&next, &dangling, "n_gate", "n_gate_n", "n_vdd", "n_gnd"],
                        &tap.cell,
                        &[],
                    )?;
                }
            }
            node = next;
        }
        out.end_subcircuit()
    }

    fn compute_area(&self, _model: &AreaModel, areas: &mut Areas, widths: &mut Widths) -> Result<()> {
        store_area(&self.name, 0.0, None, areas, widths);
        Ok(())
    }

    fn update_wires(&self, ctx: &WireContext<'_>, wires: &mut Wires) -> Result<()> {
        let length = match &self.span {
            LoadSpan::Tiles(tiles) => {
                let side = ctx.areas.require("tile", &self.name)?.sqrt();
                *tiles as f64 * side
            }
            LoadSpan::Link(link) => ctx.floorplan.distance(*link),
        };
        set_wire(wires, &self.wire, length);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::config::arch::tests::minimal_arch;
    use crate::tile::floorplan::Floorplan;

    #[test]
    fn test_routing_load_segments() {
        let arch = minimal_arch();
        let load = routing_wire_load(&arch, &arch.wires[0]);
        assert_eq!(load.segments(), 4);
        assert_eq!(
            load.taps(),
            &[
                Tap::new("sb_mux_L4_partial", 1),
                Tap::new("sb_mux_L4_off", 1),
                Tap::new("cb_mux_off", 2),
            ]
        );
        let mut out = SpiceWriter::new();
        load.emit_netlist(&mut out).unwrap();
        let text = out.finish();
        assert!(text.contains("Xwire_gen_routing_L4_0 n_in n_seg_1 wire Rw='wire_gen_routing_L4_res/4'"));
        assert!(text.contains("Xwire_gen_routing_L4_3 n_seg_3 n_out wire"));
        assert!(text.contains("Xcb_mux_off_3_1 n_out"));
    }

    #[test]
    fn test_rrg_taps_override() {
        let mut arch = minimal_arch();
        arch.wires[0].taps = Some((4, 0));
        let load = routing_wire_load(&arch, &arch.wires[0]);
        assert_eq!(
            load.taps(),
            &[Tap::new("sb_mux_L4_partial", 1), Tap::new("sb_mux_L4_off", 3)]
        );
    }

    #[test]
    fn test_routing_wire_spans_tiles() {
        let arch = minimal_arch();
        let load = routing_wire_load(&arch, &arch.wires[0]);
        let mut areas = Areas::new();
        areas.insert("tile".into(), 1.0e6);
        let widths = Widths::new();
        let floorplan = Floorplan::flat();
        let ctx = WireContext {
            arch: &arch,
            areas: &areas,
            widths: &widths,
            floorplan: &floorplan,
        };
        let mut wires = Wires::new();
        load.update_wires(&ctx, &mut wires).unwrap();
        assert_relative_eq!(wires["wire_gen_routing_L4"].length, 4000.0);
        assert_eq!(wires["wire_gen_routing_L4"].layer, 1);
    }

    #[test]
    fn test_local_fanout() {
        let arch = minimal_arch();
        // 4 * 4 * 10 inputs over 16 + 4 sources
        assert_eq!(local_mux_fanout(&arch), 8);
        let load = local_routing_wire_load(&arch);
        assert_eq!(
            load.taps(),
            &[Tap::new("local_mux_partial", 1), Tap::new("local_mux_off", 6)]
        );
    }
}
