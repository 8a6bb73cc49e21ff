//! General and local routing muxes.

use crate::blocks::mux::{Mux, MuxSizing};
use crate::blocks::BlockClass;
use crate::config::{ArchParams, RoutingWire};

/// The switch-block mux that drives one track of `wire`.
pub fn sb_mux(arch: &ArchParams, wire: &RoutingWire) -> Mux {
    Mux::new(
        format!("sb_mux_{}", wire.name),
        BlockClass::SwitchBlock,
        arch.sb_muxes_per_tile(wire),
        arch.sb_mux_size(wire),
        arch.family,
        MuxSizing {
            l1: 3.0,
            l2: 4.0,
            inv1: (3.0, 5.0),
            inv2: Some((8.0, 16.0)),
        },
    )
}

/// Connection-block mux: routing wires into a cluster input.
pub fn cb_mux(arch: &ArchParams) -> Mux {
    Mux::new(
        "cb_mux",
        BlockClass::ConnectionBlock,
        arch.i,
        arch.cb_mux_size(),
        arch.family,
        MuxSizing {
            l1: 2.0,
            l2: 2.0,
            inv1: (2.0, 2.0),
            inv2: Some((6.0, 12.0)),
        },
    )
}

/// Local interconnect mux in front of every LUT input. Inverting: the LUT
/// input driver restores polarity.
pub fn local_mux(arch: &ArchParams) -> Mux {
    Mux::new(
        "local_mux",
        BlockClass::LocalMux,
        arch.n * arch.k.inputs(),
        arch.local_mux_size(),
        arch.family,
        MuxSizing {
            l1: 2.0,
            l2: 2.0,
            inv1: (2.0, 2.0),
            inv2: None,
        },
    )
}
