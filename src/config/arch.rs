use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::error::{Result, TileError};

/// Number of LUT inputs.
#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Debug, Clone, Copy, Hash)]
#[repr(u8)]
pub enum LutSize {
    K4 = 4,
    K5 = 5,
    K6 = 6,
}

impl LutSize {
    #[inline]
    pub fn inputs(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchType {
    PassTransistor,
    TransmissionGate,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransistorType {
    Bulk,
    Finfet,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarryChainType {
    Ripple,
    Skip,
}

/// Circuit style choices that every subcircuit receives at construction.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitFamily {
    pub switch: SwitchType,
    pub transistor: TransistorType,
    pub low_power: bool,
    /// Process node in nm, when known.
    pub tech_node: Option<u32>,
}

impl CircuitFamily {
    #[inline]
    pub fn use_tgate(&self) -> bool {
        self.switch == SwitchType::TransmissionGate
    }

    #[inline]
    pub fn use_finfet(&self) -> bool {
        self.transistor == TransistorType::Finfet
    }
}

impl Default for CircuitFamily {
    fn default() -> Self {
        Self {
            switch: SwitchType::PassTransistor,
            transistor: TransistorType::Bulk,
            low_power: false,
            tech_node: None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarryChain {
    pub kind: CarryChainType,
    pub skip_size: usize,
    pub fas_per_flut: usize,
}

impl CarryChain {
    /// Radix of the two NAND levels that form one skip AND tree.
    pub fn skip_nand_radix(&self) -> Option<(usize, usize)> {
        skip_nand_radix(self.skip_size)
    }
}

/// NAND radix of the two levels of the carry-skip AND tree, per skip size.
pub fn skip_nand_radix(skip_size: usize) -> Option<(usize, usize)> {
    match skip_size {
        4 => Some((2, 2)),
        5 => Some((3, 2)),
        6 => Some((2, 3)),
        7..=9 => Some((3, 3)),
        _ => None,
    }
}

/// Where one switch-block mux input comes from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MuxSource {
    Wire(usize),
    BleOutput,
}

/// One general routing wire type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingWire {
    pub id: usize,
    pub name: String,
    /// Length in tiles.
    pub length: usize,
    /// Relative share of the channel.
    pub freq: f64,
    /// Index into the metal stack.
    pub metal: usize,
    /// Whether connection-block muxes tap this wire.
    pub feeds_cb: bool,
    /// Fan-in of the driving switch-block mux, when routing-graph data
    /// provides it.
    pub mux_size: Option<usize>,
    /// Switch-block and connection-block taps along the wire, when
    /// routing-graph data provides them.
    pub taps: Option<(usize, usize)>,
    /// Input mix of the driving switch-block mux as `(source, count)`.
    /// Empty unless routing-graph data provides it.
    pub sources: Vec<(MuxSource, f64)>,
}

/// Which semantic variant of LUT input driver an input needs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum LutDriverKind {
    Default,
    DefaultRsel,
    RegFb,
    RegFbRsel,
}

impl LutDriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::DefaultRsel => "default_rsel",
            Self::RegFb => "reg_fb",
            Self::RegFbRsel => "reg_fb_rsel",
        }
    }

    #[inline]
    pub fn has_rsel(&self) -> bool {
        matches!(self, Self::DefaultRsel | Self::RegFbRsel)
    }

    #[inline]
    pub fn has_reg_fb(&self) -> bool {
        matches!(self, Self::RegFb | Self::RegFbRsel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchParams {
    pub n: usize,
    pub k: LutSize,
    pub w: usize,
    pub l: usize,
    pub i: usize,
    pub fs: usize,
    pub fcin: f64,
    pub fcout: f64,
    pub fclocal: f64,
    pub ofb: usize,
    pub or: usize,
    pub rsel: Option<char>,
    pub rfb: Vec<char>,
    pub use_fluts: bool,
    pub carry_chain: Option<CarryChain>,
    pub family: CircuitFamily,
    pub wires: Vec<RoutingWire>,
}

impl ArchParams {
    /// LUT input names in alphabetical order.
    pub fn lut_inputs(&self) -> Vec<char> {
        ('a'..='z').take(self.k.inputs()).collect()
    }

    /// The input that doubles as the fracturable output select.
    ///
    /// This is always the K-th input: `e` for K=5 and `f` for K=6.
    pub fn fracturable_input(&self) -> Option<char> {
        if self.use_fluts {
            self.lut_inputs().last().copied()
        } else {
            None
        }
    }

    pub fn driver_kind(&self, input: char) -> LutDriverKind {
        let rsel = self.rsel == Some(input);
        let rfb = self.rfb.contains(&input);
        match (rfb, rsel) {
            (false, false) => LutDriverKind::Default,
            (false, true) => LutDriverKind::DefaultRsel,
            (true, false) => LutDriverKind::RegFb,
            (true, true) => LutDriverKind::RegFbRsel,
        }
    }

    /// Number of routing tracks of a wire type in one channel.
    pub fn tracks(&self, wire: &RoutingWire) -> usize {
        let total: f64 = self.wires.iter().map(|w| w.freq).sum();
        ((self.w as f64 * wire.freq / total).round() as usize).max(1)
    }

    /// Number of switch-block muxes driving `wire` per tile.
    pub fn sb_muxes_per_tile(&self, wire: &RoutingWire) -> usize {
        ((2 * self.tracks(wire)) / wire.length).max(1)
    }

    /// Switch-block mux fan-in: `Fs` routing inputs plus this mux's share
    /// of the general BLE output connections.
    pub fn sb_mux_size(&self, wire: &RoutingWire) -> usize {
        wire.mux_size
            .unwrap_or_else(|| self.fs + self.sb_mux_ble_inputs())
    }

    /// Routing sources of the switch-block mux driving `wire`, with their
    /// relative weights. Without routing-graph data every wire type feeds
    /// every switch-block mux in proportion to its channel share.
    pub fn sb_wire_sources(&self, wire: &RoutingWire) -> Vec<(usize, f64)> {
        let explicit: Vec<(usize, f64)> = wire
            .sources
            .iter()
            .filter_map(|(source, count)| match source {
                MuxSource::Wire(id) => Some((*id, *count)),
                MuxSource::BleOutput => None,
            })
            .collect();
        let pairs = if explicit.is_empty() {
            self.wires.iter().map(|w| (w.id, w.freq)).collect()
        } else {
            explicit
        };
        let total: f64 = pairs.iter().map(|(_, f)| f).sum();
        pairs.into_iter().map(|(id, f)| (id, f / total)).collect()
    }

    pub fn wire(&self, id: usize) -> Option<&RoutingWire> {
        self.wires.iter().find(|w| w.id == id)
    }

    pub fn sb_mux_ble_inputs(&self) -> usize {
        let total_sb: usize = self.wires.iter().map(|w| self.sb_muxes_per_tile(w)).sum();
        let outputs = (self.n * self.or) as f64 * self.fcout * self.w as f64;
        (outputs / total_sb as f64).ceil() as usize
    }

    pub fn cb_mux_size(&self) -> usize {
        ((self.fcin * self.w as f64).ceil() as usize).max(2)
    }

    pub fn local_mux_size(&self) -> usize {
        ((self.fclocal * (self.i + self.n * self.ofb) as f64).ceil() as usize).max(2)
    }

    pub fn carry_chain_enabled(&self) -> bool {
        self.carry_chain.is_some()
    }

    /// Number of full adders in one cluster.
    pub fn full_adders(&self) -> usize {
        self.carry_chain
            .map(|cc| self.n * cc.fas_per_flut)
            .unwrap_or(0)
    }

    /// Number of skip groups (skip AND trees) in one cluster.
    pub fn skip_groups(&self) -> usize {
        match self.carry_chain {
            Some(cc) if cc.kind == CarryChainType::Skip => {
                (self.full_adders() + cc.skip_size - 1) / cc.skip_size
            }
            _ => 0,
        }
    }

    pub fn validate(&self, metal_layers: usize) -> Result<()> {
        let positive = [
            ("N", self.n),
            ("W", self.w),
            ("L", self.l),
            ("I", self.i),
            ("Fs", self.fs),
            ("Or", self.or),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(TileError::config(name, "must be at least 1"));
            }
        }
        for (name, value) in [
            ("Fcin", self.fcin),
            ("Fcout", self.fcout),
            ("Fclocal", self.fclocal),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(TileError::config(name, "must be in (0, 1]"));
            }
        }

        let inputs = self.lut_inputs();
        if let Some(rsel) = self.rsel {
            if !inputs.contains(&rsel) {
                return Err(TileError::config(
                    "Rsel",
                    format!("`{rsel}` is not a LUT input"),
                ));
            }
        }
        for (idx, c) in self.rfb.iter().enumerate() {
            if !inputs.contains(c) {
                return Err(TileError::config("Rfb", format!("`{c}` is not a LUT input")));
            }
            if self.rfb[..idx].contains(c) {
                return Err(TileError::config("Rfb", format!("`{c}` listed twice")));
            }
        }

        if let Some(cc) = self.carry_chain {
            if cc.fas_per_flut == 0 {
                return Err(TileError::config("FAs_per_flut", "must be at least 1"));
            }
            if self.use_fluts && cc.fas_per_flut > 2 {
                return Err(TileError::config(
                    "FAs_per_flut",
                    "fracturable LUTs support at most 2 full adders per LUT",
                ));
            }
            if cc.kind == CarryChainType::Skip && cc.skip_nand_radix().is_none() {
                return Err(TileError::config("skip_size", "must be between 4 and 9"));
            }
        }

        if self.wires.is_empty() {
            return Err(TileError::config("wire_types", "at least one wire type"));
        }
        for (idx, wire) in self.wires.iter().enumerate() {
            if self.wires[..idx].iter().any(|w| w.name == wire.name) {
                return Err(TileError::config(
                    "wire_types",
                    format!("wire name `{}` is used twice", wire.name),
                ));
            }
            if wire.length == 0 {
                return Err(TileError::config(
                    "wire_types",
                    format!("wire `{}` has zero length", wire.name),
                ));
            }
            if wire.freq <= 0.0 {
                return Err(TileError::config(
                    "wire_types",
                    format!("wire `{}` has non-positive frequency", wire.name),
                ));
            }
            if wire.metal >= metal_layers {
                return Err(TileError::config(
                    "wire_types",
                    format!(
                        "wire `{}` uses metal layer {} but the stack has {} layers",
                        wire.name, wire.metal, metal_layers
                    ),
                ));
            }
        }
        if !self.wires.iter().any(|w| w.feeds_cb) {
            return Err(TileError::config(
                "wire_types",
                "at least one wire type must feed connection blocks",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn minimal_arch() -> ArchParams {
        ArchParams {
            n: 4,
            k: LutSize::K4,
            w: 100,
            l: 4,
            i: 16,
            fs: 3,
            fcin: 0.2,
            fcout: 0.1,
            fclocal: 0.5,
            ofb: 1,
            or: 2,
            rsel: None,
            rfb: vec![],
            use_fluts: false,
            carry_chain: None,
            family: CircuitFamily::default(),
            wires: vec![RoutingWire {
                id: 0,
                name: "L4".into(),
                length: 4,
                freq: 1.0,
                metal: 1,
                feeds_cb: true,
                mux_size: None,
                taps: None,
                sources: vec![],
            }],
        }
    }

    #[test]
    fn test_k4_has_four_inputs() {
        let arch = minimal_arch();
        assert_eq!(arch.lut_inputs(), vec!['a', 'b', 'c', 'd']);
        assert_eq!(arch.fracturable_input(), None);
    }

    #[test]
    fn test_fracturable_input_is_last() {
        let mut arch = minimal_arch();
        arch.use_fluts = true;
        arch.k = LutSize::K5;
        assert_eq!(arch.fracturable_input(), Some('e'));
        arch.k = LutSize::K6;
        assert_eq!(arch.fracturable_input(), Some('f'));
    }

    #[test]
    fn test_driver_kinds() {
        let mut arch = minimal_arch();
        arch.rsel = Some('c');
        arch.rfb = vec!['c', 'd'];
        assert_eq!(arch.driver_kind('a'), LutDriverKind::Default);
        assert_eq!(arch.driver_kind('c'), LutDriverKind::RegFbRsel);
        assert_eq!(arch.driver_kind('d'), LutDriverKind::RegFb);
        arch.rfb = vec![];
        assert_eq!(arch.driver_kind('c'), LutDriverKind::DefaultRsel);
    }

    #[test]
    fn test_skip_radix_table() {
        assert_eq!(skip_nand_radix(4), Some((2, 2)));
        assert_eq!(skip_nand_radix(5), Some((3, 2)));
        assert_eq!(skip_nand_radix(6), Some((2, 3)));
        for s in 7..=9 {
            assert_eq!(skip_nand_radix(s), Some((3, 3)));
        }
        assert_eq!(skip_nand_radix(3), None);
        assert_eq!(skip_nand_radix(10), None);
    }

    #[test]
    fn test_skip_groups() {
        let mut arch = minimal_arch();
        arch.n = 10;
        arch.carry_chain = Some(CarryChain {
            kind: CarryChainType::Skip,
            skip_size: 5,
            fas_per_flut: 2,
        });
        assert_eq!(arch.full_adders(), 20);
        assert_eq!(arch.skip_groups(), 4);
    }

    #[test]
    fn test_fluts_reject_three_adders() {
        let mut arch = minimal_arch();
        arch.use_fluts = true;
        arch.carry_chain = Some(CarryChain {
            kind: CarryChainType::Ripple,
            skip_size: 5,
            fas_per_flut: 3,
        });
        let err = arch.validate(4).unwrap_err();
        assert!(matches!(err, TileError::Config { ref option, .. } if option == "FAs_per_flut"));
    }

    #[test]
    fn test_mux_sizes() {
        let arch = minimal_arch();
        assert_eq!(arch.cb_mux_size(), 20);
        assert_eq!(arch.local_mux_size(), 10);
        assert_eq!(arch.sb_muxes_per_tile(&arch.wires[0]), 50);
        // 3 + ceil(4 * 2 * 0.1 * 100 / 50)
        assert_eq!(arch.sb_mux_size(&arch.wires[0]), 5);
    }

    #[test]
    fn test_sb_sources_follow_frequency() {
        let mut arch = minimal_arch();
        let mut long = arch.wires[0].clone();
        long.id = 1;
        long.name = "L16".into();
        long.length = 16;
        long.freq = 3.0;
        arch.wires.push(long);
        let sources = arch.sb_wire_sources(&arch.wires[0]);
        assert_eq!(sources, vec![(0, 0.25), (1, 0.75)]);

        arch.wires[0].sources = vec![(MuxSource::Wire(1), 6.0), (MuxSource::BleOutput, 2.0)];
        assert_eq!(arch.sb_wire_sources(&arch.wires[0]), vec![(1, 1.0)]);
    }

    #[test]
    fn test_duplicate_wire_names() {
        let mut arch = minimal_arch();
        let mut other = arch.wires[0].clone();
        other.id = 1;
        arch.wires.push(other);
        let err = arch.validate(4).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("used twice"));
    }
}
