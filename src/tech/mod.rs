use serde::{Deserialize, Serialize};

use crate::config::{CircuitFamily, ProcessParams};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TransistorKind {
    Inv,
    Tgate,
    Ptran,
    /// Level restorer. Always a minimum-size PMOS.
    Rest,
    /// A lone NMOS, e.g. a wordline access device.
    Tran,
    Nand,
}

impl TransistorKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Inv => "inv",
            Self::Tgate => "tgate",
            Self::Ptran => "ptran",
            Self::Rest => "rest",
            Self::Tran => "tran",
            Self::Nand => "nand",
        }
    }

    #[inline]
    pub fn has_nmos(&self) -> bool {
        !matches!(self, Self::Rest)
    }

    #[inline]
    pub fn has_pmos(&self) -> bool {
        matches!(self, Self::Inv | Self::Tgate | Self::Nand | Self::Rest)
    }

    pub fn area_family(&self) -> AreaFamily {
        match self {
            Self::Inv | Self::Tgate | Self::Nand => AreaFamily::Inverter,
            Self::Ptran | Self::Rest | Self::Tran => AreaFamily::Pass,
        }
    }

    /// Allowed size range in multiples of the minimum width.
    pub fn size_range(&self) -> (f64, f64) {
        match self {
            Self::Inv | Self::Nand => (1.0, 24.0),
            Self::Tgate | Self::Ptran | Self::Tran => (1.0, 12.0),
            Self::Rest => (1.0, 1.0),
        }
    }

    #[inline]
    pub fn is_swept(&self) -> bool {
        !matches!(self, Self::Rest)
    }
}

/// A sized transistor (or transistor pair) named `<kind>_<subcircuit>_<tag>`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Transistor {
    pub kind: TransistorKind,
    pub name: String,
}

impl Transistor {
    pub fn new(kind: TransistorKind, subcircuit: &str, tag: &str) -> Self {
        let name = if tag.is_empty() {
            format!("{}_{}", kind.prefix(), subcircuit)
        } else {
            format!("{}_{}_{}", kind.prefix(), subcircuit, tag)
        };
        Self { kind, name }
    }

    pub fn nmos(&self) -> String {
        format!("{}_nmos", self.name)
    }

    pub fn pmos(&self) -> String {
        format!("{}_pmos", self.name)
    }

    /// Device names this transistor owns in the size map.
    pub fn devices(&self) -> Vec<String> {
        let mut devices = Vec::with_capacity(2);
        if self.kind.has_nmos() {
            devices.push(self.nmos());
        }
        if self.kind.has_pmos() {
            devices.push(self.pmos());
        }
        devices
    }

    /// The device the optimiser sweeps. The other device, if any, follows it.
    pub fn primary(&self) -> String {
        if self.kind.has_nmos() {
            self.nmos()
        } else {
            self.pmos()
        }
    }

    pub fn follower(&self) -> Option<String> {
        (self.kind.has_nmos() && self.kind.has_pmos()).then(|| self.pmos())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AreaFamily {
    /// Complementary structures that pay for N-well spacing.
    Inverter,
    /// Single-polarity devices.
    Pass,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaCoefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl AreaCoefficients {
    const fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    #[inline]
    pub fn eval(&self, w: f64) -> f64 {
        self.a + self.b * w + self.c * w.sqrt()
    }
}

const BULK_INV: AreaCoefficients = AreaCoefficients::new(0.518, 0.127, 0.428);
const BULK_PASS: AreaCoefficients = AreaCoefficients::new(0.447, 0.128, 0.391);
const FINFET_INV: AreaCoefficients = AreaCoefficients::new(0.6, 0.45, 0.2);
const FINFET_PASS: AreaCoefficients = AreaCoefficients::new(0.5, 0.42, 0.15);
const FINFET_7NM_INV: AreaCoefficients = AreaCoefficients::new(0.72, 0.38, 0.3);
const FINFET_7NM_PASS: AreaCoefficients = AreaCoefficients::new(0.58, 0.36, 0.22);

/// Layout-area estimates for sized devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaModel {
    pub inverter: AreaCoefficients,
    pub pass: AreaCoefficients,
    pub min_width_tran_area: f64,
    pub min_tran_width: f64,
    pub sram_cell_area: f64,
    pub finfet: bool,
}

impl AreaModel {
    pub fn new(family: &CircuitFamily, process: &ProcessParams) -> Self {
        let (inverter, pass) = match (family.use_finfet(), family.tech_node) {
            (true, Some(node)) if node <= 7 => (FINFET_7NM_INV, FINFET_7NM_PASS),
            (true, _) => (FINFET_INV, FINFET_PASS),
            (false, _) => (BULK_INV, BULK_PASS),
        };
        Self {
            inverter,
            pass,
            min_width_tran_area: process.min_width_tran_area,
            min_tran_width: process.min_tran_width,
            sram_cell_area: process.sram_cell_area,
            finfet: family.use_finfet(),
        }
    }

    /// Area of one device of size `w`, in minimum-width transistor units.
    pub fn device_area_units(&self, family: AreaFamily, w: f64) -> f64 {
        match family {
            AreaFamily::Inverter => self.inverter.eval(w),
            AreaFamily::Pass => self.pass.eval(w),
        }
    }

    /// Area of one device of size `w`, in nm^2.
    #[inline]
    pub fn device_area(&self, family: AreaFamily, w: f64) -> f64 {
        self.device_area_units(family, w) * self.min_width_tran_area
    }

    /// Value written to the parameter file for a device of size `w`:
    /// a width in nm for bulk devices, a fin count for FinFETs.
    pub fn device_param(&self, w: f64) -> f64 {
        if self.finfet {
            w.round().max(1.0)
        } else {
            w * self.min_tran_width
        }
    }

    /// Area of one configuration SRAM cell, in nm^2.
    #[inline]
    pub fn sram_cell(&self) -> f64 {
        self.sram_cell_area * self.min_width_tran_area
    }
}
