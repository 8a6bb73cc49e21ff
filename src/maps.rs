//! String-keyed state shared by the sizing loop.
//!
//! Keys are transistor device names (`sizes`), subcircuit, transistor or
//! aggregate names (`areas`, `widths`), wire names (`wires`, `rc`) and delay
//! entry names (`delays`, `powers`). All maps are ordered so that parameter
//! files, logs and checkpoints are reproducible.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TileError};
use crate::tech::Transistor;

/// Delay assigned to measurements that could not be extracted, in seconds.
pub const SENTINEL_DELAY: f64 = 1.0;

#[inline]
pub fn is_valid_delay(delay: f64) -> bool {
    delay.is_finite() && delay > 0.0 && delay < SENTINEL_DELAY
}

macro_rules! name_map {
    ($(#[$meta:meta])* $name:ident, $value:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(BTreeMap<String, $value>);

        impl $name {
            pub fn new() -> Self {
                Self(BTreeMap::new())
            }

            /// Looks up `key`, reporting a generation error against `owner`
            /// when it is missing.
            pub fn require(&self, key: &str, owner: &str) -> Result<$value> {
                self.0
                    .get(key)
                    .copied()
                    .ok_or_else(|| TileError::generation(owner, key))
            }
        }

        impl Deref for $name {
            type Target = BTreeMap<String, $value>;
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }

        impl FromIterator<(String, $value)> for $name {
            fn from_iter<I: IntoIterator<Item = (String, $value)>>(iter: I) -> Self {
                Self(iter.into_iter().collect())
            }
        }

        impl IntoIterator for $name {
            type Item = (String, $value);
            type IntoIter = std::collections::btree_map::IntoIter<String, $value>;
            fn into_iter(self) -> Self::IntoIter {
                self.0.into_iter()
            }
        }
    };
}

name_map!(
    /// Device sizes in multiples of the minimum width.
    Sizes,
    f64
);
name_map!(
    /// Areas in nm^2.
    Areas,
    f64
);
name_map!(
    /// Square-root widths in nm.
    Widths,
    f64
);
name_map!(Wires, WireSpec);
name_map!(RcMap, Rc);
name_map!(
    /// Delays in seconds. Entries that failed to simulate hold
    /// [`SENTINEL_DELAY`].
    Delays,
    f64
);
name_map!(
    /// Average power in watts.
    Powers,
    f64
);

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireSpec {
    /// Length in nm.
    pub length: f64,
    /// Index into the metal stack.
    pub layer: usize,
}

/// Lumped wire parasitics. Capacitance is half the wire's total, placed at
/// each end of a pi model.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rc {
    /// Ohms.
    pub res: f64,
    /// Femtofarads.
    pub cap: f64,
}

impl Sizes {
    pub fn set_transistor(&mut self, transistor: &Transistor, nmos: f64, pmos: f64) {
        if transistor.kind.has_nmos() {
            self.insert(transistor.nmos(), nmos);
        }
        if transistor.kind.has_pmos() {
            self.insert(transistor.pmos(), pmos);
        }
    }

    /// Checks that every device of `transistor` has a positive size.
    pub fn check_transistor(&self, transistor: &Transistor, owner: &str) -> Result<()> {
        for device in transistor.devices() {
            let size = self.require(&device, owner)?;
            if !(size > 0.0) || !size.is_finite() {
                return Err(TileError::generation(owner, device));
            }
        }
        Ok(())
    }
}

impl Areas {
    /// Area including configuration memory when the entry has any.
    pub fn with_sram(&self, name: &str) -> Result<f64> {
        match self.get(&format!("{name}_sram")) {
            Some(area) => Ok(*area),
            None => self.require(name, name),
        }
    }
}

impl Delays {
    pub fn is_valid(&self, key: &str) -> bool {
        self.get(key).map(|d| is_valid_delay(*d)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tech::TransistorKind;

    #[test]
    fn test_require_reports_owner() {
        let sizes = Sizes::new();
        let err = sizes.require("inv_lut_1_nmos", "lut").unwrap_err();
        assert!(matches!(
            err,
            TileError::Generation { ref subcircuit, ref key }
                if subcircuit == "lut" && key == "inv_lut_1_nmos"
        ));
    }

    #[test]
    fn test_set_transistor() {
        let mut sizes = Sizes::new();
        let inv = Transistor::new(TransistorKind::Inv, "ff", "1");
        let ptran = Transistor::new(TransistorKind::Ptran, "ff", "clk");
        sizes.set_transistor(&inv, 1.0, 2.0);
        sizes.set_transistor(&ptran, 3.0, 9.0);
        assert_eq!(sizes.len(), 3);
        assert_eq!(sizes["inv_ff_1_pmos"], 2.0);
        assert!(!sizes.contains_key("ptran_ff_clk_pmos"));
        sizes.check_transistor(&inv, "ff").unwrap();

        sizes.insert("inv_ff_1_nmos".into(), 0.0);
        assert!(sizes.check_transistor(&inv, "ff").is_err());
    }

    #[test]
    fn test_sentinel_is_invalid() {
        let mut delays = Delays::new();
        delays.insert("cb_mux".into(), 42e-12);
        delays.insert("local_mux".into(), SENTINEL_DELAY);
        assert!(delays.is_valid("cb_mux"));
        assert!(!delays.is_valid("local_mux"));
        assert!(!delays.is_valid("missing"));
    }

    #[test]
    fn test_area_with_sram_falls_back() {
        let mut areas = Areas::new();
        areas.insert("ff".into(), 10.0);
        areas.insert("cb_mux".into(), 20.0);
        areas.insert("cb_mux_sram".into(), 25.0);
        assert_eq!(areas.with_sram("ff").unwrap(), 10.0);
        assert_eq!(areas.with_sram("cb_mux").unwrap(), 25.0);
        assert!(areas.with_sram("lut").is_err());
    }
}
