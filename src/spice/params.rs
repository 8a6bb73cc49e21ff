//! Per-candidate parameter files read by every deck.

use std::path::Path;

use crate::error::Result;
use crate::maps::{RcMap, Sizes};
use crate::spice::primitives::{SWEEP_DATA, WIRE_RC};
use crate::spice::SpiceWriter;
use crate::tech::AreaModel;

/// Renders `sweep_data.l`: one parameter per device width.
pub fn sweep_data(sizes: &Sizes, model: &AreaModel) -> Result<String> {
    let mut w = SpiceWriter::new();
    w.comment("Device widths")?;
    for (device, size) in sizes.iter() {
        let value = model.device_param(*size);
        if model.finfet {
            w.param(device, value)?;
        } else {
            w.param(device, format!("{value}n"))?;
        }
    }
    Ok(w.finish())
}

/// Renders `wire_RC.l`: a resistance and a capacitance parameter per wire.
pub fn wire_rc(rc: &RcMap) -> Result<String> {
    let mut w = SpiceWriter::new();
    w.comment("Wire parasitics")?;
    for (wire, value) in rc.iter() {
        w.param(&format!("{wire}_res"), value.res)?;
        w.param(&format!("{wire}_cap"), format!("{}f", value.cap))?;
    }
    Ok(w.finish())
}

/// Rewrites both parameter files in `run_dir`.
pub fn write_parameter_files(
    run_dir: impl AsRef<Path>,
    sizes: &Sizes,
    rc: &RcMap,
    model: &AreaModel,
) -> Result<()> {
    let run_dir = run_dir.as_ref();
    std::fs::write(run_dir.join(SWEEP_DATA), sweep_data(sizes, model)?)?;
    std::fs::write(run_dir.join(WIRE_RC), wire_rc(rc)?)?;
    Ok(())
}
