//! Routing-wire model read from a routing resource graph summary.
//!
//! The bundle is four CSV files, each with a header line:
//!
//! | file | columns |
//! |---|---|
//! | `rr_segments.csv` | `id,name,length,freq,metal` |
//! | `rr_switches.csv` | `id,name,r,cin,cout,tdel` |
//! | `rr_wire_stats.csv` | `segment_id,sb_fanout,cb_fanout` |
//! | `rr_mux_freqs.csv` | `sink_segment_id,source,freq` |
//!
//! In `rr_mux_freqs.csv`, `source` is a segment id or `ble_output` and
//! `freq` is the average number of mux inputs taken from that source.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use log::info;

use crate::config::{MuxSource, RoutingWire, TileConfig};
use crate::error::{Result, TileError};

pub const RR_SEGMENTS: &str = "rr_segments.csv";
pub const RR_SWITCHES: &str = "rr_switches.csv";
pub const RR_WIRE_STATS: &str = "rr_wire_stats.csv";
pub const RR_MUX_FREQS: &str = "rr_mux_freqs.csv";

#[derive(Debug, Clone, PartialEq)]
pub struct RrSwitch {
    pub id: usize,
    pub name: String,
    /// Ohms.
    pub r: f64,
    /// Farads.
    pub cin: f64,
    pub cout: f64,
    /// Seconds.
    pub tdel: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RrgData {
    pub wires: Vec<RoutingWire>,
    pub switches: Vec<RrSwitch>,
}

struct Table<'a> {
    file: &'static str,
    rows: Vec<(usize, Vec<&'a str>)>,
}

impl<'a> Table<'a> {
    fn parse(file: &'static str, text: &'a str, columns: usize) -> Result<Self> {
        let mut rows = Vec::new();
        for (n, line) in text.lines().enumerate().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != columns {
                return Err(TileError::FileFormat(format!(
                    "{file} line {}: expected {columns} columns, found {}",
                    n + 1,
                    fields.len()
                )));
            }
            rows.push((n + 1, fields));
        }
        Ok(Self { file, rows })
    }

    fn field<T: FromStr>(&self, line: usize, value: &str, column: &str) -> Result<T> {
        value.parse().map_err(|_| {
            TileError::FileFormat(format!(
                "{} line {line}: invalid {column} `{value}`",
                self.file
            ))
        })
    }
}

fn read(dir: &Path, file: &str) -> Result<String> {
    let path = dir.join(file);
    std::fs::read_to_string(&path)
        .map_err(|e| TileError::Environment(format!("cannot read routing data {path:?}: {e}")))
}

impl RrgData {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let segments = read(dir, RR_SEGMENTS)?;
        let switches = read(dir, RR_SWITCHES)?;
        let stats = read(dir, RR_WIRE_STATS)?;
        let freqs = read(dir, RR_MUX_FREQS)?;
        let data = Self::parse(&segments, &switches, &stats, &freqs)?;
        info!(
            "Loaded {} wire types and {} switches from {dir:?}",
            data.wires.len(),
            data.switches.len()
        );
        Ok(data)
    }

    pub fn parse(segments: &str, switches: &str, stats: &str, freqs: &str) -> Result<Self> {
        let table = Table::parse(RR_SEGMENTS, segments, 5)?;
        let mut wires = Vec::new();
        for (line, f) in &table.rows {
            wires.push(RoutingWire {
                id: table.field(*line, f[0], "id")?,
                name: f[1].to_string(),
                length: table.field(*line, f[2], "length")?,
                freq: table.field(*line, f[3], "freq")?,
                metal: table.field(*line, f[4], "metal")?,
                feeds_cb: true,
                mux_size: None,
                taps: None,
                sources: Vec::new(),
            });
        }
        let index: BTreeMap<usize, usize> =
            wires.iter().enumerate().map(|(i, w)| (w.id, i)).collect();
        let lookup = |file: &str, line: usize, id: usize| {
            index.get(&id).copied().ok_or_else(|| {
                TileError::FileFormat(format!("{file} line {line}: unknown segment {id}"))
            })
        };

        let table = Table::parse(RR_SWITCHES, switches, 6)?;
        let switches = table
            .rows
            .iter()
            .map(|(line, f)| {
                Ok(RrSwitch {
                    id: table.field(*line, f[0], "id")?,
                    name: f[1].to_string(),
                    r: table.field(*line, f[2], "r")?,
                    cin: table.field(*line, f[3], "cin")?,
                    cout: table.field(*line, f[4], "cout")?,
                    tdel: table.field(*line, f[5], "tdel")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let table = Table::parse(RR_WIRE_STATS, stats, 3)?;
        for (line, f) in &table.rows {
            let i = lookup(RR_WIRE_STATS, *line, table.field(*line, f[0], "segment_id")?)?;
            let sb: usize = table.field(*line, f[1], "sb_fanout")?;
            let cb: usize = table.field(*line, f[2], "cb_fanout")?;
            wires[i].taps = Some((sb.max(1), cb));
            wires[i].feeds_cb = cb > 0;
        }

        let table = Table::parse(RR_MUX_FREQS, freqs, 3)?;
        for (line, f) in &table.rows {
            let i = lookup(RR_MUX_FREQS, *line, table.field(*line, f[0], "sink_segment_id")?)?;
            let source = if f[1] == "ble_output" {
                MuxSource::BleOutput
            } else {
                let id = table.field(*line, f[1], "source")?;
                lookup(RR_MUX_FREQS, *line, id)?;
                MuxSource::Wire(id)
            };
            let freq: f64 = table.field(*line, f[2], "freq")?;
            wires[i].sources.push((source, freq));
        }
        for wire in &mut wires {
            if !wire.sources.is_empty() {
                let inputs: f64 = wire.sources.iter().map(|(_, f)| f).sum();
                wire.mux_size = Some((inputs.round() as usize).max(2));
            }
        }

        Ok(Self { wires, switches })
    }

    /// Replaces the configured routing wires and re-validates.
    pub fn apply(self, config: &mut TileConfig) -> Result<()> {
        config.arch.wires = self.wires;
        config.validate()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SEGMENTS: &str = "id,name,length,freq,metal\n0,L4,4,0.8,1\n1,L16,16,0.2,2\n";
    pub(crate) const SWITCHES: &str =
        "id,name,r,cin,cout,tdel\n0,ipin_cblock,900,1e-15,0,5e-11\n1,sb_mux,700,1e-15,0,6e-11\n";
    pub(crate) const STATS: &str = "segment_id,sb_fanout,cb_fanout\n0,3,4\n1,2,0\n";
    pub(crate) const FREQS: &str = "sink_segment_id,source,freq\n0,0,8\n0,1,2\n0,ble_output,2\n1,0,4\n1,1,6\n";

    #[test]
    fn test_parse_bundle() {
        let data = RrgData::parse(SEGMENTS, SWITCHES, STATS, FREQS).unwrap();
        assert_eq!(data.wires.len(), 2);
        assert_eq!(data.switches.len(), 2);
        let l4 = &data.wires[0];
        assert_eq!(l4.taps, Some((3, 4)));
        assert_eq!(l4.mux_size, Some(12));
        assert!(l4.sources.contains(&(MuxSource::BleOutput, 2.0)));
        let l16 = &data.wires[1];
        assert!(!l16.feeds_cb);
        assert_eq!(l16.metal, 2);
        assert_eq!(l16.sources, vec![(MuxSource::Wire(0), 4.0), (MuxSource::Wire(1), 6.0)]);
    }

    #[test]
    fn test_unknown_segment() {
        let freqs = "sink_segment_id,source,freq\n7,0,1\n";
        let err = RrgData::parse(SEGMENTS, SWITCHES, STATS, freqs).unwrap_err();
        assert!(err.to_string().contains("unknown segment 7"));
    }

    #[test]
    fn test_missing_files_are_environment_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(RR_SEGMENTS), SEGMENTS).unwrap();
        let err = RrgData::load(dir.path()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_load_bundle() {
        let dir = tempfile::tempdir().unwrap();
        for (file, text) in [
            (RR_SEGMENTS, SEGMENTS),
            (RR_SWITCHES, SWITCHES),
            (RR_WIRE_STATS, STATS),
            (RR_MUX_FREQS, FREQS),
        ] {
            std::fs::write(dir.path().join(file), text).unwrap();
        }
        assert_eq!(RrgData::load(dir.path()).unwrap().wires[1].name, "L16");
    }
}
