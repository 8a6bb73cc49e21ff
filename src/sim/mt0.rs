//! HSPICE `.mt0` measurement tables.
//!
//! A table is a header (`$DATA1 ...`, `.TITLE ...`) followed by the
//! measurement names, terminated by `alter#`, and then one value per name.
//! Either list may wrap across lines.

use std::collections::BTreeMap;

use crate::error::{Result, TileError};

const TERMINATOR: &str = "alter#";
const IGNORED: [&str; 2] = ["temper", TERMINATOR];

/// Parses a table into lowercase names and values. `failed` values map to
/// `None`.
pub fn parse(text: &str) -> Result<BTreeMap<String, Option<f64>>> {
    let mut names = Vec::new();
    let mut values = Vec::new();
    let mut in_names = true;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('$') || trimmed.starts_with(".TITLE") {
            continue;
        }
        for token in trimmed.split_whitespace() {
            if in_names {
                let name = token.to_lowercase();
                in_names = name != TERMINATOR;
                names.push(name);
            } else {
                values.push(token);
            }
        }
    }
    if in_names {
        return Err(TileError::FileFormat("measurement table has no `alter#` column".into()));
    }
    if values.len() < names.len() {
        return Err(TileError::FileFormat(format!(
            "measurement table has {} names but {} values",
            names.len(),
            values.len()
        )));
    }

    let mut out = BTreeMap::new();
    for (name, value) in names.into_iter().zip(values) {
        if IGNORED.contains(&name.as_str()) {
            continue;
        }
        let parsed = if value.eq_ignore_ascii_case("failed") {
            None
        } else {
            Some(value.parse::<f64>().map_err(|_| {
                TileError::FileFormat(format!("bad value `{value}` for measurement `{name}`"))
            })?)
        };
        out.insert(name, parsed);
    }
    Ok(out)
}
