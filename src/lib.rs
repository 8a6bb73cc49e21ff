pub use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use tera::Tera;

pub mod asic;
pub mod blocks;
pub mod cli;
pub mod config;
pub mod error;
pub mod eval;
pub mod maps;
pub mod opt;
pub mod paths;
pub mod plan;
pub mod report;
pub mod rrg;
pub mod sim;
pub mod spice;
pub mod tech;
pub mod telemetry;
pub mod testbench;
pub mod tile;

lazy_static! {
    pub static ref TEMPLATES: Tera =
        match Tera::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/*")) {
            Ok(t) => t,
            Err(e) => panic!("Error parsing templates: {e}"),
        };
}
