use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, TileError};

pub mod arch;
pub mod bram;
pub mod hardblock;
pub mod process;
pub mod weights;

pub use arch::*;
pub use bram::{BramParams, MemoryTechnology, MtjResistance};
pub use hardblock::HardBlockParams;
pub use process::{MetalLayer, ProcessParams};
pub use weights::DelayWeights;

/// A vertical stripe of the tile floorplan.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Stripe {
    SbSram,
    Sb,
    Cb,
    CbSram,
    IcSram,
    Ic,
    LutSram,
    Lut,
    Cc,
    Ffble,
}

impl Stripe {
    pub const ALL: [Stripe; 10] = [
        Stripe::SbSram,
        Stripe::Sb,
        Stripe::Cb,
        Stripe::CbSram,
        Stripe::IcSram,
        Stripe::Ic,
        Stripe::LutSram,
        Stripe::Lut,
        Stripe::Cc,
        Stripe::Ffble,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stripe::SbSram => "sb_sram",
            Stripe::Sb => "sb",
            Stripe::Cb => "cb",
            Stripe::CbSram => "cb_sram",
            Stripe::IcSram => "ic_sram",
            Stripe::Ic => "ic",
            Stripe::LutSram => "lut_sram",
            Stripe::Lut => "lut",
            Stripe::Cc => "cc",
            Stripe::Ffble => "ffble",
        }
    }
}

impl fmt::Display for Stripe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Stripe {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self> {
        Stripe::ALL
            .into_iter()
            .find(|stripe| stripe.as_str() == s)
            .ok_or_else(|| TileError::config("stripe_order", format!("unknown stripe `{s}`")))
    }
}

/// The complete, validated description of one exploration run's fabric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileConfig {
    pub arch: ArchParams,
    pub process: ProcessParams,
    pub bram: Option<BramParams>,
    pub hardblocks: Vec<HardBlockParams>,
    pub weights: DelayWeights,
    pub stripe_order: Vec<Stripe>,
    /// PMOS/NMOS ratios bound to specific inverters.
    pub pn_ratios: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireTypeRaw {
    name: Option<String>,
    len: usize,
    #[serde(default = "default_freq")]
    freq: f64,
    #[serde(default = "default_wire_metal")]
    metal: usize,
    #[serde(default = "default_true")]
    feeds_cb: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HardBlockRaw {
    name: String,
    num_gen_inputs: usize,
    num_gen_outputs: usize,
    #[serde(default)]
    num_dedicated_outputs: usize,
    #[serde(default = "default_crossbar_population")]
    crossbar_population: f64,
    #[serde(default = "default_scale")]
    area_scale: f64,
    #[serde(default = "default_scale")]
    freq_scale: f64,
    #[serde(default)]
    lower_bound_delay: f64,
    #[serde(default)]
    flow_command: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(non_snake_case)]
struct ConfigRaw {
    N: usize,
    K: LutSize,
    W: usize,
    #[serde(default = "default_l")]
    L: usize,
    I: usize,
    Fs: usize,
    Fcin: f64,
    Fcout: f64,
    Fclocal: f64,
    #[serde(default = "default_ofb")]
    Ofb: usize,
    #[serde(default = "default_or")]
    Or: usize,
    #[serde(default = "default_unused_input")]
    Rsel: String,
    #[serde(default = "default_unused_input")]
    Rfb: String,

    #[serde(default, deserialize_with = "de_flag")]
    use_fluts: bool,
    #[serde(default = "default_fas_per_flut")]
    FAs_per_flut: usize,
    #[serde(default, deserialize_with = "de_flag")]
    enable_carry_chain: bool,
    #[serde(default = "default_carry_chain_type")]
    carry_chain_type: CarryChainType,
    #[serde(default = "default_skip_size")]
    skip_size: usize,

    transistor_type: Option<TransistorType>,
    switch_type: Option<SwitchType>,
    #[serde(default, deserialize_with = "de_opt_flag")]
    use_finfet: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_flag")]
    use_tgate: Option<bool>,
    #[serde(default, deserialize_with = "de_flag")]
    use_lp_transistor: bool,
    tech_node: Option<u32>,

    vdd: f64,
    vsram: Option<f64>,
    #[serde(default)]
    vsram_n: f64,
    #[serde(default = "default_gate_length")]
    gate_length: f64,
    min_tran_width: f64,
    #[serde(default = "default_min_width_tran_area")]
    min_width_tran_area: f64,
    #[serde(default = "default_sram_cell_area")]
    sram_cell_area: f64,
    #[serde(default = "default_rest_length_factor")]
    rest_length_factor: f64,
    #[serde(default = "default_trans_diffusion_length")]
    trans_diffusion_length: f64,
    #[serde(default = "default_model_path")]
    model_path: PathBuf,
    #[serde(default = "default_model_library")]
    model_library: String,
    metal: Option<Vec<(f64, f64)>>,
    #[serde(default = "default_metal_pitch")]
    metal_pitch: f64,

    #[serde(default, deserialize_with = "de_flag")]
    enable_bram_block: bool,
    #[serde(default = "default_row_decoder_bits")]
    row_decoder_bits: usize,
    #[serde(default = "default_col_decoder_bits")]
    col_decoder_bits: usize,
    #[serde(default = "default_conf_decoder_bits")]
    conf_decoder_bits: usize,
    #[serde(default = "default_banks")]
    number_of_banks: usize,
    #[serde(default = "default_memory_technology")]
    memory_technology: MemoryTechnology,
    MTJ_Rhigh_worstcase: Option<f64>,
    MTJ_Rlow_worstcase: Option<f64>,
    MTJ_Rhigh_nominal: Option<f64>,
    MTJ_Rlow_nominal: Option<f64>,
    #[serde(default = "default_vref")]
    vref: f64,
    #[serde(default = "default_vclmp")]
    vclmp: f64,
    #[serde(default = "default_sense_dv")]
    sense_dv: f64,

    #[serde(default)]
    hardblocks: Vec<HardBlockRaw>,
    #[serde(default)]
    wire_types: Vec<WireTypeRaw>,
    stripe_order: Option<Vec<String>>,
    #[serde(default)]
    delay_weights: DelayWeights,
    #[serde(default)]
    pn_ratios: BTreeMap<String, f64>,
}

fn default_freq() -> f64 {
    1.0
}
fn default_wire_metal() -> usize {
    1
}
fn default_true() -> bool {
    true
}
fn default_crossbar_population() -> f64 {
    0.5
}
fn default_scale() -> f64 {
    1.0
}
fn default_l() -> usize {
    4
}
fn default_ofb() -> usize {
    1
}
fn default_or() -> usize {
    2
}
fn default_unused_input() -> String {
    "z".into()
}
fn default_fas_per_flut() -> usize {
    2
}
fn default_carry_chain_type() -> CarryChainType {
    CarryChainType::Ripple
}
fn default_skip_size() -> usize {
    5
}
fn default_gate_length() -> f64 {
    22.0
}
fn default_min_width_tran_area() -> f64 {
    33_864.0
}
fn default_sram_cell_area() -> f64 {
    4.0
}
fn default_rest_length_factor() -> f64 {
    1.0
}
fn default_trans_diffusion_length() -> f64 {
    52.0
}
fn default_model_path() -> PathBuf {
    PathBuf::from("models.l")
}
fn default_model_library() -> String {
    "TT".into()
}
fn default_metal_pitch() -> f64 {
    80.0
}
fn default_row_decoder_bits() -> usize {
    8
}
fn default_col_decoder_bits() -> usize {
    2
}
fn default_conf_decoder_bits() -> usize {
    5
}
fn default_banks() -> usize {
    1
}
fn default_memory_technology() -> MemoryTechnology {
    MemoryTechnology::Sram
}
fn default_vref() -> f64 {
    0.627
}
fn default_vclmp() -> f64 {
    0.653
}
fn default_sense_dv() -> f64 {
    0.03
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagRaw {
    Bool(bool),
    Int(i64),
}

impl FlagRaw {
    fn value(self) -> bool {
        match self {
            FlagRaw::Bool(b) => b,
            FlagRaw::Int(i) => i != 0,
        }
    }
}

/// Accepts `true`/`false` as well as the `0`/`1` integer flags of older
/// configuration files.
fn de_flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    Ok(FlagRaw::deserialize(deserializer)?.value())
}

fn de_opt_flag<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<bool>, D::Error> {
    Ok(Option::<FlagRaw>::deserialize(deserializer)?.map(FlagRaw::value))
}

fn parse_input(option: &str, raw: &str) -> Result<Option<char>> {
    match raw {
        "z" | "" => Ok(None),
        s if s.len() == 1 => Ok(s.chars().next()),
        s => Err(TileError::config(
            option,
            format!("expected a single LUT input letter or `z`, got `{s}`"),
        )),
    }
}

fn resolve_family(raw: &ConfigRaw) -> Result<CircuitFamily> {
    let transistor = match (raw.transistor_type, raw.use_finfet) {
        (Some(t), Some(finfet)) if (t == TransistorType::Finfet) != finfet => {
            return Err(TileError::config(
                "use_finfet",
                "conflicts with transistor_type",
            ))
        }
        (Some(t), _) => t,
        (None, Some(true)) => TransistorType::Finfet,
        (None, _) => TransistorType::Bulk,
    };
    let switch = match (raw.switch_type, raw.use_tgate) {
        (Some(s), Some(tgate)) if (s == SwitchType::TransmissionGate) != tgate => {
            return Err(TileError::config("use_tgate", "conflicts with switch_type"))
        }
        (Some(s), _) => s,
        (None, Some(true)) => SwitchType::TransmissionGate,
        (None, _) => SwitchType::PassTransistor,
    };
    Ok(CircuitFamily {
        switch,
        transistor,
        low_power: raw.use_lp_transistor,
        tech_node: raw.tech_node,
    })
}

impl TileConfig {
    fn from_raw(raw: ConfigRaw) -> Result<Self> {
        let family = resolve_family(&raw)?;

        let rsel = parse_input("Rsel", &raw.Rsel)?;
        let rfb = if raw.Rfb == "z" {
            Vec::new()
        } else {
            raw.Rfb.chars().collect()
        };

        let wires = if raw.wire_types.is_empty() {
            vec![RoutingWire {
                id: 0,
                name: format!("L{}", raw.L),
                length: raw.L,
                freq: 1.0,
                metal: default_wire_metal(),
                feeds_cb: true,
                mux_size: None,
                taps: None,
                sources: vec![],
            }]
        } else {
            raw.wire_types
                .into_iter()
                .enumerate()
                .map(|(id, w)| RoutingWire {
                    id,
                    name: w.name.unwrap_or_else(|| format!("L{}", w.len)),
                    length: w.len,
                    freq: w.freq,
                    metal: w.metal,
                    feeds_cb: w.feeds_cb,
                    mux_size: None,
                    taps: None,
                    sources: vec![],
                })
                .collect()
        };

        let carry_chain = raw.enable_carry_chain.then_some(CarryChain {
            kind: raw.carry_chain_type,
            skip_size: raw.skip_size,
            fas_per_flut: raw.FAs_per_flut,
        });

        let arch = ArchParams {
            n: raw.N,
            k: raw.K,
            w: raw.W,
            l: raw.L,
            i: raw.I,
            fs: raw.Fs,
            fcin: raw.Fcin,
            fcout: raw.Fcout,
            fclocal: raw.Fclocal,
            ofb: raw.Ofb,
            or: raw.Or,
            rsel,
            rfb,
            use_fluts: raw.use_fluts,
            carry_chain,
            family,
            wires,
        };

        let metal = match raw.metal {
            Some(layers) => layers
                .into_iter()
                .map(|(r_per_nm, c_per_nm)| MetalLayer { r_per_nm, c_per_nm })
                .collect(),
            None => process::default_metal_stack(),
        };
        let process = ProcessParams {
            vdd: raw.vdd,
            vsram: raw.vsram.unwrap_or(raw.vdd),
            vsram_n: raw.vsram_n,
            gate_length: raw.gate_length,
            min_tran_width: raw.min_tran_width,
            min_width_tran_area: raw.min_width_tran_area,
            sram_cell_area: raw.sram_cell_area,
            rest_length_factor: raw.rest_length_factor,
            trans_diffusion_length: raw.trans_diffusion_length,
            model_path: raw.model_path,
            model_library: raw.model_library,
            metal,
            metal_pitch: raw.metal_pitch,
        };

        let defaults = MtjResistance::default();
        let bram = raw.enable_bram_block.then(|| BramParams {
            row_decoder_bits: raw.row_decoder_bits,
            col_decoder_bits: raw.col_decoder_bits,
            conf_decoder_bits: raw.conf_decoder_bits,
            number_of_banks: raw.number_of_banks,
            memory_technology: raw.memory_technology,
            mtj: MtjResistance {
                r_high_worstcase: raw.MTJ_Rhigh_worstcase.unwrap_or(defaults.r_high_worstcase),
                r_low_worstcase: raw.MTJ_Rlow_worstcase.unwrap_or(defaults.r_low_worstcase),
                r_high_nominal: raw.MTJ_Rhigh_nominal.unwrap_or(defaults.r_high_nominal),
                r_low_nominal: raw.MTJ_Rlow_nominal.unwrap_or(defaults.r_low_nominal),
            },
            vref: raw.vref,
            vclmp: raw.vclmp,
            sense_dv: raw.sense_dv,
        });

        let hardblocks = raw
            .hardblocks
            .into_iter()
            .map(|hb| HardBlockParams {
                name: hb.name,
                num_gen_inputs: hb.num_gen_inputs,
                num_gen_outputs: hb.num_gen_outputs,
                num_dedicated_outputs: hb.num_dedicated_outputs,
                crossbar_population: hb.crossbar_population,
                area_scale: hb.area_scale,
                freq_scale: hb.freq_scale,
                lower_bound_delay: hb.lower_bound_delay,
                flow_command: hb.flow_command,
            })
            .collect();

        let stripe_order = match raw.stripe_order {
            Some(order) => order
                .iter()
                .map(|s| s.parse())
                .collect::<Result<Vec<Stripe>>>()?,
            None => Stripe::ALL.to_vec(),
        };

        let config = Self {
            arch,
            process,
            bram,
            hardblocks,
            weights: raw.delay_weights,
            stripe_order,
            pn_ratios: raw.pn_ratios,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.process.validate()?;
        self.arch.validate(self.process.metal.len())?;

        if let Some(bram) = &self.bram {
            bram.validate()?;
            if self.arch.family.use_finfet() && bram.memory_technology == MemoryTechnology::Mtj {
                return Err(TileError::config(
                    "memory_technology",
                    "MTJ block RAM is only modelled on bulk processes",
                ));
            }
        }

        for hb in &self.hardblocks {
            hb.validate()?;
        }
        for (idx, hb) in self.hardblocks.iter().enumerate() {
            if self.hardblocks[..idx].iter().any(|other| other.name == hb.name) {
                return Err(TileError::config(
                    "hardblocks",
                    format!("duplicate hard block `{}`", hb.name),
                ));
            }
        }

        let mut required = vec![
            Stripe::SbSram,
            Stripe::Sb,
            Stripe::Cb,
            Stripe::CbSram,
            Stripe::IcSram,
            Stripe::Ic,
            Stripe::LutSram,
            Stripe::Lut,
            Stripe::Ffble,
        ];
        if self.arch.carry_chain_enabled() {
            required.push(Stripe::Cc);
        }
        for stripe in required {
            if !self.stripe_order.contains(&stripe) {
                return Err(TileError::config(
                    "stripe_order",
                    format!("stripe `{stripe}` is missing"),
                ));
            }
        }

        for (name, ratio) in &self.pn_ratios {
            if *ratio <= 0.0 {
                return Err(TileError::config(
                    "pn_ratios",
                    format!("ratio of `{name}` must be positive"),
                ));
            }
        }
        Ok(())
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let raw: ConfigRaw = toml::from_str(contents)?;
        Self::from_raw(raw)
    }

    /// Parses a configuration from YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let raw: ConfigRaw = serde_yaml::from_str(contents)?;
        Self::from_raw(raw)
    }
}

/// Reads a configuration file, choosing the format by file extension.
pub fn parse_tile_config(path: impl AsRef<Path>) -> Result<TileConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => TileConfig::from_yaml(&contents),
        Some("toml") => TileConfig::from_toml(&contents),
        _ => Err(TileError::config(
            "config",
            format!("unsupported configuration file extension: {path:?}"),
        )),
    }
}
