use thiserror::Error;

#[derive(Debug, Error)]
pub enum TileError {
    #[error("invalid configuration option `{option}`: {rule}")]
    Config { option: String, rule: String },

    #[error("environment error: {0}")]
    Environment(String),

    #[error("generation error in `{subcircuit}`: missing or invalid entry `{key}`")]
    Generation { subcircuit: String, key: String },

    #[error("simulation of `{testbench}` failed: {reason}")]
    Simulation { testbench: String, reason: String },

    #[error("every candidate evaluated in pass {pass} was infeasible")]
    AllCandidatesInfeasible { pass: usize },

    #[error("run cancelled by user")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error rendering template: {0}")]
    Template(#[from] tera::Error),

    #[error("error serializing/deserializing JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("error parsing TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("error parsing YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("file format error: {0}")]
    FileFormat(String),
}

impl TileError {
    pub fn config(option: impl Into<String>, rule: impl Into<String>) -> Self {
        Self::Config {
            option: option.into(),
            rule: rule.into(),
        }
    }

    pub fn generation(subcircuit: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Generation {
            subcircuit: subcircuit.into(),
            key: key.into(),
        }
    }

    /// Process exit code reported by the command line driver.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::Toml(_) | Self::Yaml(_) => 2,
            Self::Environment(_) => 3,
            Self::Generation { .. } => 4,
            Self::AllCandidatesInfeasible { .. } => 5,
            Self::Cancelled => 130,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, TileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(TileError::config("K", "must be 4, 5 or 6").exit_code(), 2);
        assert_eq!(TileError::Environment("no hspice".into()).exit_code(), 3);
        assert_eq!(TileError::generation("sb_mux", "wire_sb_mux_L1").exit_code(), 4);
        assert_eq!(
            TileError::AllCandidatesInfeasible { pass: 1 }.exit_code(),
            5
        );
    }

    #[test]
    fn test_config_message_names_option() {
        let err = TileError::config("FAs_per_flut", "at most 2 with fracturable LUTs");
        let msg = err.to_string();
        assert!(msg.contains("FAs_per_flut"));
        assert!(msg.contains("at most 2"));
    }
}
