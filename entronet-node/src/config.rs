use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use entronet_chaos::{BlockConfig, ChaosConfig};
use entronet_fhe::{Address, FheConfig};
use entronet_telemetry::TelemetryConfig;
use serde::Deserialize;
use thiserror::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ConfigFormat {
    Auto,
    Toml,
    Yaml,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {format:?} config: {details}")]
    Parse {
        format: ConfigFormat,
        details: String,
    },
    #[error("configuration invalid: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub node: NodeSection,
    #[serde(default)]
    pub chaos: ChaosConfig,
    #[serde(default)]
    pub fhe: FheConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Deployment wiring: who administers the contracts, where fees go and how
/// the simulated chain behaves.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeSection {
    pub admin: Address,
    pub fee_recipient: Address,
    pub engine_address: Address,
    pub oracle_address: Address,
    /// Cleartext master seed the administrator encrypts at startup.
    pub master_seed: u64,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Wei credited to every requesting account before its first request.
    #[serde(default = "default_faucet_wei")]
    pub faucet_wei: u64,
    #[serde(default)]
    pub block: BlockConfig,
}

const fn default_gas_limit() -> u64 {
    30_000_000
}

const fn default_faucet_wei() -> u64 {
    1_000_000_000_000_000_000
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let node = &self.node;
        for (name, address) in [
            ("admin", node.admin),
            ("fee-recipient", node.fee_recipient),
            ("engine-address", node.engine_address),
            ("oracle-address", node.oracle_address),
        ] {
            if address.is_zero() {
                return Err(ConfigError::Validation(format!(
                    "{name} must not be the zero address"
                )));
            }
        }
        if node.engine_address == node.oracle_address {
            return Err(ConfigError::Validation(
                "engine and oracle must be deployed at distinct addresses".into(),
            ));
        }
        if node.gas_limit == 0 {
            return Err(ConfigError::Validation(
                "gas limit must be greater than zero".into(),
            ));
        }
        self.chaos
            .validate()
            .and_then(|_| node.block.validate())
            .map_err(|err| ConfigError::Validation(err.to_string()))
    }

    pub fn sample() -> Self {
        Self {
            node: NodeSection {
                admin: Address::derive("admin"),
                fee_recipient: Address::derive("treasury"),
                engine_address: Address::derive("engine"),
                oracle_address: Address::derive("oracle"),
                master_seed: 12_345,
                gas_limit: default_gas_limit(),
                faucet_wei: default_faucet_wei(),
                block: BlockConfig::default(),
            },
            chaos: ChaosConfig::default(),
            fhe: FheConfig::default(),
            telemetry: TelemetryConfig::sample("entronet-node"),
        }
    }
}

pub fn load_config(path: &Path, format: ConfigFormat) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&contents, resolve_format(path, format))?;
    config.validate()?;
    Ok(config)
}

/// Parses `contents` without validating. `Auto` is treated as TOML.
pub fn parse_config(contents: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
    match format {
        ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(|err| ConfigError::Parse {
            format,
            details: err.to_string(),
        }),
        ConfigFormat::Toml | ConfigFormat::Auto => {
            toml::from_str(contents).map_err(|err| ConfigError::Parse {
                format: ConfigFormat::Toml,
                details: err.to_string(),
            })
        }
    }
}

pub fn resolve_format(path: &Path, format: ConfigFormat) -> ConfigFormat {
    match format {
        ConfigFormat::Auto => match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Toml,
        },
        _ => format,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sample_config_is_valid() {
        Config::sample().validate().unwrap();
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            resolve_format(Path::new("node.yml"), ConfigFormat::Auto),
            ConfigFormat::Yaml
        );
        assert_eq!(
            resolve_format(Path::new("node.conf"), ConfigFormat::Auto),
            ConfigFormat::Toml
        );
        assert_eq!(
            resolve_format(Path::new("node.toml"), ConfigFormat::Yaml),
            ConfigFormat::Yaml
        );
    }

    #[test]
    fn even_multiplier_is_rejected() {
        let mut config = Config::sample();
        config.chaos.multiplier = 2;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn zero_address_is_rejected() {
        let mut config = Config::sample();
        config.node.fee_recipient = Address::ZERO;
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration invalid: fee-recipient must not be the zero address"
        );
    }

    #[test]
    fn colliding_contract_addresses_are_rejected() {
        let mut config = Config::sample();
        config.node.oracle_address = config.node.engine_address;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }
}
