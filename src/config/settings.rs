//! Runtime configuration structures

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::calibration::Calibration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeSettings,
    pub oracle: OracleSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Bitcoin Core JSON-RPC endpoint
    pub rpc_url: String,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    /// bitcoind `.cookie` file, used when no user/password is configured
    pub cookie_file: Option<PathBuf>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OracleSettings {
    /// First day the estimator is known to produce sensible prices for
    pub earliest_date: NaiveDate,
    /// Optional TOML file overriding the built-in calibration
    pub calibration_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file_prefix: String,
    /// Used when `RUST_LOG` is not set
    pub default_filter: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8332".to_string(),
            rpc_user: None,
            rpc_password: None,
            cookie_file: None,
            timeout_secs: 60,
        }
    }
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            earliest_date: NaiveDate::from_ymd_opt(2023, 12, 15).unwrap_or_default(),
            calibration_file: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_prefix: "utxoracle.log".to_string(),
            default_filter: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Calibration named by the config, or the built-in one
    pub fn load_calibration(&self) -> Result<Calibration> {
        match &self.oracle.calibration_file {
            Some(path) => Calibration::load_from_file(path),
            None => Ok(Calibration::builtin().clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file_sections() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.node.rpc_url, "http://127.0.0.1:8332");
        assert_eq!(config.oracle.earliest_date, NaiveDate::from_ymd_opt(2023, 12, 15).unwrap());
        assert_eq!(config.logging.default_filter, "info");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[node]
rpc_url = "http://192.168.1.99:8332"
rpc_user = "oracle"
rpc_password = "hunter2"

[oracle]
earliest_date = "2024-01-01"
"#
        )
        .unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.node.rpc_url, "http://192.168.1.99:8332");
        assert_eq!(config.node.rpc_user.as_deref(), Some("oracle"));
        assert_eq!(config.node.timeout_secs, 60);
        assert_eq!(config.oracle.earliest_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(config.load_calibration().unwrap(), *Calibration::builtin());
    }
}
