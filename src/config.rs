//! Configuration file support for tablestate
//!
//! Reads from .tablestate/config.toml

use crate::db::DATA_DIR;
use crate::reconcile::StatusPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Reconciliation settings
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Billing settings applied to new orders
    #[serde(default)]
    pub billing: BillingConfig,
}

/// Reconciliation settings
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct ReconcileConfig {
    /// What a repair does to reserved/maintenance tables
    /// Default: "preserve-holds"
    #[serde(default)]
    pub policy: StatusPolicy,
}

/// Billing settings
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct BillingConfig {
    /// Tax added to each new order's subtotal, in percent (8.5 = 8.5%)
    /// Default: 0
    #[serde(default)]
    pub tax_rate_percent: f64,
}

pub const DEFAULT_CONFIG_TOML: &str = r#"# tablestate configuration

[reconcile]
# "preserve-holds": reserved/maintenance tables keep their status when no order is active
# "overwrite":      a repair always sets occupied/available
policy = "preserve-holds"

[billing]
tax_rate_percent = 0.0
"#;

impl Config {
    /// Load config from .tablestate/config.toml
    /// Returns default config if file doesn't exist
    pub fn load() -> Self {
        match Self::find_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load a specific config file, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read config, using defaults");
                return Self::default();
            }
        };
        match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                Self::default()
            }
        }
    }

    /// Find config.toml by walking up directory tree
    fn find_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut dir = current_dir.as_path();

        loop {
            let config_path = dir.join(DATA_DIR).join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.reconcile.policy, StatusPolicy::PreserveHolds);
        assert_eq!(config.billing.tax_rate_percent, 0.0);
    }

    #[test]
    fn test_default_toml_matches_defaults() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[reconcile]
policy = "overwrite"

[billing]
tax_rate_percent = 8.5
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.reconcile.policy, StatusPolicy::Overwrite);
        assert_eq!(config.billing.tax_rate_percent, 8.5);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: Config = toml::from_str("[billing]\ntax_rate_percent = 5.0\n").unwrap();
        assert_eq!(config.reconcile.policy, StatusPolicy::PreserveHolds);
    }

    #[test]
    fn test_unreadable_or_invalid_config_falls_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(Config::load_from(&path), Config::default());

        std::fs::write(&path, "[reconcile]\npolicy = \"sometimes\"\n").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }
}
