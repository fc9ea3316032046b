//! Ledger configuration, aggregating per-component configs into one
//! loadable document, in the style of `performance::config::PerfConfig`.

use crate::boundary::BoundaryConfig;
use crate::invariants::InvariantConfig;
use crate::recorder::RecorderConfig;
use crate::store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub recorder: RecorderConfig,

    #[serde(default = "InvariantConfig::default_preset")]
    pub invariants: InvariantConfig,

    #[serde(default)]
    pub boundary: BoundaryConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            recorder: RecorderConfig::default(),
            invariants: InvariantConfig::default_preset(),
            boundary: BoundaryConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `LEDGER_CONFIG_PATH`, or default path, or built-in defaults.
    pub fn from_env() -> Self {
        let path = std::env::var("LEDGER_CONFIG_PATH").unwrap_or_else(|_| "ledger_config.toml".to_string());

        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("using default ledger config ({}): {}", path, e);
            Self::default()
        })
    }

    /// Save to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_store_capacity() {
        let config = LedgerConfig::default();
        assert!(config.store.max_entries > 0);
    }

    #[test]
    fn toml_roundtrip() {
        let config = LedgerConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: LedgerConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.store.max_entries, config.store.max_entries);
    }
}
