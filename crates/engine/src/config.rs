//! Session configuration.
//!
//! Loaded from TOML; every section and key is optional.
//!
//! # Example
//!
//! ```toml
//! [domain]
//! name = "Warden"
//! version = "1"
//!
//! [metatx]
//! default_deadline_secs = 3600
//! max_deadline_secs = 86400
//! min_gas_price = "1000000000"
//!
//! [dispatch]
//! confirmation_timeout_secs = 120
//!
//! [store]
//! dir = ".warden/store"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_core::codec::u256_dec;
use warden_core::U256;

use crate::error::WardenError;

/// Env var naming a config file when no path is given explicitly.
pub const CONFIG_ENV: &str = "WARDEN_CONFIG";

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub domain: DomainConfig,
    pub metatx: MetaTxConfig,
    pub dispatch: DispatchConfig,
    pub store: StoreConfig,
}

/// `[domain]`: EIP-712 domain name and version the verifier uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    pub name: String,
    pub version: String,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            name: "Warden".to_string(),
            version: "1".to_string(),
        }
    }
}

/// `[metatx]`: deadline and gas ceiling policy for new payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaTxConfig {
    pub default_deadline_secs: u64,
    /// Operator bound on caller-requested deadlines.
    pub max_deadline_secs: u64,
    /// Protocol floor for the signed gas ceiling, in wei.
    #[serde(with = "u256_dec")]
    pub min_gas_price: U256,
}

impl Default for MetaTxConfig {
    fn default() -> Self {
        Self {
            default_deadline_secs: 3600,
            max_deadline_secs: 86_400,
            min_gas_price: U256::from(1_000_000_000u64),
        }
    }
}

/// `[dispatch]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub confirmation_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: 120,
        }
    }
}

impl DispatchConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

/// `[store]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".warden/store"),
        }
    }
}

// ── Functions ─────────────────────────────────────────────────────────────────

impl WardenConfig {
    pub fn from_toml(content: &str) -> Result<Self, WardenError> {
        let config: WardenConfig =
            toml::from_str(content).map_err(|e| WardenError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, WardenError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WardenError::Config(format!("could not read '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| WardenError::Config(format!("'{}': {}", path.display(), e)))
    }

    /// Load from `path`, else from `$WARDEN_CONFIG`, else defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self, WardenError> {
        match path {
            Some(path) => Self::load(path),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(env_path) => Self::load(Path::new(&env_path)),
                None => Ok(Self::default()),
            },
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), WardenError> {
        let mut errors: Vec<String> = Vec::new();

        if self.metatx.default_deadline_secs == 0 {
            errors.push("metatx.default_deadline_secs must be positive".to_string());
        }
        if self.metatx.default_deadline_secs > self.metatx.max_deadline_secs {
            errors.push(format!(
                "metatx.default_deadline_secs ({}) exceeds metatx.max_deadline_secs ({})",
                self.metatx.default_deadline_secs, self.metatx.max_deadline_secs
            ));
        }
        if self.dispatch.confirmation_timeout_secs == 0 {
            errors.push("dispatch.confirmation_timeout_secs must be positive".to_string());
        }
        if self.domain.name.is_empty() {
            errors.push("domain.name must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(WardenError::Config(errors.join("; ")))
        }
    }
}
