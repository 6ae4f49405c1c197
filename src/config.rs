use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use validator::Validate;

const CONFIG_DIR: &str = "config";

const DEFAULT_APPROVAL_THRESHOLD: i32 = 50;
const DEFAULT_RESERVATION_TTL_HOURS: i64 = 72;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Policy and runtime knobs for the inventory core.
///
/// Values load from `config/default.toml`, an optional
/// `config/{environment}.toml`, and finally `VENDORY__`-prefixed
/// environment variables (e.g. `VENDORY__DATABASE_URL`).
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct InventoryConfig {
    /// Database connection URL
    pub database_url: String,

    /// Absolute adjustment difference (in units) above which a
    /// stocktake adjustment needs approval before the balance write.
    #[serde(default = "default_approval_threshold")]
    #[validate(range(min = 0))]
    pub adjustment_approval_threshold: i32,

    /// Master switch for the approval gate. When off, every adjustment
    /// applies immediately regardless of magnitude.
    #[serde(default = "default_require_approval")]
    pub require_adjustment_approval: bool,

    /// Machine sales are facts from hardware; when set, a sale that
    /// exceeds the tracked quantity commits and drives the balance
    /// negative (surfaced as an alert) instead of being rejected.
    #[serde(default = "default_allow_negative")]
    pub allow_negative_machine_stock: bool,

    /// Applied when a reservation request carries no explicit expiry.
    #[serde(default = "default_reservation_ttl_hours")]
    #[validate(range(min = 1))]
    pub default_reservation_ttl_hours: i64,

    /// Poll interval of the background expiry sweep.
    #[serde(default = "default_sweep_interval_secs")]
    #[validate(range(min = 1))]
    pub reservation_sweep_interval_secs: u64,
}

fn default_approval_threshold() -> i32 {
    DEFAULT_APPROVAL_THRESHOLD
}

fn default_require_approval() -> bool {
    true
}

fn default_allow_negative() -> bool {
    true
}

fn default_reservation_ttl_hours() -> i64 {
    DEFAULT_RESERVATION_TTL_HOURS
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            adjustment_approval_threshold: default_approval_threshold(),
            require_adjustment_approval: default_require_approval(),
            allow_negative_machine_stock: default_allow_negative(),
            default_reservation_ttl_hours: default_reservation_ttl_hours(),
            reservation_sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl InventoryConfig {
    /// Loads configuration from files and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".to_string());
        info!("Loading configuration for environment: {}", environment);

        let mut builder = Config::builder();

        let default_path = Path::new(CONFIG_DIR).join("default.toml");
        if default_path.exists() {
            builder = builder.add_source(File::from(default_path));
        }
        let env_path = Path::new(CONFIG_DIR).join(format!("{}.toml", environment));
        if env_path.exists() {
            builder = builder.add_source(File::from(env_path));
        }

        builder = builder.add_source(Environment::with_prefix("VENDORY").separator("__"));

        let config: Self = builder.build()?.try_deserialize()?;
        config
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(config)
    }

    /// Whether an adjustment of the given signed difference must be
    /// approved before its balance write commits.
    pub fn adjustment_needs_approval(&self, difference: i32) -> bool {
        self.require_adjustment_approval
            && difference.abs() > self.adjustment_approval_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_gate_uses_absolute_difference() {
        let cfg = InventoryConfig {
            adjustment_approval_threshold: 10,
            require_adjustment_approval: true,
            ..Default::default()
        };
        assert!(!cfg.adjustment_needs_approval(10));
        assert!(cfg.adjustment_needs_approval(11));
        assert!(cfg.adjustment_needs_approval(-11));
    }

    #[test]
    fn approval_gate_can_be_disabled() {
        let cfg = InventoryConfig {
            adjustment_approval_threshold: 0,
            require_adjustment_approval: false,
            ..Default::default()
        };
        assert!(!cfg.adjustment_needs_approval(1_000));
    }
}
