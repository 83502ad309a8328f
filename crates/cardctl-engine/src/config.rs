//! Engine Configuration
//!
//! Loaded from an optional file, `config/default` and `config/local`, then
//! environment variables with the `CARDCTL` prefix (`CARDCTL__LIST__MAX_CONCURRENCY=8`).
//! Every field has a default, so an empty source set yields a working engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use cardctl_rules::StaticFeatureGate;

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// List fan-out settings
    #[serde(default)]
    pub list: ListSettings,

    /// Domain-event settings
    #[serde(default)]
    pub notifications: NotificationSettings,

    /// Audit settings
    #[serde(default)]
    pub audit: AuditSettings,

    /// Feature-gate settings
    #[serde(default)]
    pub features: FeatureSettings,
}

/// What the List fan-out does with a card whose unit failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialFailurePolicy {
    /// Omit the card, except failed document queries which get an empty entry
    #[default]
    Isolate,
    /// Omit the card whatever failed
    OmitFailed,
    /// Abort the remaining units and fail the call
    FailFast,
}

/// List fan-out settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSettings {
    /// Cards queried at the same time
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Deadline for one card's checks and query, in milliseconds
    #[serde(default = "default_per_card_timeout")]
    pub per_card_timeout_ms: u64,

    /// Partial-failure handling
    #[serde(default)]
    pub failure_policy: PartialFailurePolicy,
}

impl Default for ListSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            per_card_timeout_ms: default_per_card_timeout(),
            failure_policy: PartialFailurePolicy::default(),
        }
    }
}

impl ListSettings {
    /// Get the per-card deadline
    pub fn per_card_timeout(&self) -> Duration {
        Duration::from_millis(self.per_card_timeout_ms)
    }
}

/// Domain-event settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Publish events after successful mutations
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Give up on a publish after this many milliseconds
    #[serde(default = "default_notification_timeout")]
    pub timeout_ms: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: default_notification_timeout(),
        }
    }
}

impl NotificationSettings {
    /// Get the publish deadline
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Audit settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Publish an audit record for every workflow outcome
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Service name stamped into each record's service data
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: default_service_name(),
        }
    }
}

/// Feature-gate settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSettings {
    /// Control-type identifiers that may not be created
    #[serde(default)]
    pub disabled_controls: Vec<String>,
}

impl FeatureSettings {
    /// Gate with exactly the configured keys switched off
    pub fn feature_gate(&self) -> StaticFeatureGate {
        StaticFeatureGate::with_disabled(self.disabled_controls.iter().cloned())
    }
}

// =============================================================================
// Default Functions
// =============================================================================

fn default_max_concurrency() -> usize {
    16
}

fn default_per_card_timeout() -> u64 {
    5_000
}

fn default_notification_timeout() -> u64 {
    1_000
}

fn default_service_name() -> String {
    "card-controls".to_string()
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl EngineConfig {
    /// Load configuration from environment and optional config file
    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("CARDCTL")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("features.disabled_controls"),
            );

        let engine_config: EngineConfig = builder.build()?.try_deserialize()?;
        engine_config.validate()?;
        Ok(engine_config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(toml: &str) -> Result<Self, config::ConfigError> {
        let engine_config: EngineConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        engine_config.validate()?;
        Ok(engine_config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.list.max_concurrency == 0 {
            return Err(config::ConfigError::Message(
                "list.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.list.per_card_timeout_ms == 0 {
            return Err(config::ConfigError::Message(
                "list.per_card_timeout_ms must be at least 1".to_string(),
            ));
        }
        for key in &self.features.disabled_controls {
            if key.parse::<cardctl_types::ControlType>().is_err() {
                tracing::warn!(key = %key, "disabled control is not a known control type");
            }
        }
        Ok(())
    }
}
