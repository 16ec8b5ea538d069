//! Aggregated configuration
//!
//! [`SquidConfig`] gathers every crate's config section. Sources are layered
//! the usual way: defaults, then a TOML file, then `SQUID_*` environment
//! variables, then validation.

use crate::error::ConfigError;
use crate::feedback::FeedbackConfig;
use serde::{Deserialize, Serialize};
use squid_audit::AuditConfig;
use squid_authorization::ResolverConfig;
use squid_core::ConfigValidation;
use squid_ephemeral::EphemeralConfig;
use squid_identity::IdentityConfig;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "SQUID_";

/// Host logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Complete sQuid core configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SquidConfig {
    /// Identity tree
    pub identity: IdentityConfig,
    /// Capability resolver
    pub resolver: ResolverConfig,
    /// Audit subsystem
    pub audit: AuditConfig,
    /// Ephemeral store
    pub ephemeral: EphemeralConfig,
    /// Switch feedback
    pub feedback: FeedbackConfig,
    /// Host logging
    pub logging: LoggingConfig,
}

impl SquidConfig {
    /// Parse a TOML document. Missing sections keep their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        toml::from_str(input).map_err(|e| ConfigError::parse(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults or `path`, then the process environment, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.merge_with_env()?;
        config.validate().map_err(ConfigError::invalid)?;
        Ok(config)
    }

    /// Apply `SQUID_*` variables from the process environment.
    pub fn merge_with_env(&mut self) -> Result<(), ConfigError> {
        self.merge_env_vars(std::env::vars())
    }

    /// Apply `SQUID_*` overrides from `vars`; other names are skipped.
    ///
    /// `SQUID_EPHEMERAL_DEFAULT_TTL_MS` sets `ephemeral.default_ttl_ms`,
    /// `SQUID_LOG` sets `logging.filter`, and so on.
    pub fn merge_env_vars<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (var, value) in vars {
            let (var, value) = (var.as_ref(), value.as_ref());
            let Some(key) = var.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match key.to_ascii_lowercase().as_str() {
                "identity_max_depth" => self.identity.max_depth = parse(var, value)?,
                "resolver_unknown_modules_disclose" => {
                    self.resolver.unknown_modules_disclose = parse(var, value)?
                }
                "audit_rate_multiplier" => self.audit.anomaly.rate_multiplier = parse(var, value)?,
                "audit_min_events" => self.audit.anomaly.min_events = parse(var, value)?,
                "audit_denied_run_threshold" => {
                    self.audit.anomaly.denied_run_threshold = parse(var, value)?
                }
                "audit_auto_flag" => self.audit.anomaly.auto_flag = parse(var, value)?,
                "audit_retention_horizon_ms" => {
                    self.audit.retention.horizon_ms = parse(var, value)?
                }
                "audit_max_pending" => self.audit.max_pending = parse(var, value)?,
                "ephemeral_default_ttl_ms" => self.ephemeral.default_ttl_ms = parse(var, value)?,
                "ephemeral_sweep_interval_ms" => {
                    self.ephemeral.sweep_interval_ms = parse(var, value)?
                }
                "ephemeral_visibility_loss_threshold_ms" => {
                    self.ephemeral.visibility_loss_threshold_ms = parse(var, value)?
                }
                "feedback_ttl_ms" => self.feedback.ttl_ms = parse(var, value)?,
                "feedback_max_queued" => self.feedback.max_queued = parse(var, value)?,
                "log" => self.logging.filter = value.to_string(),
                _ => {
                    debug!(var, "Ignoring unknown configuration variable");
                    continue;
                }
            }
            debug!(var, "Applied configuration override");
        }
        Ok(())
    }
}

fn parse<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::env(var, format!("`{value}`: {e}")))
}

impl ConfigValidation for SquidConfig {
    fn validate(&self) -> Result<(), String> {
        self.identity.validate()?;
        self.resolver.validate()?;
        self.audit.validate()?;
        self.ephemeral.validate()?;
        self.feedback.validate()?;
        if self.logging.filter.trim().is_empty() {
            return Err("logging.filter must not be empty".into());
        }
        Ok(())
    }
}
