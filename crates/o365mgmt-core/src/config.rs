//! Configuration types and loading for the application.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::management::{DEFAULT_API_ROOT, DEFAULT_AUTHORITY};
use crate::paths::{expand_str_path, write_default_config};
use crate::{AppPaths, env_prefix};

/// Process variable holding the application (client) id.
pub const CLIENT_ID_ENV: &str = "CUSTOMCONNSTR_APP_CLIENT_ID";
/// Process variable holding the application client secret.
pub const CLIENT_SECRET_ENV: &str = "CUSTOMCONNSTR_APP_CLIENT_SECRET";
/// Process variable holding the tenant id.
pub const TENANT_ID_ENV: &str = "APP_TENANT_ID";

const REDACTED: &str = "********";

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(
    title = "Application Configuration",
    description = "Main configuration for the application"
)]
pub struct AppConfig {
    /// JSON Schema reference for editor support.
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub schema: Option<String>,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Management API credentials and endpoints.
    pub management: ManagementConfig,
}

impl AppConfig {
    /// Load configuration from file and environment, creating defaults if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, parsed, or written.
    pub fn load(paths: &AppPaths, dry_run: bool) -> Result<Self> {
        if !paths.config_file.exists() {
            if dry_run {
                log::info!(
                    "dry-run: would create default config at {}",
                    paths.config_file.display()
                );
            } else {
                write_default_config(&paths.config_file)?;
            }
        }

        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// The credential process variables ([`CLIENT_ID_ENV`],
    /// [`CLIENT_SECRET_ENV`], [`TENANT_ID_ENV`]) take precedence over the
    /// file and the prefixed environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    pub fn load_from_path(config_file: &Path) -> Result<Self> {
        Self::load_with_overrides(config_file, &credential_env_overrides())
    }

    /// Load configuration from a path, applying explicit key overrides last.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    pub fn load_with_overrides(config_file: &Path, overrides: &[(&str, String)]) -> Result<Self> {
        let env_prefix = env_prefix();
        let mut builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("management.timeout", 60_i64)?
            .set_default("management.authority", DEFAULT_AUTHORITY)?
            .set_default("management.api_root", DEFAULT_API_ROOT)?
            .add_source(
                File::from(config_file)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(env_prefix.as_str()).separator("__"));

        for (key, value) in overrides {
            builder = builder.set_override(*key, value.as_str())?;
        }

        let mut config: Self = builder.build()?.try_deserialize()?;

        if let Some(ref file) = config.logging.file {
            let expanded = expand_str_path(file)?;
            config.logging.file = Some(expanded.display().to_string());
        }

        Ok(config)
    }

    /// Copy of the configuration that is safe to print.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.management.client_secret.is_some() {
            copy.management.client_secret = Some(REDACTED.to_string());
        }
        copy
    }
}

/// Overrides taken from the credential process variables that are set.
fn credential_env_overrides() -> Vec<(&'static str, String)> {
    [
        ("management.client_id", CLIENT_ID_ENV),
        ("management.client_secret", CLIENT_SECRET_ENV),
        ("management.tenant_id", TENANT_ID_ENV),
    ]
    .into_iter()
    .filter_map(|(key, var)| {
        std::env::var(var)
            .ok()
            .filter(|v| !v.is_empty())
            .map(|v| (key, v))
    })
    .collect()
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Logging configuration")]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace).
    #[schemars(default = "default_log_level")]
    pub level: LogLevel,

    /// Optional path for log file output. Supports ~ and environment variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Log level enumeration for schema validation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only emit error-level messages.
    Error,
    /// Emit warnings and errors.
    Warn,
    /// Emit informational messages and above (default).
    #[default]
    Info,
    /// Emit debug diagnostics and above.
    Debug,
    /// Emit all messages including fine-grained traces.
    Trace,
}

impl LogLevel {
    /// Matching `log` level filter.
    #[must_use]
    pub const fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

const fn default_log_level() -> LogLevel {
    LogLevel::Info
}

/// Management API configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Office 365 Management Activity API settings")]
pub struct ManagementConfig {
    /// Azure AD application (client) id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Azure AD application client secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Tenant id or domain the application is registered in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Request timeout in seconds (default: 60).
    #[schemars(range(min = 1))]
    pub timeout: u64,

    /// Azure AD authority host.
    pub authority: String,

    /// Management Activity API root.
    pub api_root: String,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            tenant_id: None,
            timeout: 60,
            authority: DEFAULT_AUTHORITY.to_string(),
            api_root: DEFAULT_API_ROOT.to_string(),
        }
    }
}

impl ManagementConfig {
    /// Request timeout as a duration, at least one second.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }

    /// The three required credential values.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] naming the first missing or empty value.
    pub fn credentials(&self) -> Result<Credentials, CoreError> {
        Ok(Credentials {
            client_id: required(self.client_id.as_deref(), "client_id", CLIENT_ID_ENV)?,
            client_secret: required(
                self.client_secret.as_deref(),
                "client_secret",
                CLIENT_SECRET_ENV,
            )?,
            tenant_id: required(self.tenant_id.as_deref(), "tenant_id", TENANT_ID_ENV)?,
        })
    }
}

fn required(value: Option<&str>, key: &str, env: &str) -> Result<String, CoreError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| {
            CoreError::Config(format!(
                "missing required setting management.{key} (set {env} or {}__MANAGEMENT__{})",
                env_prefix(),
                key.to_ascii_uppercase()
            ))
        })
}

/// Validated application credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Application (client) id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Tenant id.
    pub tenant_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &REDACTED)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}
