//! Core library for o365mgmt - Office 365 Management Activity API access.
//!
//! This crate provides:
//! - Configuration loading, including the credential process variables
//! - XDG-compliant config file discovery
//! - Schema and example config generation
//! - Application token credentials and the activity feed client
//! - A facade with one call per API operation and uniform error reporting

pub mod config;
pub mod error;
pub mod management;
pub mod paths;
pub mod schema;

pub use config::{AppConfig, Credentials, LogLevel, LoggingConfig, ManagementConfig};
pub use error::{CoreError, FacadeError, ManagementError, Operation, Result};
pub use management::{
    Completion, ContentBlob, ContentType, ManagementApi, ManagementClient, ManagementFacade,
    Notification, Subscription, Webhook,
};
pub use paths::{AppPaths, default_config_dir};
pub use schema::{generate_example_config, generate_schema, write_generated_files};

/// Application name used for config directories and environment prefix.
pub const APP_NAME: &str = "o365mgmt";

/// Returns the environment variable prefix for this application.
#[must_use]
pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
