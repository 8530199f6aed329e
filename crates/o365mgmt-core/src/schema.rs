//! JSON schema and example config for `config.toml`.
//!
//! The schema is derived from [`AppConfig`]; credential settings are annotated
//! with the process variables that override them.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use schemars::Schema;
use schemars::generate::SchemaSettings;
use serde_json::{Value, json};

use crate::APP_NAME;
use crate::config::{AppConfig, CLIENT_ID_ENV, CLIENT_SECRET_ENV, TENANT_ID_ENV};

/// Generated schema filename.
pub const SCHEMA_FILENAME: &str = "config.schema.json";

/// Generated config filename.
pub const CONFIG_FILENAME: &str = "config.toml";

/// Credential keys under `[management]` and the variables that override them.
const CREDENTIAL_OVERRIDES: [(&str, &str); 3] = [
    ("client_id", CLIENT_ID_ENV),
    ("client_secret", CLIENT_SECRET_ENV),
    ("tenant_id", TENANT_ID_ENV),
];

fn schema_url(repo_url: &str) -> String {
    format!("{repo_url}/schemas/{SCHEMA_FILENAME}")
}

/// Generate the draft-07 JSON schema for `config.toml`.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn generate_schema(repo_url: &str) -> Result<String> {
    let generator = SchemaSettings::draft07().into_generator();
    let mut schema: Schema = generator.into_root_schema_for::<AppConfig>();

    schema.insert("$id".to_string(), json!(schema_url(repo_url)));
    schema.insert("title".to_string(), json!(format!("{APP_NAME} configuration")));
    schema.insert(
        "description".to_string(),
        json!("Office 365 Management Activity API credentials, endpoints and logging"),
    );

    // `$schema` is skipped on the struct; editors still need it declared.
    if let Some(props) = schema
        .get_mut("properties")
        .and_then(Value::as_object_mut)
    {
        props.insert(
            "$schema".to_string(),
            json!({ "type": "string", "description": "JSON Schema reference" }),
        );
    }

    if let Some(props) = schema
        .get_mut("definitions")
        .and_then(|defs| defs.get_mut("ManagementConfig"))
        .and_then(|def| def.get_mut("properties"))
        .and_then(Value::as_object_mut)
    {
        for (key, env) in CREDENTIAL_OVERRIDES {
            if let Some(prop) = props.get_mut(key).and_then(Value::as_object_mut) {
                prop.insert("x-env".to_string(), json!(env));
            }
        }
    }

    serde_json::to_string_pretty(&schema).context("serializing JSON schema")
}

/// Generate an example `config.toml` from the defaults.
///
/// Unset credentials are omitted from the body and listed as comments with
/// their override variables.
///
/// # Errors
///
/// Returns an error if TOML serialization fails.
pub fn generate_example_config(repo_url: &str) -> Result<String> {
    let body = toml::to_string_pretty(&AppConfig::default())
        .context("serializing default config to TOML")?;

    let mut output = format!(
        "\"$schema\" = \"{}\"\n\n# {APP_NAME}: copy to $XDG_CONFIG_HOME/{APP_NAME}/config.toml\n#\n",
        schema_url(repo_url)
    );
    for (key, env) in CREDENTIAL_OVERRIDES {
        let _ = writeln!(output, "# management.{key}: set here or via {env}");
    }
    output.push('\n');
    output.push_str(&body);
    Ok(output)
}

/// Write the schema and example config into `output_dir`.
///
/// # Errors
///
/// Returns an error if directory creation or file writing fails.
pub fn write_generated_files(output_dir: &Path, repo_url: &str) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating output directory: {}", output_dir.display()))?;

    for (name, contents) in [
        (SCHEMA_FILENAME, generate_schema(repo_url)?),
        (CONFIG_FILENAME, generate_example_config(repo_url)?),
    ] {
        let path = output_dir.join(name);
        fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}
