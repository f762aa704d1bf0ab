//! Configuration loading
//!
//! Two sources are supported: a standalone `clusterflow.yaml` whose root is the
//! component configuration, and a Pulumi stack file (`Pulumi.<stack>.yaml`)
//! that nests it under `config: { "<project>:config": ... }`.

use crate::error::{ConfigError, Result};
use crate::model::{ComponentConfig, StackContext};
use std::path::Path;
use tracing::{debug, info};

/// Parse and validate a component configuration document.
pub fn load_from_str(content: &str) -> Result<ComponentConfig> {
    let config: ComponentConfig = serde_yaml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load a standalone configuration file.
#[tracing::instrument]
pub fn load_from_path(path: &Path) -> Result<ComponentConfig> {
    let content = read(path)?;
    let config = load_from_str(&content)?;
    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Load the component configuration out of a Pulumi stack file.
#[tracing::instrument]
pub fn load_from_stack_file(path: &Path, ctx: &StackContext) -> Result<ComponentConfig> {
    let content = read(path)?;
    let config = from_stack_document(&content, ctx)?;
    info!(path = %path.display(), stack = %ctx.stack, "Loaded configuration from stack file");
    Ok(config)
}

/// Extract the component configuration from a stack file document.
///
/// Keys in the project's own namespace other than `<project>:config` are
/// rejected; keys belonging to other namespaces (provider settings) are left
/// to the orchestrator.
pub fn from_stack_document(content: &str, ctx: &StackContext) -> Result<ComponentConfig> {
    let document: serde_yaml::Value = serde_yaml::from_str(content)?;
    let key = ctx.config_key();

    let entries = document
        .get("config")
        .and_then(|c| c.as_mapping())
        .ok_or_else(|| ConfigError::MissingStackKey {
            key: "config".to_string(),
        })?;

    let own_prefix = format!("{}:", ctx.project);
    let mut component = None;
    for (entry_key, value) in entries {
        let Some(name) = entry_key.as_str() else {
            continue;
        };
        if name == key {
            component = Some(value.clone());
        } else if name.starts_with(&own_prefix) {
            return Err(ConfigError::UnknownStackKey(name.to_string()));
        } else {
            debug!(key = %name, "Ignoring foreign stack config key");
        }
    }

    let value = component.ok_or(ConfigError::MissingStackKey { key })?;
    let config: ComponentConfig = serde_yaml::from_value(value)?;
    config.validate()?;
    Ok(config)
}

/// Normalized YAML form of a configuration.
pub fn to_yaml(config: &ComponentConfig) -> Result<String> {
    Ok(serde_yaml::to_string(config)?)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
