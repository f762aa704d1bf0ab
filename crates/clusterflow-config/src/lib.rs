//! clusterflow configuration
//!
//! Strictly validated cluster description: hypervisor access, node sizing,
//! network layout, version pins and secret references.

pub mod error;
pub mod loader;
pub mod model;
pub mod onepassword;

pub use error::*;
pub use loader::{from_stack_document, load_from_path, load_from_stack_file, load_from_str, to_yaml};
pub use model::*;

use std::path::PathBuf;

const CONFIG_ENV: &str = "CLUSTERFLOW_CONFIG_PATH";
const CANDIDATES: [&str; 2] = ["clusterflow.local.yaml", "clusterflow.yaml"];

/// Locate the configuration file.
///
/// Search order:
/// 1. `CLUSTERFLOW_CONFIG_PATH`
/// 2. current directory: clusterflow.local.yaml, clusterflow.yaml
/// 3. `./.clusterflow/`, same names
/// 4. `~/.config/clusterflow/clusterflow.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let local_dir = current_dir.join(".clusterflow");
    if local_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = local_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("clusterflow").join("clusterflow.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Path of the Pulumi stack file for `stack` in the current directory.
pub fn stack_file_path(stack: &str) -> Result<PathBuf> {
    Ok(std::env::current_dir()?.join(format!("Pulumi.{}.yaml", stack)))
}
