//! Cluster program error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KubeError {
    #[error("Expected {expected} version(s) of {package} for {channel}/{architecture}, found {found}")]
    AmbiguousVersion {
        package: String,
        channel: String,
        architecture: String,
        expected: usize,
        found: usize,
    },

    #[error("Snap index error ({status}): {message}")]
    SnapIndex { status: u16, message: String },

    #[error("Missing resolved version: {0}")]
    MissingVersion(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Config(#[from] clusterflow_config::ConfigError),

    #[error(transparent)]
    Cloud(#[from] clusterflow_cloud::CloudError),

    #[error(transparent)]
    Proxmox(#[from] clusterflow_cloud_proxmox::ProxmoxError),
}

pub type Result<T> = std::result::Result<T, KubeError>;
