//! Proxmox provider error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxmoxError {
    #[error("No ethernet interface reported by the guest agent (interfaces: {})", .0.join(", "))]
    NoEthernetInterface(Vec<String>),

    #[error("Guest agent has not reported any interfaces yet")]
    NoInterfaces,

    #[error("Ethernet interface {0} has no IPv4 address yet")]
    AddressNotAssigned(String),

    #[error("QEMU guest agent of VM {vmid} on {node} is not running")]
    AgentNotRunning { node: String, vmid: u32 },

    #[error("Timed out waiting for an IPv4 address of VM {vmid} on {node} after {attempts} attempts")]
    Timeout { node: String, vmid: u32, attempts: u32 },

    #[error("Proxmox API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Environment variable not set: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ProxmoxError {
    /// The guest is still booting; polling may succeed later.
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            ProxmoxError::AgentNotRunning { .. }
                | ProxmoxError::NoInterfaces
                | ProxmoxError::AddressNotAssigned(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ProxmoxError>;
