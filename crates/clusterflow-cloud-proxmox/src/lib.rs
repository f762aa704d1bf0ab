//! Proxmox VE support for clusterflow
//!
//! - Declarations: provider, image downloads, snippets, virtual machines
//! - Cloud-init user data for MicroK8s nodes
//! - Guest-agent address discovery over the Proxmox VE API

pub mod cloud_init;
pub mod error;
pub mod guest_agent;
pub mod provider;
pub mod vm;

pub use cloud_init::{UserData, cloud_config};
pub use error::{ProxmoxError, Result};
pub use guest_agent::{ApiConfig, GuestAgentClient, NetworkInterface, WaitConfig, select_ethernet_ipv4};
pub use provider::{ImageDownload, provider, user_data_snippet};
pub use vm::{BootSource, CloudInit, VmSpec};
