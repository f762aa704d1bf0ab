//! OPNsense support for clusterflow
//!
//! Keeps an Unbound host override pointing at the cluster's ingress address.
//! [`client`] speaks the OPNsense API; [`resource`] declares the override as a
//! program step that runs the client through the CLI.

pub mod client;
pub mod error;
pub mod resource;

pub use client::{EnsureOutcome, HostOverride, HostOverrideRecord, OpnsenseClient, OpnsenseCredentials, RecordType};
pub use error::{OpnsenseError, Result};
pub use resource::{OpnsenseSecrets, host_override_resource};
