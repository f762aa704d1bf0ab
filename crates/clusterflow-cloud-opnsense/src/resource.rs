//! Host override declaration
//!
//! There is no provider package for OPNsense, so the override is a local
//! command that calls back into `cflow dns`. Credentials reach the command
//! through its environment, taken from secret config.

use clusterflow_cloud::{CLI_BINARY, CommandSpec, Resource, ResourceOptions, ResourceRef};
use clusterflow_config::OpnsenseConfig;
use serde_json::Value;

/// Secret config entries holding the API key pair.
#[derive(Debug, Clone)]
pub struct OpnsenseSecrets {
    pub api_key: ResourceRef,
    pub api_secret: ResourceRef,
}

/// Declare an A record `host`.`domain` pointing at `ip`, which is usually an
/// interpolation of another resource's output.
///
/// A changed address replaces the command. The old record is removed before
/// the new one is written, otherwise the delete would wipe the fresh record.
pub fn host_override_resource(
    name: &str,
    host: &str,
    domain: &str,
    ip: impl Into<Value>,
    config: &OpnsenseConfig,
    secrets: &OpnsenseSecrets,
) -> Resource {
    let ip = ip.into();
    CommandSpec::new(format!(
        "{} dns ensure --host {} --domain {} --ip \"$IP\"",
        CLI_BINARY, host, domain
    ))
    .delete(format!("{} dns remove --host {} --domain {}", CLI_BINARY, host, domain))
    .env("OPNSENSE_URL", config.api_endpoint.clone())
    .env("OPNSENSE_API_KEY", secrets.api_key.reference())
    .env("OPNSENSE_API_SECRET", secrets.api_secret.reference())
    .env("OPNSENSE_INSECURE", config.insecure.to_string())
    .env("IP", ip.clone())
    .trigger(ip)
    .local(name)
    .with_options(ResourceOptions::default().delete_before_replace())
}
