//! Cloudflare support for clusterflow
//!
//! The cluster only needs DNS-01 challenges, so it receives an API token
//! scoped down to reading zones and editing DNS records instead of the
//! account's global key.

use clusterflow_cloud::{Resource, ResourceOptions, ResourceRef};
use clusterflow_config::CloudflareConfig;
use serde_json::json;

pub const PROVIDER_TYPE: &str = "pulumi:providers:cloudflare";
pub const API_TOKEN_TYPE: &str = "cloudflare:index/apiToken:ApiToken";

/// Permission group: Zone Read
pub const ZONE_READ: &str = "c8fed203ed3043cba015a93ad1616f1f";
/// Permission group: DNS Write
pub const DNS_WRITE: &str = "4755a26eedb94da69e1066d98aa820be";

const ALL_ZONES: &str = "com.cloudflare.api.account.zone.*";

/// Provider authenticated with the global API key from secret config.
pub fn provider(name: &str, config: &CloudflareConfig, api_key: &ResourceRef) -> Resource {
    Resource::new(
        name,
        PROVIDER_TYPE,
        json!({
            "apiKey": api_key.reference(),
            "email": config.email,
        }),
    )
}

/// Name of the cert-manager token, e.g. `microk8s-dev-cert-manager`.
pub fn token_name(flavor: &str, stack: &str) -> String {
    format!("{}-{}-cert-manager", flavor, stack)
}

/// API token allowed to read zones and edit DNS records in every zone.
///
/// The token secret is the `value` output.
pub fn scoped_dns_token(name: &str, token_name: &str, provider: &ResourceRef) -> Resource {
    Resource::new(
        name,
        API_TOKEN_TYPE,
        json!({
            "name": token_name,
            "policies": [{
                "effect": "allow",
                "permissionGroups": [ZONE_READ, DNS_WRITE],
                "resources": { ALL_ZONES: "*" },
            }],
        }),
    )
    .with_options(ResourceOptions::default().provider(provider))
}
