//! Image factory lookups

use clusterflow_cloud::expr;
use clusterflow_cloud::{Resource, ResourceRef};
use serde_json::{Value, json};

pub const SCHEMATIC_TYPE: &str = "talos:imagefactory/schematic:Schematic";
pub const GET_URLS: &str = "talos:imagefactory/getUrls:getUrls";

/// Image customization: the QEMU guest agent, so the hypervisor can report
/// node addresses.
pub const SCHEMATIC: &str = "customization:
  systemExtensions:
    officialExtensions:
      - siderolabs/qemu-guest-agent
";

pub fn schematic(name: &str) -> Resource {
    Resource::new(name, SCHEMATIC_TYPE, json!({ "schematic": SCHEMATIC }))
}

/// Image URLs (`iso`, `installer`, ...) for bare-metal amd64 at `version`.
pub fn image_urls(schematic: &ResourceRef, version: &str) -> Value {
    expr::invoke(
        GET_URLS,
        json!({
            "platform": "metal",
            "architecture": "amd64",
            "talosVersion": version,
            "schematicId": schematic.output("id"),
        }),
        Some("urls"),
    )
}
