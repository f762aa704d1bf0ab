//! Static network configuration of a node

use clusterflow_config::Ipv4Network;
use serde_json::{Value, json};
use std::net::Ipv4Addr;

/// Machine config patch giving the node a fixed address on `network`, with
/// the network's gateway as default route and nameserver.
pub fn network_patch(hostname: &str, address: Ipv4Addr, network: &Ipv4Network) -> Value {
    let gateway = network.gateway().to_string();
    json!({
        "machine": {
            "network": {
                "hostname": hostname,
                "interfaces": [{
                    "deviceSelector": { "physical": true },
                    "addresses": [format!("{}/{}", address, network.prefix_len())],
                    "dhcp": false,
                    "routes": [{
                        "network": "0.0.0.0/0",
                        "gateway": gateway,
                    }],
                }],
                "nameservers": [gateway],
            },
        },
    })
}
