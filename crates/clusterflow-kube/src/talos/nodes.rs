//! Node virtual machines and their discovered addresses

use clusterflow_cloud::{CLI_BINARY, CommandSpec, Logging, Resource, ResourceRef};
use clusterflow_cloud_proxmox::{BootSource, VmSpec};
use clusterflow_config::{ProxmoxConfig, TalosNodeGroup};

const DATASTORE: &str = "local-lvm";

/// VM for one node of a group, booting the installer ISO.
pub fn node_vm(
    name: &str,
    group: &TalosNodeGroup,
    proxmox: &ProxmoxConfig,
    vlan: Option<u16>,
    tag: &str,
    iso: &ResourceRef,
) -> VmSpec {
    VmSpec {
        name: name.to_string(),
        node_name: proxmox.node_name.clone(),
        description: None,
        cores: group.cores,
        memory_min: group.memory_min,
        memory_max: group.memory_max,
        disks: group.disks.clone(),
        datastore_id: Some(DATASTORE.to_string()),
        bridge: proxmox.bridge.clone(),
        vlan,
        tags: vec![tag.to_string()],
        boot: BootSource::Iso {
            file_id: iso.output("id"),
        },
        cloud_init: None,
        on_boot: false,
        protection: false,
    }
}

/// Step that waits for the VM's guest agent and records its ethernet IPv4
/// as `stdout`. A new VM id re-runs it.
pub fn node_ip_command(name: &str, vm: &ResourceRef, proxmox: &ProxmoxConfig, api_token: &ResourceRef) -> Resource {
    let vmid = vm.output("vmId");
    CommandSpec::new(format!(
        "{} node-ip --node {} --vmid \"$VMID\"",
        CLI_BINARY, proxmox.node_name
    ))
    .env("PROXMOX_VE_ENDPOINT", proxmox.api_endpoint.clone())
    .env("PROXMOX_VE_API_TOKEN", api_token.reference())
    .env("PROXMOX_VE_INSECURE", proxmox.insecure.to_string())
    .env("VMID", vmid.clone())
    .trigger(vmid)
    .logging(Logging::Stderr)
    .local(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterflow_config::{DiskConfig, SecretRef};

    fn proxmox() -> ProxmoxConfig {
        ProxmoxConfig {
            api_token: SecretRef::parse("op://Pulumi/proxmox/credential").unwrap(),
            api_endpoint: "https://pve.example.com:8006/".to_string(),
            node_name: "pve".to_string(),
            insecure: false,
            bridge: "vmbr0".to_string(),
        }
    }

    #[test]
    fn test_node_vm() {
        let group = TalosNodeGroup {
            nodes: 2,
            cores: 4,
            memory_min: 4096,
            memory_max: 8192,
            disks: vec![DiskConfig { size: 20 }, DiskConfig { size: 100 }],
            start_address: "10.0.1.20".parse().unwrap(),
        };
        let vm = node_vm(
            "talos-worker-1",
            &group,
            &proxmox(),
            Some(30),
            "talos-dev",
            &ResourceRef::new("talos-iso"),
        );
        assert_eq!(vm.datastore_id.as_deref(), Some("local-lvm"));
        assert_eq!(vm.boot, BootSource::Iso { file_id: "${talos-iso.id}".to_string() });
        assert_eq!(vm.tags, vec!["talos-dev"]);
        assert_eq!(vm.disks.len(), 2);
    }

    #[test]
    fn test_node_ip_command() {
        let command = node_ip_command(
            "talos-worker-0-ip",
            &ResourceRef::new("talos-worker-0"),
            &proxmox(),
            &ResourceRef::new("proxmox-api-token"),
        );
        assert_eq!(command.properties["create"], "cflow node-ip --node pve --vmid \"$VMID\"");
        let env = &command.properties["environment"];
        assert_eq!(env["VMID"], "${talos-worker-0.vmId}");
        assert_eq!(env["PROXMOX_VE_API_TOKEN"], "${proxmox-api-token}");
        assert_eq!(env["PROXMOX_VE_INSECURE"], "false");
        assert!(command.properties.get("delete").is_none());
        assert_eq!(command.references(), vec!["proxmox-api-token", "talos-worker-0"]);
    }
}
