//! Talos cluster on Proxmox
//!
//! Bringing up a Talos cluster is a fixed sequence: the installer image must
//! exist before the VMs boot it, machine configuration needs the cluster
//! secrets, and the cluster can only be bootstrapped once every node runs its
//! configuration. [`TalosStage`] names these steps. The builder declares
//! everything of one stage before moving to the next and remembers which
//! stage declared what, so the sequence can be checked after the fact.

pub mod image;
pub mod machine;
pub mod network;
pub mod nodes;

pub use network::network_patch;

use crate::ProxmoxAccess;
use crate::error::{KubeError, Result};
use clusterflow_cloud::{Program, Resource, ResourceOptions, ResourceRef, delay};
use clusterflow_cloud_proxmox::ImageDownload;
use clusterflow_config::{ConfigError, ProxmoxConfig, StackContext, TalosConfig, TalosNodeGroup, offset_address};
use machine::{ConfigurationApply, MachineType};
use serde_json::Value;
use std::fmt;
use std::net::Ipv4Addr;
use tracing::{debug, info};

/// Steps of a Talos cluster bring-up, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TalosStage {
    ImagesReady,
    NodesCreated,
    SecretsGenerated,
    MachineConfigsRendered,
    ConfigsApplied,
    ClusterBootstrapped,
    KubeconfigAvailable,
}

impl TalosStage {
    pub const FIRST: TalosStage = TalosStage::ImagesReady;

    pub fn next(&self) -> Option<TalosStage> {
        match self {
            TalosStage::ImagesReady => Some(TalosStage::NodesCreated),
            TalosStage::NodesCreated => Some(TalosStage::SecretsGenerated),
            TalosStage::SecretsGenerated => Some(TalosStage::MachineConfigsRendered),
            TalosStage::MachineConfigsRendered => Some(TalosStage::ConfigsApplied),
            TalosStage::ConfigsApplied => Some(TalosStage::ClusterBootstrapped),
            TalosStage::ClusterBootstrapped => Some(TalosStage::KubeconfigAvailable),
            TalosStage::KubeconfigAvailable => None,
        }
    }
}

impl fmt::Display for TalosStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TalosStage::ImagesReady => "images-ready",
            TalosStage::NodesCreated => "nodes-created",
            TalosStage::SecretsGenerated => "secrets-generated",
            TalosStage::MachineConfigsRendered => "machine-configs-rendered",
            TalosStage::ConfigsApplied => "configs-applied",
            TalosStage::ClusterBootstrapped => "cluster-bootstrapped",
            TalosStage::KubeconfigAvailable => "kubeconfig-available",
        };
        write!(f, "{}", name)
    }
}

/// Which stage declared each resource and variable, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct TalosPlan {
    entries: Vec<(String, TalosStage)>,
}

impl TalosPlan {
    pub fn stage_of(&self, name: &str) -> Option<TalosStage> {
        self.entries
            .iter()
            .find(|(declared, _)| declared == name)
            .map(|(_, stage)| *stage)
    }

    pub fn declared_in(&self, stage: TalosStage) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, s)| *s == stage)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn entries(&self) -> &[(String, TalosStage)] {
        &self.entries
    }
}

/// `start + i` for `i` in `0..count`.
pub fn derive_addresses(start: Ipv4Addr, count: u32) -> Result<Vec<Ipv4Addr>> {
    (0..count)
        .map(|i| {
            offset_address(start, i).ok_or_else(|| {
                KubeError::from(ConfigError::invalid(
                    "start-address",
                    format!("{} + {} overflows the IPv4 space", start, i),
                ))
            })
        })
        .collect()
}

struct StageRecorder<'a> {
    program: &'a mut Program,
    plan: TalosPlan,
    stage: TalosStage,
}

impl StageRecorder<'_> {
    fn resource(&mut self, resource: Resource) -> Result<ResourceRef> {
        let handle = self.program.add_resource(resource)?;
        self.plan.entries.push((handle.name().to_string(), self.stage));
        Ok(handle)
    }

    fn variable(&mut self, name: &str, value: Value) -> Result<ResourceRef> {
        let handle = self.program.add_variable(name, value)?;
        self.plan.entries.push((name.to_string(), self.stage));
        Ok(handle)
    }

    fn advance(&mut self) {
        if let Some(next) = self.stage.next() {
            debug!(from = %self.stage, to = %next, "Talos stage");
            self.stage = next;
        }
    }
}

/// Settings shared by every node VM.
struct NodeDefaults<'a> {
    proxmox: &'a ProxmoxConfig,
    access: &'a ProxmoxAccess,
    vlan: Option<u16>,
    tag: String,
    iso: ResourceRef,
}

struct Node {
    name: String,
    address: Ipv4Addr,
    ip: ResourceRef,
}

fn declare_nodes(
    recorder: &mut StageRecorder<'_>,
    prefix: &str,
    group: &TalosNodeGroup,
    defaults: &NodeDefaults<'_>,
) -> Result<Vec<Node>> {
    let addresses = derive_addresses(group.start_address, group.nodes)?;
    let mut declared = Vec::with_capacity(addresses.len());
    for (idx, address) in addresses.into_iter().enumerate() {
        let name = format!("{}-{}", prefix, idx);
        let vm = nodes::node_vm(
            &name,
            group,
            defaults.proxmox,
            defaults.vlan,
            &defaults.tag,
            &defaults.iso,
        );
        let vm = recorder.resource(vm.to_resource(&defaults.access.provider))?;
        let ip = recorder.resource(nodes::node_ip_command(
            &format!("{}-ip", name),
            &vm,
            defaults.proxmox,
            &defaults.access.api_token,
        ))?;
        declared.push(Node { name, address, ip });
    }
    Ok(declared)
}

/// Declare the Talos cluster. Control-plane nodes are rebooted into their
/// configuration; workers use the provider's default apply mode.
pub fn build(
    program: &mut Program,
    talos: &TalosConfig,
    proxmox: &ProxmoxConfig,
    stack: &StackContext,
    access: &ProxmoxAccess,
) -> Result<TalosPlan> {
    let mut recorder = StageRecorder {
        program,
        plan: TalosPlan::default(),
        stage: TalosStage::FIRST,
    };
    let cluster_name = stack.scoped("talos");
    info!(cluster = %cluster_name, "Declaring Talos cluster");

    // Images
    let schematic = recorder.resource(image::schematic("talos-schematic"))?;
    let urls = recorder.variable("talos-urls", image::image_urls(&schematic, &talos.version))?;
    let iso_url = urls.output("iso");
    let installer = urls.output("installer");
    recorder.program.export("iso", iso_url.clone())?;
    recorder.program.export("installer", installer.clone())?;
    recorder.advance();

    // Nodes
    let iso = recorder.resource(
        ImageDownload::new(&proxmox.node_name, iso_url)
            .file_name(format!("talos-{}-{}.iso", talos.version, stack.stack))
            .to_resource(
                "talos-iso",
                &access.provider,
                ResourceOptions::default().delete_before_replace(),
            ),
    )?;
    let defaults = NodeDefaults {
        proxmox,
        access,
        vlan: talos.vlan,
        tag: stack.scoped("talos"),
        iso,
    };
    let control_plane = declare_nodes(&mut recorder, "talos-control-plane", &talos.control_plane, &defaults)?;
    let workers = declare_nodes(&mut recorder, "talos-worker", &talos.worker, &defaults)?;
    recorder.advance();

    // Secrets
    let secrets = recorder.resource(machine::secrets("talos-secrets"))?;
    recorder.advance();

    // Render
    let first_control_plane = control_plane
        .first()
        .map(|n| n.address)
        .ok_or_else(|| ConfigError::invalid("talos.control-plane.nodes", "at least one control plane node is required"))?;
    let endpoint = format!("https://{}:6443", first_control_plane);
    let control_plane_config = recorder.variable(
        "control-plane-machine-config",
        machine::machine_configuration(
            &cluster_name,
            MachineType::ControlPlane,
            &endpoint,
            &secrets,
            machine::control_plane_patch(&installer),
        ),
    )?;
    let worker_config = recorder.variable(
        "worker-machine-config",
        machine::machine_configuration(
            &cluster_name,
            MachineType::Worker,
            &endpoint,
            &secrets,
            machine::worker_patch(&installer),
        ),
    )?;
    let endpoints: Vec<String> = control_plane.iter().map(|n| n.address.to_string()).collect();
    let worker_nodes: Vec<String> = workers.iter().map(|n| n.address.to_string()).collect();
    let client_config = recorder.variable(
        "talos-client-config",
        machine::client_configuration(&cluster_name, &secrets, &endpoints, &worker_nodes),
    )?;
    recorder.program.export_secret("talos-config", client_config.reference())?;
    recorder
        .program
        .export_secret("control-plane-config", control_plane_config.reference())?;
    recorder.advance();

    // Apply
    let groups = [
        (&control_plane, &control_plane_config, Some("reboot")),
        (&workers, &worker_config, None),
    ];
    let mut applied = Vec::new();
    for (group, configuration, apply_mode) in groups {
        for node in group.iter() {
            let apply = ConfigurationApply {
                configuration: configuration.reference(),
                patch: network_patch(&node.name, node.address, &talos.network),
                node: node.ip.output("stdout"),
                apply_mode,
            };
            applied.push(recorder.resource(apply.to_resource(&format!("{}-config", node.name), &secrets))?);
        }
    }
    recorder.advance();

    // Bootstrap
    let mut bootstrap_options = ResourceOptions::default().depends_on_all(&applied);
    if let Some(seconds) = talos.bootstrap_delay {
        let wait = recorder.resource(
            delay("bootstrap-delay", seconds).with_options(ResourceOptions::default().depends_on_all(&applied)),
        )?;
        bootstrap_options = bootstrap_options.depends_on(&wait);
    }
    let bootstrap = recorder.resource(machine::bootstrap(
        "bootstrap",
        &first_control_plane.to_string(),
        &secrets,
        bootstrap_options,
    ))?;
    recorder.advance();

    // Kubeconfig
    let kubeconfig = recorder.variable("talos-kubeconfig", machine::kubeconfig(&bootstrap, &secrets))?;
    recorder.program.export_secret("kubeconfig", kubeconfig.reference())?;

    Ok(recorder.plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_stage_sequence() {
        let mut stages = vec![TalosStage::FIRST];
        while let Some(next) = stages.last().and_then(|s| s.next()) {
            stages.push(next);
        }
        assert_eq!(stages.len(), 7);
        assert_eq!(stages.last(), Some(&TalosStage::KubeconfigAvailable));
        assert!(stages.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(TalosStage::ConfigsApplied.to_string(), "configs-applied");
    }

    #[test]
    fn test_derive_addresses() {
        let addresses = derive_addresses("10.0.1.10".parse().unwrap(), 3).unwrap();
        assert_eq!(
            addresses,
            vec![
                "10.0.1.10".parse::<Ipv4Addr>().unwrap(),
                "10.0.1.11".parse().unwrap(),
                "10.0.1.12".parse().unwrap(),
            ]
        );
        assert!(derive_addresses("10.0.1.10".parse().unwrap(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_derive_addresses_overflow() {
        assert!(derive_addresses(Ipv4Addr::new(255, 255, 255, 254), 3).is_err());
        assert_eq!(derive_addresses(Ipv4Addr::new(255, 255, 255, 254), 2).unwrap().len(), 2);
    }

    proptest! {
        #[test]
        fn prop_derived_addresses_are_consecutive(start in any::<u32>(), count in 0u32..64) {
            let result = derive_addresses(Ipv4Addr::from(start), count);
            let fits = u64::from(start) + u64::from(count) <= u64::from(u32::MAX) + 1;
            prop_assert_eq!(result.is_ok(), fits);
            if let Ok(addresses) = result {
                prop_assert_eq!(addresses.len() as u32, count);
                for (i, address) in addresses.iter().enumerate() {
                    prop_assert_eq!(u32::from(*address), start + i as u32);
                }
            }
        }
    }
}
