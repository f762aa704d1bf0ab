//! Single-node MicroK8s cluster on Proxmox

use crate::addons::{self, ClusterAccess};
use crate::error::Result;
use crate::provider::kube_provider;
use crate::{ProxmoxAccess, ResolvedVersions};
use clusterflow_cloud::{CommandSpec, Connection, Logging, Program, Resource, ResourceOptions, ResourceRef};
use clusterflow_cloud_cloudflare::token_name;
use clusterflow_cloud_opnsense::OpnsenseSecrets;
use clusterflow_cloud_proxmox::{BootSource, CloudInit, ImageDownload, VmSpec, cloud_config, user_data_snippet};
use clusterflow_config::{ComponentConfig, ConfigError, Flavor, MicroK8sConfig, StackContext};
use serde_json::json;
use tracing::info;

pub const SNAP_PACKAGE: &str = "microk8s";

/// Channel whose current version is exported for reference.
pub const REFERENCE_CHANNEL: &str = "1.31/stable";

pub const ITEM_TYPE: &str = "onepassword:index/item:Item";

/// Providers and secrets declared before the flow runs.
pub struct MicroK8sAccess<'a> {
    pub proxmox: &'a ProxmoxAccess,
    pub cloudflare: ResourceRef,
    pub opnsense: Option<OpnsenseSecrets>,
}

/// Declare the master VM, fetch its kubeconfig and install the add-ons.
pub fn build(
    program: &mut Program,
    config: &ComponentConfig,
    microk8s: &MicroK8sConfig,
    stack: &StackContext,
    access: &MicroK8sAccess<'_>,
    versions: &ResolvedVersions,
) -> Result<()> {
    let proxmox = &config.proxmox;
    let provider = &access.proxmox.provider;
    let node = microk8s
        .master_nodes
        .first()
        .ok_or_else(|| ConfigError::invalid("microk8s.master-nodes", "at least one master node is required"))?;
    info!(node = %node.name, "Declaring MicroK8s cluster");

    let image = program.add_resource(
        ImageDownload::new(&proxmox.node_name, microk8s.cloud_image.as_str())
            .overwrite_unmanaged()
            .to_resource(
                "cloud-image",
                provider,
                ResourceOptions::default().retain_on_delete(),
            ),
    )?;

    let user_data = cloud_config(&node.name, &microk8s.username, &microk8s.ssh_public_key)?;
    let snippet = program.add_resource(user_data_snippet("cloud-config", &proxmox.node_name, &user_data, provider))?;

    let vm = VmSpec {
        name: node.name.clone(),
        node_name: proxmox.node_name.clone(),
        description: Some("MicroK8s Master".to_string()),
        cores: node.cores,
        memory_min: node.memory_min,
        memory_max: node.memory_max,
        disks: node.disks.clone(),
        datastore_id: None,
        bridge: proxmox.bridge.clone(),
        vlan: microk8s.vlan,
        tags: vec![stack.scoped("microk8s")],
        boot: BootSource::CloudImage {
            file_id: image.output("id"),
        },
        cloud_init: Some(CloudInit {
            address: node.address,
            user_data_file_id: snippet.output("id"),
        }),
        on_boot: stack.is_prod(),
        protection: stack.is_prod(),
    };
    let vm = program.add_resource(vm.to_resource(provider))?;

    // First address of the first non-loopback interface reported by the agent.
    let connection = Connection::new(vm.output("ipv4Addresses[1][0]"), microk8s.username.clone());

    let kube_config = program.add_resource(
        CommandSpec::new("microk8s config")
            .logging(Logging::Stderr)
            .remote(&format!("{}-kube-config", node.name), &connection)
            .with_options(ResourceOptions::default().secret_output("stdout")),
    )?;
    let kubeconfig = kube_config.output("stdout");

    let cluster = ClusterAccess {
        kubeconfig: json!(kubeconfig),
        provider: program.add_resource(kube_provider("microk8s", kubeconfig.clone(), None))?,
        node: Some(connection.clone()),
    };

    let target_version = versions.require(&microk8s.version)?;
    program.add_resource(
        CommandSpec::new(format!("sudo snap refresh microk8s --channel {}", microk8s.version))
            .trigger(target_version)
            .remote(&format!("{}-upgrade", node.name), &connection),
    )?;

    addons::metallb(program, &cluster, &microk8s.metallb)?;

    program.add_resource(
        CommandSpec::new("microk8s enable hostpath-storage")
            .delete("microk8s disable hostpath-storage")
            .remote(&format!("{}-storage", node.name), &connection),
    )?;

    let flavor = Flavor::MicroK8s(microk8s);
    if let Some(chart) = &config.csi_nfs_driver {
        addons::csi_nfs(program, &cluster, chart, addons::kubelet_dir(&flavor))?;
    }

    let issuer = addons::cert_manager(
        program,
        &cluster,
        &config.cert_manager,
        microk8s.addon_strategy,
        &access.cloudflare,
        &config.cloudflare.email,
        &token_name(flavor.name(), &stack.stack),
    )?;

    let traefik = config
        .traefik
        .as_ref()
        .ok_or_else(|| ConfigError::invalid("traefik.version", "a chart version is required"))?;
    let dns = match (&config.opnsense, &access.opnsense) {
        (Some(opnsense), Some(secrets)) => Some((opnsense, secrets)),
        _ => None,
    };
    addons::traefik(
        program,
        &cluster,
        traefik,
        &issuer,
        &config.cloudflare.zone,
        stack,
        dns,
    )?;

    program.export_secret("kubeconfig", kubeconfig.clone())?;
    program.export("microk8s-version", versions.require(REFERENCE_CHANNEL)?)?;
    program.export("microk8s-target-version", target_version)?;

    program.add_resource(Resource::new(
        "kubeconfig-item",
        ITEM_TYPE,
        json!({
            "title": format!("Kubeconfig {}", stack.stack),
            "vault": microk8s.onepassword_vault,
            "password": kubeconfig,
        }),
    ))?;

    Ok(())
}

/// Snap channels the flow needs versions for.
pub fn channels(microk8s: &MicroK8sConfig) -> Vec<&str> {
    let mut channels = vec![REFERENCE_CHANNEL, microk8s.version.as_str()];
    channels.dedup();
    channels
}
