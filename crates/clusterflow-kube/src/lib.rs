//! Kubernetes clusters on Proxmox for clusterflow
//!
//! [`build_program`] turns a validated [`ComponentConfig`] into a declarative
//! program for one stack:
//!
//! ```text
//! ComponentConfig ──► secret config keys ──► providers
//!                                              │
//!                       ┌──────────────────────┴───────────────┐
//!                       ▼                                      ▼
//!               microk8s::build                          talos::build
//!        VM ─► kubeconfig ─► add-ons                 images ─► nodes ─► ...
//!                       └──────────────────────┬───────────────┘
//!                                              ▼
//!                                  Program::validate()
//! ```
//!
//! Anything that needs the network (snap versions) is resolved beforehand
//! into [`ResolvedVersions`], so building stays a pure function.

pub mod addons;
pub mod error;
pub mod microk8s;
pub mod provider;
pub mod snap;
pub mod talos;

pub use error::{KubeError, Result};
pub use snap::{SnapIndex, SnapInfo, VersionSource, resolve_version};
pub use talos::{TalosPlan, TalosStage, derive_addresses, network_patch};

use clusterflow_cloud::{Program, ResourceRef};
use clusterflow_cloud_opnsense::OpnsenseSecrets;
use clusterflow_config::{
    CLOUDFLARE_API_KEY_KEY, ComponentConfig, Flavor, OPNSENSE_API_KEY_KEY, OPNSENSE_API_SECRET_KEY,
    PROXMOX_API_TOKEN_KEY, StackContext,
};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Hypervisor provider and the secret its token comes from.
#[derive(Debug, Clone)]
pub struct ProxmoxAccess {
    pub provider: ResourceRef,
    pub api_token: ResourceRef,
}

/// Snap versions by channel, looked up before the program is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedVersions {
    versions: BTreeMap<String, String>,
}

impl ResolvedVersions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: impl Into<String>, version: impl Into<String>) {
        self.versions.insert(channel.into(), version.into());
    }

    pub fn get(&self, channel: &str) -> Option<&str> {
        self.versions.get(channel).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.versions.iter().map(|(c, v)| (c.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    fn require(&self, channel: &str) -> Result<&str> {
        self.get(channel)
            .ok_or_else(|| KubeError::MissingVersion(format!("{} {}", microk8s::SNAP_PACKAGE, channel)))
    }
}

/// Look up every version the configured flavor needs.
pub async fn resolve_versions(config: &ComponentConfig, source: &dyn VersionSource) -> Result<ResolvedVersions> {
    let mut resolved = ResolvedVersions::new();
    if let Flavor::MicroK8s(microk8s) = config.flavor()? {
        for channel in microk8s::channels(microk8s) {
            let version = source
                .latest_version(microk8s::SNAP_PACKAGE, channel, snap::DEFAULT_ARCHITECTURE)
                .await?;
            debug!(channel = %channel, version = %version, "Resolved snap version");
            resolved.insert(channel, version);
        }
    }
    Ok(resolved)
}

/// Build and validate the program for one stack.
pub fn build_program(config: &ComponentConfig, stack: &StackContext, versions: &ResolvedVersions) -> Result<Program> {
    config.validate()?;
    let flavor = config.flavor()?;
    info!(flavor = flavor.name(), stack = %stack.stack, "Building program");

    let mut program = Program::new(
        stack.project.clone(),
        format!("{} cluster on Proxmox ({})", flavor.name(), stack.stack),
    );

    let api_token = program.declare_secret(PROXMOX_API_TOKEN_KEY)?;
    let proxmox = ProxmoxAccess {
        provider: program.add_resource(clusterflow_cloud_proxmox::provider(
            "proxmox",
            &config.proxmox,
            &api_token,
        ))?,
        api_token,
    };

    match flavor {
        Flavor::MicroK8s(microk8s) => {
            let cloudflare_key = program.declare_secret(CLOUDFLARE_API_KEY_KEY)?;
            let cloudflare = program.add_resource(clusterflow_cloud_cloudflare::provider(
                "cloudflare",
                &config.cloudflare,
                &cloudflare_key,
            ))?;
            let opnsense = match &config.opnsense {
                Some(_) => Some(OpnsenseSecrets {
                    api_key: program.declare_secret(OPNSENSE_API_KEY_KEY)?,
                    api_secret: program.declare_secret(OPNSENSE_API_SECRET_KEY)?,
                }),
                None => None,
            };
            let access = microk8s::MicroK8sAccess {
                proxmox: &proxmox,
                cloudflare,
                opnsense,
            };
            microk8s::build(&mut program, config, microk8s, stack, &access, versions)?;
        }
        Flavor::Talos(talos) => {
            let plan = talos::build(&mut program, talos, &config.proxmox, stack, &proxmox)?;
            debug!(declarations = plan.entries().len(), "Talos stages declared");
        }
    }

    program.validate()?;
    Ok(program)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use clusterflow_config::{ComponentConfig, load_from_str};

    pub(crate) const MICROK8S: &str = r#"
cert-manager:
  version: v1.16.2
cloudflare:
  api-key: op://Pulumi/cloudflare/credential
  email: admin@example.com
  zone: example.com
proxmox:
  api-token: op://Pulumi/proxmox/credential
  api-endpoint: https://pve.example.com:8006/
  node-name: pve
opnsense:
  api-endpoint: https://opnsense.example.com
  api-key: op://Pulumi/opnsense/username
  api-secret: op://Pulumi/opnsense/credential
traefik:
  version: 33.2.1
csi-nfs-driver:
  version: v4.9.0
microk8s:
  ssh-public-key: ssh-ed25519 AAAAC3Nza admin
  version: 1.32/stable
  onepassword-vault: Pulumi
  master-nodes:
    - name: k8s-master-0
      cores: 4
      memory-min: 4096
      memory-max: 8192
      disks:
        - size: 32
        - size: 100
      address: 10.0.0.20/24
  metallb:
    start: 10.0.0.100
    end: 10.0.0.110
    version: 0.14.9
"#;

    pub(crate) const TALOS: &str = r#"
cloudflare:
  api-key: op://Pulumi/cloudflare/credential
  email: admin@example.com
  zone: example.com
proxmox:
  api-token: op://Pulumi/proxmox/credential
  api-endpoint: https://pve.example.com:8006/
  node-name: pve
talos:
  version: v1.9.2
  vlan: 30
  network: 10.0.1.0/24
  bootstrap-delay: 30
  control-plane:
    nodes: 3
    cores: 2
    memory-min: 2048
    memory-max: 4096
    disks:
      - size: 20
    start-address: 10.0.1.10
  worker:
    nodes: 2
    cores: 4
    memory-min: 4096
    memory-max: 8192
    disks:
      - size: 20
      - size: 200
    start-address: 10.0.1.20
"#;

    pub(crate) fn load(yaml: &str) -> ComponentConfig {
        load_from_str(yaml).unwrap()
    }
}
