//! Component configuration schema
//!
//! Every struct is closed (`deny_unknown_fields`): a typo in the configuration
//! fails the load instead of being silently ignored.

mod net;
mod secret;
mod stack;

pub use net::{Ipv4Interface, Ipv4Network, offset_address};
pub use secret::{SecretRef, SecretString};
pub use stack::{DEFAULT_PROJECT, StackContext};

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Orchestrator config key holding the Proxmox API token
pub const PROXMOX_API_TOKEN_KEY: &str = "proxmox-api-token";
/// Orchestrator config key holding the Cloudflare global API key
pub const CLOUDFLARE_API_KEY_KEY: &str = "cloudflare-api-key";
/// Orchestrator config key holding the OPNsense API key
pub const OPNSENSE_API_KEY_KEY: &str = "opnsense-api-key";
/// Orchestrator config key holding the OPNsense API secret
pub const OPNSENSE_API_SECRET_KEY: &str = "opnsense-api-secret";

const DEFAULT_CLOUD_IMAGE: &str =
    "https://cloud-images.ubuntu.com/noble/current/noble-server-cloudimg-amd64.img";
const LETSENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";
const LETSENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

fn default_bridge() -> String {
    "vmbr0".to_string()
}

fn default_cloud_image() -> String {
    DEFAULT_CLOUD_IMAGE.to_string()
}

fn default_username() -> String {
    "ubuntu".to_string()
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Root configuration, constructed once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ComponentConfig {
    #[serde(default)]
    pub cert_manager: CertManagerConfig,
    pub cloudflare: CloudflareConfig,
    pub proxmox: ProxmoxConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opnsense: Option<OpnsenseConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub microk8s: Option<MicroK8sConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub talos: Option<TalosConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traefik: Option<ChartVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csi_nfs_driver: Option<ChartVersion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ProxmoxConfig {
    pub api_token: SecretRef,
    pub api_endpoint: String,
    pub node_name: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub insecure: bool,
    #[serde(default = "default_bridge")]
    pub bridge: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct CloudflareConfig {
    pub api_key: SecretRef,
    pub email: String,
    pub zone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct OpnsenseConfig {
    pub api_endpoint: String,
    pub api_key: SecretRef,
    pub api_secret: SecretRef,
    #[serde(default, skip_serializing_if = "is_false")]
    pub insecure: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct CertManagerConfig {
    #[serde(default, skip_serializing_if = "is_false")]
    pub use_staging: bool,
    /// Chart version, used by the chart installation strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl CertManagerConfig {
    /// ACME directory of the issuer.
    pub fn issuer_server(&self) -> &'static str {
        if self.use_staging {
            LETSENCRYPT_STAGING
        } else {
            LETSENCRYPT_PRODUCTION
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ChartVersion {
    pub version: String,
}

/// Disk size in GiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiskConfig {
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct MetallbConfig {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl MetallbConfig {
    /// Address range in MetalLB's `start-end` notation.
    pub fn address_range(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

/// How in-cluster components are enabled on MicroK8s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddonStrategy {
    /// Packaged charts installed through the Kubernetes API
    #[default]
    Chart,
    /// `microk8s enable <addon>` on the node
    Snap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct MicroK8sInstanceConfig {
    pub name: String,
    pub cores: u32,
    pub memory_min: u32,
    pub memory_max: u32,
    pub disks: Vec<DiskConfig>,
    pub address: Ipv4Interface,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct MicroK8sConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,
    #[serde(default = "default_cloud_image")]
    pub cloud_image: String,
    pub ssh_public_key: String,
    pub master_nodes: Vec<MicroK8sInstanceConfig>,
    pub metallb: MetallbConfig,
    /// Snap channel to refresh to, e.g. `1.31/stable`.
    pub version: String,
    #[serde(default)]
    pub addon_strategy: AddonStrategy,
    #[serde(default = "default_username")]
    pub username: String,
    /// 1Password vault that receives a copy of the kubeconfig.
    pub onepassword_vault: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct TalosNodeGroup {
    pub nodes: u32,
    pub cores: u32,
    pub memory_min: u32,
    pub memory_max: u32,
    pub disks: Vec<DiskConfig>,
    pub start_address: Ipv4Addr,
}

impl TalosNodeGroup {
    /// Node addresses, `start-address + index` for each node.
    pub fn addresses(&self) -> Result<Vec<Ipv4Addr>> {
        (0..self.nodes)
            .map(|i| {
                offset_address(self.start_address, i).ok_or_else(|| {
                    ConfigError::invalid(
                        "start-address",
                        format!("{} + {} overflows the IPv4 space", self.start_address, i),
                    )
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct TalosConfig {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,
    pub network: Ipv4Network,
    pub control_plane: TalosNodeGroup,
    pub worker: TalosNodeGroup,
    /// Seconds to wait between the last configuration apply and the bootstrap call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_delay: Option<u64>,
}

/// The cluster flavor selected by the configuration.
#[derive(Debug, Clone, Copy)]
pub enum Flavor<'a> {
    MicroK8s(&'a MicroK8sConfig),
    Talos(&'a TalosConfig),
}

impl Flavor<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Flavor::MicroK8s(_) => "microk8s",
            Flavor::Talos(_) => "talos",
        }
    }
}

impl ComponentConfig {
    pub fn flavor(&self) -> Result<Flavor<'_>> {
        match (&self.microk8s, &self.talos) {
            (Some(microk8s), None) => Ok(Flavor::MicroK8s(microk8s)),
            (None, Some(talos)) => Ok(Flavor::Talos(talos)),
            (Some(_), Some(_)) => Err(ConfigError::invalid(
                "microk8s/talos",
                "only one cluster flavor may be configured",
            )),
            (None, None) => Err(ConfigError::invalid(
                "microk8s/talos",
                "one cluster flavor must be configured",
            )),
        }
    }

    /// Secrets the rendered program reads from the orchestrator's config, by key.
    pub fn secret_refs(&self) -> Vec<(&'static str, &SecretRef)> {
        let mut refs = vec![(PROXMOX_API_TOKEN_KEY, &self.proxmox.api_token)];
        if self.microk8s.is_some() {
            refs.push((CLOUDFLARE_API_KEY_KEY, &self.cloudflare.api_key));
            if let Some(opnsense) = &self.opnsense {
                refs.push((OPNSENSE_API_KEY_KEY, &opnsense.api_key));
                refs.push((OPNSENSE_API_SECRET_KEY, &opnsense.api_secret));
            }
        }
        refs
    }

    /// Semantic checks that the schema alone cannot express.
    pub fn validate(&self) -> Result<()> {
        match self.flavor()? {
            Flavor::MicroK8s(microk8s) => self.validate_microk8s(microk8s),
            Flavor::Talos(talos) => validate_talos(talos),
        }
    }

    fn validate_microk8s(&self, microk8s: &MicroK8sConfig) -> Result<()> {
        if microk8s.master_nodes.is_empty() {
            return Err(ConfigError::invalid(
                "microk8s.master-nodes",
                "at least one master node is required",
            ));
        }
        for (idx, node) in microk8s.master_nodes.iter().enumerate() {
            let field = format!("microk8s.master-nodes[{}]", idx);
            validate_sizing(&field, node.cores, node.memory_min, node.memory_max)?;
            if node.disks.is_empty() {
                return Err(ConfigError::invalid(
                    format!("{}.disks", field),
                    "the boot disk is required",
                ));
            }
            if node.name.trim().is_empty() {
                return Err(ConfigError::invalid(format!("{}.name", field), "must not be empty"));
            }
        }

        let metallb = &microk8s.metallb;
        if u32::from(metallb.start) > u32::from(metallb.end) {
            return Err(ConfigError::invalid(
                "microk8s.metallb",
                format!("start {} is after end {}", metallb.start, metallb.end),
            ));
        }
        if metallb.version.is_none() {
            return Err(ConfigError::invalid(
                "microk8s.metallb.version",
                "a chart version is required",
            ));
        }
        if self.traefik.is_none() {
            return Err(ConfigError::invalid(
                "traefik.version",
                "a chart version is required for the microk8s flavor",
            ));
        }
        if self.csi_nfs_driver.is_none() {
            return Err(ConfigError::invalid(
                "csi-nfs-driver.version",
                "a chart version is required for the microk8s flavor",
            ));
        }
        if microk8s.addon_strategy == AddonStrategy::Chart && self.cert_manager.version.is_none() {
            return Err(ConfigError::invalid(
                "cert-manager.version",
                "a chart version is required when addon-strategy is `chart`",
            ));
        }
        if self.opnsense.is_none() {
            return Err(ConfigError::invalid(
                "opnsense",
                "required to register the ingress host override",
            ));
        }
        Ok(())
    }
}

fn validate_sizing(field: &str, cores: u32, memory_min: u32, memory_max: u32) -> Result<()> {
    if cores == 0 {
        return Err(ConfigError::invalid(format!("{}.cores", field), "must be at least 1"));
    }
    if memory_min > memory_max {
        return Err(ConfigError::invalid(
            format!("{}.memory-min", field),
            format!("{} exceeds memory-max {}", memory_min, memory_max),
        ));
    }
    Ok(())
}

fn validate_talos(talos: &TalosConfig) -> Result<()> {
    if talos.control_plane.nodes == 0 {
        return Err(ConfigError::invalid(
            "talos.control-plane.nodes",
            "at least one control plane node is required",
        ));
    }

    let groups = [
        ("talos.control-plane", &talos.control_plane),
        ("talos.worker", &talos.worker),
    ];
    for (field, group) in groups {
        if group.nodes > 0 {
            validate_sizing(field, group.cores, group.memory_min, group.memory_max)?;
            if group.disks.is_empty() {
                return Err(ConfigError::invalid(
                    format!("{}.disks", field),
                    "the install disk is required",
                ));
            }
        }
        let addresses = group
            .addresses()
            .map_err(|e| ConfigError::invalid(format!("{}.start-address", field), e.to_string()))?;
        if let Some(outside) = addresses.iter().find(|a| !talos.network.contains(**a)) {
            return Err(ConfigError::invalid(
                format!("{}.start-address", field),
                format!("{} is outside {}", outside, talos.network),
            ));
        }
    }

    let control_plane = talos.control_plane.addresses()?;
    let workers = talos.worker.addresses()?;
    if let Some(shared) = control_plane.iter().find(|a| workers.contains(a)) {
        return Err(ConfigError::invalid(
            "talos.worker.start-address",
            format!("{} is also a control plane address", shared),
        ));
    }
    Ok(())
}
