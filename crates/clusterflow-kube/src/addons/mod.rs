//! In-cluster components installed on top of a running cluster

mod certmanager;
mod csi_nfs;
mod metallb;
mod traefik;

pub use certmanager::{ISSUER_NAME, cert_manager};
pub use csi_nfs::{csi_nfs, kubelet_dir};
pub use metallb::metallb;
pub use traefik::{INGRESS_SERVICE, ingress_host, traefik};

use clusterflow_cloud::{Connection, ResourceRef};
use serde_json::Value;

/// What every add-on needs to reach the cluster.
#[derive(Debug, Clone)]
pub struct ClusterAccess {
    /// Kubeconfig expression, reused by namespaced providers
    pub kubeconfig: Value,
    /// Cluster-wide provider
    pub provider: ResourceRef,
    /// SSH access to a node, for add-ons enabled through the node's tooling
    pub node: Option<Connection>,
}
