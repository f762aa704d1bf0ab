//! Machine secrets, configuration and lifecycle

use clusterflow_cloud::expr;
use clusterflow_cloud::{Resource, ResourceOptions, ResourceRef};
use serde_json::{Value, json};

pub const SECRETS_TYPE: &str = "talos:machine/secrets:Secrets";
pub const CONFIGURATION_APPLY_TYPE: &str = "talos:machine/configurationApply:ConfigurationApply";
pub const BOOTSTRAP_TYPE: &str = "talos:machine/bootstrap:Bootstrap";
pub const GET_MACHINE_CONFIGURATION: &str = "talos:machine/getConfiguration:getConfiguration";
pub const GET_CLIENT_CONFIGURATION: &str = "talos:client/getConfiguration:getConfiguration";
pub const GET_KUBECONFIG: &str = "talos:cluster/getKubeconfig:getKubeconfig";

/// Directory the worker data disk is mounted at.
pub const DATA_MOUNTPOINT: &str = "/var/mnt/data";
/// Node label marking workers that carry a data volume.
pub const LABEL_DATA_VOLUME: &str = "tobiash.net/data-volume";

const INSTALL_DISK: &str = "/dev/vda";
const DATA_DISK: &str = "/dev/vdb";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineType {
    ControlPlane,
    Worker,
}

impl MachineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineType::ControlPlane => "controlplane",
            MachineType::Worker => "worker",
        }
    }
}

pub fn secrets(name: &str) -> Resource {
    Resource::new(name, SECRETS_TYPE, json!({}))
}

/// Control-plane patch: install target, and PodSecurity warnings at the
/// enforced level.
pub fn control_plane_patch(installer: &str) -> Value {
    json!({
        "machine": {
            "install": { "image": installer, "disk": INSTALL_DISK },
        },
        "cluster": {
            "apiServer": {
                "admissionControl": [{
                    "name": "PodSecurity",
                    "configuration": {
                        "defaults": { "warn": "baseline" },
                    },
                }],
            },
        },
    })
}

/// Worker patch: install target plus the data disk, bind-mounted into the
/// kubelet so local volumes can be defined on it.
pub fn worker_patch(installer: &str) -> Value {
    json!({
        "machine": {
            "install": { "image": installer, "disk": INSTALL_DISK },
            "disks": [{
                "device": DATA_DISK,
                "partitions": [{ "mountpoint": DATA_MOUNTPOINT }],
            }],
            "kubelet": {
                "extraMounts": [{
                    "source": DATA_MOUNTPOINT,
                    "destination": DATA_MOUNTPOINT,
                    "type": "bind",
                    "options": ["bind", "rshared", "rw"],
                }],
            },
            "nodeLabels": { LABEL_DATA_VOLUME: "true" },
        },
    })
}

/// Rendered machine configuration for one machine type.
pub fn machine_configuration(
    cluster_name: &str,
    machine_type: MachineType,
    endpoint: &str,
    secrets: &ResourceRef,
    patch: Value,
) -> Value {
    expr::invoke(
        GET_MACHINE_CONFIGURATION,
        json!({
            "clusterName": cluster_name,
            "machineType": machine_type.as_str(),
            "clusterEndpoint": endpoint,
            "machineSecrets": secrets.output("machineSecrets"),
            "configPatches": [expr::to_json(patch)],
        }),
        Some("machineConfiguration"),
    )
}

/// `talosctl` client configuration.
pub fn client_configuration(cluster_name: &str, secrets: &ResourceRef, endpoints: &[String], nodes: &[String]) -> Value {
    expr::invoke(
        GET_CLIENT_CONFIGURATION,
        json!({
            "clientConfiguration": secrets.output("clientConfiguration"),
            "clusterName": cluster_name,
            "endpoints": endpoints,
            "nodes": nodes,
        }),
        Some("talosConfig"),
    )
}

/// One node's configuration, applied to the address the node currently has.
#[derive(Debug, Clone)]
pub struct ConfigurationApply {
    /// Reference to the rendered machine configuration
    pub configuration: String,
    /// Node-specific patch
    pub patch: Value,
    /// Address the node is reachable at before the patch is applied
    pub node: String,
    /// Apply mode; the provider default when unset
    pub apply_mode: Option<&'static str>,
}

impl ConfigurationApply {
    pub fn to_resource(&self, name: &str, secrets: &ResourceRef) -> Resource {
        let mut props = json!({
            "clientConfiguration": secrets.output("clientConfiguration"),
            "machineConfigurationInput": self.configuration,
            "configPatches": [expr::to_json(self.patch.clone())],
            "node": self.node,
        });
        if let Some(mode) = self.apply_mode {
            props["applyMode"] = json!(mode);
        }
        Resource::new(name, CONFIGURATION_APPLY_TYPE, props)
    }
}

pub fn bootstrap(name: &str, node: &str, secrets: &ResourceRef, options: ResourceOptions) -> Resource {
    Resource::new(
        name,
        BOOTSTRAP_TYPE,
        json!({
            "node": node,
            "clientConfiguration": secrets.output("clientConfiguration"),
        }),
    )
    .with_options(options)
}

/// Admin kubeconfig. Reading the node from the bootstrap step keeps the
/// lookup from running before the cluster exists.
pub fn kubeconfig(bootstrap: &ResourceRef, secrets: &ResourceRef) -> Value {
    expr::invoke(
        GET_KUBECONFIG,
        json!({
            "clientConfiguration": secrets.output("clientConfiguration"),
            "node": bootstrap.output("node"),
        }),
        Some("kubeconfigRaw"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_patch() {
        let patch = worker_patch("${talos-urls.installer}");
        let machine = &patch["machine"];
        assert_eq!(machine["install"]["disk"], "/dev/vda");
        assert_eq!(machine["disks"][0]["device"], "/dev/vdb");
        assert_eq!(machine["disks"][0]["partitions"][0]["mountpoint"], "/var/mnt/data");
        assert_eq!(
            machine["kubelet"]["extraMounts"][0]["options"],
            json!(["bind", "rshared", "rw"])
        );
        assert_eq!(machine["nodeLabels"]["tobiash.net/data-volume"], "true");
    }

    #[test]
    fn test_control_plane_patch() {
        let patch = control_plane_patch("${talos-urls.installer}");
        assert_eq!(patch["machine"]["install"]["image"], "${talos-urls.installer}");
        let admission = &patch["cluster"]["apiServer"]["admissionControl"][0];
        assert_eq!(admission["name"], "PodSecurity");
        assert_eq!(admission["configuration"]["defaults"]["warn"], "baseline");
        assert!(patch["machine"].get("disks").is_none());
    }

    #[test]
    fn test_machine_configuration_invoke() {
        let config = machine_configuration(
            "talos-dev",
            MachineType::Worker,
            "https://10.0.1.10:6443",
            &ResourceRef::new("talos-secrets"),
            json!({}),
        );
        let call = &config["fn::invoke"];
        assert_eq!(call["arguments"]["machineType"], "worker");
        assert_eq!(call["arguments"]["machineSecrets"], "${talos-secrets.machineSecrets}");
        assert_eq!(call["arguments"]["configPatches"][0], json!({"fn::toJSON": {}}));
        assert_eq!(call["return"], "machineConfiguration");
    }

    #[test]
    fn test_apply_mode_is_optional() {
        let secrets = ResourceRef::new("talos-secrets");
        let mut apply = ConfigurationApply {
            configuration: "${worker-machine-config}".to_string(),
            patch: json!({}),
            node: "${talos-worker-0-ip.stdout}".to_string(),
            apply_mode: None,
        };
        let worker = apply.to_resource("talos-worker-0-config", &secrets);
        assert!(worker.properties.get("applyMode").is_none());

        apply.apply_mode = Some("reboot");
        let control = apply.to_resource("talos-control-plane-0-config", &secrets);
        assert_eq!(control.properties["applyMode"], "reboot");
        assert_eq!(
            control.references(),
            vec!["talos-secrets", "talos-worker-0-ip", "worker-machine-config"]
        );
    }
}
