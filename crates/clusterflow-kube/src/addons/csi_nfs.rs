use super::ClusterAccess;
use crate::error::Result;
use crate::provider::HelmChart;
use clusterflow_cloud::{Program, ResourceOptions, ResourceRef};
use clusterflow_config::{ChartVersion, Flavor};
use serde_json::json;

const REPOSITORY: &str = "https://raw.githubusercontent.com/kubernetes-csi/csi-driver-nfs/master/charts";

/// Kubelet root directory of the distribution.
pub fn kubelet_dir(flavor: &Flavor<'_>) -> &'static str {
    match flavor {
        Flavor::MicroK8s(_) => "/var/snap/microk8s/common/var/lib/kubelet",
        Flavor::Talos(_) => "/var/lib/kubelet",
    }
}

/// NFS CSI driver with inline volumes enabled.
pub fn csi_nfs(
    program: &mut Program,
    cluster: &ClusterAccess,
    chart: &ChartVersion,
    kubelet_dir: &str,
) -> Result<ResourceRef> {
    let resource = HelmChart::new("csi-driver-nfs", REPOSITORY)
        .version(Some(&chart.version))
        .namespace("kube-system")
        .values(json!({
            "kubeletDir": kubelet_dir,
            "feature": { "enableInlineVolume": true },
        }))
        .chart(
            "csi-driver-nfs",
            ResourceOptions::default().provider(&cluster.provider),
        );
    Ok(program.add_resource(resource)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kubelet_dir_for_microk8s() {
        let mut program = Program::new("kubernetes", "test");
        let cluster = ClusterAccess {
            kubeconfig: json!("${kube-config.stdout}"),
            provider: ResourceRef::new("microk8s"),
            node: None,
        };
        let chart = ChartVersion {
            version: "v4.9.0".to_string(),
        };
        csi_nfs(&mut program, &cluster, &chart, "/var/snap/microk8s/common/var/lib/kubelet").unwrap();

        let resource = program.resource("csi-driver-nfs").unwrap();
        assert_eq!(resource.properties["namespace"], "kube-system");
        assert_eq!(
            resource.properties["values"]["kubeletDir"],
            "/var/snap/microk8s/common/var/lib/kubelet"
        );
        assert_eq!(resource.properties["values"]["feature"]["enableInlineVolume"], true);
    }
}
