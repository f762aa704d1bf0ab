use super::ClusterAccess;
use crate::error::Result;
use crate::provider::{HelmChart, custom_resource, kube_provider, namespace};
use clusterflow_cloud::{Program, ResourceOptions, ResourceRef};
use clusterflow_config::MetallbConfig;
use serde_json::json;

const NAMESPACE: &str = "metallb-system";
const REPOSITORY: &str = "https://metallb.github.io/metallb";
const API_VERSION: &str = "metallb.io/v1beta1";

/// Load balancer with a layer-2 address pool.
///
/// A single release is used instead of an expanded chart to keep the
/// program small. Returns the release.
pub fn metallb(program: &mut Program, cluster: &ClusterAccess, config: &MetallbConfig) -> Result<ResourceRef> {
    let ns = program.add_resource(namespace(NAMESPACE, &cluster.provider))?;
    let provider = program.add_resource(kube_provider(
        "metallb-provider",
        cluster.kubeconfig.clone(),
        Some(NAMESPACE),
    ))?;
    let options = ResourceOptions::default().provider(&provider);

    let release = program.add_resource(
        HelmChart::new("metallb", REPOSITORY)
            .version(config.version.as_deref())
            .namespace(NAMESPACE)
            .values(json!({
                "prometheus": {
                    "rbacPrometheus": false,
                    "scrapeAnnotations": true,
                },
            }))
            .release("metallb", options.clone().depends_on(&ns)),
    )?;

    program.add_resource(
        custom_resource(
            "default-addresspool",
            API_VERSION,
            "IPAddressPool",
            json!({ "name": "default-addresspool" }),
            Some(json!({
                "addresses": [config.address_range()],
                "autoAssign": true,
            })),
        )
        .with_options(options.clone().depends_on(&release)),
    )?;

    program.add_resource(
        custom_resource(
            "l2-advertisement",
            API_VERSION,
            "L2Advertisement",
            json!({ "name": "default-advertise-all-pools" }),
            None,
        )
        .with_options(options.depends_on(&release)),
    )?;

    Ok(release)
}
