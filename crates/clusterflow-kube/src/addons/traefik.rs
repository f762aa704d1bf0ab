use super::ClusterAccess;
use crate::error::Result;
use crate::provider::{HelmChart, SERVICE_TYPE, custom_resource, kube_provider, namespace};
use clusterflow_cloud::{Program, Resource, ResourceOptions, ResourceRef};
use clusterflow_cloud_opnsense::{OpnsenseSecrets, host_override_resource};
use clusterflow_config::{ChartVersion, OpnsenseConfig, StackContext};
use serde_json::json;
use tracing::warn;

/// `namespace/name` of the load-balanced ingress service.
pub const INGRESS_SERVICE: &str = "traefik/traefik";

const NAMESPACE: &str = "traefik";
const REPOSITORY: &str = "https://traefik.github.io/charts";
const CERTIFICATE_SECRET: &str = "certificate";

/// Internal host name the ingress address is published under.
pub fn ingress_host(stack: &StackContext) -> String {
    stack.scoped("k8s-ingress")
}

/// Ingress controller with a wildcard certificate as default TLS store.
///
/// Returns the read of the ingress service; its
/// `status.loadBalancer.ingress[0].ip` is the external address.
pub fn traefik(
    program: &mut Program,
    cluster: &ClusterAccess,
    chart: &ChartVersion,
    issuer: &ResourceRef,
    zone: &str,
    stack: &StackContext,
    dns: Option<(&OpnsenseConfig, &OpnsenseSecrets)>,
) -> Result<ResourceRef> {
    let ns = program.add_resource(namespace(NAMESPACE, &cluster.provider))?;
    let provider = program.add_resource(kube_provider(
        "traefik-provider",
        cluster.kubeconfig.clone(),
        Some(NAMESPACE),
    ))?;
    let options = ResourceOptions::default().provider(&provider);

    let release = program.add_resource(
        HelmChart::new("traefik", REPOSITORY)
            .release_name("traefik")
            .version(Some(&chart.version))
            .namespace(NAMESPACE)
            .values(json!({
                // dashboard on :8080 of the pod, reachable by port-forward
                "additionalArguments": ["--api.insecure=true"],
            }))
            .chart("traefik-chart", options.clone().depends_on(&ns)),
    )?;

    let service = program.add_resource(
        Resource::read("traefik-service", SERVICE_TYPE, INGRESS_SERVICE)
            .with_options(options.clone().depends_on(&release)),
    )?;
    let ingress_ip = service.output("status.loadBalancer.ingress[0].ip");

    match dns {
        Some((config, secrets)) => {
            program.add_resource(host_override_resource(
                "traefik-dns",
                &ingress_host(stack),
                zone,
                ingress_ip.clone(),
                config,
                secrets,
            ))?;
        }
        None => warn!("No OPNsense configured, skipping the ingress host override"),
    }
    program.export("ingress-ip", ingress_ip)?;

    let certificate = program.add_resource(
        custom_resource(
            "certificate",
            "cert-manager.io/v1",
            "Certificate",
            json!({
                "name": "certificate",
                "annotations": { "pulumi.com/waitFor": "condition=Ready" },
            }),
            Some(json!({
                "secretName": CERTIFICATE_SECRET,
                "dnsNames": [format!("*.{}", zone)],
                "issuerRef": { "name": super::ISSUER_NAME, "kind": "ClusterIssuer" },
            })),
        )
        .with_options(options.clone().depends_on(&ns).depends_on(issuer)),
    )?;

    program.add_resource(
        custom_resource(
            "default-tls-store",
            "traefik.io/v1alpha1",
            "TLSStore",
            json!({ "name": "default" }),
            Some(json!({
                "defaultCertificate": { "secretName": CERTIFICATE_SECRET },
            })),
        )
        .with_options(options.depends_on(&release).depends_on(&certificate)),
    )?;

    Ok(service)
}
