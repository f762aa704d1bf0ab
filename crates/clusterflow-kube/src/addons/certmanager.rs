use super::ClusterAccess;
use crate::error::Result;
use crate::provider::{HelmChart, SECRET_TYPE, custom_resource, namespace};
use clusterflow_cloud::{CommandSpec, Program, Resource, ResourceOptions, ResourceRef};
use clusterflow_cloud_cloudflare::scoped_dns_token;
use clusterflow_config::{AddonStrategy, CertManagerConfig, ConfigError};
use serde_json::json;

/// Cluster issuer that signs certificates through Let's Encrypt.
pub const ISSUER_NAME: &str = "lets-encrypt";

const NAMESPACE: &str = "cert-manager";
const REPOSITORY: &str = "https://charts.jetstack.io";
const TOKEN_SECRET: &str = "cloudflare-api-token";
const TOKEN_SECRET_KEY: &str = "api-token";

fn install(
    program: &mut Program,
    cluster: &ClusterAccess,
    config: &CertManagerConfig,
    strategy: AddonStrategy,
) -> Result<ResourceRef> {
    match strategy {
        AddonStrategy::Chart => {
            let ns = program.add_resource(namespace(NAMESPACE, &cluster.provider))?;
            let chart = HelmChart::new("cert-manager", REPOSITORY)
                .release_name("cert-manager")
                .version(config.version.as_deref())
                .namespace(NAMESPACE)
                .values(json!({ "crds": { "enabled": true } }))
                .chart(
                    "cert-manager-chart",
                    ResourceOptions::default()
                        .provider(&cluster.provider)
                        .depends_on(&ns),
                );
            Ok(program.add_resource(chart)?)
        }
        AddonStrategy::Snap => {
            let node = cluster.node.as_ref().ok_or_else(|| {
                ConfigError::invalid("addon-strategy", "the snap strategy needs SSH access to a node")
            })?;
            let command = CommandSpec::new("microk8s enable cert-manager")
                .delete("microk8s disable cert-manager")
                .remote(NAMESPACE, node);
            Ok(program.add_resource(command)?)
        }
    }
}

/// cert-manager with a DNS-01 Cloudflare issuer. Returns the issuer.
pub fn cert_manager(
    program: &mut Program,
    cluster: &ClusterAccess,
    config: &CertManagerConfig,
    strategy: AddonStrategy,
    cloudflare: &ResourceRef,
    email: &str,
    token_name: &str,
) -> Result<ResourceRef> {
    let installed = install(program, cluster, config, strategy)?;

    let token = program.add_resource(scoped_dns_token("cloudflare-token", token_name, cloudflare))?;

    let options = ResourceOptions::default()
        .provider(&cluster.provider)
        .depends_on(&installed);

    let secret = program.add_resource(
        Resource::new(
            TOKEN_SECRET,
            SECRET_TYPE,
            json!({
                "metadata": { "name": TOKEN_SECRET, "namespace": NAMESPACE },
                "type": "Opaque",
                "stringData": { TOKEN_SECRET_KEY: token.output("value") },
            }),
        )
        .with_options(options.clone()),
    )?;

    let issuer = custom_resource(
        "letsencrypt-issuer",
        "cert-manager.io/v1",
        "ClusterIssuer",
        json!({ "name": ISSUER_NAME, "namespace": NAMESPACE }),
        Some(json!({
            "acme": {
                "server": config.issuer_server(),
                "email": email,
                "privateKeySecretRef": { "name": "lets-encrypt-private-key" },
                "solvers": [{
                    "dns01": {
                        "cloudflare": {
                            "apiTokenSecretRef": {
                                "name": secret.output("metadata.name"),
                                "key": TOKEN_SECRET_KEY,
                            },
                        },
                    },
                }],
            },
        })),
    )
    .with_options(options);

    Ok(program.add_resource(issuer)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterflow_cloud::Connection;
    use clusterflow_cloud::command::REMOTE_COMMAND;

    fn cluster(node: Option<Connection>) -> ClusterAccess {
        ClusterAccess {
            kubeconfig: json!("${kube-config.stdout}"),
            provider: ResourceRef::new("microk8s"),
            node,
        }
    }

    fn build(strategy: AddonStrategy, node: Option<Connection>) -> Result<Program> {
        let mut program = Program::new("kubernetes", "test");
        let config = CertManagerConfig {
            use_staging: true,
            version: Some("v1.16.2".to_string()),
        };
        cert_manager(
            &mut program,
            &cluster(node),
            &config,
            strategy,
            &ResourceRef::new("cloudflare"),
            "admin@example.com",
            "microk8s-dev-cert-manager",
        )?;
        Ok(program)
    }

    #[test]
    fn test_chart_strategy() {
        let program = build(AddonStrategy::Chart, None).unwrap();
        let chart = program.resource("cert-manager-chart").unwrap();
        assert_eq!(chart.properties["values"]["crds"]["enabled"], true);
        assert_eq!(chart.properties["version"], "v1.16.2");

        let issuer = program.resource("letsencrypt-issuer").unwrap();
        let acme = &issuer.properties["spec"]["acme"];
        assert_eq!(acme["server"], "https://acme-staging-v02.api.letsencrypt.org/directory");
        assert_eq!(acme["solvers"][0]["dns01"]["cloudflare"]["apiTokenSecretRef"]["key"], "api-token");
        assert_eq!(issuer.options.depends_on, vec!["cert-manager-chart"]);
        assert_eq!(
            issuer.references(),
            vec!["cert-manager-chart", "cloudflare-api-token", "microk8s"]
        );

        let secret = program.resource("cloudflare-api-token").unwrap();
        assert_eq!(secret.properties["stringData"]["api-token"], "${cloudflare-token.value}");
        let token = program.resource("cloudflare-token").unwrap();
        assert_eq!(token.properties["name"], "microk8s-dev-cert-manager");
    }

    #[test]
    fn test_snap_strategy() {
        let program = build(AddonStrategy::Snap, Some(Connection::new("10.0.0.20", "ubuntu"))).unwrap();
        let command = program.resource("cert-manager").unwrap();
        assert_eq!(command.resource_type, REMOTE_COMMAND);
        assert_eq!(command.properties["create"], "microk8s enable cert-manager");
        assert_eq!(command.properties["delete"], "microk8s disable cert-manager");
        assert!(program.resource("cert-manager-chart").is_none());
    }

    #[test]
    fn test_snap_strategy_needs_node() {
        assert!(build(AddonStrategy::Snap, None).is_err());
    }
}
