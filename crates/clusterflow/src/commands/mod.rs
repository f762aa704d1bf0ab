pub mod cloud_init;
pub mod dns;
pub mod node_ip;
pub mod plan;
pub mod render;
pub mod secrets;
pub mod validate;
pub mod versions;

use crate::target::Target;
use clusterflow_cloud::Program;
use clusterflow_kube::{ResolvedVersions, SnapIndex};

/// Load the configuration, resolve versions and build the program.
pub async fn build(target: &Target) -> anyhow::Result<Program> {
    let config = target.load()?;
    let stack = target.stack()?;
    let versions = resolve(&config).await?;
    Ok(clusterflow_kube::build_program(&config, &stack, &versions)?)
}

async fn resolve(config: &clusterflow_config::ComponentConfig) -> anyhow::Result<ResolvedVersions> {
    let index = SnapIndex::new()?;
    Ok(clusterflow_kube::resolve_versions(config, &index).await?)
}
