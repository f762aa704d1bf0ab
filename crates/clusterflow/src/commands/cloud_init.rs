use crate::target::Target;
use anyhow::{Context, bail};
use clusterflow_config::Flavor;

pub fn handle(target: &Target, node: &str) -> anyhow::Result<()> {
    let config = target.load()?;
    let Flavor::MicroK8s(microk8s) = config.flavor()? else {
        bail!("cloud-init documents only exist for MicroK8s clusters");
    };

    let instance = microk8s
        .master_nodes
        .iter()
        .find(|n| n.name == node)
        .with_context(|| format!("no master node named {}", node))?;

    let user_data = clusterflow_cloud_proxmox::cloud_config(
        &instance.name,
        &microk8s.username,
        &microk8s.ssh_public_key,
    )?;
    print!("{}", user_data.data);
    Ok(())
}
