use clusterflow_cloud_proxmox::{ApiConfig, GuestAgentClient, WaitConfig};

/// Prints only the address, the rendered program records stdout.
pub async fn handle(node: &str, vmid: u32, max_retries: Option<u32>) -> anyhow::Result<()> {
    let client = GuestAgentClient::new(ApiConfig::from_env()?)?;

    let mut wait = WaitConfig::default();
    if let Some(max_retries) = max_retries {
        wait.max_retries = max_retries;
    }

    let address = client.wait_for_ipv4(node, vmid, &wait).await?;
    println!("{}", address);
    Ok(())
}
