use clusterflow_cloud_opnsense::{HostOverride, OpnsenseClient, OpnsenseCredentials};
use colored::Colorize;
use std::net::IpAddr;

fn client() -> anyhow::Result<OpnsenseClient> {
    Ok(OpnsenseClient::new(OpnsenseCredentials::from_env()?)?)
}

pub async fn ensure(host: &str, domain: &str, ip: IpAddr) -> anyhow::Result<()> {
    let record = HostOverride::new(host, domain, ip);
    let outcome = client()?.ensure(&record).await?;
    println!("{} {} → {} ({})", "✓".green().bold(), record.fqdn(), ip, outcome);
    Ok(())
}

pub async fn remove(host: &str, domain: &str) -> anyhow::Result<()> {
    if client()?.remove(host, domain).await? {
        println!("{} removed {}.{}", "✓".green().bold(), host, domain);
    } else {
        println!("{}.{} was not present", host, domain);
    }
    Ok(())
}
