use crate::target::Target;
use clusterflow_config::{ComponentConfig, Flavor};
use colored::Colorize;

pub fn handle(target: &Target) -> anyhow::Result<()> {
    println!("{}", "Validating configuration...".blue());

    let config = match target.load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", "✗ Configuration is invalid".red().bold());
            eprintln!("  {:#}", e);
            std::process::exit(1);
        }
    };

    println!("{}", "✓ Configuration is valid".green().bold());
    println!();
    print_summary(&config)?;
    Ok(())
}

fn print_summary(config: &ComponentConfig) -> anyhow::Result<()> {
    println!("Summary:");
    println!(
        "  Proxmox: {} ({})",
        config.proxmox.node_name.cyan(),
        config.proxmox.api_endpoint
    );

    match config.flavor()? {
        Flavor::MicroK8s(microk8s) => {
            println!("  Flavor: {} {}", "microk8s".cyan(), microk8s.version);
            println!("  Add-on strategy: {:?}", microk8s.addon_strategy);
            println!("  Master nodes: {}", microk8s.master_nodes.len());
            for node in &microk8s.master_nodes {
                println!(
                    "    - {} ({}, {} cores, {}-{} MiB)",
                    node.name.cyan(),
                    node.address,
                    node.cores,
                    node.memory_min,
                    node.memory_max
                );
            }
            println!("  MetalLB pool: {}", microk8s.metallb.address_range());
        }
        Flavor::Talos(talos) => {
            println!("  Flavor: {} {}", "talos".cyan(), talos.version);
            println!("  Network: {}", talos.network);
            for (label, group) in [("Control plane", &talos.control_plane), ("Workers", &talos.worker)] {
                println!("  {}: {}", label, group.nodes);
                for address in group.addresses()? {
                    println!("    - {}", address.to_string().cyan());
                }
            }
        }
    }

    println!("  Versions:");
    let charts = [
        ("cert-manager", config.cert_manager.version.as_deref()),
        ("traefik", config.traefik.as_ref().map(|c| c.version.as_str())),
        ("csi-driver-nfs", config.csi_nfs_driver.as_ref().map(|c| c.version.as_str())),
    ];
    for (name, version) in charts {
        if let Some(version) = version {
            println!("    - {} {}", name, version);
        }
    }
    Ok(())
}
