mod commands;
mod target;

use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use target::Target;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cflow")]
#[command(about = "Kubernetes on Proxmox, rendered as a Pulumi YAML program", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the usual search locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Stack name (dev, prod, ...)
    #[arg(short, long, global = true, env = "CLUSTERFLOW_STACK")]
    stack: Option<String>,

    /// Project name, the namespace of the stack file keys
    #[arg(
        long,
        global = true,
        env = "CLUSTERFLOW_PROJECT",
        default_value = "kubernetes"
    )]
    project: String,

    /// Read the configuration out of `Pulumi.<stack>.yaml`
    #[arg(long, global = true)]
    from_stack_file: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print a summary
    Validate,
    /// Resolve the snap versions the cluster needs
    Versions,
    /// Write the Pulumi program
    Render {
        /// Output file, `-` for stdout
        #[arg(default_value = "Pulumi.yaml")]
        out: PathBuf,
    },
    /// Show the declarations in dependency order
    Plan {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the cloud-init document of a MicroK8s master node
    #[command(name = "cloud-init")]
    CloudInit {
        /// Node name
        node: String,
    },
    /// Secret management
    #[command(subcommand)]
    Secrets(SecretsCommands),
    /// Wait for a VM's guest agent and print its IPv4 address
    #[command(name = "node-ip")]
    NodeIp {
        /// Proxmox node the VM runs on
        #[arg(long)]
        node: String,
        /// VM id
        #[arg(long)]
        vmid: u32,
        /// Give up after this many polls
        #[arg(long)]
        max_retries: Option<u32>,
    },
    /// OPNsense Unbound host overrides
    #[command(subcommand)]
    Dns(DnsCommands),
    /// Show version
    Version,
}

#[derive(Subcommand)]
enum SecretsCommands {
    /// Copy the 1Password secrets into the stack configuration
    Sync {
        /// List the keys without touching anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum DnsCommands {
    /// Create or update a host override
    Ensure {
        #[arg(long)]
        host: String,
        #[arg(long)]
        domain: String,
        #[arg(long)]
        ip: IpAddr,
    },
    /// Remove a host override
    Remove {
        #[arg(long)]
        host: String,
        #[arg(long)]
        domain: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries rendered output, logs go to stderr
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let target = Target {
        config: cli.config,
        stack: cli.stack,
        project: cli.project,
        from_stack_file: cli.from_stack_file,
    };

    match cli.command {
        Commands::Validate => commands::validate::handle(&target)?,
        Commands::Versions => commands::versions::handle(&target).await?,
        Commands::Render { out } => commands::render::handle(&target, &out).await?,
        Commands::Plan { json } => commands::plan::handle(&target, json).await?,
        Commands::CloudInit { node } => commands::cloud_init::handle(&target, &node)?,
        Commands::Secrets(SecretsCommands::Sync { dry_run }) => {
            commands::secrets::sync(&target, dry_run)?;
        }
        Commands::NodeIp {
            node,
            vmid,
            max_retries,
        } => commands::node_ip::handle(&node, vmid, max_retries).await?,
        Commands::Dns(DnsCommands::Ensure { host, domain, ip }) => {
            commands::dns::ensure(&host, &domain, ip).await?;
        }
        Commands::Dns(DnsCommands::Remove { host, domain }) => {
            commands::dns::remove(&host, &domain).await?;
        }
        Commands::Version => {
            println!("clusterflow {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
