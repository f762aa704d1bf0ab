use crate::target::Target;
use anyhow::{Context, bail};
use clusterflow_config::{SecretString, onepassword};
use colored::Colorize;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

/// Resolve every secret reference and store it as an encrypted stack value.
pub fn sync(target: &Target, dry_run: bool) -> anyhow::Result<()> {
    let config = target.load()?;
    let stack = target.stack()?;
    let refs = config.secret_refs();

    if dry_run {
        println!("{}", "Dry run, nothing is written".yellow());
        for (key, reference) in &refs {
            println!("  {} ← {}", key.cyan(), reference);
        }
        return Ok(());
    }

    let resolved = onepassword::resolve_all(&refs)?;
    for (key, value) in &resolved {
        set_secret(&stack.stack, key, value)?;
        println!("{} {}", "✓".green().bold(), key);
    }
    println!("Synced {} secrets into stack {}", resolved.len(), stack.stack.cyan());
    Ok(())
}

// The value goes over stdin so it never shows up in the process list.
fn set_secret(stack: &str, key: &str, value: &SecretString) -> anyhow::Result<()> {
    debug!(stack = %stack, key = %key, "pulumi config set --secret");
    let mut child = Command::new("pulumi")
        .args(["config", "set", "--secret", "--stack", stack, key])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to run pulumi")?;

    child
        .stdin
        .take()
        .context("pulumi stdin is not available")?
        .write_all(value.expose().as_bytes())?;

    let output = child.wait_with_output()?;
    if !output.status.success() {
        bail!(
            "pulumi config set {} failed: {}",
            key,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}
