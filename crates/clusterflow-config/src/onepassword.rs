//! 1Password integration
//!
//! Resolves `op://` references with the 1Password CLI.
//!
//! ## Requirements
//!
//! - The 1Password CLI (`op`) is installed
//! - `OP_SERVICE_ACCOUNT_TOKEN` is set (automation), or the CLI is signed in
//!
//! Resolved values are wrapped in [`SecretString`] and never logged.

use crate::error::{ConfigError, Result};
use crate::model::{SecretRef, SecretString};
use std::process::Command;
use tracing::{debug, info};

const OP_PREFIX: &str = "op://";

/// Check whether the 1Password CLI can be executed
pub fn is_available() -> bool {
    Command::new("op")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Check whether a value is a 1Password reference
pub fn is_op_reference(value: &str) -> bool {
    value.starts_with(OP_PREFIX)
}

/// `op read` for one reference, scoped to `OP_ACCOUNT` when set.
fn read_command(reference: &SecretRef) -> Command {
    let mut cmd = Command::new("op");
    cmd.args(["read", "--no-newline", reference.as_str()]);
    if let Ok(account) = std::env::var("OP_ACCOUNT") {
        cmd.args(["--account", &account]);
    }
    cmd
}

/// What to do about a failed `op read`, judged from its stderr.
fn failure_hint(stderr: &str, reference: &SecretRef) -> Option<String> {
    let stderr = stderr.to_ascii_lowercase();
    if stderr.contains("not signed in") || stderr.contains("session expired") {
        Some("sign in with `op signin`, or export OP_SERVICE_ACCOUNT_TOKEN, then rerun `cflow secrets sync`".to_string())
    } else if stderr.contains("multiple accounts") {
        Some("pick the account holding these secrets with OP_ACCOUNT".to_string())
    } else if stderr.contains("isn't a vault") || (stderr.contains("vault") && stderr.contains("not found")) {
        Some(format!("vault `{}` is not visible to this account", reference.vault()))
    } else if stderr.contains("not found") || stderr.contains("isn't an item") || stderr.contains("isn't a field") {
        Some(format!(
            "check that item `{}` in vault `{}` has a field named `{}`",
            reference.item(),
            reference.vault(),
            reference.field()
        ))
    } else {
        None
    }
}

/// Resolve a single reference.
pub fn resolve_reference(reference: &SecretRef) -> Result<SecretString> {
    debug!(reference = %reference, "Resolving 1Password reference");

    let output = read_command(reference)
        .output()
        .map_err(|e| ConfigError::OnePassword(format!("failed to run op: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut message = format!("could not read {}: {}", reference, stderr.trim());
        if let Some(hint) = failure_hint(&stderr, reference) {
            message.push_str("\nhint: ");
            message.push_str(&hint);
        }
        return Err(ConfigError::OnePassword(message));
    }

    Ok(SecretString::new(String::from_utf8_lossy(&output.stdout).trim_end()))
}

/// Resolve every `(config key, reference)` pair. Failures are collected so a
/// single run reports every broken key.
pub fn resolve_all(references: &[(&str, &SecretRef)]) -> Result<Vec<(String, SecretString)>> {
    if references.is_empty() {
        return Ok(Vec::new());
    }
    if !is_available() {
        return Err(ConfigError::OnePassword(
            "the 1Password CLI (op) is not installed or not on PATH".to_string(),
        ));
    }

    let mut resolved = Vec::with_capacity(references.len());
    let mut failed = Vec::new();
    for (key, reference) in references {
        match resolve_reference(reference) {
            Ok(secret) => resolved.push((key.to_string(), secret)),
            Err(e) => failed.push(format!("{}: {}", key, e)),
        }
    }

    if !failed.is_empty() {
        return Err(ConfigError::OnePassword(format!(
            "{} of {} secrets could not be read:\n{}",
            failed.len(),
            references.len(),
            failed.join("\n")
        )));
    }

    info!(count = resolved.len(), "Resolved 1Password references");
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_op_reference() {
        assert!(is_op_reference("op://Vault/Item/Field"));
        assert!(!is_op_reference("https://example.com"));
        assert!(!is_op_reference(""));
    }

    #[test]
    fn test_resolve_nothing() {
        assert!(resolve_all(&[]).unwrap().is_empty());
    }

    fn reference() -> SecretRef {
        SecretRef::parse("op://Pulumi/proxmox/credential").unwrap()
    }

    #[test]
    fn test_hint_for_signed_out_cli() {
        let hint = failure_hint("[ERROR] You are not signed in.", &reference()).unwrap();
        assert!(hint.contains("OP_SERVICE_ACCOUNT_TOKEN"));
        assert!(hint.contains("cflow secrets sync"));
    }

    #[test]
    fn test_hint_names_missing_vault() {
        let hint = failure_hint("\"Pulumi\" isn't a vault in this account", &reference()).unwrap();
        assert_eq!(hint, "vault `Pulumi` is not visible to this account");
    }

    #[test]
    fn test_hint_names_item_and_field() {
        let hint = failure_hint("[ERROR] item not found", &reference()).unwrap();
        assert!(hint.contains("item `proxmox`"), "{}", hint);
        assert!(hint.contains("field named `credential`"), "{}", hint);
    }

    #[test]
    fn test_no_hint_for_unknown_failure() {
        assert!(failure_hint("connection reset", &reference()).is_none());
    }

    #[test]
    #[ignore = "requires 1Password CLI and authentication"]
    fn test_resolve_reference() {
        assert!(resolve_reference(&reference()).is_ok());
    }
}
