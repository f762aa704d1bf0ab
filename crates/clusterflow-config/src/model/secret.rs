//! Secret references and resolved secret values

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

const OP_PREFIX: &str = "op://";

/// A 1Password reference of the form `op://vault/item[/section]/field`.
///
/// Only the reference is stored; the value is resolved at sync time and handed
/// to the orchestrator's secret store, never written into rendered programs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretRef {
    reference: String,
}

impl SecretRef {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let path = value.strip_prefix(OP_PREFIX).ok_or_else(|| {
            ConfigError::OnePassword(format!(
                "invalid 1Password reference `{}` (must start with {})",
                value, OP_PREFIX
            ))
        })?;

        let segments: Vec<&str> = path.split('/').collect();
        if !(3..=4).contains(&segments.len()) || segments.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::OnePassword(format!(
                "invalid 1Password reference `{}` (expected op://vault/item[/section]/field)",
                value
            )));
        }

        Ok(Self {
            reference: value.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.reference
    }

    fn segments(&self) -> Vec<&str> {
        self.reference[OP_PREFIX.len()..].split('/').collect()
    }

    pub fn vault(&self) -> &str {
        self.segments()[0]
    }

    pub fn item(&self) -> &str {
        self.segments()[1]
    }

    pub fn field(&self) -> &str {
        self.segments().last().copied().unwrap_or_default()
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference)
    }
}

impl TryFrom<String> for SecretRef {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SecretRef> for String {
    fn from(value: SecretRef) -> Self {
        value.reference
    }
}

/// A resolved secret. Formatting never reveals the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}
