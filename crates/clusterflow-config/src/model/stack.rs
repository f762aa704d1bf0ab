//! Stack context supplied by the caller

use serde::{Deserialize, Serialize};

pub const DEFAULT_PROJECT: &str = "kubernetes";
const PROD_STACK: &str = "prod";

/// Project and stack names that namespace configuration keys and resource names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackContext {
    pub project: String,
    pub stack: String,
}

impl StackContext {
    pub fn new(project: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            stack: stack.into(),
        }
    }

    pub fn is_prod(&self) -> bool {
        self.stack == PROD_STACK
    }

    /// Tag or name scoped to this stack, e.g. `talos-dev`.
    pub fn scoped(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.stack)
    }

    /// Key under which a Pulumi stack file stores the component configuration.
    pub fn config_key(&self) -> String {
        format!("{}:config", self.project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_names() {
        let ctx = StackContext::new(DEFAULT_PROJECT, "dev");
        assert_eq!(ctx.scoped("talos"), "talos-dev");
        assert_eq!(ctx.config_key(), "kubernetes:config");
        assert!(!ctx.is_prod());
        assert!(StackContext::new("kubernetes", "prod").is_prod());
    }
}
