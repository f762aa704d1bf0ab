//! Plan of the declarations handed to the orchestrator

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One declaration in dependency order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Resource name
    pub id: String,

    pub action_type: ActionType,

    /// Resource type token
    pub resource_type: String,

    /// Name of the explicit provider, if any
    pub provider: Option<String>,

    /// Names this resource waits for
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Managed by the orchestrator
    Declare,
    /// Read from existing infrastructure
    Read,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Declare => write!(f, "declare"),
            ActionType::Read => write!(f, "read"),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.action_type, self.id, self.resource_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<Action>,

    /// Names of the stack outputs
    pub exports: Vec<String>,
}

impl Plan {
    pub fn new(actions: Vec<Action>, exports: Vec<String>) -> Self {
        Self { actions, exports }
    }

    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Number of resources per resource type token
    pub fn count_by_type(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for action in &self.actions {
            *counts.entry(action.resource_type.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Number of resources per explicit provider
    pub fn count_by_provider(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for action in &self.actions {
            let provider = action.provider.as_deref().unwrap_or("default");
            *counts.entry(provider).or_insert(0) += 1;
        }
        counts
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            declared: self.actions_by_type(ActionType::Declare).len(),
            read: self.actions_by_type(ActionType::Read).len(),
            exported: self.exports.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub declared: usize,
    pub read: usize,
    pub exported: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} declared, {} read, {} exported",
            self.declared, self.read, self.exported
        )
    }
}
