//! Command resources
//!
//! Steps that are not declarations of a cloud API object run as commands,
//! either on the machine running the orchestrator or on a node over SSH.

use crate::resource::Resource;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

pub const LOCAL_COMMAND: &str = "command:local:Command";
pub const REMOTE_COMMAND: &str = "command:remote:Command";

/// Executable that local commands call back into. Must be on the PATH of the
/// machine running the orchestrator.
pub const CLI_BINARY: &str = "cflow";

/// What the command provider records from the command's output streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logging {
    Stdout,
    Stderr,
    StdoutAndStderr,
    None,
}

impl Logging {
    fn as_str(&self) -> &'static str {
        match self {
            Logging::Stdout => "stdout",
            Logging::Stderr => "stderr",
            Logging::StdoutAndStderr => "stdoutAndStderr",
            Logging::None => "none",
        }
    }
}

/// SSH connection of a remote command.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub host: String,
    pub user: String,
}

impl Connection {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandSpec {
    pub create: String,
    pub delete: Option<String>,
    pub environment: BTreeMap<String, Value>,
    pub triggers: Vec<Value>,
    pub logging: Option<Logging>,
}

impl CommandSpec {
    pub fn new(create: impl Into<String>) -> Self {
        Self {
            create: create.into(),
            ..Self::default()
        }
    }

    pub fn delete(mut self, delete: impl Into<String>) -> Self {
        self.delete = Some(delete.into());
        self
    }

    pub fn env(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.environment.insert(key.to_string(), value.into());
        self
    }

    pub fn trigger(mut self, value: impl Into<Value>) -> Self {
        self.triggers.push(value.into());
        self
    }

    pub fn logging(mut self, logging: Logging) -> Self {
        self.logging = Some(logging);
        self
    }

    fn properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert("create".to_string(), json!(self.create));
        if let Some(delete) = &self.delete {
            props.insert("delete".to_string(), json!(delete));
        }
        if !self.environment.is_empty() {
            props.insert("environment".to_string(), json!(self.environment));
        }
        if !self.triggers.is_empty() {
            props.insert("triggers".to_string(), json!(self.triggers));
        }
        if let Some(logging) = self.logging {
            props.insert("logging".to_string(), json!(logging.as_str()));
        }
        props
    }

    /// Run on the machine executing the orchestrator.
    pub fn local(&self, name: &str) -> Resource {
        Resource::new(name, LOCAL_COMMAND, Value::Object(self.properties()))
    }

    /// Run on a node over SSH. Output of earlier runs is not fed back.
    pub fn remote(&self, name: &str, connection: &Connection) -> Resource {
        let mut props = self.properties();
        props.insert(
            "connection".to_string(),
            json!({ "host": connection.host, "user": connection.user }),
        );
        props.insert("addPreviousOutputInEnv".to_string(), json!(false));
        Resource::new(name, REMOTE_COMMAND, Value::Object(props))
    }
}

/// A step that completes `seconds` after creation.
///
/// Nothing happens on delete.
pub fn delay(name: &str, seconds: u64) -> Resource {
    CommandSpec::new(format!("sleep {}", seconds)).local(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay() {
        let step = delay("bootstrap-delay", 30);
        assert_eq!(step.resource_type, LOCAL_COMMAND);
        assert_eq!(step.properties, json!({"create": "sleep 30"}));
    }

    #[test]
    fn test_remote_command() {
        let cmd = CommandSpec::new("microk8s enable hostpath-storage")
            .delete("microk8s disable hostpath-storage")
            .remote("storage", &Connection::new("${vm.ipv4Addresses[1][0]}", "ubuntu"));
        assert_eq!(cmd.resource_type, REMOTE_COMMAND);
        assert_eq!(cmd.properties["connection"]["user"], "ubuntu");
        assert_eq!(cmd.properties["addPreviousOutputInEnv"], false);
        assert_eq!(cmd.properties["delete"], "microk8s disable hostpath-storage");
        assert_eq!(cmd.references(), vec!["vm"]);
    }

    #[test]
    fn test_local_command_environment() {
        let cmd = CommandSpec::new("cflow dns ensure")
            .env("IP", "${svc.status.loadBalancer.ingress[0].ip}")
            .logging(Logging::Stderr)
            .local("override");
        assert_eq!(cmd.properties["environment"]["IP"], "${svc.status.loadBalancer.ingress[0].ip}");
        assert_eq!(cmd.properties["logging"], "stderr");
    }
}
