//! Resource declarations

use crate::expr;
use serde_json::{Map, Value, json};

const PROVIDER_PREFIX: &str = "pulumi:providers:";

/// A declared resource.
///
/// `properties` is a JSON object whose strings may carry interpolations.
/// A resource with `get` set is read from existing infrastructure instead of
/// being created.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub name: String,
    pub resource_type: String,
    pub properties: Value,
    pub options: ResourceOptions,
    pub get: Option<String>,
}

impl Resource {
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>, properties: Value) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            properties,
            options: ResourceOptions::default(),
            get: None,
        }
    }

    /// Read an existing resource by its provider id.
    pub fn read(name: impl Into<String>, resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            get: Some(id.into()),
            ..Self::new(name, resource_type, Value::Object(Map::new()))
        }
    }

    pub fn with_options(mut self, options: ResourceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn is_provider(&self) -> bool {
        self.resource_type.starts_with(PROVIDER_PREFIX)
    }

    /// Package that implements the resource type (`proxmoxve`, `kubernetes`, ...).
    pub fn package(&self) -> &str {
        let token = self
            .resource_type
            .strip_prefix(PROVIDER_PREFIX)
            .unwrap_or(&self.resource_type);
        token.split(':').next().unwrap_or(token)
    }

    pub fn handle(&self) -> ResourceRef {
        ResourceRef::new(&self.name)
    }

    /// Names this resource depends on, explicitly or through interpolation.
    pub fn references(&self) -> Vec<String> {
        let mut found = Vec::new();
        expr::collect_interpolations(&self.properties, &mut found);
        if let Some(id) = &self.get {
            found.extend(expr::interpolations(id));
        }
        let mut names: Vec<String> = found.into_iter().map(|i| i.root).collect();
        names.extend(self.options.provider.iter().cloned());
        names.extend(self.options.depends_on.iter().cloned());
        names.sort();
        names.dedup();
        names
    }
}

/// Handle to a declared name (resource, variable or config key).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    name: String,
}

impl ResourceRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `${name}`
    pub fn reference(&self) -> String {
        expr::reference(&self.name, "")
    }

    /// `${name.path}`
    pub fn output(&self, path: &str) -> String {
        expr::reference(&self.name, path)
    }
}

/// Options that control how the orchestrator treats a resource.
///
/// `provider` and `depends_on` hold declared names; they are rendered as
/// interpolations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceOptions {
    pub provider: Option<String>,
    pub depends_on: Vec<String>,
    pub retain_on_delete: bool,
    pub delete_before_replace: bool,
    pub ignore_changes: Vec<String>,
    pub protect: bool,
    pub additional_secret_outputs: Vec<String>,
}

impl ResourceOptions {
    pub fn provider(mut self, provider: &ResourceRef) -> Self {
        self.provider = Some(provider.name().to_string());
        self
    }

    pub fn depends_on(mut self, dependency: &ResourceRef) -> Self {
        if !self.depends_on.iter().any(|d| d == dependency.name()) {
            self.depends_on.push(dependency.name().to_string());
        }
        self
    }

    pub fn depends_on_all<'a>(self, dependencies: impl IntoIterator<Item = &'a ResourceRef>) -> Self {
        dependencies.into_iter().fold(self, |opts, d| opts.depends_on(d))
    }

    pub fn retain_on_delete(mut self) -> Self {
        self.retain_on_delete = true;
        self
    }

    pub fn delete_before_replace(mut self) -> Self {
        self.delete_before_replace = true;
        self
    }

    pub fn ignore_changes(mut self, property: &str) -> Self {
        self.ignore_changes.push(property.to_string());
        self
    }

    pub fn protect(mut self, protect: bool) -> Self {
        self.protect = protect;
        self
    }

    pub fn secret_output(mut self, output: &str) -> Self {
        self.additional_secret_outputs.push(output.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// camelCase rendering, omitting unset options.
    pub fn to_value(&self) -> Value {
        let mut options = Map::new();
        if let Some(provider) = &self.provider {
            options.insert("provider".to_string(), json!(expr::reference(provider, "")));
        }
        if !self.depends_on.is_empty() {
            let refs: Vec<String> = self.depends_on.iter().map(|d| expr::reference(d, "")).collect();
            options.insert("dependsOn".to_string(), json!(refs));
        }
        if self.retain_on_delete {
            options.insert("retainOnDelete".to_string(), json!(true));
        }
        if self.delete_before_replace {
            options.insert("deleteBeforeReplace".to_string(), json!(true));
        }
        if !self.ignore_changes.is_empty() {
            options.insert("ignoreChanges".to_string(), json!(self.ignore_changes));
        }
        if self.protect {
            options.insert("protect".to_string(), json!(true));
        }
        if !self.additional_secret_outputs.is_empty() {
            options.insert(
                "additionalSecretOutputs".to_string(),
                json!(self.additional_secret_outputs),
            );
        }
        Value::Object(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package() {
        let provider = Resource::new("proxmox", "pulumi:providers:proxmoxve", json!({}));
        assert!(provider.is_provider());
        assert_eq!(provider.package(), "proxmoxve");

        let vm = Resource::new("vm", "proxmoxve:VM/virtualMachine:VirtualMachine", json!({}));
        assert!(!vm.is_provider());
        assert_eq!(vm.package(), "proxmoxve");
    }

    #[test]
    fn test_references() {
        let provider = ResourceRef::new("k8s");
        let chart = ResourceRef::new("traefik");
        let service = Resource::read("traefik-service", "kubernetes:core/v1:Service", "traefik/traefik")
            .with_options(ResourceOptions::default().provider(&provider).depends_on(&chart));
        assert_eq!(service.references(), vec!["k8s", "traefik"]);

        let vm = Resource::new(
            "cmd",
            "command:remote:Command",
            json!({"connection": {"host": "${vm.ipv4Addresses[1][0]}"}, "create": "microk8s config"}),
        );
        assert_eq!(vm.references(), vec!["vm"]);
    }

    #[test]
    fn test_options_render_camel_case() {
        let options = ResourceOptions::default()
            .provider(&ResourceRef::new("proxmox"))
            .depends_on(&ResourceRef::new("image"))
            .depends_on(&ResourceRef::new("image"))
            .delete_before_replace()
            .ignore_changes("cdrom")
            .secret_output("stdout");
        assert_eq!(
            options.to_value(),
            json!({
                "provider": "${proxmox}",
                "dependsOn": ["${image}"],
                "deleteBeforeReplace": true,
                "ignoreChanges": ["cdrom"],
                "additionalSecretOutputs": ["stdout"],
            })
        );
        assert!(ResourceOptions::default().is_empty());
        assert!(ResourceOptions::default().protect(false).is_empty());
    }
}
