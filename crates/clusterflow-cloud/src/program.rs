//! Program: the complete set of declarations for one stack
//!
//! A program owns its configuration keys, shared invocations (variables),
//! resources and outputs. It validates references, ordering and secret
//! marking, and renders itself as a YAML program for the orchestrator.

use crate::action::{Action, ActionType, Plan};
use crate::error::{CloudError, Result};
use crate::expr::{self, Interpolation};
use crate::resource::{Resource, ResourceRef};
use serde_json::Value;
use serde_yaml::{Mapping, Value as Yaml};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Output properties that carry cluster credentials.
pub const CREDENTIAL_PROPERTIES: [&str; 4] = [
    "kubeconfigRaw",
    "talosConfig",
    "machineConfiguration",
    "clientConfiguration",
];

/// Result of a provider function shared by several resources
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: Value,
}

/// Stack output
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub value: Value,
    pub secret: bool,
}

/// Input read from the stack's configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigKey {
    pub name: String,
    pub secret: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub name: String,
    pub description: String,
    config: Vec<ConfigKey>,
    variables: Vec<Variable>,
    resources: Vec<Resource>,
    outputs: Vec<Export>,
}

enum Declared<'a> {
    Config(&'a ConfigKey),
    Variable(&'a Variable),
    Resource(&'a Resource),
}

impl Program {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn config(&self) -> &[ConfigKey] {
        &self.config
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn outputs(&self) -> &[Export] {
        &self.outputs
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Export> {
        self.outputs.iter().find(|o| o.name == name)
    }

    fn lookup(&self, name: &str) -> Option<Declared<'_>> {
        if let Some(key) = self.config.iter().find(|c| c.name == name) {
            return Some(Declared::Config(key));
        }
        if let Some(var) = self.variables.iter().find(|v| v.name == name) {
            return Some(Declared::Variable(var));
        }
        self.resource(name).map(Declared::Resource)
    }

    fn ensure_unique(&self, name: &str) -> Result<()> {
        if expr::BUILTIN_ROOTS.contains(&name) || self.lookup(name).is_some() {
            return Err(CloudError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Declare a secret configuration input.
    pub fn declare_secret(&mut self, key: &str) -> Result<ResourceRef> {
        self.ensure_unique(key)?;
        self.config.push(ConfigKey {
            name: key.to_string(),
            secret: true,
        });
        Ok(ResourceRef::new(key))
    }

    pub fn add_resource(&mut self, resource: Resource) -> Result<ResourceRef> {
        self.ensure_unique(&resource.name)?;
        if !resource.properties.is_object() {
            return Err(CloudError::InvalidResource {
                name: resource.name,
                message: "properties must be an object".to_string(),
            });
        }
        debug!(name = %resource.name, resource_type = %resource.resource_type, "Declared resource");
        let handle = resource.handle();
        self.resources.push(resource);
        Ok(handle)
    }

    pub fn add_variable(&mut self, name: &str, value: Value) -> Result<ResourceRef> {
        self.ensure_unique(name)?;
        self.variables.push(Variable {
            name: name.to_string(),
            value,
        });
        Ok(ResourceRef::new(name))
    }

    pub fn export(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.push_output(name, value.into(), false)
    }

    pub fn export_secret(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.push_output(name, value.into(), true)
    }

    fn push_output(&mut self, name: &str, value: Value, secret: bool) -> Result<()> {
        if self.output(name).is_some() {
            return Err(CloudError::DuplicateName(format!("output {}", name)));
        }
        self.outputs.push(Export {
            name: name.to_string(),
            value,
            secret,
        });
        Ok(())
    }

    /// Check references, acyclicity and secret marking.
    pub fn validate(&self) -> Result<()> {
        self.validate_references()?;
        self.dependency_order()?;
        self.validate_secrets()?;
        Ok(())
    }

    fn validate_references(&self) -> Result<()> {
        let check = |from: &str, target: &str| -> Result<()> {
            if expr::BUILTIN_ROOTS.contains(&target) || self.lookup(target).is_some() {
                Ok(())
            } else {
                Err(CloudError::UnresolvedReference {
                    from: from.to_string(),
                    target: target.to_string(),
                })
            }
        };

        for resource in &self.resources {
            for target in resource.references() {
                check(&resource.name, &target)?;
            }
            if let Some(provider) = &resource.options.provider {
                match self.resource(provider) {
                    Some(p) if p.is_provider() => {}
                    _ => {
                        return Err(CloudError::InvalidResource {
                            name: resource.name.clone(),
                            message: format!("`{}` is not a provider", provider),
                        });
                    }
                }
            }
        }
        for variable in &self.variables {
            for found in interpolations_of(&variable.value) {
                check(&variable.name, &found.root)?;
            }
        }
        for output in &self.outputs {
            for found in interpolations_of(&output.value) {
                check(&output.name, &found.root)?;
            }
        }
        Ok(())
    }

    fn validate_secrets(&self) -> Result<()> {
        for output in self.outputs.iter().filter(|o| !o.secret) {
            if let Some(source_ref) = self.sensitive_source(&output.value) {
                return Err(CloudError::UnmarkedSecret {
                    output: output.name.clone(),
                    source_ref,
                });
            }
        }
        Ok(())
    }

    /// First credential-bearing value `value` reads, if any.
    fn sensitive_source(&self, value: &Value) -> Option<String> {
        if expr::is_secret(value) {
            return None;
        }
        if let Some(ret) = expr::invoke_return(value).filter(|r| CREDENTIAL_PROPERTIES.contains(r)) {
            return Some(ret.to_string());
        }
        interpolations_of(value)
            .into_iter()
            .find_map(|found| self.sensitive_interpolation(&found))
    }

    fn sensitive_interpolation(&self, found: &Interpolation) -> Option<String> {
        let property = found.property.as_deref();
        let path = || match property {
            Some(p) => format!("{}.{}", found.root, p),
            None => found.root.clone(),
        };
        let credential = property.is_some_and(|p| CREDENTIAL_PROPERTIES.contains(&p));

        match self.lookup(&found.root)? {
            Declared::Config(key) => key.secret.then(path),
            Declared::Resource(resource) => {
                let marked = property.is_some_and(|p| {
                    resource
                        .options
                        .additional_secret_outputs
                        .iter()
                        .any(|o| o == p)
                });
                (credential || marked).then(path)
            }
            Declared::Variable(variable) => {
                if credential || expr::is_secret(&variable.value) {
                    Some(path())
                } else {
                    self.sensitive_source(&variable.value).map(|_| path())
                }
            }
        }
    }

    /// Resources in a stable topological order.
    ///
    /// Among resources that are ready at the same time, declaration order wins.
    pub fn dependency_order(&self) -> Result<Vec<&Resource>> {
        // Node ids: resources first, then variables.
        let resource_count = self.resources.len();
        let index: HashMap<&str, usize> = self
            .resources
            .iter()
            .map(|r| r.name.as_str())
            .chain(self.variables.iter().map(|v| v.name.as_str()))
            .enumerate()
            .map(|(i, name)| (name, i))
            .collect();
        let node_count = index.len();

        let mut dependencies: Vec<HashSet<usize>> = Vec::with_capacity(node_count);
        for resource in &self.resources {
            dependencies.push(resource_deps(&resource.references(), &index));
        }
        for variable in &self.variables {
            let roots: Vec<String> = interpolations_of(&variable.value)
                .into_iter()
                .map(|i| i.root)
                .collect();
            dependencies.push(resource_deps(&roots, &index));
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); node_count];
        let mut pending: Vec<usize> = vec![0; node_count];
        for (node, deps) in dependencies.iter().enumerate() {
            pending[node] = deps.len();
            for &dep in deps {
                dependents[dep].push(node);
            }
        }

        let mut ready: BTreeSet<usize> = (0..node_count).filter(|&n| pending[n] == 0).collect();
        let mut order = Vec::with_capacity(node_count);
        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &dependent in &dependents[node] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != node_count {
            let done: HashSet<usize> = order.iter().copied().collect();
            let names = self
                .resources
                .iter()
                .map(|r| r.name.clone())
                .chain(self.variables.iter().map(|v| v.name.clone()))
                .enumerate()
                .filter(|(i, _)| !done.contains(i))
                .map(|(_, name)| name)
                .collect();
            return Err(CloudError::Cycle(names));
        }

        Ok(order
            .into_iter()
            .filter(|&n| n < resource_count)
            .map(|n| &self.resources[n])
            .collect())
    }

    pub fn plan(&self) -> Result<Plan> {
        let actions = self
            .dependency_order()?
            .into_iter()
            .map(|resource| Action {
                id: resource.name.clone(),
                action_type: if resource.get.is_some() {
                    ActionType::Read
                } else {
                    ActionType::Declare
                },
                resource_type: resource.resource_type.clone(),
                provider: resource.options.provider.clone(),
                depends_on: resource
                    .references()
                    .into_iter()
                    .filter(|name| self.resource(name).is_some())
                    .collect(),
            })
            .collect();
        let exports = self.outputs.iter().map(|o| o.name.clone()).collect();
        Ok(Plan::new(actions, exports))
    }

    /// Render the YAML program.
    pub fn to_yaml(&self) -> Result<String> {
        let mut root = Mapping::new();
        root.insert("name".into(), self.name.as_str().into());
        root.insert("runtime".into(), "yaml".into());
        root.insert("description".into(), self.description.as_str().into());

        if !self.config.is_empty() {
            let mut config = Mapping::new();
            for key in &self.config {
                let mut decl = Mapping::new();
                decl.insert("type".into(), "string".into());
                if key.secret {
                    decl.insert("secret".into(), true.into());
                }
                config.insert(key.name.as_str().into(), Yaml::Mapping(decl));
            }
            root.insert("config".into(), Yaml::Mapping(config));
        }

        if !self.variables.is_empty() {
            let mut variables = Mapping::new();
            for variable in &self.variables {
                variables.insert(variable.name.as_str().into(), serde_yaml::to_value(&variable.value)?);
            }
            root.insert("variables".into(), Yaml::Mapping(variables));
        }

        let mut resources = Mapping::new();
        for resource in &self.resources {
            resources.insert(resource.name.as_str().into(), render_resource(resource)?);
        }
        root.insert("resources".into(), Yaml::Mapping(resources));

        if !self.outputs.is_empty() {
            let mut outputs = Mapping::new();
            for output in &self.outputs {
                let value = if output.secret && !expr::is_secret(&output.value) {
                    expr::secret(output.value.clone())
                } else {
                    output.value.clone()
                };
                outputs.insert(output.name.as_str().into(), serde_yaml::to_value(&value)?);
            }
            root.insert("outputs".into(), Yaml::Mapping(outputs));
        }

        Ok(serde_yaml::to_string(&Yaml::Mapping(root))?)
    }
}

fn interpolations_of(value: &Value) -> Vec<Interpolation> {
    let mut found = Vec::new();
    expr::collect_interpolations(value, &mut found);
    found
}

fn resource_deps(roots: &[String], index: &HashMap<&str, usize>) -> HashSet<usize> {
    roots
        .iter()
        .filter_map(|root| index.get(root.as_str()).copied())
        .collect()
}

fn render_resource(resource: &Resource) -> Result<Yaml> {
    let mut entry = Mapping::new();
    entry.insert("type".into(), resource.resource_type.as_str().into());
    if let Some(id) = &resource.get {
        let mut get = Mapping::new();
        get.insert("id".into(), id.as_str().into());
        entry.insert("get".into(), Yaml::Mapping(get));
    }
    if resource.properties.as_object().is_some_and(|p| !p.is_empty()) {
        entry.insert("properties".into(), serde_yaml::to_value(&resource.properties)?);
    }
    if !resource.options.is_empty() {
        entry.insert("options".into(), serde_yaml::to_value(resource.options.to_value())?);
    }
    Ok(Yaml::Mapping(entry))
}
