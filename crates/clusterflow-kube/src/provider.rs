//! Kubernetes declarations shared by the add-ons

use clusterflow_cloud::{Resource, ResourceOptions, ResourceRef};
use serde_json::{Map, Value, json};

pub const PROVIDER_TYPE: &str = "pulumi:providers:kubernetes";
pub const NAMESPACE_TYPE: &str = "kubernetes:core/v1:Namespace";
pub const SECRET_TYPE: &str = "kubernetes:core/v1:Secret";
pub const SERVICE_TYPE: &str = "kubernetes:core/v1:Service";
pub const CUSTOM_RESOURCE_TYPE: &str = "kubernetes:apiextensions.k8s.io:CustomResource";
pub const CHART_TYPE: &str = "kubernetes:helm.sh/v4:Chart";
pub const RELEASE_TYPE: &str = "kubernetes:helm.sh/v3:Release";

/// Cluster provider. With a namespace, namespaced objects that do not name
/// one land there.
pub fn kube_provider(name: &str, kubeconfig: impl Into<Value>, namespace: Option<&str>) -> Resource {
    let mut props = json!({ "kubeconfig": kubeconfig.into() });
    if let Some(namespace) = namespace {
        props["namespace"] = json!(namespace);
    }
    Resource::new(name, PROVIDER_TYPE, props)
}

pub fn namespace(name: &str, provider: &ResourceRef) -> Resource {
    Resource::new(name, NAMESPACE_TYPE, json!({ "metadata": { "name": name } }))
        .with_options(ResourceOptions::default().provider(provider))
}

/// A Helm chart, either expanded into individual objects (v4 `Chart`) or
/// installed as a single release (v3 `Release`).
#[derive(Debug, Clone)]
pub struct HelmChart {
    pub chart: String,
    /// Release name; defaults to the resource name.
    pub release_name: Option<String>,
    pub repository: String,
    pub version: Option<String>,
    pub namespace: Option<String>,
    pub values: Value,
}

impl HelmChart {
    pub fn new(chart: &str, repository: &str) -> Self {
        Self {
            chart: chart.to_string(),
            release_name: None,
            repository: repository.to_string(),
            version: None,
            namespace: None,
            values: Value::Null,
        }
    }

    pub fn version(mut self, version: Option<&str>) -> Self {
        self.version = version.map(str::to_string);
        self
    }

    pub fn release_name(mut self, name: &str) -> Self {
        self.release_name = Some(name.to_string());
        self
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    pub fn values(mut self, values: Value) -> Self {
        self.values = values;
        self
    }

    fn properties(&self) -> Value {
        let mut props = Map::new();
        props.insert("chart".to_string(), json!(self.chart));
        if let Some(name) = &self.release_name {
            props.insert("name".to_string(), json!(name));
        }
        if let Some(version) = &self.version {
            props.insert("version".to_string(), json!(version));
        }
        if let Some(namespace) = &self.namespace {
            props.insert("namespace".to_string(), json!(namespace));
        }
        props.insert("repositoryOpts".to_string(), json!({ "repo": self.repository }));
        if !self.values.is_null() {
            props.insert("values".to_string(), self.values.clone());
        }
        Value::Object(props)
    }

    pub fn chart(&self, name: &str, options: ResourceOptions) -> Resource {
        Resource::new(name, CHART_TYPE, self.properties()).with_options(options)
    }

    pub fn release(&self, name: &str, options: ResourceOptions) -> Resource {
        Resource::new(name, RELEASE_TYPE, self.properties()).with_options(options)
    }
}

/// Object of a type defined by a CRD.
pub fn custom_resource(name: &str, api_version: &str, kind: &str, metadata: Value, spec: Option<Value>) -> Resource {
    let mut props = json!({
        "apiVersion": api_version,
        "kind": kind,
        "metadata": metadata,
    });
    if let Some(spec) = spec {
        props["spec"] = spec;
    }
    Resource::new(name, CUSTOM_RESOURCE_TYPE, props)
}
