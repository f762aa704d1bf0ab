//! Provider and storage declarations

use crate::cloud_init::UserData;
use clusterflow_cloud::{Resource, ResourceOptions, ResourceRef};
use clusterflow_config::ProxmoxConfig;
use serde_json::{Value, json};

pub const PROVIDER_TYPE: &str = "pulumi:providers:proxmoxve";
pub const DOWNLOAD_FILE_TYPE: &str = "proxmoxve:Download/file:File";
pub const STORAGE_FILE_TYPE: &str = "proxmoxve:Storage/file:File";

const LOCAL_DATASTORE: &str = "local";

/// Explicit hypervisor provider. The API token comes from secret config.
pub fn provider(name: &str, config: &ProxmoxConfig, api_token: &ResourceRef) -> Resource {
    Resource::new(
        name,
        PROVIDER_TYPE,
        json!({
            "endpoint": config.api_endpoint,
            "apiToken": api_token.reference(),
            "insecure": config.insecure,
            "ssh": {
                "username": "root",
                "agent": true,
            },
        }),
    )
}

/// Download of an image into the node's `local` ISO storage.
#[derive(Debug, Clone)]
pub struct ImageDownload {
    pub node_name: String,
    /// Source URL; may be an interpolation.
    pub url: Value,
    pub file_name: Option<String>,
    /// Adopt a file of the same name that was uploaded outside the orchestrator.
    pub overwrite_unmanaged: bool,
}

impl ImageDownload {
    pub fn new(node_name: &str, url: impl Into<Value>) -> Self {
        Self {
            node_name: node_name.to_string(),
            url: url.into(),
            file_name: None,
            overwrite_unmanaged: false,
        }
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn overwrite_unmanaged(mut self) -> Self {
        self.overwrite_unmanaged = true;
        self
    }

    pub fn to_resource(&self, name: &str, provider: &ResourceRef, options: ResourceOptions) -> Resource {
        let mut props = json!({
            "contentType": "iso",
            "datastoreId": LOCAL_DATASTORE,
            "nodeName": self.node_name,
            "overwrite": false,
            "url": self.url,
        });
        if let Some(file_name) = &self.file_name {
            props["fileName"] = json!(file_name);
        }
        if self.overwrite_unmanaged {
            props["overwriteUnmanaged"] = json!(true);
        }
        Resource::new(name, DOWNLOAD_FILE_TYPE, props).with_options(options.provider(provider))
    }
}

/// Upload user data as a snippet. Replacing it deletes the old file first,
/// since the file name stays the same.
pub fn user_data_snippet(name: &str, node_name: &str, user_data: &UserData, provider: &ResourceRef) -> Resource {
    Resource::new(
        name,
        STORAGE_FILE_TYPE,
        json!({
            "nodeName": node_name,
            "datastoreId": LOCAL_DATASTORE,
            "contentType": "snippets",
            "sourceRaw": {
                "data": user_data.data,
                "fileName": user_data.file_name,
            },
        }),
    )
    .with_options(
        ResourceOptions::default()
            .provider(provider)
            .delete_before_replace(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterflow_config::SecretRef;

    fn config() -> ProxmoxConfig {
        ProxmoxConfig {
            api_token: SecretRef::parse("op://Pulumi/proxmox/credential").unwrap(),
            api_endpoint: "https://pve.example.com:8006/".to_string(),
            node_name: "pve".to_string(),
            insecure: true,
            bridge: "vmbr0".to_string(),
        }
    }

    #[test]
    fn test_provider() {
        let resource = provider("proxmox", &config(), &ResourceRef::new("proxmox-api-token"));
        assert!(resource.is_provider());
        assert_eq!(resource.properties["apiToken"], "${proxmox-api-token}");
        assert_eq!(resource.properties["insecure"], true);
        assert_eq!(resource.properties["ssh"]["username"], "root");
        assert_eq!(resource.references(), vec!["proxmox-api-token"]);
    }

    #[test]
    fn test_cloud_image_download() {
        let image = ImageDownload::new("pve", "https://cloud-images.ubuntu.com/noble.img")
            .overwrite_unmanaged()
            .to_resource(
                "cloud-image",
                &ResourceRef::new("proxmox"),
                ResourceOptions::default().retain_on_delete(),
            );
        assert_eq!(image.properties["contentType"], "iso");
        assert_eq!(image.properties["overwrite"], false);
        assert_eq!(image.properties["overwriteUnmanaged"], true);
        assert!(image.properties.get("fileName").is_none());
        assert!(image.options.retain_on_delete);
        assert_eq!(image.options.provider.as_deref(), Some("proxmox"));
    }

    #[test]
    fn test_snippet() {
        let user_data = UserData {
            file_name: "node.yaml".to_string(),
            data: "#cloud-config\n".to_string(),
        };
        let snippet = user_data_snippet("cloud-config", "pve", &user_data, &ResourceRef::new("proxmox"));
        assert_eq!(snippet.properties["contentType"], "snippets");
        assert_eq!(snippet.properties["sourceRaw"]["fileName"], "node.yaml");
        assert!(snippet.options.delete_before_replace);
    }
}
