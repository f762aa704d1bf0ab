//! Virtual machine declarations

use clusterflow_cloud::{Resource, ResourceOptions, ResourceRef};
use clusterflow_config::{DiskConfig, Ipv4Interface};
use serde_json::{Map, Value, json};

pub const VM_TYPE: &str = "proxmoxve:VM/virtualMachine:VirtualMachine";

/// Disk read limit that matches what the hypervisor reports back; without it
/// every refresh shows a spurious diff.
const DISK_READ_SPEED: u32 = 10000;

#[derive(Debug, Clone, PartialEq)]
pub enum BootSource {
    /// Root disk is imported from a downloaded cloud image.
    CloudImage { file_id: String },
    /// Installer ISO in the CD drive, installed onto the first disk.
    Iso { file_id: String },
}

/// Static network configuration and user data for cloud-init.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudInit {
    pub address: Ipv4Interface,
    pub user_data_file_id: String,
}

/// Descriptor of one virtual machine.
#[derive(Debug, Clone, PartialEq)]
pub struct VmSpec {
    pub name: String,
    pub node_name: String,
    pub description: Option<String>,
    pub cores: u32,
    /// Floating memory (balloon floor), MiB
    pub memory_min: u32,
    /// Dedicated memory, MiB
    pub memory_max: u32,
    pub disks: Vec<DiskConfig>,
    pub datastore_id: Option<String>,
    pub bridge: String,
    pub vlan: Option<u16>,
    pub tags: Vec<String>,
    pub boot: BootSource,
    pub cloud_init: Option<CloudInit>,
    pub on_boot: bool,
    pub protection: bool,
}

impl VmSpec {
    fn disk_entries(&self) -> Vec<Value> {
        self.disks
            .iter()
            .enumerate()
            .map(|(idx, disk)| {
                let mut entry = json!({
                    "interface": format!("virtio{}", idx),
                    "size": disk.size,
                    "iothread": true,
                    "discard": "on",
                    "fileFormat": "raw",
                    "speed": { "read": DISK_READ_SPEED },
                });
                if let Some(datastore) = &self.datastore_id {
                    entry["datastoreId"] = json!(datastore);
                }
                if let (0, BootSource::CloudImage { file_id }) = (idx, &self.boot) {
                    entry["fileId"] = json!(file_id);
                }
                entry
            })
            .collect()
    }

    fn network_device(&self) -> Value {
        let mut device = json!({ "bridge": self.bridge, "model": "virtio" });
        if let Some(vlan) = self.vlan {
            device["vlanId"] = json!(vlan);
        }
        device
    }

    /// Declaration of the VM. The CD drive is ignored after creation so that
    /// ejecting the installer does not replace the machine.
    pub fn to_resource(&self, provider: &ResourceRef) -> Resource {
        let mut props = Map::new();
        props.insert("name".to_string(), json!(self.name));
        props.insert("nodeName".to_string(), json!(self.node_name));
        if let Some(description) = &self.description {
            props.insert("description".to_string(), json!(description));
        }
        if !self.tags.is_empty() {
            props.insert("tags".to_string(), json!(self.tags));
        }
        props.insert("cpu".to_string(), json!({ "cores": self.cores, "type": "host" }));
        props.insert(
            "memory".to_string(),
            json!({ "dedicated": self.memory_max, "floating": self.memory_min }),
        );
        props.insert("disks".to_string(), Value::Array(self.disk_entries()));
        props.insert("networkDevices".to_string(), json!([self.network_device()]));
        props.insert("machine".to_string(), json!("q35"));
        props.insert("agent".to_string(), json!({ "enabled": true }));
        props.insert("stopOnDestroy".to_string(), json!(true));

        match &self.boot {
            BootSource::CloudImage { .. } => {
                props.insert("operatingSystem".to_string(), json!({ "type": "l26" }));
                props.insert("cdrom".to_string(), json!({ "enabled": false }));
            }
            BootSource::Iso { file_id } => {
                props.insert("cdrom".to_string(), json!({ "enabled": true, "fileId": file_id }));
                props.insert("bootOrders".to_string(), json!(["virtio0", "ide3"]));
            }
        }

        if let Some(init) = &self.cloud_init {
            let gateway = init.address.gateway().to_string();
            props.insert(
                "initialization".to_string(),
                json!({
                    "ipConfigs": [{
                        "ipv4": {
                            "address": init.address.to_string(),
                            "gateway": gateway,
                        },
                    }],
                    "dns": {
                        "domain": "local",
                        "servers": [gateway],
                    },
                    "userDataFileId": init.user_data_file_id,
                }),
            );
        }

        if self.on_boot {
            props.insert("onBoot".to_string(), json!(true));
        }
        if self.protection {
            props.insert("protection".to_string(), json!(true));
        }

        Resource::new(&self.name, VM_TYPE, Value::Object(props)).with_options(
            ResourceOptions::default()
                .provider(provider)
                .ignore_changes("cdrom"),
        )
    }
}
