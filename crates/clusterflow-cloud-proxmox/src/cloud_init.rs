//! Cloud-init user data for MicroK8s nodes
//!
//! The document prepares the data disk, installs MicroK8s and starts the
//! QEMU guest agent last. The agent reporting an address is therefore the
//! signal that provisioning has finished.

use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;

const HEADER: &str = "#cloud-config\n";

const PACKAGES: [&str; 6] = [
    "apt-transport-https",
    "ca-certificates",
    "curl",
    "gpg",
    "net-tools",
    "vim",
];

const DATA_DEVICE: &str = "/dev/vdb";
const DATA_LABEL: &str = "data";
/// Where MicroK8s hostpath storage keeps volumes
pub const DATA_MOUNTPOINT: &str = "/var/snap/microk8s/common/default-storage";
const DONE_MARKER: &str = "/tmp/cloud-config.done";

/// Rendered user data, uploaded as a snippet named `file_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    pub file_name: String,
    pub data: String,
}

// Fields are declared in alphabetical order; the output is stable.
#[derive(Serialize)]
struct CloudConfig {
    device_aliases: BTreeMap<&'static str, &'static str>,
    disk_setup: BTreeMap<&'static str, DiskSetup>,
    fs_setup: Vec<FsSetup>,
    mounts: Vec<[&'static str; 2]>,
    runcmd: Vec<String>,
    users: Vec<UserEntry>,
}

#[derive(Serialize)]
struct DiskSetup {
    layout: bool,
    overwrite: bool,
    table_type: &'static str,
}

#[derive(Serialize)]
struct FsSetup {
    device: &'static str,
    filesystem: &'static str,
    label: &'static str,
}

#[derive(Serialize)]
#[serde(untagged)]
enum UserEntry {
    Default(&'static str),
    User(User),
}

#[derive(Serialize)]
struct User {
    groups: Vec<&'static str>,
    lock_passwd: bool,
    name: String,
    shell: &'static str,
    ssh_authorized_keys: Vec<String>,
    sudo: Vec<&'static str>,
}

fn runcmd(hostname: &str, username: &str) -> Vec<String> {
    let home = format!("/home/{}", username);
    vec![
        format!("hostnamectl set-hostname {}", hostname),
        "apt-get update -y".to_string(),
        "apt-get upgrade -y".to_string(),
        format!(
            "DEBIAN_FRONTEND=noninteractive apt-get install -y {}",
            PACKAGES.join(" ")
        ),
        "snap install microk8s --classic".to_string(),
        format!("usermod -a -G microk8s {}", username),
        "microk8s status --wait-ready".to_string(),
        format!("mkdir -p {}/.kube", home),
        format!("chown -f -R {0}:{0} {1}/.kube", username, home),
        format!("microk8s config > {}/.kube/config", home),
        "DEBIAN_FRONTEND=noninteractive apt-get install -y qemu-guest-agent".to_string(),
        "systemctl enable qemu-guest-agent".to_string(),
        "systemctl start qemu-guest-agent".to_string(),
        format!("echo \"done\" > {}", DONE_MARKER),
    ]
}

/// Build the user data of a MicroK8s node.
pub fn cloud_config(hostname: &str, username: &str, ssh_public_key: &str) -> Result<UserData> {
    let document = CloudConfig {
        device_aliases: BTreeMap::from([(DATA_LABEL, DATA_DEVICE)]),
        disk_setup: BTreeMap::from([(
            DATA_LABEL,
            DiskSetup {
                layout: true,
                overwrite: false,
                table_type: "gpt",
            },
        )]),
        fs_setup: vec![FsSetup {
            device: DATA_LABEL,
            filesystem: "ext4",
            label: DATA_LABEL,
        }],
        mounts: vec![["LABEL=data", DATA_MOUNTPOINT]],
        runcmd: runcmd(hostname, username),
        users: vec![
            UserEntry::Default("default"),
            UserEntry::User(User {
                groups: vec!["sudo"],
                lock_passwd: true,
                name: username.to_string(),
                shell: "/bin/bash",
                ssh_authorized_keys: vec![ssh_public_key.to_string()],
                sudo: vec!["ALL=(ALL) NOPASSWD:ALL"],
            }),
        ],
    };

    Ok(UserData {
        file_name: format!("{}.yaml", hostname),
        data: format!("{}{}", HEADER, serde_yaml::to_string(&document)?),
    })
}
