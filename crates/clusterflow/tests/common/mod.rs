use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const TALOS: &str = r#"
cloudflare:
  api-key: op://Pulumi/cloudflare/credential
  email: admin@example.com
  zone: example.com
proxmox:
  api-token: op://Pulumi/proxmox/credential
  api-endpoint: https://pve.example.com:8006/
  node-name: pve
talos:
  version: v1.9.2
  network: 10.0.1.0/24
  control-plane:
    nodes: 3
    cores: 2
    memory-min: 2048
    memory-max: 4096
    disks:
      - size: 20
    start-address: 10.0.1.10
  worker:
    nodes: 2
    cores: 4
    memory-min: 4096
    memory-max: 8192
    disks:
      - size: 20
      - size: 200
    start-address: 10.0.1.20
"#;

#[allow(dead_code)]
pub const MICROK8S: &str = r#"
cert-manager:
  version: v1.16.2
cloudflare:
  api-key: op://Pulumi/cloudflare/credential
  email: admin@example.com
  zone: example.com
proxmox:
  api-token: op://Pulumi/proxmox/credential
  api-endpoint: https://pve.example.com:8006/
  node-name: pve
opnsense:
  api-endpoint: https://opnsense.example.com
  api-key: op://Pulumi/opnsense/username
  api-secret: op://Pulumi/opnsense/credential
traefik:
  version: 33.2.1
csi-nfs-driver:
  version: v4.9.0
microk8s:
  ssh-public-key: ssh-ed25519 AAAAC3Nza admin
  version: 1.32/stable
  onepassword-vault: Pulumi
  master-nodes:
    - name: k8s-master-0
      cores: 4
      memory-min: 4096
      memory-max: 8192
      disks:
        - size: 32
      address: 10.0.0.20/24
  metallb:
    start: 10.0.0.100
    end: 10.0.0.110
    version: 0.14.9
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write(&self, name: &str, content: &str) {
        fs::write(self.root.path().join(name), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// `cflow` running inside the project, isolated from the caller's environment.
    pub fn cflow(&self) -> Command {
        #[allow(deprecated)]
        let mut cmd = Command::cargo_bin("cflow").unwrap();
        cmd.current_dir(self.path())
            .env_remove("CLUSTERFLOW_CONFIG_PATH")
            .env_remove("CLUSTERFLOW_STACK")
            .env_remove("CLUSTERFLOW_PROJECT")
            .env_remove("RUST_LOG");
        cmd
    }
}
