//! Guest-agent address discovery
//!
//! A freshly created VM has no address the orchestrator can use until the
//! QEMU guest agent inside it starts and reports its interfaces. This is the
//! one place where provisioning blocks on the state of a running machine.

use crate::error::{ProxmoxError, Result};
use clusterflow_config::SecretString;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

const ETHERNET_PREFIX: &str = "en";

/// Polling schedule (exponential backoff)
#[derive(Debug, Clone, PartialEq)]
pub struct WaitConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_retries: 40,
            initial_delay_ms: 1000,
            max_delay_ms: 15000,
            multiplier: 2.0,
        }
    }
}

impl WaitConfig {
    /// Delay before retrying after attempt number `attempt` (milliseconds)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        (delay as u64).min(self.max_delay_ms)
    }
}

/// Interface as reported by `guest-network-get-interfaces`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NetworkInterface {
    pub name: String,
    #[serde(rename = "hardware-address", default)]
    pub hardware_address: Option<String>,
    #[serde(rename = "ip-addresses", default)]
    pub ip_addresses: Vec<IpAddress>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IpAddress {
    #[serde(rename = "ip-address-type")]
    pub address_type: String,
    #[serde(rename = "ip-address")]
    pub address: String,
    #[serde(default)]
    pub prefix: Option<u8>,
}

/// First non-loopback IPv4 address of the first ethernet interface.
pub fn select_ethernet_ipv4(interfaces: &[NetworkInterface]) -> Result<Ipv4Addr> {
    if interfaces.is_empty() {
        return Err(ProxmoxError::NoInterfaces);
    }
    let ethernet = interfaces
        .iter()
        .find(|i| i.name.starts_with(ETHERNET_PREFIX))
        .ok_or_else(|| {
            ProxmoxError::NoEthernetInterface(interfaces.iter().map(|i| i.name.clone()).collect())
        })?;

    ethernet
        .ip_addresses
        .iter()
        .filter(|a| a.address_type == "ipv4")
        .filter_map(|a| a.address.parse::<Ipv4Addr>().ok())
        .find(|a| !a.is_loopback())
        .ok_or_else(|| ProxmoxError::AddressNotAssigned(ethernet.name.clone()))
}

/// Connection settings for the Proxmox VE API
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub endpoint: String,
    /// `user@realm!token=secret`
    pub api_token: SecretString,
    pub insecure: bool,
}

impl ApiConfig {
    /// Read `PROXMOX_VE_ENDPOINT`, `PROXMOX_VE_API_TOKEN` and `PROXMOX_VE_INSECURE`,
    /// the variables the hypervisor provider itself understands.
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("PROXMOX_VE_ENDPOINT")
            .map_err(|_| ProxmoxError::MissingEnvVar("PROXMOX_VE_ENDPOINT".to_string()))?;
        let api_token = std::env::var("PROXMOX_VE_API_TOKEN")
            .map_err(|_| ProxmoxError::MissingEnvVar("PROXMOX_VE_API_TOKEN".to_string()))?;
        let insecure = match std::env::var("PROXMOX_VE_INSECURE") {
            Ok(value) => parse_bool(&value).ok_or_else(|| {
                ProxmoxError::InvalidConfig(format!("PROXMOX_VE_INSECURE: expected a boolean, got {}", value))
            })?,
            Err(_) => false,
        };

        Ok(Self {
            endpoint,
            api_token: SecretString::new(api_token),
            insecure,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" | "" => Some(false),
        _ => None,
    }
}

pub struct GuestAgentClient {
    client: reqwest::Client,
    endpoint: String,
    api_token: SecretString,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InterfacesResult {
    result: Vec<NetworkInterface>,
}

impl GuestAgentClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_token: config.api_token,
        })
    }

    /// Interfaces reported by the guest agent of `vmid`.
    pub async fn network_interfaces(&self, node: &str, vmid: u32) -> Result<Vec<NetworkInterface>> {
        let url = format!(
            "{}/api2/json/nodes/{}/qemu/{}/agent/network-get-interfaces",
            self.endpoint, node, vmid
        );
        debug!(url = %url, "Querying guest agent");

        let response = self
            .client
            .get(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("PVEAPIToken={}", self.api_token.expose()),
            )
            .send()
            .await?;

        let status = response.status();
        // The API answers 500 while the agent inside the guest is not up yet.
        if status == reqwest::StatusCode::INTERNAL_SERVER_ERROR {
            return Err(ProxmoxError::AgentNotRunning {
                node: node.to_string(),
                vmid,
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProxmoxError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: ApiResponse<InterfacesResult> = response.json().await?;
        Ok(body.data.map(|d| d.result).unwrap_or_default())
    }

    /// Poll until the guest reports an ethernet IPv4 address.
    #[tracing::instrument(skip(self, config))]
    pub async fn wait_for_ipv4(&self, node: &str, vmid: u32, config: &WaitConfig) -> Result<Ipv4Addr> {
        for attempt in 0..config.max_retries {
            let result = self
                .network_interfaces(node, vmid)
                .await
                .and_then(|interfaces| select_ethernet_ipv4(&interfaces));

            match result {
                Ok(address) => {
                    info!(%address, attempt, "Guest agent reported address");
                    return Ok(address);
                }
                Err(e) if e.is_not_ready() => {
                    debug!(attempt, reason = %e, "Guest not ready");
                }
                Err(e) => return Err(e),
            }

            if attempt + 1 < config.max_retries {
                sleep(Duration::from_millis(config.delay_for_attempt(attempt))).await;
            }
        }

        Err(ProxmoxError::Timeout {
            node: node.to_string(),
            vmid,
            attempts: config.max_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn iface(name: &str, addresses: &[(&str, &str)]) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            hardware_address: None,
            ip_addresses: addresses
                .iter()
                .map(|(kind, addr)| IpAddress {
                    address_type: kind.to_string(),
                    address: addr.to_string(),
                    prefix: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_delay_calculation() {
        let config = WaitConfig {
            max_retries: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 10000,
            multiplier: 2.0,
        };

        assert_eq!(config.delay_for_attempt(0), 1000);
        assert_eq!(config.delay_for_attempt(1), 2000);
        assert_eq!(config.delay_for_attempt(2), 4000);
        assert_eq!(config.delay_for_attempt(3), 8000);
        assert_eq!(config.delay_for_attempt(4), 10000); // capped at max
    }

    #[test]
    fn test_select_first_ethernet() {
        let interfaces = vec![
            iface("lo", &[("ipv4", "127.0.0.1")]),
            iface("ens18", &[("ipv6", "fe80::1"), ("ipv4", "10.0.1.53")]),
            iface("enp1s0", &[("ipv4", "10.0.2.9")]),
        ];
        assert_eq!(
            select_ethernet_ipv4(&interfaces).unwrap(),
            Ipv4Addr::new(10, 0, 1, 53)
        );
    }

    #[test]
    fn test_no_ethernet_interface() {
        let interfaces = vec![
            iface("lo", &[("ipv4", "127.0.0.1")]),
            iface("cni0", &[("ipv4", "10.244.0.1")]),
        ];
        match select_ethernet_ipv4(&interfaces).unwrap_err() {
            ProxmoxError::NoEthernetInterface(names) => assert_eq!(names, vec!["lo", "cni0"]),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_ethernet_without_ipv4_is_not_ready() {
        let interfaces = vec![iface("eth0", &[]), iface("ens18", &[("ipv6", "fe80::1")])];
        let err = select_ethernet_ipv4(&interfaces).unwrap_err();
        assert!(err.is_not_ready());
    }

    #[test]
    fn test_empty_interface_list_is_not_ready() {
        let err = select_ethernet_ipv4(&[]).unwrap_err();
        assert!(matches!(err, ProxmoxError::NoInterfaces));
        assert!(err.is_not_ready());
    }

    #[test]
    fn test_api_config_from_env() {
        temp_env::with_vars(
            [
                ("PROXMOX_VE_ENDPOINT", Some("https://pve:8006/")),
                ("PROXMOX_VE_API_TOKEN", Some("root@pam!ci=abc")),
                ("PROXMOX_VE_INSECURE", Some("true")),
            ],
            || {
                let config = ApiConfig::from_env().unwrap();
                assert!(config.insecure);
                assert_eq!(config.api_token.expose(), "root@pam!ci=abc");
            },
        );
        temp_env::with_vars_unset(["PROXMOX_VE_ENDPOINT", "PROXMOX_VE_API_TOKEN"], || {
            assert!(matches!(
                ApiConfig::from_env(),
                Err(ProxmoxError::MissingEnvVar(_))
            ));
        });
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(endpoint: String) -> GuestAgentClient {
        GuestAgentClient::new(ApiConfig {
            endpoint,
            api_token: SecretString::new("root@pam!ci=abc"),
            insecure: false,
        })
        .unwrap()
    }

    fn fast() -> WaitConfig {
        WaitConfig {
            max_retries: 5,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_wait_until_agent_reports_address() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/api2/json/nodes/{node}/qemu/{vmid}/agent/network-get-interfaces",
            get(move |headers: axum::http::HeaderMap| {
                let counter = counter.clone();
                async move {
                    assert_eq!(headers["authorization"], "PVEAPIToken=root@pam!ci=abc");
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        return (StatusCode::INTERNAL_SERVER_ERROR, "agent not running").into_response();
                    }
                    Json(json!({
                        "data": {
                            "result": [
                                {"name": "lo", "ip-addresses": [{"ip-address-type": "ipv4", "ip-address": "127.0.0.1", "prefix": 8}]},
                                {"name": "ens18", "ip-addresses": [{"ip-address-type": "ipv4", "ip-address": "10.0.1.53", "prefix": 24}]}
                            ]
                        }
                    }))
                    .into_response()
                }
            }),
        );
        let endpoint = serve(app).await;

        let address = client(endpoint).wait_for_ipv4("pve", 101, &fast()).await.unwrap();
        assert_eq!(address, Ipv4Addr::new(10, 0, 1, 53));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_while_interfaces_appear() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/api2/json/nodes/{node}/qemu/{vmid}/agent/network-get-interfaces",
            get(move || {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    match call {
                        0 => Json(json!({ "data": null })),
                        1 => Json(json!({ "data": { "result": [] } })),
                        2 => Json(json!({
                            "data": { "result": [{"name": "ens18", "ip-addresses": []}] }
                        })),
                        _ => Json(json!({
                            "data": {
                                "result": [
                                    {"name": "ens18", "ip-addresses": [{"ip-address-type": "ipv4", "ip-address": "10.0.1.54"}]}
                                ]
                            }
                        })),
                    }
                }
            }),
        );
        let endpoint = serve(app).await;

        let address = client(endpoint).wait_for_ipv4("pve", 102, &fast()).await.unwrap();
        assert_eq!(address, Ipv4Addr::new(10, 0, 1, 54));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let app = Router::new().route(
            "/api2/json/nodes/{node}/qemu/{vmid}/agent/network-get-interfaces",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "agent not running") }),
        );
        let endpoint = serve(app).await;

        let err = client(endpoint).wait_for_ipv4("pve", 101, &fast()).await.unwrap_err();
        assert!(matches!(err, ProxmoxError::Timeout { attempts: 5, .. }));
    }

    #[tokio::test]
    async fn test_auth_failure_is_fatal() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/api2/json/nodes/{node}/qemu/{vmid}/agent/network-get-interfaces",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { (StatusCode::UNAUTHORIZED, "no ticket") }
            }),
        );
        let endpoint = serve(app).await;

        let err = client(endpoint).wait_for_ipv4("pve", 101, &fast()).await.unwrap_err();
        assert!(matches!(err, ProxmoxError::ApiError { status: 401, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
