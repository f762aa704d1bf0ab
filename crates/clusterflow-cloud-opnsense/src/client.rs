//! Unbound host-override API client
//!
//! Talks to `/api/unbound/...` with an API key/secret pair (HTTP basic auth).

use crate::error::{OpnsenseError, Result};
use clusterflow_config::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A,
    Aaaa,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }

    pub fn for_address(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::Aaaa,
        }
    }
}

/// Desired host override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOverride {
    pub host: String,
    pub domain: String,
    pub record_type: RecordType,
    pub ip: IpAddr,
}

impl HostOverride {
    pub fn new(host: impl Into<String>, domain: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            host: host.into(),
            domain: domain.into(),
            record_type: RecordType::for_address(ip),
            ip,
        }
    }

    pub fn fqdn(&self) -> String {
        format!("{}.{}", self.host, self.domain)
    }

    fn payload(&self) -> Value {
        json!({
            "host": {
                "enabled": "1",
                "hostname": self.host,
                "domain": self.domain,
                "rr": self.record_type.as_str(),
                "server": self.ip.to_string(),
                "description": "managed by clusterflow",
            }
        })
    }
}

/// Existing host override
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostOverrideRecord {
    pub uuid: String,
    pub hostname: String,
    pub domain: String,
    #[serde(default)]
    pub server: String,
}

/// Result of [`OpnsenseClient::ensure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for EnsureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnsureOutcome::Created => write!(f, "created"),
            EnsureOutcome::Updated => write!(f, "updated"),
            EnsureOutcome::Unchanged => write!(f, "unchanged"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpnsenseCredentials {
    pub url: String,
    pub api_key: String,
    pub api_secret: SecretString,
    pub insecure: bool,
}

impl OpnsenseCredentials {
    /// Read `OPNSENSE_URL`, `OPNSENSE_API_KEY`, `OPNSENSE_API_SECRET` and
    /// the optional `OPNSENSE_INSECURE`.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| OpnsenseError::MissingEnvVar(name.to_string()))
        };
        let url = var("OPNSENSE_URL")?;
        let api_key = var("OPNSENSE_API_KEY")?;
        let api_secret = SecretString::new(var("OPNSENSE_API_SECRET")?);
        let insecure = match std::env::var("OPNSENSE_INSECURE") {
            Ok(value) => value.parse::<bool>().map_err(|_| {
                OpnsenseError::InvalidConfig(format!("OPNSENSE_INSECURE: expected true or false, got {}", value))
            })?,
            Err(_) => false,
        };

        Ok(Self {
            url,
            api_key,
            api_secret,
            insecure,
        })
    }
}

pub struct OpnsenseClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: SecretString,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    rows: Vec<HostOverrideRecord>,
}

#[derive(Debug, Deserialize)]
struct MutationResponse {
    #[serde(default)]
    result: String,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    validations: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    current: u32,
    row_count: i32,
    search_phrase: &'a str,
}

impl OpnsenseClient {
    pub fn new(credentials: OpnsenseCredentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(credentials.insecure)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: credentials.url.trim_end_matches('/').to_string(),
            api_key: credentials.api_key,
            api_secret: credentials.api_secret,
        })
    }

    async fn post<T: for<'de> Deserialize<'de>>(&self, path: &str, body: &Value) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "OPNsense request");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.api_key, Some(self.api_secret.expose()))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OpnsenseError::ApiError {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    fn check(action: &str, response: &MutationResponse, expected: &str) -> Result<()> {
        if response.result == expected {
            return Ok(());
        }
        let message = match &response.validations {
            Some(validations) => validations.to_string(),
            None => format!("result `{}`", response.result),
        };
        Err(OpnsenseError::Rejected {
            action: action.to_string(),
            message,
        })
    }

    /// Override for exactly `host`.`domain`, if one exists.
    pub async fn find(&self, host: &str, domain: &str) -> Result<Option<HostOverrideRecord>> {
        let request = serde_json::to_value(SearchRequest {
            current: 1,
            row_count: -1,
            search_phrase: host,
        })
        .map_err(|e| OpnsenseError::InvalidConfig(e.to_string()))?;
        let response: SearchResponse = self
            .post("/api/unbound/settings/searchHostOverride", &request)
            .await?;
        // The search is a substring match over all columns.
        Ok(response
            .rows
            .into_iter()
            .find(|r| r.hostname == host && r.domain == domain))
    }

    /// Create an override and return its uuid.
    pub async fn add(&self, record: &HostOverride) -> Result<String> {
        let response: MutationResponse = self
            .post("/api/unbound/settings/addHostOverride", &record.payload())
            .await?;
        Self::check("addHostOverride", &response, "saved")?;
        response.uuid.ok_or_else(|| OpnsenseError::Rejected {
            action: "addHostOverride".to_string(),
            message: "no uuid in response".to_string(),
        })
    }

    pub async fn set(&self, uuid: &str, record: &HostOverride) -> Result<()> {
        let response: MutationResponse = self
            .post(&format!("/api/unbound/settings/setHostOverride/{}", uuid), &record.payload())
            .await?;
        Self::check("setHostOverride", &response, "saved")
    }

    pub async fn delete(&self, uuid: &str) -> Result<()> {
        let response: MutationResponse = self
            .post(&format!("/api/unbound/settings/delHostOverride/{}", uuid), &json!({}))
            .await?;
        Self::check("delHostOverride", &response, "deleted")
    }

    /// Apply pending changes to the running resolver.
    pub async fn reconfigure(&self) -> Result<()> {
        let response: Value = self
            .post("/api/unbound/service/reconfigure", &json!({}))
            .await?;
        match response.get("status").and_then(Value::as_str) {
            Some(status) if status.eq_ignore_ascii_case("ok") => Ok(()),
            _ => Err(OpnsenseError::Rejected {
                action: "reconfigure".to_string(),
                message: response.to_string(),
            }),
        }
    }

    /// Make the override exist with the given address (create or update).
    #[tracing::instrument(skip(self), fields(fqdn = %record.fqdn()))]
    pub async fn ensure(&self, record: &HostOverride) -> Result<EnsureOutcome> {
        let ip = record.ip.to_string();
        let outcome = match self.find(&record.host, &record.domain).await? {
            Some(existing) if existing.server == ip => {
                debug!("Host override already points at {}", ip);
                return Ok(EnsureOutcome::Unchanged);
            }
            Some(existing) => {
                info!("Updating host override from {} to {}", existing.server, ip);
                self.set(&existing.uuid, record).await?;
                EnsureOutcome::Updated
            }
            None => {
                info!("Creating host override -> {}", ip);
                self.add(record).await?;
                EnsureOutcome::Created
            }
        };
        self.reconfigure().await?;
        Ok(outcome)
    }

    /// Delete the override if it exists. Returns whether anything was removed.
    pub async fn remove(&self, host: &str, domain: &str) -> Result<bool> {
        match self.find(host, domain).await? {
            Some(record) => {
                info!("Deleting host override {}.{}", host, domain);
                self.delete(&record.uuid).await?;
                self.reconfigure().await?;
                Ok(true)
            }
            None => {
                debug!("Host override not found, nothing to delete: {}.{}", host, domain);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::post,
    };
    use std::net::Ipv4Addr;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Unbound {
        rows: Vec<HostOverrideRecord>,
        calls: Vec<String>,
    }

    type Shared = Arc<Mutex<Unbound>>;

    // "key:secret"
    const AUTH: &str = "Basic a2V5OnNlY3JldA==";

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("authorization").is_some_and(|v| v == AUTH)
    }

    async fn search(State(state): State<Shared>, headers: HeaderMap) -> impl IntoResponse {
        if !authorized(&headers) {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
        let mut unbound = state.lock().unwrap();
        unbound.calls.push("search".to_string());
        let rows = unbound.rows.clone();
        Json(json!({
            "rows": rows.iter().map(|r| json!({
                "uuid": r.uuid, "hostname": r.hostname, "domain": r.domain,
                "server": r.server, "rr": "A (IPv4 address)", "enabled": "1",
            })).collect::<Vec<_>>(),
        }))
        .into_response()
    }

    async fn add(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
        let mut unbound = state.lock().unwrap();
        unbound.calls.push("add".to_string());
        let uuid = format!("uuid-{}", unbound.rows.len());
        unbound.rows.push(HostOverrideRecord {
            uuid: uuid.clone(),
            hostname: body["host"]["hostname"].as_str().unwrap().to_string(),
            domain: body["host"]["domain"].as_str().unwrap().to_string(),
            server: body["host"]["server"].as_str().unwrap().to_string(),
        });
        Json(json!({"result": "saved", "uuid": uuid}))
    }

    async fn set(
        State(state): State<Shared>,
        Path(uuid): Path<String>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let mut unbound = state.lock().unwrap();
        unbound.calls.push(format!("set {}", uuid));
        if let Some(row) = unbound.rows.iter_mut().find(|r| r.uuid == uuid) {
            row.server = body["host"]["server"].as_str().unwrap().to_string();
        }
        Json(json!({"result": "saved"}))
    }

    async fn delete(State(state): State<Shared>, Path(uuid): Path<String>) -> Json<Value> {
        let mut unbound = state.lock().unwrap();
        unbound.calls.push(format!("del {}", uuid));
        unbound.rows.retain(|r| r.uuid != uuid);
        Json(json!({"result": "deleted"}))
    }

    async fn reconfigure(State(state): State<Shared>) -> Json<Value> {
        state.lock().unwrap().calls.push("reconfigure".to_string());
        Json(json!({"status": "ok"}))
    }

    async fn serve(state: Shared) -> String {
        let app = Router::new()
            .route("/api/unbound/settings/searchHostOverride", post(search))
            .route("/api/unbound/settings/addHostOverride", post(add))
            .route("/api/unbound/settings/setHostOverride/{uuid}", post(set))
            .route("/api/unbound/settings/delHostOverride/{uuid}", post(delete))
            .route("/api/unbound/service/reconfigure", post(reconfigure))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn client(url: String, secret: &str) -> OpnsenseClient {
        OpnsenseClient::new(OpnsenseCredentials {
            url,
            api_key: "key".to_string(),
            api_secret: SecretString::new(secret),
            insecure: false,
        })
        .unwrap()
    }

    fn record(ip: [u8; 4]) -> HostOverride {
        HostOverride::new("k8s-ingress-dev", "example.com", IpAddr::V4(Ipv4Addr::from(ip)))
    }

    #[test]
    fn test_record_type() {
        assert_eq!(record([10, 0, 0, 100]).record_type, RecordType::A);
        assert_eq!(record([10, 0, 0, 100]).fqdn(), "k8s-ingress-dev.example.com");
        let v6 = HostOverride::new("h", "d", "fd00::1".parse().unwrap());
        assert_eq!(v6.record_type.as_str(), "AAAA");
    }

    #[tokio::test]
    async fn test_ensure_creates_then_updates() {
        let state = Shared::default();
        let client = client(serve(state.clone()).await, "secret");

        assert_eq!(client.ensure(&record([10, 0, 0, 100])).await.unwrap(), EnsureOutcome::Created);
        assert_eq!(client.ensure(&record([10, 0, 0, 100])).await.unwrap(), EnsureOutcome::Unchanged);
        assert_eq!(client.ensure(&record([10, 0, 0, 101])).await.unwrap(), EnsureOutcome::Updated);

        let unbound = state.lock().unwrap();
        assert_eq!(unbound.rows.len(), 1);
        assert_eq!(unbound.rows[0].server, "10.0.0.101");
        assert_eq!(
            unbound.calls,
            vec!["search", "add", "reconfigure", "search", "search", "set uuid-0", "reconfigure"]
        );
    }

    #[tokio::test]
    async fn test_find_matches_exact_host() {
        let state = Shared::default();
        state.lock().unwrap().rows.push(HostOverrideRecord {
            uuid: "other".to_string(),
            hostname: "k8s-ingress-dev2".to_string(),
            domain: "example.com".to_string(),
            server: "10.0.0.5".to_string(),
        });
        let client = client(serve(state.clone()).await, "secret");
        assert!(client.find("k8s-ingress-dev", "example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let state = Shared::default();
        let client = client(serve(state.clone()).await, "secret");

        assert!(!client.remove("k8s-ingress-dev", "example.com").await.unwrap());
        client.ensure(&record([10, 0, 0, 100])).await.unwrap();
        assert!(client.remove("k8s-ingress-dev", "example.com").await.unwrap());
        assert!(state.lock().unwrap().rows.is_empty());
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let state = Shared::default();
        let client = client(serve(state).await, "wrong");
        let err = client.find("h", "d").await.unwrap_err();
        assert!(matches!(err, OpnsenseError::ApiError { status: 401, .. }));
    }

    #[test]
    fn test_credentials_from_env() {
        temp_env::with_vars(
            [
                ("OPNSENSE_URL", Some("https://opnsense.local")),
                ("OPNSENSE_API_KEY", Some("key")),
                ("OPNSENSE_API_SECRET", Some("secret")),
                ("OPNSENSE_INSECURE", Some("true")),
            ],
            || {
                let creds = OpnsenseCredentials::from_env().unwrap();
                assert!(creds.insecure);
                assert_eq!(creds.api_secret.expose(), "secret");
            },
        );
        temp_env::with_var_unset("OPNSENSE_API_SECRET", || {
            temp_env::with_vars(
                [("OPNSENSE_URL", Some("u")), ("OPNSENSE_API_KEY", Some("k"))],
                || {
                    let err = OpnsenseCredentials::from_env().unwrap_err();
                    assert!(matches!(err, OpnsenseError::MissingEnvVar(ref v) if v == "OPNSENSE_API_SECRET"));
                },
            );
        });
    }
}
