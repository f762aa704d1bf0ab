//! Snap store version lookup
//!
//! MicroK8s is tracked by snap channel. The version currently published in a
//! channel decides whether the node needs a refresh.

use crate::error::{KubeError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const SNAP_API_URL: &str = "https://api.snapcraft.io";
pub const DEFAULT_ARCHITECTURE: &str = "amd64";

/// Response of `GET /v2/snaps/info/<package>`, reduced to what is needed.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapInfo {
    #[serde(rename = "channel-map", default)]
    pub channel_map: Vec<ChannelMapEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelMapEntry {
    pub channel: Channel,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub name: String,
    pub architecture: String,
}

/// The version published in `channel` for `architecture`.
///
/// Exactly one entry must match; anything else means the channel name is
/// wrong or the store answered with something unexpected.
pub fn resolve_version(package: &str, info: &SnapInfo, channel: &str, architecture: &str) -> Result<String> {
    let matches: Vec<&ChannelMapEntry> = info
        .channel_map
        .iter()
        .filter(|e| e.channel.name == channel && e.channel.architecture == architecture)
        .collect();

    match matches.as_slice() {
        [entry] => Ok(entry.version.clone()),
        _ => Err(KubeError::AmbiguousVersion {
            package: package.to_string(),
            channel: channel.to_string(),
            architecture: architecture.to_string(),
            expected: 1,
            found: matches.len(),
        }),
    }
}

/// Source of published snap versions.
#[async_trait]
pub trait VersionSource: Send + Sync {
    async fn latest_version(&self, package: &str, channel: &str, architecture: &str) -> Result<String>;
}

/// Snap store API client.
pub struct SnapIndex {
    client: reqwest::Client,
    base_url: String,
}

impl SnapIndex {
    pub fn new() -> Result<Self> {
        Self::with_base_url(SNAP_API_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn info(&self, package: &str) -> Result<SnapInfo> {
        let url = format!("{}/v2/snaps/info/{}", self.base_url, package);
        debug!(url = %url, "Snap index request");

        let response = self
            .client
            .get(&url)
            .header("Snap-Device-Series", "16")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(KubeError::SnapIndex {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl VersionSource for SnapIndex {
    async fn latest_version(&self, package: &str, channel: &str, architecture: &str) -> Result<String> {
        let info = self.info(package).await?;
        resolve_version(package, &info, channel, architecture)
    }
}
