//! etcd Coordination Store
//!
//! Talks to the etcd v2 keys API over HTTP. Each call is one round-trip;
//! nothing is cached client-side.

use crate::domain::CoordinationStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// etcd "key not found" error code
const KEY_NOT_FOUND: u32 = 100;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the etcd store
#[derive(Debug, Clone)]
pub struct EtcdConfig {
    /// Client endpoint, e.g. `http://127.0.0.1:2379`
    pub endpoint: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:2379".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct KeysResponse {
    node: KeysNode,
}

#[derive(Debug, Deserialize)]
struct KeysNode {
    key: Option<String>,
    value: Option<String>,
    #[serde(default)]
    nodes: Vec<KeysNode>,
}

#[derive(Debug, Deserialize)]
struct KeysError {
    #[serde(rename = "errorCode")]
    error_code: u32,
    #[serde(default)]
    message: String,
}

// =============================================================================
// etcd Store
// =============================================================================

/// Coordination store backed by etcd
pub struct EtcdStore {
    config: EtcdConfig,
    client: reqwest::Client,
}

impl EtcdStore {
    pub fn new(config: EtcdConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { config, client })
    }

    fn url(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();

        format!(
            "{}/v2/keys/{}",
            self.config.endpoint.trim_end_matches('/'),
            encoded.join("/")
        )
    }

    /// Read a key; `None` if etcd reports it missing
    async fn read(&self, key: &str) -> Result<Option<KeysNode>> {
        let response = self
            .client
            .get(self.url(key))
            .query(&[("sorted", "true")])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            let body: KeysError = response.json().await?;
            if body.error_code == KEY_NOT_FOUND {
                return Ok(None);
            }
            return Err(Error::Store(format!("GET {}: {}", key, body.message)));
        }

        if !response.status().is_success() {
            return Err(Error::Store(format!(
                "GET {}: unexpected status {}",
                key,
                response.status()
            )));
        }

        let body: KeysResponse = response.json().await?;
        Ok(Some(body.node))
    }
}

fn last_segment(key: &str) -> &str {
    key.trim_end_matches('/').rsplit('/').next().unwrap_or(key)
}

#[async_trait]
impl CoordinationStore for EtcdStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read(key).await?.and_then(|node| node.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        debug!("etcd set {}", key);

        let response = self
            .client
            .put(self.url(key))
            .form(&[("value", value)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Store(format!(
                "PUT {}: unexpected status {}",
                key,
                response.status()
            )));
        }

        Ok(())
    }

    async fn children(&self, key: &str) -> Result<Vec<String>> {
        let Some(node) = self.read(key).await? else {
            return Ok(Vec::new());
        };

        Ok(node
            .nodes
            .iter()
            .filter_map(|child| child.key.as_deref())
            .map(|child_key| last_segment(child_key).to_string())
            .collect())
    }
}
