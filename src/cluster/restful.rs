//! Manager REST connection
//!
//! Issues administrative commands through the storage cluster manager's
//! REST endpoint (`POST /request?wait=1`), authenticating as the requested
//! user with an API key.

use crate::domain::{Connection, ConnectionFactory, ConnectionRef, MonCommandOutput};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the manager REST endpoint
#[derive(Debug, Clone)]
pub struct RestfulConfig {
    /// Base URL, e.g. `https://mgr:8003`
    pub endpoint: String,
    /// API key of the admin user
    pub api_key: String,
    /// Per-command timeout
    pub request_timeout: Duration,
    /// Accept self-signed manager certificates
    pub insecure_tls: bool,
}

impl Default for RestfulConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://127.0.0.1:8003".to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(30),
            insecure_tls: false,
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct RequestResult {
    #[serde(default)]
    finished: Vec<CommandResult>,
    #[serde(default)]
    failed: Vec<CommandResult>,
    #[serde(default)]
    has_failed: bool,
}

#[derive(Debug, Deserialize)]
struct CommandResult {
    #[serde(default)]
    command: String,
    #[serde(default)]
    outb: String,
    #[serde(default)]
    outs: String,
}

impl RequestResult {
    fn into_output(self) -> Result<MonCommandOutput> {
        if self.has_failed || !self.failed.is_empty() {
            let failed = self.failed.into_iter().next();
            return Err(Error::Command {
                command: failed.as_ref().map(|f| f.command.clone()).unwrap_or_default(),
                message: failed.map(|f| f.outs).unwrap_or_else(|| "request failed".into()),
            });
        }

        let finished = self
            .finished
            .into_iter()
            .next()
            .ok_or_else(|| Error::malformed("manager response", "no finished command"))?;

        Ok(MonCommandOutput {
            buffer: finished.outb.into_bytes(),
            info: finished.outs,
        })
    }
}

// =============================================================================
// Connection
// =============================================================================

/// Connection to the manager REST endpoint
pub struct RestfulConnection {
    client: reqwest::Client,
    endpoint: String,
    user: String,
    api_key: String,
}

#[async_trait]
impl Connection for RestfulConnection {
    async fn mon_command(&self, args: &[u8]) -> Result<MonCommandOutput> {
        let url = format!("{}/request", self.endpoint.trim_end_matches('/'));
        debug!("POST {} ({} byte command)", url, args.len());

        let response = self
            .client
            .post(url)
            .query(&[("wait", "1")])
            .basic_auth(&self.user, Some(&self.api_key))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(args.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Command {
                command: String::from_utf8_lossy(args).into_owned(),
                message: format!("manager returned {}", response.status()),
            });
        }

        let result: RequestResult = response.json().await?;
        result.into_output()
    }
}

/// Factory for [`RestfulConnection`]s
pub struct RestfulConnectionFactory {
    config: RestfulConfig,
}

impl RestfulConnectionFactory {
    pub fn new(config: RestfulConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionFactory for RestfulConnectionFactory {
    async fn connect(&self, cluster_name: &str, user: &str) -> Result<ConnectionRef> {
        debug!("Opening manager session to {} as {}", cluster_name, user);

        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .danger_accept_invalid_certs(self.config.insecure_tls)
            .build()?;

        Ok(Box::new(RestfulConnection {
            client,
            endpoint: self.config.endpoint.clone(),
            user: user.to_string(),
            api_key: self.config.api_key.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finished_request_yields_output() {
        let body = r#"{"finished":[{"command":"osd lspools","outb":"[]","outs":"done"}],"failed":[],"has_failed":false,"is_finished":true}"#;
        let result: RequestResult = serde_json::from_str(body).unwrap();

        let output = result.into_output().unwrap();
        assert_eq!(output.buffer, b"[]");
        assert_eq!(output.info, "done");
    }

    #[test]
    fn test_failed_request_keeps_cluster_message() {
        let body = r#"{"finished":[],"failed":[{"command":"osd pool create","outb":"","outs":"pool 'p' already exists"}],"has_failed":true}"#;
        let result: RequestResult = serde_json::from_str(body).unwrap();

        match result.into_output() {
            Err(Error::Command { command, message }) => {
                assert_eq!(command, "osd pool create");
                assert_eq!(message, "pool 'p' already exists");
            }
            other => panic!("expected command failure, got {:?}", other.map(|o| o.info)),
        }
    }
}
