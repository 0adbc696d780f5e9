//! Administrative command construction and execution
//!
//! Commands are JSON objects with a `prefix` naming the command and one
//! field per argument, always requesting JSON output.

use crate::domain::{Connection, MonCommandOutput};
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

/// A single administrative command
#[derive(Debug, Clone)]
pub struct MonCommand {
    prefix: String,
    args: Map<String, Value>,
}

impl MonCommand {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let mut args = Map::new();
        args.insert("prefix".to_string(), Value::String(prefix.clone()));
        args.insert("format".to_string(), Value::String("json".to_string()));
        Self { prefix, args }
    }

    /// Add an argument
    pub fn arg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.args.insert(name.to_string(), value.into());
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Encoded form handed to [`Connection::mon_command`]
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.args)?)
    }
}

/// Run a command, returning the raw output
pub async fn run(conn: &dyn Connection, command: &MonCommand) -> Result<MonCommandOutput> {
    debug!("Issuing command: {}", command.prefix());
    conn.mon_command(&command.to_bytes()?).await
}

/// Run a command and decode its output buffer as JSON
pub async fn run_json<T: DeserializeOwned>(conn: &dyn Connection, command: &MonCommand) -> Result<T> {
    let output = run(conn, command).await?;
    serde_json::from_slice(&output.buffer).map_err(|e| {
        Error::malformed(format!("response to '{}'", command.prefix()), e)
    })
}
