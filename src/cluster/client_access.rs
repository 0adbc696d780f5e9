//! Client Access Resolver
//!
//! Builds the bundle a storage client needs to reach the cluster: monitor
//! addresses, user name and secret key. Either all parts resolve or the
//! call fails.

use crate::cluster::command::{run_json, MonCommand};
use crate::cluster::mon::get_mon_status;
use crate::domain::Connection;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Connection bundle handed to storage clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAccessInfo {
    pub mon_addresses: Vec<String>,
    pub user_name: String,
    pub secret_key: String,
}

#[derive(Debug, Deserialize)]
struct AuthKey {
    key: String,
}

/// Look up the secret key of `client.<user>`
pub async fn get_secret_key(conn: &dyn Connection, user: &str) -> Result<String> {
    let command = MonCommand::new("auth get-key").arg("entity", format!("client.{}", user));
    let auth: AuthKey = run_json(conn, &command).await?;

    if auth.key.is_empty() {
        return Err(Error::malformed(format!("key of client.{}", user), "empty"));
    }
    Ok(auth.key)
}

pub async fn get_client_access_info(conn: &dyn Connection, user: &str) -> Result<ClientAccessInfo> {
    let status = get_mon_status(conn).await?;
    let mon_addresses = status.addresses();
    if mon_addresses.is_empty() {
        return Err(Error::malformed("monitor map", "no monitors"));
    }

    let secret_key = get_secret_key(conn, user).await?;

    Ok(ClientAccessInfo {
        mon_addresses,
        user_name: user.to_string(),
        secret_key,
    })
}
