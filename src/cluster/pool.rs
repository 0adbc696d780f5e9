//! Pool Reconciler
//!
//! Lists, describes and creates storage pools against the live cluster.
//! A pool is either replicated or erasure-coded; which one is decided
//! solely by whether its properties name an erasure-code profile.
//!
//! Erasure-code profiles follow the `<pool>_ecprofile` naming convention
//! and are created on demand, inheriting plugin and technique from the
//! cluster's `default` profile unless the request names an algorithm.

use crate::cluster::command::{run, run_json, MonCommand};
use crate::cluster::multi_json;
use crate::domain::Connection;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

/// Name of the profile every cluster ships with
pub const DEFAULT_PROFILE: &str = "default";

/// Separator between plugin and technique in an algorithm string
const ALGORITHM_SEPARATOR: &str = "::";

// =============================================================================
// Pool Types
// =============================================================================

/// Redundancy scheme of a pool, serialized as its numeric code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PoolType {
    Replicated,
    ErasureCoded,
}

impl From<PoolType> for u8 {
    fn from(pool_type: PoolType) -> u8 {
        match pool_type {
            PoolType::Replicated => 0,
            PoolType::ErasureCoded => 1,
        }
    }
}

impl TryFrom<u8> for PoolType {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(PoolType::Replicated),
            1 => Ok(PoolType::ErasureCoded),
            other => Err(format!("unknown pool type {}", other)),
        }
    }
}

impl std::fmt::Display for PoolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolType::Replicated => write!(f, "replicated"),
            PoolType::ErasureCoded => write!(f, "erasure"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ErasureCodedConfig {
    pub data_chunk_count: u32,
    pub coding_chunk_count: u32,
    /// `"<plugin>::<technique>"`
    pub algorithm: String,
}

impl ErasureCodedConfig {
    fn is_zero(&self) -> bool {
        self == &Self::default()
    }
}

/// A storage pool
///
/// Exactly one of the two configs is meaningful; the other stays zeroed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub pool_name: String,
    pub pool_num: i64,
    #[serde(rename = "type")]
    pub pool_type: PoolType,
    pub replication_config: ReplicationConfig,
    pub erasure_coded_config: ErasureCodedConfig,
}

/// Pool creation request as received from a client
///
/// Every field is optional on the wire so that incomplete requests fail
/// validation instead of deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolRequest {
    pub pool_name: Option<String>,
    pub pool_num: Option<i64>,
    #[serde(rename = "type")]
    pub pool_type: Option<PoolType>,
    pub replication_config: Option<ReplicationConfig>,
    pub erasure_coded_config: Option<ErasureCodedConfig>,
}

impl PoolRequest {
    /// Check preconditions and produce the pool to create
    pub fn validate(self) -> Result<Pool> {
        let pool_name = self
            .pool_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| Error::Validation("pool name is required".into()))?;
        let pool_type = self
            .pool_type
            .ok_or_else(|| Error::Validation(format!("pool {}: type is required", pool_name)))?;
        let replication_config = self.replication_config.unwrap_or_default();
        let erasure_coded_config = self.erasure_coded_config.unwrap_or_default();

        match pool_type {
            PoolType::Replicated => {
                if replication_config.size == 0 {
                    return Err(Error::Validation(format!(
                        "pool {}: replicated pools need replicationConfig.size > 0",
                        pool_name
                    )));
                }
                if !erasure_coded_config.is_zero() {
                    return Err(Error::Validation(format!(
                        "pool {}: erasureCodedConfig set on a replicated pool",
                        pool_name
                    )));
                }
            }
            PoolType::ErasureCoded => {
                if erasure_coded_config.data_chunk_count == 0
                    || erasure_coded_config.coding_chunk_count == 0
                {
                    return Err(Error::Validation(format!(
                        "pool {}: erasure-coded pools need dataChunkCount and codingChunkCount > 0",
                        pool_name
                    )));
                }
                if replication_config.size != 0 {
                    return Err(Error::Validation(format!(
                        "pool {}: replicationConfig set on an erasure-coded pool",
                        pool_name
                    )));
                }
                if !erasure_coded_config.algorithm.is_empty() {
                    parse_algorithm(&erasure_coded_config.algorithm)?;
                }
            }
        }

        Ok(Pool {
            pool_name,
            pool_num: self.pool_num.unwrap_or_default(),
            pool_type,
            replication_config,
            erasure_coded_config,
        })
    }
}

/// Split `"plugin::technique"`
pub fn parse_algorithm(algorithm: &str) -> Result<(String, String)> {
    match algorithm.split_once(ALGORITHM_SEPARATOR) {
        Some((plugin, technique)) if !plugin.is_empty() && !technique.is_empty() => {
            Ok((plugin.to_string(), technique.to_string()))
        }
        _ => Err(Error::Validation(format!(
            "algorithm '{}' is not of the form plugin::technique",
            algorithm
        ))),
    }
}

// =============================================================================
// Erasure-Code Profiles
// =============================================================================

/// Erasure-code profile as the cluster reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErasureCodeProfile {
    pub name: String,
    /// Data chunks
    pub k: u32,
    /// Coding chunks
    pub m: u32,
    pub plugin: String,
    pub technique: String,
    /// Remaining profile parameters
    pub extra: BTreeMap<String, String>,
}

impl ErasureCodeProfile {
    pub fn algorithm(&self) -> String {
        format!("{}{}{}", self.plugin, ALGORITHM_SEPARATOR, self.technique)
    }

    fn from_properties(name: &str, mut properties: BTreeMap<String, String>) -> Result<Self> {
        let what = format!("erasure-code profile {}", name);
        let mut chunk_count = |key: &str| -> Result<u32> {
            let raw = properties
                .remove(key)
                .ok_or_else(|| Error::malformed(&what, format!("missing {}", key)))?;
            let count: u32 = raw
                .trim()
                .parse()
                .map_err(|e| Error::malformed(&what, format!("{}={}: {}", key, raw, e)))?;
            if count == 0 {
                return Err(Error::malformed(&what, format!("{} must be > 0", key)));
            }
            Ok(count)
        };
        let k = chunk_count("k")?;
        let m = chunk_count("m")?;

        Ok(Self {
            name: name.to_string(),
            k,
            m,
            plugin: properties.remove("plugin").unwrap_or_default(),
            technique: properties.remove("technique").unwrap_or_default(),
            extra: properties,
        })
    }

    /// `key=value` pairs as passed to `osd erasure-code-profile set`
    fn to_pairs(&self) -> Vec<String> {
        let mut pairs = vec![
            format!("k={}", self.k),
            format!("m={}", self.m),
            format!("plugin={}", self.plugin),
            format!("technique={}", self.technique),
        ];
        pairs.extend(self.extra.iter().map(|(k, v)| format!("{}={}", k, v)));
        pairs
    }
}

/// Conventional profile name for a pool
pub fn profile_name_for(pool_name: &str) -> String {
    format!("{}_ecprofile", pool_name)
}

pub async fn get_profile(conn: &dyn Connection, name: &str) -> Result<ErasureCodeProfile> {
    let command = MonCommand::new("osd erasure-code-profile get").arg("name", name);
    let properties: BTreeMap<String, String> = run_json(conn, &command).await?;
    ErasureCodeProfile::from_properties(name, properties)
}

pub async fn create_profile(conn: &dyn Connection, profile: &ErasureCodeProfile) -> Result<()> {
    info!(
        "Creating erasure-code profile {} (k={}, m={}, {})",
        profile.name,
        profile.k,
        profile.m,
        profile.algorithm()
    );
    let command = MonCommand::new("osd erasure-code-profile set")
        .arg("name", profile.name.as_str())
        .arg("profile", profile.to_pairs());
    run(conn, &command).await?;
    Ok(())
}

/// Write the pool's conventional profile and return its name
///
/// Setting an existing profile to the same parameters is a no-op.
async fn ensure_profile(conn: &dyn Connection, pool: &Pool) -> Result<String> {
    let config = &pool.erasure_coded_config;
    let (plugin, technique) = if config.algorithm.is_empty() {
        let default = get_profile(conn, DEFAULT_PROFILE).await?;
        (default.plugin, default.technique)
    } else {
        parse_algorithm(&config.algorithm)?
    };

    let name = profile_name_for(&pool.pool_name);
    create_profile(
        conn,
        &ErasureCodeProfile {
            name: name.clone(),
            k: config.data_chunk_count,
            m: config.coding_chunk_count,
            plugin,
            technique,
            extra: BTreeMap::new(),
        },
    )
    .await?;

    Ok(name)
}

// =============================================================================
// Listing
// =============================================================================

#[derive(Debug, Deserialize)]
struct PoolListEntry {
    poolnum: i64,
    poolname: String,
}

/// Aggregated output of `osd pool get <pool> all`
#[derive(Debug, Clone)]
pub struct PoolProperties {
    values: IndexMap<String, Value>,
}

impl PoolProperties {
    pub fn from_buffer(buffer: &[u8]) -> Result<Self> {
        Ok(Self {
            values: multi_json::merge_objects(buffer)?,
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Replica count; numbers may arrive as JSON numbers or strings
    pub fn size(&self) -> Result<u32> {
        match self.values.get("size") {
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| Error::malformed("pool size", n)),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map_err(|e| Error::malformed("pool size", e)),
            Some(other) => Err(Error::malformed("pool size", other)),
            None => Err(Error::malformed("pool properties", "missing size")),
        }
    }

    pub fn erasure_code_profile(&self) -> Option<&str> {
        self.values
            .get("erasure_code_profile")
            .and_then(Value::as_str)
            .filter(|profile| !profile.is_empty())
    }
}

pub async fn get_pool_properties(conn: &dyn Connection, pool_name: &str) -> Result<PoolProperties> {
    let command = MonCommand::new("osd pool get")
        .arg("pool", pool_name)
        .arg("var", "all");
    let output = run(conn, &command).await?;
    PoolProperties::from_buffer(&output.buffer)
}

async fn lspools(conn: &dyn Connection) -> Result<Vec<PoolListEntry>> {
    run_json(conn, &MonCommand::new("osd lspools")).await
}

/// Number of pools, without fetching their properties
pub async fn count_pools(conn: &dyn Connection) -> Result<usize> {
    Ok(lspools(conn).await?.len())
}

/// List every pool in cluster order
///
/// Any failing command aborts the whole listing.
pub async fn list_pools(conn: &dyn Connection) -> Result<Vec<Pool>> {
    let entries = lspools(conn).await?;
    let mut pools = Vec::with_capacity(entries.len());

    for entry in entries {
        let properties = get_pool_properties(conn, &entry.poolname).await?;

        let pool = match properties.erasure_code_profile() {
            Some(profile_name) => {
                let profile = get_profile(conn, profile_name).await?;
                Pool {
                    pool_name: entry.poolname,
                    pool_num: entry.poolnum,
                    pool_type: PoolType::ErasureCoded,
                    replication_config: ReplicationConfig::default(),
                    erasure_coded_config: ErasureCodedConfig {
                        data_chunk_count: profile.k,
                        coding_chunk_count: profile.m,
                        algorithm: profile.algorithm(),
                    },
                }
            }
            None => Pool {
                pool_name: entry.poolname,
                pool_num: entry.poolnum,
                pool_type: PoolType::Replicated,
                replication_config: ReplicationConfig {
                    size: properties.size()?,
                },
                erasure_coded_config: ErasureCodedConfig::default(),
            },
        };

        pools.push(pool);
    }

    Ok(pools)
}

// =============================================================================
// Creation
// =============================================================================

/// Defaults applied when creating pools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolDefaults {
    /// Placement groups for new pools
    pub pg_count: u32,
}

impl Default for PoolDefaults {
    fn default() -> Self {
        Self { pg_count: 100 }
    }
}

/// Create a validated pool, returning the cluster's confirmation verbatim
pub async fn create_pool(conn: &dyn Connection, pool: &Pool, defaults: &PoolDefaults) -> Result<String> {
    info!("Creating {} pool {}", pool.pool_type, pool.pool_name);

    let mut command = MonCommand::new("osd pool create")
        .arg("pool", pool.pool_name.as_str())
        .arg("pg_num", defaults.pg_count)
        .arg("pgp_num", defaults.pg_count)
        .arg("pool_type", pool.pool_type.to_string());

    if pool.pool_type == PoolType::ErasureCoded {
        let profile = ensure_profile(conn, pool).await?;
        command = command.arg("erasure_code_profile", profile);
    }

    let created = run(conn, &command).await?;

    if pool.pool_type == PoolType::Replicated {
        let resize = MonCommand::new("osd pool set")
            .arg("pool", pool.pool_name.as_str())
            .arg("var", "size")
            .arg("val", pool.replication_config.size.to_string());
        run(conn, &resize).await?;
    }

    info!("Pool {} created: {}", pool.pool_name, created.info);
    Ok(created.info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{reply, unexpected, ScriptedConnection, EC_PROPERTIES, RBD_PROPERTIES};
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use std::sync::Arc;

    use crate::testing::two_pool_cluster as cluster_with_two_pools;

    #[test]
    fn test_pool_type_codes() {
        assert_eq!(serde_json::to_string(&PoolType::Replicated).unwrap(), "0");
        assert_eq!(serde_json::to_string(&PoolType::ErasureCoded).unwrap(), "1");
        assert!(serde_json::from_str::<PoolType>("2").is_err());
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(
            parse_algorithm("jerasure::reed_sol_van").unwrap(),
            ("jerasure".to_string(), "reed_sol_van".to_string())
        );
        assert!(parse_algorithm("jerasure").is_err());
        assert!(parse_algorithm("::reed_sol_van").is_err());
    }

    #[test]
    fn test_properties_discriminate_on_profile() {
        let rbd = PoolProperties::from_buffer(RBD_PROPERTIES.as_bytes()).unwrap();
        assert_eq!(rbd.erasure_code_profile(), None);
        assert_eq!(rbd.size().unwrap(), 1);
        assert_eq!(rbd.get("pg_num"), Some(&Value::from(2048)));

        let ec = PoolProperties::from_buffer(EC_PROPERTIES.as_bytes()).unwrap();
        assert_eq!(ec.erasure_code_profile(), Some("ecPool1_ecprofile"));
    }

    #[tokio::test]
    async fn test_list_pools_empty() {
        let conn = ScriptedConnection::new(|_| reply("[]", ""));
        assert!(list_pools(&conn).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_pools_replicated_and_erasure_coded() {
        let conn = ScriptedConnection::new(cluster_with_two_pools);

        let pools = list_pools(&conn).await.unwrap();
        assert_eq!(
            serde_json::to_string(&pools).unwrap(),
            r#"[{"poolName":"rbd","poolNum":0,"type":0,"replicationConfig":{"size":1},"erasureCodedConfig":{"dataChunkCount":0,"codingChunkCount":0,"algorithm":""}},{"poolName":"ecPool1","poolNum":1,"type":1,"replicationConfig":{"size":0},"erasureCodedConfig":{"dataChunkCount":2,"codingChunkCount":1,"algorithm":"jerasure::reed_sol_van"}}]"#
        );
    }

    #[tokio::test]
    async fn test_list_pools_is_repeatable() {
        let conn = ScriptedConnection::new(cluster_with_two_pools);

        let first = list_pools(&conn).await.unwrap();
        let second = list_pools(&conn).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_list_pools_aborts_on_missing_profile() {
        let conn = ScriptedConnection::new(|args| {
            if args.contains("erasure-code-profile get") {
                unexpected(args)
            } else {
                cluster_with_two_pools(args)
            }
        });

        assert_matches!(list_pools(&conn).await, Err(Error::Command { .. }));
    }

    #[test]
    fn test_validate_rejects_incomplete_requests() {
        let request: PoolRequest = serde_json::from_str(r#"{"poolname":"pool1"}"#).unwrap();
        assert_matches!(request.validate(), Err(Error::Validation(_)));

        let request: PoolRequest = serde_json::from_str(r#"{"poolName":"pool1"}"#).unwrap();
        assert_matches!(request.validate(), Err(Error::Validation(_)));

        let request: PoolRequest =
            serde_json::from_str(r#"{"poolName":"pool1","type":1,"replicationConfig":{"size":3}}"#).unwrap();
        assert_matches!(request.validate(), Err(Error::Validation(_)));

        let request: PoolRequest = serde_json::from_str(
            r#"{"poolName":"pool1","type":0,"replicationConfig":{"size":3},"erasureCodedConfig":{"dataChunkCount":2,"codingChunkCount":1}}"#,
        )
        .unwrap();
        assert_matches!(request.validate(), Err(Error::Validation(_)));
    }

    #[test]
    fn test_validate_accepts_zeroed_other_variant() {
        let request: PoolRequest = serde_json::from_str(
            r#"{"poolName":"ecPool1","poolNum":0,"type":1,"replicationConfig":{"size":0},"erasureCodedConfig":{"dataChunkCount":2,"codingChunkCount":1,"algorithm":""}}"#,
        )
        .unwrap();

        let pool = request.validate().unwrap();
        assert_eq!(pool.pool_type, PoolType::ErasureCoded);
        assert_eq!(pool.erasure_coded_config.data_chunk_count, 2);
    }

    #[tokio::test]
    async fn test_create_erasure_coded_pool_from_default_profile() {
        let commands = Arc::new(Mutex::new(Vec::<String>::new()));
        let seen = commands.clone();
        let conn = ScriptedConnection::new(move |args| {
            seen.lock().push(args.to_string());
            if args.contains("osd erasure-code-profile get") {
                if args.contains("default") {
                    return reply(r#"{"k":"2","m":"1","plugin":"jerasure","technique":"reed_sol_van"}"#, "info");
                }
            } else if args.contains("osd erasure-code-profile set") {
                return reply("", "");
            } else if args.contains("osd pool create") {
                return reply("", "pool 'ecPool1' created");
            }
            unexpected(args)
        });

        let request: PoolRequest = serde_json::from_str(
            r#"{"poolName":"ecPool1","poolNum":0,"type":1,"replicationConfig":{"size":0},"erasureCodedConfig":{"dataChunkCount":2,"codingChunkCount":1,"algorithm":""}}"#,
        )
        .unwrap();
        let pool = request.validate().unwrap();

        let message = create_pool(&conn, &pool, &PoolDefaults::default()).await.unwrap();
        assert_eq!(message, "pool 'ecPool1' created");

        let commands = commands.lock();
        assert_eq!(commands.len(), 3);
        assert!(commands[0].contains("osd erasure-code-profile get"));

        let set = &commands[1];
        assert!(set.contains("osd erasure-code-profile set"));
        assert!(set.contains("ecPool1_ecprofile"));
        assert!(set.contains("k=2"));
        assert!(set.contains("m=1"));
        assert!(set.contains("plugin=jerasure"));
        assert!(set.contains("technique=reed_sol_van"));

        let create = &commands[2];
        assert!(create.contains("osd pool create"));
        assert!(create.contains("\"erasure\""));
        assert!(create.contains("ecPool1_ecprofile"));
    }

    #[tokio::test]
    async fn test_create_erasure_coded_pool_with_algorithm_skips_default() {
        let set = Arc::new(Mutex::new(None::<String>));
        let seen = set.clone();
        let conn = ScriptedConnection::new(move |args| {
            if args.contains("osd erasure-code-profile set") {
                *seen.lock() = Some(args.to_string());
                reply("", "")
            } else if args.contains("osd pool create") {
                reply("", "pool 'ecPool1' created")
            } else {
                unexpected(args)
            }
        });

        let pool = PoolRequest {
            pool_name: Some("ecPool1".into()),
            pool_type: Some(PoolType::ErasureCoded),
            erasure_coded_config: Some(ErasureCodedConfig {
                data_chunk_count: 4,
                coding_chunk_count: 2,
                algorithm: "isa::cauchy".into(),
            }),
            ..Default::default()
        }
        .validate()
        .unwrap();

        assert_eq!(
            create_pool(&conn, &pool, &PoolDefaults::default()).await.unwrap(),
            "pool 'ecPool1' created"
        );

        let set = set.lock().clone().unwrap();
        assert!(set.contains("k=4"));
        assert!(set.contains("m=2"));
        assert!(set.contains("plugin=isa"));
        assert!(set.contains("technique=cauchy"));
    }

    #[tokio::test]
    async fn test_create_replicated_pool_sets_size() {
        let resized = Arc::new(Mutex::new(None::<String>));
        let seen = resized.clone();
        let conn = ScriptedConnection::new(move |args| {
            if args.contains("osd pool create") {
                assert!(args.contains("\"replicated\""));
                reply("", "pool 'rep' created")
            } else if args.contains("osd pool set") {
                *seen.lock() = Some(args.to_string());
                reply("", "set pool 2 size to 3")
            } else {
                unexpected(args)
            }
        });

        let pool = PoolRequest {
            pool_name: Some("rep".into()),
            pool_type: Some(PoolType::Replicated),
            replication_config: Some(ReplicationConfig { size: 3 }),
            ..Default::default()
        }
        .validate()
        .unwrap();

        let message = create_pool(&conn, &pool, &PoolDefaults::default()).await.unwrap();
        assert_eq!(message, "pool 'rep' created");

        let resize = resized.lock().clone().unwrap();
        assert!(resize.contains("\"size\""));
        assert!(resize.contains("\"3\""));
    }

    #[tokio::test]
    async fn test_create_pool_propagates_cluster_failure() {
        let conn = ScriptedConnection::new(|_| {
            Err(Error::Command {
                command: "osd pool create".into(),
                message: "pool 'rep' already exists".into(),
            })
        });

        let pool = PoolRequest {
            pool_name: Some("rep".into()),
            pool_type: Some(PoolType::Replicated),
            replication_config: Some(ReplicationConfig { size: 1 }),
            ..Default::default()
        }
        .validate()
        .unwrap();

        let err = create_pool(&conn, &pool, &PoolDefaults::default()).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
