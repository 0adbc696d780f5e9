//! Test doubles shared by the unit tests

use crate::cluster::connector::ClusterAccess;
use crate::cluster::retry::RetryPolicy;
use crate::domain::{
    AdminConnector, ClusterContext, Connection, ConnectionFactory, ConnectionRef,
    CoordinationStore, MonCommandOutput,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const MON_STATUS_RESPONSE: &str = r#"{"name":"mon0","rank":0,"state":"leader","election_epoch":3,"quorum":[0],"monmap":{"epoch":1,"fsid":"22ae0d50-c4bc-4cfb-9cf4-341acbe35302","modified":"2016-09-16 04:21:51.635837","created":"2016-09-16 04:21:51.635837","mons":[{"rank":0,"name":"mon0","addr":"10.37.129.87:6790\/0"}]}}"#;

pub const RBD_PROPERTIES: &str = r#"{"pool":"rbd","pool_id":0,"size":1}{"pool":"rbd","pool_id":0,"min_size":1}{"pool":"rbd","pool_id":0,"crash_replay_interval":0}{"pool":"rbd","pool_id":0,"pg_num":2048}{"pool":"rbd","pool_id":0,"pgp_num":2048}{"pool":"rbd","pool_id":0,"crush_ruleset":0}{"pool":"rbd","pool_id":0,"hashpspool":"true"}{"pool":"rbd","pool_id":0,"nodelete":"false"}{"pool":"rbd","pool_id":0,"nopgchange":"false"}{"pool":"rbd","pool_id":0,"nosizechange":"false"}{"pool":"rbd","pool_id":0,"write_fadvise_dontneed":"false"}{"pool":"rbd","pool_id":0,"noscrub":"false"}{"pool":"rbd","pool_id":0,"nodeep-scrub":"false"}{"pool":"rbd","pool_id":0,"use_gmt_hitset":true}{"pool":"rbd","pool_id":0,"auid":0}{"pool":"rbd","pool_id":0,"min_write_recency_for_promote":0}{"pool":"rbd","pool_id":0,"fast_read":0}{"pool":"rbd","pool_id":0}{"pool":"rbd","pool_id":0}"#;

pub const EC_PROPERTIES: &str = r#"{"pool":"ecPool1","pool_id":1,"size":3}{"pool":"ecPool1","pool_id":1,"min_size":3}{"pool":"ecPool1","pool_id":1,"pg_num":100}{"pool":"ecPool1","pool_id":1,"pgp_num":100}{"pool":"ecPool1","pool_id":1,"hashpspool":"true"}{"pool":"ecPool1","pool_id":1,"auid":0}{"pool":"ecPool1","pool_id":1,"erasure_code_profile":"ecPool1_ecprofile"}{"pool":"ecPool1","pool_id":1,"min_write_recency_for_promote":0}{"pool":"ecPool1","pool_id":1,"fast_read":0}{"pool":"ecPool1","pool_id":1}"#;

/// Cluster with one replicated (`rbd`) and one erasure-coded (`ecPool1`) pool
pub fn two_pool_cluster(args: &str) -> Result<MonCommandOutput> {
    if args.contains("osd lspools") {
        reply(
            r#"[{"poolnum":0,"poolname":"rbd"},{"poolnum":1,"poolname":"ecPool1"}]"#,
            "info",
        )
    } else if args.contains("osd pool get") && args.contains("\"rbd\"") {
        reply(RBD_PROPERTIES, "info")
    } else if args.contains("osd pool get") && args.contains("ecPool1") {
        reply(EC_PROPERTIES, "info")
    } else if args.contains("osd erasure-code-profile get") && args.contains("ecPool1_ecprofile") {
        reply(
            r#"{"jerasure-per-chunk-alignment":"false","k":"2","m":"1","plugin":"jerasure","ruleset-failure-domain":"osd","ruleset-root":"default","technique":"reed_sol_van","w":"8"}"#,
            "info",
        )
    } else {
        unexpected(args)
    }
}

type Handler = Arc<dyn Fn(&str) -> Result<MonCommandOutput> + Send + Sync>;

/// Successful command output
pub fn reply(buffer: &str, info: &str) -> Result<MonCommandOutput> {
    Ok(MonCommandOutput {
        buffer: buffer.as_bytes().to_vec(),
        info: info.to_string(),
    })
}

/// Failure for a command the script does not cover
pub fn unexpected(args: &str) -> Result<MonCommandOutput> {
    Err(Error::Command {
        command: args.to_string(),
        message: "unexpected command".to_string(),
    })
}

/// Connection answering every command through a closure over the raw args
pub struct ScriptedConnection {
    handler: Handler,
}

impl ScriptedConnection {
    pub fn new(handler: impl Fn(&str) -> Result<MonCommandOutput> + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn mon_command(&self, args: &[u8]) -> Result<MonCommandOutput> {
        (self.handler)(&String::from_utf8_lossy(args))
    }
}

/// Factory handing out [`ScriptedConnection`]s sharing one script
pub struct ScriptedFactory {
    handler: Handler,
    last_identity: Mutex<Option<(String, String)>>,
}

impl ScriptedFactory {
    pub fn new(handler: impl Fn(&str) -> Result<MonCommandOutput> + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            last_identity: Mutex::new(None),
        }
    }

    /// Every command fails
    pub fn unscripted() -> Self {
        Self::new(unexpected)
    }

    pub fn last_identity(&self) -> Option<(String, String)> {
        self.last_identity.lock().clone()
    }
}

#[async_trait]
impl ConnectionFactory for ScriptedFactory {
    async fn connect(&self, cluster_name: &str, user: &str) -> Result<ConnectionRef> {
        *self.last_identity.lock() = Some((cluster_name.to_string(), user.to_string()));
        Ok(Box::new(ScriptedConnection {
            handler: self.handler.clone(),
        }))
    }
}

/// Connector that fails a fixed number of attempts before delegating to the
/// factory
pub struct CountingConnector {
    fail_first: u32,
    attempts: AtomicU32,
}

impl CountingConnector {
    pub fn failing_first(fail_first: u32) -> Self {
        Self {
            fail_first,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdminConnector for CountingConnector {
    async fn connect_as_admin(
        &self,
        context: &ClusterContext,
        factory: &dyn ConnectionFactory,
    ) -> Result<ConnectionRef> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first {
            return Err(Error::Store("mock connect error".into()));
        }
        factory
            .connect(&context.cluster_name, &context.admin_user)
            .await
    }
}

/// Store whose every call fails
pub struct FailingStore;

#[async_trait]
impl CoordinationStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Err(Error::Store(format!("mock GET error for {}", key)))
    }

    async fn set(&self, key: &str, _value: &str) -> Result<()> {
        Err(Error::Store(format!("mock SET error for {}", key)))
    }

    async fn children(&self, key: &str) -> Result<Vec<String>> {
        Err(Error::Store(format!("mock GET error for {}", key)))
    }
}

/// Cluster access over `store` whose connections run `handler`
pub fn access_with(
    store: Arc<dyn CoordinationStore>,
    handler: impl Fn(&str) -> Result<MonCommandOutput> + Send + Sync + 'static,
) -> ClusterAccess {
    access_with_connector(store, Arc::new(CountingConnector::failing_first(0)), handler)
}

pub fn access_with_connector(
    store: Arc<dyn CoordinationStore>,
    connector: Arc<dyn AdminConnector>,
    handler: impl Fn(&str) -> Result<MonCommandOutput> + Send + Sync + 'static,
) -> ClusterAccess {
    let context = Arc::new(ClusterContext::new(store, "mycluster"));
    ClusterAccess::new(
        context,
        connector,
        Arc::new(ScriptedFactory::new(handler)),
        RetryPolicy::new(3, Duration::from_millis(1)),
    )
}
