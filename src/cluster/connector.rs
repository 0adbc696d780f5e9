//! Admin connection
//!
//! [`DirectConnector`] makes a single attempt through a
//! [`ConnectionFactory`]; [`ClusterAccess`] bundles the context, the
//! connector and the factory, and wraps every admin connect in the bounded
//! retry.

use crate::cluster::retry::{retry_with_limit, RetryPolicy};
use crate::domain::{
    AdminConnector, AdminConnectorRef, ClusterContext, ConnectionFactory, ConnectionFactoryRef,
    ConnectionRef,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Connects as the context's admin user with one factory call
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectConnector;

#[async_trait]
impl AdminConnector for DirectConnector {
    async fn connect_as_admin(
        &self,
        context: &ClusterContext,
        factory: &dyn ConnectionFactory,
    ) -> Result<ConnectionRef> {
        debug!(
            "Connecting to cluster {} as {}",
            context.cluster_name, context.admin_user
        );
        factory
            .connect(&context.cluster_name, &context.admin_user)
            .await
    }
}

/// Everything a request needs to reach the store and the cluster
pub struct ClusterAccess {
    context: Arc<ClusterContext>,
    connector: AdminConnectorRef,
    factory: ConnectionFactoryRef,
    retry: RetryPolicy,
}

impl ClusterAccess {
    pub fn new(
        context: Arc<ClusterContext>,
        connector: AdminConnectorRef,
        factory: ConnectionFactoryRef,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            context,
            connector,
            factory,
            retry,
        }
    }

    pub fn context(&self) -> &ClusterContext {
        &self.context
    }

    /// Single admin connect attempt, for callers running their own retry
    pub async fn connect_once(&self) -> Result<ConnectionRef> {
        self.connector
            .connect_as_admin(&self.context, self.factory.as_ref())
            .await
    }

    /// Open an admin connection, retrying up to the policy's budget
    ///
    /// The returned connection belongs to the caller and closes on drop.
    pub async fn connect_as_admin(&self) -> Result<ConnectionRef> {
        retry_with_limit(&self.retry, "connect as admin", || {
            self.connector
                .connect_as_admin(&self.context, self.factory.as_ref())
        })
        .await
        .map_err(|err| match err {
            Error::AdminConnect { .. } => err,
            other => Error::AdminConnect {
                attempts: self.retry.attempts(),
                reason: other.to_string(),
            },
        })
    }
}
