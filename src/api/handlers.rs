//! REST API Handlers
//!
//! Each handler makes one call into the inventory or cluster modules and
//! writes the result as JSON. Every failure is logged and answered with a
//! bare 500; "no data" is a 200 with an empty sequence.

use crate::cluster::client_access::get_client_access_info;
use crate::cluster::connector::ClusterAccess;
use crate::cluster::mon::get_monitors;
use crate::cluster::pool::{create_pool, list_pools, PoolDefaults, PoolRequest};
use crate::error::{Error, Result};
use crate::inventory;
use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub access: Arc<ClusterAccess>,
    pub pool_defaults: PoolDefaults,
}

impl AppState {
    pub fn new(access: Arc<ClusterAccess>, pool_defaults: PoolDefaults) -> Self {
        Self {
            access,
            pool_defaults,
        }
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/node", get(get_nodes))
        .route("/mon", get(get_mons))
        .route("/pool", get(get_pools).post(post_pool))
        .route("/image/mapinfo", post(get_image_map_info))
        .with_state(state)
}

fn failure(operation: &str, err: Error) -> Response {
    error!("{} failed: {}", operation, err);
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

fn respond<T: serde::Serialize>(operation: &str, result: Result<T>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => failure(operation, e),
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /node
async fn get_nodes(State(state): State<AppState>) -> Response {
    respond(
        "list nodes",
        inventory::list_nodes(state.access.context()).await,
    )
}

/// GET /mon
async fn get_mons(State(state): State<AppState>) -> Response {
    respond("get monitors", get_monitors(&state.access).await)
}

/// GET /pool
async fn get_pools(State(state): State<AppState>) -> Response {
    let result = async {
        let conn = state.access.connect_as_admin().await?;
        list_pools(conn.as_ref()).await
    }
    .await;

    respond("list pools", result)
}

/// POST /pool
///
/// Answers with the cluster's confirmation text verbatim.
async fn post_pool(State(state): State<AppState>, body: Bytes) -> Response {
    let result = async {
        let request: PoolRequest = serde_json::from_slice(&body)
            .map_err(|e| Error::Validation(format!("invalid pool request: {}", e)))?;
        let pool = request.validate()?;

        info!("Creating {} pool {}", pool.pool_type, pool.pool_name);
        let conn = state.access.connect_as_admin().await?;
        create_pool(conn.as_ref(), &pool, &state.pool_defaults).await
    }
    .await;

    match result {
        Ok(message) => {
            debug!("Pool created: {}", message);
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                message,
            )
                .into_response()
        }
        Err(e) => failure("create pool", e),
    }
}

/// POST /image/mapinfo
async fn get_image_map_info(State(state): State<AppState>) -> Response {
    let result = async {
        let conn = state.access.connect_as_admin().await?;
        get_client_access_info(conn.as_ref(), &state.access.context().admin_user).await
    }
    .await;

    respond("get image map info", result)
}
