//! HTTP API handlers and routes using axum.
//!
//! Routes:
//! - GET /health - Health check
//! - GET /stats - Store statistics
//! - GET /orders - All replicated orders
//! - GET /order/{order_hash} - One order
//! - POST /snapshot - Publish a snapshot now

use crate::snapshot::SnapshotManager;
use crate::store::ReplicaStore;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: ReplicaStore,
    pub snapshots: Arc<SnapshotManager>,
}

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/orders", get(list_orders_handler))
        .route("/order/{order_hash}", get(get_order_handler))
        .route("/snapshot", post(publish_snapshot_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// GET /stats
async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.stats().await)
}

/// GET /orders
async fn list_orders_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let orders = state.store.orders().await;
    Json(OrdersResponse {
        count: orders.len(),
        orders,
    })
}

#[derive(Serialize)]
struct OrdersResponse {
    count: usize,
    orders: Vec<crate::order::Order>,
}

/// GET /order/{order_hash}
async fn get_order_handler(
    State(state): State<Arc<AppState>>,
    Path(order_hash): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.store.get(&order_hash).await {
        Some(order) => Ok(Json(order)),
        None => Err(ApiError::NotFound(format!("Order '{}' not found", order_hash))),
    }
}

/// POST /snapshot
async fn publish_snapshot_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let id = state.snapshots.publish(&state.store).await.map_err(|e| {
        error!("On-demand snapshot failed: {}", e);
        ApiError::InternalError(e.to_string())
    })?;

    Ok(Json(SnapshotResponse {
        snapshot_id: id.to_string(),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotResponse {
    snapshot_id: String,
}

// ============================================================================
// Error Handling
// ============================================================================

/// API error types.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse { error: message });

        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}
