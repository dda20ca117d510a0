//! Operator-only listener: database health and page cache control.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tracing::info;

use crate::cache::PageCache;
use crate::infra::db::PostgresRepositories;

use super::db_health_response;
use super::middleware::{log_responses, set_request_context};

/// Probe used by `GET /_health/db`.
#[async_trait]
pub trait DatabaseHealth: Send + Sync {
    async fn health_check(&self) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl DatabaseHealth for PostgresRepositories {
    async fn health_check(&self) -> Result<(), sqlx::Error> {
        PostgresRepositories::health_check(self).await
    }
}

#[derive(Clone)]
pub struct AdminState {
    pub db: Arc<dyn DatabaseHealth>,
    pub cache: Arc<dyn PageCache>,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/_health/db", get(admin_health))
        .route("/cache/flush", post(flush_cache))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn admin_health(State(state): State<AdminState>) -> Response {
    db_health_response(state.db.health_check().await)
}

async fn flush_cache(State(state): State<AdminState>) -> Response {
    let dropped = state.cache.len();
    state.cache.flush_all();
    info!(
        target = "inkwell::http::admin",
        dropped,
        "page cache flushed"
    );
    StatusCode::NO_CONTENT.into_response()
}
