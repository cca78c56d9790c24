use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tower_http::trace::TraceLayer;

use crate::analytics::VisitTracker;
use crate::config::HttpTimeouts;
use crate::storage::Storage;

use super::handlers::{health_check, index, redirect_url, RedirectState};
use super::middleware::security_headers;

/// Path of the health endpoint, relative to the root
pub const HEALTH_PATH: &str = "healthz";

/// Slugs answered by a fixed route before the slug lookup runs
pub const RESERVED_SLUGS: &[&str] = &["", HEALTH_PATH];

/// Whether a slug can never be reached through the redirect route
pub fn is_reserved_slug(slug: &str) -> bool {
    RESERVED_SLUGS.contains(&slug)
}

pub fn create_redirect_router(
    storage: Arc<dyn Storage>,
    tracker: Arc<VisitTracker>,
    timeouts: HttpTimeouts,
) -> Router {
    let state = Arc::new(RedirectState { storage, tracker });

    Router::new()
        .route("/", get(index))
        .route(&format!("/{HEALTH_PATH}"), get(health_check))
        .route("/{*slug}", get(redirect_url))
        .layer(RequestBodyTimeoutLayer::new(timeouts.read))
        .layer(TimeoutLayer::new(timeouts.request))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
