use axum::{
    extract::{ConnectInfo, Path, RawQuery, State},
    http::{header, header::HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::analytics::{TrackerStats, VisitRequest, VisitTracker};
use crate::storage::Storage;

const INDEX_PAGE: &str = "<!DOCTYPE html><html><head></head><body></body></html>";

pub struct RedirectState {
    pub storage: Arc<dyn Storage>,
    pub tracker: Arc<VisitTracker>,
}

/// Redirect to original URL
///
/// The visit is handed to the tracker before the response is built; the
/// tracker never blocks, so analytics cannot delay or fail the redirect.
pub async fn redirect_url(
    State(state): State<Arc<RedirectState>>,
    Path(slug): Path<String>,
    RawQuery(query): RawQuery,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let url = match state.storage.get(&slug).await {
        Ok(Some(url)) => url,
        Ok(None) => {
            debug!(slug = %slug, "Slug not found");
            return (StatusCode::NOT_FOUND, "404 page not found").into_response();
        }
        Err(err) => {
            error!(slug = %slug, error = %err, "URL lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    };

    if !url.has_safe_scheme() {
        warn!(slug = %slug, url = %url.original_url, "Blocked unsafe redirect scheme");
        return (StatusCode::BAD_REQUEST, "Invalid redirect URL").into_response();
    }

    info!(slug = %slug, url = %url.original_url, "Redirecting");
    state
        .tracker
        .record(&slug, VisitRequest::from_headers(&headers, query.as_deref(), addr));

    (StatusCode::FOUND, [(header::LOCATION, url.original_url)]).into_response()
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<RedirectState>>) -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
        urls: usize,
        visits: TrackerStats,
    }

    let urls = state.storage.count().await.unwrap_or(0);

    Json(HealthResponse {
        status: "OK".to_string(),
        urls,
        visits: state.tracker.stats(),
    })
}
