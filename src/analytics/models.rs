//! Data models for visit analytics

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::analytics::ip_extractor::{extract_client_ip, header_value};

/// Geographic location information derived from IP address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO country code (e.g., "US", "GB"), empty when unknown
    #[serde(rename = "country", default)]
    pub country_code: String,

    /// English city name, empty when unknown
    #[serde(default)]
    pub city: String,
}

/// Client details parsed from the `User-Agent` header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgentInfo {
    /// One of "tablet", "mobile", "desktop", "bot" or "unknown"
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub browser: String,
    #[serde(default)]
    pub browser_version: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub is_bot: bool,
}

/// Raw request attributes captured on the redirect hot path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitRequest {
    pub client_ip: String,
    pub user_agent: String,
    pub referer: String,
    pub query: String,
    pub language: String,
}

impl VisitRequest {
    /// Capture the visit attributes of an incoming request
    ///
    /// Only copies header values; no parsing or lookups happen here.
    pub fn from_headers(headers: &HeaderMap, query: Option<&str>, remote_addr: SocketAddr) -> Self {
        Self {
            client_ip: extract_client_ip(headers, remote_addr),
            user_agent: header_value(headers, "user-agent").unwrap_or_default().to_string(),
            referer: header_value(headers, "referer").unwrap_or_default().to_string(),
            query: query.unwrap_or_default().to_string(),
            language: header_value(headers, "accept-language")
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// A single redirect occurrence, one line of the visits log
///
/// Producers fill in the raw request fields. `client` and `geo` stay at their
/// defaults until the tracker worker enriches the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitEvent {
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    pub slug: String,
    pub ip: String,
    pub user_agent: String,
    pub referer: String,
    pub query_params: String,
    pub language: String,
    #[serde(flatten)]
    pub client: UserAgentInfo,
    #[serde(flatten)]
    pub geo: GeoLocation,
}

impl VisitEvent {
    /// Build an unenriched event from the captured request
    pub fn new(slug: &str, timestamp: DateTime<Utc>, request: VisitRequest) -> Self {
        Self {
            timestamp,
            slug: slug.to_string(),
            ip: request.client_ip,
            user_agent: request.user_agent,
            referer: request.referer,
            query_params: request.query,
            language: request.language,
            client: UserAgentInfo::default(),
            geo: GeoLocation::default(),
        }
    }

    pub fn enrich(&mut self, client: UserAgentInfo, geo: GeoLocation) {
        self.client = client;
        self.geo = geo;
    }
}
