//! GeoIP lookup service using the MaxMind GeoLite2 web service
//!
//! Lookups are best-effort: every failure (timeout, transport error,
//! non-200 status, unexpected body) collapses into an empty
//! [`GeoLocation`] so the visit worker never has to handle errors.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

use crate::analytics::models::GeoLocation;
use crate::config::GeoIpConfig;

/// Upper bound for a single upstream lookup
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves a client IP to a coarse location
#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// Lookup the location of `ip`, returning empty fields when unknown
    async fn lookup(&self, ip: &str) -> GeoLocation;
}

/// GeoIP lookup service backed by the GeoLite2 City web service
pub struct GeoIpService {
    client: reqwest::Client,
    endpoint: String,
    account_id: String,
    license_key: String,
}

#[derive(Debug, Default, Deserialize)]
struct CityResponse {
    #[serde(default)]
    city: CityRecord,
    #[serde(default)]
    country: CountryRecord,
}

#[derive(Debug, Default, Deserialize)]
struct CityRecord {
    #[serde(default)]
    names: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct CountryRecord {
    #[serde(default)]
    iso_code: String,
}

impl GeoIpService {
    /// Create a new GeoIP service
    ///
    /// # Arguments
    /// * `config` - Web service endpoint and basic-auth credentials
    pub fn new(config: &GeoIpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .context("Failed to build GeoIP HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            account_id: config.account_id.clone(),
            license_key: config.license_key.clone(),
        })
    }

    async fn fetch(&self, ip: IpAddr) -> Result<GeoLocation> {
        let url = format!("{}/{}", self.endpoint, ip);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.account_id, Some(&self.license_key))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            anyhow::bail!("unexpected status {status}");
        }

        let body: CityResponse = response.json().await?;
        Ok(GeoLocation {
            country_code: body.country.iso_code,
            city: body.city.names.get("en").cloned().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl GeoResolver for GeoIpService {
    async fn lookup(&self, ip: &str) -> GeoLocation {
        if ip.is_empty() {
            return GeoLocation::default();
        }

        // Header-supplied values end up in the request path, so only real
        // addresses are sent upstream.
        let Ok(addr) = ip.parse::<IpAddr>() else {
            debug!(ip = %ip, "skipping GeoIP lookup for malformed address");
            return GeoLocation::default();
        };

        match self.fetch(addr).await {
            Ok(location) => location,
            Err(err) => {
                debug!(ip = %ip, error = %err, "GeoIP lookup failed");
                GeoLocation::default()
            }
        }
    }
}
