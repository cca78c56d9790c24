use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Budget for in-flight requests once a shutdown signal arrives
    pub shutdown_timeout_secs: u64,
    /// Upper bound for reading a request body
    pub read_timeout_secs: u64,
    /// Upper bound for producing a response, answered with 408 when exceeded
    pub request_timeout_secs: u64,
}

/// Per-request limits applied by the redirect router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub read: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(ServerConfig::default_read_timeout_secs()),
            request: Duration::from_secs(ServerConfig::default_request_timeout_secs()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON object mapping slugs to destination URLs
    pub data_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Append-only JSON lines log of visits
    pub visits_file: String,
    pub geoip: GeoIpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpConfig {
    pub endpoint: String,
    pub account_id: String,
    pub license_key: String,
}

impl ServerConfig {
    const fn default_shutdown_timeout_secs() -> u64 {
        5
    }

    const fn default_read_timeout_secs() -> u64 {
        5
    }

    const fn default_request_timeout_secs() -> u64 {
        10
    }

    pub fn timeouts(&self) -> HttpTimeouts {
        HttpTimeouts {
            read: Duration::from_secs(self.read_timeout_secs),
            request: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

impl GeoIpConfig {
    pub const DEFAULT_ENDPOINT: &'static str = "https://geolite.info/geoip/v2.1/city";
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).with_context(|| format!("Environment variable not defined: {key}"))
        };

        let port = required("PORT")?
            .parse::<u16>()
            .context("PORT must be a valid port number")?;
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let seconds = |key: &str, default: u64| -> anyhow::Result<u64> {
            match lookup(key) {
                Some(v) => v
                    .parse::<u64>()
                    .with_context(|| format!("{key} must be a number of seconds")),
                None => Ok(default),
            }
        };

        let shutdown_timeout_secs = seconds(
            "SHUTDOWN_TIMEOUT_SECS",
            ServerConfig::default_shutdown_timeout_secs(),
        )?;
        let read_timeout_secs =
            seconds("READ_TIMEOUT_SECS", ServerConfig::default_read_timeout_secs())?;
        let request_timeout_secs = seconds(
            "REQUEST_TIMEOUT_SECS",
            ServerConfig::default_request_timeout_secs(),
        )?;

        let data_file = lookup("DATA_FILE").unwrap_or_else(|| "urls.json".to_string());
        let visits_file = lookup("VISITS_FILE").unwrap_or_else(|| "visits.jsonl".to_string());

        let account_id = required("GEOIP_ACCOUNT_ID")?;
        let license_key = required("GEOIP_LICENSE_KEY")?;
        let endpoint =
            lookup("GEOIP_ENDPOINT").unwrap_or_else(|| GeoIpConfig::DEFAULT_ENDPOINT.to_string());

        Ok(Config {
            server: ServerConfig {
                host,
                port,
                shutdown_timeout_secs,
                read_timeout_secs,
                request_timeout_secs,
            },
            storage: StorageConfig { data_file },
            analytics: AnalyticsConfig {
                visits_file,
                geoip: GeoIpConfig {
                    endpoint,
                    account_id,
                    license_key,
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_with_required_vars() {
        let env = vars(&[
            ("PORT", "8080"),
            ("GEOIP_ACCOUNT_ID", "1234"),
            ("GEOIP_LICENSE_KEY", "key"),
        ]);

        let config = Config::from_lookup(|k| env.get(k).cloned()).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.shutdown_timeout_secs, 5);
        assert_eq!(config.server.timeouts(), HttpTimeouts::default());
        assert_eq!(config.server.timeouts().read, Duration::from_secs(5));
        assert_eq!(config.server.timeouts().request, Duration::from_secs(10));
        assert_eq!(config.storage.data_file, "urls.json");
        assert_eq!(config.analytics.visits_file, "visits.jsonl");
        assert_eq!(config.analytics.geoip.endpoint, GeoIpConfig::DEFAULT_ENDPOINT);
        assert_eq!(config.analytics.geoip.account_id, "1234");
    }

    #[test]
    fn test_missing_required_var_names_it() {
        let env = vars(&[("PORT", "8080"), ("GEOIP_ACCOUNT_ID", "1234")]);

        let err = Config::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("GEOIP_LICENSE_KEY"));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let env = vars(&[
            ("PORT", "http"),
            ("GEOIP_ACCOUNT_ID", "1234"),
            ("GEOIP_LICENSE_KEY", "key"),
        ]);

        assert!(Config::from_lookup(|k| env.get(k).cloned()).is_err());
    }

    #[test]
    fn test_invalid_timeout_names_the_variable() {
        let env = vars(&[
            ("PORT", "8080"),
            ("GEOIP_ACCOUNT_ID", "1234"),
            ("GEOIP_LICENSE_KEY", "key"),
            ("REQUEST_TIMEOUT_SECS", "ten"),
        ]);

        let err = Config::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("REQUEST_TIMEOUT_SECS"));
    }

    #[test]
    fn test_overrides() {
        let env = vars(&[
            ("PORT", "9000"),
            ("HOST", "127.0.0.1"),
            ("DATA_FILE", "/srv/links.json"),
            ("VISITS_FILE", "/var/log/visits.jsonl"),
            ("GEOIP_ACCOUNT_ID", "1"),
            ("GEOIP_LICENSE_KEY", "2"),
            ("GEOIP_ENDPOINT", "http://localhost:7000/city"),
            ("SHUTDOWN_TIMEOUT_SECS", "30"),
            ("READ_TIMEOUT_SECS", "2"),
            ("REQUEST_TIMEOUT_SECS", "15"),
        ]);

        let config = Config::from_lookup(|k| env.get(k).cloned()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.shutdown_timeout_secs, 30);
        assert_eq!(config.server.timeouts().read, Duration::from_secs(2));
        assert_eq!(config.server.timeouts().request, Duration::from_secs(15));
        assert_eq!(config.storage.data_file, "/srv/links.json");
        assert_eq!(config.analytics.visits_file, "/var/log/visits.jsonl");
        assert_eq!(config.analytics.geoip.endpoint, "http://localhost:7000/city");
    }
}
