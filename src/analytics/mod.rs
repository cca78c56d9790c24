//! Visitor analytics
//!
//! Redirects hand a cheap [`VisitRequest`] to the [`VisitTracker`]; GeoIP
//! resolution and user agent parsing happen later on the tracker's worker
//! so they never add latency to the redirect itself.

pub mod geoip;
pub mod ip_extractor;
pub mod models;
pub mod tracker;
pub mod user_agent;

pub use geoip::{GeoIpService, GeoResolver};
pub use ip_extractor::extract_client_ip;
pub use models::{GeoLocation, UserAgentInfo, VisitEvent, VisitRequest};
pub use tracker::{Clock, SystemClock, TrackerError, TrackerStats, VisitTracker};
