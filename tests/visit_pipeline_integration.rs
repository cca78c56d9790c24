//! Visit pipeline tests
//!
//! These tests pin down the queue semantics of the tracker: drop-on-full
//! backpressure, arrival-order delivery, draining on shutdown and graceful
//! degradation when enrichment fails.

use async_trait::async_trait;
use shortlink::analytics::tracker::VISIT_QUEUE_CAPACITY;
use shortlink::analytics::{
    GeoIpService, GeoLocation, GeoResolver, TrackerError, VisitEvent, VisitRequest, VisitTracker,
};
use shortlink::config::GeoIpConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};
use tokio::time::{sleep, Duration};

fn visits_path(dir: &TempDir) -> PathBuf {
    dir.path().join("visits.jsonl")
}

fn request(ip: &str) -> VisitRequest {
    VisitRequest {
        client_ip: ip.to_string(),
        user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1".to_string(),
        referer: "https://example.org/".to_string(),
        query: "ref=test".to_string(),
        language: "en-US".to_string(),
    }
}

async fn read_visits(path: &Path) -> Vec<VisitEvent> {
    let content = tokio::fs::read_to_string(path).await.unwrap();
    content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Resolver that parks the worker until the test opens the gate
struct GatedResolver {
    entered: Notify,
    gate: Semaphore,
}

impl GatedResolver {
    fn new() -> Self {
        Self {
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    fn open(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl GeoResolver for GatedResolver {
    async fn lookup(&self, _ip: &str) -> GeoLocation {
        self.entered.notify_one();
        let _permit = self.gate.acquire().await.unwrap();
        GeoLocation {
            country_code: "SE".to_string(),
            city: "Stockholm".to_string(),
        }
    }
}

/// Resolver that fails the test if the worker ever calls it
struct UnreachableResolver;

#[async_trait]
impl GeoResolver for UnreachableResolver {
    async fn lookup(&self, ip: &str) -> GeoLocation {
        panic!("lookup must not be called, got {ip:?}");
    }
}

/// Resolver that takes a little while per lookup
struct SlowResolver;

#[async_trait]
impl GeoResolver for SlowResolver {
    async fn lookup(&self, _ip: &str) -> GeoLocation {
        sleep(Duration::from_millis(2)).await;
        GeoLocation {
            country_code: "JP".to_string(),
            city: "Osaka".to_string(),
        }
    }
}

#[tokio::test]
async fn test_full_queue_drops_overflow_without_blocking() {
    let dir = TempDir::new().unwrap();
    let path = visits_path(&dir);
    let resolver = Arc::new(GatedResolver::new());
    let tracker = VisitTracker::open(&path, Some(resolver.clone() as Arc<dyn GeoResolver>))
        .await
        .unwrap();

    // Park the worker on the first visit so the queue can only fill up
    tracker.record("warmup", request("192.0.2.1"));
    resolver.entered.notified().await;

    for i in 0..VISIT_QUEUE_CAPACITY {
        tracker.record(&format!("queued-{i}"), request("192.0.2.1"));
    }

    let started = Instant::now();
    for i in 0..5 {
        tracker.record(&format!("overflow-{i}"), request("192.0.2.1"));
    }
    assert!(started.elapsed() < Duration::from_millis(100));

    let stats = tracker.stats();
    assert_eq!(stats.queued, VISIT_QUEUE_CAPACITY as u64 + 1);
    assert_eq!(stats.dropped, 5);

    resolver.open();
    tracker.shutdown().await.unwrap();

    let slugs: Vec<String> = read_visits(&path).await.into_iter().map(|v| v.slug).collect();
    let mut expected = vec!["warmup".to_string()];
    expected.extend((0..VISIT_QUEUE_CAPACITY).map(|i| format!("queued-{i}")));
    assert_eq!(slugs, expected);
}

#[tokio::test]
async fn test_single_producer_order_is_preserved() {
    let dir = TempDir::new().unwrap();
    let path = visits_path(&dir);
    let tracker = VisitTracker::open(&path, Some(Arc::new(SlowResolver)))
        .await
        .unwrap();

    for i in 0..60 {
        tracker.record(&format!("slug-{i:02}"), request("198.51.100.7"));
    }
    tracker.shutdown().await.unwrap();

    let slugs: Vec<String> = read_visits(&path).await.into_iter().map(|v| v.slug).collect();
    let expected: Vec<String> = (0..60).map(|i| format!("slug-{i:02}")).collect();
    assert_eq!(slugs, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_keep_their_own_order() {
    let dir = TempDir::new().unwrap();
    let path = visits_path(&dir);
    let tracker = Arc::new(VisitTracker::open(&path, None).await.unwrap());

    let mut handles = vec![];
    for producer in 0..4 {
        let tracker = Arc::clone(&tracker);
        handles.push(tokio::spawn(async move {
            for seq in 0..20 {
                tracker.record(&format!("p{producer}-{seq:02}"), request("203.0.113.8"));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    tracker.shutdown().await.unwrap();

    let visits = read_visits(&path).await;
    assert_eq!(visits.len(), 80);

    for producer in 0..4 {
        let prefix = format!("p{producer}-");
        let seen: Vec<&str> = visits
            .iter()
            .map(|v| v.slug.as_str())
            .filter(|s| s.starts_with(&prefix))
            .collect();
        let expected: Vec<String> = (0..20).map(|seq| format!("{prefix}{seq:02}")).collect();
        assert_eq!(seen, expected, "producer {producer} out of order");
    }
}

#[tokio::test]
async fn test_shutdown_drains_pending_visits() {
    let dir = TempDir::new().unwrap();
    let path = visits_path(&dir);
    let tracker = VisitTracker::open(&path, Some(Arc::new(SlowResolver)))
        .await
        .unwrap();

    for i in 0..40 {
        tracker.record(&format!("drain-{i}"), request("198.51.100.7"));
    }
    // Nothing has been processed yet on this single-threaded runtime
    assert_eq!(tracker.stats().written, 0);

    tracker.shutdown().await.unwrap();

    let visits = read_visits(&path).await;
    assert_eq!(visits.len(), 40);
    assert!(visits.iter().all(|v| v.geo.city == "Osaka"));
    assert_eq!(tracker.stats().written, 40);
}

#[tokio::test]
async fn test_failing_geoip_still_writes_every_visit() {
    let dir = TempDir::new().unwrap();
    let path = visits_path(&dir);

    // Nothing listens on the discard port, so every lookup fails fast
    let geoip = GeoIpService::new(&GeoIpConfig {
        endpoint: "http://127.0.0.1:9/geoip/v2.1/city".to_string(),
        account_id: "1".to_string(),
        license_key: "key".to_string(),
    })
    .unwrap();
    let tracker = VisitTracker::open(&path, Some(Arc::new(geoip)))
        .await
        .unwrap();

    for i in 0..3 {
        tracker.record(&format!("geo-{i}"), request("81.2.69.142"));
    }
    tracker.shutdown().await.unwrap();

    let visits = read_visits(&path).await;
    assert_eq!(visits.len(), 3);
    for visit in &visits {
        assert!(visit.geo.country_code.is_empty());
        assert!(visit.geo.city.is_empty());
        assert_eq!(visit.ip, "81.2.69.142");
        assert_eq!(visit.referer, "https://example.org/");
        assert_eq!(visit.query_params, "ref=test");
        assert_eq!(visit.language, "en-US");
        assert_eq!(visit.client.device_type, "mobile");
        assert!(!visit.client.browser.is_empty());
    }
}

#[tokio::test]
async fn test_empty_ip_never_reaches_resolver() {
    let dir = TempDir::new().unwrap();
    let path = visits_path(&dir);
    let tracker = VisitTracker::open(&path, Some(Arc::new(UnreachableResolver)))
        .await
        .unwrap();

    tracker.record("no-ip", request(""));
    tracker
        .shutdown()
        .await
        .expect("worker must not have called the resolver");

    let visits = read_visits(&path).await;
    assert_eq!(visits.len(), 1);
    assert_eq!(visits[0].geo, GeoLocation::default());
}

#[tokio::test]
async fn test_unwritable_log_fails_construction() {
    let dir = TempDir::new().unwrap();

    // A directory cannot be opened for appending
    let result = VisitTracker::open(dir.path(), None).await;

    match result {
        Err(TrackerError::Open { path, .. }) => assert_eq!(path, dir.path()),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("tracker must not start without a writable log"),
    }
}
