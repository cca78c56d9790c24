//! Asynchronous visit recording pipeline
//!
//! Request handlers call [`VisitTracker::record`] on the hot path. It builds
//! the raw [`VisitEvent`] and offers it to a bounded channel without waiting;
//! when the channel is full the visit is dropped and counted.
//!
//! A single worker task owns the receiving side. For each event it resolves
//! the location, classifies the user agent and appends one JSON line to the
//! visits log. The worker only exits once the channel is closed *and* empty,
//! which happens after [`VisitTracker::shutdown`] drops the sole sender.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::analytics::geoip::GeoResolver;
use crate::analytics::models::{GeoLocation, VisitEvent, VisitRequest};
use crate::analytics::user_agent;

/// Number of visits that may wait for the worker before new ones are dropped
pub const VISIT_QUEUE_CAPACITY: usize = 100;

/// Source of visit timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("failed to open visits log at {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to close visits log")]
    Close(#[source] io::Error),
    #[error("visit worker terminated abnormally")]
    Worker(#[from] tokio::task::JoinError),
    #[error("visit tracker is already shut down")]
    AlreadyShutDown,
}

/// Point-in-time view of the tracker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    /// Visits accepted into the queue
    pub queued: u64,
    /// Visits discarded because the queue was full or closed
    pub dropped: u64,
    /// Visits appended to the log
    pub written: u64,
    /// Visits that could not be encoded or written
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> TrackerStats {
        TrackerStats {
            queued: self.queued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Handle to the visit pipeline
///
/// Shared between request handlers behind an `Arc`. The sender lives in an
/// `Option` so that shutdown can close the channel while handlers still hold
/// the tracker.
pub struct VisitTracker {
    sender: RwLock<Option<mpsc::Sender<VisitEvent>>>,
    worker: Mutex<Option<JoinHandle<File>>>,
    clock: Arc<dyn Clock>,
    counters: Arc<Counters>,
}

impl VisitTracker {
    /// Open the visits log and start the worker
    ///
    /// # Arguments
    /// * `path` - Visits log, created if missing and always appended to
    /// * `geoip` - Optional location resolver; without it country and city
    ///   stay empty
    pub async fn open(
        path: impl AsRef<Path>,
        geoip: Option<Arc<dyn GeoResolver>>,
    ) -> Result<Self, TrackerError> {
        Self::open_with_clock(path, geoip, Arc::new(SystemClock)).await
    }

    /// Same as [`VisitTracker::open`] with an explicit timestamp source
    pub async fn open_with_clock(
        path: impl AsRef<Path>,
        geoip: Option<Arc<dyn GeoResolver>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TrackerError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|source| TrackerError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let (sender, receiver) = mpsc::channel(VISIT_QUEUE_CAPACITY);
        let counters = Arc::new(Counters::default());

        let worker = VisitWorker {
            receiver,
            file,
            geoip,
            counters: Arc::clone(&counters),
        };
        let handle = tokio::spawn(worker.run());

        info!(path = %path.display(), "visit tracker started");

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
            clock,
            counters,
        })
    }

    /// Queue a visit for enrichment and logging
    ///
    /// Never waits and never fails: when the queue is full the visit is
    /// dropped with a warning.
    pub fn record(&self, slug: &str, request: VisitRequest) {
        let event = VisitEvent::new(slug, self.clock.now(), request);

        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            debug!(slug = %slug, "visit tracker is shut down, discarding visit");
            return;
        };

        match sender.try_send(event) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(slug = %event.slug, "visit queue full, dropping visit");
            }
            Err(TrySendError::Closed(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(slug = %event.slug, "visit worker is gone, dropping visit");
            }
        }
    }

    pub fn stats(&self) -> TrackerStats {
        self.counters.snapshot()
    }

    /// Close the queue, wait for the worker to drain it, then close the log
    ///
    /// Visits recorded after this call are discarded. Calling it twice
    /// returns [`TrackerError::AlreadyShutDown`].
    pub async fn shutdown(&self) -> Result<(), TrackerError> {
        let sender = self
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return Err(TrackerError::AlreadyShutDown);
        }
        drop(sender);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return Err(TrackerError::AlreadyShutDown);
        };

        info!("draining visit queue");
        let mut file = worker.await?;
        file.flush().await.map_err(TrackerError::Close)?;
        file.sync_all().await.map_err(TrackerError::Close)?;
        drop(file);

        let stats = self.stats();
        info!(
            written = stats.written,
            dropped = stats.dropped,
            failed = stats.failed,
            "visit tracker shut down"
        );
        Ok(())
    }
}

/// Sole consumer of the visit queue
struct VisitWorker {
    receiver: mpsc::Receiver<VisitEvent>,
    file: File,
    geoip: Option<Arc<dyn GeoResolver>>,
    counters: Arc<Counters>,
}

impl VisitWorker {
    /// Process visits in arrival order until the queue is closed and empty.
    /// Hands the log file back so shutdown can close it.
    async fn run(mut self) -> File {
        while let Some(mut event) = self.receiver.recv().await {
            self.enrich(&mut event).await;

            match self.append(&event).await {
                Ok(()) => {
                    self.counters.written.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    error!(slug = %event.slug, error = %err, "Failed to write visit");
                }
            }
        }

        debug!("visit queue closed and drained");
        self.file
    }

    async fn enrich(&self, event: &mut VisitEvent) {
        let geo = match &self.geoip {
            Some(geoip) if !event.ip.is_empty() => geoip.lookup(&event.ip).await,
            _ => GeoLocation::default(),
        };
        let client = user_agent::classify(&event.user_agent);

        event.enrich(client, geo);
    }

    async fn append(&mut self, event: &VisitEvent) -> io::Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        self.file.write_all(&line).await?;
        self.file.flush().await
    }
}
