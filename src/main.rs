use anyhow::{Context, Result};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use shortlink::analytics::{GeoIpService, GeoResolver, VisitTracker};
use shortlink::config::Config;
use shortlink::redirect;
use shortlink::storage::{FileStorage, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Load URLs; a broken file leaves the service up with no slugs
    let storage: Arc<dyn Storage> = match FileStorage::load(&config.storage.data_file) {
        Ok(storage) => {
            info!("Loaded {} URLs from {}", storage.len(), config.storage.data_file);
            for url in storage.entries().filter(|u| redirect::is_reserved_slug(&u.short_code)) {
                warn!(slug = %url.short_code, "Slug is shadowed by a built-in route and will never redirect");
            }
            Arc::new(storage)
        }
        Err(err) => {
            error!(error = %err, "Error loading URLs");
            Arc::new(FileStorage::default())
        }
    };

    let geoip: Option<Arc<dyn GeoResolver>> = match GeoIpService::new(&config.analytics.geoip) {
        Ok(service) => Some(Arc::new(service)),
        Err(err) => {
            warn!(error = %err, "Could not initialize GeoIP service");
            None
        }
    };

    let tracker = Arc::new(
        VisitTracker::open(&config.analytics.visits_file, geoip)
            .await
            .context("Error initializing visit tracker")?,
    );

    let router = redirect::create_redirect_router(
        storage,
        Arc::clone(&tracker),
        config.server.timeouts(),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("🚀 Redirect server listening on http://{}", addr);

    let (signal_tx, mut signal_rx) = watch::channel(false);
    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        info!("Shutting down server...");
        let _ = signal_tx.send(true);
    })
    .into_future();
    tokio::pin!(server);

    let grace = Duration::from_secs(config.server.shutdown_timeout_secs);
    tokio::select! {
        result = &mut server => result.context("Redirect server failed")?,
        _ = signal_rx.changed() => {
            match tokio::time::timeout(grace, &mut server).await {
                Ok(result) => result.context("Redirect server failed")?,
                Err(_) => warn!("Server forced to shutdown with requests still in flight"),
            }
        }
    }

    // Handlers are done producing; flush what is left in the visit queue
    if let Err(err) = tracker.shutdown().await {
        error!(error = %err, "Error closing visit tracker");
    }

    info!("Server exiting");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
