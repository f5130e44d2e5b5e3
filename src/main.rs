// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use community_feed_server::{
    api::router,
    auth::TokenVerifier,
    config::{AppConfig, LogFormat, DEFAULT_LOG_FILTER},
    realtime::RetryPolicy,
    state::AppState,
    storage::{FeedDatabase, DATABASE_FILE},
};

/// Time allowed for in-flight requests and sockets after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(config.log_format);
    tracing::info!(?config, "Community feed server v{} starting", env!("CARGO_PKG_VERSION"));

    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let db_path = config.data_dir.join(DATABASE_FILE);
    let db = FeedDatabase::open(&db_path).expect("Failed to open feed database");
    tracing::info!(path = %db_path.display(), "Feed database opened");

    let verifier = TokenVerifier::new(&config.access_token_secret)
        .with_token_ttl(config.access_token_ttl);
    let retry = RetryPolicy {
        attempts: config.resolver_retry_attempts,
        ..RetryPolicy::default()
    };
    let state = AppState::new(Arc::new(db), Arc::new(verifier), retry);
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let handle = Handle::new();
    tokio::spawn(watch_shutdown(shutdown, handle.clone()));

    let addr = config.bind_addr;
    match &config.tls {
        Some(tls) => {
            let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                .await
                .expect("Failed to load TLS certificate and key");
            tracing::info!("Listening on https://{addr} (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .expect("HTTPS server failed");
        }
        None => {
            tracing::info!("Listening on http://{addr} (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .expect("HTTP server failed");
        }
    }

    tracing::info!("Server stopped");
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .init(),
    }
}

/// Wait for Ctrl-C or SIGTERM, then cancel `shutdown` so WebSocket actors
/// send their close frames, and drain the server.
async fn watch_shutdown(shutdown: CancellationToken, handle: Handle<std::net::SocketAddr>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
    shutdown.cancel();
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
