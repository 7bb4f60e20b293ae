// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

use std::{env, net::SocketAddr, path::PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use parcela_server::api::router;
use parcela_server::config::{DATABASE_FILE, DATA_DIR_ENV};
use parcela_server::reconciler::WebhookReconciler;
use parcela_server::state::{AppState, AuthConfig};
use parcela_server::storage::Database;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    // Open the embedded database
    let data_dir = env::var(DATA_DIR_ENV).unwrap_or_else(|_| "/data".to_string());
    let db_path = PathBuf::from(&data_dir).join(DATABASE_FILE);
    let db = Database::open(&db_path).expect("Failed to open database");
    info!(path = %db_path.display(), "database opened");

    let auth_config = AuthConfig::from_env();
    if auth_config.jwks.is_none() {
        info!("CLERK_JWKS_URL not set: running with development-mode authentication");
    }

    let state = AppState::new(db).with_auth_config(auth_config);

    // Background reconciler for unprocessed webhook events
    let shutdown = CancellationToken::new();
    let reconciler = WebhookReconciler::new(state.clone());
    let reconciler_handle = tokio::spawn(reconciler.run(shutdown.clone()));

    let app = router(state);

    // Parse bind address
    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .expect("Failed to parse bind address");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");

    info!("Parcela server listening on http://{addr} (docs at /docs)");

    let shutdown_signal = shutdown.clone();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            shutdown_signal.cancel();
        })
        .await
        .expect("HTTP server failed");

    let _ = reconciler_handle.await;
}
