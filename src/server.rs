// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Router wiring and server lifecycle.

use crate::handlers::{
    auth, create_subscription, health, login_page, metrics_endpoint, require_session,
    send_to_webhook, webhook_event, webhook_verify, AppState,
};
use axum::{
    middleware,
    routing::{get, get_service, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Build the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.server.static_dir.clone();

    let protected = Router::new()
        .route("/", get_service(ServeFile::new(static_dir.join("index.html"))))
        .route("/sendToWebhook", post(send_to_webhook))
        .route("/create-subscription", post(create_subscription))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    let mut app = Router::new()
        .route("/login", get(login_page))
        .route("/auth", post(auth))
        .route("/webhook", get(webhook_verify).post(webhook_event))
        .route("/health", get(health))
        .route("/healthz", get(health))
        .nest_service("/static", ServeDir::new(static_dir))
        .merge(protected);

    if state.config.metrics.enabled {
        app = app.route(&state.config.metrics.path, get(metrics_endpoint));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Spawn the periodic attempt-tracker sweep.
pub fn spawn_sweeper(state: Arc<AppState>) -> JoinHandle<()> {
    let period = state.config.server.sweep_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            state.tracker.cleanup().await;
        }
    })
}

/// Serve until `shutdown` resolves, then drain for the configured grace window.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send,
{
    let grace = state.config.server.shutdown_grace();
    let sweeper = spawn_sweeper(state.clone());
    let app = router(state);

    let stop = Arc::new(Notify::new());
    let drain = stop.clone();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { drain.notified().await });
    let mut server_task = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut server_task => {
            sweeper.abort();
            result??;
            return Ok(());
        }
        _ = shutdown => {
            info!("Shutdown requested, draining in-flight requests");
        }
    }

    stop.notify_one();
    let drained = tokio::time::timeout(grace, &mut server_task).await;
    sweeper.abort();

    match drained {
        Ok(result) => result??,
        Err(_) => {
            warn!(grace_secs = grace.as_secs(), "Drain window elapsed, closing listener");
            server_task.abort();
        }
    }
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
