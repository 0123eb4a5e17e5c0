// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the relay service.
//!
//! Two surfaces share this module: the public webhook endpoints called by
//! Strava, and the UI endpoints behind the throttled login.

use crate::config::Config;
use crate::error::RelayError;
use crate::metrics::Metrics;
use crate::relay::{Forwarder, HttpForwarder, Relay};
use crate::session::{token_from_headers, SessionKeys};
use crate::subscription::{Subscription, SubscriptionClient};
use crate::tracker::AttemptTracker;
use crate::verifier::{HandshakeQuery, HandshakeResponse, WebhookVerifier};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Query, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, info, warn};

/// Largest login body accepted.
const MAX_AUTH_BODY: usize = 16 * 1024;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub tracker: AttemptTracker,
    pub sessions: SessionKeys,
    pub verifier: WebhookVerifier,
    pub relay: Relay,
    pub subscriptions: SubscriptionClient,
    pub metrics: Metrics,
}

impl AppState {
    /// Build state with an explicit forwarding transport.
    pub fn new(config: Config, forwarder: Arc<dyn Forwarder>) -> Result<Self, RelayError> {
        let metrics = Metrics::new()?;
        let sessions = SessionKeys::new(
            config.auth.session_secret.as_deref(),
            config.auth.session_ttl(),
        )?;

        Ok(Self {
            tracker: AttemptTracker::new(&config.auth),
            sessions,
            verifier: WebhookVerifier::new(config.strava.verify_token.clone()),
            relay: Relay::new(&config.relay, forwarder, metrics.clone()),
            subscriptions: SubscriptionClient::new(config.strava.clone()),
            metrics,
            config,
        })
    }

    /// Build state with the HTTP forwarder.
    pub fn from_config(config: Config) -> Result<Self, RelayError> {
        let forwarder = HttpForwarder::new(config.relay.timeout())?;
        Self::new(config, Arc::new(forwarder))
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub token: String,
}

/// Manual forward request body. Missing fields read as empty.
#[derive(Debug, Deserialize)]
pub struct ManualForwardRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "strava-webhook-relay",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Prometheus exposition endpoint.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> Result<Response, RelayError> {
    let body = state.metrics.render()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

/// Resolve the client identifier used for throttling.
///
/// Prefers the first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// peer address. Both headers are taken at face value: run behind a trusted
/// proxy that overwrites them, or a client can rotate its identifier and
/// escape the throttle.
pub fn client_identifier(request: &Request) -> String {
    let headers = request.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn serve_file(path: impl AsRef<Path>, request: Request) -> Response {
    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

fn redirect(location: &'static str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Login page. Already-authenticated visitors go straight to `/`.
pub async fn login_page(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let authenticated = token_from_headers(request.headers())
        .is_some_and(|token| state.sessions.verify(token).is_ok());
    if authenticated {
        return redirect("/");
    }

    serve_file(state.config.server.static_dir.join("login.html"), request).await
}

/// Credential check behind the attempt tracker.
pub async fn auth(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, RelayError> {
    let client = client_identifier(&request);

    if state.tracker.is_blocked(&client).await {
        warn!(ip = %client, "Blocked client attempted login");
        state.metrics.blocked.inc();
        return Err(RelayError::RateLimited {
            retry_after: state.tracker.retry_after(&client).await,
        });
    }

    let parsed = match axum::body::to_bytes(request.into_body(), MAX_AUTH_BODY).await {
        Ok(body) => serde_json::from_slice::<AuthRequest>(&body).map_err(RelayError::from),
        Err(_) => Err(RelayError::BadRequest("Failed to read request body")),
    };
    let submitted = match parsed {
        Ok(submitted) => submitted,
        Err(e) => {
            debug!(ip = %client, error = %e, "Unparseable login body");
            state.tracker.record_attempt(&client, false).await;
            state
                .metrics
                .login_attempts
                .with_label_values(&["malformed"])
                .inc();
            return Err(e);
        }
    };

    let expected = state.config.auth.ui_token.as_bytes();
    let provided = submitted.token.as_bytes();
    let success = expected.len() == provided.len() && bool::from(expected.ct_eq(provided));

    state.tracker.record_attempt(&client, success).await;

    if !success {
        warn!(ip = %client, "Failed login attempt");
        state
            .metrics
            .login_attempts
            .with_label_values(&["failure"])
            .inc();
        return Err(RelayError::InvalidCredential);
    }

    info!(ip = %client, "Login succeeded");
    state
        .metrics
        .login_attempts
        .with_label_values(&["success"])
        .inc();

    let token = state.sessions.issue();
    let cookie = state
        .sessions
        .cookie(&token, state.config.auth.secure_cookies);

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({ "status": "success" })),
    )
        .into_response())
}

/// Session gate for UI routes. Anything short of a valid token goes to `/login`.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let verdict = token_from_headers(request.headers()).map(|token| state.sessions.verify(token));

    match verdict {
        Some(Ok(_)) => next.run(request).await,
        Some(Err(reason)) => {
            debug!(?reason, path = %request.uri().path(), "Rejected session token");
            RelayError::Unauthenticated.into_response()
        }
        None => RelayError::Unauthenticated.into_response(),
    }
}

/// Subscription handshake (`GET /webhook`).
pub async fn webhook_verify(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HandshakeQuery>,
) -> Result<Json<HandshakeResponse>, RelayError> {
    match state.verifier.verify(&query) {
        Ok(response) => {
            info!("Handshake verified, echoing challenge");
            state.metrics.handshakes.with_label_values(&["success"]).inc();
            Ok(Json(response))
        }
        Err(e) => {
            warn!(error = %e, "Handshake rejected");
            state.metrics.handshakes.with_label_values(&["failure"]).inc();
            Err(e)
        }
    }
}

/// Event delivery (`POST /webhook`). Responds once parsing succeeds.
pub async fn webhook_event(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, RelayError> {
    let event = Relay::parse_event(&body).map_err(|e| {
        warn!(error = %e, "Failed to parse webhook event");
        e
    })?;

    info!(
        object_type = %event.object_type,
        object_id = event.object_id,
        aspect_type = %event.aspect_type,
        owner_id = event.owner_id,
        subscription_id = event.subscription_id,
        event_time = event.event_time,
        "Webhook event received"
    );
    if !event.updates.is_empty() {
        debug!(updates = ?event.updates, "Event updates");
    }

    state.metrics.events_received.inc();
    // Detached: delivery never holds up the response to Strava
    drop(state.relay.fan_out(&body));

    Ok(StatusCode::OK)
}

/// Manual single-target forward from the UI.
pub async fn send_to_webhook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, RelayError> {
    let request: ManualForwardRequest = serde_json::from_slice(&body)?;
    debug!(url = %request.url, "Manual forward requested");

    state.relay.send_one(&request.url, &request.content).await?;

    Ok(Json(serde_json::json!({ "message": "Sent to webhook" })))
}

/// Create the upstream push subscription.
pub async fn create_subscription(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Subscription>, RelayError> {
    let subscription = state.subscriptions.create().await?;
    info!(id = subscription.id, "Push subscription created");
    Ok(Json(subscription))
}
