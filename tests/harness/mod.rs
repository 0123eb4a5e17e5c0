// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Shared fixtures for driving the relay router in tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{header, Request, Response},
    Router,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use strava_webhook_relay::{
    config::Config,
    handlers::AppState,
    relay::{ForwardEnvelope, ForwardTarget, Forwarder},
    server::router,
    RelayError,
};
use tower::ServiceExt;

pub const UI_TOKEN: &str = "correct-horse";
pub const VERIFY_TOKEN: &str = "hub-secret";

/// A create event exactly as Strava sends it.
pub const EVENT_FIXTURE: &str = r#"{"aspect_type":"create","event_time":1549560669,"object_id":1360128428,"object_type":"activity","owner_id":134815,"subscription_id":120475,"updates":{}}"#;

/// One recorded delivery.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub url: String,
    pub auth_header: Option<(String, String)>,
    pub payload: Bytes,
}

impl Delivery {
    /// The `event` field of the forwarded envelope.
    pub fn event_text(&self) -> String {
        let envelope: ForwardEnvelope = serde_json::from_slice(&self.payload).unwrap();
        envelope.event
    }
}

/// Forwarder that records every call and optionally fails it.
#[derive(Default)]
pub struct RecordingForwarder {
    calls: Mutex<Vec<Delivery>>,
    fail: bool,
}

impl RecordingForwarder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn calls(&self) -> Vec<Delivery> {
        self.calls.lock().unwrap().clone()
    }

    /// Poll until at least `count` calls were recorded or a second passes.
    pub async fn wait_for(&self, count: usize) -> Vec<Delivery> {
        let deadline = Instant::now() + Duration::from_secs(1);
        loop {
            let calls = self.calls();
            if calls.len() >= count || Instant::now() >= deadline {
                return calls;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    async fn forward(&self, target: &ForwardTarget, payload: Bytes) -> Result<(), RelayError> {
        self.calls.lock().unwrap().push(Delivery {
            url: target.url.clone(),
            auth_header: target.auth_header.clone(),
            payload,
        });
        if self.fail {
            return Err(RelayError::Delivery {
                url: target.url.clone(),
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }
}

pub fn static_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("static")
}

/// Config with fixed secrets and the given forward targets.
pub fn test_config(targets: &[&str]) -> Config {
    let mut config = Config::default();
    config.auth.ui_token = UI_TOKEN.to_string();
    config.auth.session_secret = Some("integration-test-key".to_string());
    config.strava.verify_token = VERIFY_TOKEN.to_string();
    config.relay.forward_urls = targets.iter().map(|t| t.to_string()).collect();
    config.server.static_dir = static_dir();
    config
}

pub fn app_with(config: Config, forwarder: Arc<dyn Forwarder>) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(config, forwarder).unwrap());
    (router(state.clone()), state)
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn login_request(ip: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/auth")
        .header("x-forwarded-for", ip)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn login_body(token: &str) -> String {
    serde_json::json!({ "token": token }).to_string()
}

/// `name=value` part of the response's session cookie.
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .next()
        .map(str::to_string)
}

/// Log in from `ip` and return the cookie pair.
pub async fn login(app: &Router, ip: &str) -> String {
    let response = send(app, login_request(ip, &login_body(UI_TOKEN))).await;
    assert_eq!(response.status(), 200);
    session_cookie(&response).expect("login sets a session cookie")
}

pub fn post_json(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}
