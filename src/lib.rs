// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Strava Webhook Relay
//!
//! Receives Strava push events and relays them to downstream webhooks:
//!
//! - Subscription handshake verification (`GET /webhook`)
//! - Concurrent best-effort fan-out of raw event bodies (`POST /webhook`)
//! - Token login with per-client brute-force blocking
//! - HMAC-signed session cookies gating the UI routes
//! - Push subscription creation against the Strava API

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod session;
pub mod subscription;
pub mod tracker;
pub mod verifier;

pub use config::Config;
pub use error::RelayError;
pub use handlers::AppState;
pub use relay::{ForwardTarget, Forwarder, HttpForwarder, Relay, WebhookEvent};
pub use session::SessionKeys;
pub use tracker::AttemptTracker;
pub use verifier::WebhookVerifier;
