// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus counters for logins, handshakes and forwarding.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Relay metrics, registered on a private registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub login_attempts: IntCounterVec,
    pub blocked: IntCounter,
    pub handshakes: IntCounterVec,
    pub events_received: IntCounter,
    pub forwards: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let login_attempts = IntCounterVec::new(
            Opts::new("relay_login_attempts_total", "UI login attempts by outcome"),
            &["outcome"],
        )?;
        let blocked = IntCounter::new(
            "relay_blocked_total",
            "Login attempts refused because the client was blocked",
        )?;
        let handshakes = IntCounterVec::new(
            Opts::new("relay_handshakes_total", "Webhook handshakes by outcome"),
            &["outcome"],
        )?;
        let events_received = IntCounter::new(
            "relay_events_received_total",
            "Webhook events accepted for fan-out",
        )?;
        let forwards = IntCounterVec::new(
            Opts::new("relay_forwards_total", "Forwarding calls by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(login_attempts.clone()))?;
        registry.register(Box::new(blocked.clone()))?;
        registry.register(Box::new(handshakes.clone()))?;
        registry.register(Box::new(events_received.clone()))?;
        registry.register(Box::new(forwards.clone()))?;

        Ok(Self {
            registry,
            login_attempts,
            blocked,
            handshakes,
            events_received,
            forwards,
        })
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
