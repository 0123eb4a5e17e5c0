// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Subscription handshake verification.
//!
//! Before activating push delivery, Strava sends
//! `GET /webhook?hub.mode=subscribe&hub.verify_token=..&hub.challenge=..`
//! and expects the challenge echoed back as JSON. Checks run in a fixed
//! order: mode, then token, then challenge presence.

use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::debug;

/// Query parameters of a handshake request. Missing values default to empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandshakeQuery {
    #[serde(rename = "hub.mode", default)]
    pub mode: String,
    #[serde(rename = "hub.verify_token", default)]
    pub verify_token: String,
    #[serde(rename = "hub.challenge", default)]
    pub challenge: String,
}

/// Successful handshake response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeResponse {
    #[serde(rename = "hub.challenge")]
    pub challenge: String,
}

/// Handshake verifier bound to the configured verify token.
pub struct WebhookVerifier {
    verify_token: String,
}

impl WebhookVerifier {
    pub fn new(verify_token: impl Into<String>) -> Self {
        Self {
            verify_token: verify_token.into(),
        }
    }

    /// Validate a handshake and return the challenge to echo.
    pub fn verify(&self, query: &HandshakeQuery) -> Result<HandshakeResponse, RelayError> {
        if query.mode != "subscribe" {
            debug!(mode = %query.mode, "Invalid handshake mode");
            return Err(RelayError::BadRequest("Invalid mode"));
        }

        let expected = self.verify_token.as_bytes();
        let provided = query.verify_token.as_bytes();
        if expected.len() != provided.len() || !bool::from(expected.ct_eq(provided)) {
            debug!("Handshake verify token mismatch");
            return Err(RelayError::Forbidden);
        }

        if query.challenge.is_empty() {
            debug!("Handshake missing challenge");
            return Err(RelayError::BadRequest("Missing challenge"));
        }

        Ok(HandshakeResponse {
            challenge: query.challenge.clone(),
        })
    }
}
