// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Signed, expiring session tokens for the UI.
//!
//! Token layout: `base64url(claims_json) "." base64url(hmac_sha256(claims_json))`.
//! The key lives for the process unless `SESSION_SECRET` pins it, so a
//! restart logs everybody out, the same as losing an in-memory session store.

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

use crate::error::RelayError;

type HmacSha256 = Hmac<Sha256>;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "auth_session";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
    pub nonce: String,
}

/// Why a presented token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRejection {
    Malformed,
    BadSignature,
    Expired,
}

/// Issues and verifies session tokens.
pub struct SessionKeys {
    mac: HmacSha256,
    ttl: Duration,
}

impl SessionKeys {
    /// Use `secret` as the HMAC key, or a random 32-byte key when absent.
    pub fn new(secret: Option<&str>, ttl: Duration) -> Result<Self, RelayError> {
        let key = match secret {
            Some(s) if !s.is_empty() => s.as_bytes().to_vec(),
            _ => {
                let mut key = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut key);
                key
            }
        };
        let mac = HmacSha256::new_from_slice(&key)
            .map_err(|e| RelayError::Internal(format!("session key: {e}")))?;
        Ok(Self { mac, ttl })
    }

    /// Issue a token valid for the configured TTL from now.
    pub fn issue(&self) -> String {
        self.issue_at(Utc::now().timestamp())
    }

    fn issue_at(&self, now: i64) -> String {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);

        let claims = SessionClaims {
            iat: now,
            exp: now.saturating_add(i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)),
            nonce: hex::encode(nonce),
        };
        // Serializing a struct of integers and a hex string cannot fail
        let payload = serde_json::to_vec(&claims).unwrap_or_default();

        let mut mac = self.mac.clone();
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();

        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        )
    }

    /// Verify a token's signature and expiry.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionRejection> {
        self.verify_at(token, Utc::now().timestamp())
    }

    fn verify_at(&self, token: &str, now: i64) -> Result<SessionClaims, SessionRejection> {
        let (payload_b64, signature_b64) = token
            .split_once('.')
            .ok_or(SessionRejection::Malformed)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| SessionRejection::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| SessionRejection::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(&payload);
        mac.verify_slice(&signature)
            .map_err(|_| SessionRejection::BadSignature)?;

        let claims: SessionClaims =
            serde_json::from_slice(&payload).map_err(|_| SessionRejection::Malformed)?;

        if claims.exp <= now {
            return Err(SessionRejection::Expired);
        }
        Ok(claims)
    }

    /// Build the `Set-Cookie` value for a freshly issued token.
    pub fn cookie(&self, token: &str, secure: bool) -> String {
        let mut cookie = format!(
            "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.ttl.as_secs()
        );
        if secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Extract the session token from the request's `Cookie` headers.
pub fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}
