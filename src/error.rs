// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the relay, and their HTTP mapping.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Relay error types
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Missing Input")]
    MissingInput,

    #[error("Invalid token")]
    InvalidCredential,

    #[error("Invalid verify token")]
    Forbidden,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Too many failed attempts. Try again later.")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Strava API returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Failed to reach upstream: {0}")]
    UpstreamTransport(String),

    #[error("Failed to parse upstream response: {0}")]
    UpstreamDecode(String),

    #[error("Delivery to {url} failed: {reason}")]
    Delivery { url: String, reason: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::InvalidJson(_) | Self::MissingInput => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidCredential => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Unauthenticated => StatusCode::FOUND,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream { .. } => StatusCode::BAD_REQUEST,
            Self::Delivery { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamTransport(_)
            | Self::UpstreamDecode(_)
            | Self::HttpClient(_)
            | Self::Metrics(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::InvalidJson(_) => "INVALID_JSON",
            Self::MissingInput => "MISSING_INPUT",
            Self::InvalidCredential => "INVALID_CREDENTIAL",
            Self::Forbidden => "FORBIDDEN",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::UpstreamTransport(_) => "UPSTREAM_UNREACHABLE",
            Self::UpstreamDecode(_) => "UPSTREAM_DECODE",
            Self::Delivery { .. } => "DELIVERY_FAILED",
            Self::HttpClient(_) | Self::Metrics(_) | Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => {
                (StatusCode::FOUND, [(header::LOCATION, "/login")]).into_response()
            }
            Self::InvalidCredential => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "status": "error", "message": "Invalid token" })),
            )
                .into_response(),
            Self::RateLimited { retry_after } => {
                let retry_secs = retry_after.map(|d| d.as_secs().max(1));
                let body = Json(ErrorResponse {
                    error: self.to_string(),
                    code: self.code(),
                    retry_after_secs: retry_secs,
                });
                match retry_secs {
                    Some(secs) => (
                        StatusCode::TOO_MANY_REQUESTS,
                        [(header::RETRY_AFTER, secs.to_string())],
                        body,
                    )
                        .into_response(),
                    None => (StatusCode::TOO_MANY_REQUESTS, body).into_response(),
                }
            }
            other => (
                other.status(),
                Json(ErrorResponse {
                    error: other.to_string(),
                    code: other.code(),
                    retry_after_secs: None,
                }),
            )
                .into_response(),
        }
    }
}
