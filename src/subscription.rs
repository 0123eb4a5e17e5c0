// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Strava push subscription client.

use crate::config::StravaConfig;
use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Subscription returned by the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscription {
    pub id: i64,
}

#[derive(Debug, Serialize)]
struct CreateSubscriptionRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    callback_url: &'a str,
    verify_token: &'a str,
}

/// Client for `POST /api/v3/push_subscriptions`.
pub struct SubscriptionClient {
    config: StravaConfig,
    client: reqwest::Client,
}

impl SubscriptionClient {
    pub fn new(config: StravaConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/api/v3/push_subscriptions",
            self.config.api_base.trim_end_matches('/')
        )
    }

    /// Register this relay's callback URL with the platform.
    pub async fn create(&self) -> Result<Subscription, RelayError> {
        let callback_url = self.config.callback_url();
        info!(callback_url = %callback_url, "Creating push subscription");

        let response = self
            .client
            .post(self.endpoint())
            .json(&CreateSubscriptionRequest {
                client_id: &self.config.client_id,
                client_secret: &self.config.client_secret,
                callback_url: &callback_url,
                verify_token: &self.config.verify_token,
            })
            .send()
            .await
            .map_err(|e| RelayError::UpstreamTransport(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Strava API error");
            return Err(RelayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Subscription>()
            .await
            .map_err(|e| RelayError::UpstreamDecode(e.to_string()))
    }
}
