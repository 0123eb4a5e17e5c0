// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Event fan-out to downstream webhooks.
//!
//! Every accepted event is wrapped as `{"event": "<raw body>"}` and posted
//! to each configured target from its own task. Delivery is best-effort:
//! no retries, failures are logged and counted, and the inbound request
//! never waits on a target.

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::metrics::Metrics;
use async_trait::async_trait;
use axum::body::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Strava push event. Parsed to validate the payload; the raw body is what
/// gets forwarded.
///
/// Absent or `null` fields read as their zero value, so partial events still
/// relay. Wrongly typed fields are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub object_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub object_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub aspect_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub updates: HashMap<String, serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub owner_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subscription_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub event_time: i64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A downstream destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    pub url: String,
    /// Header name and value attached to every delivery
    pub auth_header: Option<(String, String)>,
}

impl ForwardTarget {
    pub fn new(url: impl Into<String>, auth_header: Option<(String, String)>) -> Self {
        Self {
            url: url.into(),
            auth_header,
        }
    }
}

/// Body posted to downstream targets.
#[derive(Debug, Serialize, Deserialize)]
pub struct ForwardEnvelope {
    pub event: String,
}

impl ForwardEnvelope {
    /// Wrap raw content. The text is embedded as-is, never rebuilt from a parsed model.
    pub fn encode(content: &[u8]) -> Bytes {
        let envelope = ForwardEnvelope {
            event: String::from_utf8_lossy(content).into_owned(),
        };
        // A single string field always serializes
        Bytes::from(serde_json::to_vec(&envelope).unwrap_or_default())
    }
}

/// Transport used to deliver a payload to one target.
#[async_trait]
pub trait Forwarder: Send + Sync + 'static {
    async fn forward(&self, target: &ForwardTarget, payload: Bytes) -> Result<(), RelayError>;
}

/// `reqwest`-backed forwarder with a per-call timeout.
pub struct HttpForwarder {
    client: reqwest::Client,
}

impl HttpForwarder {
    pub fn new(timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, target: &ForwardTarget, payload: Bytes) -> Result<(), RelayError> {
        let mut request = self
            .client
            .post(&target.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload);

        if let Some((name, value)) = &target.auth_header {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| RelayError::Delivery {
            url: target.url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Delivery {
                url: target.url.clone(),
                reason: format!("status {status}"),
            });
        }
        Ok(())
    }
}

/// Fans events out to the configured targets.
pub struct Relay {
    targets: Vec<ForwardTarget>,
    auth_header: Option<(String, String)>,
    forwarder: Arc<dyn Forwarder>,
    metrics: Metrics,
}

impl Relay {
    pub fn new(config: &RelayConfig, forwarder: Arc<dyn Forwarder>, metrics: Metrics) -> Self {
        let auth_header = config.auth_header();
        let targets = config
            .forward_urls
            .iter()
            .map(|url| ForwardTarget::new(url.clone(), auth_header.clone()))
            .collect();

        Self {
            targets,
            auth_header,
            forwarder,
            metrics,
        }
    }

    pub fn targets(&self) -> &[ForwardTarget] {
        &self.targets
    }

    /// Parse an inbound body as a [`WebhookEvent`].
    pub fn parse_event(raw: &[u8]) -> Result<WebhookEvent, RelayError> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Spawn one delivery task per target and return their handles.
    ///
    /// Dropping the handles detaches the tasks.
    pub fn fan_out(&self, raw: &[u8]) -> Vec<JoinHandle<()>> {
        let payload = ForwardEnvelope::encode(raw);

        self.targets
            .iter()
            .cloned()
            .map(|target| {
                let forwarder = Arc::clone(&self.forwarder);
                let metrics = self.metrics.clone();
                let payload = payload.clone();
                tokio::spawn(async move {
                    info!(target = %target.url, "Forwarding event");
                    match forwarder.forward(&target, payload).await {
                        Ok(()) => {
                            debug!(target = %target.url, "Event delivered");
                            metrics.forwards.with_label_values(&["success"]).inc();
                        }
                        Err(e) => {
                            warn!(target = %target.url, error = %e, "Event delivery failed");
                            metrics.forwards.with_label_values(&["failure"]).inc();
                        }
                    }
                })
            })
            .collect()
    }

    /// Deliver `content` to a single ad-hoc URL and wait for the outcome.
    pub async fn send_one(&self, url: &str, content: &str) -> Result<(), RelayError> {
        if url.is_empty() || content.is_empty() {
            return Err(RelayError::MissingInput);
        }

        let target = ForwardTarget::new(url, self.auth_header.clone());
        let result = self
            .forwarder
            .forward(&target, ForwardEnvelope::encode(content.as_bytes()))
            .await;

        let outcome = if result.is_ok() { "success" } else { "failure" };
        self.metrics.forwards.with_label_values(&[outcome]).inc();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(ForwardTarget, Bytes)>>,
    }

    #[async_trait]
    impl Forwarder for Recorder {
        async fn forward(&self, target: &ForwardTarget, payload: Bytes) -> Result<(), RelayError> {
            self.calls.lock().unwrap().push((target.clone(), payload));
            Ok(())
        }
    }

    fn relay(urls: &[&str], recorder: Arc<Recorder>) -> Relay {
        let config = RelayConfig {
            forward_urls: urls.iter().map(|u| u.to_string()).collect(),
            auth_header_name: Some("X-Relay-Secret".into()),
            auth_header_token: Some("s3cret".into()),
            ..Default::default()
        };
        Relay::new(&config, recorder, Metrics::new().unwrap())
    }

    #[test]
    fn test_parse_event() {
        let raw = br#"{"object_type":"activity","object_id":1360128428,"aspect_type":"update",
            "updates":{"title":"Morning Ride"},"owner_id":134815,"subscription_id":120475,
            "event_time":1516126040}"#;
        let event = Relay::parse_event(raw).unwrap();
        assert_eq!(event.aspect_type, "update");
        assert_eq!(event.updates["title"], "Morning Ride");
    }

    #[test]
    fn test_parse_event_tolerates_missing_and_null_fields() {
        let event = Relay::parse_event(
            br#"{"object_type":"athlete","object_id":134815,"aspect_type":"update",
            "updates":null,"owner_id":134815,"subscription_id":120475}"#,
        )
        .unwrap();
        assert!(event.updates.is_empty());
        assert_eq!(event.event_time, 0);
        assert_eq!(event.object_type, "athlete");
    }

    #[test]
    fn test_parse_event_rejects_mismatched_types() {
        assert!(matches!(
            Relay::parse_event(br#"{"object_id":"not a number"}"#),
            Err(RelayError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_parse_event_rejects_garbage() {
        assert!(matches!(
            Relay::parse_event(b"{not json"),
            Err(RelayError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_envelope_embeds_raw_text() {
        let raw = br#"{"object_id": 1,   "extra":"kept"}"#;
        let envelope: ForwardEnvelope =
            serde_json::from_slice(&ForwardEnvelope::encode(raw)).unwrap();
        assert_eq!(envelope.event.as_bytes(), raw);
    }

    #[tokio::test]
    async fn test_fan_out_reaches_every_target() {
        let recorder = Arc::new(Recorder::default());
        let relay = relay(&["http://a.test/hook", "http://b.test/hook"], recorder.clone());

        for handle in relay.fan_out(b"{}") {
            handle.await.unwrap();
        }

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(target, _)| target.auth_header
            == Some(("X-Relay-Secret".to_string(), "s3cret".to_string()))));
    }

    #[tokio::test]
    async fn test_send_one_requires_url_and_content() {
        let recorder = Arc::new(Recorder::default());
        let relay = relay(&[], recorder.clone());

        assert!(matches!(
            relay.send_one("", "hello").await,
            Err(RelayError::MissingInput)
        ));
        assert!(matches!(
            relay.send_one("http://a.test/hook", "").await,
            Err(RelayError::MissingInput)
        ));
        assert!(recorder.calls.lock().unwrap().is_empty());
    }
}
