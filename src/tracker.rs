// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Failed-login attempt tracking keyed by client identifier.
//!
//! A client is blocked once it accumulates `max_attempts` consecutive
//! failures, and stays blocked for `block_duration`. Expiry is lazy: the
//! next `is_blocked` call after the window clears the record. A periodic
//! [`AttemptTracker::cleanup`] keeps the map bounded.

use crate::config::AuthConfig;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Per-identifier attempt state.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// Consecutive failures since the last success or unblock
    pub failure_count: u32,
    /// Last time any attempt was recorded
    pub last_attempt: Instant,
    /// Set while the identifier is blocked
    pub blocked_since: Option<Instant>,
}

impl AttemptRecord {
    fn new(now: Instant) -> Self {
        Self {
            failure_count: 0,
            last_attempt: now,
            blocked_since: None,
        }
    }

    fn block_active(&self, now: Instant, block_duration: Duration) -> bool {
        self.blocked_since
            .is_some_and(|since| now.duration_since(since) < block_duration)
    }
}

/// Thread-safe attempt tracker.
pub struct AttemptTracker {
    max_attempts: u32,
    block_duration: Duration,
    retention: Duration,
    max_tracked: usize,
    records: RwLock<HashMap<String, AttemptRecord>>,
}

impl AttemptTracker {
    /// Create a new tracker from the auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            block_duration: config.block_duration(),
            retention: config.retention(),
            max_tracked: config.max_tracked,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Whether `id` is currently blocked.
    ///
    /// An expired block is cleared here, resetting the failure count.
    pub async fn is_blocked(&self, id: &str) -> bool {
        let now = Instant::now();
        {
            let records = self.records.read().await;
            match records.get(id) {
                None => return false,
                Some(record) if record.blocked_since.is_none() => return false,
                Some(record) if record.block_active(now, self.block_duration) => return true,
                Some(_) => {}
            }
        }

        // Block expired. Re-check under the write lock since another request
        // may have touched the record in between.
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(id) else {
            return false;
        };
        if record.block_active(now, self.block_duration) {
            return true;
        }
        if record.blocked_since.take().is_some() {
            debug!(ip = %id, "Block expired, resetting attempts");
            record.failure_count = 0;
        }
        false
    }

    /// Record the outcome of a login attempt.
    pub async fn record_attempt(&self, id: &str, success: bool) {
        let now = Instant::now();
        let mut records = self.records.write().await;
        let record = records
            .entry(id.to_string())
            .or_insert_with(|| AttemptRecord::new(now));

        record.last_attempt = now;

        if success {
            record.failure_count = 0;
            record.blocked_since = None;
            return;
        }

        record.failure_count = record.failure_count.saturating_add(1);

        if record.failure_count >= self.max_attempts && record.blocked_since.is_none() {
            record.blocked_since = Some(now);
            warn!(
                ip = %id,
                failures = record.failure_count,
                "Client blocked after repeated failed attempts"
            );
        }
    }

    /// Remaining block time for `id`, if blocked.
    pub async fn retry_after(&self, id: &str) -> Option<Duration> {
        let now = Instant::now();
        let records = self.records.read().await;
        let since = records.get(id)?.blocked_since?;
        self.block_duration.checked_sub(now.duration_since(since))
    }

    /// Current consecutive failure count for `id`.
    pub async fn failure_count(&self, id: &str) -> u32 {
        self.records
            .read()
            .await
            .get(id)
            .map_or(0, |r| r.failure_count)
    }

    /// Number of tracked identifiers.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Drop idle records (should be called periodically).
    ///
    /// Records under an active block are never removed. If the map is still
    /// above `max_tracked`, the least recently active unblocked records go.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut records = self.records.write().await;
        let before = records.len();

        records.retain(|_, record| {
            record.block_active(now, self.block_duration)
                || now.duration_since(record.last_attempt) < self.retention
        });

        if records.len() > self.max_tracked {
            let mut evictable: Vec<(String, Instant)> = records
                .iter()
                .filter(|(_, r)| !r.block_active(now, self.block_duration))
                .map(|(id, r)| (id.clone(), r.last_attempt))
                .collect();
            evictable.sort_by_key(|(_, last)| *last);

            let excess = records.len() - self.max_tracked;
            for (id, _) in evictable.into_iter().take(excess) {
                records.remove(&id);
            }
        }

        let removed = before - records.len();
        if removed > 0 {
            debug!(removed, remaining = records.len(), "Swept attempt records");
        }
    }
}
