// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Security tests for the login gate.
//!
//! These tests simulate credential-guessing patterns against the router and
//! the attempt tracker and check that the throttle holds.

mod harness;

use axum::http::StatusCode;
use harness::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use strava_webhook_relay::{config::AuthConfig, AttemptTracker};

/// Tally of response statuses seen during an attack.
#[derive(Debug, Default)]
struct AttackReport {
    by_status: HashMap<u16, usize>,
}

impl AttackReport {
    fn record(&mut self, status: StatusCode) {
        *self.by_status.entry(status.as_u16()).or_default() += 1;
    }

    fn count(&self, status: StatusCode) -> usize {
        self.by_status.get(&status.as_u16()).copied().unwrap_or(0)
    }

    fn total(&self) -> usize {
        self.by_status.values().sum()
    }
}

fn generate_ips(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("10.{}.{}.{}", (i >> 16) & 0xff, (i >> 8) & 0xff, i & 0xff))
        .collect()
}

// ============================================================================
// Attack Simulation Tests
// ============================================================================

#[tokio::test]
async fn test_single_ip_guessing_is_cut_off() {
    let (app, state) = app_with(test_config(&[]), RecordingForwarder::new());
    let ip = "203.0.113.66";
    let mut report = AttackReport::default();

    for i in 0..50 {
        let response = send(&app, login_request(ip, &login_body(&format!("guess-{i}")))).await;
        report.record(response.status());
    }

    println!("{report:?}");
    assert_eq!(report.count(StatusCode::UNAUTHORIZED), 3);
    assert_eq!(report.count(StatusCode::TOO_MANY_REQUESTS), 47);
    assert_eq!(state.tracker.failure_count(ip).await, 3);

    // Guessing right after the block changes nothing
    let response = send(&app, login_request(ip, &login_body(UI_TOKEN))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_distributed_guessing_under_threshold() {
    let (app, state) = app_with(test_config(&[]), RecordingForwarder::new());
    let ips = generate_ips(100);
    let mut report = AttackReport::default();

    // Two misses per address stays under the limit of three
    for ip in &ips {
        for _ in 0..2 {
            let response = send(&app, login_request(ip, &login_body("nope"))).await;
            report.record(response.status());
        }
    }

    println!("{report:?}");
    assert_eq!(report.total(), 200);
    assert_eq!(report.count(StatusCode::UNAUTHORIZED), 200);
    assert_eq!(state.tracker.len().await, 100);
    for ip in &ips {
        assert!(!state.tracker.is_blocked(ip).await);
    }

    // Each address can still log in
    let response = send(&app, login_request(&ips[42], &login_body(UI_TOKEN))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_concurrent_failures_are_not_lost() {
    let tracker = Arc::new(AttemptTracker::new(&AuthConfig {
        max_attempts: 100,
        ..Default::default()
    }));

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.record_attempt("198.51.100.9", false).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(tracker.failure_count("198.51.100.9").await, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_login_burst_ends_blocked() {
    let (app, state) = app_with(test_config(&[]), RecordingForwarder::new());
    let ip = "203.0.113.77";

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                send(&app, login_request(ip, &login_body(&format!("burst-{i}"))))
                    .await
                    .status()
            })
        })
        .collect();

    let mut report = AttackReport::default();
    for handle in handles {
        report.record(handle.await.unwrap());
    }

    println!("{report:?}");
    assert_eq!(
        report.count(StatusCode::UNAUTHORIZED) + report.count(StatusCode::TOO_MANY_REQUESTS),
        20
    );
    assert!(report.count(StatusCode::UNAUTHORIZED) >= 3);
    assert!(state.tracker.is_blocked(ip).await);

    let response = send(&app, login_request(ip, &login_body(UI_TOKEN))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test(start_paused = true)]
async fn test_block_lifts_after_duration() {
    let (app, _) = app_with(test_config(&[]), RecordingForwarder::new());
    let ip = "203.0.113.88";

    for _ in 0..3 {
        send(&app, login_request(ip, &login_body("nope"))).await;
    }
    let response = send(&app, login_request(ip, &login_body(UI_TOKEN))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    tokio::time::advance(Duration::from_secs(14 * 60)).await;
    let response = send(&app, login_request(ip, &login_body(UI_TOKEN))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    tokio::time::advance(Duration::from_secs(61)).await;
    let response = send(&app, login_request(ip, &login_body(UI_TOKEN))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn test_identifier_flood_stays_bounded() {
    let tracker = AttemptTracker::new(&AuthConfig {
        max_attempts: 3,
        max_tracked: 100,
        ..Default::default()
    });

    // One blocked address, then a flood of single misses from fresh ones
    for _ in 0..3 {
        tracker.record_attempt("192.0.2.1", false).await;
    }
    for ip in generate_ips(1000) {
        tokio::time::advance(Duration::from_millis(1)).await;
        tracker.record_attempt(&ip, false).await;
    }
    assert_eq!(tracker.len().await, 1001);

    tracker.cleanup().await;
    assert_eq!(tracker.len().await, 100);
    assert!(tracker.is_blocked("192.0.2.1").await);

    // The most recent addresses are the ones kept
    assert_eq!(tracker.failure_count("10.0.3.231").await, 1);
    assert_eq!(tracker.failure_count("10.0.0.0").await, 0);
}

#[tokio::test]
async fn test_tampered_session_is_rejected() {
    let (app, _) = app_with(test_config(&[]), RecordingForwarder::new());
    let cookie = login(&app, "203.0.113.99").await;

    let (name, token) = cookie.split_once('=').unwrap();
    let mut chars: Vec<char> = token.chars().collect();
    let middle = chars.len() / 4;
    chars[middle] = if chars[middle] == 'A' { 'B' } else { 'A' };
    let forged = format!("{name}={}", chars.into_iter().collect::<String>());

    let response = send(&app, get("/", Some(&forged))).await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let response = send(&app, get("/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_session_from_another_deployment_is_rejected() {
    let (app, _) = app_with(test_config(&[]), RecordingForwarder::new());
    let cookie = login(&app, "203.0.113.100").await;

    let mut other = test_config(&[]);
    other.auth.session_secret = Some("a-different-key".to_string());
    let (other_app, _) = app_with(other, RecordingForwarder::new());

    let response = send(&other_app, get("/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::FOUND);
}
