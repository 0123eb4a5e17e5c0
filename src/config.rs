// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the Strava webhook relay.
//!
//! Values are read from the environment using the variable names the
//! relay has always used (`UI_AUTH_TOKEN`, `FORWARD_URLS`, ...). Every
//! field has a default so a bare deployment still starts.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Configuration for the relay service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Login and throttling configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Upstream platform configuration
    #[serde(default)]
    pub strava: StravaConfig,

    /// Event forwarding configuration
    #[serde(default)]
    pub relay: RelayConfig,

    /// Static assets and shutdown behaviour
    #[serde(default)]
    pub server: ServerConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Login credential, brute-force throttling and session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Expected UI credential
    #[serde(default = "default_ui_token")]
    pub ui_token: String,

    /// Consecutive failures before an identifier is blocked (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Block length in seconds (default: 900)
    #[serde(default = "default_block_secs")]
    pub block_duration_secs: u64,

    /// Idle time after which an unblocked record is swept (default: 3600)
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Hard cap on tracked identifiers (default: 10000)
    #[serde(default = "default_max_tracked")]
    pub max_tracked: usize,

    /// HMAC key for session tokens; random per process when unset
    #[serde(default)]
    pub session_secret: Option<String>,

    /// Session validity in seconds (default: 3600)
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Mark the session cookie `Secure`
    #[serde(default)]
    pub secure_cookies: bool,
}

/// Upstream platform credentials and handshake secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StravaConfig {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    /// API base URL (default: https://www.strava.com)
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Shared secret echoed back by the platform during the handshake
    #[serde(default = "default_verify_token")]
    pub verify_token: String,

    /// Public base URL this relay is reachable on
    #[serde(default)]
    pub webhook_base_url: Option<String>,
}

/// Forward targets and outbound request settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub forward_urls: Vec<String>,

    #[serde(default)]
    pub auth_header_name: Option<String>,

    #[serde(default)]
    pub auth_header_token: Option<String>,

    /// Per-call timeout in seconds (default: 10)
    #[serde(default = "default_forward_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Directory holding login.html, index.html and assets
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Drain window for in-flight requests on shutdown (default: 5)
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Interval between tracker sweeps (default: 60)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_ui_token() -> String {
    "default_token".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_block_secs() -> u64 {
    15 * 60
}

fn default_retention_secs() -> u64 {
    60 * 60
}

fn default_max_tracked() -> usize {
    10_000
}

fn default_session_ttl_secs() -> u64 {
    3600
}

fn default_api_base() -> String {
    "https://www.strava.com".to_string()
}

fn default_verify_token() -> String {
    "STRAVA_WEBHOOK_VERIFY_TOKEN".to_string()
}

fn default_forward_timeout_secs() -> u64 {
    10
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            auth: AuthConfig::default(),
            strava: StravaConfig::default(),
            relay: RelayConfig::default(),
            server: ServerConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            ui_token: default_ui_token(),
            max_attempts: default_max_attempts(),
            block_duration_secs: default_block_secs(),
            retention_secs: default_retention_secs(),
            max_tracked: default_max_tracked(),
            session_secret: None,
            session_ttl_secs: default_session_ttl_secs(),
            secure_cookies: false,
        }
    }
}

impl Default for StravaConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            api_base: default_api_base(),
            verify_token: default_verify_token(),
            webhook_base_url: None,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            forward_urls: Vec::new(),
            auth_header_name: None,
            auth_header_token: None,
            timeout_secs: default_forward_timeout_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            static_dir: default_static_dir(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl AuthConfig {
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_duration_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

impl StravaConfig {
    /// Callback URL registered with the platform.
    ///
    /// Falls back to the literal `BAD_URL` so an unset base never points the
    /// platform at localhost.
    pub fn callback_url(&self) -> String {
        match self.webhook_base_url.as_deref() {
            Some(base) if !base.is_empty() => format!("{}/webhook", base.trim_end_matches('/')),
            _ => "BAD_URL".to_string(),
        }
    }
}

impl RelayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The outbound auth header, present only when both parts are set.
    pub fn auth_header(&self) -> Option<(String, String)> {
        match (&self.auth_header_name, &self.auth_header_token) {
            (Some(name), Some(token)) if !name.is_empty() && !token.is_empty() => {
                Some((name.clone(), token.clone()))
            }
            _ => None,
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let bind_addr = var("BIND_ADDR").unwrap_or_else(|| match var("PORT") {
            Some(port) => format!("0.0.0.0:{port}"),
            None => default_bind_addr(),
        });

        let ui_token = var("UI_AUTH_TOKEN").unwrap_or_else(|| {
            warn!("UI_AUTH_TOKEN not set, falling back to default token");
            default_ui_token()
        });

        let client_id = var("STRAVA_CLIENT_ID").unwrap_or_else(|| {
            warn!("STRAVA_CLIENT_ID not set");
            String::new()
        });
        let client_secret = var("STRAVA_CLIENT_SECRET").unwrap_or_else(|| {
            warn!("STRAVA_CLIENT_SECRET not set");
            String::new()
        });

        Config {
            bind_addr,
            auth: AuthConfig {
                ui_token,
                max_attempts: parse_var(var("MAX_AUTH_ATTEMPTS"))
                    .unwrap_or_else(default_max_attempts),
                block_duration_secs: parse_var(var("BLOCK_DURATION_SECS"))
                    .unwrap_or_else(default_block_secs),
                session_secret: var("SESSION_SECRET"),
                session_ttl_secs: parse_var(var("SESSION_TTL_SECS"))
                    .unwrap_or_else(default_session_ttl_secs),
                secure_cookies: parse_var(var("SECURE_COOKIES")).unwrap_or(false),
                ..Default::default()
            },
            strava: StravaConfig {
                client_id,
                client_secret,
                api_base: var("STRAVA_API_BASE").unwrap_or_else(default_api_base),
                verify_token: var("STRAVA_WEBHOOK_VERIFY_TOKEN")
                    .unwrap_or_else(default_verify_token),
                webhook_base_url: var("WEBHOOK_BASE_URL"),
            },
            relay: RelayConfig {
                forward_urls: var("FORWARD_URLS")
                    .map(|v| parse_forward_urls(&v))
                    .unwrap_or_default(),
                auth_header_name: var("AUTH_HEADER_NAME"),
                auth_header_token: var("AUTH_HEADER_TOKEN"),
                timeout_secs: parse_var(var("FORWARD_TIMEOUT_SECS"))
                    .unwrap_or_else(default_forward_timeout_secs),
            },
            server: ServerConfig {
                static_dir: var("STATIC_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(default_static_dir),
                shutdown_grace_secs: parse_var(var("SHUTDOWN_GRACE_SECS"))
                    .unwrap_or_else(default_shutdown_grace_secs),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

fn parse_var<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.parse().ok())
}

/// Split a comma-separated target list.
///
/// Blank entries are dropped, as is anything that is not an absolute
/// `http`/`https` URL.
pub fn parse_forward_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| match Url::parse(s) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => true,
            Ok(url) => {
                warn!(target_url = %s, scheme = url.scheme(), "Ignoring forward URL with unsupported scheme");
                false
            }
            Err(e) => {
                warn!(target_url = %s, error = %e, "Ignoring unparseable forward URL");
                false
            }
        })
        .map(str::to_string)
        .collect()
}
