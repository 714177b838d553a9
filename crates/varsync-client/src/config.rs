//! Environment-driven helpers for bootstrapping a Varsync client.
//!
//! Hosts that prefer explicit configuration can build a
//! [`SyncConfig`](crate::SyncConfig) directly; this module only covers the
//! `VARSYNC_*` process environment.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use tracing::warn;

use crate::http::HttpClientOptions;
use crate::sync::config::{SyncConfig, DEFAULT_API_URL};

/// Access token sent as the bearer credential.
const ENV_ACCESS_TOKEN: &str = "VARSYNC_ACCESS_TOKEN";
/// Environment name; selects the handshake variant when present.
const ENV_ENVIRONMENT: &str = "VARSYNC_ENV";
/// Overrides the backend base URL.
const ENV_API_URL: &str = "VARSYNC_API_URL";
/// Poll interval in milliseconds.
const ENV_POLL_INTERVAL_MS: &str = "VARSYNC_POLL_INTERVAL_MS";
/// Allows plaintext `http://` base URLs.
const ENV_NO_TLS: &str = "VARSYNC_NO_TLS";
/// Skips TLS certificate validation.
const ENV_NO_TLS_VALIDATION: &str = "VARSYNC_NO_TLS_VALIDATION";
/// Log filter directive for hosts that install a subscriber.
const ENV_LOG_LEVEL: &str = "VARSYNC_LOG_LEVEL";

/// Options read from the `VARSYNC_*` environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarsyncEnv {
    /// Trimmed access token, `None` when unset or blank.
    pub access_token: Option<String>,
    /// Trimmed environment name, `None` when unset or blank.
    pub environment: Option<String>,
    /// Backend base URL.
    pub api_url: String,
    /// Poll interval override.
    pub poll_interval: Option<Duration>,
    /// When `true`, plaintext endpoints are accepted.
    pub no_tls: bool,
    /// When `true`, TLS certificate validation is skipped.
    pub no_tls_validation: bool,
    /// Raw log filter (e.g. `debug` or `varsync_client=trace`).
    pub log_level: Option<String>,
}

impl VarsyncEnv {
    /// Builds settings from the current process environment.
    pub fn from_os_env() -> Self {
        Self::from_env_iter(env::vars())
    }

    /// Builds settings from an iterator of key/value pairs (typically for tests).
    pub fn from_env_iter<I, K, V>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let access_token = map
            .get(ENV_ACCESS_TOKEN)
            .and_then(|value| sanitize_token(value));
        let environment = map
            .get(ENV_ENVIRONMENT)
            .and_then(|value| sanitize_non_empty(value));
        let api_url = map
            .get(ENV_API_URL)
            .and_then(|value| sanitize_non_empty(value))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let poll_interval = map
            .get(ENV_POLL_INTERVAL_MS)
            .and_then(|value| parse_millis(value));
        let no_tls = parse_bool(map.get(ENV_NO_TLS).map(String::as_str), false);
        let no_tls_validation =
            parse_bool(map.get(ENV_NO_TLS_VALIDATION).map(String::as_str), false);
        let log_level = map
            .get(ENV_LOG_LEVEL)
            .and_then(|value| sanitize_non_empty(value));

        Self {
            access_token,
            environment,
            api_url,
            poll_interval,
            no_tls,
            no_tls_validation,
            log_level,
        }
    }

    /// Converts the environment into a client configuration, keeping defaults
    /// for anything that was not overridden.
    pub fn to_sync_config(&self) -> SyncConfig {
        let defaults = SyncConfig::default();
        SyncConfig {
            api_url: self.api_url.clone(),
            poll_interval: self.poll_interval.unwrap_or(defaults.poll_interval),
            http: HttpClientOptions {
                allow_plaintext: self.no_tls,
                accept_invalid_certs: self.no_tls_validation,
            },
            ..defaults
        }
    }
}

/// Returns a trimmed access token or `None` if the input is blank.
pub fn sanitize_token(value: &str) -> Option<String> {
    sanitize_non_empty(value)
}

fn sanitize_non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_millis(value: &str) -> Option<Duration> {
    match value.trim().parse::<u64>() {
        Ok(millis) => Some(Duration::from_millis(millis)),
        Err(err) => {
            warn!("ignoring {ENV_POLL_INTERVAL_MS}={value:?}: {err}");
            None
        }
    }
}

/// Parses boolean values from strings, falling back to the provided default.
fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(|s| s.trim().to_ascii_lowercase()) {
        Some(ref v) if ["1", "true", "t", "yes", "y"].contains(&v.as_str()) => true,
        Some(ref v) if ["0", "false", "f", "no", "n"].contains(&v.as_str()) => false,
        _ => default,
    }
}
