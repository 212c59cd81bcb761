//! HTTP liveness check against the web application
//!
//! A single GET, bounded by a timeout, mapped to a binary up/down outcome.
//! There is no state here; the component exists because it shares the exit
//! code convention of the other probes.

use std::time::Duration;
use ureq::Agent;

/// Default authority when the endpoint does not name a host
const DEFAULT_AUTHORITY: &str = "localhost:8000";
/// Default path when the endpoint does not name one
const DEFAULT_PATH: &str = "/_healthz/livez/";

/// Outcome of the HTTP liveness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpStatus {
    /// The endpoint answered with a success status
    Up { status: u16 },
    /// The endpoint answered with a failure status
    Down { status: u16 },
    /// The request never completed
    Error { detail: String },
}

impl HttpStatus {
    /// Process exit code: 0 only for an up endpoint
    pub fn exit_code(&self) -> i32 {
        match self {
            HttpStatus::Up { .. } => 0,
            HttpStatus::Down { .. } | HttpStatus::Error { .. } => 1,
        }
    }
}

/// Normalize a bare path or `host:port/path` into a full URL
///
/// The scheme defaults to `http`, the authority to `localhost:8000`, and the
/// path to the conventional liveness endpoint of the probed application.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let (scheme, rest) = if let Some(rest) = endpoint.strip_prefix("https://") {
        ("https", rest)
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        ("http", rest)
    } else {
        ("http", endpoint)
    };

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };

    let authority = if authority.is_empty() {
        DEFAULT_AUTHORITY
    } else {
        authority
    };
    let path = if path.is_empty() { DEFAULT_PATH } else { path };

    format!("{}://{}{}", scheme, authority, path)
}

/// Issue one GET against the (normalized) endpoint
pub fn check(endpoint: &str, timeout: Duration) -> HttpStatus {
    let url = normalize_endpoint(endpoint);

    let config = Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    let agent = Agent::new_with_config(config);

    match agent.get(&url).call() {
        Ok(response) => {
            let status = response.status().as_u16();
            // "ok" in the sense of the probed application's clients: any
            // status below 400 counts as up
            if status < 400 {
                HttpStatus::Up { status }
            } else {
                HttpStatus::Down { status }
            }
        }
        Err(e) => HttpStatus::Error {
            detail: e.to_string(),
        },
    }
}
