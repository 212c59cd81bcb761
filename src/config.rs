//! Probe settings for processes embedding Vitals
//!
//! Settings resolve in three layers, later wins: built-in defaults, an
//! optional `vitals.toml` file, and `VITALS_*` environment variables. Every
//! option is an explicit typed field; nothing is inferred from default
//! values at runtime.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default path of the worker event loop liveness marker
pub const DEFAULT_WORKER_LIVENESS_FILE: &str = "/tmp/worker_event_loop_live";
/// Default path of the worker readiness marker
pub const DEFAULT_WORKER_READINESS_FILE: &str = "/tmp/worker_ready";
/// Default path of the scheduler liveness marker
pub const DEFAULT_BEAT_LIVENESS_FILE: &str = "/tmp/beat_live";
/// Default broker URL for the ping roundtrip
pub const DEFAULT_BROKER_URL: &str = "redis://localhost:6379/0";
/// How often the worker event loop touches its liveness marker, in seconds
pub const DEFAULT_PROBE_FREQUENCY_SECONDS: u64 = 60;
/// Grace added on top of the probe frequency when deriving a max age
pub const MAX_AGE_GRACE_SECONDS: i64 = 10;

/// Settings shared by the marker writers and the probe evaluator
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSettings {
    /// Event loop liveness marker maintained by the worker
    #[serde(default = "default_worker_liveness_file")]
    pub worker_liveness_file: PathBuf,

    /// Readiness marker created once the worker accepts work
    #[serde(default = "default_worker_readiness_file")]
    pub worker_readiness_file: PathBuf,

    /// Liveness marker touched by the scheduler on every dispatched task
    #[serde(default = "default_beat_liveness_file")]
    pub beat_liveness_file: PathBuf,

    /// Seconds between liveness marker updates on the worker event loop
    #[serde(default = "default_probe_frequency")]
    pub probe_frequency: u64,

    /// Worker name, typically composed from <queue>@<host>
    #[serde(default = "default_worker_name")]
    pub worker_name: String,

    /// Broker URL used for the ping roundtrip
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
}

fn default_worker_liveness_file() -> PathBuf {
    PathBuf::from(DEFAULT_WORKER_LIVENESS_FILE)
}

fn default_worker_readiness_file() -> PathBuf {
    PathBuf::from(DEFAULT_WORKER_READINESS_FILE)
}

fn default_beat_liveness_file() -> PathBuf {
    PathBuf::from(DEFAULT_BEAT_LIVENESS_FILE)
}

fn default_probe_frequency() -> u64 {
    DEFAULT_PROBE_FREQUENCY_SECONDS
}

fn default_broker_url() -> String {
    DEFAULT_BROKER_URL.to_string()
}

/// Default worker name: `worker@<hostname>`
pub fn default_worker_name() -> String {
    format!("worker@{}", hostname())
}

/// Hostname of the current machine, `localhost` when it cannot be determined
pub fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            worker_liveness_file: default_worker_liveness_file(),
            worker_readiness_file: default_worker_readiness_file(),
            beat_liveness_file: default_beat_liveness_file(),
            probe_frequency: default_probe_frequency(),
            worker_name: default_worker_name(),
            broker_url: default_broker_url(),
        }
    }
}

impl ProbeSettings {
    /// Build settings from defaults and `VITALS_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut settings: ProbeSettings = toml::from_str(&content)?;
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load `vitals.toml` from the working directory when present,
    /// environment-only settings otherwise
    pub fn discover() -> Result<Self> {
        let conventional = Path::new("vitals.toml");
        if conventional.is_file() {
            Self::load(conventional)
        } else {
            Self::from_env()
        }
    }

    /// Maximum marker age consistent with the configured probe frequency
    ///
    /// The frequency plus a grace period, so a single delayed tick does not
    /// flap the probe.
    pub fn recommended_max_age(&self) -> i64 {
        self.probe_frequency as i64 + MAX_AGE_GRACE_SECONDS
    }

    /// Apply `VITALS_*` environment variables on top of the current values
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("VITALS_WORKER_LIVENESS_FILE") {
            self.worker_liveness_file = PathBuf::from(value);
        }
        if let Some(value) = lookup("VITALS_WORKER_READINESS_FILE") {
            self.worker_readiness_file = PathBuf::from(value);
        }
        if let Some(value) = lookup("VITALS_BEAT_LIVENESS_FILE") {
            self.beat_liveness_file = PathBuf::from(value);
        }
        if let Some(value) = lookup("VITALS_PROBE_FREQUENCY_SECONDS") {
            self.probe_frequency = value.parse().map_err(|_| Error::InvalidEnvVar {
                name: "VITALS_PROBE_FREQUENCY_SECONDS".to_string(),
                message: format!("expected a number of seconds, got '{}'", value),
            })?;
        }
        if let Some(value) = lookup("VITALS_WORKER_NAME") {
            self.worker_name = value;
        }
        if let Some(value) = lookup("VITALS_BROKER_URL") {
            self.broker_url = value;
        }
        Ok(())
    }

    /// Validate settings consistency
    pub fn validate(&self) -> Result<()> {
        if self.probe_frequency == 0 {
            return Err(Error::ConfigValidation(
                "probe_frequency must be at least 1 second".to_string(),
            ));
        }
        if self.worker_name.is_empty() {
            return Err(Error::ConfigValidation(
                "worker_name must not be empty".to_string(),
            ));
        }
        if self.broker_url.is_empty() {
            return Err(Error::ConfigValidation(
                "broker_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = ProbeSettings::default();

        assert_eq!(
            settings.worker_liveness_file,
            PathBuf::from("/tmp/worker_event_loop_live")
        );
        assert_eq!(settings.probe_frequency, 60);
        assert_eq!(settings.broker_url, "redis://localhost:6379/0");
        assert!(settings.worker_name.starts_with("worker@"));
        settings.validate().unwrap();
    }

    #[test]
    fn test_recommended_max_age_adds_grace() {
        let settings = ProbeSettings::default();

        assert_eq!(settings.recommended_max_age(), 70);
    }

    #[test]
    fn test_toml_with_partial_fields_fills_defaults() {
        let settings: ProbeSettings = toml::from_str(
            r#"
worker_name = "ingest@node1"
probe_frequency = 15
"#,
        )
        .unwrap();

        assert_eq!(settings.worker_name, "ingest@node1");
        assert_eq!(settings.probe_frequency, 15);
        assert_eq!(
            settings.worker_readiness_file,
            PathBuf::from("/tmp/worker_ready")
        );
    }

    #[test]
    fn test_overrides_win_over_file_values() {
        let mut settings: ProbeSettings =
            toml::from_str(r#"broker_url = "redis://file-host:6379/0""#).unwrap();
        let vars: HashMap<&str, &str> = HashMap::from([
            ("VITALS_BROKER_URL", "redis://env-host:6379/1"),
            ("VITALS_WORKER_NAME", "ingest@node2"),
            ("VITALS_PROBE_FREQUENCY_SECONDS", "30"),
        ]);

        settings
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.broker_url, "redis://env-host:6379/1");
        assert_eq!(settings.worker_name, "ingest@node2");
        assert_eq!(settings.probe_frequency, 30);
    }

    #[test]
    fn test_unparsable_frequency_override_is_rejected() {
        let mut settings = ProbeSettings::default();

        let result = settings.apply_overrides(|name| {
            (name == "VITALS_PROBE_FREQUENCY_SECONDS").then(|| "soon".to_string())
        });

        assert!(matches!(result, Err(Error::InvalidEnvVar { .. })));
    }

    #[test]
    fn test_zero_frequency_fails_validation() {
        let settings = ProbeSettings {
            probe_frequency: 0,
            ..ProbeSettings::default()
        };

        assert!(matches!(
            settings.validate(),
            Err(Error::ConfigValidation(_))
        ));
    }
}
