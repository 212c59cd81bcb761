//! Marker files used as liveness and readiness signals
//!
//! A beacon is a plain file carrying no content; only its existence and
//! last-modified timestamp matter. A long-running process touches its beacon
//! as a side effect of making progress, and the short-lived probe evaluator
//! stats the file to decide whether the process is still healthy. Each beacon
//! has exactly one writer, so no locking is involved.

use crate::error::{Error, Result};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Why a beacon failed its freshness evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// The marker does not exist or is not a regular file
    Missing,
    /// The marker exists but its age exceeds the allowed maximum
    Expired { age: i64, max_age: i64 },
}

/// Outcome of a freshness evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// The marker exists and is recent enough; age in whole seconds
    Fresh { age: i64 },
    /// The marker is missing or expired
    Stale(Staleness),
}

/// A marker file identified by its path
#[derive(Debug, Clone)]
pub struct Beacon {
    path: PathBuf,
}

impl Beacon {
    /// Create a beacon handle; the file itself is only created by [`touch`](Self::touch)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the marker file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the marker or bump its modification time
    ///
    /// Intermediate directories are created if absent.
    pub fn touch(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| Error::MarkerWrite {
                    path: self.path.clone(),
                    source: e,
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::MarkerWrite {
                path: self.path.clone(),
                source: e,
            })?;
        file.set_modified(SystemTime::now())
            .map_err(|e| Error::MarkerWrite {
                path: self.path.clone(),
                source: e,
            })?;

        Ok(())
    }

    /// Delete the marker; a missing file is not an error
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::MarkerRemove {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    /// Whether the marker exists and is a regular file
    pub fn is_present(&self) -> bool {
        fs::metadata(&self.path).map(|m| m.is_file()).unwrap_or(false)
    }

    /// Seconds since the marker was last modified
    ///
    /// Returns `None` when the path is missing or not a regular file. The age
    /// is signed: a marker with a modification time in the future yields a
    /// negative age.
    pub fn age(&self) -> Option<i64> {
        let metadata = fs::metadata(&self.path).ok()?;
        if !metadata.is_file() {
            return None;
        }
        let mtime = metadata.modified().ok()?;
        let mtime_secs = mtime.duration_since(UNIX_EPOCH).ok()?.as_secs() as i64;
        let now_secs = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs() as i64;
        Some(now_secs - mtime_secs)
    }

    /// Evaluate freshness against a maximum allowed age in seconds
    ///
    /// `max_age` may be negative; an existing marker then always evaluates as
    /// expired, since any age is greater than it.
    pub fn check(&self, max_age: i64) -> Freshness {
        match self.age() {
            None => Freshness::Stale(Staleness::Missing),
            Some(age) if age > max_age => Freshness::Stale(Staleness::Expired { age, max_age }),
            Some(age) => Freshness::Fresh { age },
        }
    }
}

/// Render a marker age for diagnostic output
///
/// Plain seconds up to a minute, minutes with one decimal place up to an
/// hour, hours with one decimal place beyond that. A trailing `.0` is elided.
pub fn format_age(age: i64) -> String {
    if age > 60 && age < 3600 {
        format!("{}m", trim_trailing_zero(format!("{:.1}", age as f64 / 60.0)))
    } else if age >= 3600 {
        format!("{}h", trim_trailing_zero(format!("{:.1}", age as f64 / 3600.0)))
    } else {
        format!("{}s", age)
    }
}

fn trim_trailing_zero(value: String) -> String {
    match value.strip_suffix(".0") {
        Some(trimmed) => trimmed.to_string(),
        None => value,
    }
}
