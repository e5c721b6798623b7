//! Slow and hung job records.

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{from_str, to_string};
use std::fs::{File, OpenOptions, create_dir_all};
use std::io::{BufRead as _, BufReader, ErrorKind as IoErrorKind, Write as _};
use std::path::{Path, PathBuf};

/// Reason recorded for jobs that exceeded the soft limit but finished.
pub const SLOW_COMPLETED: &str = "slow (completed)";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HangRecord {
    pub job_id: String,
    pub duration_ms: u64,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl HangRecord {
    #[must_use]
    pub fn now(job_id: impl Into<String>, duration_ms: u64, reason: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            duration_ms,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A JSON-lines file that only ever grows.
#[derive(Clone, Debug)]
pub struct HangLog {
    path: PathBuf,
}

impl HangLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or written.
    pub fn append(&self, record: &HangRecord) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent)?;
        }
        let mut line = to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening hang log {}", self.path.display()))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Every record written so far. Lines that do not parse are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn records(&self) -> Result<Vec<HangRecord>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match from_str(&line) {
                Ok(record) => records.push(record),
                Err(err) => warn!("[HANG] skipping unreadable record: {err}"),
            }
        }
        Ok(records)
    }
}
