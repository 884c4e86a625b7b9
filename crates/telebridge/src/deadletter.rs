// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dead-letter log.
//!
//! Append-only, newline-delimited JSON: one [`DeadLetterRecord`] per line,
//! UTF-8, never rewritten or compacted. The file is opened in append mode
//! for each write and the full line goes out in a single `write_all`, so
//! lines stay whole even if another writer is ever pointed at the same file.
//!
//! There is no fallback tier below this log. A failed append is fatal for
//! the pipeline's delivery guarantee and is surfaced as such.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::record::epoch_seconds;

/// Dead-letter write failures. Fatal: data is at risk of silent loss.
#[derive(Debug, Error)]
pub enum DeadLetterError {
    #[error("dead-letter append to {path} failed: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dead-letter encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One parked message: when it was parked, why, and the best-effort record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    /// Epoch seconds at write time.
    pub ts_dlq: i64,
    /// Human-readable cause (validation or last delivery error).
    pub error: String,
    /// The normalized record that could not be processed.
    pub data: Value,
}

/// Append-only sink for undeliverable or invalid records.
#[derive(Debug, Clone)]
pub struct DeadLetterSink {
    path: PathBuf,
}

impl DeadLetterSink {
    /// Create a sink writing to the given log path. The file is created on
    /// first append, not here.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. No deduplication: the same record written twice
    /// produces two lines.
    pub fn write(&self, data: &Value, error: &str) -> Result<(), DeadLetterError> {
        let entry = DeadLetterRecord {
            ts_dlq: epoch_seconds(),
            error: error.to_string(),
            data: data.clone(),
        };

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DeadLetterError::Append {
                path: self.path.clone(),
                source: e,
            })?;
        file.write_all(&line).map_err(|e| DeadLetterError::Append {
            path: self.path.clone(),
            source: e,
        })?;

        Ok(())
    }
}
