// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Canonical telemetry record.
//!
//! The record shape is fixed (`device_id`, `ts`, `reading`, `meta`) but the
//! leaves stay `serde_json::Value`-typed: normalization is permissive and
//! keeps whatever the device sent, validation decides afterwards whether the
//! leaf types are acceptable. A strongly typed record here would make half
//! of the validator unreachable.

use serde::Serialize;
use serde_json::Value;

/// The canonical unit forwarded downstream.
///
/// Serializes to the exact JSON document the ingest endpoint expects:
///
/// ```json
/// {
///   "device_id": "meter-001",
///   "ts": 1735689600,
///   "reading": { "type": "water", "value": 3.5, "unit": "L/min" },
///   "meta": { "topic": "meters/meter-001/telemetry" }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedRecord {
    /// Device identifier. A string after a well-formed publish; anything
    /// else the device sent is preserved for the validator to reject.
    pub device_id: Value,
    /// Epoch seconds. Integer after a well-formed publish.
    pub ts: Value,
    /// The measurement itself.
    pub reading: Reading,
    /// Traceability metadata.
    pub meta: RecordMeta,
}

/// Measurement sub-record.
#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    /// Reading kind (e.g. "water", "gas"). Defaults to "unknown".
    #[serde(rename = "type")]
    pub kind: Value,
    /// Measured value. Numeric for valid records; carries the raw decoded
    /// text when the payload was not JSON.
    pub value: Value,
    /// Unit of measure, or null.
    pub unit: Value,
}

/// Metadata kept alongside the reading.
#[derive(Debug, Clone, Serialize)]
pub struct RecordMeta {
    /// Original transport topic, unmodified.
    pub topic: String,
}

impl NormalizedRecord {
    /// Device id rendered for log events.
    ///
    /// Strings come back verbatim; non-string ids (possible before
    /// validation) come back as their JSON rendering.
    pub fn device_id_lossy(&self) -> String {
        match &self.device_id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Current wall-clock time as epoch seconds.
pub(crate) fn epoch_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
