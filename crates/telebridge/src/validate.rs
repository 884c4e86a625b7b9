// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Record validation.
//!
//! Structural invariants a record must satisfy before it may be forwarded:
//! non-empty string `device_id`, integer `ts`, string `reading.type`,
//! numeric `reading.value`. Checks run in that fixed order so a given
//! malformed record always reports the same first violation.
//!
//! A record that fails here never reaches the HTTP sink.

use serde_json::Value;
use thiserror::Error;

use crate::record::NormalizedRecord;

/// First structural violation found in a record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("device_id must be a non-empty string")]
    DeviceId,

    #[error("ts must be an integer")]
    Timestamp,

    #[error("reading.type must be a string")]
    ReadingType,

    #[error("reading.value must be numeric")]
    ReadingValue,
}

/// Check a normalized record against the forwarding invariants.
///
/// Pure predicate; no side effects. The `reading` sub-record itself is
/// always present by construction, so only its leaves are checked.
pub fn validate(record: &NormalizedRecord) -> Result<(), ValidationError> {
    match &record.device_id {
        Value::String(s) if !s.is_empty() => {}
        _ => return Err(ValidationError::DeviceId),
    }

    if !(record.ts.is_i64() || record.ts.is_u64()) {
        return Err(ValidationError::Timestamp);
    }

    if !record.reading.kind.is_string() {
        return Err(ValidationError::ReadingType);
    }

    if !record.reading.value.is_number() {
        return Err(ValidationError::ReadingValue);
    }

    Ok(())
}
