// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Payload normalization.
//!
//! Turns a `(topic, raw bytes)` pair into a [`NormalizedRecord`]. This is a
//! total function: undecodable bytes, broken JSON and non-object payloads
//! all still produce a record. The validator is the strict half of the
//! pair; nothing here rejects input.

use serde_json::{Map, Value};

use crate::record::{epoch_seconds, NormalizedRecord, Reading, RecordMeta};

/// Expected topic shape for device publishes: `meters/<device_id>/telemetry`.
const TOPIC_PREFIX: &str = "meters";

/// Normalize a raw transport message into the canonical record.
///
/// - Payload bytes are decoded lossily (invalid UTF-8 becomes U+FFFD).
/// - Non-JSON or non-object payloads are wrapped as `{"raw": <text>}` so the
///   original content survives into the record (and into the dead-letter log
///   if validation rejects it later).
/// - `device_id` resolution order: payload field, then the topic's second
///   segment for `meters/<id>/telemetry`-shaped topics, then `"unknown"`.
/// - `ts` falls back to the current wall clock when absent or falsy.
pub fn normalize(topic: &str, payload: &[u8]) -> NormalizedRecord {
    let text = String::from_utf8_lossy(payload);
    let text = text.trim();

    let obj = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut map = Map::new();
            map.insert("raw".to_string(), Value::String(text.to_string()));
            map
        }
    };

    let device_id = obj
        .get("device_id")
        .filter(|v| is_truthy(v))
        .cloned()
        .or_else(|| {
            topic_device_id(topic)
                .filter(|id| !id.is_empty())
                .map(Value::from)
        })
        .unwrap_or_else(|| Value::String("unknown".to_string()));

    let ts = match obj.get("ts") {
        Some(v) if is_truthy(v) => v.clone(),
        _ => Value::from(epoch_seconds()),
    };

    let kind = obj
        .get("type")
        .cloned()
        .unwrap_or_else(|| Value::String("unknown".to_string()));
    let value = obj
        .get("value")
        .cloned()
        .or_else(|| obj.get("raw").cloned())
        .unwrap_or(Value::Null);
    let unit = obj.get("unit").cloned().unwrap_or(Value::Null);

    NormalizedRecord {
        device_id,
        ts,
        reading: Reading { kind, value, unit },
        meta: RecordMeta {
            topic: topic.to_string(),
        },
    }
}

/// Extract the device id from a `meters/<id>/telemetry`-shaped topic.
///
/// Requires at least three `/`-delimited segments with `meters` first.
fn topic_device_id(topic: &str) -> Option<&str> {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() >= 3 && parts[0] == TOPIC_PREFIX {
        Some(parts[1])
    } else {
        None
    }
}

/// Truthiness in the sense the original field fallbacks used: null, false,
/// zero, empty strings and empty containers all count as absent.
fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
