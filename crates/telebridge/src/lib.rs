// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Telemetry bridge.
//!
//! Forwards device telemetry from a pub/sub transport to a legacy HTTP
//! ingest endpoint. Heterogeneous payloads are normalized into a canonical
//! record, validated, and delivered with bounded retry and capped
//! exponential backoff; records that cannot be delivered are parked in an
//! append-only newline-delimited JSON dead-letter log rather than dropped.
//!
//! ```text
//! transport --> normalize --> validate --> forward --> HTTP sink
//!                                 |            |
//!                                 v            v
//!                            dead-letter log (NDJSON)
//! ```
//!
//! Processing is strictly sequential per source: one message runs to
//! completion (delivered or dead-lettered) before the next is pulled. No
//! deduplication, no exactly-once, no reordering; the dead-letter log is
//! the only persistent state.

pub mod config;
pub mod deadletter;
pub mod forward;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod source;
pub mod validate;

pub use config::BridgeConfig;
pub use deadletter::{DeadLetterError, DeadLetterRecord, DeadLetterSink};
pub use forward::{ForwardError, ForwardOutcome, Forwarder, HttpSink, LegacyHttpSink};
pub use normalize::normalize;
pub use pipeline::Bridge;
pub use record::{NormalizedRecord, Reading, RecordMeta};
pub use source::{InboundMessage, QueueSource, TcpLineSource, TelemetrySource};
pub use validate::{validate, ValidationError};
