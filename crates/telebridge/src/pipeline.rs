// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-message pipeline orchestration.
//!
//! Wires normalization, validation, forwarding and dead-letter parking into
//! a single entry point:
//!
//! ```text
//! (topic, bytes) --> normalize --> validate --> forward --> HTTP sink
//!                                      |            |
//!                                      v            v
//!                                 dead-letter log (NDJSON)
//! ```
//!
//! One message is processed to completion (delivered or dead-lettered)
//! before the next one is pulled from the source. Retry sleeps therefore
//! block intake, which is the intended backpressure: a stalled sink slows
//! the bridge down instead of piling up records in memory.

use crate::deadletter::{DeadLetterError, DeadLetterSink};
use crate::forward::{ForwardOutcome, Forwarder, HttpSink};
use crate::normalize::normalize;
use crate::source::TelemetrySource;
use crate::validate::validate;

/// The message-forwarding pipeline.
pub struct Bridge<S: HttpSink> {
    forwarder: Forwarder<S>,
    dlq: DeadLetterSink,
}

impl<S: HttpSink> Bridge<S> {
    /// Assemble the pipeline. The forwarder and the bridge share the same
    /// dead-letter log path.
    pub fn new(forwarder: Forwarder<S>, dlq: DeadLetterSink) -> Self {
        Self { forwarder, dlq }
    }

    /// Process one inbound message to completion.
    ///
    /// Every message ends in exactly one of: a successful forward, a
    /// dead-letter entry, or (only if the dead-letter log itself cannot be
    /// appended) the returned error. Nothing is silently discarded.
    pub fn process(&self, topic: &str, payload: &[u8]) -> Result<(), DeadLetterError> {
        let record = normalize(topic, payload);

        if let Err(err) = validate(&record) {
            let data = serde_json::to_value(&record)?;
            self.dlq.write(&data, &err.to_string())?;
            tracing::warn!(topic, err = %err, "invalid_payload_dlq");
            tracing::error!(topic, err = %err, "forward_failed");
            return Ok(());
        }

        match self.forwarder.forward(&record)? {
            ForwardOutcome::Delivered { .. } => {
                tracing::info!(
                    device_id = %record.device_id_lossy(),
                    topic,
                    value = %record.reading.value,
                    "forward_ok"
                );
            }
            ForwardOutcome::DeadLettered { cause, .. } => {
                tracing::error!(topic, err = %cause, "forward_failed");
            }
        }

        Ok(())
    }

    /// Drive the pipeline from a source until it closes.
    ///
    /// Strictly sequential; the single-worker model means no internal
    /// locking is needed anywhere in the pipeline.
    pub fn run(&self, source: &mut dyn TelemetrySource) -> Result<(), DeadLetterError> {
        while let Some(msg) = source.recv() {
            self.process(&msg.topic, &msg.payload)?;
        }
        Ok(())
    }
}
