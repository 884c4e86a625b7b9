// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Record forwarding with bounded retry and capped exponential backoff.
//!
//! The forwarder POSTs a validated record to the downstream ingest endpoint.
//! Failures are classified transient (5xx, timeouts, refused connections)
//! or permanent (4xx); by default both consume the same retry budget, which
//! matches the historical bridge behavior. Set
//! [`BridgeConfig::fail_fast_permanent`] to dead-letter 4xx responses
//! immediately.
//!
//! Retry sleeps happen inline on the calling thread. That is deliberate: a
//! stalled sink throttles the rate at which new messages are accepted.

use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::config::BridgeConfig;
use crate::deadletter::{DeadLetterError, DeadLetterSink};
use crate::record::NormalizedRecord;

/// A single failed delivery attempt, classified for retry purposes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForwardError {
    /// 5xx responses, timeouts, refused or dropped connections. Expected to
    /// resolve with retry.
    #[error("transient: {0}")]
    Transient(String),

    /// 4xx responses. Retrying will not help.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl ForwardError {
    /// Whether retrying cannot help.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ForwardError::Permanent(_))
    }
}

/// Terminal result of forwarding one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The sink accepted the record.
    Delivered {
        /// Attempts used, including the successful one.
        attempts: u32,
    },
    /// The retry budget was exhausted (or a permanent failure was
    /// short-circuited) and the record was parked in the dead-letter log.
    DeadLettered {
        /// Attempts used.
        attempts: u32,
        /// Last observed delivery error.
        cause: String,
    },
}

/// Downstream delivery seam. The production implementation is
/// [`LegacyHttpSink`]; tests substitute scripted fakes.
pub trait HttpSink {
    /// Attempt one delivery of the record.
    fn post(&self, record: &NormalizedRecord) -> Result<(), ForwardError>;
}

/// Blocking HTTP client for the legacy ingest endpoint.
pub struct LegacyHttpSink {
    client: reqwest::blocking::Client,
    url: String,
}

impl LegacyHttpSink {
    /// Build a sink for the given URL with a bounded per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl HttpSink for LegacyHttpSink {
    fn post(&self, record: &NormalizedRecord) -> Result<(), ForwardError> {
        let response = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            // Network-level failures (refused, DNS, timeout) are retryable.
            .map_err(|e| ForwardError::Transient(e.to_string()))?;
        classify_status(response.status())
    }
}

/// Classify an HTTP response status: 2xx/3xx succeed, 4xx are permanent,
/// everything else is transient.
fn classify_status(status: reqwest::StatusCode) -> Result<(), ForwardError> {
    if status.is_success() || status.is_redirection() {
        Ok(())
    } else if status.is_client_error() {
        Err(ForwardError::Permanent(format!("http status {status}")))
    } else {
        Err(ForwardError::Transient(format!("http status {status}")))
    }
}

/// Backoff delay before the attempt after `attempt` (1-indexed):
/// `min(base * 2^(attempt-1), max)`, never negative.
pub fn backoff_delay(attempt: u32, base_s: f64, max_s: f64) -> Duration {
    let exp = base_s * 2f64.powi(attempt.saturating_sub(1) as i32);
    Duration::from_secs_f64(exp.min(max_s).max(0.0))
}

/// Delivers validated records to an [`HttpSink`], parking them in the
/// dead-letter log when the retry budget runs out.
pub struct Forwarder<S: HttpSink> {
    sink: S,
    dlq: DeadLetterSink,
    max_retries: u32,
    backoff_base_s: f64,
    backoff_max_s: f64,
    fail_fast_permanent: bool,
}

impl<S: HttpSink> Forwarder<S> {
    /// Build a forwarder over the given sink and dead-letter log.
    pub fn new(sink: S, dlq: DeadLetterSink, config: &BridgeConfig) -> Self {
        Self {
            sink,
            dlq,
            max_retries: config.max_retries,
            backoff_base_s: config.backoff_base_s,
            backoff_max_s: config.backoff_max_s,
            fail_fast_permanent: config.fail_fast_permanent,
        }
    }

    /// Access the underlying sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Forward one record to completion: either the sink accepts it or it
    /// lands in the dead-letter log. Blocks through all retries.
    ///
    /// Only a dead-letter write failure escapes as an error; that case is
    /// fatal for the pipeline since there is no further fallback tier.
    pub fn forward(&self, record: &NormalizedRecord) -> Result<ForwardOutcome, DeadLetterError> {
        let device_id = record.device_id_lossy();
        let mut last_err: Option<ForwardError> = None;

        for attempt in 1..=self.max_retries {
            match self.sink.post(record) {
                Ok(()) => return Ok(ForwardOutcome::Delivered { attempts: attempt }),
                Err(err) => {
                    if self.fail_fast_permanent && err.is_permanent() {
                        return self.dead_letter(record, attempt, err.to_string());
                    }

                    let delay = backoff_delay(attempt, self.backoff_base_s, self.backoff_max_s);
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_s = delay.as_secs_f64(),
                        err = %err,
                        device_id = %device_id,
                        "legacy_forward_retry"
                    );
                    thread::sleep(delay);
                    last_err = Some(err);
                }
            }
        }

        let cause = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no delivery attempts configured".to_string());
        self.dead_letter(record, self.max_retries, cause)
    }

    fn dead_letter(
        &self,
        record: &NormalizedRecord,
        attempts: u32,
        cause: String,
    ) -> Result<ForwardOutcome, DeadLetterError> {
        let data = serde_json::to_value(record)?;
        self.dlq.write(&data, &cause)?;
        tracing::warn!(
            dlq_path = %self.dlq.path().display(),
            device_id = %record.device_id_lossy(),
            err = %cause,
            "sent_to_dlq"
        );
        Ok(ForwardOutcome::DeadLettered { attempts, cause })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use tempfile::tempdir;

    /// Sink that plays back a scripted sequence of results and counts calls.
    /// Once the script runs out it keeps returning the last scripted result.
    struct ScriptedSink {
        script: RefCell<VecDeque<Result<(), ForwardError>>>,
        last: Result<(), ForwardError>,
        calls: RefCell<u32>,
    }

    impl ScriptedSink {
        fn new(script: Vec<Result<(), ForwardError>>) -> Self {
            let last = script
                .last()
                .cloned()
                .unwrap_or(Err(ForwardError::Transient("empty script".into())));
            Self {
                script: RefCell::new(script.into()),
                last,
                calls: RefCell::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.borrow()
        }
    }

    impl HttpSink for ScriptedSink {
        fn post(&self, _record: &NormalizedRecord) -> Result<(), ForwardError> {
            *self.calls.borrow_mut() += 1;
            self.script.borrow_mut().pop_front().unwrap_or(self.last.clone())
        }
    }

    fn server_error() -> Result<(), ForwardError> {
        Err(ForwardError::Transient("http status 500 Internal Server Error".into()))
    }

    fn bad_request() -> Result<(), ForwardError> {
        Err(ForwardError::Permanent("http status 400 Bad Request".into()))
    }

    fn test_record() -> NormalizedRecord {
        normalize(
            "meters/dev-1/telemetry",
            br#"{"ts":100,"type":"water","value":3.5}"#,
        )
    }

    /// Forwarder with zero backoff so retry tests run instantly.
    fn test_forwarder(sink: ScriptedSink, dlq: DeadLetterSink) -> Forwarder<ScriptedSink> {
        let config = crate::BridgeConfig::default().backoff(0.0, 0.0);
        Forwarder::new(sink, dlq, &config)
    }

    fn dlq_len(path: &std::path::Path) -> usize {
        match std::fs::read_to_string(path) {
            Ok(s) => s.lines().count(),
            Err(_) => 0,
        }
    }

    #[test]
    fn test_backoff_delay_schedule() {
        // Defaults (base 1.0, max 10.0): attempts 1..5 give 1, 2, 4, 8, 10.
        let expected = [1.0, 2.0, 4.0, 8.0, 10.0];
        for (i, want) in expected.iter().enumerate() {
            let delay = backoff_delay(i as u32 + 1, 1.0, 10.0);
            assert_eq!(delay, Duration::from_secs_f64(*want), "attempt {}", i + 1);
        }
    }

    #[test]
    fn test_backoff_delay_caps_at_max() {
        assert_eq!(backoff_delay(30, 1.0, 10.0), Duration::from_secs_f64(10.0));
        assert_eq!(backoff_delay(1, 0.5, 10.0), Duration::from_secs_f64(0.5));
        assert_eq!(backoff_delay(4, 0.0, 10.0), Duration::ZERO);
    }

    #[test]
    fn test_classify_status() {
        use reqwest::StatusCode;

        assert!(classify_status(StatusCode::OK).is_ok());
        assert!(classify_status(StatusCode::NO_CONTENT).is_ok());
        assert!(classify_status(StatusCode::MOVED_PERMANENTLY).is_ok());

        match classify_status(StatusCode::NOT_FOUND) {
            Err(e) => assert!(e.is_permanent()),
            Ok(()) => panic!("4xx must fail"),
        }
        match classify_status(StatusCode::INTERNAL_SERVER_ERROR) {
            Err(e) => assert!(!e.is_permanent()),
            Ok(()) => panic!("5xx must fail"),
        }
    }

    #[test]
    fn test_always_failing_sink_exhausts_budget_and_dead_letters_once() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("dlq.jsonl");
        let forwarder = test_forwarder(
            ScriptedSink::new(vec![server_error()]),
            DeadLetterSink::new(&path),
        );

        let outcome = forwarder.forward(&test_record()).expect("forward");

        assert_eq!(forwarder.sink.calls(), 5);
        assert_eq!(dlq_len(&path), 1);
        match outcome {
            ForwardOutcome::DeadLettered { attempts, cause } => {
                assert_eq!(attempts, 5);
                assert!(cause.contains("500"), "cause: {cause}");
            }
            other => panic!("expected DeadLettered, got {:?}", other),
        }
    }

    #[test]
    fn test_recovery_on_third_attempt_skips_dead_letter() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("dlq.jsonl");
        let forwarder = test_forwarder(
            ScriptedSink::new(vec![server_error(), server_error(), Ok(())]),
            DeadLetterSink::new(&path),
        );

        let outcome = forwarder.forward(&test_record()).expect("forward");

        assert_eq!(outcome, ForwardOutcome::Delivered { attempts: 3 });
        assert_eq!(forwarder.sink.calls(), 3);
        assert_eq!(dlq_len(&path), 0);
    }

    #[test]
    fn test_permanent_errors_consume_full_budget_by_default() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("dlq.jsonl");
        let forwarder = test_forwarder(
            ScriptedSink::new(vec![bad_request()]),
            DeadLetterSink::new(&path),
        );

        let outcome = forwarder.forward(&test_record()).expect("forward");

        // Deliberate simplification carried over from the original bridge:
        // 4xx retries like 5xx unless fail_fast_permanent is set.
        assert_eq!(forwarder.sink.calls(), 5);
        assert_eq!(dlq_len(&path), 1);
        assert!(matches!(outcome, ForwardOutcome::DeadLettered { attempts: 5, .. }));
    }

    #[test]
    fn test_fail_fast_permanent_short_circuits() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("dlq.jsonl");
        let config = crate::BridgeConfig::default()
            .backoff(0.0, 0.0)
            .fail_fast_permanent(true);
        let forwarder = Forwarder::new(
            ScriptedSink::new(vec![bad_request()]),
            DeadLetterSink::new(&path),
            &config,
        );

        let outcome = forwarder.forward(&test_record()).expect("forward");

        assert_eq!(forwarder.sink.calls(), 1);
        assert_eq!(dlq_len(&path), 1);
        assert!(matches!(outcome, ForwardOutcome::DeadLettered { attempts: 1, .. }));
    }

    #[test]
    fn test_fail_fast_still_retries_transient() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("dlq.jsonl");
        let config = crate::BridgeConfig::default()
            .backoff(0.0, 0.0)
            .fail_fast_permanent(true);
        let forwarder = Forwarder::new(
            ScriptedSink::new(vec![server_error(), Ok(())]),
            DeadLetterSink::new(&path),
            &config,
        );

        let outcome = forwarder.forward(&test_record()).expect("forward");
        assert_eq!(outcome, ForwardOutcome::Delivered { attempts: 2 });
        assert_eq!(dlq_len(&path), 0);
    }

    #[test]
    fn test_dead_letter_write_failure_is_fatal() {
        let forwarder = test_forwarder(
            ScriptedSink::new(vec![server_error()]),
            DeadLetterSink::new("/nonexistent-dir/dlq.jsonl"),
        );

        let err = forwarder.forward(&test_record()).expect_err("must fail");
        assert!(matches!(err, DeadLetterError::Append { .. }));
    }

    #[test]
    fn test_dead_letter_entry_carries_record_and_cause() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("dlq.jsonl");
        let forwarder = test_forwarder(
            ScriptedSink::new(vec![server_error()]),
            DeadLetterSink::new(&path),
        );

        forwarder.forward(&test_record()).expect("forward");

        let line = std::fs::read_to_string(&path).expect("read dlq");
        let entry: crate::DeadLetterRecord =
            serde_json::from_str(line.lines().next().expect("one line")).expect("parse");
        assert!(entry.error.contains("transient"));
        assert_eq!(entry.data["device_id"], serde_json::json!("dev-1"));
        assert_eq!(entry.data["reading"]["value"], serde_json::json!(3.5));
    }
}
