// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge configuration.
//!
//! Every knob has a built-in default and an environment variable; the
//! binary layers CLI flags on top. Components take a config by reference
//! at construction, so tests can run multiple independently configured
//! pipelines side by side.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Host the inbound telemetry listener binds to (`MQTT_HOST`).
    pub listen_host: String,

    /// Port the inbound telemetry listener binds to (`MQTT_PORT`).
    pub listen_port: u16,

    /// Topic subscription filter, `+`/`#` wildcards supported (`MQTT_TOPIC`).
    pub topic_filter: String,

    /// Downstream ingest endpoint URL (`LEGACY_URL`).
    pub sink_url: String,

    /// Per-request HTTP timeout in seconds (`HTTP_TIMEOUT_S`).
    pub http_timeout_s: f64,

    /// Maximum delivery attempts per record (`MAX_RETRIES`).
    pub max_retries: u32,

    /// Exponential backoff base in seconds (`BACKOFF_BASE_S`).
    pub backoff_base_s: f64,

    /// Backoff cap in seconds (`BACKOFF_MAX_S`).
    pub backoff_max_s: f64,

    /// Dead-letter log path (`DLQ_PATH`).
    pub dlq_path: PathBuf,

    /// Dead-letter 4xx responses immediately instead of consuming the full
    /// retry budget (`FAIL_FAST_PERMANENT`). Off by default: the historical
    /// behavior retries permanent failures like transient ones.
    pub fail_fast_permanent: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_host: "localhost".to_string(),
            listen_port: 1883,
            topic_filter: "meters/+/telemetry".to_string(),
            sink_url: "http://localhost:8080/ingest".to_string(),
            http_timeout_s: 5.0,
            max_retries: 5,
            backoff_base_s: 1.0,
            backoff_max_s: 10.0,
            dlq_path: PathBuf::from("dlq.jsonl"),
            fail_fast_permanent: false,
        }
    }
}

impl BridgeConfig {
    /// Build a config from the environment, falling back to defaults for
    /// unset or unparseable variables (a warning is logged for the latter).
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            listen_host: env_or("MQTT_HOST", d.listen_host),
            listen_port: env_parse("MQTT_PORT", d.listen_port),
            topic_filter: env_or("MQTT_TOPIC", d.topic_filter),
            sink_url: env_or("LEGACY_URL", d.sink_url),
            http_timeout_s: env_parse("HTTP_TIMEOUT_S", d.http_timeout_s),
            max_retries: env_parse("MAX_RETRIES", d.max_retries),
            backoff_base_s: env_parse("BACKOFF_BASE_S", d.backoff_base_s),
            backoff_max_s: env_parse("BACKOFF_MAX_S", d.backoff_max_s),
            dlq_path: PathBuf::from(env_or(
                "DLQ_PATH",
                d.dlq_path.to_string_lossy().into_owned(),
            )),
            fail_fast_permanent: env_parse("FAIL_FAST_PERMANENT", d.fail_fast_permanent),
        }
    }

    /// Set the sink URL.
    pub fn sink_url(mut self, url: impl Into<String>) -> Self {
        self.sink_url = url.into();
        self
    }

    /// Set the topic filter.
    pub fn topic_filter(mut self, filter: impl Into<String>) -> Self {
        self.topic_filter = filter.into();
        self
    }

    /// Set the maximum delivery attempts.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set backoff base and cap, in seconds.
    pub fn backoff(mut self, base_s: f64, max_s: f64) -> Self {
        self.backoff_base_s = base_s;
        self.backoff_max_s = max_s;
        self
    }

    /// Set the dead-letter log path.
    pub fn dlq_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dlq_path = path.into();
        self
    }

    /// Dead-letter permanent (4xx) failures without retrying.
    pub fn fail_fast_permanent(mut self, fail_fast: bool) -> Self {
        self.fail_fast_permanent = fail_fast;
        self
    }

    /// HTTP timeout as a `Duration`, clamped to non-negative.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.http_timeout_s.max(0.0))
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T
where
    T: Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, default = %default, "unparseable env value, using default");
                default
            }
        },
        Err(_) => default,
    }
}
