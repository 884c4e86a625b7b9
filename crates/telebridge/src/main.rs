// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Telemetry bridge CLI.
//!
//! Bridges inbound device telemetry to the legacy HTTP ingest endpoint.
//! Every knob is an environment variable; CLI flags override the
//! environment.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: listen on localhost:1883, forward to localhost:8080/ingest
//! telebridge
//!
//! # Custom sink and dead-letter log
//! telebridge --sink-url http://ingest:8080/ingest --dlq /var/log/bridge/dlq.jsonl
//!
//! # Dead-letter 4xx responses immediately instead of retrying
//! telebridge --fail-fast
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use telebridge::{
    Bridge, BridgeConfig, DeadLetterSink, Forwarder, LegacyHttpSink, TcpLineSource,
};

#[derive(Parser, Debug)]
#[command(name = "telebridge")]
#[command(about = "Telemetry bridge - forwards device readings to a legacy HTTP ingest endpoint", long_about = None)]
struct Args {
    /// Listen host for inbound telemetry frames (overrides MQTT_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides MQTT_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Topic subscription filter, + and # wildcards supported (overrides MQTT_TOPIC)
    #[arg(long)]
    topic: Option<String>,

    /// Downstream ingest URL (overrides LEGACY_URL)
    #[arg(long)]
    sink_url: Option<String>,

    /// Per-request HTTP timeout in seconds (overrides HTTP_TIMEOUT_S)
    #[arg(long)]
    http_timeout: Option<f64>,

    /// Maximum delivery attempts per record (overrides MAX_RETRIES)
    #[arg(long)]
    max_retries: Option<u32>,

    /// Backoff base in seconds (overrides BACKOFF_BASE_S)
    #[arg(long)]
    backoff_base: Option<f64>,

    /// Backoff cap in seconds (overrides BACKOFF_MAX_S)
    #[arg(long)]
    backoff_max: Option<f64>,

    /// Dead-letter log path (overrides DLQ_PATH)
    #[arg(long)]
    dlq: Option<PathBuf>,

    /// Dead-letter 4xx responses immediately instead of retrying
    #[arg(long)]
    fail_fast: bool,
}

impl Args {
    fn into_config(self) -> BridgeConfig {
        let mut config = BridgeConfig::from_env();
        if let Some(host) = self.host {
            config.listen_host = host;
        }
        if let Some(port) = self.port {
            config.listen_port = port;
        }
        if let Some(topic) = self.topic {
            config.topic_filter = topic;
        }
        if let Some(url) = self.sink_url {
            config.sink_url = url;
        }
        if let Some(timeout) = self.http_timeout {
            config.http_timeout_s = timeout;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(base) = self.backoff_base {
            config.backoff_base_s = base;
        }
        if let Some(max) = self.backoff_max {
            config.backoff_max_s = max;
        }
        if let Some(dlq) = self.dlq {
            config.dlq_path = dlq;
        }
        if self.fail_fast {
            config.fail_fast_permanent = true;
        }
        config
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Args::parse().into_config();

    tracing::info!("Telemetry bridge starting...");
    tracing::info!("  Listen: {}:{}", config.listen_host, config.listen_port);
    tracing::info!("  Topic filter: {}", config.topic_filter);
    tracing::info!("  Sink: {}", config.sink_url);
    tracing::info!("  Retries: {} (backoff {}s..{}s)", config.max_retries, config.backoff_base_s, config.backoff_max_s);
    tracing::info!("  Dead-letter log: {}", config.dlq_path.display());

    let sink = LegacyHttpSink::new(&config.sink_url, config.http_timeout())?;
    let dlq = DeadLetterSink::new(&config.dlq_path);
    let forwarder = Forwarder::new(sink, dlq.clone(), &config);
    let bridge = Bridge::new(forwarder, dlq);

    let mut source = TcpLineSource::bind(
        &config.listen_host,
        config.listen_port,
        &config.topic_filter,
    )?;

    // A dead-letter append failure is the only error that escapes the run
    // loop; there is no fallback tier below the log, so it must be loud.
    if let Err(e) = bridge.run(&mut source) {
        tracing::error!(error = %e, "dead-letter log unwritable, data at risk of loss");
        return Err(e.into());
    }

    tracing::info!("Telemetry source closed, shutting down");
    Ok(())
}
