// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound telemetry sources.
//!
//! The pipeline pulls `(topic, payload)` pairs through the
//! [`TelemetrySource`] trait and does not care where they come from. The
//! binary ships a TCP line source (`topic<SP>payload` frames, one per
//! line); embedders and tests use the channel-backed [`QueueSource`]. An
//! MQTT or DDS subscriber slots in behind the same trait.

use std::io::{BufRead, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;

/// One raw message pulled off the transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Slash-delimited topic the message was published on.
    pub topic: String,
    /// Raw payload bytes. May be invalid UTF-8 or invalid JSON.
    pub payload: Vec<u8>,
}

/// Blocking pull interface for inbound telemetry.
pub trait TelemetrySource {
    /// Wait for the next message. `None` means the source is closed and no
    /// further messages will arrive.
    fn recv(&mut self) -> Option<InboundMessage>;
}

/// Match a topic against an MQTT-style filter.
///
/// `+` matches exactly one segment, a trailing `#` matches the rest of the
/// topic (including nothing). Everything else is compared literally.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut fp = filter.split('/');
    let mut tp = topic.split('/');
    loop {
        match (fp.next(), tp.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Channel-backed source for tests and embedding.
pub struct QueueSource {
    rx: mpsc::Receiver<InboundMessage>,
}

impl QueueSource {
    /// Create a sender/source pair. The source closes once every sender is
    /// dropped.
    pub fn channel() -> (mpsc::Sender<InboundMessage>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx })
    }
}

impl TelemetrySource for QueueSource {
    fn recv(&mut self) -> Option<InboundMessage> {
        self.rx.recv().ok()
    }
}

/// TCP line source: accepts one publisher connection at a time and reads
/// newline-delimited `topic<SP>payload` frames, dropping frames whose topic
/// falls outside the subscription filter.
///
/// One connection at a time is deliberate: it preserves the single-worker
/// processing model end to end.
pub struct TcpLineSource {
    listener: TcpListener,
    filter: String,
    conn: Option<BufReader<TcpStream>>,
}

impl TcpLineSource {
    /// Bind the listener and subscribe to the given topic filter.
    pub fn bind(host: &str, port: u16, filter: impl Into<String>) -> std::io::Result<Self> {
        let listener = TcpListener::bind((host, port))?;
        let filter = filter.into();
        tracing::info!(addr = %listener.local_addr()?, filter = %filter, "telemetry source listening");
        Ok(Self {
            listener,
            filter,
            conn: None,
        })
    }

    /// Actual bound address (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl TelemetrySource for TcpLineSource {
    fn recv(&mut self) -> Option<InboundMessage> {
        loop {
            if self.conn.is_none() {
                match self.listener.accept() {
                    Ok((stream, peer)) => {
                        tracing::info!(%peer, "publisher connected");
                        self.conn = Some(BufReader::new(stream));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed, closing source");
                        return None;
                    }
                }
            }

            let reader = self.conn.as_mut()?;
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => {
                    tracing::info!("publisher disconnected");
                    self.conn = None;
                }
                Ok(_) => {
                    if line.last() == Some(&b'\n') {
                        line.pop();
                    }
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    if line.is_empty() {
                        continue;
                    }

                    let Some(split) = line.iter().position(|&b| b == b' ') else {
                        tracing::warn!("malformed frame, no topic separator, dropped");
                        continue;
                    };
                    let topic = String::from_utf8_lossy(&line[..split]).into_owned();
                    let payload = line[split + 1..].to_vec();

                    if !topic_matches(&self.filter, &topic) {
                        tracing::debug!(topic = %topic, "topic outside subscription, dropped");
                        continue;
                    }
                    return Some(InboundMessage { topic, payload });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "read failed, dropping connection");
                    self.conn = None;
                }
            }
        }
    }
}
