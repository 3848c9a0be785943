// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The byte-line transport seam.
//!
//! The gateway core never opens a socket or a serial port itself; it is
//! handed a [`ByteLineSource`]/[`ByteLineSink`] pair and speaks one
//! ASCII line per frame over them. `async_trait` makes the pair
//! object-safe so [`crate::fsm::context::Context`] can hold one behind
//! an `Arc<dyn ByteLineSink>`, the same way the source's `ClientConnection`
//! holds its reader/writer halves behind a `Mutex`.

use anyhow::Result;
use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::{Mutex, mpsc},
};

/// Reads successive raw lines off the wire. Returns `Ok(None)` on a
/// clean EOF/disconnect.
#[async_trait]
pub trait ByteLineSource: Send + Sync {
    async fn read_line(&self) -> Result<Option<String>>;
}

/// Writes one raw line to the wire, terminator included by the
/// implementation.
#[async_trait]
pub trait ByteLineSink: Send + Sync {
    async fn write_line(&self, line: &str) -> Result<()>;
}

/// An in-memory, channel-backed transport for tests: everything written
/// to one end shows up as a read on the matching end.
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<String>,
    inbound: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl ChannelTransport {
    /// Build a connected pair; `a`'s writes are `b`'s reads and vice
    /// versa.
    pub fn pair() -> (ChannelTransport, ChannelTransport) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        (
            ChannelTransport {
                outbound: tx_a,
                inbound: Mutex::new(rx_b),
            },
            ChannelTransport {
                outbound: tx_b,
                inbound: Mutex::new(rx_a),
            },
        )
    }
}

#[async_trait]
impl ByteLineSink for ChannelTransport {
    async fn write_line(&self, line: &str) -> Result<()> {
        self.outbound
            .send(line.to_string())
            .map_err(|_| anyhow::anyhow!("channel transport peer dropped"))
    }
}

#[async_trait]
impl ByteLineSource for ChannelTransport {
    async fn read_line(&self) -> Result<Option<String>> {
        Ok(self.inbound.lock().await.recv().await)
    }
}

/// Newline-delimited stdin/stdout transport, for running the gateway
/// against a serial-to-TCP bridge piped in over a process's standard
/// streams.
pub struct StdioTransport {
    reader: Mutex<BufReader<tokio::io::Stdin>>,
    writer: Mutex<tokio::io::Stdout>,
}

impl Default for StdioTransport {
    fn default() -> Self {
        StdioTransport {
            reader: Mutex::new(BufReader::new(tokio::io::stdin())),
            writer: Mutex::new(tokio::io::stdout()),
        }
    }
}

#[async_trait]
impl ByteLineSource for StdioTransport {
    async fn read_line(&self) -> Result<Option<String>> {
        let mut line = String::new();
        let mut reader = self.reader.lock().await;
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

#[async_trait]
impl ByteLineSink for StdioTransport {
    async fn write_line(&self, line: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_transport_delivers_written_lines() {
        let (a, b) = ChannelTransport::pair();
        a.write_line("hello").await.expect("write ok");
        let got = b.read_line().await.expect("read ok");
        assert_eq!(got.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn channel_transport_read_ends_when_peer_dropped() {
        let (a, b) = ChannelTransport::pair();
        drop(a);
        let got = b.read_line().await.expect("read ok");
        assert_eq!(got, None);
    }
}
