//! Port facade and lifecycle.
//!
//! A [`Port`] wraps one byte-stream transport and exposes reliable,
//! ordered payload exchange. `open` spawns the three cooperating tasks:
//!
//! ```text
//!            ┌─► reader ──► raw chunks ──► receiver ──► receive queue ──► read()
//! transport ─┤                               │ ACK/NAK      │ control
//!            │                               ▼              ▼ frames
//!            └─◄────── shared writer ◄── transmit engine ◄── send queue ◄── write()
//! ```
//!
//! Closing the port is the single cancellation signal: all tasks exit, the
//! transport is shut down, and pending operations fail with
//! [`SerwireError::Closed`].

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::config::PortConfig;
use crate::control::ControlQueue;
use crate::error::{Result, SerwireError};
use crate::reader;
use crate::receiver::Receiver;
use crate::shutdown::Shutdown;
use crate::transmit::Transmitter;
use crate::writer::{self, SharedWriter};

/// Raw chunk queue between the reader and the receiver.
const RAW_QUEUE_BOUND: usize = 16;
/// Received control frames awaiting the transmit engine.
const CONTROL_QUEUE_BOUND: usize = 3;
/// Verified payloads awaiting `read`.
const RECEIVE_QUEUE_BOUND: usize = 5;
/// Submitted payloads awaiting the transmit engine.
const SEND_QUEUE_BOUND: usize = 5;

/// An open port speaking the framing + ARQ protocol over one transport.
///
/// # Example
///
/// ```no_run
/// use serwire::{Port, PortConfig};
///
/// #[tokio::main]
/// async fn main() -> serwire::Result<()> {
///     let (left, right) = tokio::io::duplex(64 * 1024);
///     let a = Port::open(left, PortConfig::default());
///     let b = Port::open(right, PortConfig::default());
///
///     a.write(&b"hello"[..]).await?;
///     let payload = b.read().await?;
///     assert_eq!(&payload[..], b"hello");
///
///     a.close().await?;
///     b.close().await?;
///     Ok(())
/// }
/// ```
pub struct Port {
    shutdown: Shutdown,
    writer: SharedWriter,
    send_tx: mpsc::Sender<Bytes>,
    recv_rx: Mutex<mpsc::Receiver<Bytes>>,
}

impl Port {
    /// Open a port over `transport` and start its tasks.
    ///
    /// Must be called within a tokio runtime. The call returns immediately;
    /// the reader, receiver and transmit tasks run until the port closes.
    pub fn open<T>(transport: T, config: PortConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(transport);
        let writer = writer::shared_writer(write_half);
        let shutdown = Shutdown::new();

        let (raw_tx, raw_rx) = mpsc::channel(RAW_QUEUE_BOUND);
        let (recv_tx, recv_rx) = mpsc::channel(RECEIVE_QUEUE_BOUND);
        let (send_tx, send_rx) = mpsc::channel(SEND_QUEUE_BOUND);
        let control_queue = std::sync::Arc::new(ControlQueue::new(CONTROL_QUEUE_BOUND));

        tokio::spawn(reader::run(
            Box::new(read_half),
            raw_tx,
            shutdown.clone(),
            writer.clone(),
        ));

        let receiver = Receiver::new(
            config.data_crc,
            control_queue.clone(),
            recv_tx,
            writer.clone(),
            shutdown.clone(),
        );
        tokio::spawn(receiver.run(raw_rx));

        let transmitter = Transmitter::new(
            config.data_crc,
            control_queue,
            writer.clone(),
            shutdown.clone(),
        );
        tokio::spawn(transmitter.run(send_rx));

        Self {
            shutdown,
            writer,
            send_tx,
            recv_rx: Mutex::new(recv_rx),
        }
    }

    /// Receive the next verified payload.
    ///
    /// Suspends until a payload arrives or the port closes.
    pub async fn read(&self) -> Result<Bytes> {
        if self.shutdown.is_shut_down() {
            return Err(SerwireError::Closed);
        }

        let mut recv_rx = self.recv_rx.lock().await;
        tokio::select! {
            biased;
            _ = self.shutdown.wait() => Err(SerwireError::Closed),
            payload = recv_rx.recv() => payload.ok_or(SerwireError::Closed),
        }
    }

    /// Receive the next verified payload, waiting at most `timeout`.
    ///
    /// Returns [`SerwireError::Timeout`] when the deadline passes first.
    pub async fn read_timeout(&self, timeout: Duration) -> Result<Bytes> {
        match tokio::time::timeout(timeout, self.read()).await {
            Ok(result) => result,
            Err(_) => Err(SerwireError::Timeout),
        }
    }

    /// Submit a payload for reliable transmission.
    ///
    /// Fire-and-forget: the call returns once the payload is queued, which
    /// may mean waiting for a slot when the send queue is full. Delivery,
    /// fragmentation and retransmission happen in the background.
    pub async fn write(&self, payload: impl Into<Bytes>) -> Result<()> {
        if self.shutdown.is_shut_down() {
            return Err(SerwireError::Closed);
        }

        self.send_tx
            .send(payload.into())
            .await
            .map_err(|_| SerwireError::Closed)
    }

    /// Whether the port has been closed.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_shut_down()
    }

    /// Close the port: stop all tasks, shut the transport down, and fail
    /// pending operations with [`SerwireError::Closed`]. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if !self.shutdown.shut_down() {
            return Ok(());
        }

        writer::close_transport(&self.writer).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Transition the port to closed from inside a task after a fatal
/// transport condition.
pub(crate) async fn close_port(shutdown: &Shutdown, writer: &SharedWriter) {
    if shutdown.shut_down() {
        if let Err(e) = writer::close_transport(writer).await {
            warn!("failed to close transport: {e}");
        }
    }
}
