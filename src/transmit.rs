//! Transmit engine: fragmentation and the ARQ retransmission loop.
//!
//! One task consumes user payloads from the send queue and moves them onto
//! the wire:
//!
//! ```text
//! payload ─► fragments (≤ 1024 bytes) ─► frame ─► write ─► await control
//!                                          ▲                    │
//!                                          └── NAK / mismatch / ┘
//!                                                  timeout
//! ```
//!
//! The send counter advances once per fragment; a retransmission reuses the
//! fragment's already-encoded frame, byte for byte. Only one data frame is
//! ever outstanding, so a control frame always refers to the most recently
//! transmitted one. Retransmission is unbounded; the port closing is the
//! only way out.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::checksum::CrcKind;
use crate::control::ControlQueue;
use crate::port;
use crate::protocol::{encode_data_frame, next_msn, ControlKind, MAX_DATA_PAYLOAD, UMSN};
use crate::shutdown::Shutdown;
use crate::writer::{self, SharedWriter};

/// How long to wait for a control frame before retransmitting.
const ACK_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) struct Transmitter {
    data_crc: CrcKind,
    /// Send counter; the last MSN handed out, `UMSN` before the first.
    msn: u8,
    control_queue: Arc<ControlQueue>,
    writer: SharedWriter,
    shutdown: Shutdown,
}

impl Transmitter {
    pub(crate) fn new(
        data_crc: CrcKind,
        control_queue: Arc<ControlQueue>,
        writer: SharedWriter,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            data_crc,
            msn: UMSN,
            control_queue,
            writer,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self, mut send_rx: mpsc::Receiver<Bytes>) {
        loop {
            let payload = tokio::select! {
                biased;
                _ = self.shutdown.wait() => return,
                payload = send_rx.recv() => match payload {
                    Some(payload) => payload,
                    None => return,
                },
            };

            if self.send_payload(&payload).await.is_err() {
                return;
            }
        }
    }

    /// Fragment one payload and deliver every fragment reliably, in order.
    /// `Err` means the task must exit.
    async fn send_payload(&mut self, payload: &[u8]) -> Result<(), ()> {
        for (fragment, append) in fragments(payload) {
            self.msn = next_msn(self.msn);
            let frame = encode_data_frame(self.msn, append, fragment, self.data_crc);
            self.send_fragment(&frame).await?;
        }
        Ok(())
    }

    /// Write one encoded fragment and retransmit it unchanged until the
    /// matching ACK arrives.
    async fn send_fragment(&mut self, frame: &[u8]) -> Result<(), ()> {
        loop {
            if let Err(e) = writer::write_frame(&self.writer, frame).await {
                error!("failed to write data frame: {e}");
                port::close_port(&self.shutdown, &self.writer).await;
                return Err(());
            }

            let reply = tokio::select! {
                biased;
                _ = self.shutdown.wait() => return Err(()),
                reply = tokio::time::timeout(ACK_TIMEOUT, self.control_queue.recv()) => reply,
            };

            match reply {
                Ok(control) if control.kind == ControlKind::Ack && control.msn == self.msn => {
                    return Ok(());
                }
                Ok(control) => {
                    warn!(
                        kind = ?control.kind,
                        msn = control.msn,
                        expected = self.msn,
                        "transmission not acknowledged, resending"
                    );
                }
                Err(_) => {
                    warn!(msn = self.msn, "no control frame in time, resending");
                }
            }
        }
    }
}

/// Fragment a payload into `(chunk, append)` pairs of at most
/// [`MAX_DATA_PAYLOAD`] bytes. `append` is set on every fragment except the
/// terminal one. A zero-length payload yields exactly one empty terminal
/// fragment.
fn fragments(payload: &[u8]) -> Vec<(&[u8], bool)> {
    if payload.is_empty() {
        return vec![(payload, false)];
    }

    let count = payload.len().div_ceil(MAX_DATA_PAYLOAD);
    payload
        .chunks(MAX_DATA_PAYLOAD)
        .enumerate()
        .map(|(i, chunk)| (chunk, i + 1 < count))
        .collect()
}
