//! Receive path: frame parsing, validation, reassembly and replies.
//!
//! One task consumes raw byte chunks from the reader, drives the
//! [`FrameParser`](crate::protocol::FrameParser) and handles every frame it
//! completes:
//!
//! - control frames are validated and handed to the transmit engine via the
//!   control queue;
//! - data frames are validated, their fragments accumulated, completed
//!   payloads published to the receive queue, and each one is answered with
//!   exactly one ACK or NAK.
//!
//! The task also owns the 5-second frame timer: a frame whose ETX does not
//! arrive in time is discarded without a reply, leaving the peer's own
//! timeout to recover.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::checksum::CrcKind;
use crate::control::ControlQueue;
use crate::error::SerwireError;
use crate::port;
use crate::protocol::{
    encode_control_frame, ControlFrame, ControlKind, FrameKind, FrameParser, RawFrame, STX, UMSN,
};
use crate::shutdown::Shutdown;
use crate::writer::{self, SharedWriter};

/// How long an opened frame may stay incomplete before it is discarded.
const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Reassembly buffer capacity above which the memory is released after a
/// payload is delivered.
const REASSEMBLY_SHRINK: usize = 10 * 1024;

pub(crate) struct Receiver {
    parser: FrameParser,
    reassembly: Vec<u8>,
    data_crc: CrcKind,
    control_queue: Arc<ControlQueue>,
    recv_tx: mpsc::Sender<Bytes>,
    writer: SharedWriter,
    shutdown: Shutdown,
}

impl Receiver {
    pub(crate) fn new(
        data_crc: CrcKind,
        control_queue: Arc<ControlQueue>,
        recv_tx: mpsc::Sender<Bytes>,
        writer: SharedWriter,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            parser: FrameParser::new(),
            reassembly: Vec::new(),
            data_crc,
            control_queue,
            recv_tx,
            writer,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self, mut raw_rx: mpsc::Receiver<Bytes>) {
        let shutdown = self.shutdown.clone();
        // Deadline of the frame currently being accumulated, if any.
        let mut frame_deadline: Option<Instant> = None;
        let mut seen_starts = self.parser.frames_started();

        loop {
            let frame_timer = async move {
                match frame_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                _ = shutdown.wait() => return,
                () = frame_timer => {
                    warn!("frame timeout reached, discarding partial frame");
                    self.parser.reset();
                    frame_deadline = None;
                    seen_starts = self.parser.frames_started();
                }
                chunk = raw_rx.recv() => {
                    let Some(chunk) = chunk else { return };

                    for frame in self.parser.push(&chunk) {
                        if self.handle_frame(frame).await.is_err() {
                            return;
                        }
                    }

                    // The frame timer runs once per in-progress frame,
                    // armed when its start character was recognized.
                    if self.parser.in_frame() {
                        if self.parser.frames_started() != seen_starts {
                            frame_deadline = Some(Instant::now() + FRAME_TIMEOUT);
                        }
                    } else {
                        frame_deadline = None;
                    }
                    seen_starts = self.parser.frames_started();
                }
            }
        }
    }

    /// Dispatch one completed frame. `Err` means the task must exit.
    async fn handle_frame(&mut self, frame: RawFrame) -> Result<(), ()> {
        match frame.kind {
            FrameKind::Control(kind) => {
                if let Err(e) = self.handle_control_frame(kind, &frame.body).await {
                    warn!("discarding control frame: {e}");
                }
                Ok(())
            }
            FrameKind::Data => self.handle_data_frame(&frame.body).await,
        }
    }

    /// Validate a control frame body and queue it for the transmit engine.
    /// Invalid frames are dropped without a reply; the peer's own timeout
    /// covers the absence.
    async fn handle_control_frame(
        &self,
        kind: ControlKind,
        body: &[u8],
    ) -> crate::error::Result<()> {
        // MSN plus CRC-16, nothing else.
        if body.len() != 3 {
            return Err(SerwireError::Protocol(
                "invalid control frame body length".into(),
            ));
        }

        let msn = body[0];
        if !CrcKind::Crc16.validate(&[kind.start_byte(), msn], &body[1..]) {
            return Err(SerwireError::Protocol(
                "control frame checksum mismatch".into(),
            ));
        }

        self.control_queue.push(ControlFrame { kind, msn }).await;
        Ok(())
    }

    /// Handle a data frame body: validate, reassemble, publish, reply.
    /// `Err` means the task must exit.
    async fn handle_data_frame(&mut self, body: &[u8]) -> Result<(), ()> {
        let reply = match split_data_body(self.data_crc, body) {
            Ok((msn, append, fragment)) => {
                self.reassembly.extend_from_slice(fragment);

                if append == 0 {
                    let payload = self.take_reassembled();
                    tokio::select! {
                        biased;
                        _ = self.shutdown.wait() => return Err(()),
                        sent = self.recv_tx.send(payload) => {
                            if sent.is_err() {
                                return Err(());
                            }
                        }
                    }
                }

                (ControlKind::Ack, msn)
            }
            Err(e) => {
                warn!("discarding data frame: {e}");
                (ControlKind::Nak, UMSN)
            }
        };

        let frame = encode_control_frame(reply.0, reply.1);
        if let Err(e) = writer::write_frame(&self.writer, &frame).await {
            error!("failed to write control frame: {e}");
            port::close_port(&self.shutdown, &self.writer).await;
            return Err(());
        }

        Ok(())
    }

    /// Take the completed payload out of the reassembly buffer, releasing
    /// the buffer's memory when an unusually large message grew it.
    fn take_reassembled(&mut self) -> Bytes {
        if self.reassembly.capacity() > REASSEMBLY_SHRINK {
            Bytes::from(std::mem::take(&mut self.reassembly))
        } else {
            let payload = Bytes::copy_from_slice(&self.reassembly);
            self.reassembly.clear();
            payload
        }
    }
}

/// Split a data frame body into `(MSN, AppendFlag, fragment)` after
/// verifying its length and checksum. The checksum domain is the pre-escape
/// `STX · MSN · AppendFlag · Payload`.
fn split_data_body(crc: CrcKind, body: &[u8]) -> crate::error::Result<(u8, u8, &[u8])> {
    let crc_len = crc.width();
    if body.len() < 2 + crc_len {
        return Err(SerwireError::Protocol("data frame body too short".into()));
    }

    let (content, stored) = body.split_at(body.len() - crc_len);

    let mut domain = Vec::with_capacity(1 + content.len());
    domain.push(STX);
    domain.extend_from_slice(content);
    if !crc.validate(&domain, stored) {
        return Err(SerwireError::Protocol(
            "data frame checksum mismatch".into(),
        ));
    }

    Ok((content[0], content[1], &content[2..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_data_frame;

    /// Strip the framing of an encoded data frame down to the unescaped
    /// body the parser would produce.
    fn body_of(frame: &[u8]) -> Vec<u8> {
        crate::escape::unescape_dle(&frame[2..frame.len() - 2])
    }

    #[test]
    fn test_split_data_body_roundtrip() {
        for crc in [CrcKind::Crc16, CrcKind::Crc32] {
            let frame = encode_data_frame(42, true, b"fragment", crc);
            let body = body_of(&frame);

            let (msn, append, fragment) = split_data_body(crc, &body).unwrap();
            assert_eq!(msn, 42);
            assert_eq!(append, 0x01);
            assert_eq!(fragment, b"fragment");
        }
    }

    #[test]
    fn test_split_data_body_too_short() {
        assert!(split_data_body(CrcKind::Crc16, &[0x01, 0x00, 0xff]).is_err());
        // Minimum for CRC-32 is 6 bytes.
        assert!(split_data_body(CrcKind::Crc32, &[0x01, 0x00, 0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_split_data_body_bad_checksum() {
        let frame = encode_data_frame(1, false, b"payload", CrcKind::Crc16);
        let mut body = body_of(&frame);
        let last = body.len() - 1;
        body[last] ^= 0x01;

        assert!(split_data_body(CrcKind::Crc16, &body).is_err());
    }

    #[test]
    fn test_split_data_body_wrong_crc_width() {
        // A CRC-16 frame checked with a CRC-32 provider must not validate.
        let frame = encode_data_frame(1, false, b"payload", CrcKind::Crc16);
        assert!(split_data_body(CrcKind::Crc32, &body_of(&frame)).is_err());
    }

    #[test]
    fn test_empty_fragment() {
        let frame = encode_data_frame(7, false, b"", CrcKind::Crc16);
        let body = body_of(&frame);
        let (msn, append, fragment) = split_data_body(CrcKind::Crc16, &body).unwrap();

        assert_eq!(msn, 7);
        assert_eq!(append, 0x00);
        assert!(fragment.is_empty());
    }
}
