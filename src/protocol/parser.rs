//! Frame parser state machine.
//!
//! A cooperative parser fed raw transport bytes. It tracks the DLE escape
//! state, recognizes frame boundaries, and produces complete unescaped
//! frame bodies:
//!
//! - `Idle`: searching for an escaped start character (STX, ACK or NAK).
//! - `Body`: accumulating body bytes until the escaped ETX.
//!
//! Everything outside a frame is discarded. Inside a body an escaped DLE is
//! a doubled payload literal and an escaped ETX ends the frame; any other
//! escaped byte is a protocol error that drops the frame in progress, as
//! does a body growing past [`MAX_FRAME_BODY`]. The 5-second frame timer
//! belongs to the task driving the parser; [`FrameParser::in_frame`] and
//! [`FrameParser::frames_started`] expose the state it needs.
//!
//! # Example
//!
//! ```
//! use serwire::checksum::CrcKind;
//! use serwire::protocol::{encode_data_frame, FrameKind, FrameParser};
//!
//! let mut parser = FrameParser::new();
//! let frames = parser.push(&encode_data_frame(1, false, b"Hi", CrcKind::Crc16));
//!
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].kind, FrameKind::Data);
//! assert_eq!(frames[0].body, &[0x01, 0x00, 0x48, 0x69, 0x52, 0x7c]);
//! ```

use tracing::warn;

use crate::escape::unescape_dle;

use super::wire_format::{ControlKind, ACK, DLE, ETX, MAX_FRAME_BODY, NAK, STX};

/// What kind of frame a body belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Payload-bearing data frame.
    Data,
    /// Acknowledge / negative-acknowledge control frame.
    Control(ControlKind),
}

/// A complete frame extracted from the byte stream.
///
/// `body` is unescaped and excludes the start character and the ETX; its
/// layout has not been validated yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Frame classification from the start character.
    pub kind: FrameKind,
    /// Unescaped body bytes.
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Body(FrameKind),
}

/// Streaming frame parser.
#[derive(Debug)]
pub struct FrameParser {
    state: State,
    escape_pending: bool,
    /// Accumulated body bytes, still in escaped form.
    buf: Vec<u8>,
    frames_started: u64,
}

impl FrameParser {
    /// Create a parser in the `Idle` state.
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            escape_pending: false,
            buf: Vec::new(),
            frames_started: 0,
        }
    }

    /// Feed a chunk of transport bytes, returning every frame completed by
    /// it. Partial frame state is kept for the next call.
    pub fn push(&mut self, data: &[u8]) -> Vec<RawFrame> {
        let mut frames = Vec::new();

        for &b in data {
            if let Some(frame) = self.push_byte(b) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Whether a frame body is currently being accumulated.
    #[inline]
    pub fn in_frame(&self) -> bool {
        matches!(self.state, State::Body(_))
    }

    /// Number of frame starts recognized so far. The driving task compares
    /// this across `push` calls to restart its frame timer.
    #[inline]
    pub fn frames_started(&self) -> u64 {
        self.frames_started
    }

    /// Discard any in-progress frame and return to `Idle`. Called on frame
    /// timer expiry.
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.escape_pending = false;
        self.buf.clear();
    }

    fn push_byte(&mut self, b: u8) -> Option<RawFrame> {
        if !self.escape_pending && b == DLE {
            self.escape_pending = true;
            return None;
        }

        if self.escape_pending {
            self.escape_pending = false;
            return self.escaped_byte(b);
        }

        match self.state {
            // Pre-frame garbage.
            State::Idle => None,
            State::Body(_) => {
                self.buf.push(b);
                self.check_body_bound();
                None
            }
        }
    }

    fn escaped_byte(&mut self, b: u8) -> Option<RawFrame> {
        match self.state {
            State::Idle => {
                match b {
                    STX => self.start_frame(FrameKind::Data),
                    ACK => self.start_frame(FrameKind::Control(ControlKind::Ack)),
                    NAK => self.start_frame(FrameKind::Control(ControlKind::Nak)),
                    _ => {
                        warn!(byte = b, "expected start character, discarding byte");
                    }
                }
                None
            }
            State::Body(kind) => {
                if b == ETX {
                    let body = unescape_dle(&self.buf);
                    self.buf.clear();
                    self.state = State::Idle;
                    return Some(RawFrame { kind, body });
                }

                if b == DLE {
                    // Doubled DLE: a literal payload byte. Kept in escaped
                    // form; unescaping happens once at frame end.
                    self.buf.push(DLE);
                    self.buf.push(DLE);
                    self.check_body_bound();
                    return None;
                }

                warn!(
                    byte = b,
                    "control character inside frame body, discarding frame"
                );
                self.reset();
                None
            }
        }
    }

    fn start_frame(&mut self, kind: FrameKind) {
        self.state = State::Body(kind);
        self.buf.clear();
        self.frames_started += 1;
    }

    fn check_body_bound(&mut self) {
        if self.buf.len() > MAX_FRAME_BODY {
            warn!(
                max = MAX_FRAME_BODY,
                "maximum frame body size reached, discarding frame"
            );
            self.reset();
        }
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}
