//! Protocol module - wire format, frame encoding, and the frame parser.
//!
//! This module implements the byte-level protocol:
//! - protocol constants and frame encoders
//! - the streaming frame parser

mod parser;
mod wire_format;

pub use parser::{FrameKind, FrameParser, RawFrame};
pub use wire_format::{
    encode_control_frame, encode_data_frame, next_msn, ControlFrame, ControlKind, ACK, DLE, ETX,
    MAX_DATA_PAYLOAD, MAX_FRAME_BODY, NAK, STX, UMSN,
};
