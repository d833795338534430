//! Wire format constants and frame encoding.
//!
//! Every frame travels between a `DLE STX`/`DLE ACK`/`DLE NAK` prefix and a
//! `DLE ETX` suffix, with the body DLE-escaped in between:
//!
//! ```text
//! data frame:    DLE STX  escape( MSN · AppendFlag · Payload · CRC )  DLE ETX
//! control frame: DLE ACK  escape( MSN · CRC16 )                       DLE ETX
//!                DLE NAK
//! ```
//!
//! The CRC domain is the *pre-escape* body including the start character:
//! `STX · MSN · AppendFlag · Payload` for data frames, `{ACK|NAK} · MSN`
//! for control frames. Checksums are stored little-endian.

use crate::checksum::CrcKind;
use crate::escape::escape_dle;

/// Data-link escape prefix.
pub const DLE: u8 = 0x10;
/// Start of a data frame (when escaped).
pub const STX: u8 = 0x02;
/// End of any frame (when escaped).
pub const ETX: u8 = 0x03;
/// Start of a positive-acknowledge control frame (when escaped).
pub const ACK: u8 = 0x06;
/// Start of a negative-acknowledge control frame (when escaped).
pub const NAK: u8 = 0x15;

/// Unknown/placeholder message sequence number.
pub const UMSN: u8 = 0x00;

/// Maximum payload carried by a single data frame.
pub const MAX_DATA_PAYLOAD: usize = 1024;

/// Maximum accumulated (still escaped) frame body. Covers a full payload
/// plus MSN, flag, CRC and worst-case DLE doubling.
pub const MAX_FRAME_BODY: usize = 2048;

/// Control frame variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// Positive acknowledgement.
    Ack,
    /// Negative acknowledgement.
    Nak,
}

impl ControlKind {
    /// The start character this variant uses on the wire.
    #[inline]
    pub const fn start_byte(self) -> u8 {
        match self {
            ControlKind::Ack => ACK,
            ControlKind::Nak => NAK,
        }
    }
}

/// A received, validated control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFrame {
    /// Acknowledge or negative-acknowledge.
    pub kind: ControlKind,
    /// The peer's message sequence number being acknowledged.
    pub msn: u8,
}

/// Advance a message sequence number: `1..=255` cycling, 0 reserved.
#[inline]
pub const fn next_msn(msn: u8) -> u8 {
    if msn == u8::MAX {
        1
    } else {
        msn + 1
    }
}

/// Encode a complete data frame ready for the wire.
///
/// `append` marks that another fragment of the same payload follows.
///
/// # Example
///
/// ```
/// use serwire::checksum::CrcKind;
/// use serwire::protocol::encode_data_frame;
///
/// let frame = encode_data_frame(1, false, b"Hi", CrcKind::Crc16);
/// assert_eq!(
///     frame,
///     vec![0x10, 0x02, 0x01, 0x00, 0x48, 0x69, 0x52, 0x7c, 0x10, 0x03]
/// );
/// ```
pub fn encode_data_frame(msn: u8, append: bool, payload: &[u8], crc: CrcKind) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_DATA_PAYLOAD);

    // CRC domain: STX · MSN · AppendFlag · Payload, before escaping.
    let mut body = Vec::with_capacity(3 + payload.len());
    body.push(STX);
    body.push(msn);
    body.push(u8::from(append));
    body.extend_from_slice(payload);
    let checksum = crc.checksum(&body);

    let mut frame = Vec::with_capacity(body.len() + checksum.len() + 6);
    frame.push(DLE);
    frame.push(STX);
    // The start character lives in the prefix; only the rest is escaped.
    frame.extend_from_slice(&escape_dle(&body[1..]));
    frame.extend_from_slice(&escape_dle(&checksum));
    frame.push(DLE);
    frame.push(ETX);
    frame
}

/// Encode a complete control frame ready for the wire.
pub fn encode_control_frame(kind: ControlKind, msn: u8) -> Vec<u8> {
    let checksum = CrcKind::Crc16.checksum(&[kind.start_byte(), msn]);

    let mut frame = Vec::with_capacity(11);
    frame.push(DLE);
    frame.push(kind.start_byte());
    frame.extend_from_slice(&escape_dle(&[msn]));
    frame.extend_from_slice(&escape_dle(&checksum));
    frame.push(DLE);
    frame.push(ETX);
    frame
}
