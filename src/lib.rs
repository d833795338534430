//! # serwire
//!
//! Reliable framing and ARQ link layer for byte-stream transports.
//!
//! serwire moves arbitrary byte payloads across anything that looks like a
//! serial line: the transport only has to implement [`tokio::io::AsyncRead`]
//! and [`tokio::io::AsyncWrite`]. Payloads are fragmented, DLE-escaped,
//! framed and checksummed on the way out; incoming frames are parsed,
//! validated, acknowledged (or negative-acknowledged) and reassembled, with
//! unacknowledged frames retransmitted until they get through. Users on
//! both ends exchange ordered, verified byte chunks and never see the
//! framing, escaping, retry or timeout machinery.
//!
//! ## Architecture
//!
//! - **Port** — facade owning one transport and three tasks
//! - **Reader task** — pulls transport bytes, isolates transport faults
//! - **Receiver task** — frame parser, checksum validation, reassembly,
//!   ACK/NAK replies
//! - **Transmit task** — fragmentation and the acknowledge/retransmit loop
//!
//! ## Wire format
//!
//! ```text
//! data frame:    DLE STX  escape( MSN · AppendFlag · Payload · CRC )  DLE ETX
//! control frame: DLE ACK  escape( MSN · CRC16 )                       DLE ETX
//!                DLE NAK
//! ```
//!
//! Data frames carry up to 1024 payload bytes and a CRC-16 (default) or
//! CRC-32 checksum selected by [`PortConfig`]; control frames always use
//! CRC-16. Checksums are little-endian over the pre-escape body including
//! the start character.
//!
//! ## Example
//!
//! ```no_run
//! use serwire::{Port, PortConfig};
//!
//! #[tokio::main]
//! async fn main() -> serwire::Result<()> {
//!     let (left, right) = tokio::io::duplex(64 * 1024);
//!     let a = Port::open(left, PortConfig::default());
//!     let b = Port::open(right, PortConfig::default());
//!
//!     a.write(&b"Hello World\n"[..]).await?;
//!     let payload = b.read().await?;
//!     assert_eq!(&payload[..], b"Hello World\n");
//!     Ok(())
//! }
//! ```
//!
//! Log output is emitted through [`tracing`]; install a subscriber to see
//! drop and failure events.

pub mod checksum;
pub mod config;
pub mod error;
pub mod escape;
pub mod protocol;

mod control;
mod port;
mod reader;
mod receiver;
mod shutdown;
mod transmit;
mod writer;

pub use checksum::CrcKind;
pub use config::PortConfig;
pub use error::{Result, SerwireError};
pub use port::Port;
