//! Shared transport writer.
//!
//! Two tasks write to the transport: the receiver replies with control
//! frames and the transmit engine sends data frames. Both go through an
//! `Arc<Mutex<_>>`-guarded write half so each frame reaches the wire as one
//! uninterrupted byte sequence.
//!
//! A frame is written with a single `write` call. When the transport
//! accepts only part of it, a best-effort `DLE ETX` terminator is appended
//! and the frame counts as transmitted anyway; the truncated frame cannot
//! validate on the far side, so the peer's NAK or timeout triggers the
//! retransmission. Any other write failure is fatal to the port.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::warn;

use crate::protocol::{DLE, ETX};

/// Type-erased transport write half shared between tasks.
pub(crate) type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Wrap a write half for sharing.
pub(crate) fn shared_writer<W>(writer: W) -> SharedWriter
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    Arc::new(Mutex::new(Box::new(writer)))
}

/// Write one complete frame to the transport.
pub(crate) async fn write_frame(writer: &SharedWriter, frame: &[u8]) -> io::Result<()> {
    let mut writer = writer.lock().await;

    let written = writer.write(frame).await?;
    if written < frame.len() {
        // Truncated frame on the wire; terminate it and let the peer
        // request a resend.
        warn!(
            written,
            frame_len = frame.len(),
            "frame only partially transmitted"
        );
        let _ = writer.write(&[DLE, ETX]).await;
    }

    writer.flush().await?;
    Ok(())
}

/// Shut the transport write half down, ending the stream.
pub(crate) async fn close_transport(writer: &SharedWriter) -> io::Result<()> {
    writer.lock().await.shutdown().await
}
