//! Transport reader task.
//!
//! Pulls bytes from the transport read half into the raw chunk queue
//! feeding the frame parser, and isolates transport faults: a read error or
//! end-of-stream closes the port; nothing else in the port touches the read
//! half.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::port;
use crate::shutdown::Shutdown;
use crate::writer::SharedWriter;

/// Transport read buffer size.
const READ_BUFFER_SIZE: usize = 512;

pub(crate) async fn run(
    mut source: Box<dyn AsyncRead + Send + Unpin>,
    raw_tx: mpsc::Sender<Bytes>,
    shutdown: Shutdown,
    writer: SharedWriter,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = tokio::select! {
            biased;
            _ = shutdown.wait() => return,
            read = source.read(&mut buf) => read,
        };

        let n = match read {
            Ok(0) => {
                warn!("transport reached end of stream, closing port");
                port::close_port(&shutdown, &writer).await;
                return;
            }
            Ok(n) => n,
            Err(e) => {
                error!("failed to read from transport: {e}");
                port::close_port(&shutdown, &writer).await;
                return;
            }
        };

        let chunk = Bytes::copy_from_slice(&buf[..n]);
        tokio::select! {
            biased;
            _ = shutdown.wait() => return,
            sent = raw_tx.send(chunk) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}
