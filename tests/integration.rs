//! Integration tests for serwire.
//!
//! Ports run against in-memory transports: `tokio::io::duplex` links two
//! ports, an echo endpoint loops one port back onto itself, and for the
//! ARQ scenarios the test itself plays the raw peer or sits between two
//! ports as a corrupting relay.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream};

use serwire::protocol::{
    encode_control_frame, encode_data_frame, ControlKind, FrameKind, FrameParser, RawFrame, DLE,
    NAK, STX, UMSN,
};
use serwire::{CrcKind, Port, PortConfig, SerwireError};

const TRANSPORT_CAPACITY: usize = 64 * 1024;

/// An endpoint that reads back exactly what was written to it.
fn loopback() -> DuplexStream {
    let (endpoint, far) = tokio::io::duplex(TRANSPORT_CAPACITY);
    let (mut read_half, mut write_half) = tokio::io::split(far);
    tokio::spawn(async move {
        let _ = tokio::io::copy(&mut read_half, &mut write_half).await;
    });
    endpoint
}

/// Two ports linked by an in-memory stream.
fn port_pair(config: PortConfig) -> (Port, Port) {
    let (left, right) = tokio::io::duplex(TRANSPORT_CAPACITY);
    (Port::open(left, config), Port::open(right, config))
}

/// Read from `peer` until the parser completes one frame; the consumed
/// bytes are appended to `raw` for byte-identity checks.
async fn read_one_frame<R: AsyncRead + Unpin>(
    peer: &mut R,
    parser: &mut FrameParser,
    raw: &mut Vec<u8>,
) -> RawFrame {
    let mut buf = [0u8; 4096];
    loop {
        let n = peer.read(&mut buf).await.unwrap();
        assert!(n > 0, "peer stream ended unexpectedly");
        raw.extend_from_slice(&buf[..n]);

        let mut frames = parser.push(&buf[..n]);
        if !frames.is_empty() {
            assert_eq!(frames.len(), 1, "expected one frame at a time");
            return frames.remove(0);
        }
    }
}

#[tokio::test]
async fn test_loopback_roundtrip() {
    let port = Port::open(loopback(), PortConfig::default());

    port.write(&b"hello"[..]).await.unwrap();
    let payload = port.read().await.unwrap();
    assert_eq!(&payload[..], b"hello");
}

#[tokio::test]
async fn test_loopback_empty_payload() {
    let port = Port::open(loopback(), PortConfig::default());

    port.write(&b""[..]).await.unwrap();
    let payload = port.read().await.unwrap();
    assert!(payload.is_empty());
}

#[tokio::test]
async fn test_loopback_payload_with_control_bytes() {
    // DLE-heavy payload exercises escaping end to end.
    let data: Vec<u8> = vec![
        0x10, 0x10, 0x02, 0x03, 0x06, 0x15, 0x10, 0x00, 0xff, 0x10, 0x10, 0x10,
    ];
    let port = Port::open(loopback(), PortConfig::default());

    port.write(data.clone()).await.unwrap();
    let payload = port.read().await.unwrap();
    assert_eq!(&payload[..], &data[..]);
}

#[tokio::test]
async fn test_loopback_throughput() {
    let port = Arc::new(Port::open(loopback(), PortConfig::default()));

    for _ in 0..100 {
        let writer = port.clone();
        let submit = tokio::spawn(async move {
            for _ in 0..1000 {
                writer.write(&b"Hello World\n"[..]).await.unwrap();
            }
        });

        for _ in 0..1000 {
            let payload = port.read().await.unwrap();
            assert_eq!(&payload[..], b"Hello World\n");
        }

        submit.await.unwrap();
    }
}

#[tokio::test]
async fn test_large_payload_is_fragmented_and_reassembled() {
    let mut payload = vec![0u8; 1 << 20];
    rand::thread_rng().fill_bytes(&mut payload);

    let (a, b) = port_pair(PortConfig::default());

    let expected = payload.clone();
    let submit = tokio::spawn(async move {
        a.write(payload).await.unwrap();
        a
    });

    let received = b.read().await.unwrap();
    assert_eq!(&received[..], &expected[..]);

    submit.await.unwrap();
}

#[tokio::test]
async fn test_payloads_arrive_in_submission_order() {
    let (a, b) = port_pair(PortConfig::default());

    let submit = tokio::spawn(async move {
        for i in 0..50u32 {
            a.write(format!("message-{i}").into_bytes()).await.unwrap();
        }
        a
    });

    for i in 0..50u32 {
        let payload = b.read().await.unwrap();
        assert_eq!(payload, format!("message-{i}").as_bytes());
    }

    submit.await.unwrap();
}

#[tokio::test]
async fn test_bidirectional_exchange() {
    let config = PortConfig::default();
    let (a, b) = port_pair(config);
    let (a, b) = (Arc::new(a), Arc::new(b));

    // Writers and readers run concurrently; the small receive queues
    // backpressure either direction if its reader falls behind.
    let mut tasks = Vec::new();
    for (from, tag) in [(a.clone(), "a"), (b.clone(), "b")] {
        tasks.push(tokio::spawn(async move {
            for i in 0..100u32 {
                from.write(format!("{tag}-{i}").into_bytes()).await.unwrap();
            }
        }));
    }
    for (to, tag) in [(b.clone(), "a"), (a.clone(), "b")] {
        tasks.push(tokio::spawn(async move {
            for i in 0..100u32 {
                let payload = to.read().await.unwrap();
                assert_eq!(payload, format!("{tag}-{i}").as_bytes());
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_crc32_configuration_roundtrip() {
    let config = PortConfig {
        data_crc: CrcKind::Crc32,
    };
    let (a, b) = port_pair(config);

    let payload: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
    let expected = payload.clone();

    let submit = tokio::spawn(async move {
        a.write(payload).await.unwrap();
        a
    });

    let received = b.read().await.unwrap();
    assert_eq!(&received[..], &expected[..]);

    submit.await.unwrap();
}

/// A flipped payload byte in transit must produce a NAK, a byte-identical
/// retransmission, and exactly one delivery.
#[tokio::test]
async fn test_corruption_triggers_nak_and_retransmission() {
    let (a_side, a_relay) = tokio::io::duplex(TRANSPORT_CAPACITY);
    let (b_relay, b_side) = tokio::io::duplex(TRANSPORT_CAPACITY);
    let a = Port::open(a_side, PortConfig::default());
    let b = Port::open(b_side, PortConfig::default());

    let data_frames = Arc::new(AtomicUsize::new(0));

    // A → B leg: flip one payload byte of the first data frame.
    let (mut ar, mut aw) = tokio::io::split(a_relay);
    let (mut br, mut bw) = tokio::io::split(b_relay);
    let seen = data_frames.clone();
    tokio::spawn(async move {
        let mut corrupted = false;
        let mut buf = [0u8; 4096];
        loop {
            let n = match ar.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            let chunk = &mut buf[..n];
            if chunk.len() > 4 && chunk[0] == DLE && chunk[1] == STX {
                seen.fetch_add(1, Ordering::SeqCst);
                if !corrupted {
                    chunk[4] ^= 0x01;
                    corrupted = true;
                }
            }
            if bw.write_all(chunk).await.is_err() {
                return;
            }
        }
    });

    // B → A leg: control frames pass through untouched.
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            let n = match br.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            if aw.write_all(&buf[..n]).await.is_err() {
                return;
            }
        }
    });

    a.write(&b"AAAA BBBB CCCC"[..]).await.unwrap();

    let payload = b.read().await.unwrap();
    assert_eq!(&payload[..], b"AAAA BBBB CCCC");

    // Original transmission plus exactly one retransmission.
    assert_eq!(data_frames.load(Ordering::SeqCst), 2);

    // Delivered exactly once.
    assert!(matches!(
        b.read_timeout(Duration::from_millis(200)).await,
        Err(SerwireError::Timeout)
    ));
}

/// An ACK echoing the wrong MSN counts as not acknowledged.
#[tokio::test]
async fn test_mismatched_ack_triggers_retransmission() {
    let (port_side, mut peer) = tokio::io::duplex(TRANSPORT_CAPACITY);
    let port = Port::open(port_side, PortConfig::default());
    let mut parser = FrameParser::new();

    port.write(&b"payload"[..]).await.unwrap();

    let mut first = Vec::new();
    let frame = read_one_frame(&mut peer, &mut parser, &mut first).await;
    assert_eq!(frame.kind, FrameKind::Data);
    let msn = frame.body[0];

    // Acknowledge a different sequence number.
    peer.write_all(&encode_control_frame(ControlKind::Ack, msn.wrapping_add(5)))
        .await
        .unwrap();

    let mut second = Vec::new();
    read_one_frame(&mut peer, &mut parser, &mut second).await;
    assert_eq!(first, second, "retransmission must be byte-identical");

    // The correct ACK releases the engine.
    peer.write_all(&encode_control_frame(ControlKind::Ack, msn))
        .await
        .unwrap();

    port.write(&b"next"[..]).await.unwrap();
    let mut third = Vec::new();
    let frame = read_one_frame(&mut peer, &mut parser, &mut third).await;
    assert_eq!(frame.body[0], msn + 1, "send counter advanced to the next fragment");
}

/// A NAK reply forces a byte-identical retransmission.
#[tokio::test]
async fn test_nak_triggers_retransmission() {
    let (port_side, mut peer) = tokio::io::duplex(TRANSPORT_CAPACITY);
    let port = Port::open(port_side, PortConfig::default());
    let mut parser = FrameParser::new();

    port.write(&b"resend me"[..]).await.unwrap();

    let mut first = Vec::new();
    let frame = read_one_frame(&mut peer, &mut parser, &mut first).await;
    let msn = frame.body[0];

    peer.write_all(&encode_control_frame(ControlKind::Nak, UMSN))
        .await
        .unwrap();

    let mut second = Vec::new();
    read_one_frame(&mut peer, &mut parser, &mut second).await;
    assert_eq!(first, second);

    peer.write_all(&encode_control_frame(ControlKind::Ack, msn))
        .await
        .unwrap();
}

/// A swallowed control reply is covered by the 5-second transmit timeout.
#[tokio::test(start_paused = true)]
async fn test_missing_control_frame_triggers_retransmission() {
    let (port_side, mut peer) = tokio::io::duplex(TRANSPORT_CAPACITY);
    let port = Port::open(port_side, PortConfig::default());
    let mut parser = FrameParser::new();

    port.write(&b"timeout case"[..]).await.unwrap();

    let mut first = Vec::new();
    let frame = read_one_frame(&mut peer, &mut parser, &mut first).await;
    let msn = frame.body[0];

    // Stay silent; the paused clock runs the 5-second timeout down.
    let mut second = Vec::new();
    read_one_frame(&mut peer, &mut parser, &mut second).await;
    assert_eq!(first, second);

    peer.write_all(&encode_control_frame(ControlKind::Ack, msn))
        .await
        .unwrap();

    port.write(&b"after recovery"[..]).await.unwrap();
    let mut third = Vec::new();
    let frame = read_one_frame(&mut peer, &mut parser, &mut third).await;
    assert_eq!(frame.body[0], msn + 1);
}

/// A frame whose ETX never arrives is discarded after five seconds and the
/// stream recovers.
#[tokio::test(start_paused = true)]
async fn test_frame_timer_discards_partial_frame() {
    let (port_side, mut peer) = tokio::io::duplex(TRANSPORT_CAPACITY);
    let port = Port::open(port_side, PortConfig::default());

    // Open a data frame and stop mid-body.
    peer.write_all(&[DLE, STX, 0x01, 0x00, 0x41]).await.unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;

    // After the frame timer fired, a complete frame parses normally.
    peer.write_all(&encode_data_frame(1, false, b"ok", CrcKind::Crc16))
        .await
        .unwrap();

    let payload = port.read().await.unwrap();
    assert_eq!(&payload[..], b"ok");
}

/// Every received data frame is answered: ACK with its MSN when valid,
/// NAK with UMSN when corrupt.
#[tokio::test]
async fn test_data_frames_are_acknowledged() {
    let (port_side, mut peer) = tokio::io::duplex(TRANSPORT_CAPACITY);
    let port = Port::open(port_side, PortConfig::default());
    let mut parser = FrameParser::new();

    // Valid frame: expect ACK with the frame's MSN.
    peer.write_all(&encode_data_frame(9, false, b"fine", CrcKind::Crc16))
        .await
        .unwrap();
    let mut raw = Vec::new();
    let reply = read_one_frame(&mut peer, &mut parser, &mut raw).await;
    assert_eq!(reply.kind, FrameKind::Control(ControlKind::Ack));
    assert_eq!(reply.body[0], 9);
    assert_eq!(&port.read().await.unwrap()[..], b"fine");

    // Corrupt frame: expect NAK with UMSN.
    let mut bad = encode_data_frame(10, false, b"corrupt", CrcKind::Crc16);
    bad[4] ^= 0x01;
    peer.write_all(&bad).await.unwrap();
    let mut raw = Vec::new();
    let reply = read_one_frame(&mut peer, &mut parser, &mut raw).await;
    assert_eq!(reply.kind, FrameKind::Control(ControlKind::Nak));
    assert_eq!(reply.body[0], UMSN);
}

/// Without duplicate suppression, a repeated MSN delivers twice.
#[tokio::test]
async fn test_duplicate_msn_delivers_twice() {
    let (port_side, mut peer) = tokio::io::duplex(TRANSPORT_CAPACITY);
    let port = Port::open(port_side, PortConfig::default());
    let frame = encode_data_frame(4, false, b"again", CrcKind::Crc16);

    peer.write_all(&frame).await.unwrap();
    peer.write_all(&frame).await.unwrap();

    assert_eq!(&port.read().await.unwrap()[..], b"again");
    assert_eq!(&port.read().await.unwrap()[..], b"again");
}

/// Multi-fragment reassembly driven by hand-built frames.
#[tokio::test]
async fn test_fragments_reassemble_positionally() {
    let (port_side, mut peer) = tokio::io::duplex(TRANSPORT_CAPACITY);
    let port = Port::open(port_side, PortConfig::default());

    peer.write_all(&encode_data_frame(1, true, b"first ", CrcKind::Crc16))
        .await
        .unwrap();
    peer.write_all(&encode_data_frame(2, true, b"second ", CrcKind::Crc16))
        .await
        .unwrap();
    peer.write_all(&encode_data_frame(3, false, b"third", CrcKind::Crc16))
        .await
        .unwrap();

    let payload = port.read().await.unwrap();
    assert_eq!(&payload[..], b"first second third");
}

#[tokio::test(start_paused = true)]
async fn test_read_timeout_leaves_port_usable() {
    let port = Port::open(loopback(), PortConfig::default());

    let result = port.read_timeout(Duration::from_secs(1)).await;
    assert!(matches!(result, Err(SerwireError::Timeout)));
    assert!(!port.is_closed());

    port.write(&b"still alive"[..]).await.unwrap();
    let payload = port.read().await.unwrap();
    assert_eq!(&payload[..], b"still alive");
}

#[tokio::test]
async fn test_close_fails_subsequent_operations() {
    let (a, _b) = port_pair(PortConfig::default());

    a.close().await.unwrap();
    assert!(a.is_closed());

    assert!(matches!(a.read().await, Err(SerwireError::Closed)));
    assert!(matches!(
        a.write(&b"late"[..]).await,
        Err(SerwireError::Closed)
    ));

    // Idempotent.
    a.close().await.unwrap();
}

#[tokio::test]
async fn test_close_wakes_pending_read() {
    let (a, _b) = port_pair(PortConfig::default());
    let a = Arc::new(a);

    let pending = {
        let a = a.clone();
        tokio::spawn(async move { a.read().await })
    };
    tokio::task::yield_now().await;

    a.close().await.unwrap();
    assert!(matches!(pending.await.unwrap(), Err(SerwireError::Closed)));
}

/// Closing one end is end-of-stream for the other, which closes itself.
#[tokio::test]
async fn test_peer_close_propagates() {
    let (a, b) = port_pair(PortConfig::default());

    b.close().await.unwrap();

    assert!(matches!(a.read().await, Err(SerwireError::Closed)));
    assert!(a.is_closed());
}

/// Sanity-check the wire constants against a hand-assembled NAK frame.
#[tokio::test]
async fn test_hand_assembled_control_frame_is_accepted() {
    let (port_side, mut peer) = tokio::io::duplex(TRANSPORT_CAPACITY);
    let port = Port::open(port_side, PortConfig::default());
    let mut parser = FrameParser::new();

    port.write(&b"x"[..]).await.unwrap();
    let mut raw = Vec::new();
    let frame = read_one_frame(&mut peer, &mut parser, &mut raw).await;
    let msn = frame.body[0];

    // NAK built from raw bytes: DLE NAK MSN CRC16(NAK·MSN) DLE ETX.
    let crc = CrcKind::Crc16.checksum(&[NAK, UMSN]);
    let nak = vec![DLE, NAK, UMSN, crc[0], crc[1], DLE, 0x03];
    peer.write_all(&nak).await.unwrap();

    // The engine resends, then accepts the real ACK.
    let mut again = Vec::new();
    read_one_frame(&mut peer, &mut parser, &mut again).await;
    assert_eq!(raw, again);

    peer.write_all(&encode_control_frame(ControlKind::Ack, msn))
        .await
        .unwrap();
}
