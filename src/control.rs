//! Queue of received control frames awaiting the transmit engine.
//!
//! The parser must never block on a slow consumer, so the queue is small
//! and evicts its oldest entry when full. The transmit engine keeps at most
//! one data frame outstanding, which makes any entry older than the newest
//! stale by construction.

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};
use tracing::warn;

use crate::protocol::ControlFrame;

/// Bounded drop-oldest queue of control frames.
#[derive(Debug)]
pub(crate) struct ControlQueue {
    frames: Mutex<VecDeque<ControlFrame>>,
    notify: Notify,
    bound: usize,
}

impl ControlQueue {
    pub(crate) fn new(bound: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(bound)),
            notify: Notify::new(),
            bound,
        }
    }

    /// Enqueue a control frame, evicting the oldest one when full.
    pub(crate) async fn push(&self, frame: ControlFrame) {
        {
            let mut frames = self.frames.lock().await;
            if frames.len() == self.bound {
                let dropped = frames.pop_front();
                warn!(?dropped, "control frame queue full, dropping oldest");
            }
            frames.push_back(frame);
        }
        self.notify.notify_one();
    }

    /// Dequeue the next control frame, waiting for one to arrive.
    pub(crate) async fn recv(&self) -> ControlFrame {
        loop {
            let notified = self.notify.notified();
            if let Some(frame) = self.frames.lock().await.pop_front() {
                return frame;
            }
            notified.await;
        }
    }
}
