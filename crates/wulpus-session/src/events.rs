//! Fan-out of frames and status changes to subscribers
//!
//! Every published event carries a monotonically increasing sequence number.
//! A subscriber that falls behind skips ahead to the newest events instead of
//! slowing the acquisition loop down; it can tell how much it missed from
//! [`Subscription::missed`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{trace, warn};
use wulpus_protocol::Frame;

use crate::state::StatusSnapshot;

/// Event delivered to subscribers
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A frame was written to the acquisition buffers
    Frame { seq: u64, frame: Arc<Frame> },
    /// The session status changed
    Status { seq: u64, status: StatusSnapshot },
}

impl SessionEvent {
    pub fn seq(&self) -> u64 {
        match self {
            SessionEvent::Frame { seq, .. } | SessionEvent::Status { seq, .. } => *seq,
        }
    }

    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            SessionEvent::Frame { frame, .. } => Some(frame),
            SessionEvent::Status { .. } => None,
        }
    }

    pub fn as_status(&self) -> Option<&StatusSnapshot> {
        match self {
            SessionEvent::Status { status, .. } => Some(status),
            SessionEvent::Frame { .. } => None,
        }
    }
}

/// Publishes session events and retains the most recent frame
#[derive(Debug)]
pub struct Broadcaster {
    tx: broadcast::Sender<SessionEvent>,
    next_seq: AtomicU64,
    latest_frame: Mutex<Option<Arc<Frame>>>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            next_seq: AtomicU64::new(0),
            latest_frame: Mutex::new(None),
        }
    }

    fn take_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Publish a frame and make it the latest one. Never blocks.
    pub fn publish_frame(&self, frame: Frame) -> Arc<Frame> {
        let frame = Arc::new(frame);
        *self
            .latest_frame
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(frame.clone());

        let seq = self.take_seq();
        // No receivers is fine
        let _ = self.tx.send(SessionEvent::Frame {
            seq,
            frame: frame.clone(),
        });
        trace!("Published frame event {}", seq);
        frame
    }

    pub fn publish_status(&self, status: StatusSnapshot) {
        let seq = self.take_seq();
        let _ = self.tx.send(SessionEvent::Status { seq, status });
        trace!("Published status event {}", seq);
    }

    /// Most recently published frame, if any
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.latest_frame
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            last_seq: None,
            missed: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Receiving end of a [`Broadcaster`]
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<SessionEvent>,
    last_seq: Option<u64>,
    missed: u64,
}

impl Subscription {
    /// Wait for the next event; `None` once the broadcaster is gone
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(self.accept(event)),
                Err(RecvError::Lagged(n)) => self.lagged(n),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(self.accept(event)),
                Err(TryRecvError::Lagged(n)) => self.lagged(n),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    fn accept(&mut self, event: SessionEvent) -> SessionEvent {
        self.last_seq = Some(event.seq());
        event
    }

    fn lagged(&mut self, n: u64) {
        warn!("Subscriber lagged, skipped {} events", n);
        self.missed += n;
    }

    /// Sequence number of the last event delivered
    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    /// Events dropped because this subscriber fell behind
    pub fn missed(&self) -> u64 {
        self.missed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u16) -> Frame {
        Frame::new(vec![seq as i16; 4], seq, 0)
    }

    #[test]
    fn test_publish_without_subscribers() {
        let broadcaster = Broadcaster::new(4);
        broadcaster.publish_frame(frame(1));
        assert_eq!(broadcaster.latest_frame().unwrap().sequence_number, 1);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_events_in_order() {
        let broadcaster = Broadcaster::new(16);
        let mut sub = broadcaster.subscribe();

        for i in 0..3 {
            broadcaster.publish_frame(frame(i));
        }

        let mut seqs = Vec::new();
        for _ in 0..3 {
            let event = sub.recv().await.unwrap();
            seqs.push(event.as_frame().unwrap().sequence_number);
        }
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(sub.last_seq(), Some(2));
        assert_eq!(sub.missed(), 0);
    }

    #[test]
    fn test_slow_subscriber_skips_ahead() {
        let broadcaster = Broadcaster::new(4);
        let mut slow = broadcaster.subscribe();

        for i in 0..10 {
            broadcaster.publish_frame(frame(i));
        }

        let first = slow.try_recv().unwrap();
        assert_eq!(first.seq(), 6);
        assert_eq!(slow.missed(), 6);

        let rest: Vec<u64> = std::iter::from_fn(|| slow.try_recv()).map(|e| e.seq()).collect();
        assert_eq!(rest, vec![7, 8, 9]);
        assert_eq!(broadcaster.latest_frame().unwrap().sequence_number, 9);
    }

    #[test]
    fn test_late_subscriber_sees_only_new_events() {
        let broadcaster = Broadcaster::new(4);
        broadcaster.publish_frame(frame(0));

        let mut sub = broadcaster.subscribe();
        assert!(sub.try_recv().is_none());
        broadcaster.publish_frame(frame(1));
        assert_eq!(sub.try_recv().unwrap().seq(), 1);
    }
}
