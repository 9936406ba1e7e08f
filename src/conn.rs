//! Per-connection state (ambient — the core keyspace has no notion of
//! "a connection", but the dispatcher and pub/sub hub both need one).
//!
//! Grounded on the teacher's `client.rs` (`RedisClient` carrying an id,
//! buffers and flag bits), trimmed to what a tokio task actually needs:
//! an id for the pub/sub registry and the set of channels/patterns it
//! is currently subscribed to.

use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{Receiver, Sender};

use crate::pubsub::{Message, SUBSCRIBER_QUEUE_CAPACITY};

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

pub struct ConnState {
    pub id: u64,
    pub channels: HashSet<Bytes>,
    pub patterns: HashSet<Bytes>,
    pub pubsub_tx: Sender<Message>,
}

impl ConnState {
    /// Allocates a fresh connection id and outbound pub/sub queue. The
    /// receiving half is handed to the connection's write loop, which
    /// interleaves pub/sub pushes with command replies.
    pub fn new() -> (ConnState, Receiver<Message>) {
        let (tx, rx) = tokio::sync::mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let state = ConnState {
            id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
            channels: HashSet::new(),
            patterns: HashSet::new(),
            pubsub_tx: tx,
        };
        (state, rx)
    }

    pub fn is_subscribed(&self) -> bool {
        !self.channels.is_empty() || !self.patterns.is_empty()
    }

    pub fn subscription_count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_connections_get_distinct_ids() {
        let (a, _) = ConnState::new();
        let (b, _) = ConnState::new();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn subscription_bookkeeping() {
        let (mut conn, _rx) = ConnState::new();
        assert!(!conn.is_subscribed());
        conn.channels.insert(Bytes::from_static(b"ch"));
        assert!(conn.is_subscribed());
        assert_eq!(conn.subscription_count(), 1);
    }
}
