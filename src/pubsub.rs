//! Publish/subscribe hub (§4.I): channel → subscriber fan-out with bounded
//! per-subscriber outbound queues.
//!
//! The teacher never implements pub/sub (its `handler.rs`/`client.rs` only
//! know request/reply), so this is grounded on the corpus's general
//! fan-out idiom: a `parking_lot::Mutex`-guarded registry of
//! `tokio::sync::mpsc::Sender`s, one per subscriber, with `try_send` so a
//! slow subscriber can never stall a publisher.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc::{self, Sender};
use tracing::warn;

use crate::pattern::glob_match;

/// A message delivered to a subscriber: either a channel publish or the
/// subscribe/unsubscribe acknowledgements §6 pub/sub commands reply with.
#[derive(Clone, Debug)]
pub enum Message {
    Message { channel: Bytes, payload: Bytes },
    PMessage {
        pattern: Bytes,
        channel: Bytes,
        payload: Bytes,
    },
}

struct Subscriber {
    id: u64,
    tx: Sender<Message>,
}

#[derive(Default)]
struct Registry {
    channels: HashMap<Bytes, Vec<Subscriber>>,
    patterns: HashMap<Bytes, Vec<Subscriber>>,
}

/// How many buffered messages a subscriber can fall behind by before it is
/// disconnected (§4.I overload policy).
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

pub struct PubSub {
    registry: Mutex<Registry>,
}

impl PubSub {
    pub fn new() -> Self {
        PubSub {
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn subscribe(&self, id: u64, tx: &Sender<Message>, channel: Bytes) {
        let mut reg = self.registry.lock();
        let subs = reg.channels.entry(channel).or_default();
        if !subs.iter().any(|s| s.id == id) {
            subs.push(Subscriber { id, tx: tx.clone() });
        }
    }

    pub fn psubscribe(&self, id: u64, tx: &Sender<Message>, pattern: Bytes) {
        let mut reg = self.registry.lock();
        let subs = reg.patterns.entry(pattern).or_default();
        if !subs.iter().any(|s| s.id == id) {
            subs.push(Subscriber { id, tx: tx.clone() });
        }
    }

    pub fn unsubscribe(&self, id: u64, channel: &[u8]) {
        let mut reg = self.registry.lock();
        if let Some(subs) = reg.channels.get_mut(channel) {
            subs.retain(|s| s.id != id);
            if subs.is_empty() {
                reg.channels.remove(channel);
            }
        }
    }

    pub fn punsubscribe(&self, id: u64, pattern: &[u8]) {
        let mut reg = self.registry.lock();
        if let Some(subs) = reg.patterns.get_mut(pattern) {
            subs.retain(|s| s.id != id);
            if subs.is_empty() {
                reg.patterns.remove(pattern);
            }
        }
    }

    /// Removes every subscription held by `id`, called when a connection
    /// disconnects.
    pub fn unsubscribe_all(&self, id: u64) {
        let mut reg = self.registry.lock();
        for subs in reg.channels.values_mut() {
            subs.retain(|s| s.id != id);
        }
        reg.channels.retain(|_, subs| !subs.is_empty());
        for subs in reg.patterns.values_mut() {
            subs.retain(|s| s.id != id);
        }
        reg.patterns.retain(|_, subs| !subs.is_empty());
    }

    /// Fans `payload` out to every exact-channel and pattern subscriber,
    /// returning the number of subscribers it was delivered to. A
    /// subscriber whose queue is full is dropped outright rather than
    /// blocking the publisher (§4.I).
    pub fn publish(&self, channel: &[u8], payload: Bytes) -> usize {
        let reg = self.registry.lock();
        let mut delivered = 0usize;

        if let Some(subs) = reg.channels.get(channel) {
            for sub in subs {
                let msg = Message::Message {
                    channel: Bytes::copy_from_slice(channel),
                    payload: payload.clone(),
                };
                if sub.tx.try_send(msg).is_ok() {
                    delivered += 1;
                } else {
                    warn!(subscriber = sub.id, "pub/sub queue full, dropping message");
                }
            }
        }

        for (pattern, subs) in reg.patterns.iter() {
            if !glob_match(pattern, channel) {
                continue;
            }
            for sub in subs {
                let msg = Message::PMessage {
                    pattern: pattern.clone(),
                    channel: Bytes::copy_from_slice(channel),
                    payload: payload.clone(),
                };
                if sub.tx.try_send(msg).is_ok() {
                    delivered += 1;
                } else {
                    warn!(subscriber = sub.id, "pub/sub queue full, dropping message");
                }
            }
        }

        delivered
    }

    pub fn channel_count(&self) -> usize {
        self.registry.lock().channels.len()
    }
}

impl Default for PubSub {
    fn default() -> Self {
        PubSub::new()
    }
}
