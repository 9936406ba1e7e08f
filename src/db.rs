//! The keyspace façade (§4.E): glue of the sharded dict, TTL index and
//! lock manager, exposing `GetEntity`/`PutEntity`/`Remove`/`Expire`/...

use crate::dict::ShardedMap;
use crate::entity::Entity;
use crate::lock::{LockManager, MultiReadGuard, MultiWriteGuard};
use crate::ttl::TtlIndex;
use bytes::Bytes;
use std::sync::mpsc::SyncSender;
use std::time::Instant;

/// One mutating-command record, handed to the AOF engine after a handler
/// returns a non-error reply (§3 invariant 3 and 4).
#[derive(Clone, Debug)]
pub struct AofRecord {
    pub argv: Vec<Bytes>,
}

pub struct Db {
    data: ShardedMap<Bytes, Entity>,
    ttl: TtlIndex,
    locks: LockManager,
    aof_tx: Option<SyncSender<AofRecord>>,
}

impl Db {
    pub fn new(shard_count: usize, lock_count: usize, aof_tx: Option<SyncSender<AofRecord>>) -> Self {
        Db {
            data: ShardedMap::new(shard_count),
            ttl: TtlIndex::new(shard_count),
            locks: LockManager::new(lock_count),
            aof_tx,
        }
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn lock_keys<'a>(&'a self, keys: &[Bytes]) -> MultiWriteGuard<'a> {
        self.locks.lock_keys(keys)
    }

    pub fn rlock_keys<'a>(&'a self, keys: &[Bytes]) -> MultiReadGuard<'a> {
        self.locks.rlock_keys(keys)
    }

    /// Sends a mutating command's AOF record. Called by the dispatcher
    /// while still holding the write lock for the command's keys, so that
    /// AOF order matches mutation commit order per key (§5).
    pub fn feed_aof(&self, argv: Vec<Bytes>) {
        if let Some(tx) = &self.aof_tx {
            // A full channel blocks this call, which backpressures the
            // calling client task (§5) — this is the point at which AOF
            // cannot keep up and the rest of the system is expected to
            // feel it.
            let _ = tx.send(AofRecord { argv });
        }
    }

    /// Consults the TTL index first and evicts lazily if the key has
    /// expired (passive expiration, §4.E). Caller must hold at least a
    /// read lock for `key`.
    pub fn get_entity(&self, key: &Bytes) -> Option<Entity> {
        if self.is_expired(key) {
            self.evict_if_expired(key);
            return None;
        }
        self.data.get(key)
    }

    pub fn contains(&self, key: &Bytes) -> bool {
        self.get_entity(key).is_some()
    }

    pub fn put_entity(&self, key: Bytes, value: Entity) {
        self.data.put(key, value);
    }

    pub fn put_entity_if_absent(&self, key: Bytes, value: Entity) -> bool {
        self.data.put_if_absent(key, value)
    }

    pub fn put_entity_if_exists(&self, key: Bytes, value: Entity) -> bool {
        self.data.put_if_exists(key, value)
    }

    /// Removes a single key (entity + TTL). Returns whether it was present.
    pub fn remove(&self, key: &Bytes) -> bool {
        self.ttl.remove(key);
        self.data.remove(key).is_some()
    }

    /// Removes many keys, returning the count actually present.
    pub fn removes(&self, keys: &[Bytes]) -> usize {
        keys.iter().filter(|k| self.remove(k)).count()
    }

    /// Atomically (from callers' view) replaces the keyspace with an
    /// empty one.
    pub fn flush(&self) {
        self.data.clear();
        self.ttl.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn expire(&self, key: &Bytes, at: Instant) {
        self.ttl.put(key.clone(), at);
    }

    pub fn persist(&self, key: &Bytes) -> bool {
        self.ttl.remove(key)
    }

    pub fn ttl_at(&self, key: &Bytes) -> Option<Instant> {
        self.ttl.get(key)
    }

    /// Samples up to `count` keys with a TTL set, for the active-expiration
    /// sweeper (§4.B) to check and evict.
    pub fn ttl_sample(&self, count: usize) -> Vec<(Bytes, Instant)> {
        self.ttl.sample(count)
    }

    pub fn is_expired(&self, key: &Bytes) -> bool {
        match self.ttl.get(key) {
            Some(at) => at <= Instant::now(),
            None => false,
        }
    }

    /// Removes `key` if its TTL has passed. Used both by the passive path
    /// in `get_entity` and by the active sweeper (§4.B).
    pub fn evict_if_expired(&self, key: &Bytes) -> bool {
        if self.is_expired(key) {
            self.data.remove(key);
            self.ttl.remove(key);
            true
        } else {
            false
        }
    }

    /// Visits every live (non-expired) key/entity pair. Used by KEYS and
    /// by the AOF rewrite snapshot.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&Bytes, &Entity) -> bool,
    {
        let now = Instant::now();
        self.data.for_each(|k, v| {
            if let Some(at) = self.ttl.get(k) {
                if at <= now {
                    return true; // skip expired; sweeper/passive path owns eviction
                }
            }
            visitor(k, v)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn set_then_get_roundtrip() {
        let db = Db::new(4, 16, None);
        db.put_entity(key("foo"), Entity::String(Bytes::from_static(b"bar")));
        assert_eq!(
            db.get_entity(&key("foo")).unwrap().as_string().unwrap(),
            &Bytes::from_static(b"bar")
        );
        assert!(db.contains(&key("foo")));
        assert_eq!(db.ttl_at(&key("foo")), None);
    }

    #[test]
    fn remove_clears_entity_and_ttl() {
        let db = Db::new(4, 16, None);
        db.put_entity(key("foo"), Entity::String(Bytes::from_static(b"bar")));
        db.expire(&key("foo"), Instant::now() + std::time::Duration::from_secs(100));
        assert!(db.remove(&key("foo")));
        assert!(!db.contains(&key("foo")));
        assert_eq!(db.ttl_at(&key("foo")), None);
    }

    #[test]
    fn passive_expiration_on_get() {
        let db = Db::new(4, 16, None);
        db.put_entity(key("foo"), Entity::String(Bytes::from_static(b"bar")));
        db.expire(&key("foo"), Instant::now() - std::time::Duration::from_secs(1));
        assert_eq!(db.get_entity(&key("foo")), None);
        // the entity itself is gone now too, not just hidden
        assert_eq!(db.len(), 0);
    }

    #[test]
    fn flush_empties_everything() {
        let db = Db::new(4, 16, None);
        for i in 0..10 {
            db.put_entity(Bytes::from(i.to_string()), Entity::String(Bytes::from_static(b"v")));
        }
        assert_eq!(db.len(), 10);
        db.flush();
        assert_eq!(db.len(), 0);
    }

    #[test]
    fn absent_key_has_no_ttl_and_is_not_expired() {
        let db = Db::new(4, 16, None);
        assert_eq!(db.ttl_at(&key("missing")), None);
        assert!(!db.is_expired(&key("missing")));
    }
}
