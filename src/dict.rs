//! Sharded concurrent map (§4.A of the spec).
//!
//! An array of `M` independent sub-maps, each behind its own
//! `parking_lot::RwLock`, so operations on disjoint keys never contend.
//! `M` must be a power of two; `shard(k) = hash(k) & (M - 1)`.
//!
//! Used both for the keyspace (`ShardedMap<Bytes, Entity>`) and the TTL
//! index (`ShardedMap<Bytes, Instant>`, see `ttl.rs`) so the sharding and
//! `for_each` visitor logic only has to be written once.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher, RandomState};

pub struct ShardedMap<K, V> {
    shards: Vec<RwLock<HashMap<K, V>>>,
    hasher: RandomState,
    mask: usize,
}

impl<K, V> ShardedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    /// `shard_count` is rounded up to the next power of two.
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1).next_power_of_two();
        let mut shards = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shards.push(RwLock::new(HashMap::new()));
        }
        ShardedMap {
            shards,
            hasher: RandomState::new(),
            mask: shard_count - 1,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_index(&self, key: &K) -> usize {
        let mut h = self.hasher.build_hasher();
        key.hash(&mut h);
        (h.finish() as usize) & self.mask
    }

    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let idx = self.shard_index(key);
        self.shards[idx].read().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        let idx = self.shard_index(key);
        self.shards[idx].read().contains_key(key)
    }

    /// Inserts unconditionally, returning whether the key was newly added.
    pub fn put(&self, key: K, value: V) -> bool {
        let idx = self.shard_index(&key);
        self.shards[idx].write().insert(key, value).is_none()
    }

    pub fn put_if_absent(&self, key: K, value: V) -> bool {
        let idx = self.shard_index(&key);
        let mut shard = self.shards[idx].write();
        if shard.contains_key(&key) {
            false
        } else {
            shard.insert(key, value);
            true
        }
    }

    pub fn put_if_exists(&self, key: K, value: V) -> bool {
        let idx = self.shard_index(&key);
        let mut shard = self.shards[idx].write();
        if shard.contains_key(&key) {
            shard.insert(key, value);
            true
        } else {
            false
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let idx = self.shard_index(key);
        self.shards[idx].write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visits every entry, one shard at a time. Each shard is snapshotted
    /// (its key list cloned under the read lock, then released) before the
    /// visitor runs, so the visitor must not re-enter this map on the same
    /// shard. Returning `false` from `visitor` aborts the whole iteration.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        V: Clone,
        F: FnMut(&K, &V) -> bool,
    {
        'shards: for shard in &self.shards {
            let snapshot: Vec<(K, V)> = {
                let guard = shard.read();
                guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            };
            for (k, v) in &snapshot {
                if !visitor(k, v) {
                    break 'shards;
                }
            }
        }
    }

    /// Replaces every shard with a fresh, empty map. Atomic from the
    /// caller's point of view: no reader ever observes a state with some
    /// shards cleared and others not, because each shard's write lock is
    /// taken and released independently and no reader spans a flush.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.write().clear();
        }
    }

    /// Samples up to `count` keys from a single randomly chosen shard.
    /// Used by the TTL sweeper (§4.B) to bound mean staleness independent
    /// of keyspace size without scanning the whole map on every tick.
    pub fn sample_one_shard<R: rand::Rng>(&self, rng: &mut R, count: usize) -> Vec<(K, V)>
    where
        V: Clone,
    {
        let idx = rng.gen_range(0..self.shards.len());
        let guard = self.shards[idx].read();
        guard
            .iter()
            .take(count)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove_roundtrip() {
        let m: ShardedMap<String, i32> = ShardedMap::new(4);
        assert!(m.put_if_absent("a".into(), 1));
        assert!(!m.put_if_absent("a".into(), 2));
        assert_eq!(m.get(&"a".to_string()), Some(1));
        assert_eq!(m.len(), 1);
        assert_eq!(m.remove(&"a".to_string()), Some(1));
        assert_eq!(m.get(&"a".to_string()), None);
    }

    #[test]
    fn for_each_visits_all_entries() {
        let m: ShardedMap<i32, i32> = ShardedMap::new(8);
        for i in 0..50 {
            m.put(i, i * 2);
        }
        let mut seen = 0;
        m.for_each(|_, _| {
            seen += 1;
            true
        });
        assert_eq!(seen, 50);
    }

    #[test]
    fn for_each_can_abort_early() {
        // single shard so iteration order within for_each is deterministic
        let m: ShardedMap<i32, i32> = ShardedMap::new(1);
        for i in 0..10 {
            m.put(i, i);
        }
        let mut visited = 0;
        m.for_each(|_, _| {
            visited += 1;
            visited < 3
        });
        assert_eq!(visited, 3);
    }

    #[test]
    fn clear_empties_every_shard() {
        let m: ShardedMap<i32, i32> = ShardedMap::new(4);
        for i in 0..20 {
            m.put(i, i);
        }
        m.clear();
        assert_eq!(m.len(), 0);
        assert!(m.is_empty());
    }

    #[test]
    fn shard_count_rounds_to_power_of_two() {
        let m: ShardedMap<i32, i32> = ShardedMap::new(10);
        assert_eq!(m.shard_count(), 16);
    }
}
