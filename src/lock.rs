//! Striped lock manager (§4.C).
//!
//! A fixed-size vector of reader/writer locks; a key's slot is
//! `hash(key) mod N`. Multi-key acquisition sorts the distinct slot
//! indices ascending before locking and releases in reverse order, which
//! forbids the cyclic waits that would otherwise arise when two handlers
//! contend for overlapping key sets (§4.C, "Deadlock avoidance").
//!
//! Locks are keyed by slot, not by key identity, so `Lock`s can be taken
//! for keys that do not yet exist in the keyspace (required by
//! `PutIfAbsent`).

use bytes::Bytes;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub struct LockManager {
    slots: Vec<RwLock<()>>,
    mask: usize,
}

fn slot_of(key: &[u8], mask: usize) -> usize {
    let mut h = DefaultHasher::new();
    key.hash(&mut h);
    (h.finish() as usize) & mask
}

fn distinct_sorted_slots(keys: &[Bytes], mask: usize) -> Vec<usize> {
    let mut slots: Vec<usize> = keys.iter().map(|k| slot_of(k, mask)).collect();
    slots.sort_unstable();
    slots.dedup();
    slots
}

impl LockManager {
    /// `slot_count` is rounded up to the next power of two.
    pub fn new(slot_count: usize) -> Self {
        let slot_count = slot_count.max(1).next_power_of_two();
        let mut slots = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            slots.push(RwLock::new(()));
        }
        LockManager {
            slots,
            mask: slot_count - 1,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Acquires write locks for every distinct slot touched by `keys`, in
    /// ascending slot order.
    pub fn lock_keys<'a>(&'a self, keys: &[Bytes]) -> MultiWriteGuard<'a> {
        let slots = distinct_sorted_slots(keys, self.mask);
        let mut guards = Vec::with_capacity(slots.len());
        for idx in slots {
            guards.push(self.slots[idx].write());
        }
        MultiWriteGuard { guards }
    }

    /// Acquires read locks for every distinct slot touched by `keys`, in
    /// ascending slot order.
    pub fn rlock_keys<'a>(&'a self, keys: &[Bytes]) -> MultiReadGuard<'a> {
        let slots = distinct_sorted_slots(keys, self.mask);
        let mut guards = Vec::with_capacity(slots.len());
        for idx in slots {
            guards.push(self.slots[idx].read());
        }
        MultiReadGuard { guards }
    }
}

/// Held write locks for a set of keys, in ascending-slot acquisition
/// order. Dropped in reverse (last-acquired-first), matching §4.C.
pub struct MultiWriteGuard<'a> {
    guards: Vec<RwLockWriteGuard<'a, ()>>,
}

impl<'a> Drop for MultiWriteGuard<'a> {
    fn drop(&mut self) {
        while self.guards.pop().is_some() {}
    }
}

pub struct MultiReadGuard<'a> {
    guards: Vec<RwLockReadGuard<'a, ()>>,
}

impl<'a> Drop for MultiReadGuard<'a> {
    fn drop(&mut self) {
        while self.guards.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_count_rounds_to_power_of_two() {
        let lm = LockManager::new(100);
        assert_eq!(lm.slot_count(), 128);
    }

    #[test]
    fn dedupes_keys_landing_on_same_slot() {
        let lm = LockManager::new(4);
        // With only 4 slots, many keys alias; this must not deadlock by
        // trying to lock the same slot twice.
        let keys: Vec<Bytes> = (0..20).map(|i| Bytes::from(i.to_string())).collect();
        let _guard = lm.lock_keys(&keys);
    }

    #[test]
    fn disjoint_keys_can_be_locked_concurrently() {
        let lm = LockManager::new(1024);
        let a = vec![Bytes::from_static(b"a")];
        let b = vec![Bytes::from_static(b"b")];
        let _ga = lm.lock_keys(&a);
        // Different key, almost certainly a different slot at N=1024; if it
        // collided this would deadlock the test (acceptable flake risk at
        // this N, mirrors the probabilistic nature of hashed striping).
        let _gb = lm.rlock_keys(&b);
    }
}
