//! TTL index and active-expiration sweeper (§4.B).

use crate::dict::ShardedMap;
use bytes::Bytes;
use rand::thread_rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct TtlIndex {
    map: ShardedMap<Bytes, Instant>,
}

impl TtlIndex {
    pub fn new(shard_count: usize) -> Self {
        TtlIndex {
            map: ShardedMap::new(shard_count),
        }
    }

    pub fn get(&self, key: &Bytes) -> Option<Instant> {
        self.map.get(key)
    }

    pub fn put(&self, key: Bytes, at: Instant) {
        self.map.put(key, at);
    }

    pub fn remove(&self, key: &Bytes) -> bool {
        self.map.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    pub fn is_expired_at(key: &Bytes, when: Instant, now: Instant) -> bool {
        let _ = key;
        when <= now
    }

    /// Samples up to `count` keys from one random shard, for the sweeper.
    pub fn sample(&self, count: usize) -> Vec<(Bytes, Instant)> {
        let mut rng = thread_rng();
        self.map.sample_one_shard(&mut rng, count)
    }
}

/// Configuration for the background active-expiration sweeper (§4.B
/// defaults: 100ms cadence, 20 keys sampled per tick).
#[derive(Clone, Copy, Debug)]
pub struct SweeperConfig {
    pub interval: Duration,
    pub sample_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        SweeperConfig {
            interval: Duration::from_millis(100),
            sample_size: 20,
        }
    }
}

/// Runs forever, evicting expired keys on a timer. `evict` is called with
/// each observed-expired key and is expected to remove both the entity and
/// the TTL entry atomically (under that key's write lock) — see
/// `Db::evict_if_expired`.
pub async fn run_sweeper<F>(ttl: Arc<TtlIndex>, config: SweeperConfig, evict: F)
where
    F: Fn(&Bytes),
{
    let mut ticker = tokio::time::interval(config.interval);
    loop {
        ticker.tick().await;
        let now = Instant::now();
        let sample = ttl.sample(config.sample_size);
        for (key, at) in sample {
            if TtlIndex::is_expired_at(&key, at, now) {
                evict(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove_roundtrip() {
        let ttl = TtlIndex::new(4);
        let key = Bytes::from_static(b"k");
        let at = Instant::now() + Duration::from_secs(10);
        ttl.put(key.clone(), at);
        assert_eq!(ttl.get(&key), Some(at));
        assert!(ttl.remove(&key));
        assert_eq!(ttl.get(&key), None);
    }

    #[test]
    fn expiry_check_is_inclusive_of_now() {
        let now = Instant::now();
        assert!(TtlIndex::is_expired_at(&Bytes::from_static(b"k"), now, now));
        assert!(!TtlIndex::is_expired_at(
            &Bytes::from_static(b"k"),
            now + Duration::from_secs(1),
            now
        ));
    }

    #[tokio::test]
    async fn sweeper_evicts_expired_keys() {
        let ttl = Arc::new(TtlIndex::new(4));
        let key = Bytes::from_static(b"expiring");
        ttl.put(key.clone(), Instant::now());

        let evicted = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let evicted2 = evicted.clone();
        let ttl2 = ttl.clone();
        let handle = tokio::spawn(async move {
            run_sweeper(
                ttl2,
                SweeperConfig {
                    interval: Duration::from_millis(5),
                    sample_size: 20,
                },
                move |k| evicted2.lock().push(k.clone()),
            )
            .await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        assert!(evicted.lock().contains(&key));
    }
}
