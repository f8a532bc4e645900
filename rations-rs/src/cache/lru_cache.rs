use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use linked_hash_map::LinkedHashMap;

use crate::cache::Clock;

/// Represents a value along with the point in time it was stored.
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    /// The cached value.
    pub value: V,

    /// The monotonic instant at which the value was put into the cache. This is what all TTL
    /// checks are based on.
    pub computed_at: Instant,

    /// The wall clock time at which the value was put into the cache. Only used for reporting.
    pub timestamp: DateTime<Utc>,
}

/// Provides a size constrained LRU cache with a time to live.
///
/// A cache behaves just like a **Map** as long as there is no shortage in storage. However, once
/// the max number of entries is exceeded, old (least recently used) entries will be evicted -
/// hence the name LRU cache.
///
/// In contrast to most caches, **get** ignores the TTL entirely. An expired entry is still handed
/// out so that the caller can decide whether to use it as a fallback. Use **is_fresh** to check
/// whether an entry is still within its TTL.
///
/// # Examples
/// ```
/// # use rations::cache::{LRUCache, ManualClock};
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// let clock = Arc::new(ManualClock::new());
///
/// // Specifies a cache which can store up to 2 entries which are considered fresh for 1m.
/// let mut lru = LRUCache::new(2, Duration::from_secs(60), clock.clone());
///
/// lru.put("2025-09-17".to_owned(), "Pancakes".to_owned());
/// let entry = lru.get("2025-09-17").unwrap();
/// assert_eq!(entry.value, "Pancakes");
/// assert_eq!(lru.is_fresh(&entry), true);
///
/// // Once the TTL has passed, the entry is still there but no longer fresh...
/// clock.advance(Duration::from_secs(61));
/// let entry = lru.get("2025-09-17").unwrap();
/// assert_eq!(lru.is_fresh(&entry), false);
///```
pub struct LRUCache<V> {
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    reads: usize,
    hits: usize,
    writes: usize,
    map: LinkedHashMap<String, CacheEntry<V>>,
}

impl<V: Clone> LRUCache<V> {
    /// Creates a new cache which can store up to **capacity** entries, each being fresh for
    /// **ttl** as measured by the given clock.
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        LRUCache {
            capacity,
            ttl,
            clock,
            reads: 0,
            hits: 0,
            writes: 0,
            map: LinkedHashMap::with_capacity(capacity),
        }
    }

    /// Stores the given value for the given key.
    ///
    /// The entry is stamped with the current time and becomes the most recently used one. If
    /// this pushes the cache beyond its capacity, the least recently used entries are evicted.
    /// Returns the entry as stored.
    pub fn put(&mut self, key: String, value: V) -> CacheEntry<V> {
        let entry = CacheEntry {
            value,
            computed_at: self.clock.now(),
            timestamp: self.clock.wall_time(),
        };

        let _ = self.map.insert(key, entry.clone());
        self.writes += 1;
        self.enforce_constraints();

        entry
    }

    fn enforce_constraints(&mut self) {
        while self.map.len() > self.capacity {
            match self.map.pop_front() {
                Some((key, _)) => log::debug!("Evicting least recently used entry {}...", key),
                None => break,
            }
        }
    }

    /// Returns the entry which has previously been stored for the given key or **None** if
    /// no value is present.
    ///
    /// The entry is returned no matter how old it is and will be marked as most recently used.
    pub fn get(&mut self, key: &str) -> Option<CacheEntry<V>> {
        self.reads += 1;

        match self.map.get_refresh(key) {
            Some(entry) => {
                self.hits += 1;
                Some(entry.clone())
            }
            None => None,
        }
    }

    /// Determines if the given entry is younger than the TTL of this cache.
    pub fn is_fresh(&self, entry: &CacheEntry<V>) -> bool {
        self.clock.now().saturating_duration_since(entry.computed_at) < self.ttl
    }

    /// Returns how long ago the given entry was stored.
    pub fn age(&self, entry: &CacheEntry<V>) -> Duration {
        self.clock.now().saturating_duration_since(entry.computed_at)
    }

    /// Removes all entries in this cache.
    ///
    /// Note that this will also zero all metrics (reads, writes, cache hits).
    pub fn flush(&mut self) {
        self.map.clear();
        self.reads = 0;
        self.writes = 0;
        self.hits = 0;
    }

    /// Returns the number of entries in the cache, fresh or not.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Determines if the cache is completely empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates over all entries, starting with the least recently used one.
    ///
    /// This doesn't count as a read and doesn't change the eviction order.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &CacheEntry<V>)> {
        self.map.iter()
    }

    /// Returns the overall capacity (max number of entries) of this cache.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the maximal number of entries permitted in this cache.
    ///
    /// Shrinking the capacity immediately evicts the least recently used entries.
    pub fn set_capacity(&mut self, capacity: usize) {
        let previous_capacity = self.capacity;
        self.capacity = capacity;
        if previous_capacity > self.capacity {
            self.enforce_constraints();
        }
    }

    /// Returns the time to live after which an entry is no longer considered fresh.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Specifies the time to live.
    ///
    /// As entries only store the time they were computed at, this applies to existing entries
    /// right away.
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    /// Returns the cache hit rate in percent.
    ///
    /// Note that all metrics are reset when **flush()** is called.
    pub fn hit_rate(&self) -> f32 {
        match self.reads {
            0 => 0.,
            n => self.hits as f32 / n as f32 * 100.,
        }
    }

    /// Returns the total number of reads performed on this cache since the last flush.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Returns the total number of writes performed on this cache since the last flush.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::{LRUCache, ManualClock};
    use std::sync::Arc;
    use std::time::Duration;

    fn cache(capacity: usize, clock: Arc<ManualClock>) -> LRUCache<String> {
        LRUCache::new(capacity, Duration::from_secs(30 * 60), clock)
    }

    fn value(lru: &mut LRUCache<String>, key: &str) -> Option<String> {
        lru.get(key).map(|entry| entry.value)
    }

    #[test]
    fn capacity_is_enforced() {
        let mut lru = cache(4, Arc::new(ManualClock::new()));

        // We expect 4 entries to fully fit in the cache....
        let _ = lru.put("2025-09-01".to_owned(), "A".to_owned());
        let _ = lru.put("2025-09-02".to_owned(), "B".to_owned());
        let _ = lru.put("2025-09-03".to_owned(), "C".to_owned());
        let _ = lru.put("2025-09-04".to_owned(), "D".to_owned());
        assert_eq!(lru.len(), 4);

        // Now if another entry is added, the least recently inserted one is dropped...
        let _ = lru.put("2025-09-05".to_owned(), "E".to_owned());
        assert_eq!(lru.len(), 4);
        assert_eq!(value(&mut lru, "2025-09-01"), None);
        assert_eq!(value(&mut lru, "2025-09-02").unwrap(), "B");

        // "2025-09-02" was just read and is therefore saved, so "2025-09-03" goes next...
        let _ = lru.put("2025-09-06".to_owned(), "F".to_owned());
        assert_eq!(value(&mut lru, "2025-09-02").unwrap(), "B");
        assert_eq!(value(&mut lru, "2025-09-03"), None);
        assert_eq!(value(&mut lru, "2025-09-04").unwrap(), "D");
        assert_eq!(lru.len(), 4);
    }

    #[test]
    fn replacing_an_entry_marks_it_as_recently_used() {
        let mut lru = cache(2, Arc::new(ManualClock::new()));

        let _ = lru.put("a".to_owned(), "1".to_owned());
        let _ = lru.put("b".to_owned(), "2".to_owned());
        let _ = lru.put("a".to_owned(), "3".to_owned());
        assert_eq!(lru.len(), 2);

        let _ = lru.put("c".to_owned(), "4".to_owned());
        assert_eq!(value(&mut lru, "b"), None);
        assert_eq!(value(&mut lru, "a").unwrap(), "3");
        assert_eq!(value(&mut lru, "c").unwrap(), "4");
    }

    #[test]
    fn shrinking_capacity_evicts_oldest_entries() {
        let mut lru = cache(8, Arc::new(ManualClock::new()));
        for day in 1..=6 {
            let _ = lru.put(format!("2025-09-0{}", day), day.to_string());
        }
        assert_eq!(lru.len(), 6);

        lru.set_capacity(3);
        assert_eq!(lru.capacity(), 3);
        assert_eq!(lru.len(), 3);
        assert_eq!(
            lru.entries().map(|(key, _)| key.as_str()).collect::<Vec<_>>(),
            vec!["2025-09-04", "2025-09-05", "2025-09-06"]
        );
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut lru = cache(0, Arc::new(ManualClock::new()));
        let _ = lru.put("a".to_owned(), "1".to_owned());
        assert_eq!(lru.is_empty(), true);
    }

    #[test]
    fn expired_entries_remain_available() {
        let clock = Arc::new(ManualClock::new());
        let mut lru = cache(4, clock.clone());

        let _ = lru.put("2025-09-17".to_owned(), "Menu".to_owned());
        let entry = lru.get("2025-09-17").unwrap();
        assert_eq!(lru.is_fresh(&entry), true);

        clock.advance(Duration::from_secs(29 * 60));
        assert_eq!(lru.is_fresh(&entry), true);

        clock.advance(Duration::from_secs(60));
        assert_eq!(lru.is_fresh(&entry), false);
        assert_eq!(lru.age(&entry), Duration::from_secs(30 * 60));

        // The stale entry is still handed out...
        let stale = lru.get("2025-09-17").unwrap();
        assert_eq!(stale.value, "Menu");
        assert_eq!(lru.is_fresh(&stale), false);

        // ...until it is replaced by a new one.
        let _ = lru.put("2025-09-17".to_owned(), "Menu 2".to_owned());
        let fresh = lru.get("2025-09-17").unwrap();
        assert_eq!(fresh.value, "Menu 2");
        assert_eq!(lru.is_fresh(&fresh), true);
    }

    #[test]
    fn changing_the_ttl_applies_to_existing_entries() {
        let clock = Arc::new(ManualClock::new());
        let mut lru = cache(4, clock.clone());

        let entry = lru.put("2025-09-17".to_owned(), "Menu".to_owned());
        clock.advance(Duration::from_secs(10 * 60));
        assert_eq!(lru.is_fresh(&entry), true);

        lru.set_ttl(Duration::from_secs(5 * 60));
        assert_eq!(lru.is_fresh(&entry), false);
    }

    #[test]
    fn metrics_are_computed_correctly() {
        let mut lru = cache(4, Arc::new(ManualClock::new()));

        let _ = lru.put("A".to_owned(), "A".to_owned());
        let _ = lru.put("B".to_owned(), "B".to_owned());
        let _ = lru.put("C".to_owned(), "C".to_owned());

        // Perform 4 reads, of which 3 hit a cache entry...
        assert_eq!(lru.get("A").is_some(), true);
        assert_eq!(lru.get("B").is_some(), true);
        assert_eq!(lru.get("C").is_some(), true);
        assert_eq!(lru.get("D").is_none(), true);

        assert_eq!(lru.writes(), 3);
        assert_eq!(lru.reads(), 4);
        assert_eq!(lru.hit_rate().round() as i32, 75);

        lru.flush();
        assert_eq!(lru.len(), 0);
        assert_eq!(lru.reads(), 0);
        assert_eq!(lru.hit_rate().round() as i32, 0);
    }
}
