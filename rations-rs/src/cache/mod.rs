//! Keeps the most recently computed menu snapshots in memory.
//!
//! The [MenuCache] is keyed by date (`YYYY-MM-DD`) and bounded in two ways: a max number of
//! entries (least recently used ones are evicted first) and a TTL after which an entry is no
//! longer considered fresh. Expired entries are kept around nonetheless, as they serve as
//! *stale fallback* if re-computing a snapshot fails.
//!
//! All operations acquire a single lock which is only held while the underlying map is read or
//! modified. Computing a snapshot happens outside of the cache, so that requests for different
//! dates never block each other while waiting for the upstream API.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::fmt::format_duration;
use crate::menu::MenuSnapshot;

mod clock;
mod lru_cache;

pub use clock::{Clock, ManualClock, SystemClock};
pub use lru_cache::{CacheEntry, LRUCache};

/// A cached snapshot along with its computation time.
pub type MenuEntry = CacheEntry<Arc<MenuSnapshot>>;

/// Stores menu snapshots per date.
pub struct MenuCache {
    lru: Mutex<LRUCache<Arc<MenuSnapshot>>>,
}

/// Reports the state of a [MenuCache].
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CacheStatus {
    /// The max number of dates being cached.
    pub capacity: usize,
    /// The TTL, formatted like "30m".
    pub ttl: String,
    /// The number of reads since the last flush.
    pub reads: usize,
    /// The number of writes since the last flush.
    pub writes: usize,
    /// The percentage of reads which found an entry.
    pub hit_rate: f32,
    /// All cached dates, the most recently used one last.
    pub entries: Vec<CachedDate>,
}

/// Describes a single cached snapshot.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CachedDate {
    /// The date as `YYYY-MM-DD`.
    pub date: String,
    /// The wall clock time the snapshot was computed.
    pub computed_at: DateTime<Utc>,
    /// The age of the snapshot, formatted like "12m 5s".
    pub age: String,
    /// Determines if the snapshot is still within the TTL.
    pub fresh: bool,
    /// The number of halls serving anything.
    pub halls: usize,
    /// The total number of foods.
    pub foods: usize,
}

impl MenuCache {
    /// Creates an empty cache.
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        MenuCache {
            lru: Mutex::new(LRUCache::new(capacity, ttl, clock)),
        }
    }

    // Every operation on the map is a single call, so a poisoned lock still guards a valid map.
    fn lock(&self) -> MutexGuard<'_, LRUCache<Arc<MenuSnapshot>>> {
        self.lru.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the entry for the given date, no matter if it is still fresh.
    pub fn get(&self, date: &str) -> Option<MenuEntry> {
        self.lock().get(date)
    }

    /// Stores the snapshot of the given date, stamped with the current time.
    pub fn put(&self, date: &str, snapshot: MenuSnapshot) -> MenuEntry {
        self.lock().put(date.to_owned(), Arc::new(snapshot))
    }

    /// Determines if the given entry is still within its TTL.
    pub fn is_fresh(&self, entry: &MenuEntry) -> bool {
        self.lock().is_fresh(entry)
    }

    /// Drops all entries and resets the metrics.
    pub fn flush(&self) {
        self.lock().flush();
    }

    /// Returns the number of cached dates.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Determines if no date is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies a new capacity and TTL.
    ///
    /// Shrinking the capacity evicts the least recently used entries right away. A new TTL
    /// applies to all entries, including the ones already present.
    pub fn reconfigure(&self, capacity: usize, ttl: Duration) {
        let mut lru = self.lock();
        if lru.capacity() != capacity {
            log::info!(
                "Changing the capacity of the menu cache from {} to {}.",
                lru.capacity(),
                capacity
            );
            lru.set_capacity(capacity);
        }
        if lru.ttl() != ttl {
            log::info!(
                "Changing the TTL of the menu cache from {} to {}.",
                format_duration(lru.ttl()),
                format_duration(ttl)
            );
            lru.set_ttl(ttl);
        }
    }

    /// Reports capacity, metrics and all cached dates.
    pub fn status(&self) -> CacheStatus {
        let lru = self.lock();
        let entries = lru
            .entries()
            .map(|(date, entry)| CachedDate {
                date: date.clone(),
                computed_at: entry.timestamp,
                age: format_duration(lru.age(entry)),
                fresh: lru.is_fresh(entry),
                halls: entry.value.halls().count(),
                foods: entry.value.food_count(),
            })
            .collect();

        CacheStatus {
            capacity: lru.capacity(),
            ttl: format_duration(lru.ttl()),
            reads: lru.reads(),
            writes: lru.writes(),
            hit_rate: lru.hit_rate(),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::{ManualClock, MenuCache};
    use crate::menu::{FoodItem, Meal, MenuSnapshot, StationMap};
    use std::sync::Arc;
    use std::time::Duration;

    fn snapshot(food: &str) -> MenuSnapshot {
        let mut stations = StationMap::new();
        let _ = stations.insert(
            "Grill".to_owned(),
            vec![FoodItem {
                id: 1,
                name: food.to_owned(),
                meal: Meal::Lunch,
            }],
        );

        let mut snapshot = MenuSnapshot::new();
        let _ = snapshot.insert("Burge", Meal::Lunch, stations);
        snapshot
    }

    #[test]
    fn status_reports_age_and_freshness() {
        let clock = Arc::new(ManualClock::new());
        let cache = MenuCache::new(4, Duration::from_secs(30 * 60), clock.clone());

        let _ = cache.put("2025-09-16", snapshot("Tacos"));
        clock.advance(Duration::from_secs(31 * 60));
        let _ = cache.put("2025-09-17", snapshot("Pizza"));
        let _ = cache.get("2025-09-16");

        let status = cache.status();
        assert_eq!(status.capacity, 4);
        assert_eq!(status.ttl, "30m");
        assert_eq!(status.reads, 1);
        assert_eq!(status.writes, 2);
        assert_eq!(
            status
                .entries
                .iter()
                .map(|entry| (entry.date.as_str(), entry.fresh, entry.age.as_str()))
                .collect::<Vec<_>>(),
            vec![("2025-09-17", true, "0ms"), ("2025-09-16", false, "31m")]
        );
        assert_eq!(status.entries[0].foods, 1);
    }

    #[test]
    fn reconfiguring_evicts_and_changes_freshness() {
        let clock = Arc::new(ManualClock::new());
        let cache = MenuCache::new(3, Duration::from_secs(30 * 60), clock.clone());
        for day in ["2025-09-15", "2025-09-16", "2025-09-17"] {
            let _ = cache.put(day, snapshot("Soup"));
        }

        clock.advance(Duration::from_secs(10 * 60));
        cache.reconfigure(2, Duration::from_secs(5 * 60));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("2025-09-15").is_none(), true);

        let entry = cache.get("2025-09-17").unwrap();
        assert_eq!(cache.is_fresh(&entry), false);
        assert_eq!(entry.value.food_count(), 1);
    }

    #[test]
    fn concurrent_puts_respect_the_capacity() {
        let cache = Arc::new(MenuCache::new(
            8,
            Duration::from_secs(60),
            Arc::new(ManualClock::new()),
        ));

        std::thread::scope(|scope| {
            for thread in 0..8 {
                let cache = cache.clone();
                let _ = scope.spawn(move || {
                    for day in 1..=28 {
                        let date = format!("2025-02-{:02}", day);
                        let _ = cache.put(&date, snapshot(&format!("Stew {}", thread)));
                        let _ = cache.get(&date);
                        assert_eq!(cache.len() <= 8, true);
                    }
                });
            }
        });

        assert_eq!(cache.len(), 8);
        assert_eq!(cache.status().writes, 8 * 28);
    }

    #[test]
    fn flush_drops_everything() {
        let cache = MenuCache::new(4, Duration::from_secs(60), Arc::new(ManualClock::new()));
        let _ = cache.put("2025-09-17", snapshot("Chili"));

        cache.flush();
        assert_eq!(cache.is_empty(), true);
        assert_eq!(cache.status().writes, 0);
    }
}
