//! Bounded in-process `Info` cache, sitting in front of the configured
//! info-cache backend to absorb the common case of many requests against
//! the same handful of sources.

use isrv_core::{Identifier, Info};
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A fixed-capacity, insertion-order-evicted cache of [`Info`] records.
///
/// Eviction is FIFO rather than strict LRU: the oldest *inserted* entry is
/// dropped once capacity is exceeded, regardless of how recently it was
/// read. This keeps the implementation a single mutex with no per-read
/// bookkeeping, which matters because `get` is on every image request's hot
/// path.
pub struct HeapInfoCache {
    target_size: usize,
    state: Mutex<State>,
}

struct State {
    entries: HashMap<String, Info>,
    order: VecDeque<String>,
}

impl HeapInfoCache {
    /// Construct a cache holding at most `target_size` entries. A
    /// `target_size` of `0` disables retention: every `put` is immediately
    /// evicted.
    pub fn new(target_size: usize) -> Self {
        Self {
            target_size,
            state: Mutex::new(State { entries: HashMap::new(), order: VecDeque::new() }),
        }
    }

    /// Look up a cached [`Info`] without touching recency (see struct docs).
    pub fn get(&self, identifier: &Identifier) -> Option<Info> {
        self.state
            .lock()
            .expect("heap info cache lock poisoned")
            .entries
            .get(identifier.as_str())
            .cloned()
    }

    /// Insert or overwrite a cached [`Info`], evicting the oldest entry if
    /// this insertion would exceed `target_size`.
    pub fn put(&self, identifier: &Identifier, info: Info) {
        if self.target_size == 0 {
            return;
        }
        let mut guard = self.state.lock().expect("heap info cache lock poisoned");
        let key = identifier.as_str().to_string();
        if !guard.entries.contains_key(&key) {
            guard.order.push_back(key.clone());
        }
        guard.entries.insert(key, info);

        while guard.entries.len() > self.target_size {
            if let Some(oldest) = guard.order.pop_front() {
                guard.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }

    /// Remove a cached entry, if present.
    pub fn purge(&self, identifier: &Identifier) {
        let mut guard = self.state.lock().expect("heap info cache lock poisoned");
        guard.entries.remove(identifier.as_str());
        guard.order.retain(|k| k != identifier.as_str());
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.state.lock().expect("heap info cache lock poisoned").entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get() {
        let cache = HeapInfoCache::new(10);
        let id = Identifier::new("x");
        cache.put(&id, Info::flat("x", 800, 600, "jpg"));
        assert!(cache.get(&id).is_some());
    }

    #[test]
    fn evicts_oldest_when_over_capacity() {
        let cache = HeapInfoCache::new(2);
        for name in ["a", "b", "c"] {
            cache.put(&Identifier::new(name), Info::flat(name, 1, 1, "jpg"));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&Identifier::new("a")).is_none());
        assert!(cache.get(&Identifier::new("b")).is_some());
        assert!(cache.get(&Identifier::new("c")).is_some());
    }

    #[test]
    fn zero_target_size_retains_nothing() {
        let cache = HeapInfoCache::new(0);
        cache.put(&Identifier::new("x"), Info::flat("x", 1, 1, "jpg"));
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_removes_entry() {
        let cache = HeapInfoCache::new(10);
        let id = Identifier::new("x");
        cache.put(&id, Info::flat("x", 1, 1, "jpg"));
        cache.purge(&id);
        assert!(cache.get(&id).is_none());
    }

    #[test]
    fn overwriting_existing_key_does_not_duplicate_order_entry() {
        let cache = HeapInfoCache::new(2);
        let id = Identifier::new("a");
        cache.put(&id, Info::flat("a", 1, 1, "jpg"));
        cache.put(&id, Info::flat("a", 2, 2, "jpg"));
        cache.put(&Identifier::new("b"), Info::flat("b", 1, 1, "jpg"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&id).is_some());
    }
}
