use super::tree::CompiledTree;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct Entry {
    tree: Arc<CompiledTree>,
    touched_at: Instant,
    tick: u64,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    /// Access order, oldest first.
    order: BTreeMap<u64, String>,
    tick: u64,
}

impl State {
    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.tick);
        Some(entry)
    }

    fn touch(&mut self, key: &str) {
        self.tick += 1;
        let tick = self.tick;
        if let Some(entry) = self.entries.get_mut(key) {
            self.order.remove(&entry.tick);
            entry.tick = tick;
            entry.touched_at = Instant::now();
            self.order.insert(tick, key.to_string());
        }
    }
}

/// Compiled trees keyed by source name, bounded by count and idle time.
pub(crate) struct TreeCache {
    capacity: usize,
    ttl: Duration,
    state: Mutex<State>,
}

impl TreeCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Arc<CompiledTree>> {
        let mut state = self.lock();
        let expired = state.entries.get(key)?.touched_at.elapsed() > self.ttl;
        if expired {
            state.remove(key);
            return None;
        }
        state.touch(key);
        state.entries.get(key).map(|e| Arc::clone(&e.tree))
    }

    pub fn insert(&self, key: &str, tree: Arc<CompiledTree>) {
        let mut state = self.lock();
        state.remove(key);
        state.entries.insert(
            key.to_string(),
            Entry {
                tree,
                touched_at: Instant::now(),
                tick: 0,
            },
        );
        state.touch(key);

        while state.entries.len() > self.capacity {
            let Some((_, oldest)) = state.order.pop_first() else {
                break;
            };
            state.entries.remove(&oldest);
        }
    }

    pub fn remove(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
    }

    /// Live trees, oldest access first.
    pub fn values(&self) -> Vec<Arc<CompiledTree>> {
        let state = self.lock();
        state
            .order
            .values()
            .filter_map(|key| state.entries.get(key))
            .filter(|e| e.touched_at.elapsed() <= self.ttl)
            .map(|e| Arc::clone(&e.tree))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groovyscope_api::Phase;

    fn tree(name: &str) -> Arc<CompiledTree> {
        Arc::new(CompiledTree::new(name, 0, Phase::Parse))
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = TreeCache::new(2, Duration::from_secs(60));
        cache.insert("a", tree("a"));
        cache.insert("b", tree("b"));
        assert!(cache.get("a").is_some());
        cache.insert("c", tree("c"));

        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = TreeCache::new(4, Duration::ZERO);
        cache.insert("a", tree("a"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("a").is_none());
        assert!(cache.values().is_empty());
    }

    #[test]
    fn test_reinsert_replaces() {
        let cache = TreeCache::new(4, Duration::from_secs(60));
        cache.insert("a", tree("a"));
        let newer = tree("a");
        cache.insert("a", Arc::clone(&newer));
        assert!(Arc::ptr_eq(&cache.get("a").unwrap(), &newer));
        assert_eq!(cache.values().len(), 1);

        cache.remove("a");
        assert!(cache.get("a").is_none());
    }
}
