//! Capacity-bounded keyed store with insertion-order eviction.
//!
//! Overwriting a key keeps its original insertion position, so a token that
//! updates constantly is still evicted before tokens first seen after it.

use std::borrow::Borrow;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    generation: u64,
}

/// Bounded map evicting the oldest-inserted key on overflow.
#[derive(Debug, Clone)]
pub struct InsertionOrderCache<K, V> {
    capacity: usize,
    entries: HashMap<K, Slot<V>>,
    order: VecDeque<(K, u64)>,
    next_generation: u64,
}

impl<K, V> InsertionOrderCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            next_generation: 0,
        }
    }

    /// Insert or overwrite. Returns the entries evicted to stay within capacity.
    pub fn insert(&mut self, key: K, value: V) -> Vec<(K, V)> {
        if let Some(slot) = self.entries.get_mut(&key) {
            slot.value = value;
            return Vec::new();
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.entries.insert(key.clone(), Slot { value, generation });
        self.order.push_back((key, generation));

        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            let Some((old_key, old_generation)) = self.order.pop_front() else {
                break;
            };
            let current = self
                .entries
                .get(&old_key)
                .is_some_and(|slot| slot.generation == old_generation);
            if current {
                if let Some(slot) = self.entries.remove(&old_key) {
                    evicted.push((old_key, slot.value));
                }
            }
        }
        self.compact();
        evicted
    }

    /// Get a value.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).map(|slot| &slot.value)
    }

    /// Get a mutable value without touching insertion order.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get_mut(key).map(|slot| &mut slot.value)
    }

    /// Whether the key is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Remove a key.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let value = self.entries.remove(key).map(|slot| slot.value);
        self.compact();
        value
    }

    /// Remove every entry matching `predicate`, returning them.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&K, &V) -> bool) -> Vec<(K, V)> {
        let doomed: Vec<K> = self
            .entries
            .iter()
            .filter(|(k, slot)| predicate(k, &slot.value))
            .map(|(k, _)| k.clone())
            .collect();

        let removed = doomed
            .into_iter()
            .filter_map(|k| self.entries.remove(&k).map(|slot| (k, slot.value)))
            .collect();
        self.compact();
        removed
    }

    /// Iterate entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, slot)| (k, &slot.value))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop order records of removed keys once they dominate the queue.
    fn compact(&mut self) {
        if self.order.len() > self.entries.len() * 2 + 64 {
            let entries = &self.entries;
            self.order.retain(|(k, generation)| {
                entries.get(k).is_some_and(|slot| slot.generation == *generation)
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_inserted_first() {
        let mut cache = InsertionOrderCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        let evicted = cache.insert("c", 3);

        assert_eq!(evicted, vec![("a", 1)]);
        assert!(!cache.contains_key(&"a"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn overwrite_keeps_insertion_position() {
        let mut cache = InsertionOrderCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        // Not LRU: refreshing "a" does not protect it.
        cache.insert("a", 10);
        let evicted = cache.insert("c", 3);

        assert_eq!(evicted, vec![("a", 10)]);
        assert_eq!(cache.get(&"b"), Some(&2));
    }

    #[test]
    fn reinserted_key_goes_to_the_back() {
        let mut cache = InsertionOrderCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.remove(&"a");
        cache.insert("a", 3);
        let evicted = cache.insert("c", 4);

        assert_eq!(evicted, vec![("b", 2)]);
        assert_eq!(cache.get(&"a"), Some(&3));
    }

    #[test]
    fn remove_where_filters_entries() {
        let mut cache = InsertionOrderCache::new(10);
        for (k, v) in [("a", 1), ("b", 5), ("c", 9)] {
            cache.insert(k, v);
        }
        let mut removed = cache.remove_where(|_, v| *v > 4);
        removed.sort();

        assert_eq!(removed, vec![("b", 5), ("c", 9)]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn order_queue_stays_bounded_under_churn() {
        let mut cache = InsertionOrderCache::new(4);
        for i in 0..1_000 {
            cache.insert(i % 8, i);
            cache.remove(&(i % 8));
        }
        assert!(cache.order.len() <= 64 + 1);
    }
}
