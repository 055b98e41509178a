//! Insertion-ordered map with unique keys.
//!
//! Used for every keyed collection in a pass (column specs, existing rows,
//! received transactions) so that iteration order is deterministic and
//! equals arrival order.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::ops::Index;

/// A map that remembers first-insertion order and never overwrites.
///
/// Lookup is O(1) both by key and by insertion index.
#[derive(Debug, Clone)]
pub struct IndexedMap<K, V> {
    entries: Vec<(K, V)>,
    positions: HashMap<K, usize>,
}

impl<K, V> Default for IndexedMap<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V> IndexedMap<K, V> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
        }
    }

    /// Add an entry unless the key is already present.
    ///
    /// Returns `false` (and leaves the existing entry untouched) on a
    /// duplicate key.
    pub fn try_add(&mut self, key: K, value: V) -> bool {
        if self.positions.contains_key(&key) {
            return false;
        }
        self.positions.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        true
    }

    /// Check if a key is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.positions.contains_key(key)
    }

    /// Get a value by key.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.positions.get(key).map(|&i| &self.entries[i].1)
    }

    /// Get a mutable value by key.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let i = *self.positions.get(key)?;
        Some(&mut self.entries[i].1)
    }

    /// Insertion index of a key.
    pub fn position<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.positions.get(key).copied()
    }
}

impl<K, V> IndexedMap<K, V> {
    /// Get a value by insertion index.
    pub fn get_index(&self, index: usize) -> Option<&V> {
        self.entries.get(index).map(|(_, v)| v)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Key/value pairs in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl<K, V> Index<usize> for IndexedMap<K, V> {
    type Output = V;

    fn index(&self, index: usize) -> &V {
        match self.entries.get(index) {
            Some((_, v)) => v,
            None => panic!(
                "IndexedMap index {index} out of bounds (length {})",
                self.entries.len()
            ),
        }
    }
}

impl<'a, K, V> IntoIterator for &'a IndexedMap<K, V> {
    type Item = &'a V;
    type IntoIter = std::iter::Map<std::slice::Iter<'a, (K, V)>, fn(&'a (K, V)) -> &'a V>;

    fn into_iter(self) -> Self::IntoIter {
        fn value<K, V>(entry: &(K, V)) -> &V {
            &entry.1
        }
        self.entries.iter().map(value as fn(&'a (K, V)) -> &'a V)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let mut map = IndexedMap::new();
        assert!(map.try_add(30, "c"));
        assert!(map.try_add(10, "a"));
        assert!(map.try_add(20, "b"));

        let values: Vec<_> = map.iter().copied().collect();
        assert_eq!(values, vec!["c", "a", "b"]);
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![30, 10, 20]);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn duplicate_key_is_rejected_without_overwrite() {
        let mut map = IndexedMap::new();
        assert!(map.try_add("id", 1));
        assert!(!map.try_add("id", 2));

        assert_eq!(map.get("id"), Some(&1));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn lookup_by_key_and_index() {
        let mut map: IndexedMap<String, u32> = IndexedMap::new();
        map.try_add("first".to_string(), 1);
        map.try_add("second".to_string(), 2);

        assert!(map.contains_key("second"));
        assert!(!map.contains_key("third"));
        assert_eq!(map.get("second"), Some(&2));
        assert_eq!(map.position("second"), Some(1));
        assert_eq!(map.get_index(0), Some(&1));
        assert_eq!(map.get_index(2), None);
        assert_eq!(map[1], 2);
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut map = IndexedMap::new();
        map.try_add(7, vec![1]);
        map.get_mut(&7).unwrap().push(2);
        assert_eq!(map.get(&7), Some(&vec![1, 2]));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn index_out_of_bounds_panics() {
        let map: IndexedMap<u8, u8> = IndexedMap::new();
        let _ = map[0];
    }

    #[test]
    fn for_loop_yields_values() {
        let mut map = IndexedMap::new();
        map.try_add('x', 1);
        map.try_add('y', 2);
        let mut sum = 0;
        for v in &map {
            sum += v;
        }
        assert_eq!(sum, 3);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_order_is_first_insertion(keys in proptest::collection::vec(0u8..20, 0..60)) {
                let mut map = IndexedMap::new();
                let mut expected = Vec::new();
                for (i, k) in keys.iter().enumerate() {
                    let added = map.try_add(*k, i);
                    prop_assert_eq!(added, !expected.contains(k));
                    if added {
                        expected.push(*k);
                    }
                }

                prop_assert_eq!(map.keys().copied().collect::<Vec<_>>(), expected.clone());
                for (i, k) in expected.iter().enumerate() {
                    prop_assert_eq!(map.position(k), Some(i));
                }
            }
        }
    }
}
