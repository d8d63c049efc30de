//! Open-hash collections whose chain links live in a per-collection side table.
//!
//! Every element of a collection is an arena key. The collection stores one
//! [`Link`] per member (the element's key and the next element of its bucket),
//! so an element belongs to a given collection at most once and membership
//! costs a fixed amount of memory no matter how many relations exist.

use slotmap::{Key, SecondaryMap};

use crate::layer::LayerMask;
use crate::name::Name;

/// A key that can index an intrusive collection.
pub trait IntrusiveKey: Copy + Eq {
    /// A hash of this key. Need not be uniformly distributed.
    fn hash_key(&self) -> u64;
}

impl IntrusiveKey for Name {
    #[inline]
    fn hash_key(&self) -> u64 {
        self.as_raw() as u64
    }
}

impl IntrusiveKey for LayerMask {
    #[inline]
    fn hash_key(&self) -> u64 {
        // Masks are usually single bits.
        self.bits().trailing_zeros() as u64 ^ self.bits().rotate_right(7)
    }
}

impl<K: IntrusiveKey> IntrusiveKey for Option<K> {
    #[inline]
    fn hash_key(&self) -> u64 {
        self.map(|k| k.hash_key().wrapping_add(1)).unwrap_or(0)
    }
}

macro_rules! intrusive_key_for_arena_keys {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntrusiveKey for $ty {
                #[inline]
                fn hash_key(&self) -> u64 {
                    self.data().as_ffi() & 0xffff_ffff
                }
            }
        )*
    };
}

intrusive_key_for_arena_keys!(
    crate::CellId,
    crate::InstanceId,
    crate::NetId,
    crate::ComponentId,
    crate::RubberId,
    crate::MarkerId,
    crate::LibraryId,
    crate::SharedPathId,
);

#[derive(Debug, Clone)]
struct Link<K, I: Key> {
    key: K,
    next: Option<I>,
}

/// An open-hash map from `K` to arena elements `I`.
///
/// Insertion fails if the key is present. Removal of an absent element is a
/// no-op. Iteration order follows the buckets and is not the insertion order.
#[derive(Debug, Clone)]
pub struct IntrusiveMap<K, I: Key> {
    buckets: Vec<Option<I>>,
    links: SecondaryMap<I, Link<K, I>>,
    len: usize,
}

impl<K: IntrusiveKey, I: Key> IntrusiveMap<K, I> {
    /// Creates an empty map with `buckets` initial buckets.
    pub fn new(buckets: usize) -> Self {
        Self {
            buckets: vec![None; buckets.max(1)],
            links: SecondaryMap::new(),
            len: 0,
        }
    }

    /// The number of elements in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the map has no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn bucket(&self, key: &K) -> usize {
        (key.hash_key() % self.buckets.len() as u64) as usize
    }

    /// Looks up the element stored under `key`.
    pub fn get(&self, key: &K) -> Option<I> {
        let mut cursor = self.buckets[self.bucket(key)];
        while let Some(item) = cursor {
            let link = &self.links[item];
            if link.key == *key {
                return Some(item);
            }
            cursor = link.next;
        }
        None
    }

    /// Returns `true` if an element is stored under `key`.
    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Returns `true` if `item` is a member of this map.
    #[inline]
    pub fn contains(&self, item: I) -> bool {
        self.links.contains_key(item)
    }

    /// The key `item` is stored under, if it is a member.
    #[inline]
    pub fn key_of(&self, item: I) -> Option<K> {
        self.links.get(item).map(|link| link.key)
    }

    /// Inserts `item` under `key`.
    ///
    /// Returns the current occupant if `key` is taken. If `item` is already a
    /// member under another key it is moved to `key`.
    pub fn insert(&mut self, key: K, item: I) -> Result<(), I> {
        if let Some(existing) = self.get(&key) {
            return Err(existing);
        }
        self.remove(item);
        if self.len + 1 > self.buckets.len() * 2 {
            self.resize(self.buckets.len() * 2);
        }
        let bucket = self.bucket(&key);
        let next = self.buckets[bucket];
        self.links.insert(item, Link { key, next });
        self.buckets[bucket] = Some(item);
        self.len += 1;
        Ok(())
    }

    /// Removes `item` from the map, returning `true` if it was a member.
    pub fn remove(&mut self, item: I) -> bool {
        let Some(link) = self.links.remove(item) else {
            return false;
        };
        let bucket = self.bucket(&link.key);
        if self.buckets[bucket] == Some(item) {
            self.buckets[bucket] = link.next;
        } else {
            let mut cursor = self.buckets[bucket];
            while let Some(prev) = cursor {
                let prev_link = &mut self.links[prev];
                if prev_link.next == Some(item) {
                    prev_link.next = link.next;
                    break;
                }
                cursor = prev_link.next;
            }
        }
        self.len -= 1;
        true
    }

    /// Removes and returns the element stored under `key`.
    pub fn remove_key(&mut self, key: &K) -> Option<I> {
        let item = self.get(key)?;
        self.remove(item);
        Some(item)
    }

    /// Removes every element.
    pub fn clear(&mut self) {
        self.buckets.iter_mut().for_each(|b| *b = None);
        self.links.clear();
        self.len = 0;
    }

    fn resize(&mut self, buckets: usize) {
        let members: Vec<(K, I)> = self.pairs().collect();
        self.buckets = vec![None; buckets.max(1)];
        for (key, item) in members {
            let bucket = self.bucket(&key);
            let link = &mut self.links[item];
            link.next = self.buckets[bucket];
            self.buckets[bucket] = Some(item);
        }
    }

    /// Iterates over the elements of the map.
    pub fn iter(&self) -> Iter<'_, K, I> {
        Iter {
            map: self,
            bucket: 0,
            cursor: None,
        }
    }

    /// Iterates over `(key, element)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (K, I)> + '_ {
        self.iter().map(|item| (self.links[item].key, item))
    }

    /// Collects the elements, allowing the map to be mutated while visiting them.
    pub fn to_vec(&self) -> Vec<I> {
        self.iter().collect()
    }
}

/// An iterator over the elements of an [`IntrusiveMap`].
pub struct Iter<'a, K, I: Key> {
    map: &'a IntrusiveMap<K, I>,
    bucket: usize,
    cursor: Option<I>,
}

impl<K, I: Key> Iterator for Iter<'_, K, I> {
    type Item = I;

    fn next(&mut self) -> Option<I> {
        loop {
            if let Some(item) = self.cursor {
                self.cursor = self.map.links[item].next;
                return Some(item);
            }
            if self.bucket >= self.map.buckets.len() {
                return None;
            }
            self.cursor = self.map.buckets[self.bucket];
            self.bucket += 1;
        }
    }
}

/// An open-hash set of arena elements, each keyed by itself.
#[derive(Debug, Clone)]
pub struct IntrusiveSet<I: Key + IntrusiveKey>(IntrusiveMap<I, I>);

impl<I: Key + IntrusiveKey> IntrusiveSet<I> {
    /// Creates an empty set with `buckets` initial buckets.
    pub fn new(buckets: usize) -> Self {
        Self(IntrusiveMap::new(buckets))
    }

    /// Adds `item`, returning `false` if it was already present.
    #[inline]
    pub fn insert(&mut self, item: I) -> bool {
        self.0.insert(item, item).is_ok()
    }

    /// Removes `item`, returning `true` if it was present.
    #[inline]
    pub fn remove(&mut self, item: I) -> bool {
        self.0.remove(item)
    }

    /// Returns `true` if `item` is present.
    #[inline]
    pub fn contains(&self, item: I) -> bool {
        self.0.contains(item)
    }

    /// The number of elements in the set.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set has no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the elements of the set.
    #[inline]
    pub fn iter(&self) -> Iter<'_, I, I> {
        self.0.iter()
    }

    /// Collects the elements, allowing the set to be mutated while visiting them.
    #[inline]
    pub fn to_vec(&self) -> Vec<I> {
        self.0.to_vec()
    }

    /// Removes every element.
    #[inline]
    pub fn clear(&mut self) {
        self.0.clear()
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;
    use crate::InstanceId;

    #[test]
    fn rejects_duplicate_keys() {
        let mut arena: SlotMap<InstanceId, ()> = SlotMap::with_key();
        let a = arena.insert(());
        let b = arena.insert(());
        let mut map = IntrusiveMap::new(2);
        assert_eq!(map.insert(Name::new("i1"), a), Ok(()));
        assert_eq!(map.insert(Name::new("i1"), b), Err(a));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&Name::new("i1")), Some(a));
        assert!(!map.contains(b));
    }

    #[test]
    fn survives_growth_and_removal() {
        let mut arena: SlotMap<InstanceId, ()> = SlotMap::with_key();
        let mut map = IntrusiveMap::new(1);
        let items: Vec<_> = (0..50).map(|_| arena.insert(())).collect();
        for (i, item) in items.iter().enumerate() {
            map.insert(Name::new(format!("n{i}")), *item).unwrap();
        }
        assert_eq!(map.len(), 50);
        assert_eq!(map.iter().count(), 50);
        for item in items.iter().step_by(2) {
            assert!(map.remove(*item));
            assert!(!map.remove(*item));
        }
        assert_eq!(map.len(), 25);
        for (i, item) in items.iter().enumerate() {
            let found = map.get(&Name::new(format!("n{i}")));
            if i % 2 == 0 {
                assert_eq!(found, None);
            } else {
                assert_eq!(found, Some(*item));
            }
        }
    }

    #[test]
    fn reinsert_moves_key() {
        let mut arena: SlotMap<InstanceId, ()> = SlotMap::with_key();
        let a = arena.insert(());
        let mut map = IntrusiveMap::new(4);
        map.insert(Name::new("old"), a).unwrap();
        map.insert(Name::new("new"), a).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&Name::new("old")), None);
        assert_eq!(map.key_of(a), Some(Name::new("new")));
    }

    #[test]
    fn sets_hold_each_item_once() {
        let mut arena: SlotMap<InstanceId, ()> = SlotMap::with_key();
        let a = arena.insert(());
        let mut set = IntrusiveSet::new(8);
        assert!(set.insert(a));
        assert!(!set.insert(a));
        assert_eq!(set.len(), 1);
        assert!(set.remove(a));
        assert!(set.is_empty());
    }
}
