// BSD 2-Clause License
//
// Copyright (c) 2019, 2020 Alasdair Armstrong
//
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
// 1. Redistributions of source code must retain the above copyright
// notice, this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright
// notice, this list of conditions and the following disclaimer in the
// documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
// LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
// A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
// HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
// LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE,
// DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
// THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
// (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Persistent containers used to share data between forked
//! execution states. Cloning any of these is O(1), and every update
//! copies only the path to the modified node, so a clone taken before
//! an update keeps observing the old contents.

use im::{OrdMap, OrdSet, Vector};
use std::borrow::Borrow;
use std::fmt;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PersistentMap<K: Ord + Clone, V: Clone> {
    map: OrdMap<K, V>,
}

impl<K: Ord + Clone, V: Clone> Default for PersistentMap<K, V> {
    fn default() -> Self {
        PersistentMap { map: OrdMap::new() }
    }
}

impl<K: Ord + Clone + fmt::Debug, V: Clone + fmt::Debug> fmt::Debug for PersistentMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.map.iter()).finish()
    }
}

impl<K: Ord + Clone, V: Clone> PersistentMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        Q: Ord + ?Sized,
        K: Borrow<Q>,
    {
        self.map.get(key)
    }

    /// Mutable access to a binding. Nodes shared with other maps are
    /// copied first, so the other maps never observe the change.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        Q: Ord + ?Sized,
        K: Borrow<Q>,
    {
        self.map.get_mut(key)
    }

    /// Returns the stored value, or `default` if the key is unbound.
    pub fn get_or<Q>(&self, key: &Q, default: V) -> V
    where
        Q: Ord + ?Sized,
        K: Borrow<Q>,
    {
        self.map.get(key).cloned().unwrap_or(default)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Q: Ord + ?Sized,
        K: Borrow<Q>,
    {
        self.map.contains_key(key)
    }

    /// Binds `key` to `value`, returning the previous binding.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.map.insert(key, value)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        Q: Ord + ?Sized,
        K: Borrow<Q>,
    {
        self.map.remove(key)
    }

    /// A new map with `key` bound to `value`; `self` is unchanged.
    pub fn with(&self, key: K, value: V) -> Self {
        PersistentMap { map: self.map.update(key, value) }
    }

    /// A new map without `key`; `self` is unchanged.
    pub fn without<Q>(&self, key: &Q) -> Self
    where
        Q: Ord + ?Sized,
        K: Borrow<Q>,
    {
        PersistentMap { map: self.map.without(key) }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.map.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.map.values()
    }

    pub fn max_key(&self) -> Option<&K> {
        self.map.get_max().map(|(k, _)| k)
    }

    /// True if both maps share the same root, i.e. neither has been
    /// updated since one was cloned from the other.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.map.ptr_eq(&other.map)
    }
}

impl<K: Ord + Clone, V: Clone> FromIterator<(K, V)> for PersistentMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        PersistentMap { map: iter.into_iter().collect() }
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PersistentSet<T: Ord + Clone> {
    set: OrdSet<T>,
}

impl<T: Ord + Clone> Default for PersistentSet<T> {
    fn default() -> Self {
        PersistentSet { set: OrdSet::new() }
    }
}

impl<T: Ord + Clone + fmt::Debug> fmt::Debug for PersistentSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.set.iter()).finish()
    }
}

impl<T: Ord + Clone> PersistentSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        Q: Ord + ?Sized,
        T: Borrow<Q>,
    {
        self.set.contains(value)
    }

    pub fn insert(&mut self, value: T) {
        self.set.insert(value);
    }

    pub fn remove<Q>(&mut self, value: &Q) -> bool
    where
        Q: Ord + ?Sized,
        T: Borrow<Q>,
    {
        self.set.remove(value).is_some()
    }

    pub fn with(&self, value: T) -> Self {
        PersistentSet { set: self.set.update(value) }
    }

    pub fn without<Q>(&self, value: &Q) -> Self
    where
        Q: Ord + ?Sized,
        T: Borrow<Q>,
    {
        PersistentSet { set: self.set.without(value) }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.set.iter()
    }
}

impl<T: Ord + Clone> FromIterator<T> for PersistentSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        PersistentSet { set: iter.into_iter().collect() }
    }
}

/// An append-only list with structural sharing.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ImmutableList<T: Clone> {
    items: Vector<T>,
}

impl<T: Clone> Default for ImmutableList<T> {
    fn default() -> Self {
        ImmutableList { items: Vector::new() }
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for ImmutableList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

impl<T: Clone> ImmutableList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push_back(&mut self, value: T) {
        self.items.push_back(value)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    /// Everything after the first `n` elements, sharing storage with `self`.
    pub fn skip(&self, n: usize) -> Self {
        if n >= self.items.len() {
            return ImmutableList::new();
        }
        ImmutableList { items: self.items.skip(n) }
    }

    pub fn append(&mut self, other: &Self) {
        self.items.append(other.items.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> FromIterator<T> for ImmutableList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        ImmutableList { items: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_clone_is_isolated() {
        let mut m1: PersistentMap<u32, &str> = PersistentMap::new();
        m1.insert(1, "one");
        m1.insert(2, "two");
        let m2 = m1.clone();
        assert!(m1.ptr_eq(&m2));
        m1.insert(1, "uno");
        m1.remove(&2);
        assert_eq!(m2.get(&1), Some(&"one"));
        assert_eq!(m2.get(&2), Some(&"two"));
        assert_eq!(m1.get(&1), Some(&"uno"));
        assert!(!m1.contains_key(&2));
    }

    #[test]
    fn test_insert_overwrites() {
        let mut m: PersistentMap<u32, u32> = PersistentMap::new();
        assert_eq!(m.insert(1, 10), None);
        assert_eq!(m.insert(1, 20), Some(10));
        assert_eq!(m.get_or(&1, 0), 20);
        assert_eq!(m.get_or(&7, 0), 0);
        let m2 = m.with(1, 30);
        assert_eq!(m.get(&1), Some(&20));
        assert_eq!(m2.get(&1), Some(&30));
        assert!(m2.without(&1).is_empty())
    }

    #[test]
    fn test_list_skip() {
        let l: ImmutableList<u32> = (0..10).collect();
        let tail = l.skip(7);
        assert_eq!(tail.iter().copied().collect::<Vec<_>>(), vec![7, 8, 9]);
        assert!(l.skip(12).is_empty());
        assert_eq!(l.len(), 10)
    }

    proptest! {
        #[test]
        fn map_agrees_with_btreemap(ops in prop::collection::vec((0u8..32, any::<u16>(), any::<bool>()), 0..200)) {
            let mut model = BTreeMap::new();
            let mut map = PersistentMap::new();
            let mut snapshots = Vec::new();
            for (k, v, insert) in ops {
                snapshots.push((map.clone(), model.clone()));
                if insert {
                    map.insert(k, v);
                    model.insert(k, v);
                } else {
                    map.remove(&k);
                    model.remove(&k);
                }
            }
            prop_assert!(map.iter().map(|(k, v)| (*k, *v)).eq(model.iter().map(|(k, v)| (*k, *v))));
            for (old_map, old_model) in snapshots {
                prop_assert!(old_map.iter().map(|(k, v)| (*k, *v)).eq(old_model.iter().map(|(k, v)| (*k, *v))));
            }
        }
    }
}
