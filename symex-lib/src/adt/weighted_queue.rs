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

use ahash::AHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::Hash;

/// Items bucketed by an integer weight. `choose` always returns the
/// smallest item (by `Ord`) of the lowest weight bucket.
#[derive(Clone, Debug)]
pub struct WeightedQueue<T: Ord + Hash + Clone> {
    buckets: BTreeMap<u32, BTreeSet<T>>,
    weights: AHashMap<T, u32>,
}

impl<T: Ord + Hash + Clone> Default for WeightedQueue<T> {
    fn default() -> Self {
        WeightedQueue { buckets: BTreeMap::new(), weights: AHashMap::new() }
    }
}

impl<T: Ord + Hash + Clone> WeightedQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.weights.contains_key(item)
    }

    pub fn insert(&mut self, item: T, weight: u32) {
        if let Some(old) = self.weights.insert(item.clone(), weight) {
            self.detach(&item, old)
        }
        self.buckets.entry(weight).or_default().insert(item);
    }

    pub fn update(&mut self, item: T, weight: u32) {
        self.insert(item, weight)
    }

    pub fn remove(&mut self, item: &T) -> bool {
        match self.weights.remove(item) {
            Some(weight) => {
                self.detach(item, weight);
                true
            }
            None => false,
        }
    }

    fn detach(&mut self, item: &T, weight: u32) {
        if let Some(bucket) = self.buckets.get_mut(&weight) {
            bucket.remove(item);
            if bucket.is_empty() {
                self.buckets.remove(&weight);
            }
        }
    }

    pub fn try_get_weight(&self, item: &T) -> Option<u32> {
        self.weights.get(item).copied()
    }

    pub fn choose(&self) -> Option<&T> {
        self.buckets.values().next().and_then(|bucket| bucket.iter().next())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buckets.values().flat_map(|bucket| bucket.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_weight_first() {
        let mut q = WeightedQueue::new();
        q.insert(5u32, 10);
        q.insert(3, 20);
        q.insert(7, 10);
        assert_eq!(q.choose(), Some(&5));
        q.update(3, 1);
        assert_eq!(q.choose(), Some(&3));
        assert_eq!(q.try_get_weight(&3), Some(1));
        assert!(q.remove(&3));
        assert_eq!(q.choose(), Some(&5));
        assert_eq!(q.iter().copied().collect::<Vec<_>>(), vec![5, 7]);
        q.remove(&5);
        q.remove(&7);
        assert!(q.is_empty());
        assert_eq!(q.choose(), None)
    }
}
