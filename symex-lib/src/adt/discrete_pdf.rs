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
use std::hash::Hash;

#[derive(Clone, Copy, Default, Debug)]
struct Node {
    sum: f64,
    count: usize,
}

/// A discrete probability distribution over a changing set of items.
/// Insertion, removal, weight update, and sampling are all
/// logarithmic in the number of items.
#[derive(Clone, Debug)]
pub struct DiscretePdf<T: Eq + Hash + Clone> {
    // Segment tree over item slots; leaves start at `capacity`.
    nodes: Vec<Node>,
    slots: Vec<Option<T>>,
    free: Vec<usize>,
    index: AHashMap<T, usize>,
    capacity: usize,
}

impl<T: Eq + Hash + Clone> Default for DiscretePdf<T> {
    fn default() -> Self {
        DiscretePdf { nodes: vec![Node::default(); 2], slots: vec![None], free: vec![0], index: AHashMap::new(), capacity: 1 }
    }
}

impl<T: Eq + Hash + Clone> DiscretePdf<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.index.contains_key(item)
    }

    pub fn weight(&self, item: &T) -> Option<f64> {
        self.index.get(item).map(|slot| self.nodes[self.capacity + slot].sum)
    }

    pub fn total(&self) -> f64 {
        self.nodes[1].sum
    }

    fn grow(&mut self) {
        let old = self.capacity;
        let capacity = old * 2;
        let mut nodes = vec![Node::default(); 2 * capacity];
        nodes[capacity..capacity + old].copy_from_slice(&self.nodes[old..2 * old]);
        self.nodes = nodes;
        self.capacity = capacity;
        for i in (1..capacity).rev() {
            self.recompute(i)
        }
        self.slots.resize(capacity, None);
        self.free.extend((old..capacity).rev())
    }

    fn recompute(&mut self, i: usize) {
        let (l, r) = (self.nodes[2 * i], self.nodes[2 * i + 1]);
        self.nodes[i] = Node { sum: l.sum + r.sum, count: l.count + r.count }
    }

    fn set_leaf(&mut self, slot: usize, leaf: Node) {
        let mut i = self.capacity + slot;
        self.nodes[i] = leaf;
        while i > 1 {
            i /= 2;
            self.recompute(i)
        }
    }

    /// Adds an item. Panics if the item is already present.
    pub fn insert(&mut self, item: T, weight: f64) {
        assert!(!self.index.contains_key(&item), "item already in distribution");
        if self.free.is_empty() {
            self.grow()
        }
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => unreachable!("grow always frees at least one slot"),
        };
        self.slots[slot] = Some(item.clone());
        self.index.insert(item, slot);
        self.set_leaf(slot, Node { sum: weight.max(0.0), count: 1 })
    }

    pub fn update(&mut self, item: &T, weight: f64) {
        let slot = match self.index.get(item) {
            Some(slot) => *slot,
            None => panic!("updated item not in distribution"),
        };
        self.set_leaf(slot, Node { sum: weight.max(0.0), count: 1 })
    }

    pub fn remove(&mut self, item: &T) -> bool {
        match self.index.remove(item) {
            Some(slot) => {
                self.slots[slot] = None;
                self.free.push(slot);
                self.set_leaf(slot, Node::default());
                true
            }
            None => false,
        }
    }

    /// Select an item, where `p` is uniform in `[0, 1)`. Items are
    /// chosen with probability proportional to their weight; if every
    /// weight is zero the leftmost item is chosen.
    pub fn choose(&self, p: f64) -> &T {
        assert!(!self.is_empty(), "choose from empty distribution");
        let mut target = p * self.total();
        let mut i = 1;
        while i < self.capacity {
            let (l, r) = (self.nodes[2 * i], self.nodes[2 * i + 1]);
            if l.count > 0 && (target < l.sum || r.count == 0) {
                i *= 2
            } else {
                target -= l.sum;
                i = 2 * i + 1
            }
        }
        match &self.slots[i - self.capacity] {
            Some(item) => item,
            None => unreachable!("segment tree count points at an empty slot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_by_weight() {
        let mut pdf = DiscretePdf::new();
        pdf.insert("a", 1.0);
        pdf.insert("b", 3.0);
        pdf.insert("c", 0.0);
        assert_eq!(pdf.total(), 4.0);
        assert_eq!(*pdf.choose(0.0), "a");
        assert_eq!(*pdf.choose(0.2), "a");
        assert_eq!(*pdf.choose(0.3), "b");
        assert_eq!(*pdf.choose(0.99), "b");
        pdf.update(&"a", 0.0);
        assert_eq!(*pdf.choose(0.0), "b");
        assert!(pdf.remove(&"b"));
        assert!(!pdf.remove(&"b"));
        // Only zero weights remain.
        assert!(*pdf.choose(0.5) == "a" || *pdf.choose(0.5) == "c");
        assert_eq!(pdf.len(), 2)
    }

    #[test]
    fn test_grow_keeps_weights() {
        let mut pdf = DiscretePdf::new();
        for i in 0..100u32 {
            pdf.insert(i, i as f64)
        }
        for i in (0..100u32).step_by(2) {
            pdf.remove(&i);
        }
        assert_eq!(pdf.len(), 50);
        assert_eq!(pdf.weight(&99), Some(99.0));
        assert_eq!(pdf.total(), (1..100).step_by(2).sum::<u32>() as f64);
        assert_eq!(*pdf.choose(0.999999), 99)
    }
}
