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

use std::collections::BTreeMap;

/// A bidirectional map where both keys and values are unique.
#[derive(Clone, Debug)]
pub struct BiMap<K: Ord + Clone, V: Ord + Clone> {
    data: BTreeMap<K, V>,
    rdata: BTreeMap<V, K>,
}

impl<K: Ord + Clone, V: Ord + Clone> Default for BiMap<K, V> {
    fn default() -> Self {
        BiMap { data: BTreeMap::new(), rdata: BTreeMap::new() }
    }
}

impl<K: Ord + Clone, V: Ord + Clone> BiMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Adds the pair, unless either side is already present.
    pub fn put(&mut self, key: K, value: V) -> bool {
        if self.contains_key(&key) || self.contains_value(&value) {
            return false;
        }
        self.data.insert(key.clone(), value.clone());
        self.rdata.insert(value, key);
        true
    }

    pub fn erase_by_key(&mut self, key: &K) -> bool {
        match self.data.remove(key) {
            Some(value) => {
                self.rdata.remove(&value);
                true
            }
            None => false,
        }
    }

    pub fn erase_by_value(&mut self, value: &V) -> bool {
        match self.rdata.remove(value) {
            Some(key) => {
                self.data.remove(&key);
                true
            }
            None => false,
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.data.contains_key(key)
    }

    pub fn contains_value(&self, value: &V) -> bool {
        self.rdata.contains_key(value)
    }

    pub fn get_by_key(&self, key: &K) -> Option<&V> {
        self.data.get(key)
    }

    pub fn get_by_value(&self, value: &V) -> Option<&K> {
        self.rdata.get(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.data.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bimap() {
        let mut m = BiMap::new();
        assert!(m.put(1u64, "a"));
        assert!(!m.put(1, "b"));
        assert!(!m.put(2, "a"));
        assert!(m.put(2, "b"));
        assert_eq!(m.get_by_value(&"b"), Some(&2));
        assert!(m.erase_by_key(&1));
        assert!(!m.contains_value(&"a"));
        assert!(m.erase_by_value(&"b"));
        assert!(m.is_empty())
    }
}
