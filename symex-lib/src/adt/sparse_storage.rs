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

use std::fmt;

use super::persistent::PersistentMap;

/// A map from indices to values where every index not explicitly
/// stored reads back as a default value. Storing the default value
/// erases the entry, so two storages with the same observable
/// contents have the same representation.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SparseStorage<V: Clone> {
    storage: PersistentMap<u64, V>,
    default: V,
}

impl<V: Clone + PartialEq> SparseStorage<V> {
    pub fn new(default: V) -> Self {
        SparseStorage { storage: PersistentMap::new(), default }
    }

    pub fn from_values(values: &[V], default: V) -> Self {
        let mut storage = SparseStorage::new(default);
        for (i, value) in values.iter().enumerate() {
            storage.store(i as u64, value.clone())
        }
        storage
    }

    pub fn store(&mut self, index: u64, value: V) {
        if value == self.default {
            self.storage.remove(&index);
        } else {
            self.storage.insert(index, value);
        }
    }

    pub fn load(&self, index: u64) -> V {
        self.storage.get(&index).cloned().unwrap_or_else(|| self.default.clone())
    }

    pub fn is_set(&self, index: u64) -> bool {
        self.storage.contains_key(&index)
    }

    pub fn default_value(&self) -> &V {
        &self.default
    }

    /// One past the largest explicitly stored index.
    pub fn size_of_set_range(&self) -> u64 {
        self.storage.max_key().map(|k| k + 1).unwrap_or(0)
    }

    /// Stored entries in increasing index order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &V)> {
        self.storage.iter().map(|(k, v)| (*k, v))
    }

    pub fn entries(&self) -> usize {
        self.storage.len()
    }
}

impl<V: Clone + PartialEq + fmt::Debug> fmt::Debug for SparseStorage<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?
            }
            write!(f, "{}: {:?}", k, v)?
        }
        write!(f, "}} default: {:?}", self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_erases() {
        let mut s = SparseStorage::new(0u8);
        s.store(3, 7);
        s.store(5, 9);
        assert_eq!(s.load(3), 7);
        assert_eq!(s.load(4), 0);
        assert_eq!(s.size_of_set_range(), 6);
        s.store(5, 0);
        assert_eq!(s.entries(), 1);
        assert_eq!(s.size_of_set_range(), 4);
        assert_eq!(s, SparseStorage::from_values(&[0, 0, 0, 7], 0))
    }

    #[test]
    fn test_debug_format() {
        let s = SparseStorage::from_values(&[1u8, 0, 2], 0);
        assert_eq!(format!("{:?}", s), "{0: 1, 2: 2} default: 0")
    }
}
