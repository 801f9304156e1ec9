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

//! Objects allocated by a path, grouped by the call context of their
//! allocation, so a replayed path can reuse the same objects in the
//! same order.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::memory::MemoryObject;
use crate::module::InstRef;

/// The allocation site followed by the call sites leading to it,
/// innermost first.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AllocationContext {
    pub trace: Vec<InstRef>,
}

impl AllocationContext {
    pub fn new(site: InstRef, callers: &[InstRef]) -> Self {
        let mut trace = Vec::with_capacity(callers.len() + 1);
        trace.push(site);
        trace.extend(callers.iter().rev());
        AllocationContext { trace }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AllocationRecord {
    record: BTreeMap<AllocationContext, VecDeque<Arc<MemoryObject>>>,
}

impl AllocationRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }

    pub fn add_addr(&mut self, context: AllocationContext, mo: Arc<MemoryObject>) {
        self.record.entry(context).or_default().push_back(mo)
    }

    /// The oldest remaining object allocated in `context`.
    pub fn pop(&mut self, context: &AllocationContext) -> Option<Arc<MemoryObject>> {
        self.record.get_mut(context)?.pop_front()
    }

    pub fn exists(&self, context: &AllocationContext) -> bool {
        self.record.contains_key(context)
    }

    /// Objects allocated in `context`, oldest first.
    pub fn iter<'a>(&'a self, context: &AllocationContext) -> impl Iterator<Item = &'a Arc<MemoryObject>> + 'a {
        self.record.get(context).into_iter().flat_map(|objects| objects.iter())
    }

    pub fn len(&self, context: &AllocationContext) -> usize {
        self.record.get(context).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::memory::{MemoryManager, ObjectFlags};

    #[test]
    fn test_record_order() {
        let mut memory = MemoryManager::new(&Context::default(), 0x1000, 8);
        let site = InstRef { function: 0, block: 1, index: 0 };
        let caller = InstRef { function: 1, block: 0, index: 2 };
        let context = AllocationContext::new(site, &[caller]);
        let other = AllocationContext::new(site, &[]);
        assert_eq!(context.trace, vec![site, caller]);

        let mut record = AllocationRecord::new();
        let a = memory.allocate(4, ObjectFlags::default(), Some(site));
        let b = memory.allocate(4, ObjectFlags::default(), Some(site));
        record.add_addr(context.clone(), a.clone());
        record.add_addr(context.clone(), b.clone());
        assert!(record.exists(&context));
        assert!(!record.exists(&other));
        assert_eq!(record.pop(&context).map(|mo| mo.id), Some(a.id));
        assert_eq!(record.pop(&context).map(|mo| mo.id), Some(b.id));
        assert!(record.pop(&context).is_none());
        assert!(record.pop(&other).is_none())
    }
}
