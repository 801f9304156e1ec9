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

//! An address space seen through a model: every address, size and
//! stored pointer evaluated to a constant. Used to reconstruct the
//! objects a test case has to provide, including the pointers between
//! them.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::address_space::{AddressSpace, ObjectPair, ResolveResult};
use crate::context::Context;
use crate::expr::{Assignment, PointerExp};
use crate::memory::{MemoryObject, ObjectId};

/// A pointer found in an object: the address it holds and the object
/// it points into.
#[derive(Clone, Debug)]
pub struct ConstantResolution {
    pub written_address: u64,
    pub object: ObjectPair,
}

/// References from an object, keyed by the offset they are stored at.
pub type ConstantResolutionList = BTreeMap<u64, ConstantResolution>;

pub struct ConstantAddressSpace<'a> {
    address_space: &'a AddressSpace,
    model: &'a Assignment,
    ctx: &'a Context,
    objects: BTreeMap<ObjectId, Arc<MemoryObject>>,
}

impl<'a> ConstantAddressSpace<'a> {
    pub fn new(address_space: &'a AddressSpace, model: &'a Assignment, ctx: &'a Context) -> Self {
        let objects = address_space.iter().map(|(mo, _)| (mo.id, mo.clone())).collect();
        ConstantAddressSpace { address_space, model, ctx, objects }
    }

    pub fn model(&self) -> &Assignment {
        self.model
    }

    pub fn address_of(&self, object: &MemoryObject) -> u64 {
        self.model.evaluate(&object.address_expr)
    }

    pub fn size_of(&self, object: &MemoryObject) -> u64 {
        self.model.evaluate(&object.size_expr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<MemoryObject>> {
        self.objects.values()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// The object a pointer with constant base `base` points into.
    pub fn resolve(&self, base: u64) -> ResolveResult<ObjectPair> {
        match self.objects.get(&base) {
            Some(mo) => self.address_space.find_object(mo),
            None => ResolveResult::None,
        }
    }

    fn references<F>(&self, pair: &ObjectPair, read: F) -> ConstantResolutionList
    where
        F: Fn(u64) -> Option<PointerExp>,
    {
        let pointer_bytes = self.ctx.pointer_bytes();
        let size = self.size_of(&pair.0);
        let mut references = BTreeMap::new();
        let mut offset = 0;
        while offset + pointer_bytes <= size {
            let pointer = read(offset);
            let base = pointer.as_ref().and_then(|p| self.model.try_evaluate(&p.base));
            let value = pointer.as_ref().and_then(|p| self.model.try_evaluate(&p.value));
            if let (Some(base), Some(value)) = (base, value) {
                if let ResolveResult::Ok(object) = self.resolve(base) {
                    references.insert(offset, ConstantResolution { written_address: value, object });
                }
            }
            offset += 1
        }
        references
    }

    /// Objects referenced by the initial contents of an object.
    pub fn references_in_initial(&self, pair: &ObjectPair) -> ConstantResolutionList {
        self.references(pair, |offset| pair.1.read_initial_pointer(self.ctx, offset).ok())
    }

    /// Objects referenced by the current contents of an object.
    pub fn references_in_final(&self, pair: &ObjectPair) -> ConstantResolutionList {
        self.references(pair, |offset| pair.1.read_pointer(self.ctx, offset).ok())
    }

    pub fn pointer_graph(&self) -> ConstantPointerGraph {
        ConstantPointerGraph::default()
    }
}

/// Objects reachable through final contents from a set of sources,
/// each with the references it holds.
#[derive(Clone, Debug, Default)]
pub struct ConstantPointerGraph {
    graph: BTreeMap<ObjectId, (ObjectPair, ConstantResolutionList)>,
}

impl ConstantPointerGraph {
    pub fn add_source(&mut self, space: &ConstantAddressSpace<'_>, pair: &ObjectPair) {
        if self.graph.contains_key(&pair.0.id) {
            return;
        }
        self.add_reachable_from(space, pair)
    }

    fn add_reachable_from(&mut self, space: &ConstantAddressSpace<'_>, pair: &ObjectPair) {
        let mut queue = VecDeque::new();
        queue.push_back(pair.clone());
        self.graph.insert(pair.0.id, (pair.clone(), BTreeMap::new()));

        while let Some(pair) = queue.pop_front() {
            let references = space.references_in_final(&pair);
            for resolution in references.values() {
                let id = resolution.object.0.id;
                if !self.graph.contains_key(&id) {
                    queue.push_back(resolution.object.clone());
                    self.graph.insert(id, (resolution.object.clone(), BTreeMap::new()));
                }
            }
            self.graph.insert(pair.0.id, (pair, references));
        }
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.graph.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ObjectPair, ConstantResolutionList)> {
        self.graph.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolveConfig;
    use crate::expr::{Array, SourceKind};
    use crate::memory::{KType, MemoryManager, ObjectFlags, ObjectState};

    #[test]
    fn test_pointer_graph() {
        let ctx = Context::default();
        let mut memory = MemoryManager::new(&ctx, 0x1000, 16);
        let mut space = AddressSpace::new(Arc::new(ResolveConfig::default()));

        let a = memory.allocate(16, ObjectFlags::default(), None);
        let b = memory.allocate(8, ObjectFlags::default(), None);
        let c = memory.allocate(8, ObjectFlags::default(), None);
        let unreachable = memory.allocate(8, ObjectFlags::default(), None);

        // a[8] points 4 bytes into b, b[0] points at c
        let mut a_os = ObjectState::new(a.clone(), KType::Untyped);
        a_os.write_pointer(&ctx, 8, &PointerExp::constant(b.id, b.address + 4, 64)).unwrap();
        let mut b_os = ObjectState::new(b.clone(), KType::Untyped);
        b_os.write_pointer(&ctx, 0, &c.base_pointer(&ctx)).unwrap();
        let a_os = space.bind_object(&a, a_os);
        space.bind_object(&b, b_os);
        space.bind_object(&c, ObjectState::new(c.clone(), KType::Untyped));
        space.bind_object(&unreachable, ObjectState::new(unreachable.clone(), KType::Untyped));

        let model = Assignment::new();
        let constant = ConstantAddressSpace::new(&space, &model, &ctx);
        assert_eq!(constant.len(), 4);
        assert_eq!(constant.address_of(&b), b.address);
        assert_eq!(constant.size_of(&a), 16);

        let pair = (a.clone(), a_os);
        let references = constant.references_in_final(&pair);
        assert_eq!(references.len(), 1);
        assert_eq!(references[&8].written_address, b.address + 4);
        assert_eq!(references[&8].object.0.id, b.id);
        assert!(constant.references_in_initial(&pair).is_empty());

        let mut graph = constant.pointer_graph();
        graph.add_source(&constant, &pair);
        assert_eq!(graph.len(), 3);
        assert!(graph.contains(c.id));
        assert!(!graph.contains(unreachable.id))
    }

    #[test]
    fn test_symbolic_pointer_under_model() {
        let ctx = Context::default();
        let mut memory = MemoryManager::new(&ctx, 0x1000, 16);
        let mut space = AddressSpace::new(Arc::new(ResolveConfig::default()));
        let target = memory.allocate(8, ObjectFlags::default(), None);
        let holder = memory.allocate(8, ObjectFlags::default(), None);
        space.bind_object(&target, ObjectState::new(target.clone(), KType::Untyped));

        let content = Array::new("holder", 8, SourceKind::MakeSymbolic);
        let bases = Array::new("holder_base", 8, SourceKind::LazyInitializationBase);
        let os = space.bind_object(&holder, ObjectState::new_symbolic(holder.clone(), KType::Untyped, content.clone(), Some(bases.clone())));

        let mut model = Assignment::new();
        model.bind(&content, &target.address.to_le_bytes());
        model.bind(&bases, &target.id.to_le_bytes());
        let constant = ConstantAddressSpace::new(&space, &model, &ctx);
        let initial = constant.references_in_initial(&(holder.clone(), os));
        assert_eq!(initial[&0].object.0.id, target.id);
        assert_eq!(initial[&0].written_address, target.address)
    }
}
