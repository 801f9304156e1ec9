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

//! The per-state mapping from objects to their contents, and pointer
//! resolution against it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::adt::persistent::PersistentMap;
use crate::config::ResolveConfig;
use crate::expr::{Array, ArrayRef, Assignment, Exp, PointerExp};
use crate::log;
use crate::memory::{CowKey, KType, MemoryObject, ObjectId, ObjectState, ObjectStateRef};
use crate::solver::TimingSolver;
use crate::state::{ExecutionState, Symbolics};

/// The outcome of a lookup or resolution. `Unknown` means the answer
/// could not be decided, usually because a solver query failed; it may
/// carry a partial result which must not be treated as exhaustive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolveResult<T> {
    Ok(T),
    None,
    Unknown(Option<T>),
}

impl<T> ResolveResult<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, ResolveResult::Ok(_))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ResolveResult::None)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ResolveResult::Unknown(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            ResolveResult::Ok(t) => Some(t),
            _ => None,
        }
    }

    /// The result, complete or not.
    pub fn get(&self) -> Option<&T> {
        match self {
            ResolveResult::Ok(t) | ResolveResult::Unknown(Some(t)) => Some(t),
            _ => None,
        }
    }
}

pub type ObjectPair = (Arc<MemoryObject>, ObjectStateRef);

pub type ResolutionList = Vec<ObjectPair>;

/// Outcome of testing one candidate object during resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Check {
    /// The resolution list is exact and complete.
    Complete,
    /// Stop, the resolution list may be missing objects.
    Incomplete,
    Continue,
}

/// Memory outside of the engine, standing in for the host memory an
/// external call would read and write.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExternalMemory {
    regions: BTreeMap<u64, Vec<u8>>,
}

impl ExternalMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, address: u64, bytes: Vec<u8>) {
        self.regions.insert(address, bytes);
    }

    pub fn read(&self, address: u64) -> Option<&[u8]> {
        self.regions.get(&address).map(|bytes| bytes.as_slice())
    }

    pub fn write_byte(&mut self, address: u64, offset: usize, byte: u8) -> bool {
        match self.regions.get_mut(&address) {
            Some(bytes) if offset < bytes.len() => {
                bytes[offset] = byte;
                true
            }
            _ => false,
        }
    }
}

/// Decides which objects a symbolic pointer may be resolved to
/// without consulting the solver.
struct ResolvePredicate<'a> {
    config: ResolveConfig,
    timestamp: u32,
    state: &'a ExecutionState,
    object_type: &'a KType,
    complete: bool,
    allow_all: bool,
}

impl<'a> ResolvePredicate<'a> {
    fn new(
        config: &ResolveConfig,
        state: &'a ExecutionState,
        pointer: &PointerExp,
        object_type: &'a KType,
        complete: bool,
    ) -> Self {
        let mut predicate = ResolvePredicate {
            config: config.clone(),
            timestamp: u32::MAX,
            state,
            object_type,
            complete,
            allow_all: false,
        };
        if pointer.base.is_constant() {
            predicate.allow_all = true
        } else if pointer.aliased_bases().is_some() {
            // A choice between constant bases may point anywhere, but
            // must not cause lazy initialisation.
            predicate.config.skip_not_symbolic_objects = false;
            predicate.config.skip_not_lazy_initialized = false;
            predicate.config.skip_local = false;
            predicate.config.skip_global = false
        }
        predicate
    }

    fn accepts(&self, mo: &MemoryObject, os: &ObjectState) -> bool {
        if self.allow_all {
            return true;
        }
        (!self.config.use_timestamps || mo.timestamp <= self.timestamp)
            && (!self.config.skip_not_symbolic_objects || self.state.in_symbolics(mo))
            && (!self.config.skip_not_lazy_initialized || mo.flags.is_lazy_initialized)
            && (!self.config.skip_local || !mo.flags.is_local)
            && (!self.config.skip_global || !mo.flags.is_global)
            && os.is_accessible_from(self.object_type)
            && (!self.complete || os.was_written())
    }
}

#[derive(Clone, Debug)]
pub struct AddressSpace {
    /// Object states tagged with this key may be updated in place.
    cow_key: CowKey,
    ids_to_objects: PersistentMap<ObjectId, Arc<MemoryObject>>,
    objects: PersistentMap<ObjectId, ObjectPair>,
    /// Only resolve symbolic pointers to objects that have been written
    pub complete: bool,
    config: Arc<ResolveConfig>,
}

impl Default for AddressSpace {
    fn default() -> Self {
        AddressSpace::new(Arc::new(ResolveConfig::default()))
    }
}

impl AddressSpace {
    pub fn new(config: Arc<ResolveConfig>) -> Self {
        AddressSpace {
            cow_key: 1,
            ids_to_objects: PersistentMap::new(),
            objects: PersistentMap::new(),
            complete: false,
            config,
        }
    }

    /// A copy of this address space for a forked state. Afterwards
    /// neither copy owns any of the object states they share.
    pub fn fork(&mut self) -> AddressSpace {
        self.cow_key += 1;
        self.clone()
    }

    pub fn cow_key(&self) -> CowKey {
        self.cow_key
    }

    pub fn config(&self) -> &ResolveConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectPair> {
        self.objects.values()
    }

    /// Binds a fresh object state, taking ownership of it.
    pub fn bind_object(&mut self, mo: &Arc<MemoryObject>, mut os: ObjectState) -> ObjectStateRef {
        assert!(os.cow_owner == 0, "object already has owner");
        os.cow_owner = self.cow_key;
        let os = Arc::new(os);
        self.ids_to_objects.insert(mo.id, mo.clone());
        self.objects.insert(mo.id, (mo.clone(), os.clone()));
        os
    }

    pub fn unbind_object(&mut self, mo: &MemoryObject) {
        self.ids_to_objects.remove(&mo.id);
        self.objects.remove(&mo.id);
    }

    pub fn find_object(&self, mo: &MemoryObject) -> ResolveResult<ObjectPair> {
        self.find_object_by_id(mo.id)
    }

    pub fn find_object_by_id(&self, id: ObjectId) -> ResolveResult<ObjectPair> {
        match self.objects.get(&id) {
            Some(pair) => ResolveResult::Ok(pair.clone()),
            None => ResolveResult::None,
        }
    }

    /// Fresh symbolic contents for a lazily initialised object. The
    /// result is not bound.
    pub fn lazy_initialize_object(&self, mo: &Arc<MemoryObject>, content: &ArrayRef, object_type: KType) -> ResolveResult<ObjectPair> {
        let base = Array::new(format!("{}_base", content.name), content.size, crate::expr::SourceKind::LazyInitializationBase);
        let os = ObjectState::new_symbolic(mo.clone(), object_type, content.clone(), Some(base));
        ResolveResult::Ok((mo.clone(), Arc::new(os)))
    }

    /// The object state for `mo` that this address space may update,
    /// copying `os` first if it is owned by another address space.
    pub fn get_writeable(&mut self, mo: &Arc<MemoryObject>, os: &ObjectStateRef) -> &mut ObjectState {
        if os.cow_owner != self.cow_key || !self.objects.contains_key(&mo.id) {
            log!(log::MEMORY, format!("copy on write of object {} for key {}", mo.id, self.cow_key));
            let mut copy = ObjectState::clone(os);
            copy.cow_owner = self.cow_key;
            self.ids_to_objects.insert(mo.id, mo.clone());
            self.objects.insert(mo.id, (mo.clone(), Arc::new(copy)));
        }
        match self.objects.get_mut(&mo.id) {
            Some((_, os)) => Arc::make_mut(os),
            None => unreachable!("object {} bound above", mo.id),
        }
    }

    /// Resolution of a pointer with a constant base and value, by
    /// inspection only.
    pub fn resolve_one_constant(&self, pointer: &PointerExp, _object_type: &KType) -> ResolveResult<ObjectPair> {
        let (base, address) = match (pointer.constant_base(), pointer.constant_value()) {
            (Some(base), Some(address)) => (base, address),
            _ => return ResolveResult::None,
        };
        let resolution = match self.objects.get(&base) {
            Some(pair) => pair.clone(),
            None => return ResolveResult::None,
        };
        let mo = &resolution.0;

        let size = match mo.concrete_size() {
            Some(size) => size,
            None => return ResolveResult::Ok(resolution),
        };
        let object_address = match mo.concrete_address() {
            Some(address) => address,
            None => return ResolveResult::Unknown(Some(resolution)),
        };

        if (size == 0 && address == object_address) || address.wrapping_sub(object_address) < size {
            ResolveResult::Ok(resolution)
        } else {
            ResolveResult::None
        }
    }

    /// Resolve `pointer` to a single object it may point to.
    pub fn resolve_one(
        &self,
        state: &ExecutionState,
        solver: &mut TimingSolver,
        pointer: &PointerExp,
        object_type: &KType,
        halt: &AtomicBool,
    ) -> ResolveResult<ObjectPair> {
        if pointer.is_constant() {
            if let ResolveResult::Ok(pair) = self.resolve_one_constant(pointer, object_type) {
                return ResolveResult::Ok(pair);
            }
        }

        // Cheap search, succeeds for any in bounds pointer
        let cex = match solver.get_pointer_value(&state.constraints, pointer, &state.query_meta) {
            Ok(cex) => cex,
            Err(_) => return ResolveResult::Unknown(None),
        };
        if let ResolveResult::Ok(pair) = self.resolve_one_constant(&cex, object_type) {
            return ResolveResult::Ok(pair);
        }

        match pointer.aliased_bases() {
            Some(bases) => {
                for base in bases {
                    let pair = match self.objects.get(&base) {
                        Some(pair) => pair.clone(),
                        None => continue,
                    };
                    if halt.load(Ordering::Relaxed) {
                        break;
                    }
                    match solver.may_be_true(&state.constraints, &pair.0.bounds_check_pointer(pointer), &state.query_meta) {
                        Ok(true) => return ResolveResult::Ok(pair),
                        Ok(false) => (),
                        Err(_) => return ResolveResult::Unknown(None),
                    }
                }
                ResolveResult::None
            }
            None => self.resolve_one_symbolic(state, solver, pointer, object_type, halt),
        }
    }

    /// Linear scan for the first object `pointer` may point to.
    pub fn resolve_one_symbolic(
        &self,
        state: &ExecutionState,
        solver: &mut TimingSolver,
        pointer: &PointerExp,
        object_type: &KType,
        halt: &AtomicBool,
    ) -> ResolveResult<ObjectPair> {
        let predicate = ResolvePredicate::new(&self.config, state, pointer, object_type, self.complete);

        for (mo, os) in self.objects.values() {
            if !predicate.accepts(mo, os) {
                continue;
            }
            if halt.load(Ordering::Relaxed) {
                break;
            }
            let pair = (mo.clone(), os.clone());
            match solver.may_be_true(&state.constraints, &mo.bounds_check_pointer(pointer), &state.query_meta) {
                Ok(true) => return ResolveResult::Ok(pair),
                Ok(false) => (),
                Err(_) => return ResolveResult::Unknown(Some(pair)),
            }
        }

        ResolveResult::None
    }

    fn check_pointer_in_object(
        &self,
        state: &ExecutionState,
        solver: &mut TimingSolver,
        pointer: &PointerExp,
        pair: ObjectPair,
        rl: &mut ResolutionList,
        max_resolutions: usize,
    ) -> Check {
        let in_bounds = pair.0.bounds_check_pointer(pointer);

        match solver.may_be_true(&state.constraints, &in_bounds, &state.query_meta) {
            Err(_) => Check::Incomplete,
            Ok(false) => Check::Continue,
            Ok(true) => {
                rl.push(pair);
                if rl.len() == 1 {
                    // If the only candidate must contain the pointer we are done.
                    match solver.must_be_true(&state.constraints, &in_bounds, &state.query_meta) {
                        Err(_) => Check::Incomplete,
                        Ok(true) => Check::Complete,
                        Ok(false) => Check::Continue,
                    }
                } else if rl.len() == max_resolutions {
                    Check::Incomplete
                } else {
                    Check::Continue
                }
            }
        }
    }

    /// Every object `pointer` may point to, up to `max_resolutions`
    /// (zero for no limit).
    pub fn resolve(
        &self,
        state: &ExecutionState,
        solver: &mut TimingSolver,
        pointer: &PointerExp,
        object_type: &KType,
        max_resolutions: usize,
        timeout: Option<Duration>,
    ) -> ResolveResult<ResolutionList> {
        if pointer.is_constant() {
            if let ResolveResult::Ok(pair) = self.resolve_one_constant(pointer, object_type) {
                return ResolveResult::Ok(vec![pair]);
            }
        }

        let start = Instant::now();
        let mut rl = Vec::new();

        match pointer.aliased_bases() {
            Some(bases) => {
                for base in bases {
                    let pair = match self.objects.get(&base) {
                        Some(pair) => pair.clone(),
                        None => continue,
                    };
                    if timeout.map_or(false, |t| t < start.elapsed()) {
                        return ResolveResult::Unknown(Some(rl));
                    }
                    match self.check_pointer_in_object(state, solver, pointer, pair, &mut rl, max_resolutions) {
                        Check::Complete => return ResolveResult::Ok(rl),
                        Check::Incomplete => return ResolveResult::Unknown(Some(rl)),
                        Check::Continue => (),
                    }
                }
                ResolveResult::Ok(rl)
            }
            None => self.resolve_symbolic(state, solver, pointer, object_type, max_resolutions, timeout),
        }
    }

    pub fn resolve_symbolic(
        &self,
        state: &ExecutionState,
        solver: &mut TimingSolver,
        pointer: &PointerExp,
        object_type: &KType,
        max_resolutions: usize,
        timeout: Option<Duration>,
    ) -> ResolveResult<ResolutionList> {
        let predicate = ResolvePredicate::new(&self.config, state, pointer, object_type, self.complete);
        let start = Instant::now();
        let mut rl = Vec::new();

        for (mo, os) in self.objects.values() {
            if !predicate.accepts(mo, os) {
                continue;
            }
            if timeout.map_or(false, |t| t < start.elapsed()) {
                return ResolveResult::Unknown(Some(rl));
            }
            let pair = (mo.clone(), os.clone());
            match self.check_pointer_in_object(state, solver, pointer, pair, &mut rl, max_resolutions) {
                Check::Complete => return ResolveResult::Ok(rl),
                Check::Incomplete => return ResolveResult::Unknown(Some(rl)),
                Check::Continue => (),
            }
        }

        ResolveResult::Ok(rl)
    }

    fn copy_candidates(&self) -> impl Iterator<Item = &ObjectPair> {
        self.objects.values().filter(|(mo, _)| !mo.flags.is_user_specified)
    }

    /// Write the contents of every concretely sized, writable object
    /// into `memory`, evaluated under `model`.
    pub fn copy_out_concretes(&self, memory: &mut ExternalMemory, model: &Assignment) {
        for (mo, os) in self.copy_candidates() {
            match (mo.concrete_size(), mo.concrete_address()) {
                (Some(size), Some(address)) if size != 0 && !os.read_only() => {
                    let mut bytes = os.concrete_bytes(model);
                    bytes.truncate(size as usize);
                    memory.write(address, bytes)
                }
                _ => (),
            }
        }
    }

    /// Update objects whose contents in `memory` differ from their
    /// contents under `model`. Returns false if a read only object was
    /// modified.
    pub fn copy_in_concretes(&mut self, symbolics: &mut Symbolics, memory: &ExternalMemory, model: &Assignment) -> bool {
        let candidates: Vec<ObjectPair> = self.copy_candidates().cloned().collect();
        for (mo, os) in candidates {
            let address = match mo.concrete_address() {
                Some(address) => address,
                None => continue,
            };
            let external = match memory.read(address) {
                Some(bytes) => bytes,
                None => continue,
            };
            let size = model.evaluate(&mo.size_expr).min(mo.size) as usize;
            let current = os.concrete_bytes(model);
            if external.len() < size || external[..size] == current[..size] {
                continue;
            }
            if os.read_only() {
                return false;
            }
            let wos = self.get_writeable(&mo, &os);
            for (i, byte) in external[..size].iter().enumerate() {
                // In bounds by construction
                let _ = wos.write8(i as u64, Exp::constant(*byte as u64, crate::expr::INT8));
            }
            if symbolics.contains(&mo) {
                if let ResolveResult::Ok((_, new_os)) = self.find_object(&mo) {
                    symbolics.replace_symbolic(&mo, &os, &new_os);
                }
            }
        }
        true
    }
}
