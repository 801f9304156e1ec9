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

//! Execution states. A state is one path through the program: its
//! position, call stack, memory, path condition and the targets it is
//! being directed towards.
//!
//! States are never cloned implicitly. Every copy goes through
//! `duplicate`, which forks the address space so that object states
//! shared by the copies are copied before either one writes to them.

pub mod mode;
pub mod pool;
pub mod stack;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::adt::persistent::{PersistentMap, PersistentSet};
use crate::address_space::{AddressSpace, ResolveResult};
use crate::config::ResolveConfig;
use crate::events::{EventRecorder, PathIndex};
use crate::expr::{Array, ConstraintSet, ExprRef, PointerExp};
use crate::memory::{MemoryObject, ObjectId, ObjectStateRef};
use crate::module::{BlockRef, InstRef, KFunction, KModule};
use crate::ptree::NodeId;
use crate::solver::QueryMetaData;
use crate::target::{ReachWithError, Target};
use crate::target_forest::{TargetForest, TargetsHistory};

pub use mode::StateKind;
pub use pool::StatePool;
pub use stack::ExecutionStack;

pub type StateId = u32;

/// Source of state identifiers, shared by every state of one
/// exploration.
#[derive(Clone, Debug)]
pub struct StateIds {
    next: Arc<AtomicU32>,
}

impl Default for StateIds {
    fn default() -> Self {
        StateIds { next: Arc::new(AtomicU32::new(1)) }
    }
}

impl StateIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&self) -> StateId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The most recently issued identifier.
    pub fn last(&self) -> StateId {
        self.next.load(Ordering::Relaxed) - 1
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    Exit,
    Interrupted,
    MaxDepth,
    MaxInstructions,
    OutOfMemory,
    /// The solver could not decide a query needed to continue
    Solver,
    MemoryError(String),
    Error(ReachWithError),
}

impl TerminationReason {
    pub fn is_error(&self) -> bool {
        matches!(self, TerminationReason::MemoryError(_) | TerminationReason::Error(_))
    }

    pub fn is_early(&self) -> bool {
        matches!(
            self,
            TerminationReason::Interrupted
                | TerminationReason::MaxDepth
                | TerminationReason::MaxInstructions
                | TerminationReason::OutOfMemory
                | TerminationReason::Solver
        )
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TerminationReason::*;
        match self {
            Exit => write!(f, "exit"),
            Interrupted => write!(f, "interrupted"),
            MaxDepth => write!(f, "max depth"),
            MaxInstructions => write!(f, "max instructions"),
            OutOfMemory => write!(f, "out of memory"),
            Solver => write!(f, "solver failure"),
            MemoryError(msg) => write!(f, "memory error: {}", msg),
            Error(error) => write!(f, "{}", error),
        }
    }
}

/// A symbolic array backing an object, numbered in creation order.
#[derive(Clone, Debug)]
pub struct Symbolic {
    pub object: Arc<MemoryObject>,
    pub object_state: ObjectStateRef,
    pub num: u64,
}

impl Symbolic {
    pub fn array(&self) -> Option<&Arc<Array>> {
        self.object_state.source()
    }
}

impl PartialEq for Symbolic {
    fn eq(&self, other: &Self) -> bool {
        self.num == other.num
    }
}

impl Eq for Symbolic {}

impl PartialOrd for Symbolic {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbolic {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.num.cmp(&other.num)
    }
}

/// The symbolic objects of a state, by object.
#[derive(Clone, Debug, Default)]
pub struct Symbolics {
    objects: PersistentMap<ObjectId, PersistentSet<Symbolic>>,
    next_num: u64,
}

impl Symbolics {
    pub fn contains(&self, mo: &MemoryObject) -> bool {
        self.objects.contains_key(&mo.id)
    }

    pub fn len(&self) -> usize {
        self.objects.values().map(|set| set.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn add_symbolic(&mut self, mo: &Arc<MemoryObject>, os: &ObjectStateRef) -> u64 {
        let num = self.next_num;
        self.next_num += 1;
        let symbolic = Symbolic { object: mo.clone(), object_state: os.clone(), num };
        let set = self.objects.get_or(&mo.id, PersistentSet::new()).with(symbolic);
        self.objects.insert(mo.id, set);
        num
    }

    /// Point the symbolic of `mo` recorded with `old` at `new`, keeping
    /// its number. Returns false if there is no such symbolic.
    pub fn replace_symbolic(&mut self, mo: &MemoryObject, old: &ObjectStateRef, new: &ObjectStateRef) -> bool {
        let set = match self.objects.get(&mo.id) {
            Some(set) => set,
            None => return false,
        };
        let found = match set.iter().find(|s| Arc::ptr_eq(&s.object_state, old)) {
            Some(symbolic) => symbolic.clone(),
            None => return false,
        };
        let replaced = Symbolic { object_state: new.clone(), ..found.clone() };
        let set = set.without(&found).with(replaced);
        self.objects.insert(mo.id, set);
        true
    }

    /// Move the symbolic recorded for `old_mo` with `old_os` to a new
    /// object, e.g. after the object was reallocated.
    pub fn replace_memory_object(
        &mut self,
        old_mo: &MemoryObject,
        new_mo: &Arc<MemoryObject>,
        old_os: &ObjectStateRef,
        new_os: &ObjectStateRef,
    ) -> bool {
        let set = match self.objects.get(&old_mo.id) {
            Some(set) => set.clone(),
            None => return false,
        };
        let found = match set.iter().find(|s| Arc::ptr_eq(&s.object_state, old_os)) {
            Some(symbolic) => symbolic.clone(),
            None => return false,
        };
        let remaining = set.without(&found);
        if remaining.is_empty() {
            self.objects.remove(&old_mo.id);
        } else {
            self.objects.insert(old_mo.id, remaining);
        }
        let moved = Symbolic { object: new_mo.clone(), object_state: new_os.clone(), num: found.num };
        let set = self.objects.get_or(&new_mo.id, PersistentSet::new()).with(moved);
        self.objects.insert(new_mo.id, set);
        true
    }

    pub fn find_memory_object(&self, array: &Array) -> Option<Arc<MemoryObject>> {
        self.objects
            .values()
            .flat_map(|set| set.iter())
            .find(|s| s.array().map_or(false, |a| **a == *array))
            .map(|s| s.object.clone())
    }

    /// Every symbolic, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbolic> {
        let mut all: Vec<&Symbolic> = self.objects.values().flat_map(|set| set.iter()).collect();
        all.sort();
        all.into_iter()
    }
}

type Subobject = (PointerExp, u32);

/// Floor of the base two logarithm, with `ulog2(0)` saturating to
/// `u32::MAX`.
pub fn ulog2(n: u64) -> u32 {
    if n == 0 {
        u32::MAX
    } else {
        63 - n.leading_zeros()
    }
}

#[derive(Debug)]
pub struct ExecutionState {
    pub id: StateId,
    ids: StateIds,

    /// Where this state started
    pub init_pc: InstRef,
    /// The next instruction to execute
    pub pc: InstRef,
    /// The instruction executed last
    pub prev_pc: InstRef,
    pub stack: ExecutionStack,
    pub incoming_block: Option<BlockRef>,

    /// Number of forks on the path to this state
    pub depth: u32,
    /// Blocks whose terminator this state has executed
    pub level: PersistentSet<BlockRef>,
    /// How often each block's terminator was executed on this path
    pub multilevel: PersistentMap<BlockRef, u64>,

    pub address_space: AddressSpace,
    pub constraints: ConstraintSet,
    pub events: EventRecorder,
    /// Position along the path, advanced by the interpreter
    pub path_index: PathIndex,
    pub target_forest: TargetForest,
    pub query_meta: QueryMetaData,
    pub covered_lines: BTreeMap<String, BTreeSet<u32>>,
    pub ptree_node: Option<NodeId>,
    pub symbolics: Symbolics,
    resolved_pointers: PersistentMap<ExprRef, PersistentSet<ObjectId>>,
    resolved_subobjects: PersistentMap<Subobject, PersistentSet<ObjectId>>,
    pub cex_preferences: PersistentSet<ExprRef>,
    /// Used to give symbolic arrays unique names
    pub array_names: BTreeMap<String, u64>,

    pub stepped_instructions: u64,
    pub stepped_memory_instructions: u64,
    pub insts_since_cov_new: u32,
    covered_new: VecDeque<Arc<AtomicBool>>,
    covered_new_error: Arc<AtomicBool>,

    pub fork_disabled: bool,
    pub return_value: Option<ExprRef>,
    /// The error raised by the last executed instruction, if any
    pub error: ReachWithError,

    prev_targets: PersistentSet<Target>,
    targets: PersistentSet<Target>,
    prev_history: Arc<TargetsHistory>,
    history: Arc<TargetsHistory>,
    is_targeted: bool,
    are_targets_changed: bool,

    pub kind: StateKind,
}

impl ExecutionState {
    /// A state with an empty stack, positioned nowhere in particular.
    pub fn new(ids: &StateIds, config: Arc<ResolveConfig>, start: InstRef) -> Self {
        let id = ids.fresh();
        ExecutionState {
            id,
            ids: ids.clone(),
            init_pc: start,
            pc: start,
            prev_pc: start,
            stack: ExecutionStack::new(),
            incoming_block: None,
            depth: 0,
            level: PersistentSet::new(),
            multilevel: PersistentMap::new(),
            address_space: AddressSpace::new(config),
            constraints: ConstraintSet::new(),
            events: EventRecorder::new(),
            path_index: PathIndex::default(),
            target_forest: TargetForest::default(),
            query_meta: QueryMetaData::new(id),
            covered_lines: BTreeMap::new(),
            ptree_node: None,
            symbolics: Symbolics::default(),
            resolved_pointers: PersistentMap::new(),
            resolved_subobjects: PersistentMap::new(),
            cex_preferences: PersistentSet::new(),
            array_names: BTreeMap::new(),
            stepped_instructions: 0,
            stepped_memory_instructions: 0,
            insts_since_cov_new: 0,
            covered_new: VecDeque::new(),
            covered_new_error: Arc::new(AtomicBool::new(false)),
            fork_disabled: false,
            return_value: None,
            error: ReachWithError::None,
            prev_targets: PersistentSet::new(),
            targets: PersistentSet::new(),
            prev_history: TargetsHistory::create(),
            history: TargetsHistory::create(),
            is_targeted: false,
            are_targets_changed: false,
            kind: StateKind::default(),
        }
    }

    /// A state at the entry of `function`.
    pub fn for_function(ids: &StateIds, config: Arc<ResolveConfig>, function: &KFunction) -> Self {
        Self::for_block(ids, config, function, function.entry().id)
    }

    /// A state at the start of `block` with a frame for `function`.
    pub fn for_block(ids: &StateIds, config: Arc<ResolveConfig>, function: &KFunction, block: BlockRef) -> Self {
        let start = function.blocks[block.block as usize].first_instruction();
        let mut state = Self::new(ids, config, start);
        state.push_frame(None, function);
        state
    }

    fn set_id(&mut self) {
        self.id = self.ids.fresh();
        self.query_meta.id = self.id
    }

    /// A copy of this state with the same identifier. The address
    /// spaces of both states are forked.
    fn duplicate(&mut self) -> ExecutionState {
        ExecutionState {
            id: self.id,
            ids: self.ids.clone(),
            init_pc: self.init_pc,
            pc: self.pc,
            prev_pc: self.prev_pc,
            stack: self.stack.clone(),
            incoming_block: self.incoming_block,
            depth: self.depth,
            level: self.level.clone(),
            multilevel: self.multilevel.clone(),
            address_space: self.address_space.fork(),
            constraints: self.constraints.clone(),
            events: self.events.clone(),
            path_index: self.path_index,
            target_forest: self.target_forest.clone(),
            query_meta: self.query_meta.clone(),
            covered_lines: self.covered_lines.clone(),
            ptree_node: self.ptree_node,
            symbolics: self.symbolics.clone(),
            resolved_pointers: self.resolved_pointers.clone(),
            resolved_subobjects: self.resolved_subobjects.clone(),
            cex_preferences: self.cex_preferences.clone(),
            array_names: self.array_names.clone(),
            stepped_instructions: self.stepped_instructions,
            stepped_memory_instructions: self.stepped_memory_instructions,
            insts_since_cov_new: self.insts_since_cov_new,
            covered_new: self.covered_new.clone(),
            covered_new_error: self.covered_new_error.clone(),
            fork_disabled: self.fork_disabled,
            return_value: self.return_value.clone(),
            error: self.error,
            prev_targets: self.prev_targets.clone(),
            targets: self.targets.clone(),
            prev_history: self.prev_history.clone(),
            history: self.history.clone(),
            is_targeted: self.is_targeted,
            are_targets_changed: self.are_targets_changed,
            kind: self.kind.clone(),
        }
    }

    /// Fork this state. Both states count the fork in their depth; the
    /// new state gets a fresh identifier, no covered lines, and starts
    /// a new step of target tracking.
    pub fn branch(&mut self) -> ExecutionState {
        self.depth += 1;
        let mut forked = self.duplicate();
        forked.set_id();
        forked.covered_lines.clear();
        forked.prev_targets = forked.targets.clone();
        forked.prev_history = forked.history.clone();
        forked
    }

    /// A copy with a fresh identifier.
    pub fn copy(&mut self) -> ExecutionState {
        let mut copy = self.duplicate();
        copy.set_id();
        copy
    }

    /// A fresh state sharing only the identifier source and resolution
    /// settings of this one.
    pub fn empty(&self) -> ExecutionState {
        ExecutionState::new(&self.ids, Arc::new(self.address_space.config().clone()), self.pc)
    }

    /// A copy entering `function` from `caller`.
    pub fn with_stack_frame(&mut self, caller: Option<InstRef>, function: &KFunction) -> ExecutionState {
        let mut state = self.copy();
        state.push_frame(caller, function);
        state.init_pc = function.entry().first_instruction();
        state.pc = state.init_pc;
        state.prev_pc = state.pc;
        state
    }

    pub fn with_function(&mut self, function: &KFunction) -> ExecutionState {
        self.with_stack_frame(None, function)
    }

    /// A copy of a state with an empty stack, starting at `inst`.
    pub fn with_instruction(&mut self, module: &KModule, inst: InstRef) -> ExecutionState {
        assert!(self.stack.is_empty(), "with_instruction needs an empty stack");
        let mut state = self.copy();
        state.push_frame(None, module.function(inst.function));
        state.stack.reset_stack_balance();
        state.init_pc = inst;
        state.pc = inst;
        state.prev_pc = inst;
        state
    }

    pub fn push_frame(&mut self, caller: Option<InstRef>, function: &KFunction) {
        self.stack.push_frame(caller, function)
    }

    /// Pop the top frame, releasing the objects allocated in it.
    pub fn pop_frame(&mut self) {
        let frame = self.stack.pop_frame();
        for id in frame.allocas {
            if let ResolveResult::Ok((mo, _)) = self.address_space.find_object_by_id(id) {
                self.remove_pointer_resolutions(&mo);
                self.address_space.unbind_object(&mo)
            }
        }
    }

    /// Record `mo` as allocated in the current frame.
    pub fn add_alloca(&mut self, mo: &MemoryObject) {
        if let Some(frame) = self.stack.top_mut() {
            frame.allocas.push(mo.id)
        }
    }

    pub fn in_symbolics(&self, mo: &MemoryObject) -> bool {
        self.symbolics.contains(mo)
    }

    pub fn add_symbolic(&mut self, mo: &Arc<MemoryObject>, os: &ObjectStateRef) -> u64 {
        self.symbolics.add_symbolic(mo, os)
    }

    pub fn replace_symbolic(&mut self, mo: &MemoryObject, old: &ObjectStateRef, new: &ObjectStateRef) -> bool {
        self.symbolics.replace_symbolic(mo, old, new)
    }

    pub fn replace_memory_object_from_symbolics(
        &mut self,
        old_mo: &MemoryObject,
        new_mo: &Arc<MemoryObject>,
        old_os: &ObjectStateRef,
        new_os: &ObjectStateRef,
    ) -> bool {
        self.symbolics.replace_memory_object(old_mo, new_mo, old_os, new_os)
    }

    pub fn find_memory_object(&self, array: &Array) -> Option<Arc<MemoryObject>> {
        self.symbolics.find_memory_object(array)
    }

    /// The symbolic object `exp` reads from and the offset of the
    /// first read.
    pub fn get_base(&self, exp: &ExprRef) -> Option<(Arc<MemoryObject>, u64)> {
        let mut first = None;
        exp.visit_reads(&mut |array, offset, _| {
            if first.is_none() {
                first = Some((array.clone(), offset))
            }
        });
        let (array, offset) = first?;
        self.find_memory_object(&array).map(|mo| (mo, offset))
    }

    pub fn add_pointer_resolution(&mut self, address: &PointerExp, mo: &MemoryObject, size: u32) {
        if address.base.is_constant() {
            return;
        }
        let ids = self.resolved_pointers.get_or(&address.base, PersistentSet::new()).with(mo.id);
        self.resolved_pointers.insert(address.base.clone(), ids);
        let key = (address.clone(), size);
        let ids = self.resolved_subobjects.get_or(&key, PersistentSet::new()).with(mo.id);
        self.resolved_subobjects.insert(key, ids);
    }

    /// Like `add_pointer_resolution`, forgetting earlier resolutions
    /// of the same pointer.
    pub fn add_unique_pointer_resolution(&mut self, address: &PointerExp, mo: &MemoryObject, size: u32) {
        if address.base.is_constant() {
            return;
        }
        self.remove_pointer_resolutions_at(address, size);
        self.add_pointer_resolution(address, mo, size)
    }

    pub fn remove_pointer_resolutions_at(&mut self, address: &PointerExp, size: u32) {
        if address.base.is_constant() {
            return;
        }
        self.resolved_pointers.remove(&address.base);
        self.resolved_subobjects.remove(&(address.clone(), size));
    }

    /// Forget every resolution to `mo`.
    pub fn remove_pointer_resolutions(&mut self, mo: &MemoryObject) {
        fn purge<K: Ord + Clone>(map: &mut PersistentMap<K, PersistentSet<ObjectId>>, id: ObjectId) {
            let affected: Vec<K> = map.iter().filter(|(_, ids)| ids.contains(&id)).map(|(k, _)| k.clone()).collect();
            for key in affected {
                let ids = match map.get(&key) {
                    Some(ids) => ids.without(&id),
                    None => continue,
                };
                if ids.is_empty() {
                    map.remove(&key);
                } else {
                    map.insert(key, ids);
                }
            }
        }
        purge(&mut self.resolved_pointers, mo.id);
        purge(&mut self.resolved_subobjects, mo.id)
    }

    pub fn resolved_pointers(&self, base: &ExprRef) -> Option<&PersistentSet<ObjectId>> {
        self.resolved_pointers.get(base)
    }

    pub fn resolved_subobjects(&self, address: &PointerExp, size: u32) -> Option<&PersistentSet<ObjectId>> {
        self.resolved_subobjects.get(&(address.clone(), size))
    }

    /// Whether any cached resolution refers to the object `id`.
    pub fn has_resolution_to(&self, id: ObjectId) -> bool {
        self.resolved_pointers.values().any(|ids| ids.contains(&id))
            || self.resolved_subobjects.values().any(|ids| ids.contains(&id))
    }

    pub fn add_constraint(&mut self, constraint: ExprRef) {
        self.constraints.add(constraint)
    }

    pub fn add_cex_preference(&mut self, preference: ExprRef) {
        self.cex_preferences.insert(preference)
    }

    pub fn init_pc_block(&self) -> BlockRef {
        self.init_pc.block_ref()
    }

    pub fn pc_block(&self) -> BlockRef {
        self.pc.block_ref()
    }

    pub fn prev_pc_block(&self) -> BlockRef {
        self.prev_pc.block_ref()
    }

    /// The last step moved control to a different block.
    pub fn is_transfered(&self) -> bool {
        self.prev_pc_block() != self.pc_block()
    }

    /// Count the block just left, if the last instruction was its
    /// terminator.
    pub fn increase_level(&mut self, module: &KModule) {
        if !module.is_terminator(self.prev_pc) {
            return;
        }
        let source = self.prev_pc_block();
        if let Some(info) = self.stack.top_info_mut() {
            let level = info.multilevel.get_or(&source, 0);
            info.multilevel.insert(source, level + 1);
        }
        let level = self.multilevel.get_or(&source, 0);
        self.multilevel.insert(source, level + 1);
        self.level.insert(source)
    }

    pub fn visited(&self, block: BlockRef) -> bool {
        self.level.contains(&block)
    }

    pub fn reached_target(&self, module: &KModule, target: &Target) -> bool {
        if self.stepped_instructions == 0 {
            return false;
        }
        let block = module.block(target.block());
        if target.at_return() {
            self.prev_pc == block.last_instruction()
        } else {
            self.pc == block.first_instruction()
        }
    }

    /// The current block has been entered more than `bound` times
    /// within the current call, or the current function has more than
    /// `bound` live frames.
    pub fn is_cycled(&self, module: &KModule, bound: u64) -> bool {
        if bound == 0 {
            return false;
        }
        if module.is_terminator(self.prev_pc) {
            if let Some(info) = self.stack.info_stack().last() {
                return info.multilevel.get(&self.pc_block()).map_or(false, |level| *level > bound);
            }
        }
        if module.is_first_in_entry(self.pc) {
            if let Some(frame) = self.stack.call_stack().last() {
                return self.stack.multilevel.get_or(&frame.function, 0) > bound;
            }
        }
        false
    }

    pub fn is_stuck(&self, module: &KModule, bound: u64) -> bool {
        if self.depth == 0 {
            return false;
        }
        self.is_cycled(module, bound) && ulog2(self.depth as u64) as u64 > bound
    }

    pub fn is_covered_new(&self) -> bool {
        self.covered_new.back().map_or(false, |signal| signal.load(Ordering::Relaxed))
    }

    pub fn is_covered_new_error(&self) -> bool {
        self.covered_new_error.load(Ordering::Relaxed)
    }

    /// Signal that this state covered new code. The signal is shared
    /// with states forked from this one until it is cleared.
    pub fn cover_new(&mut self) {
        self.covered_new.push_back(Arc::new(AtomicBool::new(true)));
        self.covered_new_error.store(false, Ordering::Relaxed);
        self.covered_new_error = Arc::new(AtomicBool::new(true))
    }

    /// Drop signals that have been cleared through another state.
    pub fn update_covered_new(&mut self) {
        while self.covered_new.front().map_or(false, |signal| !signal.load(Ordering::Relaxed)) {
            self.covered_new.pop_front();
        }
    }

    pub fn clear_covered_new(&mut self) {
        for signal in &self.covered_new {
            signal.store(false, Ordering::Relaxed)
        }
        self.covered_new.clear()
    }

    pub fn clear_covered_new_error(&mut self) {
        self.covered_new_error.store(false, Ordering::Relaxed)
    }

    pub fn prev_targets(&self) -> &PersistentSet<Target> {
        &self.prev_targets
    }

    pub fn targets(&self) -> &PersistentSet<Target> {
        &self.targets
    }

    pub fn prev_history(&self) -> &Arc<TargetsHistory> {
        &self.prev_history
    }

    pub fn history(&self) -> &Arc<TargetsHistory> {
        &self.history
    }

    pub fn is_targeted(&self) -> bool {
        self.is_targeted
    }

    pub fn set_targeted(&mut self, targeted: bool) {
        self.is_targeted = targeted
    }

    pub fn are_targets_changed(&self) -> bool {
        self.are_targets_changed
    }

    pub fn step_targets_and_history(&mut self) {
        self.prev_history = self.history.clone();
        self.prev_targets = self.targets.clone();
        self.are_targets_changed = false
    }

    pub fn set_targets<I: IntoIterator<Item = Target>>(&mut self, targets: I) {
        self.targets = targets.into_iter().collect();
        self.are_targets_changed = true
    }

    pub fn set_history(&mut self, history: Arc<TargetsHistory>) {
        self.history = history;
        self.are_targets_changed = true
    }

    /// One line per frame, innermost first.
    pub fn dump_stack(&self, module: &KModule) -> String {
        let mut out = String::new();
        let mut position = Some(self.prev_pc);
        for (i, frame) in self.stack.call_stack().iter().rev().enumerate() {
            let function = module.function(frame.function);
            let _ = write!(out, "\t#{} in {}", i, function.name);
            if let Some(inst) = position {
                let block = module.block_of(inst);
                if !function.file.is_empty() {
                    let _ = write!(out, " at {}:{}", function.file, block.first_line);
                }
            }
            out.push('\n');
            position = frame.caller
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::expr::{Exp, SourceKind, INT64};
    use crate::memory::{KType, MemoryManager, ObjectFlags, ObjectState};
    use crate::module::tests::DIAMOND;

    fn setup() -> (KModule, StateIds, ExecutionState) {
        let module = KModule::parse(DIAMOND).unwrap();
        let ids = StateIds::new();
        let main = module.function(module.function_id("main").unwrap());
        let state = ExecutionState::for_function(&ids, Arc::new(ResolveConfig::default()), main);
        (module, ids, state)
    }

    #[test]
    fn test_ulog2() {
        assert_eq!(ulog2(1), 0);
        assert_eq!(ulog2(8), 3);
        assert_eq!(ulog2(9), 3);
        assert_eq!(ulog2(0), u32::MAX)
    }

    #[test]
    fn test_branch() {
        let (_, _, mut s0) = setup();
        s0.covered_lines.entry("main.c".to_string()).or_default().insert(1);
        let s1 = s0.branch();
        assert_eq!(s1.depth, 1);
        assert_ne!(s1.id, s0.id);
        assert!(s1.covered_lines.is_empty());
        assert!(!s0.covered_lines.is_empty());
        assert_eq!(s1.stack.len(), s0.stack.len());
        assert_eq!(s1.query_meta.id, s1.id)
    }

    #[test]
    fn test_with_stack_frame() {
        let (module, _, mut s0) = setup();
        let f = module.function(module.function_id("f").unwrap());
        let caller = module.function(0).blocks[1].last_instruction();
        let s1 = s0.with_stack_frame(Some(caller), f);
        assert_eq!(s1.stack.len(), 2);
        assert_eq!(s0.stack.len(), 1);
        assert_eq!(s1.pc, f.entry().first_instruction());
        assert_eq!(s1.init_pc, s1.pc);

        let mut empty = s0.empty();
        assert!(empty.stack.is_empty());
        let s2 = empty.with_instruction(&module, f.blocks[1].first_instruction());
        assert_eq!(s2.stack.stack_balance(), 0);
        assert_eq!(s2.pc.block, 1)
    }

    #[test]
    fn test_pop_frame_releases_allocas() {
        let (module, _, mut state) = setup();
        let mut memory = MemoryManager::new(&Context::default(), 0x1000, 8);
        let f = module.function(module.function_id("f").unwrap());
        state.push_frame(Some(module.function(0).blocks[1].last_instruction()), f);

        let mo = memory.allocate(8, ObjectFlags { is_local: true, ..ObjectFlags::default() }, None);
        state.address_space.bind_object(&mo, ObjectState::new(mo.clone(), KType::Untyped));
        state.add_alloca(&mo);
        let array = Array::new("p", 8, SourceKind::MakeSymbolic);
        let pointer = PointerExp::new(Exp::read(&array, 0, INT64), Exp::read(&array, 0, INT64));
        state.add_pointer_resolution(&pointer, &mo, 4);
        assert!(state.has_resolution_to(mo.id));

        state.pop_frame();
        assert!(!state.has_resolution_to(mo.id));
        assert!(state.address_space.find_object(&mo).is_none());
        assert_eq!(state.stack.len(), 1)
    }

    #[test]
    fn test_constant_pointers_not_cached() {
        let (_, _, mut state) = setup();
        let mut memory = MemoryManager::new(&Context::default(), 0x1000, 8);
        let mo = memory.allocate(8, ObjectFlags::default(), None);
        state.add_pointer_resolution(&PointerExp::constant(mo.id, 0x1000, INT64), &mo, 8);
        assert!(!state.has_resolution_to(mo.id))
    }

    #[test]
    fn test_symbolics() {
        let (_, _, mut state) = setup();
        let mut memory = MemoryManager::new(&Context::default(), 0x1000, 8);
        let mo = memory.allocate(4, ObjectFlags::default(), None);
        let array = Array::new("input", 4, SourceKind::MakeSymbolic);
        let os = Arc::new(ObjectState::new_symbolic(mo.clone(), KType::Untyped, array.clone(), None));
        assert!(!state.in_symbolics(&mo));
        assert_eq!(state.add_symbolic(&mo, &os), 0);
        assert!(state.in_symbolics(&mo));
        assert_eq!(state.find_memory_object(&array).map(|m| m.id), Some(mo.id));

        let copy = Arc::new(ObjectState::clone(&os));
        assert!(state.replace_symbolic(&mo, &os, &copy));
        assert!(!state.replace_symbolic(&mo, &os, &copy));
        assert!(state.replace_symbolic(&mo, &copy, &copy));

        let second = Array::new("input2", 4, SourceKind::MakeSymbolic);
        let os2 = Arc::new(ObjectState::new_symbolic(mo.clone(), KType::Untyped, second, None));
        assert_eq!(state.add_symbolic(&mo, &os2), 1);
        assert_eq!(state.symbolics.len(), 2);
        assert!(state.replace_symbolic(&mo, &os2, &os2));
        assert_eq!(state.symbolics.len(), 2);

        let moved = memory.reallocate(&mo, 16);
        assert!(state.replace_memory_object_from_symbolics(&mo, &moved, &copy, &copy));
        assert_eq!(state.symbolics.iter().map(|s| s.num).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(state.get_base(&Exp::read(&array, 2, 8)).map(|(_, offset)| offset), Some(2))
    }

    #[test]
    fn test_covered_new_shared() {
        let (_, _, mut s0) = setup();
        s0.cover_new();
        assert!(s0.is_covered_new());
        assert!(s0.is_covered_new_error());
        let mut s1 = s0.branch();
        assert!(s1.is_covered_new());
        s1.clear_covered_new();
        assert!(!s0.is_covered_new());
        s0.update_covered_new();
        assert!(!s0.is_covered_new());
        s0.clear_covered_new_error();
        assert!(!s1.is_covered_new_error())
    }

    #[test]
    fn test_levels() {
        let (module, _, mut state) = setup();
        let entry = module.function(0).entry();
        state.prev_pc = entry.last_instruction();
        state.pc = module.function(0).blocks[1].first_instruction();
        state.stepped_instructions = 2;
        state.increase_level(&module);
        state.increase_level(&module);
        assert!(state.visited(entry.id));
        assert!(!state.visited(BlockRef::new(0, 1)));
        assert_eq!(state.multilevel.get(&entry.id), Some(&2));
        let left = Target::new(&module, BlockRef::new(0, 1), ReachWithError::None);
        assert!(state.reached_target(&module, &left));
        // Nothing has been recorded for the current block yet
        assert!(!state.is_cycled(&module, 1));
        assert!(state.dump_stack(&module).contains("in main at main.c:1"))
    }

    #[test]
    fn test_repeated_block_cycles() {
        let (module, _, mut state) = setup();
        let entry = module.function(0).entry();
        state.prev_pc = entry.last_instruction();
        state.pc = entry.first_instruction();
        state.increase_level(&module);
        assert_eq!(state.multilevel.get(&entry.id), Some(&1));
        assert!(!state.is_cycled(&module, 1));
        state.increase_level(&module);
        state.increase_level(&module);
        assert_eq!(state.multilevel.get(&entry.id), Some(&3));
        assert_eq!(state.stack.info_stack().last().map(|info| info.multilevel.get_or(&entry.id, 0)), Some(3));
        assert!(state.is_cycled(&module, 2));
        assert!(!state.is_cycled(&module, 3));
        // Too shallow to be stuck
        assert!(!state.is_stuck(&module, 1));
        state.depth = 4;
        assert!(state.is_stuck(&module, 1));
        assert!(!state.is_stuck(&module, 2))
    }

    #[test]
    fn test_recursion_cycles() {
        let (module, _, mut state) = setup();
        let main = module.function(0);
        state.prev_pc = main.entry().first_instruction();
        state.pc = main.entry().first_instruction();
        assert!(!state.is_cycled(&module, 1));
        state.push_frame(Some(main.blocks[1].last_instruction()), main);
        assert!(state.is_cycled(&module, 1));
        state.pop_frame();
        assert!(!state.is_cycled(&module, 1))
    }

    #[test]
    fn test_resolutions_accumulate() {
        let (_, _, mut state) = setup();
        let mut memory = MemoryManager::new(&Context::default(), 0x1000, 8);
        let a = memory.allocate(4, ObjectFlags::default(), None);
        let b = memory.allocate(4, ObjectFlags::default(), None);
        let index = Array::new("index", 8, SourceKind::MakeSymbolic);
        let base = Exp::read(&index, 0, 64);
        let pointer = PointerExp::new(base.clone(), Exp::constant(a.address, 64));
        state.add_pointer_resolution(&pointer, &a, 4);
        state.add_pointer_resolution(&pointer, &b, 4);
        let ids: Vec<ObjectId> = state.resolved_pointers(&base).map(|ids| ids.iter().copied().collect()).unwrap_or_default();
        assert_eq!(ids, vec![a.id, b.id]);
        assert_eq!(state.resolved_subobjects(&pointer, 4).map(|ids| ids.len()), Some(2));

        state.remove_pointer_resolutions(&a);
        let ids: Vec<ObjectId> = state.resolved_pointers(&base).map(|ids| ids.iter().copied().collect()).unwrap_or_default();
        assert_eq!(ids, vec![b.id]);
        assert!(!state.has_resolution_to(a.id))
    }
}
