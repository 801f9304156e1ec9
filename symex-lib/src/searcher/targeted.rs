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

//! Directing states towards a single target block.
//!
//! A state's weight is its distance to the target, so the queue always
//! yields the closest state. Weights fall into two bands: `[0, 32)`
//! for states already in the function containing the target, and
//! `[32, 64)` for states that must first enter a call towards it or
//! return to a caller that can reach it.

use std::collections::BTreeMap;

use super::{SearchContext, Searcher};
use crate::adt::weighted_queue::WeightedQueue;
use crate::log;
use crate::module::{BlockRef, FunctionId};
use crate::state::{ulog2, ExecutionState, StateId, StatePool};
use crate::target::Target;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightResult {
    Continue(u32),
    Done,
    Miss,
}

pub struct TargetedSearcher {
    states: WeightedQueue<StateId>,
    target: Target,
    ctx: SearchContext,
    distance_to_target_function: BTreeMap<FunctionId, u32>,
    reached_on_last_update: Vec<StateId>,
}

impl TargetedSearcher {
    pub fn new(target: Target, ctx: SearchContext) -> Self {
        let distance_to_target_function = ctx.distance.backward_function_distance(target.function()).clone();
        TargetedSearcher {
            states: WeightedQueue::new(),
            target,
            ctx,
            distance_to_target_function,
            reached_on_last_update: Vec::new(),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Distance in calls from `block` of `function` to the function
    /// containing the target, or zero if the target block itself is
    /// reachable.
    fn distance_in_call_graph(&self, function: FunctionId, block: BlockRef) -> Option<u32> {
        let dist = self.ctx.distance.distance(block);
        if function == self.target.function() && dist.contains_key(&self.target.block()) {
            return Some(0);
        }
        self.ctx
            .module
            .function(function)
            .call_blocks()
            .filter(|call| dist.contains_key(&call.id))
            .filter_map(|call| call.callee())
            .filter_map(|callee| self.distance_to_target_function.get(&callee))
            .map(|d| d + 1)
            .min()
    }

    fn local_weight(&self, state: &ExecutionState, local_targets: &[BlockRef]) -> WeightResult {
        let current = state.pc_block();
        let dist = self.ctx.distance.distance(current);
        let local = match local_targets.iter().filter_map(|b| dist.get(b)).min() {
            Some(local) => *local,
            None => return WeightResult::Miss,
        };
        if local == 0 && (state.prev_pc_block() != current || self.target.should_fail_on_this_target()) {
            return WeightResult::Done;
        }
        let weight = state.stepped_memory_instructions.saturating_add(local as u64);
        WeightResult::Continue(ulog2(weight))
    }

    fn pre_target_weight(&self, state: &ExecutionState) -> WeightResult {
        let function = self.ctx.module.function(state.pc.function);
        let local_targets: Vec<BlockRef> = function
            .call_blocks()
            .filter(|call| call.callee().map_or(false, |callee| self.distance_to_target_function.contains_key(&callee)))
            .map(|call| call.id)
            .collect();
        self.outer_band(state, &local_targets)
    }

    fn post_target_weight(&self, state: &ExecutionState) -> WeightResult {
        let function = self.ctx.module.function(state.pc.function);
        let local_targets: Vec<BlockRef> = function.return_blocks().map(|ret| ret.id).collect();
        self.outer_band(state, &local_targets)
    }

    fn outer_band(&self, state: &ExecutionState, local_targets: &[BlockRef]) -> WeightResult {
        if local_targets.is_empty() {
            return WeightResult::Miss;
        }
        match self.local_weight(state, local_targets) {
            WeightResult::Continue(weight) => WeightResult::Continue(weight.saturating_add(32)),
            WeightResult::Done => WeightResult::Continue(32),
            WeightResult::Miss => WeightResult::Miss,
        }
    }

    pub fn weight(&self, state: &ExecutionState) -> WeightResult {
        let target_block = self.ctx.module.block(self.target.block());
        if self.target.at_return() && !self.target.should_fail_on_this_target() {
            if state.prev_pc == target_block.last_instruction() {
                return WeightResult::Done;
            } else if state.pc_block() == self.target.block() {
                return WeightResult::Continue(0);
            }
        }

        if state.pc.index != 0 {
            if let Some(weight) = self.states.try_get_weight(&state.id) {
                return WeightResult::Continue(weight);
            }
        }

        let mut block = state.pc_block();
        let mut min_call_weight = u32::MAX;
        let mut min_frame = u32::MAX;
        for (frame_num, frame) in state.stack.call_stack().iter().rev().enumerate() {
            let frame_num = frame_num as u32;
            if let Some(distance) = self.distance_in_call_graph(frame.function, block) {
                let call_weight = distance * 2 + frame_num;
                if call_weight < min_call_weight {
                    min_call_weight = call_weight;
                    min_frame = frame_num
                }
            }
            if let Some(caller) = frame.caller {
                block = caller.block_ref()
            }
            if min_call_weight < frame_num + 1 {
                break;
            }
        }

        let result = if min_call_weight == 0 {
            self.local_weight(state, &[self.target.block()])
        } else if min_frame == 0 {
            self.pre_target_weight(state)
        } else if min_frame != u32::MAX {
            self.post_target_weight(state)
        } else {
            WeightResult::Miss
        };

        if result == WeightResult::Done && self.target.should_fail_on_this_target() && state.error != self.target.error() {
            WeightResult::Continue(0)
        } else {
            result
        }
    }

    /// States that reached the target during the last update.
    pub fn reached(&self) -> &[StateId] {
        &self.reached_on_last_update
    }

    /// Forget the reached states, stepping their forests past the target.
    pub fn remove_reached(&mut self, states: &mut StatePool) {
        for id in self.reached_on_last_update.drain(..) {
            self.states.remove(&id);
            if let Some(state) = states.get_mut(id) {
                state.target_forest.step_to(&self.target)
            }
        }
    }

    /// Stop directing the remaining states towards the target.
    pub fn clear(&mut self, states: &mut StatePool) {
        let remaining: Vec<StateId> = self.states.iter().copied().collect();
        for id in remaining {
            self.states.remove(&id);
            if let Some(state) = states.get_mut(id) {
                state.target_forest.remove(&self.target)
            }
        }
    }
}

impl Searcher for TargetedSearcher {
    fn select_state(&mut self, _: &StatePool) -> StateId {
        match self.states.choose() {
            Some(id) => *id,
            None => panic!("select_state on an empty TargetedSearcher"),
        }
    }

    fn update(&mut self, states: &mut StatePool, current: Option<StateId>, added: &[StateId], removed: &[StateId]) {
        if let Some(current) = current {
            if !removed.contains(&current) {
                match self.weight(&states[current]) {
                    WeightResult::Continue(weight) => self.states.update(current, weight),
                    WeightResult::Done => self.reached_on_last_update.push(current),
                    WeightResult::Miss => {
                        if let Some(state) = states.get_mut(current) {
                            state.target_forest.remove(&self.target)
                        }
                        self.states.remove(&current);
                    }
                }
            }
        }

        for id in added {
            match self.weight(&states[*id]) {
                WeightResult::Continue(weight) => self.states.insert(*id, weight),
                WeightResult::Done => {
                    self.states.insert(*id, 0);
                    self.reached_on_last_update.push(*id)
                }
                WeightResult::Miss => {
                    if let Some(state) = states.get_mut(*id) {
                        state.target_forest.remove(&self.target)
                    }
                }
            }
        }

        let target_last = self.ctx.module.block(self.target.block()).last_instruction();
        for id in removed {
            let state = &states[*id];
            if self.target.at_return() && !self.target.should_fail_on_this_target() && state.prev_pc == target_last {
                self.reached_on_last_update.push(*id);
                continue;
            }
            match self.weight(state) {
                WeightResult::Done => self.reached_on_last_update.push(*id),
                WeightResult::Miss => {
                    if let Some(state) = states.get_mut(*id) {
                        state.target_forest.remove(&self.target)
                    }
                    self.states.remove(id);
                }
                WeightResult::Continue(_) => {
                    self.states.remove(id);
                }
            }
        }

        log!(log::SEARCH, format!("{} tracks {} states, {} reached", self.target, self.states.len(), self.reached_on_last_update.len()))
    }

    fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn name(&self) -> String {
        format!("TargetedSearcher({})", self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::KModule;
    use crate::searcher::tests::{diamond_pool, fork};
    use crate::target::ReachWithError;

    fn target(module: &KModule, function: &str, block: u32, error: ReachWithError) -> Target {
        Target::new(module, BlockRef::new(module.function_id(function).unwrap(), block), error)
    }

    #[test]
    fn test_weight_bands() {
        let (module, mut pool, s0) = diamond_pool();
        let ctx = SearchContext::new(module.clone());

        // The exit block of main is in the same function
        let exit = TargetedSearcher::new(target(&module, "main", 3, ReachWithError::None), ctx.clone());
        match exit.weight(&pool[s0]) {
            WeightResult::Continue(w) => assert!(w < 32),
            other => panic!("unexpected {:?}", other),
        }

        // Reaching the bad block of f needs a call first
        let bad = TargetedSearcher::new(target(&module, "f", 1, ReachWithError::NullPointerException), ctx.clone());
        match bad.weight(&pool[s0]) {
            WeightResult::Continue(w) => assert!((32..64).contains(&w)),
            other => panic!("unexpected {:?}", other),
        }

        // Nothing reaches main's entry again
        let entry = TargetedSearcher::new(target(&module, "main", 0, ReachWithError::None), ctx);
        let state = pool.get_mut(s0).unwrap();
        state.prev_pc = module.function(0).entry().last_instruction();
        state.pc = module.function(0).blocks[2].first_instruction();
        assert_eq!(entry.weight(&pool[s0]), WeightResult::Miss)
    }

    #[test]
    fn test_reached_and_miss() {
        let (module, mut pool, s0) = diamond_pool();
        let ctx = SearchContext::new(module.clone());
        let right = target(&module, "main", 2, ReachWithError::None);
        let left = target(&module, "main", 1, ReachWithError::None);
        let s1 = fork(&mut pool, s0);
        for id in &[s0, s1] {
            let state = pool.get_mut(*id).unwrap();
            state.target_forest.add(right.clone());
        }

        let mut searcher = TargetedSearcher::new(right.clone(), ctx);
        searcher.update(&mut pool, None, &[s0, s1], &[]);
        assert_eq!(searcher.len(), 2);
        assert!(searcher.reached().is_empty());

        // s0 moves into the target block, s1 into the other branch
        let entry_last = module.function(0).entry().last_instruction();
        {
            let state = pool.get_mut(s0).unwrap();
            state.prev_pc = entry_last;
            state.pc = module.block(right.block()).first_instruction();
        }
        {
            let state = pool.get_mut(s1).unwrap();
            state.prev_pc = module.block(left.block()).last_instruction();
            state.pc = module.function(0).blocks[3].first_instruction();
        }
        searcher.update(&mut pool, Some(s0), &[], &[]);
        assert_eq!(searcher.reached(), &[s0]);
        searcher.update(&mut pool, Some(s1), &[], &[]);
        assert_eq!(searcher.len(), 1);
        assert!(!pool[s1].target_forest.contains(&right));

        searcher.remove_reached(&mut pool);
        assert!(searcher.is_empty());
        assert_eq!(pool[s0].target_forest.history().target(), Some(&right))
    }
}
