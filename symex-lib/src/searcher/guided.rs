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

//! A searcher directing states along their target forests.
//!
//! Every `(history, target)` pair found in a live state's forest gets
//! its own `TargetedSearcher`. Selection picks one of these uniformly
//! at random. With coverage guidance a base searcher is also a
//! candidate, and states that are stuck without targets are given a
//! fresh target near them; with error guidance only the targeted
//! searchers are used, and stuck states are paused.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::targeted::TargetedSearcher;
use super::{SearchContext, Searcher};
use crate::log;
use crate::state::{ExecutionState, StateId, StatePool};
use crate::target::{Target, TargetCalculator};
use crate::target_forest::TargetsHistory;

type History = Arc<TargetsHistory>;

enum Guidance {
    Coverage { base: Box<dyn Searcher>, calculator: TargetCalculator },
    Error,
}

/// State movements into and out of targeted searchers, collected
/// before the searchers are updated.
#[derive(Default)]
struct Pending {
    targets: BTreeMap<History, BTreeSet<Target>>,
    added: BTreeMap<(History, Target), Vec<StateId>>,
    removed: BTreeMap<(History, Target), Vec<StateId>>,
}

impl Pending {
    fn touch(&mut self, history: &History, target: &Target) {
        self.targets.entry(history.clone()).or_default().insert(target.clone());
    }

    fn add(&mut self, history: &History, target: &Target, id: StateId) {
        self.touch(history, target);
        self.added.entry((history.clone(), target.clone())).or_default().push(id)
    }

    fn remove(&mut self, history: &History, target: &Target, id: StateId) {
        self.touch(history, target);
        self.removed.entry((history.clone(), target.clone())).or_default().push(id)
    }
}

pub struct GuidedSearcher {
    guidance: Guidance,
    ctx: SearchContext,
    bound: u64,
    rng: StdRng,
    targeted: BTreeMap<History, BTreeMap<Target, TargetedSearcher>>,
    histories_and_targets: Vec<(History, Target)>,
    reached_targets: BTreeMap<History, BTreeSet<Target>>,
    paused: BTreeSet<StateId>,
    reached_states: BTreeMap<Target, BTreeSet<StateId>>,
}

impl GuidedSearcher {
    fn new(guidance: Guidance, ctx: SearchContext, bound: u64, seed: u64) -> Self {
        GuidedSearcher {
            guidance,
            ctx,
            bound,
            rng: StdRng::seed_from_u64(seed),
            targeted: BTreeMap::new(),
            histories_and_targets: Vec::new(),
            reached_targets: BTreeMap::new(),
            paused: BTreeSet::new(),
            reached_states: BTreeMap::new(),
        }
    }

    pub fn with_coverage(
        base: Box<dyn Searcher>,
        calculator: TargetCalculator,
        ctx: SearchContext,
        bound: u64,
        seed: u64,
    ) -> Self {
        Self::new(Guidance::Coverage { base, calculator }, ctx, bound, seed)
    }

    pub fn with_errors(ctx: SearchContext, bound: u64, seed: u64) -> Self {
        Self::new(Guidance::Error, ctx, bound, seed)
    }

    fn is_coverage(&self) -> bool {
        matches!(self.guidance, Guidance::Coverage { .. })
    }

    /// States set aside because they kept cycling.
    pub fn paused(&self) -> &BTreeSet<StateId> {
        &self.paused
    }

    pub fn is_reached(&self, history: &History, target: &Target) -> bool {
        self.reached_targets.get(history).map_or(false, |targets| targets.contains(target))
    }

    /// Number of targeted searchers currently alive.
    pub fn targeted_searchers(&self) -> usize {
        self.histories_and_targets.len()
    }

    fn is_stuck(&self, state: &ExecutionState) -> bool {
        self.ctx.module.is_terminator(state.prev_pc) && state.multilevel.get_or(&state.pc_block(), 0) > self.bound
    }

    fn has_searcher(&self, history: &History, target: &Target) -> bool {
        self.targeted.get(history).map_or(false, |searchers| searchers.contains_key(target))
    }

    fn searcher_mut(&mut self, history: &History, target: &Target) -> &mut TargetedSearcher {
        match self.targeted.get_mut(history).and_then(|searchers| searchers.get_mut(target)) {
            Some(searcher) => searcher,
            None => panic!("no targeted searcher for {} at history {}", target, history),
        }
    }

    fn try_add_target(&mut self, history: &History, target: &Target) -> bool {
        if self.is_reached(history, target) {
            return false;
        }
        log!(log::TARGET, format!("new targeted searcher for {}", target));
        let searcher = TargetedSearcher::new(target.clone(), self.ctx.clone());
        self.targeted.entry(history.clone()).or_default().insert(target.clone(), searcher);
        self.histories_and_targets.push((history.clone(), target.clone()));
        true
    }

    fn remove_target(&mut self, states: &mut StatePool, history: &History, target: &Target) {
        if let Some(searchers) = self.targeted.get_mut(history) {
            if let Some(mut searcher) = searchers.remove(target) {
                searcher.clear(states)
            }
            if searchers.is_empty() {
                self.targeted.remove(history);
            }
        }
        match self.histories_and_targets.iter().position(|(h, t)| h == history && t == target) {
            Some(i) => {
                self.histories_and_targets.remove(i);
            }
            None => panic!("removing unknown target {}", target),
        }
    }

    fn apply(&mut self, states: &mut StatePool, mut pending: Pending, current: Option<StateId>, current_targets: &BTreeSet<Target>) {
        let touched = std::mem::take(&mut pending.targets);
        for (history, targets) in touched {
            for target in targets {
                let key = (history.clone(), target.clone());
                let added = pending.added.remove(&key).unwrap_or_default();
                let removed = pending.removed.remove(&key).unwrap_or_default();
                let current = if current_targets.contains(&target) { current } else { None };

                if self.has_searcher(&history, &target) || self.try_add_target(&history, &target) {
                    let searcher = self.searcher_mut(&history, &target);
                    searcher.update(states, current, &added, &removed);
                    if searcher.is_empty() {
                        self.remove_target(states, &history, &target)
                    }
                } else if self.is_reached(&history, &target) {
                    for id in added {
                        if let Some(state) = states.get_mut(id) {
                            state.target_forest.remove(&target)
                        }
                    }
                }
            }
        }
    }

    fn inner_update(&mut self, states: &mut StatePool, current: Option<StateId>, added: &[StateId], removed: &[StateId]) {
        let mut base_added = added.to_vec();
        let mut base_removed: Vec<StateId> = Vec::new();
        for id in removed {
            // Paused states are not known to any of our searchers
            if !self.paused.remove(id) {
                base_removed.push(*id)
            }
        }
        let current_alive = current.filter(|id| !removed.contains(id));

        if let Guidance::Coverage { calculator, .. } = &mut self.guidance {
            if let Some(id) = current_alive {
                calculator.update(&states[id])
            }
        }

        if !self.is_coverage() {
            if let Some(id) = current_alive {
                if self.is_stuck(&states[id]) {
                    self.paused.insert(id);
                    base_removed.push(id)
                }
            }
            let stuck: Vec<StateId> = base_added.iter().copied().filter(|id| self.is_stuck(&states[*id])).collect();
            for id in stuck {
                self.paused.insert(id);
                base_added.retain(|s| *s != id)
            }
        }

        let mut pending = Pending::default();
        let mut targetless = Vec::new();
        for id in &base_added {
            let forest = &states[*id].target_forest;
            if forest.is_empty() {
                targetless.push(*id)
            } else {
                for target in forest.targets() {
                    pending.add(forest.history(), target, *id)
                }
            }
        }
        for id in &base_removed {
            let forest = &states[*id].target_forest;
            for target in forest.targets() {
                pending.remove(forest.history(), target, *id)
            }
        }

        let mut current_targets = BTreeSet::new();
        if let Some(id) = current {
            let forest = &states[id].target_forest;
            current_targets = forest.targets().cloned().collect();
            if !current_targets.is_empty() {
                for target in &current_targets {
                    pending.touch(forest.history(), target)
                }
            } else if !base_removed.contains(&id) {
                targetless.push(id)
            }
        }

        if self.is_coverage() {
            for id in targetless {
                if !self.is_stuck(&states[id]) {
                    continue;
                }
                let target = match &self.guidance {
                    Guidance::Coverage { calculator, .. } => calculator.calculate(&states[id]),
                    Guidance::Error => None,
                };
                match target {
                    Some(target) => {
                        log!(log::TARGET, format!("state {} is stuck, directing it to {}", id, target));
                        let state = match states.get_mut(id) {
                            Some(state) => state,
                            None => continue,
                        };
                        state.target_forest.add(target.clone());
                        let history = state.target_forest.history().clone();
                        pending.add(&history, &target, id)
                    }
                    None => {
                        self.paused.insert(id);
                        match base_added.iter().position(|s| *s == id) {
                            Some(i) => {
                                base_added.remove(i);
                            }
                            None => base_removed.push(id),
                        }
                    }
                }
            }
        }

        self.apply(states, pending, current, &current_targets);

        if let Guidance::Coverage { base, .. } = &mut self.guidance {
            base.update(states, current, &base_added, &base_removed)
        }
    }

    fn collect_reached(&mut self) {
        for (history, target) in &self.histories_and_targets {
            if let Some(searcher) = self.targeted.get(history).and_then(|searchers| searchers.get(target)) {
                if !searcher.reached().is_empty() {
                    self.reached_states.entry(target.clone()).or_default().extend(searcher.reached().iter().copied())
                }
            }
        }
    }

    fn clear_reached(&mut self, states: &mut StatePool, removed: &[StateId]) {
        let mut pending = Pending::default();
        let mut handled = BTreeSet::new();
        let mut i = 0;
        while i < self.histories_and_targets.len() {
            let (history, target) = self.histories_and_targets[i].clone();
            let reached: Vec<StateId> = self
                .searcher_mut(&history, &target)
                .reached()
                .iter()
                .copied()
                .filter(|id| !handled.contains(id))
                .collect();

            for id in &reached {
                if removed.contains(id) {
                    continue;
                }
                for other in states[*id].target_forest.targets() {
                    if *other != target {
                        pending.remove(&history, other, *id)
                    }
                }
            }

            let mut advance = true;
            if !self.searcher_mut(&history, &target).reached().is_empty() {
                if target.should_fail_on_this_target() {
                    self.reached_targets.entry(history.clone()).or_default().insert(target.clone());
                }
                let searcher = self.searcher_mut(&history, &target);
                searcher.remove_reached(states);
                let finished = searcher.is_empty();
                if self.is_coverage() || target.should_fail_on_this_target() || finished {
                    self.remove_target(states, &history, &target);
                    advance = false
                }
            }
            if advance {
                i += 1
            }

            for id in reached {
                handled.insert(id);
                if removed.contains(&id) {
                    continue;
                }
                let forest = &states[id].target_forest;
                for next in forest.targets() {
                    pending.add(forest.history(), next, id)
                }
            }
        }
        self.apply(states, pending, None, &BTreeSet::new())
    }
}

impl Searcher for GuidedSearcher {
    fn select_state(&mut self, states: &StatePool) -> StateId {
        let size = self.histories_and_targets.len();
        let index = self.rng.next_u32() as usize % (size + 1);
        if let Guidance::Coverage { base, .. } = &mut self.guidance {
            if index == size {
                return base.select_state(states);
            }
        }
        assert!(size > 0, "select_state on an empty GuidedSearcher");
        let (history, target) = self.histories_and_targets[index % size].clone();
        self.searcher_mut(&history, &target).select_state(states)
    }

    fn update(&mut self, states: &mut StatePool, current: Option<StateId>, added: &[StateId], removed: &[StateId]) {
        self.inner_update(states, current, added, removed);
        self.collect_reached();
        self.clear_reached(states, removed)
    }

    fn is_empty(&self) -> bool {
        match &self.guidance {
            Guidance::Coverage { base, .. } => base.is_empty(),
            Guidance::Error => self.targeted.is_empty(),
        }
    }

    fn name(&self) -> String {
        "GuidedSearcher".to_string()
    }

    fn take_reached(&mut self) -> BTreeMap<Target, BTreeSet<StateId>> {
        std::mem::take(&mut self.reached_states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::BlockRef;
    use crate::searcher::tests::diamond_pool;
    use crate::searcher::DfsSearcher;
    use crate::target::ReachWithError;

    #[test]
    fn test_error_guidance_pauses_stuck() {
        let (module, mut pool, s0) = diamond_pool();
        let ctx = SearchContext::new(module.clone());
        let f = module.function_id("f").unwrap();
        let bad = Target::new(&module, BlockRef::new(f, 1), ReachWithError::NullPointerException);
        pool.get_mut(s0).unwrap().target_forest.add(bad.clone());

        let mut searcher = GuidedSearcher::with_errors(ctx, 1, 0);
        searcher.update(&mut pool, None, &[s0], &[]);
        assert_eq!(searcher.targeted_searchers(), 1);
        assert!(!searcher.is_empty());
        assert_eq!(searcher.select_state(&pool), s0);

        // Looping on the entry block: the first repetition is allowed
        let entry = module.function(0).entry();
        {
            let state = pool.get_mut(s0).unwrap();
            state.prev_pc = entry.last_instruction();
            state.pc = entry.first_instruction();
            state.increase_level(&module);
        }
        searcher.update(&mut pool, Some(s0), &[], &[]);
        assert!(searcher.paused().is_empty());
        pool.get_mut(s0).unwrap().increase_level(&module);
        searcher.update(&mut pool, Some(s0), &[], &[]);
        assert!(searcher.paused().contains(&s0));
        assert!(searcher.is_empty());

        // Removing a paused state only forgets it
        searcher.update(&mut pool, None, &[], &[s0]);
        assert!(searcher.paused().is_empty())
    }

    #[test]
    fn test_coverage_guidance_invents_and_reaches_targets() {
        let (module, mut pool, s0) = diamond_pool();
        let ctx = SearchContext::new(module.clone());
        let calculator = TargetCalculator::new(ctx.module.clone(), ctx.distance.clone());
        let mut searcher = GuidedSearcher::with_coverage(Box::new(DfsSearcher::new()), calculator, ctx, 1, 0);

        searcher.update(&mut pool, None, &[s0], &[]);
        assert_eq!(searcher.targeted_searchers(), 0);
        assert_eq!(searcher.select_state(&pool), s0);

        let main = module.function(0);
        let (entry, left, exit) = (&main.blocks[0], &main.blocks[1], &main.blocks[3]);
        {
            let state = pool.get_mut(s0).unwrap();
            state.prev_pc = entry.last_instruction();
            state.pc = left.first_instruction();
        }
        searcher.update(&mut pool, Some(s0), &[], &[]);
        assert_eq!(searcher.targeted_searchers(), 0);
        {
            // Twice around a loop on the left block
            let state = pool.get_mut(s0).unwrap();
            state.prev_pc = left.last_instruction();
            state.increase_level(&module);
            state.increase_level(&module);
        }
        searcher.update(&mut pool, Some(s0), &[], &[]);
        let exit_target = Target::new(&module, exit.id, ReachWithError::None);
        assert!(pool[s0].target_forest.contains(&exit_target));
        assert_eq!(searcher.targeted_searchers(), 1);
        assert!(searcher.take_reached().is_empty());

        {
            let state = pool.get_mut(s0).unwrap();
            state.prev_pc = exit.last_instruction();
            state.pc = exit.last_instruction();
        }
        searcher.update(&mut pool, Some(s0), &[], &[]);
        let reached = searcher.take_reached();
        assert_eq!(reached.get(&exit_target).map(|states| states.len()), Some(1));
        assert_eq!(searcher.targeted_searchers(), 0);
        assert!(pool[s0].target_forest.is_empty());
        assert_eq!(pool[s0].target_forest.history().target(), Some(&exit_target));
        assert_eq!(searcher.select_state(&pool), s0)
    }
}
