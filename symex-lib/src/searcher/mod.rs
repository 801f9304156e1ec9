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

//! Searchers decide which live state to step next. The driver calls
//! `select_state` to pick a state, steps it, and then reports what
//! changed through `update`: the state that was stepped, the states
//! forked from it, and the states that are gone. States reported as
//! removed are still in the pool during `update`; the driver drops
//! them afterwards.
//!
//! Selecting from an empty searcher, or removing a state the searcher
//! was never told about, are invariant violations and panic.

pub mod decorators;
pub mod guided;
pub mod random_path;
pub mod targeted;
pub mod weighted;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use crate::code_graph::CodeGraphDistance;
use crate::config::{Guidance, SearchConfig, SearcherKind};
use crate::module::KModule;
use crate::state::{StateId, StatePool};
use crate::stats::Statistics;
use crate::target::{Target, TargetCalculator};

use decorators::{BatchingSearcher, InterleavedSearcher, IterativeDeepeningTimeSearcher, MergingSearcher};
use guided::GuidedSearcher;
use random_path::RandomPathSearcher;
use weighted::WeightedRandomSearcher;

pub trait Searcher {
    fn select_state(&mut self, states: &StatePool) -> StateId;

    fn update(&mut self, states: &mut StatePool, current: Option<StateId>, added: &[StateId], removed: &[StateId]);

    fn is_empty(&self) -> bool;

    fn name(&self) -> String;

    /// States found to have reached targets since the last call, for
    /// searchers that track targets.
    fn take_reached(&mut self) -> BTreeMap<Target, BTreeSet<StateId>> {
        BTreeMap::new()
    }
}

/// What searchers need to know about the program being explored.
#[derive(Clone)]
pub struct SearchContext {
    pub module: Arc<KModule>,
    pub distance: Arc<CodeGraphDistance>,
    pub stats: Arc<Statistics>,
}

impl SearchContext {
    pub fn new(module: Arc<KModule>) -> Self {
        let distance = Arc::new(CodeGraphDistance::new(&module));
        let stats = Arc::new(Statistics::new(&module));
        SearchContext { module, distance, stats }
    }
}

fn remove_from<T: PartialEq + Copy>(states: &mut Vec<T>, state: T) {
    match states.iter().position(|s| *s == state) {
        Some(i) => {
            states.remove(i);
        }
        None => panic!("invalid state removed"),
    }
}

/// Depth first: always the most recently added state.
#[derive(Default)]
pub struct DfsSearcher {
    states: Vec<StateId>,
}

impl DfsSearcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Searcher for DfsSearcher {
    fn select_state(&mut self, _: &StatePool) -> StateId {
        match self.states.last() {
            Some(id) => *id,
            None => panic!("select_state on an empty DfsSearcher"),
        }
    }

    fn update(&mut self, _: &mut StatePool, _: Option<StateId>, added: &[StateId], removed: &[StateId]) {
        self.states.extend_from_slice(added);
        for id in removed {
            if self.states.last() == Some(id) {
                self.states.pop();
            } else {
                remove_from(&mut self.states, *id)
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn name(&self) -> String {
        "DfsSearcher".to_string()
    }
}

/// Breadth first. A state that forked is moved to the back of the
/// queue, as it has made progress.
#[derive(Default)]
pub struct BfsSearcher {
    states: VecDeque<StateId>,
}

impl BfsSearcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Searcher for BfsSearcher {
    fn select_state(&mut self, _: &StatePool) -> StateId {
        match self.states.front() {
            Some(id) => *id,
            None => panic!("select_state on an empty BfsSearcher"),
        }
    }

    fn update(&mut self, _: &mut StatePool, current: Option<StateId>, added: &[StateId], removed: &[StateId]) {
        if let Some(current) = current {
            if !added.is_empty() && !removed.contains(&current) {
                match self.states.iter().position(|s| *s == current) {
                    Some(i) => {
                        self.states.remove(i);
                    }
                    None => panic!("current state {} unknown to BfsSearcher", current),
                }
                self.states.push_back(current)
            }
        }
        self.states.extend(added.iter().copied());
        for id in removed {
            if self.states.front() == Some(id) {
                self.states.pop_front();
            } else {
                match self.states.iter().position(|s| s == id) {
                    Some(i) => {
                        self.states.remove(i);
                    }
                    None => panic!("invalid state removed"),
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn name(&self) -> String {
        "BfsSearcher".to_string()
    }
}

/// Uniformly random over the live states.
pub struct RandomStateSearcher {
    states: Vec<StateId>,
    rng: StdRng,
}

impl RandomStateSearcher {
    pub fn new(seed: u64) -> Self {
        RandomStateSearcher { states: Vec::new(), rng: StdRng::seed_from_u64(seed) }
    }
}

impl Searcher for RandomStateSearcher {
    fn select_state(&mut self, _: &StatePool) -> StateId {
        assert!(!self.states.is_empty(), "select_state on an empty RandomStateSearcher");
        let i = self.rng.next_u32() as usize % self.states.len();
        self.states[i]
    }

    fn update(&mut self, _: &mut StatePool, _: Option<StateId>, added: &[StateId], removed: &[StateId]) {
        self.states.extend_from_slice(added);
        for id in removed {
            remove_from(&mut self.states, *id)
        }
    }

    fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn name(&self) -> String {
        "RandomStateSearcher".to_string()
    }
}

fn construct_base(kind: SearcherKind, seed: u64, ctx: &SearchContext, states: &mut StatePool) -> Box<dyn Searcher> {
    match kind {
        SearcherKind::Dfs => Box::new(DfsSearcher::new()),
        SearcherKind::Bfs => Box::new(BfsSearcher::new()),
        SearcherKind::RandomState => Box::new(RandomStateSearcher::new(seed)),
        SearcherKind::RandomPath => Box::new(RandomPathSearcher::new(states.ptree_mut(), seed)),
        SearcherKind::Weighted(weight) => Box::new(WeightedRandomSearcher::new(weight, seed, ctx.clone())),
    }
}

/// Build the searcher stack described by `config`: the configured
/// searchers (interleaved if there are several), optionally batched,
/// held at merge blocks and iteratively deepened, and finally wrapped in
/// a guided searcher if guidance is enabled.
pub fn construct_searcher(config: &SearchConfig, ctx: &SearchContext, states: &mut StatePool) -> Box<dyn Searcher> {
    let mut searchers: Vec<Box<dyn Searcher>> = config
        .searchers
        .iter()
        .enumerate()
        .map(|(i, kind)| construct_base(*kind, config.seed.wrapping_add(i as u64), ctx, states))
        .collect();

    let mut searcher = if searchers.len() == 1 {
        searchers.remove(0)
    } else if searchers.is_empty() {
        construct_base(SearcherKind::Dfs, config.seed, ctx, states)
    } else {
        Box::new(InterleavedSearcher::new(searchers))
    };

    if config.batch_time.is_some() || config.batch_instructions > 0 {
        searcher = Box::new(BatchingSearcher::new(searcher, config.batch_time, config.batch_instructions, ctx.stats.clone()))
    }

    if config.merge {
        searcher = Box::new(MergingSearcher::new(searcher, ctx.module.clone()))
    }

    if config.iterative_deepening {
        searcher = Box::new(IterativeDeepeningTimeSearcher::new(searcher))
    }

    match config.guidance {
        Guidance::None => searcher,
        Guidance::Coverage => {
            let calculator = TargetCalculator::new(ctx.module.clone(), ctx.distance.clone());
            Box::new(GuidedSearcher::with_coverage(searcher, calculator, ctx.clone(), config.max_cycles_before_stuck, config.seed))
        }
        Guidance::Error => Box::new(GuidedSearcher::with_errors(ctx.clone(), config.max_cycles_before_stuck, config.seed)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ResolveConfig;
    use crate::module::tests::DIAMOND;
    use crate::state::{ExecutionState, StateIds};

    /// A pool holding the entry state of `main` in `DIAMOND`.
    pub(crate) fn diamond_pool() -> (Arc<KModule>, StatePool, StateId) {
        let module = Arc::new(KModule::parse(DIAMOND).unwrap());
        let ids = StateIds::new();
        let state = ExecutionState::for_function(&ids, Arc::new(ResolveConfig::default()), module.function(0));
        let id = state.id;
        (module, StatePool::new(state), id)
    }

    /// Fork `parent` and add the fork to the pool.
    pub(crate) fn fork(pool: &mut StatePool, parent: StateId) -> StateId {
        let forked = pool.get_mut(parent).unwrap().branch();
        let id = forked.id;
        pool.add_forked(parent, forked);
        id
    }

    #[test]
    fn test_dfs_bfs_order() {
        let (_, mut pool, s0) = diamond_pool();
        let s1 = fork(&mut pool, s0);
        let s2 = fork(&mut pool, s0);

        let mut dfs = DfsSearcher::new();
        dfs.update(&mut pool, None, &[s0], &[]);
        dfs.update(&mut pool, Some(s0), &[s1, s2], &[]);
        assert_eq!(dfs.select_state(&pool), s2);
        dfs.update(&mut pool, Some(s2), &[], &[s2]);
        assert_eq!(dfs.select_state(&pool), s1);

        let mut bfs = BfsSearcher::new();
        bfs.update(&mut pool, None, &[s0, s2], &[]);
        assert_eq!(bfs.select_state(&pool), s0);
        bfs.update(&mut pool, Some(s0), &[s1], &[]);
        // s0 forked, so it goes behind s2 and ahead of its fork
        assert_eq!(bfs.select_state(&pool), s2);
        bfs.update(&mut pool, Some(s2), &[], &[s2]);
        assert_eq!(bfs.select_state(&pool), s0);
        bfs.update(&mut pool, Some(s0), &[], &[s0]);
        assert_eq!(bfs.select_state(&pool), s1)
    }

    #[test]
    fn test_random_state() {
        let (_, mut pool, s0) = diamond_pool();
        let s1 = fork(&mut pool, s0);
        let mut searcher = RandomStateSearcher::new(7);
        searcher.update(&mut pool, None, &[s0, s1], &[]);
        for _ in 0..16 {
            let id = searcher.select_state(&pool);
            assert!(id == s0 || id == s1)
        }
        searcher.update(&mut pool, None, &[], &[s0]);
        for _ in 0..4 {
            assert_eq!(searcher.select_state(&pool), s1)
        }
        searcher.update(&mut pool, None, &[], &[s1]);
        assert!(searcher.is_empty())
    }

    #[test]
    #[should_panic(expected = "invalid state removed")]
    fn test_remove_unknown() {
        let (_, mut pool, s0) = diamond_pool();
        let mut dfs = DfsSearcher::new();
        dfs.update(&mut pool, None, &[], &[s0])
    }

    #[test]
    fn test_construct() {
        let (module, mut pool, _) = diamond_pool();
        let ctx = SearchContext::new(module);
        let searcher = construct_searcher(&SearchConfig::default(), &ctx, &mut pool);
        assert!(searcher.name().starts_with("<InterleavedSearcher>"));
        assert!(searcher.is_empty())
    }
}
