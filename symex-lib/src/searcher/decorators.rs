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

//! Searchers wrapping other searchers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::Searcher;
use crate::log;
use crate::module::KModule;
use crate::state::{ExecutionState, StateId, StatePool};
use crate::stats::Statistics;
use crate::target::Target;

/// Holds states back from the base searcher. A state entering a block
/// marked as a merge point waits there until no other state can run,
/// at which point every waiting state is released together.
pub struct MergingSearcher {
    base: Box<dyn Searcher>,
    module: Arc<KModule>,
    paused: Vec<StateId>,
}

impl MergingSearcher {
    pub fn new(base: Box<dyn Searcher>, module: Arc<KModule>) -> Self {
        MergingSearcher { base, module, paused: Vec::new() }
    }

    fn at_merge_point(&self, state: &ExecutionState) -> bool {
        state.pc.index == 0 && state.is_transfered() && self.module.block_of(state.pc).merge
    }

    pub fn pause_state(&mut self, states: &mut StatePool, id: StateId) {
        assert!(!self.paused.contains(&id), "state {} is already paused", id);
        self.paused.push(id);
        self.base.update(states, None, &[], &[id])
    }

    pub fn continue_state(&mut self, states: &mut StatePool, id: StateId) {
        match self.paused.iter().position(|s| *s == id) {
            Some(i) => {
                self.paused.remove(i);
            }
            None => panic!("continuing state {} which is not paused", id),
        }
        self.base.update(states, None, &[id], &[])
    }

    pub fn paused(&self) -> &[StateId] {
        &self.paused
    }
}

impl Searcher for MergingSearcher {
    fn select_state(&mut self, states: &StatePool) -> StateId {
        assert!(!self.base.is_empty(), "base searcher is empty");
        self.base.select_state(states)
    }

    fn update(&mut self, states: &mut StatePool, current: Option<StateId>, added: &[StateId], removed: &[StateId]) {
        let current = current.filter(|id| !self.paused.contains(id));
        let mut forwarded = Vec::with_capacity(removed.len());
        for id in removed {
            match self.paused.iter().position(|s| s == id) {
                Some(i) => {
                    self.paused.remove(i);
                }
                None => forwarded.push(*id),
            }
        }
        self.base.update(states, current, added, &forwarded);

        let arrived: Vec<StateId> = current
            .filter(|id| !removed.contains(id))
            .into_iter()
            .chain(added.iter().copied())
            .filter(|id| states.get(*id).map_or(false, |state| self.at_merge_point(state)))
            .collect();
        for id in arrived {
            log!(log::SEARCH, format!("state {} waits at merge point", id));
            self.pause_state(states, id)
        }

        if self.base.is_empty() && !self.paused.is_empty() {
            log!(log::SEARCH, format!("releasing {} states from merge point", self.paused.len()));
            for id in self.paused.clone() {
                self.continue_state(states, id)
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    fn name(&self) -> String {
        "MergingSearcher".to_string()
    }

    fn take_reached(&mut self) -> BTreeMap<Target, BTreeSet<StateId>> {
        self.base.take_reached()
    }
}

/// Keeps selecting the same state until a time or instruction budget
/// runs out. A time budget that is overrun by more than 10% grows to
/// the observed time.
pub struct BatchingSearcher {
    base: Box<dyn Searcher>,
    time_budget: Option<Duration>,
    instruction_budget: u64,
    stats: Arc<Statistics>,
    last_state: Option<StateId>,
    last_start_time: Instant,
    last_start_instructions: u64,
}

impl BatchingSearcher {
    pub fn new(base: Box<dyn Searcher>, time_budget: Option<Duration>, instruction_budget: u64, stats: Arc<Statistics>) -> Self {
        BatchingSearcher {
            base,
            time_budget,
            instruction_budget,
            stats,
            last_state: None,
            last_start_time: Instant::now(),
            last_start_instructions: 0,
        }
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget
    }

    fn budget_exhausted(&self) -> bool {
        let time_up = match self.time_budget {
            Some(budget) if budget > Duration::from_secs(0) => self.last_start_time.elapsed() > budget,
            _ => false,
        };
        let instructions_up = self.instruction_budget > 0
            && self.stats.total_instructions() - self.last_start_instructions > self.instruction_budget;
        time_up || instructions_up
    }
}

impl Searcher for BatchingSearcher {
    fn select_state(&mut self, states: &StatePool) -> StateId {
        if let Some(last) = self.last_state {
            if !self.budget_exhausted() {
                return last;
            }
            let delta = self.last_start_time.elapsed();
            if let Some(budget) = self.time_budget {
                if delta > budget.mul_f64(1.1) {
                    log!(
                        log::SEARCH,
                        format!("increased time budget from {:.3}s to {:.3}s", budget.as_secs_f64(), delta.as_secs_f64())
                    );
                    self.time_budget = Some(delta)
                }
            }
        }
        let selected = self.base.select_state(states);
        self.last_state = Some(selected);
        self.last_start_time = Instant::now();
        self.last_start_instructions = self.stats.total_instructions();
        selected
    }

    fn update(&mut self, states: &mut StatePool, current: Option<StateId>, added: &[StateId], removed: &[StateId]) {
        if self.last_state.map_or(false, |last| removed.contains(&last)) {
            self.last_state = None
        }
        self.base.update(states, current, added, removed)
    }

    fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    fn name(&self) -> String {
        format!(
            "<BatchingSearcher> timeBudget: {:?}, instructionBudget: {}, baseSearcher:\n{}\n</BatchingSearcher>",
            self.time_budget,
            self.instruction_budget,
            self.base.name()
        )
    }

    fn take_reached(&mut self) -> BTreeMap<Target, BTreeSet<StateId>> {
        self.base.take_reached()
    }
}

/// Pauses a state once a single selection of it runs longer than the
/// current time window. When only paused states are left the window
/// doubles and they are all resumed.
pub struct IterativeDeepeningTimeSearcher {
    base: Box<dyn Searcher>,
    time: Duration,
    start_time: Instant,
    paused: BTreeSet<StateId>,
}

impl IterativeDeepeningTimeSearcher {
    pub fn new(base: Box<dyn Searcher>) -> Self {
        Self::with_window(base, Duration::from_secs(1))
    }

    pub fn with_window(base: Box<dyn Searcher>, time: Duration) -> Self {
        IterativeDeepeningTimeSearcher { base, time, start_time: Instant::now(), paused: BTreeSet::new() }
    }

    pub fn window(&self) -> Duration {
        self.time
    }

    pub fn paused(&self) -> &BTreeSet<StateId> {
        &self.paused
    }
}

impl Searcher for IterativeDeepeningTimeSearcher {
    fn select_state(&mut self, states: &StatePool) -> StateId {
        let selected = self.base.select_state(states);
        self.start_time = Instant::now();
        selected
    }

    fn update(&mut self, states: &mut StatePool, current: Option<StateId>, added: &[StateId], removed: &[StateId]) {
        let elapsed = self.start_time.elapsed();

        let mut forwarded = Vec::with_capacity(removed.len());
        for id in removed {
            if !self.paused.remove(id) {
                forwarded.push(*id)
            }
        }
        self.base.update(states, current, added, &forwarded);

        if let Some(current) = current {
            if !removed.contains(&current) && elapsed > self.time {
                self.paused.insert(current);
                self.base.update(states, None, &[], &[current])
            }
        }

        if self.base.is_empty() && !self.paused.is_empty() {
            self.time *= 2;
            log!(log::SEARCH, format!("increased time budget to {:.3}s", self.time.as_secs_f64()));
            let resumed: Vec<StateId> = std::mem::take(&mut self.paused).into_iter().collect();
            self.base.update(states, None, &resumed, &[])
        }
    }

    fn is_empty(&self) -> bool {
        self.base.is_empty() && self.paused.is_empty()
    }

    fn name(&self) -> String {
        "IterativeDeepeningTimeSearcher".to_string()
    }

    fn take_reached(&mut self) -> BTreeMap<Target, BTreeSet<StateId>> {
        self.base.take_reached()
    }
}

/// Round robin over several searchers, all tracking the same states.
pub struct InterleavedSearcher {
    searchers: Vec<Box<dyn Searcher>>,
    index: usize,
}

impl InterleavedSearcher {
    pub fn new(searchers: Vec<Box<dyn Searcher>>) -> Self {
        assert!(!searchers.is_empty(), "interleaving no searchers");
        let index = searchers.len();
        InterleavedSearcher { searchers, index }
    }
}

impl Searcher for InterleavedSearcher {
    fn select_state(&mut self, states: &StatePool) -> StateId {
        self.index -= 1;
        let i = self.index;
        if self.index == 0 {
            self.index = self.searchers.len()
        }
        self.searchers[i].select_state(states)
    }

    fn update(&mut self, states: &mut StatePool, current: Option<StateId>, added: &[StateId], removed: &[StateId]) {
        for searcher in self.searchers.iter_mut() {
            searcher.update(states, current, added, removed)
        }
    }

    fn is_empty(&self) -> bool {
        self.searchers[0].is_empty()
    }

    fn name(&self) -> String {
        let mut name = format!("<InterleavedSearcher> containing {} searchers:\n", self.searchers.len());
        for searcher in &self.searchers {
            name.push_str(&searcher.name());
            name.push('\n')
        }
        name.push_str("</InterleavedSearcher>");
        name
    }

    fn take_reached(&mut self) -> BTreeMap<Target, BTreeSet<StateId>> {
        let mut reached: BTreeMap<Target, BTreeSet<StateId>> = BTreeMap::new();
        for searcher in self.searchers.iter_mut() {
            for (target, states) in searcher.take_reached() {
                reached.entry(target).or_default().extend(states)
            }
        }
        reached
    }
}
