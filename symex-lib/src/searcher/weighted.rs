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

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{SearchContext, Searcher};
use crate::adt::discrete_pdf::DiscretePdf;
use crate::state::{ExecutionState, StateId, StatePool};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightType {
    Depth,
    /// Inverse exponential in the depth, approximating random path
    /// selection
    Rp,
    InstCount,
    CpInstCount,
    QueryCost,
    MinDistToUncovered,
    CoveringNew,
}

impl WeightType {
    /// Weights that cannot change while a state is stepped without
    /// forking.
    pub fn is_static(self) -> bool {
        matches!(self, WeightType::Depth | WeightType::Rp)
    }

    pub fn name(self) -> &'static str {
        use WeightType::*;
        match self {
            Depth => "Depth",
            Rp => "RandomPath",
            InstCount => "InstCount",
            CpInstCount => "CPInstCount",
            QueryCost => "QueryCost",
            MinDistToUncovered => "MinDistToUncovered",
            CoveringNew => "CoveringNew",
        }
    }
}

/// Samples states with probability proportional to a weight.
pub struct WeightedRandomSearcher {
    states: DiscretePdf<StateId>,
    rng: StdRng,
    kind: WeightType,
    ctx: SearchContext,
}

impl WeightedRandomSearcher {
    pub fn new(kind: WeightType, seed: u64, ctx: SearchContext) -> Self {
        WeightedRandomSearcher { states: DiscretePdf::new(), rng: StdRng::seed_from_u64(seed), kind, ctx }
    }

    pub fn weight(&self, state: &ExecutionState) -> f64 {
        use WeightType::*;
        match self.kind {
            Depth => state.depth as f64,
            Rp => 0.5f64.powi(state.depth as i32),
            InstCount => {
                let count = self.ctx.stats.instruction_count(state.pc);
                let inv = 1.0 / count.max(1) as f64;
                inv * inv
            }
            CpInstCount => {
                let count = state
                    .stack
                    .call_stack()
                    .last()
                    .map_or(0, |frame| self.ctx.stats.function_instructions(frame.function));
                1.0 / count.max(1) as f64
            }
            QueryCost => {
                let cost = state.query_meta.query_cost().as_secs_f64();
                if cost < 0.1 {
                    1.0
                } else {
                    1.0 / cost
                }
            }
            MinDistToUncovered | CoveringNew => {
                let on_return = state.stack.info_stack().last().map_or(0, |info| info.min_dist_to_uncovered_on_return);
                let md2u = self.ctx.stats.min_dist_to_uncovered(
                    &self.ctx.module,
                    &self.ctx.distance,
                    state.pc_block(),
                    on_return,
                );
                let inv_md2u = 1.0 / if md2u > 0 { md2u as f64 } else { 10000.0 };
                if self.kind == CoveringNew {
                    let inv_cov_new = if state.insts_since_cov_new > 0 {
                        1.0 / (state.insts_since_cov_new as i64 - 1000).max(1) as f64
                    } else {
                        0.0
                    };
                    inv_cov_new * inv_cov_new + inv_md2u * inv_md2u
                } else {
                    inv_md2u * inv_md2u
                }
            }
        }
    }
}

impl Searcher for WeightedRandomSearcher {
    fn select_state(&mut self, _: &StatePool) -> StateId {
        assert!(!self.states.is_empty(), "select_state on an empty WeightedRandomSearcher");
        let p: f64 = self.rng.gen();
        *self.states.choose(p)
    }

    fn update(&mut self, states: &mut StatePool, current: Option<StateId>, added: &[StateId], removed: &[StateId]) {
        if let Some(current) = current {
            if !self.kind.is_static() && !removed.contains(&current) && self.states.contains(&current) {
                let weight = self.weight(&states[current]);
                self.states.update(&current, weight)
            }
        }
        for id in added {
            let weight = self.weight(&states[*id]);
            self.states.insert(*id, weight)
        }
        for id in removed {
            if !self.states.remove(id) {
                panic!("invalid state removed")
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn name(&self) -> String {
        format!("WeightedRandomSearcher::{}", self.kind.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::searcher::tests::{diamond_pool, fork};

    #[test]
    fn test_depth_weights() {
        let (module, mut pool, s0) = diamond_pool();
        let ctx = SearchContext::new(module);
        let s1 = fork(&mut pool, s0);
        let s2 = fork(&mut pool, s1);

        let mut depth = WeightedRandomSearcher::new(WeightType::Depth, 1, ctx.clone());
        let mut rp = WeightedRandomSearcher::new(WeightType::Rp, 1, ctx);
        for searcher in [&mut depth, &mut rp].iter_mut() {
            searcher.update(&mut pool, None, &[s0, s1, s2], &[]);
        }
        assert_eq!(depth.weight(&pool[s2]), 2.0);
        assert_eq!(rp.weight(&pool[s2]), 0.25);
        assert_eq!(rp.weight(&pool[s0]), 0.5);

        rp.update(&mut pool, Some(s2), &[], &[s1, s2]);
        assert_eq!(rp.select_state(&pool), s0);
        assert_eq!(rp.name(), "WeightedRandomSearcher::RandomPath")
    }

    #[test]
    fn test_covering_new_prefers_uncovered() {
        let (module, mut pool, s0) = diamond_pool();
        let ctx = SearchContext::new(module.clone());
        let searcher = WeightedRandomSearcher::new(WeightType::MinDistToUncovered, 1, ctx.clone());
        let before = searcher.weight(&pool[s0]);
        for block in module.blocks() {
            ctx.stats.cover_block(block.id);
        }
        let after = searcher.weight(&pool[s0]);
        assert!(before > after);

        let covnew = WeightedRandomSearcher::new(WeightType::CoveringNew, 1, ctx);
        pool.get_mut(s0).unwrap().insts_since_cov_new = 1;
        assert!(covnew.weight(&pool[s0]) > after)
    }
}
