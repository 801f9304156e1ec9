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
use rand::{RngCore, SeedableRng};

use super::Searcher;
use crate::ptree::{NodeId, PTree};
use crate::state::{StateId, StatePool};

/// Selects a state by walking the process tree from the root, flipping
/// a coin wherever both subtrees hold states of this searcher. A state
/// is chosen with probability 2^-n, where n is the number of such forks
/// on its path.
///
/// Several searchers can share one process tree. Each owns a bit of the
/// edge tags, set on exactly those edges leading to states it tracks.
pub struct RandomPathSearcher {
    mask: u8,
    rng: StdRng,
    flips: u32,
    bits: u32,
    live: usize,
}

impl RandomPathSearcher {
    pub fn new(ptree: &mut PTree, seed: u64) -> Self {
        RandomPathSearcher { mask: ptree.next_id(), rng: StdRng::seed_from_u64(seed), flips: 0, bits: 0, live: 0 }
    }

    fn is_ours(&self, ptree: &PTree, node: NodeId) -> bool {
        ptree.edge_to(node).is_valid_for(self.mask)
    }
}

impl Searcher for RandomPathSearcher {
    fn select_state(&mut self, states: &StatePool) -> StateId {
        let ptree = states.ptree();
        assert!(ptree.root.is_valid_for(self.mask), "select_state on an empty RandomPathSearcher");
        let mut n = match ptree.root.node {
            Some(root) => root,
            None => unreachable!("valid root edge without a node"),
        };
        loop {
            let node = &ptree[n];
            if let Some(state) = node.state {
                return state;
            }
            let left = node.left.node.filter(|_| node.left.is_valid_for(self.mask));
            let right = node.right.node.filter(|_| node.right.is_valid_for(self.mask));
            n = match (left, right) {
                (Some(left), None) => left,
                (None, Some(right)) => right,
                (Some(left), Some(right)) => {
                    if self.bits == 0 {
                        self.flips = self.rng.next_u32();
                        self.bits = 32
                    }
                    self.bits -= 1;
                    if self.flips & (1 << self.bits) != 0 {
                        left
                    } else {
                        right
                    }
                }
                (None, None) => panic!("both subtrees of a process tree node are invalid"),
            }
        }
    }

    fn update(&mut self, states: &mut StatePool, _: Option<StateId>, added: &[StateId], removed: &[StateId]) {
        let nodes = |states: &StatePool, ids: &[StateId]| -> Vec<NodeId> {
            ids.iter()
                .map(|id| match states[*id].ptree_node {
                    Some(node) => node,
                    None => panic!("state {} has no process tree node", id),
                })
                .collect()
        };
        self.live = self.live + added.len() - removed.len();
        let added = nodes(states, added);
        let removed = nodes(states, removed);
        let ptree = states.ptree_mut();

        for node in added {
            let mut n = Some(node);
            while let Some(current) = n {
                if self.is_ours(ptree, current) {
                    break;
                }
                ptree.edge_to_mut(current).tag |= self.mask;
                n = ptree[current].parent
            }
        }

        for node in removed {
            let mut n = Some(node);
            while let Some(current) = n {
                let pnode = &ptree[current];
                if pnode.left.is_valid_for(self.mask) || pnode.right.is_valid_for(self.mask) {
                    break;
                }
                assert!(self.is_ours(ptree, current), "removing a process tree node not owned by this searcher");
                ptree.edge_to_mut(current).tag &= !self.mask;
                n = ptree[current].parent
            }
        }
    }

    /// Equivalent to the root edge not carrying this searcher's tag.
    fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn name(&self) -> String {
        "RandomPathSearcher".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::searcher::tests::{diamond_pool, fork};

    fn selections(seed: u64) -> Vec<StateId> {
        let (_, mut pool, s0) = diamond_pool();
        let mut searcher = RandomPathSearcher::new(pool.ptree_mut(), seed);
        searcher.update(&mut pool, None, &[s0], &[]);
        let s1 = fork(&mut pool, s0);
        let s2 = fork(&mut pool, s0);
        let s3 = fork(&mut pool, s1);
        searcher.update(&mut pool, Some(s0), &[s1, s2, s3], &[]);
        (0..64).map(|_| searcher.select_state(&pool)).collect()
    }

    #[test]
    fn test_deterministic() {
        let first = selections(42);
        assert_eq!(first, selections(42));
        let distinct: std::collections::BTreeSet<_> = first.iter().collect();
        assert!(distinct.len() > 1)
    }

    #[test]
    fn test_remove_and_empty() {
        let (_, mut pool, s0) = diamond_pool();
        let mut searcher = RandomPathSearcher::new(pool.ptree_mut(), 3);
        assert!(searcher.is_empty());
        searcher.update(&mut pool, None, &[s0], &[]);
        let s1 = fork(&mut pool, s0);
        searcher.update(&mut pool, Some(s0), &[s1], &[]);
        assert!(pool.ptree().root.is_valid_for(1));

        searcher.update(&mut pool, Some(s0), &[], &[s0]);
        pool.remove(s0);
        for _ in 0..8 {
            assert_eq!(searcher.select_state(&pool), s1)
        }
        searcher.update(&mut pool, Some(s1), &[], &[s1]);
        assert!(searcher.is_empty());
        assert!(!pool.ptree().root.is_valid_for(1))
    }

    #[test]
    fn test_shared_tree() {
        let (_, mut pool, s0) = diamond_pool();
        let mut first = RandomPathSearcher::new(pool.ptree_mut(), 1);
        let mut second = RandomPathSearcher::new(pool.ptree_mut(), 2);
        let s1 = fork(&mut pool, s0);
        first.update(&mut pool, None, &[s0], &[]);
        second.update(&mut pool, None, &[s1], &[]);
        for _ in 0..8 {
            assert_eq!(first.select_state(&pool), s0);
            assert_eq!(second.select_state(&pool), s1)
        }
    }
}
