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

use std::collections::BTreeMap;
use std::ops::Index;

use super::{ExecutionState, StateId};
use crate::ptree::PTree;

/// The live states of an exploration, together with the process tree
/// recording how they forked from each other. Searchers refer to
/// states by id and look them up here.
pub struct StatePool {
    states: BTreeMap<StateId, ExecutionState>,
    ptree: PTree,
}

impl Index<StateId> for StatePool {
    type Output = ExecutionState;

    fn index(&self, id: StateId) -> &Self::Output {
        match self.states.get(&id) {
            Some(state) => state,
            None => panic!("state {} is not in the pool", id),
        }
    }
}

impl StatePool {
    pub fn new(mut initial: ExecutionState) -> Self {
        let (ptree, node) = PTree::new(initial.id);
        initial.ptree_node = Some(node);
        let mut states = BTreeMap::new();
        states.insert(initial.id, initial);
        StatePool { states, ptree }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn contains(&self, id: StateId) -> bool {
        self.states.contains_key(&id)
    }

    pub fn get(&self, id: StateId) -> Option<&ExecutionState> {
        self.states.get(&id)
    }

    pub fn get_mut(&mut self, id: StateId) -> Option<&mut ExecutionState> {
        self.states.get_mut(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = StateId> + '_ {
        self.states.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionState> {
        self.states.values()
    }

    pub fn ptree(&self) -> &PTree {
        &self.ptree
    }

    pub fn ptree_mut(&mut self) -> &mut PTree {
        &mut self.ptree
    }

    /// Add `forked`, which was branched from `parent`, splitting the
    /// process tree leaf of `parent`.
    pub fn add_forked(&mut self, parent: StateId, mut forked: ExecutionState) {
        let parent_state = match self.states.get_mut(&parent) {
            Some(state) => state,
            None => panic!("forking from state {} which is not in the pool", parent),
        };
        let node = match parent_state.ptree_node {
            Some(node) => node,
            None => panic!("state {} has no process tree node", parent),
        };
        let (left, right) = self.ptree.attach(node, forked.id, parent);
        parent_state.ptree_node = Some(right);
        forked.ptree_node = Some(left);
        self.states.insert(forked.id, forked);
    }

    /// Remove a state and its process tree leaf.
    pub fn remove(&mut self, id: StateId) -> Option<ExecutionState> {
        let mut state = self.states.remove(&id)?;
        if let Some(node) = state.ptree_node.take() {
            self.ptree.remove(node)
        }
        Some(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolveConfig;
    use crate::module::tests::DIAMOND;
    use crate::module::KModule;
    use crate::state::StateIds;
    use std::sync::Arc;

    #[test]
    fn test_fork_and_remove() {
        let module = KModule::parse(DIAMOND).unwrap();
        let ids = StateIds::new();
        let s0 = ExecutionState::for_function(&ids, Arc::new(ResolveConfig::default()), module.function(0));
        let id0 = s0.id;
        let mut pool = StatePool::new(s0);

        let s1 = pool.get_mut(id0).unwrap().branch();
        let id1 = s1.id;
        pool.add_forked(id0, s1);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.ptree().leaves(), vec![id1, id0]);
        assert_eq!(pool[id0].depth, 1);

        let removed = pool.remove(id1).unwrap();
        assert_eq!(removed.id, id1);
        assert!(removed.ptree_node.is_none());
        assert_eq!(pool.ptree().leaves(), vec![id0]);
        assert!(pool.remove(id1).is_none())
    }
}
