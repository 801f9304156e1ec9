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

//! Static distances over the control flow and call graphs of a
//! module, used by directed search.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::module::{BlockRef, FunctionId, KModule};

fn bfs<T, F>(start: T, mut next: F) -> BTreeMap<T, u32>
where
    T: Copy + Ord,
    F: FnMut(T) -> Vec<T>,
{
    let mut dist = BTreeMap::new();
    let mut queue = VecDeque::new();
    dist.insert(start, 0);
    queue.push_back(start);
    while let Some(node) = queue.pop_front() {
        let d = dist[&node];
        for succ in next(node) {
            if !dist.contains_key(&succ) {
                dist.insert(succ, d + 1);
                queue.push_back(succ)
            }
        }
    }
    dist
}

/// All distances are precomputed when the module is loaded.
#[derive(Clone, Debug, Default)]
pub struct CodeGraphDistance {
    block_distance: HashMap<BlockRef, BTreeMap<BlockRef, u32>>,
    block_backward_distance: HashMap<BlockRef, BTreeMap<BlockRef, u32>>,
    function_distance: HashMap<FunctionId, BTreeMap<FunctionId, u32>>,
    function_backward_distance: HashMap<FunctionId, BTreeMap<FunctionId, u32>>,
}

impl CodeGraphDistance {
    pub fn new(module: &KModule) -> Self {
        let mut predecessors: HashMap<BlockRef, Vec<BlockRef>> = HashMap::new();
        for block in module.blocks() {
            for succ in &block.successors {
                predecessors.entry(*succ).or_default().push(block.id)
            }
        }

        let mut callees: HashMap<FunctionId, Vec<FunctionId>> = HashMap::new();
        let mut callers: HashMap<FunctionId, Vec<FunctionId>> = HashMap::new();
        for f in &module.functions {
            for block in f.call_blocks() {
                if let Some(callee) = block.callee() {
                    callees.entry(f.id).or_default().push(callee);
                    callers.entry(callee).or_default().push(f.id)
                }
            }
        }

        let mut cgd = CodeGraphDistance::default();
        for block in module.blocks() {
            cgd.block_distance.insert(block.id, bfs(block.id, |b| module.block(b).successors.clone()));
            cgd.block_backward_distance
                .insert(block.id, bfs(block.id, |b| predecessors.get(&b).cloned().unwrap_or_default()));
        }
        for f in &module.functions {
            cgd.function_distance.insert(f.id, bfs(f.id, |g| callees.get(&g).cloned().unwrap_or_default()));
            cgd.function_backward_distance.insert(f.id, bfs(f.id, |g| callers.get(&g).cloned().unwrap_or_default()));
        }
        cgd
    }

    /// Blocks of the same function reachable from `block`, with the
    /// number of edges needed to reach them.
    pub fn distance(&self, block: BlockRef) -> &BTreeMap<BlockRef, u32> {
        &self.block_distance[&block]
    }

    pub fn backward_distance(&self, block: BlockRef) -> &BTreeMap<BlockRef, u32> {
        &self.block_backward_distance[&block]
    }

    /// Functions transitively called by `function`.
    pub fn function_distance(&self, function: FunctionId) -> &BTreeMap<FunctionId, u32> {
        &self.function_distance[&function]
    }

    /// Functions that transitively call `function`.
    pub fn backward_function_distance(&self, function: FunctionId) -> &BTreeMap<FunctionId, u32> {
        &self.function_backward_distance[&function]
    }

    /// Reachable blocks sorted by increasing distance.
    pub fn sorted_distance(&self, block: BlockRef) -> Vec<(BlockRef, u32)> {
        let mut sorted: Vec<(BlockRef, u32)> = self.distance(block).iter().map(|(b, d)| (*b, *d)).collect();
        sorted.sort_by_key(|(b, d)| (*d, *b));
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::tests::DIAMOND;

    #[test]
    fn test_distances() {
        let module = KModule::parse(DIAMOND).unwrap();
        let cgd = CodeGraphDistance::new(&module);
        let main = module.function_id("main").unwrap();
        let f = module.function_id("f").unwrap();
        let entry = BlockRef::new(main, 0);
        let exit = BlockRef::new(main, 3);
        assert_eq!(cgd.distance(entry).get(&exit), Some(&2));
        assert_eq!(cgd.distance(exit).get(&entry), None);
        assert_eq!(cgd.backward_distance(exit).get(&entry), Some(&2));
        assert_eq!(cgd.function_distance(main).get(&f), Some(&1));
        assert_eq!(cgd.backward_function_distance(f).get(&main), Some(&1));
        assert_eq!(cgd.backward_function_distance(main).get(&f), None);
        assert_eq!(cgd.sorted_distance(entry)[0], (entry, 0))
    }
}
