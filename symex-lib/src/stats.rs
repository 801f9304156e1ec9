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

//! Execution statistics shared between the driver, which records them,
//! and the searchers whose weights depend on them.

use ahash::AHashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::code_graph::CodeGraphDistance;
use crate::module::{BlockRef, FunctionId, InstRef, KModule};

pub struct Statistics {
    instructions: AHashMap<InstRef, AtomicU64>,
    functions: AHashMap<FunctionId, AtomicU64>,
    covered: AHashMap<BlockRef, AtomicBool>,
    total_instructions: AtomicU64,
    forks: AtomicU64,
}

impl Statistics {
    pub fn new(module: &KModule) -> Self {
        let mut instructions = AHashMap::new();
        let mut covered = AHashMap::new();
        for block in module.blocks() {
            for index in 0..block.instructions {
                instructions.insert(InstRef { function: block.id.function, block: block.id.block, index }, AtomicU64::new(0));
            }
            covered.insert(block.id, AtomicBool::new(false));
        }
        let functions = module.functions.iter().map(|f| (f.id, AtomicU64::new(0))).collect();
        Statistics { instructions, functions, covered, total_instructions: AtomicU64::new(0), forks: AtomicU64::new(0) }
    }

    pub fn record_instruction(&self, inst: InstRef) {
        if let Some(count) = self.instructions.get(&inst) {
            count.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(count) = self.functions.get(&inst.function) {
            count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_instructions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fork(&self) {
        self.forks.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark `block` covered, returning true if it was not covered
    /// before.
    pub fn cover_block(&self, block: BlockRef) -> bool {
        match self.covered.get(&block) {
            Some(covered) => !covered.swap(true, Ordering::Relaxed),
            None => false,
        }
    }

    pub fn is_covered(&self, block: BlockRef) -> bool {
        self.covered.get(&block).map_or(false, |covered| covered.load(Ordering::Relaxed))
    }

    pub fn covered_blocks(&self) -> usize {
        self.covered.values().filter(|covered| covered.load(Ordering::Relaxed)).count()
    }

    pub fn total_blocks(&self) -> usize {
        self.covered.len()
    }

    pub fn instruction_count(&self, inst: InstRef) -> u64 {
        self.instructions.get(&inst).map_or(0, |count| count.load(Ordering::Relaxed))
    }

    pub fn function_instructions(&self, function: FunctionId) -> u64 {
        self.functions.get(&function).map_or(0, |count| count.load(Ordering::Relaxed))
    }

    pub fn total_instructions(&self) -> u64 {
        self.total_instructions.load(Ordering::Relaxed)
    }

    pub fn forks(&self) -> u64 {
        self.forks.load(Ordering::Relaxed)
    }

    /// Distance in blocks from `block` to the nearest uncovered block,
    /// counting an uncovered `block` itself as one. If nothing
    /// uncovered is reachable in the function, fall back to
    /// `on_return` (the distance from the caller's return point) plus
    /// the distance to a return block. Zero means nothing uncovered is
    /// known to be reachable.
    pub fn min_dist_to_uncovered(
        &self,
        module: &KModule,
        distance: &CodeGraphDistance,
        block: BlockRef,
        on_return: u32,
    ) -> u64 {
        let dist = distance.distance(block);
        let local = dist.iter().filter(|(b, _)| !self.is_covered(**b)).map(|(_, d)| *d as u64 + 1).min();
        if let Some(local) = local {
            return local;
        }
        if on_return == 0 {
            return 0;
        }
        module
            .function(block.function)
            .return_blocks()
            .filter_map(|ret| dist.get(&ret.id))
            .min()
            .map_or(0, |d| *d as u64 + on_return as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::tests::DIAMOND;

    #[test]
    fn test_coverage_and_distance() {
        let module = KModule::parse(DIAMOND).unwrap();
        let distance = CodeGraphDistance::new(&module);
        let stats = Statistics::new(&module);
        let entry = BlockRef::new(0, 0);

        assert_eq!(stats.min_dist_to_uncovered(&module, &distance, entry, 0), 1);
        assert!(stats.cover_block(entry));
        assert!(!stats.cover_block(entry));
        assert_eq!(stats.min_dist_to_uncovered(&module, &distance, entry, 0), 2);
        for b in 1..4 {
            stats.cover_block(BlockRef::new(0, b));
        }
        assert_eq!(stats.min_dist_to_uncovered(&module, &distance, entry, 0), 0);
        assert_eq!(stats.min_dist_to_uncovered(&module, &distance, entry, 5), 7);
        assert_eq!(stats.covered_blocks(), 4);

        stats.record_instruction(module.function(0).entry().first_instruction());
        assert_eq!(stats.instruction_count(module.function(0).entry().first_instruction()), 1);
        assert_eq!(stats.function_instructions(0), 1);
        assert_eq!(stats.total_instructions(), 1)
    }
}
