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

//! Turns externally reported paths into per-function target forests,
//! and steps the forests of states as they enter target blocks.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::locations::{Locations, ResolvedLocations};
use crate::log;
use crate::module::{BlockRef, FunctionId, KModule};
use crate::state::ExecutionState;
use crate::target::{ReachWithError, Target};
use crate::target_forest::TargetForest;

#[derive(Debug, Default)]
pub struct TargetedExecutionManager {
    block_to_target: BTreeMap<BlockRef, Target>,
}

impl TargetedExecutionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_of(&self, block: BlockRef) -> Option<&Target> {
        self.block_to_target.get(&block)
    }

    /// One forest for every function in which some path starts. The
    /// first step of a path only selects the function, so the forest
    /// returned for it begins at the second step.
    pub fn prepare_targets(&mut self, module: &KModule, paths: &[Locations]) -> Vec<(FunctionId, TargetForest)> {
        let mut resolved_paths = Vec::new();
        for path in paths {
            let resolved = ResolvedLocations::new(module, path);
            let last = resolved.locations.len().saturating_sub(1);
            for (i, blocks) in resolved.locations.iter().enumerate() {
                let error = if i == last { path.target_error() } else { ReachWithError::None };
                for block in blocks {
                    self.block_to_target.entry(*block).or_insert_with(|| Target::new(module, *block, error));
                }
            }
            resolved_paths.push(resolved)
        }

        let whitelists = TargetForest::from_resolved_paths(&resolved_paths, &self.block_to_target);

        let mut visited = BTreeSet::new();
        let mut targets = Vec::new();
        for (start, rest) in whitelists.iter() {
            let function = start.function();
            if !visited.insert(function) {
                continue;
            }
            log!(log::TARGET, format!("entry {} for {}", start, module.function(function).name));
            targets.push((function, TargetForest::new(Arc::clone(rest))))
        }
        targets
    }

    /// Step the forest of `state` past the target at `block`, returning
    /// the target if there is one.
    pub fn step_to(&self, state: &mut ExecutionState, block: BlockRef) -> Option<Target> {
        let target = self.block_to_target.get(&block)?;
        state.target_forest.step_to(target);
        Some(target.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locations::Location;
    use crate::module::tests::DIAMOND;

    #[test]
    fn test_prepare_targets() {
        let module = KModule::parse(DIAMOND).unwrap();
        let main = module.function_id("main").unwrap();
        let f = module.function_id("f").unwrap();
        let paths = vec![Locations::new(
            vec![Location::new("main.c", 1), Location::new("main.c", 3), Location::new("main.c", 12)],
            ReachWithError::NullPointerException,
        )];
        let mut manager = TargetedExecutionManager::new();
        let targets = manager.prepare_targets(&module, &paths);
        assert_eq!(targets.len(), 1);
        let (function, forest) = &targets[0];
        assert_eq!(*function, main);
        let left = manager.target_of(BlockRef::new(main, 1)).unwrap();
        assert!(forest.contains(left));
        assert!(!left.should_fail_on_this_target());
        let bad = manager.target_of(BlockRef::new(f, 1)).unwrap();
        assert!(bad.should_fail_on_this_target());
        assert!(manager.target_of(BlockRef::new(main, 2)).is_none())
    }
}
