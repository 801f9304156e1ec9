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

//! Reachability targets. A target is a basic block, optionally paired
//! with an error that must be raised when the block is reached.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::code_graph::CodeGraphDistance;
use crate::module::{BlockRef, FunctionId, KModule};
use crate::state::ExecutionState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReachWithError {
    NullPointerException,
    NullCheckAfterDerefException,
    None,
}

impl Default for ReachWithError {
    fn default() -> Self {
        ReachWithError::None
    }
}

impl ReachWithError {
    pub fn parse(name: &str) -> Result<Self, String> {
        match name {
            "NullPointerException" => Ok(ReachWithError::NullPointerException),
            "NullCheckAfterDerefException" => Ok(ReachWithError::NullCheckAfterDerefException),
            "None" => Ok(ReachWithError::None),
            _ => Err(format!("unknown error kind {}", name)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ReachWithError::NullPointerException => "NullPointerException",
            ReachWithError::NullCheckAfterDerefException => "NullCheckAfterDerefException",
            ReachWithError::None => "None",
        }
    }

    pub fn is_error(self) -> bool {
        self != ReachWithError::None
    }
}

impl fmt::Display for ReachWithError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Targets compare by block, then by error.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target {
    block: BlockRef,
    error: ReachWithError,
    at_return: bool,
}

impl Target {
    pub fn new(module: &KModule, block: BlockRef, error: ReachWithError) -> Self {
        Target { block, error, at_return: module.block(block).is_return() }
    }

    pub fn block(&self) -> BlockRef {
        self.block
    }

    pub fn function(&self) -> FunctionId {
        self.block.function
    }

    pub fn error(&self) -> ReachWithError {
        self.error
    }

    /// The target is a returning block, so it is reached by executing
    /// its last instruction rather than by entering it.
    pub fn at_return(&self) -> bool {
        self.at_return
    }

    pub fn should_fail_on_this_target(&self) -> bool {
        self.error.is_error()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.should_fail_on_this_target() {
            write!(f, "{} ({})", self.block, self.error)
        } else {
            write!(f, "{}", self.block)
        }
    }
}

/// Invents targets for states that stopped making progress, by
/// picking the closest block of the current function that no state
/// has visited yet.
pub struct TargetCalculator {
    module: Arc<KModule>,
    distance: Arc<CodeGraphDistance>,
    blocks_history: BTreeMap<FunctionId, BTreeSet<BlockRef>>,
}

impl TargetCalculator {
    pub fn new(module: Arc<KModule>, distance: Arc<CodeGraphDistance>) -> Self {
        TargetCalculator { module, distance, blocks_history: BTreeMap::new() }
    }

    /// Record the blocks `state` has just moved between.
    pub fn update(&mut self, state: &ExecutionState) {
        let prev = state.prev_pc.block_ref();
        let current = state.pc.block_ref();
        self.blocks_history.entry(prev.function).or_default().insert(prev);
        self.blocks_history.entry(current.function).or_default().insert(current);
    }

    pub fn is_visited(&self, block: BlockRef) -> bool {
        self.blocks_history.get(&block.function).map_or(false, |visited| visited.contains(&block))
    }

    pub fn calculate(&self, state: &ExecutionState) -> Option<Target> {
        let current = state.pc.block_ref();
        for (block, dist) in self.distance.sorted_distance(current) {
            if dist == 0 {
                continue;
            }
            if !self.is_visited(block) && !state.visited(block) {
                return Some(Target::new(&self.module, block, ReachWithError::None));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::tests::DIAMOND;

    #[test]
    fn test_target_order() {
        let module = KModule::parse(DIAMOND).unwrap();
        let f = module.function_id("f").unwrap();
        let bad = Target::new(&module, BlockRef::new(f, 1), ReachWithError::NullPointerException);
        let plain = Target::new(&module, BlockRef::new(f, 1), ReachWithError::None);
        let done = Target::new(&module, BlockRef::new(f, 2), ReachWithError::None);
        assert!(bad < plain);
        assert!(plain < done);
        assert!(bad.should_fail_on_this_target());
        assert!(!plain.should_fail_on_this_target());
        assert!(done.at_return());
        assert!(!bad.at_return())
    }

    #[test]
    fn test_parse_error() {
        assert_eq!(ReachWithError::parse("NullCheckAfterDerefException"), Ok(ReachWithError::NullCheckAfterDerefException));
        assert!(ReachWithError::parse("Segfault").is_err());
        assert_eq!(ReachWithError::default().to_string(), "None")
    }
}
