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

//! Prefix trees of targets attached to execution states.
//!
//! A `TargetForest` is an immutable value: every update builds a new
//! root that shares all untouched layers with the old one, so states
//! holding the same forest are never affected by each other's steps.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::adt::persistent::PersistentMap;
use crate::locations::{LocatedEvent, PathForest, ResolvedLocations};
use crate::module::BlockRef;
use crate::target::Target;

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Layer {
    forest: PersistentMap<Target, Arc<Layer>>,
}

impl Layer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.forest.is_empty()
    }

    pub fn len(&self) -> usize {
        self.forest.len()
    }

    pub fn get(&self, target: &Target) -> Option<&Arc<Layer>> {
        self.forest.get(target)
    }

    pub fn contains(&self, target: &Target) -> bool {
        self.forest.contains_key(target)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Target, &Arc<Layer>)> {
        self.forest.iter()
    }

    pub fn insert(&mut self, target: Target, child: Arc<Layer>) {
        self.forest.insert(target, child);
    }

    /// Merge `other` into this layer. Children present in both are
    /// merged into fresh layers; the originals are left untouched.
    pub fn union_with(&mut self, other: &Layer) {
        for (target, theirs) in other.forest.iter() {
            let merged = match self.forest.get(target) {
                None => theirs.clone(),
                Some(ours) if Arc::ptr_eq(ours, theirs) => continue,
                Some(ours) => {
                    let mut layer = Layer::clone(ours);
                    layer.union_with(theirs);
                    Arc::new(layer)
                }
            };
            self.forest.insert(target.clone(), merged);
        }
    }

    pub fn remove_child(&self, child: &Target) -> Layer {
        Layer { forest: self.forest.without(child) }
    }

    pub fn add_child(&self, child: Target) -> Layer {
        Layer { forest: self.forest.with(child, Arc::new(Layer::new())) }
    }

    /// Replace `child` by the targets that follow it.
    pub fn replace_child_with(&self, child: &Target, other: &Layer) -> Layer {
        let mut result = self.remove_child(child);
        result.union_with(other);
        result
    }

    /// A chain of layers choosing one block from every step, for
    /// every combination of choices.
    fn from_steps(steps: &[BTreeSet<BlockRef>], block_to_target: &BTreeMap<BlockRef, Target>) -> Layer {
        let mut layer = Layer::new();
        if let Some((first, rest)) = steps.split_first() {
            let child = Arc::new(Layer::from_steps(rest, block_to_target));
            for block in first {
                if let Some(target) = block_to_target.get(block) {
                    layer.forest.insert(target.clone(), child.clone());
                }
            }
        }
        layer
    }

    fn from_path_forest(paths: &PathForest, event_to_targets: &BTreeMap<LocatedEvent, BTreeSet<Target>>) -> Layer {
        let mut layer = Layer::new();
        for (event, sub) in &paths.layer {
            let targets = match event_to_targets.get(event) {
                Some(targets) => targets,
                None => continue,
            };
            let child = Arc::new(Layer::from_path_forest(sub, event_to_targets));
            for target in targets {
                let mut single = Layer::new();
                single.forest.insert(target.clone(), child.clone());
                layer.union_with(&single)
            }
        }
        layer
    }

    fn fmt_depth(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for (target, child) in self.forest.iter() {
            writeln!(f, "{:indent$}{}", "", target, indent = 2 * depth)?;
            child.fmt_depth(f, depth + 1)?
        }
        Ok(())
    }
}

/// The targets a state has stepped through, most recent first.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetsHistory {
    target: Option<Target>,
    visited: Option<Arc<TargetsHistory>>,
}

impl TargetsHistory {
    pub fn create() -> Arc<TargetsHistory> {
        Arc::new(TargetsHistory::default())
    }

    pub fn add(self: &Arc<Self>, target: Target) -> Arc<TargetsHistory> {
        Arc::new(TargetsHistory { target: Some(target), visited: Some(self.clone()) })
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn visited(&self) -> Option<&Arc<TargetsHistory>> {
        self.visited.as_ref()
    }

    pub fn len(&self) -> usize {
        match (&self.target, &self.visited) {
            (None, _) => 0,
            (Some(_), None) => 1,
            (Some(_), Some(visited)) => 1 + visited.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_none()
    }
}

impl fmt::Display for TargetsHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.target, &self.visited) {
            (None, _) => write!(f, "end"),
            (Some(target), Some(visited)) => write!(f, "{} <- {}", target, visited),
            (Some(target), None) => write!(f, "{}", target),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TargetForest {
    forest: Arc<Layer>,
    history: Arc<TargetsHistory>,
}

impl Default for TargetForest {
    fn default() -> Self {
        TargetForest::new(Arc::new(Layer::new()))
    }
}

impl TargetForest {
    pub fn new(forest: Arc<Layer>) -> Self {
        TargetForest { forest, history: TargetsHistory::create() }
    }

    /// The forest of every path in `paths`, where each step may be any
    /// of its resolved blocks that has a target.
    pub fn from_resolved_paths(paths: &[ResolvedLocations], block_to_target: &BTreeMap<BlockRef, Target>) -> Self {
        let mut root = Layer::new();
        for path in paths {
            root.union_with(&Layer::from_steps(&path.locations, block_to_target))
        }
        TargetForest::new(Arc::new(root))
    }

    pub fn from_path_forest(paths: &PathForest, event_to_targets: &BTreeMap<LocatedEvent, BTreeSet<Target>>) -> Self {
        TargetForest::new(Arc::new(Layer::from_path_forest(paths, event_to_targets)))
    }

    pub fn with_history(forest: Arc<Layer>, history: Arc<TargetsHistory>) -> Self {
        TargetForest { forest, history }
    }

    pub fn is_empty(&self) -> bool {
        self.forest.is_empty()
    }

    pub fn len(&self) -> usize {
        self.forest.len()
    }

    pub fn contains(&self, target: &Target) -> bool {
        self.forest.contains(target)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Target, &Arc<Layer>)> {
        self.forest.iter()
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.forest.iter().map(|(target, _)| target)
    }

    pub fn history(&self) -> &Arc<TargetsHistory> {
        &self.history
    }

    pub fn layer(&self) -> &Arc<Layer> {
        &self.forest
    }

    /// Move past `target`: it is appended to the history and replaced by
    /// the targets that follow it. Reaching an error target ends the
    /// forest.
    pub fn step_to(&mut self, target: &Target) {
        if self.forest.is_empty() {
            return;
        }
        let child = match self.forest.get(target) {
            Some(child) => child.clone(),
            None => return,
        };
        self.history = self.history.add(target.clone());
        if target.should_fail_on_this_target() {
            self.forest = Arc::new(Layer::new())
        } else {
            self.forest = Arc::new(self.forest.replace_child_with(target, &child))
        }
    }

    pub fn add(&mut self, target: Target) {
        if self.forest.contains(&target) {
            return;
        }
        self.forest = Arc::new(self.forest.add_child(target))
    }

    pub fn remove(&mut self, target: &Target) {
        if !self.forest.contains(target) {
            return;
        }
        self.forest = Arc::new(self.forest.remove_child(target))
    }
}

impl fmt::Display for TargetForest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "history: {}", self.history)?;
        self.forest.fmt_depth(f, 0)
    }
}
