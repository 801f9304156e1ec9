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

//! Source locations named by path traces, and their resolution to
//! basic blocks of a module.

use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;

use crate::error::ExecError;
use crate::module::{BlockRef, KBlock, KFunction, KModule};
use crate::target::ReachWithError;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    pub filename: String,
    /// Empty if the location is not restricted to one function
    pub function: String,
    pub line: u32,
    pub offset: u32,
}

impl Location {
    pub fn new<S: Into<String>>(filename: S, line: u32) -> Self {
        Location { filename: filename.into(), function: String::new(), line, offset: 0 }
    }

    pub fn in_function<S: Into<String>, T: Into<String>>(filename: S, function: T, line: u32, offset: u32) -> Self {
        Location { filename: filename.into(), function: function.into(), line, offset }
    }

    pub fn has_function(&self) -> bool {
        !self.function.is_empty()
    }

    pub fn is_inside_function(&self, function: &KFunction) -> bool {
        function.file == self.filename && (!self.has_function() || function.name == self.function)
    }

    pub fn is_inside(&self, function: &KFunction, block: &KBlock) -> bool {
        self.is_inside_function(function) && block.covers_line(self.line)
    }
}

impl Ord for Location {
    fn cmp(&self, other: &Self) -> Ordering {
        self.line
            .cmp(&other.line)
            .then(self.offset.cmp(&other.offset))
            .then_with(|| self.filename.cmp(&other.filename))
            .then_with(|| self.function.cmp(&other.function))
    }
}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_function() {
            write!(f, "{}:{}:{} ({})", self.filename, self.line, self.offset, self.function)
        } else {
            write!(f, "{}:{}", self.filename, self.line)
        }
    }
}

/// A location in a reported trace, with the error raised there.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocatedEvent {
    pub location: Location,
    pub error: ReachWithError,
    pub id: u32,
}

impl LocatedEvent {
    pub fn new(location: Location, error: ReachWithError) -> Self {
        LocatedEvent { location, error, id: 0 }
    }
}

impl fmt::Display for LocatedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.location, self.error)
    }
}

/// An ordered path of locations; the error is expected at the last one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Locations {
    pub steps: Vec<Location>,
    error: ReachWithError,
}

impl Locations {
    pub fn new(steps: Vec<Location>, error: ReachWithError) -> Self {
        Locations { steps, error }
    }

    pub fn target_error(&self) -> ReachWithError {
        self.error
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Read a list of paths, e.g.
    ///
    /// ```toml
    /// [[path]]
    /// error = "NullPointerException"
    /// steps = [{ file = "main.c", line = 3 }, { file = "main.c", line = 12 }]
    /// ```
    pub fn parse_paths(contents: &str) -> Result<Vec<Locations>, ExecError> {
        let raw: RawPaths = toml::from_str(contents).map_err(|e| ExecError::Config(e.to_string()))?;
        let mut paths = Vec::new();
        for path in raw.path {
            let error = match &path.error {
                Some(name) => ReachWithError::parse(name).map_err(ExecError::Config)?,
                None => ReachWithError::None,
            };
            let steps = path
                .steps
                .into_iter()
                .map(|step| Location {
                    filename: step.file,
                    function: step.function.unwrap_or_default(),
                    line: step.line,
                    offset: step.offset,
                })
                .collect();
            paths.push(Locations::new(steps, error))
        }
        Ok(paths)
    }

    pub fn from_file<P>(path: P) -> Result<Vec<Locations>, ExecError>
    where
        P: AsRef<Path>,
    {
        let mut contents = String::new();
        File::open(&path)?.read_to_string(&mut contents)?;
        Self::parse_paths(&contents)
    }
}

#[derive(Deserialize)]
struct RawPaths {
    #[serde(default)]
    path: Vec<RawPath>,
}

#[derive(Deserialize)]
struct RawPath {
    error: Option<String>,
    steps: Vec<RawStep>,
}

#[derive(Deserialize)]
struct RawStep {
    file: String,
    line: u32,
    function: Option<String>,
    #[serde(default)]
    offset: u32,
}

/// For every step of a path, the blocks it may refer to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedLocations {
    pub locations: Vec<BTreeSet<BlockRef>>,
}

impl ResolvedLocations {
    pub fn new(module: &KModule, locations: &Locations) -> Self {
        let locations = locations.steps.iter().map(|loc| resolve_location(module, loc)).collect();
        ResolvedLocations { locations }
    }
}

pub fn resolve_location(module: &KModule, location: &Location) -> BTreeSet<BlockRef> {
    let mut blocks = BTreeSet::new();
    for function in module.functions.iter().filter(|f| location.is_inside_function(f)) {
        for block in &function.blocks {
            if block.covers_line(location.line) {
                blocks.insert(block.id);
            }
        }
    }
    blocks
}

/// A prefix tree of traces.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathForest {
    pub layer: BTreeMap<LocatedEvent, PathForest>,
}

impl PathForest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.layer.is_empty()
    }

    /// Merges `sub_tree` below `event`.
    pub fn add_sub_tree(&mut self, event: LocatedEvent, sub_tree: PathForest) {
        let existing = self.layer.entry(event).or_default();
        for (event, sub) in sub_tree.layer {
            existing.add_sub_tree(event, sub)
        }
    }

    pub fn add_leaf(&mut self, event: LocatedEvent) {
        self.layer.entry(event).or_default();
    }

    pub fn add_trace(&mut self, trace: &[LocatedEvent]) {
        let mut forest = self;
        for event in trace {
            forest = forest.layer.entry(event.clone()).or_default()
        }
    }

    /// Extends every trace of length one to length two by repeating
    /// its only event, since the first layer only selects the entry
    /// function.
    pub fn normalize(&mut self) {
        for (event, sub) in self.layer.iter_mut() {
            if sub.is_empty() {
                sub.add_leaf(event.clone())
            }
        }
    }

    /// All events appearing in the forest.
    pub fn events(&self) -> BTreeSet<LocatedEvent> {
        let mut events = BTreeSet::new();
        self.collect_events(&mut events);
        events
    }

    fn collect_events(&self, events: &mut BTreeSet<LocatedEvent>) {
        for (event, sub) in &self.layer {
            events.insert(event.clone());
            sub.collect_events(events)
        }
    }
}
