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

//! This module loads a TOML file configuring an exploration run:
//! pointer resolution, search strategy, resource limits and memory
//! layout. Every key is optional and falls back to a default.

use std::fs::File;
use std::io::prelude::*;
use std::path::Path;
use std::time::Duration;
use toml::Value;

use crate::context::Context;
use crate::searcher::weighted::WeightType;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearcherKind {
    Dfs,
    Bfs,
    RandomState,
    RandomPath,
    Weighted(WeightType),
}

impl SearcherKind {
    pub fn parse(name: &str) -> Result<Self, String> {
        use SearcherKind::*;
        Ok(match name {
            "dfs" => Dfs,
            "bfs" => Bfs,
            "random-state" => RandomState,
            "random-path" => RandomPath,
            "nurs:depth" => Weighted(WeightType::Depth),
            "nurs:rp" => Weighted(WeightType::Rp),
            "nurs:icnt" => Weighted(WeightType::InstCount),
            "nurs:cpicnt" => Weighted(WeightType::CpInstCount),
            "nurs:qc" => Weighted(WeightType::QueryCost),
            "nurs:md2u" => Weighted(WeightType::MinDistToUncovered),
            "nurs:covnew" => Weighted(WeightType::CoveringNew),
            _ => return Err(format!("Unknown searcher {}", name)),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Guidance {
    None,
    Coverage,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveConfig {
    /// Forbid symbolic pointers from resolving to objects allocated
    /// after the pointer value was created
    pub use_timestamps: bool,
    pub skip_not_symbolic_objects: bool,
    pub skip_not_lazy_initialized: bool,
    pub skip_local: bool,
    pub skip_global: bool,
    pub max_resolutions: usize,
    pub timeout: Option<Duration>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        ResolveConfig {
            use_timestamps: true,
            skip_not_symbolic_objects: false,
            skip_not_lazy_initialized: false,
            skip_local: false,
            skip_global: false,
            max_resolutions: 0,
            timeout: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchConfig {
    /// Searchers to interleave, in order
    pub searchers: Vec<SearcherKind>,
    pub seed: u64,
    pub batch_time: Option<Duration>,
    pub batch_instructions: u64,
    pub iterative_deepening: bool,
    /// Hold states at merge blocks until no other state can run
    pub merge: bool,
    pub guidance: Guidance,
    pub max_cycles_before_stuck: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            searchers: vec![SearcherKind::RandomPath, SearcherKind::Weighted(WeightType::CoveringNew)],
            seed: 5489,
            batch_time: None,
            batch_instructions: 0,
            iterative_deepening: false,
            merge: false,
            guidance: Guidance::None,
            max_cycles_before_stuck: 1,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Limits {
    pub max_instructions: Option<u64>,
    pub max_forks: Option<u64>,
    pub max_time: Option<Duration>,
    pub max_depth: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryConfig {
    pub pointer_width: u32,
    pub little_endian: bool,
    /// First address handed out by the address manager
    pub deterministic_base: u64,
    /// Allocations are padded and separated to this alignment
    pub alignment: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig { pointer_width: 64, little_endian: true, deterministic_base: 0x7ff3_0000_0000, alignment: 16 }
    }
}

impl MemoryConfig {
    pub fn context(&self) -> Context {
        Context::new(self.pointer_width, self.little_endian)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExplorationConfig {
    pub resolve: ResolveConfig,
    pub search: SearchConfig,
    pub limits: Limits,
    pub memory: MemoryConfig,
}

fn get_value(value: &Value, what: &str) -> Result<u64, String> {
    match value {
        Value::Integer(i) if *i >= 0 => Ok(*i as u64),
        Value::String(s) => {
            let parsed = if s.len() >= 2 && &s[0..2] == "0x" {
                u64::from_str_radix(&s[2..], 16)
            } else {
                u64::from_str_radix(s, 10)
            };
            parsed.map_err(|e| format!("Could not parse {} as a 64-bit unsigned integer in {}: {}", s, what, e))
        }
        _ => Err(format!("Expected an unsigned integer for {}", what)),
    }
}

fn get_table_value(config: &Value, table: &str, key: &str) -> Result<Option<u64>, String> {
    match config.get(table).and_then(|t| t.get(key)) {
        Some(value) => get_value(value, &format!("{}.{}", table, key)).map(Some),
        None => Ok(None),
    }
}

fn get_table_bool(config: &Value, table: &str, key: &str) -> Result<Option<bool>, String> {
    match config.get(table).and_then(|t| t.get(key)) {
        Some(value) => value.as_bool().map(Some).ok_or_else(|| format!("Expected a boolean for {}.{}", table, key)),
        None => Ok(None),
    }
}

fn get_table_string<'a>(config: &'a Value, table: &str, key: &str) -> Result<Option<&'a str>, String> {
    match config.get(table).and_then(|t| t.get(key)) {
        Some(value) => value.as_str().map(Some).ok_or_else(|| format!("Expected a string for {}.{}", table, key)),
        None => Ok(None),
    }
}

fn get_table_millis(config: &Value, table: &str, key: &str) -> Result<Option<Duration>, String> {
    Ok(get_table_value(config, table, key)?.filter(|ms| *ms > 0).map(Duration::from_millis))
}

fn get_searchers(config: &Value) -> Result<Option<Vec<SearcherKind>>, String> {
    match config.get("search").and_then(|t| t.get("searchers")) {
        Some(Value::Array(names)) => {
            let mut searchers = Vec::new();
            for name in names {
                let name = name.as_str().ok_or_else(|| "search.searchers must be a list of strings".to_string())?;
                searchers.push(SearcherKind::parse(name)?)
            }
            if searchers.is_empty() {
                return Err("search.searchers must not be empty".to_string());
            }
            Ok(Some(searchers))
        }
        Some(_) => Err("search.searchers must be a list of strings".to_string()),
        None => Ok(None),
    }
}

fn get_guidance(config: &Value) -> Result<Option<Guidance>, String> {
    match get_table_string(config, "search", "guidance")? {
        Some("none") => Ok(Some(Guidance::None)),
        Some("coverage") => Ok(Some(Guidance::Coverage)),
        Some("error") => Ok(Some(Guidance::Error)),
        Some(other) => Err(format!("Unknown guidance mode {}", other)),
        None => Ok(None),
    }
}

impl ExplorationConfig {
    pub fn parse(contents: &str) -> Result<Self, String> {
        let config = match contents.parse::<Value>() {
            Ok(config) => config,
            Err(e) => return Err(format!("Error when parsing configuration: {}", e)),
        };

        let d = ExplorationConfig::default();

        let resolve = ResolveConfig {
            use_timestamps: get_table_bool(&config, "resolve", "use_timestamps")?.unwrap_or(d.resolve.use_timestamps),
            skip_not_symbolic_objects: get_table_bool(&config, "resolve", "skip_not_symbolic_objects")?
                .unwrap_or(d.resolve.skip_not_symbolic_objects),
            skip_not_lazy_initialized: get_table_bool(&config, "resolve", "skip_not_lazy_initialized")?
                .unwrap_or(d.resolve.skip_not_lazy_initialized),
            skip_local: get_table_bool(&config, "resolve", "skip_local")?.unwrap_or(d.resolve.skip_local),
            skip_global: get_table_bool(&config, "resolve", "skip_global")?.unwrap_or(d.resolve.skip_global),
            max_resolutions: get_table_value(&config, "resolve", "max_resolutions")?
                .map(|n| n as usize)
                .unwrap_or(d.resolve.max_resolutions),
            timeout: get_table_millis(&config, "resolve", "timeout_ms")?,
        };

        let search = SearchConfig {
            searchers: get_searchers(&config)?.unwrap_or(d.search.searchers),
            seed: get_table_value(&config, "search", "seed")?.unwrap_or(d.search.seed),
            batch_time: get_table_millis(&config, "search", "batch_time_ms")?,
            batch_instructions: get_table_value(&config, "search", "batch_instructions")?
                .unwrap_or(d.search.batch_instructions),
            iterative_deepening: get_table_bool(&config, "search", "iterative_deepening")?
                .unwrap_or(d.search.iterative_deepening),
            merge: get_table_bool(&config, "search", "merge")?.unwrap_or(d.search.merge),
            guidance: get_guidance(&config)?.unwrap_or(d.search.guidance),
            max_cycles_before_stuck: get_table_value(&config, "search", "max_cycles_before_stuck")?
                .unwrap_or(d.search.max_cycles_before_stuck),
        };

        let limits = Limits {
            max_instructions: get_table_value(&config, "limits", "max_instructions")?,
            max_forks: get_table_value(&config, "limits", "max_forks")?,
            max_time: get_table_millis(&config, "limits", "max_time_ms")?,
            max_depth: get_table_value(&config, "limits", "max_depth")?.map(|n| n as u32),
        };

        let memory = MemoryConfig {
            pointer_width: get_table_value(&config, "memory", "pointer_width")?
                .map(|w| w as u32)
                .unwrap_or(d.memory.pointer_width),
            little_endian: get_table_bool(&config, "memory", "little_endian")?.unwrap_or(d.memory.little_endian),
            deterministic_base: get_table_value(&config, "memory", "deterministic_base")?
                .unwrap_or(d.memory.deterministic_base),
            alignment: get_table_value(&config, "memory", "alignment")?.unwrap_or(d.memory.alignment),
        };
        if !matches!(memory.pointer_width, 8 | 16 | 32 | 64) {
            return Err(format!("Unsupported pointer width {}", memory.pointer_width));
        }

        Ok(ExplorationConfig { resolve, search, limits, memory })
    }

    /// Load the configuration from a TOML file.
    pub fn from_file<P>(path: P) -> Result<Self, String>
    where
        P: AsRef<Path>,
    {
        let mut contents = String::new();
        match File::open(&path) {
            Ok(mut handle) => match handle.read_to_string(&mut contents) {
                Ok(_) => (),
                Err(e) => return Err(format!("Unexpected failure while reading config: {}", e)),
            },
            Err(e) => return Err(format!("Error when loading config '{}': {}", path.as_ref().display(), e)),
        };
        Self::parse(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExplorationConfig::parse("").unwrap();
        assert_eq!(config, ExplorationConfig::default());
        assert_eq!(config.memory.context().pointer_width(), 64)
    }

    #[test]
    fn test_sections() {
        let config = ExplorationConfig::parse(
            r#"
            [resolve]
            skip_local = true
            max_resolutions = 4
            timeout_ms = 250

            [search]
            searchers = ["dfs", "nurs:md2u"]
            seed = "0x10"
            guidance = "coverage"
            merge = true

            [limits]
            max_instructions = 1000

            [memory]
            pointer_width = 32
            "#,
        )
        .unwrap();
        assert!(config.resolve.skip_local);
        assert_eq!(config.resolve.max_resolutions, 4);
        assert_eq!(config.resolve.timeout, Some(Duration::from_millis(250)));
        assert_eq!(
            config.search.searchers,
            vec![SearcherKind::Dfs, SearcherKind::Weighted(WeightType::MinDistToUncovered)]
        );
        assert_eq!(config.search.seed, 16);
        assert_eq!(config.search.guidance, Guidance::Coverage);
        assert!(config.search.merge);
        assert_eq!(config.limits.max_instructions, Some(1000));
        assert_eq!(config.memory.pointer_width, 32)
    }

    #[test]
    fn test_errors() {
        assert!(ExplorationConfig::parse("[search]\nsearchers = [\"depth-first\"]").is_err());
        assert!(ExplorationConfig::parse("[memory]\npointer_width = 12").is_err());
        assert!(ExplorationConfig::parse("[resolve]\nskip_local = 1").is_err())
    }
}
