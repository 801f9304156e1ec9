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

//! The program representation explored by the engine. A module is a
//! set of functions, each a control flow graph of basic blocks. Only
//! the information that state tracking and search need is kept: block
//! kinds, successors, instruction counts and source lines.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;

use crate::error::ExecError;
use crate::target::ReachWithError;

pub type FunctionId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockRef {
    pub function: FunctionId,
    pub block: u32,
}

impl BlockRef {
    pub fn new(function: FunctionId, block: u32) -> Self {
        BlockRef { function, block }
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}:b{}", self.function, self.block)
    }
}

/// The position of a single instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstRef {
    pub function: FunctionId,
    pub block: u32,
    pub index: u32,
}

impl InstRef {
    pub fn block_ref(self) -> BlockRef {
        BlockRef { function: self.function, block: self.block }
    }
}

impl fmt::Display for InstRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}:b{}:i{}", self.function, self.block, self.index)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Base,
    /// The terminator of the block calls `callee`.
    Call { callee: FunctionId },
    Return,
}

#[derive(Clone, Debug)]
pub struct KBlock {
    pub id: BlockRef,
    pub label: String,
    pub kind: BlockKind,
    pub instructions: u32,
    pub successors: Vec<BlockRef>,
    pub first_line: u32,
    pub last_line: u32,
    /// Sizes of the stack objects allocated on entry to the block
    pub allocas: Vec<u64>,
    /// Executing the terminator of this block raises an error
    pub error: Option<ReachWithError>,
    /// States entering this block wait for each other here
    pub merge: bool,
}

impl KBlock {
    pub fn first_instruction(&self) -> InstRef {
        InstRef { function: self.id.function, block: self.id.block, index: 0 }
    }

    pub fn last_instruction(&self) -> InstRef {
        InstRef { function: self.id.function, block: self.id.block, index: self.instructions - 1 }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, BlockKind::Call { .. })
    }

    pub fn is_return(&self) -> bool {
        self.kind == BlockKind::Return
    }

    pub fn callee(&self) -> Option<FunctionId> {
        match self.kind {
            BlockKind::Call { callee } => Some(callee),
            _ => None,
        }
    }

    pub fn covers_line(&self, line: u32) -> bool {
        self.first_line <= line && line <= self.last_line
    }
}

#[derive(Clone, Debug)]
pub struct KFunction {
    pub id: FunctionId,
    pub name: String,
    pub file: String,
    pub num_registers: u32,
    pub blocks: Vec<KBlock>,
}

impl KFunction {
    pub fn entry(&self) -> &KBlock {
        &self.blocks[0]
    }

    pub fn call_blocks(&self) -> impl Iterator<Item = &KBlock> {
        self.blocks.iter().filter(|b| b.is_call())
    }

    pub fn return_blocks(&self) -> impl Iterator<Item = &KBlock> {
        self.blocks.iter().filter(|b| b.is_return())
    }

    pub fn num_instructions(&self) -> u32 {
        self.blocks.iter().map(|b| b.instructions).sum()
    }
}

#[derive(Clone, Debug, Default)]
pub struct KModule {
    pub functions: Vec<KFunction>,
    function_map: HashMap<String, FunctionId>,
}

impl KModule {
    pub fn function_id(&self, name: &str) -> Option<FunctionId> {
        self.function_map.get(name).copied()
    }

    pub fn function(&self, id: FunctionId) -> &KFunction {
        &self.functions[id as usize]
    }

    pub fn block(&self, block: BlockRef) -> &KBlock {
        &self.functions[block.function as usize].blocks[block.block as usize]
    }

    pub fn block_of(&self, inst: InstRef) -> &KBlock {
        self.block(inst.block_ref())
    }

    pub fn blocks(&self) -> impl Iterator<Item = &KBlock> {
        self.functions.iter().flat_map(|f| f.blocks.iter())
    }

    pub fn is_terminator(&self, inst: InstRef) -> bool {
        self.block_of(inst).last_instruction() == inst
    }

    pub fn is_first_in_entry(&self, inst: InstRef) -> bool {
        inst.block == 0 && inst.index == 0
    }

    /// The instruction after `inst` within its block, if any.
    pub fn next_in_block(&self, inst: InstRef) -> Option<InstRef> {
        if self.is_terminator(inst) {
            None
        } else {
            Some(InstRef { index: inst.index + 1, ..inst })
        }
    }

    pub fn num_instructions(&self) -> u64 {
        self.functions.iter().map(|f| f.num_instructions() as u64).sum()
    }

    pub fn parse(contents: &str) -> Result<Self, ExecError> {
        let raw: RawModule = toml::from_str(contents).map_err(|e| ExecError::Module(e.to_string()))?;

        let mut function_map = HashMap::new();
        for (i, f) in raw.function.iter().enumerate() {
            if function_map.insert(f.name.clone(), i as FunctionId).is_some() {
                return Err(ExecError::Module(format!("function {} defined twice", f.name)));
            }
        }

        let mut functions = Vec::new();
        for (i, f) in raw.function.into_iter().enumerate() {
            let id = i as FunctionId;
            if f.block.is_empty() {
                return Err(ExecError::Module(format!("function {} has no blocks", f.name)));
            }
            let labels: HashMap<&str, u32> =
                f.block.iter().enumerate().map(|(j, b)| (b.label.as_str(), j as u32)).collect();

            let mut blocks = Vec::new();
            for (j, b) in f.block.iter().enumerate() {
                let mut successors = Vec::new();
                for succ in &b.successors {
                    match labels.get(succ.as_str()) {
                        Some(k) => successors.push(BlockRef::new(id, *k)),
                        None => return Err(ExecError::Module(format!("unknown block {} in {}", succ, f.name))),
                    }
                }
                let kind = match (&b.call, b.ret) {
                    (Some(_), true) => {
                        return Err(ExecError::Module(format!("block {} both calls and returns", b.label)))
                    }
                    (Some(callee), false) => match function_map.get(callee) {
                        Some(callee) => BlockKind::Call { callee: *callee },
                        None => return Err(ExecError::Module(format!("call to unknown function {}", callee))),
                    },
                    (None, true) => BlockKind::Return,
                    (None, false) => BlockKind::Base,
                };
                let error = match &b.error {
                    Some(name) => Some(ReachWithError::parse(name).map_err(ExecError::Module)?),
                    None => None,
                };
                let (first_line, last_line) = match b.lines.as_slice() {
                    [] => (0, 0),
                    [line] => (*line, *line),
                    [first, last] if first <= last => (*first, *last),
                    _ => return Err(ExecError::Module(format!("bad line range for block {}", b.label))),
                };
                blocks.push(KBlock {
                    id: BlockRef::new(id, j as u32),
                    label: b.label.clone(),
                    kind,
                    instructions: b.instructions.max(1),
                    successors,
                    first_line,
                    last_line,
                    allocas: b.allocas.clone(),
                    error,
                    merge: b.merge,
                })
            }
            functions.push(KFunction { id, name: f.name, file: f.file, num_registers: f.registers, blocks })
        }

        Ok(KModule { functions, function_map })
    }

    pub fn from_file<P>(path: P) -> Result<Self, ExecError>
    where
        P: AsRef<Path>,
    {
        let mut contents = String::new();
        File::open(&path)?.read_to_string(&mut contents)?;
        Self::parse(&contents)
    }
}

#[derive(Deserialize)]
struct RawModule {
    #[serde(default)]
    function: Vec<RawFunction>,
}

#[derive(Deserialize)]
struct RawFunction {
    name: String,
    #[serde(default)]
    file: String,
    #[serde(default)]
    registers: u32,
    #[serde(default)]
    block: Vec<RawBlock>,
}

#[derive(Deserialize)]
struct RawBlock {
    label: String,
    #[serde(default = "one")]
    instructions: u32,
    #[serde(default)]
    successors: Vec<String>,
    #[serde(default)]
    lines: Vec<u32>,
    call: Option<String>,
    #[serde(default, rename = "return")]
    ret: bool,
    #[serde(default)]
    allocas: Vec<u64>,
    error: Option<String>,
    #[serde(default)]
    merge: bool,
}

fn one() -> u32 {
    1
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// `main` branches on entry, one side calls `f`, and `f` can
    /// raise a null pointer error.
    pub(crate) const DIAMOND: &str = r#"
        [[function]]
        name = "main"
        file = "main.c"
        registers = 2

        [[function.block]]
        label = "entry"
        instructions = 2
        lines = [1, 2]
        successors = ["left", "right"]
        allocas = [4]

        [[function.block]]
        label = "left"
        call = "f"
        lines = [3, 3]
        successors = ["exit"]

        [[function.block]]
        label = "right"
        instructions = 3
        lines = [5, 6]
        successors = ["exit"]

        [[function.block]]
        label = "exit"
        return = true
        lines = [8]

        [[function]]
        name = "f"
        file = "main.c"
        registers = 3

        [[function.block]]
        label = "entry"
        lines = [10, 11]
        successors = ["bad", "done"]

        [[function.block]]
        label = "bad"
        lines = [12]
        error = "NullPointerException"
        successors = ["done"]

        [[function.block]]
        label = "done"
        return = true
        lines = [13]
    "#;

    #[test]
    fn test_parse() {
        let module = KModule::parse(DIAMOND).unwrap();
        let main = module.function_id("main").unwrap();
        let f = module.function_id("f").unwrap();
        assert_eq!(module.function(main).blocks.len(), 4);
        let left = module.block(BlockRef::new(main, 1));
        assert_eq!(left.callee(), Some(f));
        assert_eq!(left.successors, vec![BlockRef::new(main, 3)]);
        assert!(module.block(BlockRef::new(main, 3)).is_return());
        assert_eq!(module.block(BlockRef::new(f, 1)).error, Some(ReachWithError::NullPointerException));
        let entry = module.function(main).entry();
        assert_eq!(entry.last_instruction().index, 1);
        assert!(module.is_terminator(entry.last_instruction()));
        assert_eq!(module.next_in_block(entry.first_instruction()), Some(entry.last_instruction()));
        assert_eq!(module.num_instructions(), 10)
    }

    #[test]
    fn test_bad_modules() {
        assert!(KModule::parse("[[function]]\nname = \"f\"").is_err());
        let unknown = "[[function]]\nname = \"f\"\n[[function.block]]\nlabel = \"a\"\ncall = \"g\"";
        assert!(KModule::parse(unknown).is_err());
        let dangling = "[[function]]\nname = \"f\"\n[[function.block]]\nlabel = \"a\"\nsuccessors = [\"b\"]";
        assert!(KModule::parse(dangling).is_err())
    }
}
