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

//! Test cases for terminated paths. A [KTest] lists the objects a
//! path needs: the initial contents of every symbolic object, and for
//! every object reachable from them the final contents and the
//! pointers between objects, expressed as object indices and offsets
//! so they can be rebuilt at different addresses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::constant_address_space::{ConstantAddressSpace, ConstantPointerGraph, ConstantResolutionList};
use crate::context::Context;
use crate::error::ExecError;
use crate::expr::{Assignment, SourceKind};
use crate::memory::ObjectId;
use crate::solver::TimingSolver;
use crate::state::{ExecutionState, Symbolic};

/// Extra test cases generated per uninitialized object, since their
/// contents cannot be reproduced.
const UNINIT_MEMORY_TEST_MULTIPLIER: u32 = 6;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pointer {
    /// Where the pointer is stored in the referring object
    pub offset: u64,
    pub index_of_object: u64,
    /// Offset into the object pointed to
    pub index_offset: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KTestContent {
    pub bytes: Vec<u8>,
    pub final_bytes: Vec<u8>,
    pub pointers: Vec<Pointer>,
    pub final_pointers: Vec<Pointer>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KTestObject {
    pub name: String,
    pub address: u64,
    pub content: KTestContent,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KTest {
    pub args: Vec<String>,
    pub sym_argvs: u32,
    pub sym_argv_len: u32,
    pub objects: Vec<KTestObject>,
    pub uninit_coeff: u32,
}

impl KTest {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ExecError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ExecError> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ExecError> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ExecError> {
        let file = File::open(path)?;
        Ok(bincode::deserialize_from(BufReader::new(file))?)
    }
}

pub struct KTestBuilder<'a> {
    model: &'a Assignment,
    space: ConstantAddressSpace<'a>,
    graph: ConstantPointerGraph,
    symbolics: Vec<Symbolic>,
    order: BTreeMap<ObjectId, usize>,
    ktest: KTest,
}

impl<'a> KTestBuilder<'a> {
    /// Builder for the objects of `state` under `model`. With
    /// `only_make_symbolic` set, only explicitly symbolic objects are
    /// sources; otherwise every reproducible symbolic object is.
    pub fn new(state: &'a ExecutionState, model: &'a Assignment, ctx: &'a Context, only_make_symbolic: bool) -> Self {
        let space = ConstantAddressSpace::new(&state.address_space, model, ctx);
        let mut graph = space.pointer_graph();
        let mut symbolics = Vec::new();
        for symbolic in state.symbolics.iter() {
            let selected = match symbolic.array() {
                Some(array) if only_make_symbolic => array.is_make_symbolic(),
                Some(array) => array.is_reproducible(),
                None => false,
            };
            if selected {
                let pair = state
                    .address_space
                    .find_object(&symbolic.object)
                    .ok()
                    .unwrap_or_else(|| (symbolic.object.clone(), symbolic.object_state.clone()));
                graph.add_source(&space, &pair);
                symbolics.push(symbolic.clone())
            }
        }

        let uninit = symbolics
            .iter()
            .filter(|s| s.array().map_or(false, |array| array.source == SourceKind::Uninitialized))
            .count() as u32;

        // Symbolic objects first, then the rest of the graph
        let mut order = BTreeMap::new();
        for symbolic in &symbolics {
            let next = order.len();
            order.entry(symbolic.object.id).or_insert(next);
        }
        for (pair, _) in graph.iter() {
            let next = order.len();
            order.entry(pair.0.id).or_insert(next);
        }

        let mut objects = vec![KTestObject::default(); order.len()];
        for symbolic in &symbolics {
            if let (Some(index), Some(array)) = (order.get(&symbolic.object.id), symbolic.array()) {
                objects[*index].name = array.name.to_string()
            }
        }
        for (pair, _) in graph.iter() {
            let object = &mut objects[order[&pair.0.id]];
            if object.name.is_empty() {
                object.name = format!("object{}", pair.0.id)
            }
        }

        let ktest = KTest { objects, uninit_coeff: UNINIT_MEMORY_TEST_MULTIPLIER * uninit, ..KTest::default() };
        KTestBuilder { model, space, graph, symbolics, order, ktest }
    }

    fn pointers(&self, references: &ConstantResolutionList) -> Vec<Pointer> {
        references
            .iter()
            .filter_map(|(offset, resolution)| {
                let index = self.order.get(&resolution.object.0.id)?;
                let base = self.space.address_of(&resolution.object.0);
                Some(Pointer {
                    offset: *offset,
                    index_of_object: *index as u64,
                    index_offset: resolution.written_address.wrapping_sub(base),
                })
            })
            .collect()
    }

    pub fn fill_args(&mut self, args: Vec<String>, sym_argvs: u32, sym_argv_len: u32) -> &mut Self {
        self.ktest.args = args;
        self.ktest.sym_argvs = sym_argvs;
        self.ktest.sym_argv_len = sym_argv_len;
        self
    }

    pub fn fill_initial_content(&mut self) -> &mut Self {
        for symbolic in &self.symbolics {
            let array = match symbolic.array() {
                Some(array) => array,
                None => continue,
            };
            let size = self.space.size_of(&symbolic.object) as usize;
            let mut bytes = self.model.bytes_of(array);
            bytes.resize(size, 0);
            self.ktest.objects[self.order[&symbolic.object.id]].content.bytes = bytes
        }
        self
    }

    pub fn fill_initial_pointers(&mut self) -> &mut Self {
        for symbolic in &self.symbolics {
            let pair = (symbolic.object.clone(), symbolic.object_state.clone());
            let references = self.space.references_in_initial(&pair);
            let pointers = self.pointers(&references);
            self.ktest.objects[self.order[&symbolic.object.id]].content.pointers = pointers
        }
        self
    }

    pub fn fill_final_content(&mut self) -> &mut Self {
        for (pair, _) in self.graph.iter() {
            let (object, os) = pair;
            let size = self.space.size_of(object);
            let bytes: Vec<u8> =
                (0..size).map(|offset| os.read8(offset).map_or(0, |byte| self.model.evaluate(&byte) as u8)).collect();
            self.ktest.objects[self.order[&object.id]].content.final_bytes = bytes
        }
        self
    }

    pub fn fill_final_pointers(&mut self) -> &mut Self {
        for (pair, references) in self.graph.iter() {
            let address = self.space.address_of(&pair.0);
            let pointers = self.pointers(references);
            let object = &mut self.ktest.objects[self.order[&pair.0.id]];
            object.address = address;
            object.content.final_pointers = pointers
        }
        self
    }

    pub fn build(&mut self) -> KTest {
        std::mem::take(&mut self.ktest)
    }
}

/// A complete test case for `state`, or `None` if its path condition
/// has no model.
pub fn generate(state: &ExecutionState, solver: &mut TimingSolver, ctx: &Context) -> Result<Option<KTest>, ExecError> {
    let model = match solver.get_model(&state.constraints, &state.query_meta)? {
        Some(model) => model,
        None => return Ok(None),
    };
    let ktest = KTestBuilder::new(state, &model, ctx, false)
        .fill_initial_content()
        .fill_initial_pointers()
        .fill_final_content()
        .fill_final_pointers()
        .build();
    Ok(Some(ktest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolveConfig;
    use crate::expr::{Array, Exp, PointerExp, INT8};
    use crate::memory::{KType, MemoryManager, ObjectFlags, ObjectState};
    use crate::module::tests::DIAMOND;
    use crate::module::KModule;
    use crate::solver::enumerate::EnumSolver;
    use crate::state::StateIds;
    use std::sync::Arc;

    fn state_with_input() -> (Context, ExecutionState, Arc<crate::memory::MemoryObject>, Arc<crate::memory::MemoryObject>) {
        let ctx = Context::default();
        let module = KModule::parse(DIAMOND).unwrap();
        let ids = StateIds::new();
        let mut state = ExecutionState::for_function(&ids, Arc::new(ResolveConfig::default()), module.function(0));
        let mut memory = MemoryManager::new(&ctx, 0x1000, 16);

        let input = memory.allocate(2, ObjectFlags::default(), None);
        let array = Array::new("input", 2, SourceKind::MakeSymbolic);
        let os = state.address_space.bind_object(&input, ObjectState::new_symbolic(input.clone(), KType::Untyped, array.clone(), None));
        state.add_symbolic(&input, &os);
        state.add_constraint(Exp::eq(Exp::read(&array, 0, INT8), Exp::constant(7, INT8)));

        // A concrete object pointing at the input, reachable from nothing
        let holder = memory.allocate(8, ObjectFlags::default(), None);
        let mut holder_os = ObjectState::new(holder.clone(), KType::Untyped);
        holder_os.write_pointer(&ctx, 0, &PointerExp::constant(input.id, input.address + 1, 64)).unwrap();
        state.address_space.bind_object(&holder, holder_os);
        (ctx, state, input, holder)
    }

    #[test]
    fn test_generate() {
        let (ctx, state, input, _) = state_with_input();
        let mut solver = TimingSolver::new(Box::new(EnumSolver::new()));
        let ktest = generate(&state, &mut solver, &ctx).unwrap().unwrap();
        assert_eq!(ktest.objects.len(), 1);
        let object = &ktest.objects[0];
        assert_eq!(object.name, "input");
        assert_eq!(object.address, input.address);
        assert_eq!(object.content.bytes[0], 7);
        assert_eq!(object.content.bytes.len(), 2);
        assert_eq!(object.content.final_bytes[0], 7);
        assert!(object.content.pointers.is_empty());
        assert_eq!(ktest.uninit_coeff, 0)
    }

    #[test]
    fn test_unsatisfiable_path_has_no_test() {
        let (ctx, mut state, _, _) = state_with_input();
        state.add_constraint(Exp::ff());
        let mut solver = TimingSolver::new(Box::new(EnumSolver::new()));
        assert!(generate(&state, &mut solver, &ctx).unwrap().is_none())
    }

    #[test]
    fn test_final_pointers_follow_graph() {
        let (ctx, mut state, input, holder) = state_with_input();
        // Make the holder symbolic too, so it is a source
        let holder_array = Array::new("holder", 8, SourceKind::MakeSymbolic);
        let (_, os) = state.address_space.find_object(&holder).ok().unwrap();
        let mut symbolic_os = ObjectState::new_symbolic(holder.clone(), KType::Untyped, holder_array, None);
        symbolic_os.write_pointer(&ctx, 0, &os.read_pointer(&ctx, 0).unwrap()).unwrap();
        state.address_space.unbind_object(&holder);
        let symbolic_os = state.address_space.bind_object(&holder, symbolic_os);
        state.add_symbolic(&holder, &symbolic_os);

        let model = Assignment::new();
        let ktest = KTestBuilder::new(&state, &model, &ctx, true).fill_final_content().fill_final_pointers().build();
        assert_eq!(ktest.objects.len(), 2);
        let holder_object = &ktest.objects[1];
        assert_eq!(holder_object.name, "holder");
        assert_eq!(
            holder_object.content.final_pointers,
            vec![Pointer { offset: 0, index_of_object: 0, index_offset: 1 }]
        );
        assert_eq!(ktest.objects[0].address, input.address)
    }

    #[test]
    fn test_file_round_trip() {
        let ktest = KTest {
            args: vec!["prog".to_string()],
            objects: vec![KTestObject { name: "input".to_string(), address: 0x1000, content: KTestContent::default() }],
            ..KTest::default()
        };
        let dir = std::env::temp_dir().join(format!("symex-ktest-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test000001.ktest");
        ktest.write_to_file(&path).unwrap();
        assert_eq!(KTest::from_file(&path).unwrap(), ktest);
        std::fs::remove_dir_all(&dir).unwrap()
    }
}
