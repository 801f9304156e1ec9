// MIT License
//
// Copyright (c) 2019 Alasdair Armstrong
//
// Permission is hereby granted, free of charge, to any person
// obtaining a copy of this software and associated documentation
// files (the "Software"), to deal in the Software without
// restriction, including without limitation the rights to use, copy,
// modify, merge, publish, distribute, sublicense, and/or sell copies
// of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
// BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
// ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use proptest::prelude::*;
use std::sync::Arc;

use symex_lib::config::ResolveConfig;
use symex_lib::context::Context;
use symex_lib::expr::{Array, Exp, PointerExp, SourceKind};
use symex_lib::memory::{KType, MemoryManager, ObjectFlags, ObjectState};
use symex_lib::module::KModule;
use symex_lib::state::{ExecutionState, StateIds};

fn diamond() -> KModule {
    KModule::parse(include_str!("../../configs/diamond.toml")).unwrap()
}

fn entry_state(module: &KModule) -> ExecutionState {
    ExecutionState::for_function(&StateIds::new(), Arc::new(ResolveConfig::default()), module.function(0))
}

#[test]
fn test_branch_depth() {
    let module = diamond();
    let mut s0 = entry_state(&module);
    assert_eq!(s0.depth, 0);
    s0.covered_lines.entry("main.c".to_string()).or_default().insert(1);
    let s1 = s0.branch();
    assert_eq!(s1.depth, 1);
    assert_eq!(s0.depth, 1);
    assert_ne!(s1.id, s0.id);
    assert!(s1.covered_lines.is_empty());
    assert!(!s0.covered_lines.is_empty())
}

#[test]
fn test_popped_allocas_lose_their_resolutions() {
    let ctx = Context::default();
    let module = diamond();
    let mut memory = MemoryManager::new(&ctx, 0x1000, 16);
    let mut state = entry_state(&module);

    let caller = module.function(0).entry().last_instruction();
    state.push_frame(Some(caller), module.function(1));
    let local = memory.allocate(8, ObjectFlags { is_local: true, ..ObjectFlags::default() }, None);
    state.address_space.bind_object(&local, ObjectState::new(local.clone(), KType::Untyped));
    state.add_alloca(&local);

    let index = Array::new("index", 8, SourceKind::MakeSymbolic);
    let base = Exp::read(&index, 0, 64);
    let pointer = PointerExp::new(base.clone(), Exp::constant(local.address, 64));
    state.add_pointer_resolution(&pointer, &local, 4);
    assert!(state.resolved_pointers(&base).is_some());
    assert!(state.has_resolution_to(local.id));

    state.pop_frame();
    assert!(!state.has_resolution_to(local.id));
    assert!(state.resolved_pointers(&base).is_none());
    assert!(state.resolved_subobjects(&pointer, 4).is_none())
}

proptest! {
    #[test]
    fn test_stack_stays_balanced(ops in proptest::collection::vec(any::<bool>(), 0..64)) {
        let module = diamond();
        let mut state = entry_state(&module);
        let caller = module.function(0).entry().last_instruction();
        let mut depth = 1;
        for push in ops {
            if push {
                state.push_frame(Some(caller), module.function((depth % 2) as u32));
                depth += 1
            } else if depth > 1 {
                state.pop_frame();
                depth -= 1
            }
            prop_assert_eq!(state.stack.len(), depth);
            prop_assert_eq!(state.stack.call_stack().len(), depth);
            prop_assert_eq!(state.stack.info_stack().len(), depth);
        }
        while depth > 1 {
            state.pop_frame();
            depth -= 1
        }
        prop_assert_eq!(state.stack.stack_balance(), 1);
        prop_assert_eq!(state.stack.value_stack().len(), 1)
    }
}
