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

//! The call stack of a state, kept as three parallel stacks: values
//! (registers and stack allocations), call sites, and search
//! information.

use std::sync::Arc;

use crate::adt::persistent::PersistentMap;
use crate::events::CodeLocation;
use crate::expr::ExprRef;
use crate::memory::ObjectId;
use crate::module::{BlockRef, FunctionId, InstRef, KFunction};

#[derive(Clone, Debug)]
pub struct StackFrame {
    pub function: FunctionId,
    /// Objects allocated in this frame, freed when it is popped
    pub allocas: Vec<ObjectId>,
    pub locals: Vec<Option<ExprRef>>,
    pub varargs: Option<ObjectId>,
}

impl StackFrame {
    fn new(function: &KFunction) -> Self {
        StackFrame {
            function: function.id,
            allocas: Vec::new(),
            locals: vec![None; function.num_registers as usize],
            varargs: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CallStackFrame {
    /// The call instruction, `None` for the entry frame
    pub caller: Option<InstRef>,
    pub function: FunctionId,
    /// Overrides the location reported when this frame returns
    pub return_location: Option<Arc<CodeLocation>>,
}

impl CallStackFrame {
    fn new(caller: Option<InstRef>, function: FunctionId) -> Self {
        CallStackFrame { caller, function, return_location: None }
    }

    pub fn same_site(&self, other: &CallStackFrame) -> bool {
        self.caller == other.caller && self.function == other.function
    }
}

#[derive(Clone, Debug)]
pub struct InfoStackFrame {
    pub function: FunctionId,
    /// How often each block was entered since this frame was pushed
    pub multilevel: PersistentMap<BlockRef, u64>,
    pub min_dist_to_uncovered_on_return: u32,
}

impl InfoStackFrame {
    fn new(function: FunctionId) -> Self {
        InfoStackFrame { function, multilevel: PersistentMap::new(), min_dist_to_uncovered_on_return: 0 }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ExecutionStack {
    value_stack: Vec<StackFrame>,
    call_stack: Vec<CallStackFrame>,
    info_stack: Vec<InfoStackFrame>,
    /// Frames whose call site occurs only once in the call stack
    unique_frames: Vec<CallStackFrame>,
    stack_size: u64,
    stack_balance: i64,
    /// Number of live frames of each function
    pub multilevel: PersistentMap<FunctionId, u64>,
}

impl ExecutionStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&mut self, caller: Option<InstRef>, function: &KFunction) {
        let frame = CallStackFrame::new(caller, function.id);
        self.value_stack.push(StackFrame::new(function));
        if !self.call_stack.iter().any(|f| f.same_site(&frame)) {
            self.unique_frames.push(frame.clone())
        }
        self.call_stack.push(frame);
        self.info_stack.push(InfoStackFrame::new(function.id));
        let count = self.multilevel.get_or(&function.id, 0);
        self.multilevel.insert(function.id, count + 1);
        self.stack_balance += 1;
        self.stack_size += function.num_registers as u64;
        debug_assert_eq!(self.value_stack.len(), self.call_stack.len());
        debug_assert_eq!(self.value_stack.len(), self.info_stack.len())
    }

    /// Pops the top frame, returning its value frame so the caller can
    /// release its allocations.
    pub fn pop_frame(&mut self) -> StackFrame {
        let frame = match self.call_stack.pop() {
            Some(frame) => frame,
            None => panic!("pop_frame on an empty stack"),
        };
        self.info_stack.pop();
        let values = match self.value_stack.pop() {
            Some(values) => values,
            None => unreachable!("value stack out of step with call stack"),
        };
        if !self.call_stack.iter().any(|f| f.same_site(&frame)) {
            self.unique_frames.pop();
        }
        match self.multilevel.get_or(&frame.function, 0) {
            0 | 1 => {
                self.multilevel.remove(&frame.function);
            }
            count => {
                self.multilevel.insert(frame.function, count - 1);
            }
        }
        self.stack_balance -= 1;
        self.stack_size -= values.locals.len() as u64;
        values
    }

    pub fn len(&self) -> usize {
        self.value_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value_stack.is_empty()
    }

    pub fn value_stack(&self) -> &[StackFrame] {
        &self.value_stack
    }

    pub fn call_stack(&self) -> &[CallStackFrame] {
        &self.call_stack
    }

    pub fn info_stack(&self) -> &[InfoStackFrame] {
        &self.info_stack
    }

    pub fn unique_frames(&self) -> &[CallStackFrame] {
        &self.unique_frames
    }

    pub fn top(&self) -> Option<&StackFrame> {
        self.value_stack.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut StackFrame> {
        self.value_stack.last_mut()
    }

    pub fn top_info_mut(&mut self) -> Option<&mut InfoStackFrame> {
        self.info_stack.last_mut()
    }

    pub fn stack_size(&self) -> u64 {
        self.stack_size
    }

    /// Frames pushed minus frames popped since the last reset.
    pub fn stack_balance(&self) -> i64 {
        self.stack_balance
    }

    pub fn reset_stack_balance(&mut self) {
        self.stack_balance = 0
    }

    pub fn force_return_location(&mut self, location: Arc<CodeLocation>) {
        if let Some(frame) = self.call_stack.last_mut() {
            frame.return_location = Some(location)
        }
    }

    pub fn forced_return_location(&self) -> Option<&Arc<CodeLocation>> {
        self.call_stack.last()?.return_location.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::tests::DIAMOND;
    use crate::module::KModule;

    #[test]
    fn test_push_pop() {
        let module = KModule::parse(DIAMOND).unwrap();
        let main = module.function(module.function_id("main").unwrap());
        let f = module.function(module.function_id("f").unwrap());
        let site = main.blocks[1].last_instruction();

        let mut stack = ExecutionStack::new();
        stack.push_frame(None, main);
        stack.push_frame(Some(site), f);
        stack.push_frame(Some(site), f);
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.unique_frames().len(), 2);
        assert_eq!(stack.multilevel.get(&f.id), Some(&2));
        assert_eq!(stack.stack_size(), 8);

        stack.pop_frame();
        assert_eq!(stack.unique_frames().len(), 2);
        stack.pop_frame();
        assert_eq!(stack.unique_frames().len(), 1);
        assert_eq!(stack.multilevel.get(&f.id), None);
        assert_eq!(stack.stack_balance(), 1);
        assert_eq!(stack.stack_size(), 2);
        assert_eq!(stack.call_stack().len(), stack.info_stack().len())
    }

    #[test]
    fn test_forced_return_location() {
        let module = KModule::parse(DIAMOND).unwrap();
        let main = module.function(module.function_id("main").unwrap());
        let mut stack = ExecutionStack::new();
        stack.push_frame(None, main);
        assert!(stack.forced_return_location().is_none());
        let location = CodeLocation::new(Default::default(), None, "main.c", 8);
        stack.force_return_location(location.clone());
        assert_eq!(stack.forced_return_location(), Some(&location))
    }
}
