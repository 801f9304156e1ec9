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

//! This module implements the main loop of the exploration. An
//! [Executor] owns the live states, asks a [Searcher](crate::searcher::Searcher) which one to
//! run next, hands it to an [Interpreter] for a single step, and then
//! reports what happened back to the searcher. Terminated states are
//! passed to a [Collector] before they are dropped.
//!
//! [CfgWalker] is an interpreter for the control flow of a [KModule]
//! alone. Every multi-way branch is decided by the next byte of a
//! symbolic `input` array, so exploring a module with it enumerates
//! its feasible paths.

use crossbeam::queue::SegQueue;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::allocation_record::{AllocationContext, AllocationRecord};
use crate::config::ExplorationConfig;
use crate::context::Context;
use crate::error::ExecError;
use crate::events::{AllocKind, CodeEvent, CodeLocation, EventKind};
use crate::expr::{Array, Exp, ExprRef, SourceKind, INT8};
use crate::log;
use crate::{if_logging, log_from};
use crate::memory::{KType, MemoryManager, MemoryObject, ObjectFlags, ObjectState};
use crate::module::{BlockRef, FunctionId, InstRef, KModule};
use crate::searcher::{construct_searcher, SearchContext};
use crate::solver::{Solver, TimingSolver};
use crate::state::{ExecutionState, StateId, StateIds, StatePool, TerminationReason};
use crate::stats::Statistics;
use crate::target::{ReachWithError, Target};
use crate::target_forest::TargetForest;

pub enum StepResult {
    Continue,
    /// The state was split; the new states have already been branched
    /// from the stepped one.
    Fork(Vec<ExecutionState>),
    Terminate(TerminationReason),
}

/// Everything an interpreter may use while stepping a state.
pub struct StepContext<'a> {
    pub module: &'a KModule,
    pub context: &'a Context,
    pub memory: &'a mut MemoryManager,
    pub solver: &'a mut TimingSolver,
}

pub trait Interpreter {
    /// Prepare a freshly created initial state.
    fn initialize(&mut self, _state: &mut ExecutionState, _ctx: &mut StepContext<'_>) -> Result<(), ExecError> {
        Ok(())
    }

    /// Execute the instruction at `state.pc`.
    fn step(&mut self, state: &mut ExecutionState, ctx: &mut StepContext<'_>) -> StepResult;
}

/// A collector is run on every state as it terminates, together with
/// the reason it terminated and the solver, so it can compute inputs
/// for the path. Results are accumulated in some `R` shared by all
/// calls.
pub type Collector<'a, R> = dyn 'a + Fn(&ExecutionState, &TerminationReason, &mut TimingSolver, &R);

/// Collects the identifier and termination reason of each path.
pub fn reason_collector(state: &ExecutionState, reason: &TerminationReason, _: &mut TimingSolver, collected: &SegQueue<(StateId, TerminationReason)>) {
    collected.push((state.id, reason.clone()))
}

#[derive(Debug, Default)]
pub struct Summary {
    pub completed: u64,
    pub errors: u64,
    pub early: u64,
    pub instructions: u64,
    pub forks: u64,
    pub covered_blocks: usize,
    pub total_blocks: usize,
    /// Every state seen reaching each target
    pub reached: BTreeMap<Target, BTreeSet<StateId>>,
    pub elapsed: Duration,
}

impl Summary {
    pub fn paths(&self) -> u64 {
        self.completed + self.errors + self.early
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "paths: {} ({} completed, {} errors, {} early)", self.paths(), self.completed, self.errors, self.early)?;
        writeln!(f, "instructions: {}", self.instructions)?;
        writeln!(f, "forks: {}", self.forks)?;
        writeln!(f, "coverage: {}/{} blocks", self.covered_blocks, self.total_blocks)?;
        for (target, states) in &self.reached {
            writeln!(f, "reached {}: {} states", target, states.len())?
        }
        write!(f, "time: {:.3}s", self.elapsed.as_secs_f64())
    }
}

pub struct Executor<I> {
    module: Arc<KModule>,
    config: ExplorationConfig,
    search: SearchContext,
    context: Context,
    memory: MemoryManager,
    solver: TimingSolver,
    ids: StateIds,
    interpreter: I,
    halt: Arc<AtomicBool>,
}

impl<I: Interpreter> Executor<I> {
    pub fn new(module: Arc<KModule>, config: ExplorationConfig, solver: Box<dyn Solver>, interpreter: I) -> Self {
        let context = config.memory.context();
        let memory = MemoryManager::new(&context, config.memory.deterministic_base, config.memory.alignment);
        let mut solver = TimingSolver::new(solver);
        solver.set_timeout(config.resolve.timeout);
        Executor {
            search: SearchContext::new(module.clone()),
            module,
            config,
            context,
            memory,
            solver,
            ids: StateIds::new(),
            interpreter,
            halt: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stats(&self) -> &Arc<Statistics> {
        &self.search.stats
    }

    pub fn module(&self) -> &Arc<KModule> {
        &self.module
    }

    pub fn interpreter(&self) -> &I {
        &self.interpreter
    }

    /// Setting the returned flag stops the exploration at the next
    /// step; every live state is then terminated as interrupted.
    pub fn halt_handle(&self) -> Arc<AtomicBool> {
        self.halt.clone()
    }

    fn step_context(&mut self) -> (StepContext<'_>, &mut I) {
        (
            StepContext { module: &self.module, context: &self.context, memory: &mut self.memory, solver: &mut self.solver },
            &mut self.interpreter,
        )
    }

    /// A state at the entry of `function`, prepared by the interpreter.
    pub fn initial_state(&mut self, function: FunctionId) -> Result<ExecutionState, ExecError> {
        let config = Arc::new(self.config.resolve.clone());
        let mut state = ExecutionState::for_function(&self.ids, config, self.module.function(function));
        let (mut ctx, interpreter) = self.step_context();
        interpreter.initialize(&mut state, &mut ctx)?;
        Ok(state)
    }

    /// An initial state directed towards the targets in `forest`.
    pub fn initial_targeted_state(&mut self, function: FunctionId, forest: TargetForest) -> Result<ExecutionState, ExecError> {
        let mut state = self.initial_state(function)?;
        state.set_targets(forest.targets().cloned());
        state.target_forest = forest;
        state.set_targeted(true);
        Ok(state)
    }

    fn limit_reached(&self, start: Instant) -> Option<TerminationReason> {
        let limits = &self.config.limits;
        if self.halt.load(Ordering::Relaxed) {
            return Some(TerminationReason::Interrupted);
        }
        if limits.max_time.map_or(false, |max| start.elapsed() >= max) {
            return Some(TerminationReason::Interrupted);
        }
        if limits.max_instructions.map_or(false, |max| self.search.stats.total_instructions() >= max) {
            return Some(TerminationReason::MaxInstructions);
        }
        None
    }

    fn forks_exhausted(&self) -> bool {
        self.config.limits.max_forks.map_or(false, |max| self.search.stats.forks() >= max)
    }

    fn too_deep(&self, state: &ExecutionState) -> bool {
        self.config.limits.max_depth.map_or(false, |max| state.depth > max)
    }

    /// Bookkeeping after a state was stepped to a new position.
    fn after_step(&self, state: &mut ExecutionState) {
        state.increase_level(&self.module);
        state.update_covered_new();
        if state.pc.index == 0 && self.module.is_terminator(state.prev_pc) {
            let block = state.pc_block();
            if self.search.stats.cover_block(block) {
                let kblock = self.module.block(block);
                let file = self.module.function(block.function).file.clone();
                state.covered_lines.entry(file).or_default().extend(kblock.first_line..=kblock.last_line);
                state.cover_new();
                state.insts_since_cov_new = 0;
                return;
            }
        }
        state.insts_since_cov_new = state.insts_since_cov_new.saturating_add(1)
    }

    fn terminate<R>(&mut self, state: ExecutionState, reason: TerminationReason, summary: &mut Summary, collected: &R, collector: &Collector<'_, R>) {
        log_from!(state.id, log::VERBOSE, format!("terminated: {}", reason));
        if reason.is_error() {
            summary.errors += 1;
            if_logging!(log::VERBOSE, {
                eprint!("{}", state.dump_stack(&self.module))
            })
        } else if reason.is_early() {
            summary.early += 1
        } else {
            summary.completed += 1
        }
        collector(&state, &reason, &mut self.solver, collected)
    }

    /// Explore from `initial` until the searcher runs out of states or
    /// a limit is hit. Every path is passed to `collector` exactly once.
    pub fn run<R>(&mut self, initial: ExecutionState, collected: &R, collector: &Collector<'_, R>) -> Summary {
        let start = Instant::now();
        let mut summary = Summary::default();
        let first = initial.id;
        let mut pool = StatePool::new(initial);
        if let Some(state) = pool.get_mut(first) {
            let block = state.pc_block();
            if self.search.stats.cover_block(block) {
                state.cover_new()
            }
        }

        let mut searcher = construct_searcher(&self.config.search, &self.search, &mut pool);
        log!(log::SEARCH, format!("using searcher {}", searcher.name()));
        searcher.update(&mut pool, None, &[first], &[]);

        let mut stop_reason = TerminationReason::Interrupted;
        while !searcher.is_empty() {
            if let Some(reason) = self.limit_reached(start) {
                stop_reason = reason;
                break;
            }

            let id = searcher.select_state(&pool);
            let forks_exhausted = self.forks_exhausted();
            let outcome = self.step(&mut pool, id, forks_exhausted);
            let removed: Vec<StateId> = outcome.terminated.iter().map(|(id, _)| *id).collect();
            searcher.update(&mut pool, Some(id), &outcome.added, &removed);

            for (target, states) in searcher.take_reached() {
                log!(log::TARGET, format!("{} reached by {} states", target, states.len()));
                summary.reached.entry(target).or_default().extend(states)
            }

            for (id, reason) in outcome.terminated {
                if let Some(state) = pool.remove(id) {
                    self.terminate(state, reason, &mut summary, collected, collector)
                }
            }
            for (state, reason) in outcome.discarded {
                self.terminate(state, reason, &mut summary, collected, collector)
            }
        }

        // Whatever is left was paused by the searcher or cut off by a limit
        let leftover: Vec<StateId> = pool.ids().collect();
        for id in leftover {
            if let Some(state) = pool.remove(id) {
                self.terminate(state, stop_reason.clone(), &mut summary, collected, collector)
            }
        }

        let stats = &self.search.stats;
        summary.instructions = stats.total_instructions();
        summary.forks = stats.forks();
        summary.covered_blocks = stats.covered_blocks();
        summary.total_blocks = stats.total_blocks();
        summary.elapsed = start.elapsed();
        summary
    }

    /// Step state `id` once. Terminated states stay in the pool until
    /// the caller has told the searcher about them.
    fn step(&mut self, pool: &mut StatePool, id: StateId, forks_exhausted: bool) -> StepOutcome {
        let module = self.module.clone();
        let stats = self.search.stats.clone();
        let context = self.context;

        let state = match pool.get_mut(id) {
            Some(state) => state,
            None => panic!("searcher selected state {} which is not live", id),
        };
        if forks_exhausted {
            state.fork_disabled = true
        }
        stats.record_instruction(state.pc);
        state.stepped_instructions += 1;

        let mut ctx = StepContext { module: &module, context: &context, memory: &mut self.memory, solver: &mut self.solver };
        let result = self.interpreter.step(state, &mut ctx);

        let mut outcome = StepOutcome::default();
        match result {
            StepResult::Continue => self.after_step(state),
            StepResult::Terminate(reason) => outcome.terminated.push((id, reason)),
            StepResult::Fork(forks) => {
                self.after_step(state);
                for mut forked in forks {
                    stats.record_fork();
                    self.after_step(&mut forked);
                    log_from!(id, log::FORK, format!("forked state {} at {}", forked.id, forked.pc));
                    if self.too_deep(&forked) {
                        outcome.discarded.push((forked, TerminationReason::MaxDepth));
                        continue;
                    }
                    outcome.added.push(forked.id);
                    pool.add_forked(id, forked)
                }
            }
        }

        if outcome.terminated.is_empty() && self.too_deep(&pool[id]) {
            outcome.terminated.push((id, TerminationReason::MaxDepth))
        }
        outcome
    }
}

#[derive(Default)]
struct StepOutcome {
    added: Vec<StateId>,
    /// States to remove from the pool, with why they terminated
    terminated: Vec<(StateId, TerminationReason)>,
    /// Forks that terminated before joining the pool
    discarded: Vec<(ExecutionState, TerminationReason)>,
}

/// Walks the control flow graph of a module. Straight line
/// instructions only advance the program counter; terminators branch,
/// call, return, or raise the error attached to their block.
pub struct CfgWalker {
    input_size: u64,
    input: Option<Arc<MemoryObject>>,
    stack_objects: AllocationRecord,
}

impl CfgWalker {
    pub fn new(input_size: u64) -> Self {
        CfgWalker { input_size, input: None, stack_objects: AllocationRecord::new() }
    }

    /// The object holding the symbolic input, once allocated.
    pub fn input(&self) -> Option<&Arc<MemoryObject>> {
        self.input.as_ref()
    }

    /// Move `state` to the start of `to`, allocating its stack objects.
    fn transfer(&mut self, state: &mut ExecutionState, to: BlockRef, ctx: &mut StepContext<'_>) {
        state.incoming_block = Some(state.pc_block());
        state.pc = ctx.module.block(to).first_instruction();
        state.path_index.block += 1;
        state.path_index.instruction = 0;
        self.enter_block(state, ctx)
    }

    fn location(state: &ExecutionState, module: &KModule) -> Arc<CodeLocation> {
        let block = module.block_of(state.prev_pc);
        let file = &module.function(state.prev_pc.function).file;
        CodeLocation::new(state.path_index, Some(state.prev_pc), file.clone(), block.first_line as u64)
    }

    /// Stack objects are reused across states: a state gets the oldest
    /// object allocated at the same site and calling context that it
    /// does not already hold.
    fn enter_block(&mut self, state: &mut ExecutionState, ctx: &mut StepContext<'_>) {
        let module = ctx.module;
        let block = module.block_of(state.pc);
        if block.allocas.is_empty() {
            return;
        }
        let callers: Vec<_> = state.stack.call_stack().iter().filter_map(|frame| frame.caller).collect();
        for (i, size) in block.allocas.iter().enumerate() {
            let site = InstRef { index: i as u32, ..block.first_instruction() };
            let context = AllocationContext::new(site, &callers);
            let reused = self.stack_objects.iter(&context).find(|mo| state.address_space.find_object(mo).is_none()).cloned();
            let mo = match reused {
                Some(mo) => mo,
                None => {
                    let flags = ObjectFlags { is_local: true, ..ObjectFlags::default() };
                    let mo = ctx.memory.allocate(*size, flags, Some(site));
                    self.stack_objects.add_addr(context, mo.clone());
                    mo
                }
            };
            state.address_space.bind_object(&mo, ObjectState::new(mo.clone(), KType::Untyped));
            state.add_alloca(&mo);
            let location = Self::location(state, module);
            state.events.record(CodeEvent::new(EventKind::Alloc(AllocKind::Local), location))
        }
    }

    fn next_input_byte(&self, state: &mut ExecutionState) -> Result<ExprRef, TerminationReason> {
        let input = match &self.input {
            Some(input) => input,
            None => return Err(TerminationReason::MemoryError("no input object".to_string())),
        };
        let offset = state.stepped_memory_instructions;
        if offset >= input.size {
            return Err(TerminationReason::MaxDepth);
        }
        let os = match state.address_space.find_object(input).ok() {
            Some((_, os)) => os,
            None => return Err(TerminationReason::MemoryError(format!("input object {} is not bound", input.id))),
        };
        let byte = os.read8(offset).map_err(|e| TerminationReason::MemoryError(e.to_string()))?;
        state.stepped_memory_instructions += 1;
        Ok(byte)
    }

    fn branch(&mut self, state: &mut ExecutionState, ctx: &mut StepContext<'_>) -> StepResult {
        let successors = ctx.module.block_of(state.pc).successors.clone();
        let byte = match self.next_input_byte(state) {
            Ok(byte) => byte,
            Err(reason) => return StepResult::Terminate(reason),
        };

        let mut feasible = Vec::new();
        for i in 0..successors.len() {
            let condition = successor_condition(&byte, i as u64, successors.len() as u64);
            match ctx.solver.may_be_true(&state.constraints, &condition, &state.query_meta) {
                Ok(true) => {
                    feasible.push((successors[i], condition));
                    if state.fork_disabled {
                        break;
                    }
                }
                Ok(false) => (),
                Err(e) => {
                    log_from!(state.id, log::SOLVER, format!("branch query failed: {}", e));
                    return StepResult::Terminate(TerminationReason::Solver);
                }
            }
        }

        let mut feasible = feasible.into_iter();
        let (first, first_condition) = match feasible.next() {
            Some(first) => first,
            None => return StepResult::Terminate(TerminationReason::Solver),
        };

        let mut forks = Vec::new();
        for (successor, condition) in feasible {
            let mut forked = state.branch();
            forked.add_constraint(condition);
            let location = Self::location(&forked, ctx.module);
            forked.events.record(CodeEvent::new(EventKind::Br { chosen: false }, location));
            self.transfer(&mut forked, successor, ctx);
            forks.push(forked)
        }

        if !forks.is_empty() {
            state.add_constraint(first_condition);
            let location = Self::location(state, ctx.module);
            state.events.record(CodeEvent::new(EventKind::Br { chosen: true }, location));
        }
        self.transfer(state, first, ctx);

        if forks.is_empty() {
            StepResult::Continue
        } else {
            StepResult::Fork(forks)
        }
    }

    fn call(&mut self, state: &mut ExecutionState, callee: FunctionId, ctx: &mut StepContext<'_>) -> StepResult {
        let module = ctx.module;
        let function = module.function(callee);
        let location = Self::location(state, module);
        state.events.record(CodeEvent::new(EventKind::Call { function: function.name.clone() }, location));
        let caller = state.pc;
        state.push_frame(Some(caller), function);
        self.transfer(state, function.entry().id, ctx);
        StepResult::Continue
    }

    fn ret(&mut self, state: &mut ExecutionState, ctx: &mut StepContext<'_>) -> StepResult {
        let caller = state.stack.call_stack().last().and_then(|frame| frame.caller);
        state.pop_frame();
        let caller = match caller {
            Some(caller) => caller,
            None => return StepResult::Terminate(TerminationReason::Exit),
        };
        let module = ctx.module;
        let location = Self::location(state, module);
        let name = module.function(caller.function).name.clone();
        state.events.record(CodeEvent::new(EventKind::Ret { caller: name }, location));
        match module.block_of(caller).successors.first() {
            Some(next) => {
                self.transfer(state, *next, ctx);
                StepResult::Continue
            }
            None => StepResult::Terminate(TerminationReason::Exit),
        }
    }
}

/// The condition for taking successor `i` of `n`: the input byte lies
/// in the `i`th of `n` equal slices of its range.
fn successor_condition(byte: &ExprRef, i: u64, n: u64) -> ExprRef {
    let lo = i * 256 / n;
    let hi = (i + 1) * 256 / n;
    let above = if lo == 0 { Exp::tt() } else { Exp::ule(Exp::constant(lo, INT8), byte.clone()) };
    let below = if hi >= 256 { Exp::tt() } else { Exp::ult(byte.clone(), Exp::constant(hi, INT8)) };
    Exp::and(above, below)
}

impl Interpreter for CfgWalker {
    fn initialize(&mut self, state: &mut ExecutionState, ctx: &mut StepContext<'_>) -> Result<(), ExecError> {
        let input = match &self.input {
            Some(input) => input.clone(),
            None => {
                let flags = ObjectFlags { is_user_specified: true, ..ObjectFlags::default() };
                let input = ctx.memory.allocate(self.input_size, flags, None);
                self.input = Some(input.clone());
                input
            }
        };
        let array = Array::new("input", self.input_size, SourceKind::MakeSymbolic);
        let os = state.address_space.bind_object(&input, ObjectState::new_symbolic(input.clone(), KType::Untyped, array, None));
        state.add_symbolic(&input, &os);
        state.array_names.insert("input".to_string(), 1);
        self.enter_block(state, ctx);
        Ok(())
    }

    fn step(&mut self, state: &mut ExecutionState, ctx: &mut StepContext<'_>) -> StepResult {
        state.prev_pc = state.pc;
        if let Some(next) = ctx.module.next_in_block(state.pc) {
            state.pc = next;
            state.path_index.instruction = next.index;
            return StepResult::Continue;
        }

        let module = ctx.module;
        let block = module.block_of(state.pc);
        if let Some(error) = block.error.filter(|e| *e != ReachWithError::None) {
            state.error = error;
            let location = Self::location(state, module);
            let message = format!("{} in {}", error, module.function(state.pc.function).name);
            state.events.record(CodeEvent::new(EventKind::Err { rule_id: error.name().to_string(), message }, location));
            return StepResult::Terminate(TerminationReason::Error(error));
        }

        if let Some(callee) = block.callee() {
            return self.call(state, callee, ctx);
        }
        if block.is_return() {
            return self.ret(state, ctx);
        }
        match block.successors.len() {
            0 => StepResult::Terminate(TerminationReason::Exit),
            1 => {
                let next = block.successors[0];
                self.transfer(state, next, ctx);
                StepResult::Continue
            }
            _ => self.branch(state, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Guidance, SearcherKind};
    use crate::module::tests::DIAMOND;
    use crate::solver::enumerate::EnumSolver;

    fn executor(config: ExplorationConfig) -> Executor<CfgWalker> {
        let module = Arc::new(KModule::parse(DIAMOND).unwrap());
        Executor::new(module, config, Box::new(EnumSolver::new()), CfgWalker::new(16))
    }

    fn explore(config: ExplorationConfig) -> (Summary, Vec<(StateId, TerminationReason)>) {
        let mut executor = executor(config);
        let main = executor.module().function_id("main").unwrap();
        let initial = executor.initial_state(main).unwrap();
        let collected = SegQueue::new();
        let summary = executor.run(initial, &collected, &reason_collector);
        let mut reasons = Vec::new();
        while let Some(r) = collected.pop() {
            reasons.push(r)
        }
        (summary, reasons)
    }

    #[test]
    fn test_explores_all_paths() {
        for searcher in &[SearcherKind::Dfs, SearcherKind::Bfs, SearcherKind::RandomPath, SearcherKind::RandomState] {
            let mut config = ExplorationConfig::default();
            config.search.searchers = vec![*searcher];
            let (summary, reasons) = explore(config);
            assert_eq!(summary.paths(), 3);
            assert_eq!(summary.completed, 2);
            assert_eq!(summary.errors, 1);
            assert_eq!(summary.forks, 2);
            assert_eq!(summary.covered_blocks, summary.total_blocks);
            assert_eq!(
                reasons.iter().filter(|(_, r)| *r == TerminationReason::Error(ReachWithError::NullPointerException)).count(),
                1
            )
        }
    }

    #[test]
    fn test_merge_points_keep_every_path() {
        let module = KModule::parse(
            r#"
            [[function]]
            name = "main"
            file = "join.c"

            [[function.block]]
            label = "entry"
            successors = ["left", "right"]

            [[function.block]]
            label = "left"
            successors = ["join"]

            [[function.block]]
            label = "right"
            instructions = 3
            successors = ["join"]

            [[function.block]]
            label = "join"
            merge = true
            return = true
            "#,
        )
        .unwrap();
        let mut config = ExplorationConfig::default();
        config.search.searchers = vec![SearcherKind::Bfs];
        config.search.merge = true;
        let mut executor = Executor::new(Arc::new(module), config, Box::new(EnumSolver::new()), CfgWalker::new(16));
        let initial = executor.initial_state(0).unwrap();
        let collected = SegQueue::new();
        let summary = executor.run(initial, &collected, &reason_collector);
        assert_eq!(summary.paths(), 2);
        assert_eq!(summary.completed, 2);
        assert_eq!(collected.len(), 2)
    }

    #[test]
    fn test_default_searchers() {
        let (summary, _) = explore(ExplorationConfig::default());
        assert_eq!(summary.paths(), 3)
    }

    #[test]
    fn test_max_depth() {
        let mut config = ExplorationConfig::default();
        config.search.searchers = vec![SearcherKind::Dfs];
        config.limits.max_depth = Some(0);
        let (summary, reasons) = explore(config);
        // Both sides of the first branch are too deep
        assert_eq!(summary.paths(), 2);
        assert_eq!(summary.early, 2);
        assert!(reasons.iter().all(|(_, r)| *r == TerminationReason::MaxDepth))
    }

    #[test]
    fn test_max_forks() {
        let mut config = ExplorationConfig::default();
        config.search.searchers = vec![SearcherKind::Dfs];
        config.limits.max_forks = Some(0);
        let (summary, _) = explore(config);
        assert_eq!(summary.forks, 0);
        assert_eq!(summary.paths(), 1)
    }

    #[test]
    fn test_max_instructions_interrupts() {
        let mut config = ExplorationConfig::default();
        config.search.searchers = vec![SearcherKind::Bfs];
        config.limits.max_instructions = Some(2);
        let (summary, reasons) = explore(config);
        assert_eq!(summary.instructions, 2);
        assert!(reasons.iter().all(|(_, r)| *r == TerminationReason::MaxInstructions));
        assert_eq!(summary.early, reasons.len() as u64)
    }

    #[test]
    fn test_halt() {
        let mut executor = executor(ExplorationConfig::default());
        let initial = executor.initial_state(0).unwrap();
        executor.halt_handle().store(true, Ordering::Relaxed);
        let collected = SegQueue::new();
        let summary = executor.run(initial, &collected, &reason_collector);
        assert_eq!(summary.early, 1);
        assert_eq!(collected.pop().map(|(_, r)| r), Some(TerminationReason::Interrupted))
    }

    #[test]
    fn test_error_path_events() {
        let mut config = ExplorationConfig::default();
        config.search.searchers = vec![SearcherKind::Dfs];
        let mut executor = executor(config);
        let initial = executor.initial_state(0).unwrap();
        let errors = SegQueue::new();
        executor.run(initial, &errors, &|state: &ExecutionState, reason: &TerminationReason, _: &mut TimingSolver, errors: &SegQueue<Vec<String>>| {
            if reason.is_error() {
                errors.push(state.events.iter().map(|e| e.to_string()).collect())
            }
        });
        let events = errors.pop().unwrap();
        assert!(errors.pop().is_none());
        assert!(events.iter().any(|e| e == "Calling 'f()'"));
        assert!(events.last().unwrap().contains("NullPointerException"))
    }

    #[test]
    fn test_returning_releases_stack_objects() {
        let mut config = ExplorationConfig::default();
        config.search.searchers = vec![SearcherKind::Dfs];
        let mut executor = executor(config);
        let initial = executor.initial_state(0).unwrap();
        let allocas = SegQueue::new();
        executor.run(initial, &allocas, &|state: &ExecutionState, _: &TerminationReason, _: &mut TimingSolver, allocas: &SegQueue<usize>| {
            allocas.push(state.address_space.len())
        });
        // Only the input is left once the frame of main is popped
        let mut sizes = Vec::new();
        while let Some(n) = allocas.pop() {
            sizes.push(n)
        }
        assert_eq!(sizes.iter().filter(|n| **n == 1).count(), 2);
        assert_eq!(sizes.iter().filter(|n| **n == 2).count(), 1)
    }

    #[test]
    fn test_error_guidance_reaches_target() {
        use crate::locations::{Location, Locations};
        use crate::targeted_execution_manager::TargetedExecutionManager;

        let mut config = ExplorationConfig::default();
        config.search.guidance = Guidance::Error;
        let mut executor = executor(config);
        let paths = vec![Locations::new(
            vec![Location::new("main.c", 1), Location::new("main.c", 3), Location::new("main.c", 12)],
            ReachWithError::NullPointerException,
        )];
        let mut manager = TargetedExecutionManager::new();
        let module = executor.module().clone();
        let mut targets = manager.prepare_targets(&module, &paths);
        assert_eq!(targets.len(), 1);
        let (function, forest) = targets.remove(0);
        let initial = executor.initial_targeted_state(function, forest).unwrap();
        let collected = SegQueue::new();
        let summary = executor.run(initial, &collected, &reason_collector);
        assert_eq!(summary.errors, 1);
        let bad = manager.target_of(BlockRef::new(1, 1)).unwrap();
        assert!(summary.reached.contains_key(bad))
    }
}
