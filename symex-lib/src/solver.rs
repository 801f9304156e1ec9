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

//! The interface to constraint solving. A solver only ever has to
//! answer one question, whether a constraint set (optionally extended
//! by one extra query expression) has a model. Every other query is
//! derived from that. Failing to answer is not an error for the
//! path being explored: callers receive a `SolverError` and must
//! treat the query as inconclusive.

use std::cell::Cell;
use std::error::Error;
use std::fmt;
use std::time::{Duration, Instant};

use crate::expr::{ArrayRef, Assignment, ConstraintSet, Exp, ExprRef, PointerExp};

pub mod enumerate;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverError {
    Timeout,
    BudgetExhausted,
    /// Asked for a value under constraints that have no model.
    Infeasible,
    Unknown,
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SolverError::*;
        match self {
            Timeout => write!(f, "solver timed out"),
            BudgetExhausted => write!(f, "solver exhausted its search budget"),
            Infeasible => write!(f, "constraints are unsatisfiable"),
            Unknown => write!(f, "solver returned unknown"),
        }
    }
}

impl Error for SolverError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Validity {
    True,
    False,
    Unknown,
}

pub trait Solver {
    /// Find a model of `constraints`, additionally satisfying `query`
    /// if one is given. `Ok(None)` means no model exists.
    fn check(&mut self, constraints: &ConstraintSet, query: Option<&ExprRef>) -> Result<Option<Assignment>, SolverError>;

    fn set_timeout(&mut self, timeout: Option<Duration>);

    fn may_be_true(&mut self, constraints: &ConstraintSet, exp: &ExprRef) -> Result<bool, SolverError> {
        Ok(self.check(constraints, Some(exp))?.is_some())
    }

    fn must_be_true(&mut self, constraints: &ConstraintSet, exp: &ExprRef) -> Result<bool, SolverError> {
        Ok(self.check(constraints, Some(&Exp::not(exp.clone())))?.is_none())
    }

    fn may_be_false(&mut self, constraints: &ConstraintSet, exp: &ExprRef) -> Result<bool, SolverError> {
        Ok(!self.must_be_true(constraints, exp)?)
    }

    fn must_be_false(&mut self, constraints: &ConstraintSet, exp: &ExprRef) -> Result<bool, SolverError> {
        Ok(!self.may_be_true(constraints, exp)?)
    }

    fn evaluate(&mut self, constraints: &ConstraintSet, exp: &ExprRef) -> Result<Validity, SolverError> {
        if self.must_be_true(constraints, exp)? {
            Ok(Validity::True)
        } else if self.must_be_false(constraints, exp)? {
            Ok(Validity::False)
        } else {
            Ok(Validity::Unknown)
        }
    }

    fn get_value(&mut self, constraints: &ConstraintSet, exp: &ExprRef) -> Result<u64, SolverError> {
        match self.check(constraints, None)? {
            Some(model) => Ok(model.evaluate(exp)),
            None => Err(SolverError::Infeasible),
        }
    }

    fn get_pointer_value(&mut self, constraints: &ConstraintSet, pointer: &PointerExp) -> Result<(u64, u64), SolverError> {
        match self.check(constraints, None)? {
            Some(model) => Ok(model.evaluate_pointer(pointer)),
            None => Err(SolverError::Infeasible),
        }
    }

    /// Concrete contents for each of `arrays`, or `None` if the
    /// constraints are unsatisfiable.
    fn get_initial_values(
        &mut self,
        constraints: &ConstraintSet,
        arrays: &[ArrayRef],
    ) -> Result<Option<Vec<Vec<u8>>>, SolverError> {
        Ok(self.check(constraints, None)?.map(|model| arrays.iter().map(|array| model.bytes_of(array)).collect()))
    }

    /// The validity of `exp`, and when it is `True` or `False` a subset
    /// of the constraints that is already sufficient to decide it.
    fn get_validity_core(
        &mut self,
        constraints: &ConstraintSet,
        exp: &ExprRef,
    ) -> Result<(Validity, Vec<ExprRef>), SolverError> {
        let validity = self.evaluate(constraints, exp)?;
        let goal = match validity {
            Validity::True => exp.clone(),
            Validity::False => Exp::not(exp.clone()),
            Validity::Unknown => return Ok((validity, Vec::new())),
        };
        let mut core: Vec<ExprRef> = constraints.iter().cloned().collect();
        let mut i = 0;
        while i < core.len() {
            let candidate: ConstraintSet = {
                let mut cs = ConstraintSet::new();
                for (j, c) in core.iter().enumerate() {
                    if j != i {
                        cs.add(c.clone())
                    }
                }
                cs
            };
            if self.must_be_true(&candidate, &goal)? {
                core.remove(i);
            } else {
                i += 1
            }
        }
        Ok((validity, core))
    }
}

/// Per-state bookkeeping of solver usage. Fields are cells so the
/// bookkeeping can be updated through a shared reference to a state.
#[derive(Clone, Debug, Default)]
pub struct QueryMetaData {
    pub id: u32,
    query_cost: Cell<Duration>,
    queries: Cell<u64>,
}

impl QueryMetaData {
    pub fn new(id: u32) -> Self {
        QueryMetaData { id, ..Self::default() }
    }

    pub fn query_cost(&self) -> Duration {
        self.query_cost.get()
    }

    pub fn queries(&self) -> u64 {
        self.queries.get()
    }

    pub fn record(&self, elapsed: Duration) {
        self.query_cost.set(self.query_cost.get() + elapsed);
        self.queries.set(self.queries.get() + 1)
    }
}

/// Wraps a solver, charging the time spent on each query to the
/// querying state and enforcing a per-query timeout.
pub struct TimingSolver {
    solver: Box<dyn Solver>,
    timeout: Option<Duration>,
}

macro_rules! timed {
    ($self: ident, $meta: ident, $call: expr) => {{
        let start = Instant::now();
        $self.solver.set_timeout($self.timeout);
        let result = $call;
        $meta.record(start.elapsed());
        result
    }};
}

impl TimingSolver {
    pub fn new(solver: Box<dyn Solver>) -> Self {
        TimingSolver { solver, timeout: None }
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn must_be_true(&mut self, cs: &ConstraintSet, exp: &ExprRef, meta: &QueryMetaData) -> Result<bool, SolverError> {
        if let Some(value) = exp.as_constant() {
            return Ok(value != 0);
        }
        timed!(self, meta, self.solver.must_be_true(cs, exp))
    }

    pub fn may_be_true(&mut self, cs: &ConstraintSet, exp: &ExprRef, meta: &QueryMetaData) -> Result<bool, SolverError> {
        if let Some(value) = exp.as_constant() {
            return Ok(value != 0);
        }
        timed!(self, meta, self.solver.may_be_true(cs, exp))
    }

    pub fn must_be_false(&mut self, cs: &ConstraintSet, exp: &ExprRef, meta: &QueryMetaData) -> Result<bool, SolverError> {
        self.must_be_true(cs, &Exp::not(exp.clone()), meta)
    }

    pub fn may_be_false(&mut self, cs: &ConstraintSet, exp: &ExprRef, meta: &QueryMetaData) -> Result<bool, SolverError> {
        self.may_be_true(cs, &Exp::not(exp.clone()), meta)
    }

    pub fn evaluate(&mut self, cs: &ConstraintSet, exp: &ExprRef, meta: &QueryMetaData) -> Result<Validity, SolverError> {
        if let Some(value) = exp.as_constant() {
            return Ok(if value != 0 { Validity::True } else { Validity::False });
        }
        timed!(self, meta, self.solver.evaluate(cs, exp))
    }

    pub fn get_value(&mut self, cs: &ConstraintSet, exp: &ExprRef, meta: &QueryMetaData) -> Result<u64, SolverError> {
        if let Some(value) = exp.as_constant() {
            return Ok(value);
        }
        timed!(self, meta, self.solver.get_value(cs, exp))
    }

    pub fn get_pointer_value(
        &mut self,
        cs: &ConstraintSet,
        pointer: &PointerExp,
        meta: &QueryMetaData,
    ) -> Result<PointerExp, SolverError> {
        let width = pointer.width();
        if let (Some(base), Some(value)) = (pointer.constant_base(), pointer.constant_value()) {
            return Ok(PointerExp::constant(base, value, width));
        }
        let (base, value) = timed!(self, meta, self.solver.get_pointer_value(cs, pointer))?;
        Ok(PointerExp::constant(base, value, width))
    }

    pub fn get_initial_values(
        &mut self,
        cs: &ConstraintSet,
        arrays: &[ArrayRef],
        meta: &QueryMetaData,
    ) -> Result<Option<Vec<Vec<u8>>>, SolverError> {
        if arrays.is_empty() {
            return Ok(Some(Vec::new()));
        }
        timed!(self, meta, self.solver.get_initial_values(cs, arrays))
    }

    pub fn get_model(&mut self, cs: &ConstraintSet, meta: &QueryMetaData) -> Result<Option<Assignment>, SolverError> {
        timed!(self, meta, self.solver.check(cs, None))
    }

    pub fn get_validity_core(
        &mut self,
        cs: &ConstraintSet,
        exp: &ExprRef,
        meta: &QueryMetaData,
    ) -> Result<(Validity, Vec<ExprRef>), SolverError> {
        timed!(self, meta, self.solver.get_validity_core(cs, exp))
    }
}
