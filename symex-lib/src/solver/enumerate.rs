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

//! A model-enumerating solver. Every distinct array read in a query
//! is treated as an atom, and candidate values for each atom are
//! drawn either from a domain declared for its array or from values
//! adjacent to the constants appearing in the query. The solver is
//! exact whenever all atoms have declared domains, and is otherwise
//! complete for comparisons of atoms against constant offsets.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{Solver, SolverError};
use crate::expr::{mask, ArrayRef, Assignment, ConstraintSet, ExprRef, Width};

type Atom = (ArrayRef, u64, Width);

pub struct EnumSolver {
    domains: BTreeMap<Arc<str>, Vec<u64>>,
    budget: u64,
    timeout: Option<Duration>,
}

impl Default for EnumSolver {
    fn default() -> Self {
        EnumSolver { domains: BTreeMap::new(), budget: 100_000, timeout: None }
    }
}

impl EnumSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the number of candidate models tried per query.
    pub fn with_budget(mut self, budget: u64) -> Self {
        self.budget = budget;
        self
    }

    /// Every read of `array` takes one of `values`.
    pub fn with_domain<S: Into<Arc<str>>>(mut self, array: S, values: Vec<u64>) -> Self {
        self.domains.insert(array.into(), values);
        self
    }

    fn candidates(&self, atom: &Atom, constants: &BTreeSet<u64>) -> Vec<u64> {
        let (array, _, width) = atom;
        let m = mask(*width);
        if let Some(domain) = self.domains.get(&array.name) {
            return domain.iter().map(|v| v & m).collect::<BTreeSet<_>>().into_iter().collect();
        }
        let mut values = BTreeSet::new();
        values.insert(0);
        values.insert(1);
        values.insert(m);
        for c in constants {
            values.insert(c & m);
            values.insert(c.wrapping_add(1) & m);
            values.insert(c.wrapping_sub(1) & m);
        }
        values.into_iter().collect()
    }
}

impl Solver for EnumSolver {
    fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout
    }

    fn check(&mut self, constraints: &ConstraintSet, query: Option<&ExprRef>) -> Result<Option<Assignment>, SolverError> {
        let start = Instant::now();
        let formulas: Vec<&ExprRef> = constraints.iter().chain(query).collect();
        if formulas.iter().any(|f| f.is_false()) {
            return Ok(None);
        }

        let mut atoms: BTreeSet<Atom> = BTreeSet::new();
        let mut constants: BTreeSet<u64> = BTreeSet::new();
        for f in &formulas {
            f.visit_reads(&mut |array, offset, width| {
                atoms.insert((array.clone(), offset, width));
            });
            f.visit_constants(&mut |value, _| {
                constants.insert(value);
            })
        }
        let atoms: Vec<Atom> = atoms.into_iter().collect();
        let candidates: Vec<Vec<u64>> = atoms.iter().map(|atom| self.candidates(atom, &constants)).collect();
        if candidates.iter().any(|c| c.is_empty()) {
            return Ok(None);
        }

        let mut choice = vec![0usize; atoms.len()];
        let mut tried = 0u64;
        loop {
            tried += 1;
            if tried > self.budget {
                return Err(SolverError::BudgetExhausted);
            }
            if let Some(timeout) = self.timeout {
                if tried % 256 == 0 && start.elapsed() > timeout {
                    return Err(SolverError::Timeout);
                }
            }

            let mut model = Assignment::new();
            for (i, (array, offset, width)) in atoms.iter().enumerate() {
                let value = candidates[i][choice[i]];
                for b in 0..((*width as u64 + 7) / 8) {
                    model.set_byte(array, offset + b, (value >> (8 * b)) as u8)
                }
            }
            if formulas.iter().all(|f| model.evaluate(f) != 0) {
                return Ok(Some(model));
            }

            // Advance the odometer over all candidate combinations.
            let mut i = 0;
            loop {
                if i == atoms.len() {
                    return Ok(None);
                }
                choice[i] += 1;
                if choice[i] < candidates[i].len() {
                    break;
                }
                choice[i] = 0;
                i += 1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Array, Exp, SourceKind, INT32, INT8};
    use crate::solver::Validity;

    #[test]
    fn test_may_and_must() {
        let x = Array::new("x", 4, SourceKind::MakeSymbolic);
        let rx = Exp::read(&x, 0, INT32);
        let mut cs = ConstraintSet::new();
        cs.add(Exp::ult(rx.clone(), Exp::constant(10, INT32)));
        let mut solver = EnumSolver::new();
        assert!(solver.may_be_true(&cs, &Exp::eq(rx.clone(), Exp::constant(9, INT32))).unwrap());
        assert!(!solver.may_be_true(&cs, &Exp::eq(rx.clone(), Exp::constant(10, INT32))).unwrap());
        assert!(solver.must_be_true(&cs, &Exp::ule(rx.clone(), Exp::constant(9, INT32))).unwrap());
        assert_eq!(solver.evaluate(&cs, &Exp::ult(rx.clone(), Exp::constant(5, INT32))).unwrap(), Validity::Unknown);
        let v = solver.get_value(&cs, &rx).unwrap();
        assert!(v < 10)
    }

    #[test]
    fn test_declared_domain_is_exact() {
        let x = Array::new("d", 1, SourceKind::MakeSymbolic);
        let rx = Exp::read(&x, 0, INT8);
        let mut solver = EnumSolver::new().with_domain("d", vec![2, 4]);
        let cs = ConstraintSet::new();
        assert!(solver.must_be_true(&cs, &Exp::ule(Exp::constant(2, INT8), rx.clone())).unwrap());
        assert!(!solver.may_be_true(&cs, &Exp::eq(rx, Exp::constant(3, INT8))).unwrap())
    }

    #[test]
    fn test_budget() {
        let x = Array::new("b", 8, SourceKind::MakeSymbolic);
        let mut cs = ConstraintSet::new();
        for i in 0..8 {
            cs.add(Exp::eq(Exp::read(&x, i, INT8), Exp::constant(0x55 + i, INT8)))
        }
        let mut solver = EnumSolver::new().with_budget(10);
        assert_eq!(solver.check(&cs, None), Err(SolverError::BudgetExhausted))
    }

    #[test]
    fn test_validity_core() {
        let x = Array::new("core", 2, SourceKind::MakeSymbolic);
        let a = Exp::read(&x, 0, INT8);
        let b = Exp::read(&x, 1, INT8);
        let mut cs = ConstraintSet::new();
        let relevant = Exp::ult(a.clone(), Exp::constant(3, INT8));
        cs.add(Exp::ult(b, Exp::constant(100, INT8)));
        cs.add(relevant.clone());
        let mut solver = EnumSolver::new();
        let (validity, core) = solver.get_validity_core(&cs, &Exp::ult(a, Exp::constant(4, INT8))).unwrap();
        assert_eq!(validity, Validity::True);
        assert_eq!(core, vec![relevant])
    }
}
