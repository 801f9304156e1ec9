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

//! A small bitvector expression language. Expressions are immutable
//! and shared through `Arc`, so constraint sets and object contents
//! can be copied between states without duplicating terms.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::adt::persistent::ImmutableList;
use crate::adt::sparse_storage::SparseStorage;

pub type Width = u32;

pub const BOOL: Width = 1;
pub const INT8: Width = 8;
pub const INT32: Width = 32;
pub const INT64: Width = 64;

pub fn mask(width: Width) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn sign_extend(value: u64, width: Width) -> i64 {
    if width >= 64 {
        value as i64
    } else {
        let shift = 64 - width;
        ((value << shift) as i64) >> shift
    }
}

/// Where the contents of a symbolic array come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKind {
    MakeSymbolic,
    LazyInitializationContent,
    LazyInitializationBase,
    Uninitialized,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Array {
    pub name: Arc<str>,
    pub size: u64,
    pub source: SourceKind,
}

pub type ArrayRef = Arc<Array>;

impl Array {
    pub fn new<S: Into<Arc<str>>>(name: S, size: u64, source: SourceKind) -> ArrayRef {
        Arc::new(Array { name: name.into(), size, source })
    }

    /// Arrays whose contents a test case can reproduce.
    pub fn is_reproducible(&self) -> bool {
        !matches!(self.source, SourceKind::Uninitialized)
    }

    pub fn is_make_symbolic(&self) -> bool {
        self.source == SourceKind::MakeSymbolic
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Binop {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Eq,
    Ult,
    Ule,
    Slt,
    Sle,
}

impl Binop {
    fn is_predicate(self) -> bool {
        matches!(self, Binop::Eq | Binop::Ult | Binop::Ule | Binop::Slt | Binop::Sle)
    }

    fn name(self) -> &'static str {
        match self {
            Binop::Add => "bvadd",
            Binop::Sub => "bvsub",
            Binop::Mul => "bvmul",
            Binop::And => "bvand",
            Binop::Or => "bvor",
            Binop::Xor => "bvxor",
            Binop::Eq => "=",
            Binop::Ult => "bvult",
            Binop::Ule => "bvule",
            Binop::Slt => "bvslt",
            Binop::Sle => "bvsle",
        }
    }

    fn apply(self, x: u64, y: u64, width: Width) -> u64 {
        let m = mask(width);
        match self {
            Binop::Add => x.wrapping_add(y) & m,
            Binop::Sub => x.wrapping_sub(y) & m,
            Binop::Mul => x.wrapping_mul(y) & m,
            Binop::And => x & y,
            Binop::Or => x | y,
            Binop::Xor => x ^ y,
            Binop::Eq => (x == y) as u64,
            Binop::Ult => (x < y) as u64,
            Binop::Ule => (x <= y) as u64,
            Binop::Slt => (sign_extend(x, width) < sign_extend(y, width)) as u64,
            Binop::Sle => (sign_extend(x, width) <= sign_extend(y, width)) as u64,
        }
    }
}

pub type ExprRef = Arc<Exp>;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Exp {
    Const { value: u64, width: Width },
    /// A little-endian read of `width / 8` bytes starting at `offset`.
    Read { array: ArrayRef, offset: u64, width: Width },
    Not(ExprRef),
    Bin(Binop, ExprRef, ExprRef),
    Select(ExprRef, ExprRef, ExprRef),
    ZExt(ExprRef, Width),
    Extract { exp: ExprRef, offset: Width, width: Width },
    Concat(ExprRef, ExprRef),
}

use Exp::*;

impl Exp {
    pub fn constant(value: u64, width: Width) -> ExprRef {
        Arc::new(Const { value: value & mask(width), width })
    }

    pub fn bool(b: bool) -> ExprRef {
        Exp::constant(b as u64, BOOL)
    }

    pub fn tt() -> ExprRef {
        Exp::bool(true)
    }

    pub fn ff() -> ExprRef {
        Exp::bool(false)
    }

    pub fn read(array: &ArrayRef, offset: u64, width: Width) -> ExprRef {
        Arc::new(Read { array: array.clone(), offset, width })
    }

    pub fn width(&self) -> Width {
        match self {
            Const { width, .. } | Read { width, .. } | ZExt(_, width) | Extract { width, .. } => *width,
            Not(e) => e.width(),
            Bin(op, lhs, _) => {
                if op.is_predicate() {
                    BOOL
                } else {
                    lhs.width()
                }
            }
            Select(_, t, _) => t.width(),
            Concat(hi, lo) => hi.width() + lo.width(),
        }
    }

    pub fn as_constant(&self) -> Option<u64> {
        match self {
            Const { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Const { .. })
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Const { value: 1, width: BOOL })
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Const { value: 0, width: BOOL })
    }

    pub fn binop(op: Binop, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        let width = lhs.width();
        if let (Some(x), Some(y)) = (lhs.as_constant(), rhs.as_constant()) {
            let result_width = if op.is_predicate() { BOOL } else { width };
            return Exp::constant(op.apply(x, y, width), result_width);
        }
        match op {
            Binop::And if width == BOOL => {
                if lhs.is_false() || rhs.is_false() {
                    return Exp::ff();
                } else if lhs.is_true() {
                    return rhs;
                } else if rhs.is_true() {
                    return lhs;
                }
            }
            Binop::Or if width == BOOL => {
                if lhs.is_true() || rhs.is_true() {
                    return Exp::tt();
                } else if lhs.is_false() {
                    return rhs;
                } else if rhs.is_false() {
                    return lhs;
                }
            }
            Binop::Add | Binop::Sub if rhs.as_constant() == Some(0) => return lhs,
            Binop::Eq if lhs == rhs => return Exp::tt(),
            _ => (),
        }
        Arc::new(Bin(op, lhs, rhs))
    }

    pub fn add(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Exp::binop(Binop::Add, lhs, rhs)
    }

    pub fn sub(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Exp::binop(Binop::Sub, lhs, rhs)
    }

    pub fn eq(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Exp::binop(Binop::Eq, lhs, rhs)
    }

    pub fn ult(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Exp::binop(Binop::Ult, lhs, rhs)
    }

    pub fn ule(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Exp::binop(Binop::Ule, lhs, rhs)
    }

    pub fn and(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Exp::binop(Binop::And, lhs, rhs)
    }

    pub fn or(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Exp::binop(Binop::Or, lhs, rhs)
    }

    pub fn not(exp: ExprRef) -> ExprRef {
        match &*exp {
            Const { value, width } => Exp::constant(!value, *width),
            Not(inner) => inner.clone(),
            _ => Arc::new(Not(exp)),
        }
    }

    pub fn select(cond: ExprRef, t: ExprRef, f: ExprRef) -> ExprRef {
        if cond.is_true() {
            t
        } else if cond.is_false() {
            f
        } else if t == f {
            t
        } else {
            Arc::new(Select(cond, t, f))
        }
    }

    pub fn zext(exp: ExprRef, width: Width) -> ExprRef {
        let from = exp.width();
        if from == width {
            exp
        } else if from > width {
            Exp::extract(exp, 0, width)
        } else if let Some(value) = exp.as_constant() {
            Exp::constant(value, width)
        } else {
            Arc::new(ZExt(exp, width))
        }
    }

    pub fn extract(exp: ExprRef, offset: Width, width: Width) -> ExprRef {
        if offset == 0 && width == exp.width() {
            return exp;
        }
        match &*exp {
            Const { value, .. } => Exp::constant(value >> offset, width),
            Read { array, offset: byte, .. } if offset % 8 == 0 && width % 8 == 0 => {
                Exp::read(array, byte + (offset / 8) as u64, width)
            }
            _ => Arc::new(Extract { exp, offset, width }),
        }
    }

    pub fn concat(hi: ExprRef, lo: ExprRef) -> ExprRef {
        match (&*hi, &*lo) {
            (Const { value: h, .. }, Const { value: l, width: lw }) => {
                Exp::constant((h << lw) | l, hi.width() + lw)
            }
            (Read { array: ha, offset: ho, width: hw }, Read { array: la, offset: lo_off, width: lw })
                if ha == la && *lw % 8 == 0 && *ho == lo_off + (*lw / 8) as u64 =>
            {
                Exp::read(la, *lo_off, hw + lw)
            }
            _ => Arc::new(Concat(hi, lo)),
        }
    }

    /// Evaluate under a byte oracle for array contents. Returns `None`
    /// if the oracle cannot supply a byte that is needed.
    pub fn eval<F>(&self, bytes: &F) -> Option<u64>
    where
        F: Fn(&Array, u64) -> Option<u8>,
    {
        match self {
            Const { value, .. } => Some(*value),
            Read { array, offset, width } => {
                let mut value = 0u64;
                for i in (0..(*width as u64 + 7) / 8).rev() {
                    value = (value << 8) | bytes(array, offset + i)? as u64
                }
                Some(value & mask(*width))
            }
            Not(e) => Some(!e.eval(bytes)? & mask(e.width())),
            Bin(op, lhs, rhs) => Some(op.apply(lhs.eval(bytes)?, rhs.eval(bytes)?, lhs.width())),
            Select(c, t, f) => {
                if c.eval(bytes)? != 0 {
                    t.eval(bytes)
                } else {
                    f.eval(bytes)
                }
            }
            ZExt(e, _) => e.eval(bytes),
            Extract { exp, offset, width } => Some((exp.eval(bytes)? >> offset) & mask(*width)),
            Concat(hi, lo) => Some((hi.eval(bytes)? << lo.width()) | lo.eval(bytes)?),
        }
    }

    /// Calls `f` on every read sub-expression.
    pub fn visit_reads<F: FnMut(&ArrayRef, u64, Width)>(&self, f: &mut F) {
        match self {
            Const { .. } => (),
            Read { array, offset, width } => f(array, *offset, *width),
            Not(e) | ZExt(e, _) | Extract { exp: e, .. } => e.visit_reads(f),
            Bin(_, lhs, rhs) | Concat(lhs, rhs) => {
                lhs.visit_reads(f);
                rhs.visit_reads(f)
            }
            Select(c, t, e) => {
                c.visit_reads(f);
                t.visit_reads(f);
                e.visit_reads(f)
            }
        }
    }

    /// Calls `f` on every constant sub-expression.
    pub fn visit_constants<F: FnMut(u64, Width)>(&self, f: &mut F) {
        match self {
            Const { value, width } => f(*value, *width),
            Read { .. } => (),
            Not(e) | ZExt(e, _) | Extract { exp: e, .. } => e.visit_constants(f),
            Bin(_, lhs, rhs) | Concat(lhs, rhs) => {
                lhs.visit_constants(f);
                rhs.visit_constants(f)
            }
            Select(c, t, e) => {
                c.visit_constants(f);
                t.visit_constants(f);
                e.visit_constants(f)
            }
        }
    }
}

impl fmt::Display for Exp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const { value, width: BOOL } => write!(f, "{}", *value != 0),
            Const { value, width } => write!(f, "(_ bv{} {})", value, width),
            Read { array, offset, width } => write!(f, "(read{} {} {})", width, array.name, offset),
            Not(e) => write!(f, "(bvnot {})", e),
            Bin(op, lhs, rhs) => write!(f, "({} {} {})", op.name(), lhs, rhs),
            Select(c, t, e) => write!(f, "(ite {} {} {})", c, t, e),
            ZExt(e, width) => write!(f, "((_ zero_extend {}) {})", width - e.width(), e),
            Extract { exp, offset, width } => write!(f, "((_ extract {} {}) {})", offset + width - 1, offset, exp),
            Concat(hi, lo) => write!(f, "(concat {} {})", hi, lo),
        }
    }
}

/// A pointer is a pair of a base, which identifies the object the
/// pointer was derived from (zero for null), and the address value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PointerExp {
    pub base: ExprRef,
    pub value: ExprRef,
}

impl PointerExp {
    pub fn new(base: ExprRef, value: ExprRef) -> Self {
        PointerExp { base, value }
    }

    pub fn constant(base: u64, value: u64, width: Width) -> Self {
        PointerExp { base: Exp::constant(base, width), value: Exp::constant(value, width) }
    }

    pub fn null(width: Width) -> Self {
        PointerExp::constant(0, 0, width)
    }

    pub fn width(&self) -> Width {
        self.value.width()
    }

    pub fn is_constant(&self) -> bool {
        self.base.is_constant() && self.value.is_constant()
    }

    pub fn constant_base(&self) -> Option<u64> {
        self.base.as_constant()
    }

    pub fn constant_value(&self) -> Option<u64> {
        self.value.as_constant()
    }

    /// Every base this pointer can possibly have, if those are
    /// syntactically evident: a constant, or a tree of selects between
    /// constants.
    pub fn aliased_bases(&self) -> Option<Vec<u64>> {
        fn collect(exp: &Exp, out: &mut Vec<u64>) -> bool {
            match exp {
                Const { value, .. } => {
                    if !out.contains(value) {
                        out.push(*value)
                    }
                    true
                }
                Select(_, t, f) => collect(t, out) && collect(f, out),
                _ => false,
            }
        }
        let mut bases = Vec::new();
        if collect(&self.base, &mut bases) {
            Some(bases)
        } else {
            None
        }
    }

    pub fn add_offset(&self, offset: u64) -> Self {
        PointerExp {
            base: self.base.clone(),
            value: Exp::add(self.value.clone(), Exp::constant(offset, self.width())),
        }
    }
}

impl fmt::Display for PointerExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(pointer {} {})", self.base, self.value)
    }
}

/// Concrete contents for a set of symbolic arrays.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Assignment {
    pub bindings: BTreeMap<Arc<str>, SparseStorage<u8>>,
}

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, array: &Array, bytes: &[u8]) {
        self.bindings.insert(array.name.clone(), SparseStorage::from_values(bytes, 0));
    }

    pub fn set_byte(&mut self, array: &Array, offset: u64, byte: u8) {
        self.bindings.entry(array.name.clone()).or_insert_with(|| SparseStorage::new(0)).store(offset, byte)
    }

    pub fn is_bound(&self, array: &Array) -> bool {
        self.bindings.contains_key(&array.name)
    }

    pub fn bytes_of(&self, array: &Array) -> Vec<u8> {
        match self.bindings.get(&array.name) {
            Some(storage) => (0..array.size).map(|i| storage.load(i)).collect(),
            None => vec![0; array.size as usize],
        }
    }

    /// Evaluate, treating unbound arrays as zero-filled.
    pub fn evaluate(&self, exp: &Exp) -> u64 {
        let oracle = |array: &Array, offset: u64| {
            Some(self.bindings.get(&array.name).map(|storage| storage.load(offset)).unwrap_or(0))
        };
        exp.eval(&oracle).unwrap_or(0)
    }

    /// Evaluate, failing if an unbound array is read.
    pub fn try_evaluate(&self, exp: &Exp) -> Option<u64> {
        let oracle = |array: &Array, offset: u64| self.bindings.get(&array.name).map(|storage| storage.load(offset));
        exp.eval(&oracle)
    }

    pub fn evaluate_pointer(&self, pointer: &PointerExp) -> (u64, u64) {
        (self.evaluate(&pointer.base), self.evaluate(&pointer.value))
    }

    pub fn satisfies(&self, constraints: &ConstraintSet) -> bool {
        constraints.iter().all(|c| self.evaluate(c) != 0)
    }
}

/// The path condition of a state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    constraints: ImmutableList<ExprRef>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a boolean constraint. Trivially true constraints are
    /// dropped.
    pub fn add(&mut self, constraint: ExprRef) {
        debug_assert_eq!(constraint.width(), BOOL);
        if !constraint.is_true() {
            self.constraints.push_back(constraint)
        }
    }

    pub fn with(&self, constraint: ExprRef) -> Self {
        let mut cs = self.clone();
        cs.add(constraint);
        cs
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExprRef> {
        self.constraints.iter()
    }
}
