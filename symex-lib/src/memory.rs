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

//! Memory objects and their contents.
//!
//! A `MemoryObject` is the identity of one allocation, shared between
//! every state that can see it. An `ObjectState` holds the bytes of
//! that allocation as seen by one address space. Object states are
//! shared between forked address spaces and carry the copy-on-write
//! key of the only address space allowed to update them in place.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::adt::sparse_storage::SparseStorage;
use crate::context::Context;
use crate::error::ExecError;
use crate::expr::{mask, Array, ArrayRef, Assignment, Exp, ExprRef, PointerExp, SourceKind, Width, INT8};
use crate::module::InstRef;

pub type ObjectId = u64;

/// Identifier of the copy-on-write owner of an object state. Zero
/// means the state has not been bound yet.
pub type CowKey = u32;

/// The type an object is allocated with, or an access is performed
/// at. `Untyped` is compatible with everything.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KType {
    Untyped,
    Integer(Width),
    Pointer,
    Named(Arc<str>),
}

impl KType {
    pub fn is_accessible_from(&self, access: &KType) -> bool {
        match (self, access) {
            (KType::Untyped, _) | (_, KType::Untyped) => true,
            // Byte-wise access is always permitted
            (_, KType::Integer(8)) => true,
            (t, a) => t == a,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObjectFlags {
    pub is_local: bool,
    pub is_global: bool,
    /// Memory supplied by the user, e.g. at a fixed address
    pub is_user_specified: bool,
    pub is_lazy_initialized: bool,
}

pub struct MemoryObject {
    pub id: ObjectId,
    pub address: u64,
    /// Concrete capacity of the allocation
    pub size: u64,
    /// The address as an expression of pointer width
    pub address_expr: ExprRef,
    /// The size as an expression, symbolic for symbolically sized
    /// allocations
    pub size_expr: ExprRef,
    pub alloc_site: Option<InstRef>,
    pub flags: ObjectFlags,
    /// Allocation order, used to stop symbolic pointers resolving to
    /// objects created after them
    pub timestamp: u32,
}

impl fmt::Debug for MemoryObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MO{}[{:#x}; {}]", self.id, self.address, self.size_expr)
    }
}

impl PartialEq for MemoryObject {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.address == other.address && self.size == other.size
    }
}

impl Eq for MemoryObject {}

impl MemoryObject {
    pub fn base_pointer(&self, ctx: &Context) -> PointerExp {
        PointerExp::new(Exp::constant(self.id, ctx.pointer_width()), self.address_expr.clone())
    }

    pub fn concrete_size(&self) -> Option<u64> {
        self.size_expr.as_constant()
    }

    pub fn concrete_address(&self) -> Option<u64> {
        self.address_expr.as_constant()
    }

    /// The offset of `pointer` from the start of this object.
    pub fn offset_expr(&self, pointer: &ExprRef) -> ExprRef {
        Exp::sub(pointer.clone(), self.address_expr.clone())
    }

    /// A boolean expression that holds when `pointer` lies within the
    /// bounds of this object. Zero sized objects are only in bounds at
    /// their exact address.
    pub fn bounds_check_pointer(&self, pointer: &PointerExp) -> ExprRef {
        let width = pointer.width();
        let same_base = Exp::eq(pointer.base.clone(), Exp::constant(self.id, width));
        let in_bounds = self.bounds_check_offset(&self.offset_expr(&pointer.value));
        Exp::and(same_base, in_bounds)
    }

    pub fn bounds_check_offset(&self, offset: &ExprRef) -> ExprRef {
        let width = offset.width();
        match self.size_expr.as_constant() {
            Some(0) => Exp::eq(offset.clone(), Exp::constant(0, width)),
            _ => Exp::ult(offset.clone(), resize(&self.size_expr, width)),
        }
    }

    /// Bounds check for an access of `bytes` bytes at `offset`.
    pub fn bounds_check_access(&self, offset: &ExprRef, bytes: u64) -> ExprRef {
        let width = offset.width();
        match self.size_expr.as_constant() {
            Some(size) if size < bytes => Exp::ff(),
            Some(size) => Exp::ule(offset.clone(), Exp::constant(size - bytes, width)),
            None => Exp::ule(
                Exp::add(offset.clone(), Exp::constant(bytes, width)),
                resize(&self.size_expr, width),
            ),
        }
    }
}

fn resize(exp: &ExprRef, width: Width) -> ExprRef {
    let w = exp.width();
    if w == width {
        exp.clone()
    } else if w < width {
        Exp::zext(exp.clone(), width)
    } else {
        Exp::extract(exp.clone(), 0, width)
    }
}

/// Hands out object ids, timestamps and concrete addresses. Addresses
/// are deterministic: they depend only on the order of allocations.
pub struct MemoryManager {
    next_id: ObjectId,
    next_timestamp: u32,
    next_address: u64,
    alignment: u64,
    pointer_width: Width,
    /// Every allocation made for an id, indexed by capacity
    allocated: BTreeMap<ObjectId, BTreeMap<u64, Arc<MemoryObject>>>,
}

impl MemoryManager {
    pub fn new(ctx: &Context, base: u64, alignment: u64) -> Self {
        MemoryManager {
            next_id: 1,
            next_timestamp: 1,
            next_address: base,
            alignment: alignment.max(1),
            pointer_width: ctx.pointer_width(),
            allocated: BTreeMap::new(),
        }
    }

    fn reserve(&mut self, size: u64) -> u64 {
        let address = self.next_address;
        let padded = (size.max(1) + self.alignment - 1) / self.alignment * self.alignment;
        // Leave a gap after each object so one past the end never aliases the next.
        self.next_address = address + padded + self.alignment;
        address
    }

    fn fresh_id(&mut self) -> ObjectId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn fresh_timestamp(&mut self) -> u32 {
        let timestamp = self.next_timestamp;
        self.next_timestamp += 1;
        timestamp
    }

    fn record(&mut self, mo: Arc<MemoryObject>) -> Arc<MemoryObject> {
        self.allocated.entry(mo.id).or_default().insert(mo.size, mo.clone());
        mo
    }

    pub fn allocate(&mut self, size: u64, flags: ObjectFlags, alloc_site: Option<InstRef>) -> Arc<MemoryObject> {
        let address = self.reserve(size);
        let id = self.fresh_id();
        let timestamp = self.fresh_timestamp();
        let mo = MemoryObject {
            id,
            address,
            size,
            address_expr: Exp::constant(address, self.pointer_width),
            size_expr: Exp::constant(size, self.pointer_width),
            alloc_site,
            flags,
            timestamp,
        };
        self.record(Arc::new(mo))
    }

    /// Allocate an object whose size is given by an expression, with
    /// `capacity` bytes of concrete backing.
    pub fn allocate_symbolic_size(
        &mut self,
        size_expr: ExprRef,
        capacity: u64,
        flags: ObjectFlags,
        alloc_site: Option<InstRef>,
    ) -> Arc<MemoryObject> {
        let address = self.reserve(capacity);
        let id = self.fresh_id();
        let timestamp = self.fresh_timestamp();
        let mo = MemoryObject {
            id,
            address,
            size: capacity,
            address_expr: Exp::constant(address, self.pointer_width),
            size_expr,
            alloc_site,
            flags,
            timestamp,
        };
        self.record(Arc::new(mo))
    }

    /// A larger backing allocation for an existing object, keeping its
    /// id and timestamp.
    pub fn reallocate(&mut self, mo: &MemoryObject, capacity: u64) -> Arc<MemoryObject> {
        let address = self.reserve(capacity);
        let realloc = MemoryObject {
            id: mo.id,
            address,
            size: capacity,
            address_expr: Exp::constant(address, self.pointer_width),
            size_expr: mo.size_expr.clone(),
            alloc_site: mo.alloc_site,
            flags: mo.flags,
            timestamp: mo.timestamp,
        };
        self.record(Arc::new(realloc))
    }

    pub fn allocated_objects(&self, id: ObjectId) -> Option<&BTreeMap<u64, Arc<MemoryObject>>> {
        self.allocated.get(&id)
    }

    /// The timestamp the next allocation will receive.
    pub fn current_timestamp(&self) -> u32 {
        self.next_timestamp
    }
}

/// Finds concrete backing for objects whose size is only known once a
/// model is chosen. Arrays standing for symbolic sizes are bound to
/// object ids, and a request for a size larger than every existing
/// backing of that object grows it to a power of two.
#[derive(Default)]
pub struct AddressManager {
    bindings: BTreeMap<Arc<str>, ObjectId>,
}

impl AddressManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_allocation(&mut self, array: &Array, id: ObjectId) {
        self.bindings.insert(array.name.clone(), id);
    }

    /// The address of a backing allocation with at least `size` bytes.
    pub fn allocate(&self, memory: &mut MemoryManager, array: &Array, size: u64) -> Result<u64, ExecError> {
        let id = *self.bindings.get(&array.name).ok_or_else(|| ExecError::InvalidModel(array.name.to_string()))?;
        let objects = memory.allocated_objects(id).ok_or(ExecError::UnboundObject(id))?;
        if let Some((_, mo)) = objects.range(size..).next() {
            return Ok(mo.address);
        }
        let largest = match objects.values().next_back() {
            Some(mo) => mo.clone(),
            None => return Err(ExecError::UnboundObject(id)),
        };
        let capacity = size.max(1).checked_next_power_of_two().unwrap_or(size);
        Ok(memory.reallocate(&largest, capacity).address)
    }

    pub fn allocate_memory_object(&self, memory: &MemoryManager, array: &Array, size: u64) -> Option<Arc<MemoryObject>> {
        let id = self.bindings.get(&array.name)?;
        memory.allocated_objects(*id)?.range(size..).next().map(|(_, mo)| mo.clone())
    }
}

pub type ObjectStateRef = Arc<ObjectState>;

/// The contents of an object. Each byte has a value plane and a base
/// plane; the base plane holds the object id of pointers stored in
/// the object. Unwritten bytes read from the source arrays, or as zero
/// if there are none.
#[derive(Clone, Debug)]
pub struct ObjectState {
    object: Arc<MemoryObject>,
    pub(crate) cow_owner: CowKey,
    read_only: bool,
    was_written: bool,
    dynamic_type: KType,
    source: Option<ArrayRef>,
    base_source: Option<ArrayRef>,
    values: SparseStorage<Option<ExprRef>>,
    bases: SparseStorage<Option<ExprRef>>,
}

impl ObjectState {
    /// Zero initialised contents.
    pub fn new(object: Arc<MemoryObject>, dynamic_type: KType) -> Self {
        ObjectState {
            object,
            cow_owner: 0,
            read_only: false,
            was_written: false,
            dynamic_type,
            source: None,
            base_source: None,
            values: SparseStorage::new(None),
            bases: SparseStorage::new(None),
        }
    }

    /// Contents given by a symbolic array, with pointer bases given by
    /// `base_source` if present.
    pub fn new_symbolic(
        object: Arc<MemoryObject>,
        dynamic_type: KType,
        source: ArrayRef,
        base_source: Option<ArrayRef>,
    ) -> Self {
        ObjectState { source: Some(source), base_source, ..ObjectState::new(object, dynamic_type) }
    }

    /// Contents initialised from concrete bytes.
    pub fn from_bytes(object: Arc<MemoryObject>, dynamic_type: KType, bytes: &[u8]) -> Self {
        let mut os = ObjectState::new(object, dynamic_type);
        for (i, b) in bytes.iter().enumerate() {
            if *b != 0 {
                os.values.store(i as u64, Some(Exp::constant(*b as u64, INT8)))
            }
        }
        os
    }

    pub fn object(&self) -> &Arc<MemoryObject> {
        &self.object
    }

    pub fn size(&self) -> u64 {
        self.object.size
    }

    pub fn cow_owner(&self) -> CowKey {
        self.cow_owner
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only
    }

    pub fn was_written(&self) -> bool {
        self.was_written
    }

    pub fn dynamic_type(&self) -> &KType {
        &self.dynamic_type
    }

    pub fn source(&self) -> Option<&ArrayRef> {
        self.source.as_ref()
    }

    pub fn is_accessible_from(&self, access: &KType) -> bool {
        self.dynamic_type.is_accessible_from(access)
    }

    fn check(&self, offset: u64, bytes: u64) -> Result<(), ExecError> {
        match offset.checked_add(bytes) {
            Some(end) if end <= self.object.size => Ok(()),
            _ => Err(ExecError::OutOfBounds { object: self.object.id, offset }),
        }
    }

    fn initial_byte(&self, offset: u64) -> ExprRef {
        match &self.source {
            Some(array) => Exp::read(array, offset, INT8),
            None => Exp::constant(0, INT8),
        }
    }

    fn initial_base_byte(&self, offset: u64) -> ExprRef {
        match &self.base_source {
            Some(array) => Exp::read(array, offset, INT8),
            None => Exp::constant(0, INT8),
        }
    }

    pub fn read8(&self, offset: u64) -> Result<ExprRef, ExecError> {
        self.check(offset, 1)?;
        Ok(self.values.load(offset).unwrap_or_else(|| self.initial_byte(offset)))
    }

    fn combine<F>(ctx: &Context, offset: u64, width: Width, byte: F) -> ExprRef
    where
        F: Fn(u64) -> ExprRef,
    {
        let bytes = (width as u64 + 7) / 8;
        // Build from the most significant byte down.
        let mut result: Option<ExprRef> = None;
        for significance in (0..bytes).rev() {
            let b = byte(offset + ctx.byte_order(significance, bytes));
            result = Some(match result {
                None => b,
                Some(hi) => Exp::concat(hi, b),
            })
        }
        let result = result.unwrap_or_else(|| Exp::constant(0, INT8));
        if result.width() > width {
            Exp::extract(result, 0, width)
        } else {
            result
        }
    }

    pub fn read(&self, ctx: &Context, offset: u64, width: Width) -> Result<ExprRef, ExecError> {
        let bytes = (width as u64 + 7) / 8;
        self.check(offset, bytes)?;
        Ok(Self::combine(ctx, offset, width, |i| {
            self.values.load(i).unwrap_or_else(|| self.initial_byte(i))
        }))
    }

    /// Read a value ignoring every write made to the object.
    pub fn read_initial(&self, ctx: &Context, offset: u64, width: Width) -> Result<ExprRef, ExecError> {
        self.check(offset, (width as u64 + 7) / 8)?;
        Ok(Self::combine(ctx, offset, width, |i| self.initial_byte(i)))
    }

    pub fn read_pointer(&self, ctx: &Context, offset: u64) -> Result<PointerExp, ExecError> {
        let width = ctx.pointer_width();
        let value = self.read(ctx, offset, width)?;
        let base = Self::combine(ctx, offset, width, |i| self.bases.load(i).unwrap_or_else(|| self.initial_base_byte(i)));
        Ok(PointerExp::new(base, value))
    }

    pub fn read_initial_pointer(&self, ctx: &Context, offset: u64) -> Result<PointerExp, ExecError> {
        let width = ctx.pointer_width();
        let value = self.read_initial(ctx, offset, width)?;
        let base = Self::combine(ctx, offset, width, |i| self.initial_base_byte(i));
        Ok(PointerExp::new(base, value))
    }

    fn store_byte(&mut self, offset: u64, byte: ExprRef) {
        let initial = self.initial_byte(offset);
        self.values.store(offset, if byte == initial { None } else { Some(byte) });
        self.was_written = true
    }

    pub fn write8(&mut self, offset: u64, byte: ExprRef) -> Result<(), ExecError> {
        if self.read_only {
            return Err(ExecError::ReadOnly(self.object.id));
        }
        self.check(offset, 1)?;
        self.store_byte(offset, byte);
        Ok(())
    }

    pub fn write(&mut self, ctx: &Context, offset: u64, value: &ExprRef) -> Result<(), ExecError> {
        if self.read_only {
            return Err(ExecError::ReadOnly(self.object.id));
        }
        let width = value.width();
        let bytes = (width as u64 + 7) / 8;
        self.check(offset, bytes)?;
        let padded = if width % 8 == 0 { value.clone() } else { Exp::zext(value.clone(), bytes as Width * 8) };
        for significance in 0..bytes {
            let byte = Exp::extract(padded.clone(), significance as Width * 8, INT8);
            self.store_byte(offset + ctx.byte_order(significance, bytes), byte)
        }
        Ok(())
    }

    pub fn write_pointer(&mut self, ctx: &Context, offset: u64, pointer: &PointerExp) -> Result<(), ExecError> {
        self.write(ctx, offset, &pointer.value)?;
        let bytes = ctx.pointer_bytes();
        for significance in 0..bytes {
            let byte = Exp::extract(pointer.base.clone(), significance as Width * 8, INT8);
            let index = offset + ctx.byte_order(significance, bytes);
            let initial = self.initial_base_byte(index);
            self.bases.store(index, if byte == initial { None } else { Some(byte) })
        }
        Ok(())
    }

    /// Evaluate every byte of the object under `model`.
    pub fn concrete_bytes(&self, model: &Assignment) -> Vec<u8> {
        (0..self.object.size)
            .map(|i| {
                let byte = self.values.load(i).unwrap_or_else(|| self.initial_byte(i));
                (model.evaluate(&byte) & mask(INT8)) as u8
            })
            .collect()
    }

    /// Bytes of the object if none of them depend on symbolic data.
    pub fn as_concrete(&self) -> Option<Vec<u8>> {
        (0..self.object.size)
            .map(|i| self.values.load(i).unwrap_or_else(|| self.initial_byte(i)).as_constant().map(|b| b as u8))
            .collect()
    }

    /// Arrays the unwritten contents are read from.
    pub fn source_arrays(&self) -> Vec<ArrayRef> {
        self.source.iter().chain(self.base_source.iter()).cloned().collect()
    }
}

/// The two arrays used to lazily initialise an object: its contents
/// and the bases of pointers stored in it.
pub fn lazy_initialization_arrays(name: &str, size: u64) -> (ArrayRef, ArrayRef) {
    (
        Array::new(name.to_string(), size, SourceKind::LazyInitializationContent),
        Array::new(format!("{}_base", name), size, SourceKind::LazyInitializationBase),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{INT32, INT64};

    fn manager() -> MemoryManager {
        MemoryManager::new(&Context::default(), 0x1000, 16)
    }

    #[test]
    fn test_allocation_is_deterministic() {
        let mut m1 = manager();
        let mut m2 = manager();
        for size in &[4, 100, 0, 8] {
            let a = m1.allocate(*size, ObjectFlags::default(), None);
            let b = m2.allocate(*size, ObjectFlags::default(), None);
            assert_eq!(a.address, b.address);
            assert_eq!(a.id, b.id)
        }
        let mo = m1.allocate(4, ObjectFlags::default(), None);
        assert_eq!(mo.address % 16, 0);
        assert!(mo.timestamp > 1)
    }

    #[test]
    fn test_read_write() {
        let ctx = Context::default();
        let mo = manager().allocate(8, ObjectFlags::default(), None);
        let mut os = ObjectState::new(mo, KType::Untyped);
        assert!(!os.was_written());
        os.write(&ctx, 0, &Exp::constant(0x11223344, INT32)).unwrap();
        assert!(os.was_written());
        assert_eq!(os.read8(0).unwrap().as_constant(), Some(0x44));
        assert_eq!(os.read(&ctx, 0, INT32).unwrap().as_constant(), Some(0x11223344));
        assert_eq!(os.read(&ctx, 0, INT64).unwrap().as_constant(), Some(0x11223344));
        assert_eq!(os.read_initial(&ctx, 0, INT32).unwrap().as_constant(), Some(0));
        assert!(matches!(os.read(&ctx, 6, INT32), Err(ExecError::OutOfBounds { offset: 6, .. })));
        os.set_read_only(true);
        assert!(matches!(os.write8(0, Exp::constant(1, INT8)), Err(ExecError::ReadOnly(_))))
    }

    #[test]
    fn test_big_endian() {
        let ctx = Context::new(32, false);
        let mo = MemoryManager::new(&ctx, 0x1000, 16).allocate(4, ObjectFlags::default(), None);
        let mut os = ObjectState::new(mo, KType::Untyped);
        os.write(&ctx, 0, &Exp::constant(0x11223344, INT32)).unwrap();
        assert_eq!(os.read8(0).unwrap().as_constant(), Some(0x11));
        assert_eq!(os.read(&ctx, 0, INT32).unwrap().as_constant(), Some(0x11223344))
    }

    #[test]
    fn test_symbolic_contents() {
        let ctx = Context::default();
        let mo = manager().allocate(4, ObjectFlags::default(), None);
        let (contents, bases) = lazy_initialization_arrays("lazy", 4);
        let mut os = ObjectState::new_symbolic(mo, KType::Untyped, contents.clone(), Some(bases));
        let read = os.read(&ctx, 0, INT32).unwrap();
        assert_eq!(*read, Exp::Read { array: contents.clone(), offset: 0, width: INT32 });
        os.write8(1, Exp::constant(7, INT8)).unwrap();
        let mut model = Assignment::new();
        model.bind(&contents, &[1, 2, 3, 4]);
        assert_eq!(os.concrete_bytes(&model), vec![1, 7, 3, 4]);
        assert_eq!(os.as_concrete(), None)
    }

    #[test]
    fn test_pointer_round_trip() {
        let ctx = Context::new(32, true);
        let mut memory = MemoryManager::new(&ctx, 0x1000, 16);
        let target = memory.allocate(16, ObjectFlags::default(), None);
        let holder = memory.allocate(8, ObjectFlags::default(), None);
        let mut os = ObjectState::new(holder, KType::Untyped);
        let pointer = target.base_pointer(&ctx).add_offset(4);
        os.write_pointer(&ctx, 4, &pointer).unwrap();
        let read = os.read_pointer(&ctx, 4).unwrap();
        assert_eq!(read.constant_base(), Some(target.id));
        assert_eq!(read.constant_value(), Some(target.address + 4));
        assert_eq!(os.read_initial_pointer(&ctx, 4).unwrap().constant_base(), Some(0))
    }

    #[test]
    fn test_address_manager_grows() {
        let ctx = Context::default();
        let mut memory = manager();
        let size = Array::new("size", 8, SourceKind::MakeSymbolic);
        let mo = memory.allocate_symbolic_size(Exp::read(&size, 0, INT64), 8, ObjectFlags::default(), None);
        let mut am = AddressManager::new();
        let addr_array = Array::new("addr", 8, SourceKind::MakeSymbolic);
        am.add_allocation(&addr_array, mo.id);
        assert_eq!(am.allocate(&mut memory, &addr_array, 5).unwrap(), mo.address);
        let grown = am.allocate(&mut memory, &addr_array, 20).unwrap();
        assert_ne!(grown, mo.address);
        let grown_mo = am.allocate_memory_object(&memory, &addr_array, 20).unwrap();
        assert_eq!(grown_mo.size, 32);
        assert_eq!(grown_mo.id, mo.id);
        assert_eq!(ctx.pointer_width(), 64)
    }

    #[test]
    fn test_type_access() {
        assert!(KType::Untyped.is_accessible_from(&KType::Pointer));
        assert!(KType::Integer(32).is_accessible_from(&KType::Integer(8)));
        assert!(!KType::Integer(32).is_accessible_from(&KType::Pointer))
    }
}
