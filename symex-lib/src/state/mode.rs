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

//! Bookkeeping that only exists for one kind of state. Normal states
//! run the program; recovery states are spawned by a normal state to
//! recompute a value it skipped, and report back to it.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use super::{ExecutionState, StateId};
use crate::allocation_record::AllocationRecord;
use crate::expr::ExprRef;
use crate::module::{FunctionId, InstRef};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WrittenAddressInfo {
    pub max_size: u64,
    pub snapshot_index: u32,
}

/// A normal state as it was when it called `function`.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub state: Arc<ExecutionState>,
    pub function: FunctionId,
}

/// A load whose value must be recomputed by a recovery state.
#[derive(Clone, Debug)]
pub struct RecoveryInfo {
    pub load_inst: InstRef,
    pub load_base: u64,
    pub load_address: u64,
    pub load_size: u64,
    pub function: FunctionId,
    pub slice_id: u32,
    pub snapshot: Arc<Snapshot>,
    pub snapshot_index: u32,
}

pub type ValuesCache = BTreeMap<u64, ExprRef>;

#[derive(Clone, Debug)]
pub struct NormalState {
    pub suspended: bool,
    pub snapshots: Vec<Arc<Snapshot>>,
    pub recovery_state: Option<StateId>,
    /// False while a load is waiting for a recovery state
    pub blocking_load_recovered: bool,
    pub recovered_loads: BTreeSet<u64>,
    pub allocation_record: AllocationRecord,
    pub guiding_constraints: BTreeSet<ExprRef>,
    written_addresses: BTreeMap<u64, WrittenAddressInfo>,
    pending_recovery_infos: VecDeque<Arc<RecoveryInfo>>,
    /// Recovered values by (snapshot index, slice id) and address
    recovery_cache: BTreeMap<(u32, u32), ValuesCache>,
}

impl Default for NormalState {
    fn default() -> Self {
        NormalState {
            suspended: false,
            snapshots: Vec::new(),
            recovery_state: None,
            blocking_load_recovered: true,
            recovered_loads: BTreeSet::new(),
            allocation_record: AllocationRecord::new(),
            guiding_constraints: BTreeSet::new(),
            written_addresses: BTreeMap::new(),
            pending_recovery_infos: VecDeque::new(),
            recovery_cache: BTreeMap::new(),
        }
    }
}

impl NormalState {
    pub fn add_snapshot(&mut self, snapshot: Arc<Snapshot>) {
        self.snapshots.push(snapshot)
    }

    pub fn current_snapshot_index(&self) -> Option<u32> {
        self.snapshots.len().checked_sub(1).map(|i| i as u32)
    }

    pub fn is_in_dependent_mode(&self) -> bool {
        !self.snapshots.is_empty()
    }

    pub fn is_address_recovered(&self, address: u64) -> bool {
        self.recovered_loads.contains(&address)
    }

    pub fn add_written_address(&mut self, address: u64, size: u64, snapshot_index: u32) {
        let info = self.written_addresses.entry(address).or_default();
        if size > info.max_size {
            info.max_size = size
        }
        info.snapshot_index = snapshot_index
    }

    /// The write recorded at `address`, and whether it overwrote at
    /// least `load_size` bytes.
    pub fn written_address_info(&self, address: u64, load_size: u64) -> Option<(WrittenAddressInfo, bool)> {
        let info = self.written_addresses.get(&address)?;
        Some((*info, info.max_size >= load_size))
    }

    /// The first snapshot a load of `address` has to be recovered from.
    pub fn starting_index(&self, address: u64, size: u64) -> u32 {
        match self.written_address_info(address, size) {
            Some((info, true)) => info.snapshot_index + 1,
            _ => 0,
        }
    }

    pub fn add_pending_recovery_info(&mut self, info: Arc<RecoveryInfo>) {
        self.pending_recovery_infos.push_back(info)
    }

    pub fn has_pending_recovery_info(&self) -> bool {
        !self.pending_recovery_infos.is_empty()
    }

    pub fn next_pending_recovery_info(&mut self) -> Option<Arc<RecoveryInfo>> {
        self.pending_recovery_infos.pop_front()
    }

    pub fn update_recovered_value(&mut self, index: u32, slice_id: u32, address: u64, value: ExprRef) {
        self.recovery_cache.entry((index, slice_id)).or_default().insert(address, value);
    }

    pub fn recovered_value(&self, index: u32, slice_id: u32, address: u64) -> Option<&ExprRef> {
        self.recovery_cache.get(&(index, slice_id))?.get(&address)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    High,
}

#[derive(Clone, Debug)]
pub struct RecoveryState {
    pub exit_inst: Option<InstRef>,
    pub dependent_state: Option<StateId>,
    pub originating_state: Option<StateId>,
    pub recovery_info: Option<Arc<RecoveryInfo>>,
    pub guiding_allocation_record: AllocationRecord,
    pub recursion_level: u32,
    pub priority: Priority,
}

impl Default for RecoveryState {
    fn default() -> Self {
        RecoveryState {
            exit_inst: None,
            dependent_state: None,
            originating_state: None,
            recovery_info: None,
            guiding_allocation_record: AllocationRecord::new(),
            recursion_level: 0,
            priority: Priority::Low,
        }
    }
}

#[derive(Clone, Debug)]
pub enum StateKind {
    Normal(Box<NormalState>),
    Recovery(Box<RecoveryState>),
}

impl Default for StateKind {
    fn default() -> Self {
        StateKind::Normal(Box::default())
    }
}

impl StateKind {
    pub fn recovery() -> Self {
        StateKind::Recovery(Box::default())
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, StateKind::Normal(_))
    }

    pub fn is_recovery(&self) -> bool {
        matches!(self, StateKind::Recovery(_))
    }

    pub fn normal(&self) -> Option<&NormalState> {
        match self {
            StateKind::Normal(normal) => Some(normal.as_ref()),
            StateKind::Recovery(_) => None,
        }
    }

    pub fn normal_mut(&mut self) -> Option<&mut NormalState> {
        match self {
            StateKind::Normal(normal) => Some(normal.as_mut()),
            StateKind::Recovery(_) => None,
        }
    }

    pub fn recovery_data(&self) -> Option<&RecoveryState> {
        match self {
            StateKind::Recovery(recovery) => Some(recovery.as_ref()),
            StateKind::Normal(_) => None,
        }
    }

    pub fn recovery_data_mut(&mut self) -> Option<&mut RecoveryState> {
        match self {
            StateKind::Recovery(recovery) => Some(recovery.as_mut()),
            StateKind::Normal(_) => None,
        }
    }

    /// Only normal states can be suspended.
    pub fn is_suspended(&self) -> bool {
        self.normal().map_or(false, |normal| normal.suspended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_addresses() {
        let mut normal = NormalState::default();
        assert_eq!(normal.starting_index(0x10, 4), 0);
        normal.add_written_address(0x10, 8, 0);
        normal.add_written_address(0x10, 2, 3);
        let (info, complete) = normal.written_address_info(0x10, 8).unwrap();
        assert_eq!(info, WrittenAddressInfo { max_size: 8, snapshot_index: 3 });
        assert!(complete);
        assert_eq!(normal.starting_index(0x10, 4), 4);
        assert_eq!(normal.starting_index(0x10, 16), 0)
    }

    #[test]
    fn test_kind_access() {
        let mut kind = StateKind::default();
        assert!(kind.is_normal());
        assert!(kind.recovery_data().is_none());
        kind.normal_mut().unwrap().suspended = true;
        assert!(kind.is_suspended());
        let recovery = StateKind::recovery();
        assert!(recovery.normal().is_none());
        assert_eq!(recovery.recovery_data().unwrap().priority, Priority::Low);
        assert!(!recovery.is_suspended())
    }
}
