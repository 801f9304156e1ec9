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

//! Code flow events recorded along a path, reported as SARIF code
//! flows when a path hits an error.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::adt::persistent::ImmutableList;
use crate::error::ExecError;
use crate::memory::ObjectFlags;
use crate::module::InstRef;

/// Position along a path: the number of blocks entered and the
/// instruction within the current block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathIndex {
    pub block: u32,
    pub instruction: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeLocation {
    pub path_index: PathIndex,
    pub source: Option<InstRef>,
    pub file: String,
    pub line: u64,
    pub column: Option<u64>,
}

impl CodeLocation {
    pub fn new<S: Into<String>>(path_index: PathIndex, source: Option<InstRef>, file: S, line: u64) -> Arc<Self> {
        Arc::new(CodeLocation { path_index, source, file: file.into(), line, column: None })
    }

    fn serialize(&self) -> PhysicalLocationJson {
        PhysicalLocationJson {
            artifact_location: ArtifactLocationJson { uri: self.file.clone() },
            region: RegionJson { start_line: self.line, start_column: self.column },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocKind {
    Global,
    Local,
    Heap,
}

impl AllocKind {
    pub fn of(flags: &ObjectFlags) -> Self {
        if flags.is_global {
            AllocKind::Global
        } else if flags.is_local {
            AllocKind::Local
        } else {
            AllocKind::Heap
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Alloc(AllocKind),
    Br { chosen: bool },
    Call { function: String },
    Err { rule_id: String, message: String },
    Ret { caller: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeEvent {
    pub kind: EventKind,
    pub location: Arc<CodeLocation>,
}

impl CodeEvent {
    pub fn new(kind: EventKind, location: Arc<CodeLocation>) -> Arc<Self> {
        Arc::new(CodeEvent { kind, location })
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, EventKind::Err { .. })
    }

    pub fn description(&self) -> String {
        self.to_string()
    }

    fn serialize(&self) -> LocationJson {
        LocationJson {
            message: MessageJson { text: self.description() },
            physical_location: self.location.serialize(),
        }
    }
}

impl fmt::Display for CodeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EventKind::Alloc(AllocKind::Global) => write!(f, "Global memory allocation"),
            EventKind::Alloc(AllocKind::Local) => write!(f, "Local memory allocation"),
            EventKind::Alloc(AllocKind::Heap) => write!(f, "Heap memory allocation"),
            EventKind::Br { chosen } => write!(f, "Choosing {} branch", chosen),
            EventKind::Call { function } => write!(f, "Calling '{}()'", function),
            EventKind::Err { message, .. } => write!(f, "{}", message),
            EventKind::Ret { caller } => write!(f, "Returning to '{}()'", caller),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactLocationJson {
    uri: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegionJson {
    start_line: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_column: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PhysicalLocationJson {
    artifact_location: ArtifactLocationJson,
    region: RegionJson,
}

#[derive(Serialize)]
struct MessageJson {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LocationJson {
    message: MessageJson,
    physical_location: PhysicalLocationJson,
}

#[derive(Serialize)]
struct ThreadFlowLocationJson {
    location: LocationJson,
}

#[derive(Serialize)]
struct ThreadFlowJson {
    locations: Vec<ThreadFlowLocationJson>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFlowJson {
    thread_flows: Vec<ThreadFlowJson>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultJson {
    rule_id: String,
    message: MessageJson,
    code_flows: Vec<CodeFlowJson>,
}

/// The events of one path. Forked states share the events recorded
/// before the fork.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventRecorder {
    events: ImmutableList<Arc<CodeEvent>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: Arc<CodeEvent>) {
        self.events.push_back(event)
    }

    pub fn append(&mut self, other: &EventRecorder) {
        self.events.append(&other.events)
    }

    /// Events at or after `begin`.
    pub fn tail(&self, begin: PathIndex) -> EventRecorder {
        self.in_range(begin, PathIndex { block: u32::MAX, instruction: u32::MAX })
    }

    pub fn in_range(&self, begin: PathIndex, end: PathIndex) -> EventRecorder {
        let events = self
            .events
            .iter()
            .filter(|e| begin <= e.location.path_index && e.location.path_index < end)
            .cloned()
            .collect();
        EventRecorder { events }
    }

    pub fn last(&self) -> Option<&Arc<CodeEvent>> {
        self.events.last()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CodeEvent>> {
        self.events.iter()
    }

    pub fn serialize(&self) -> CodeFlowJson {
        let locations = self.events.iter().map(|e| ThreadFlowLocationJson { location: e.serialize() }).collect();
        CodeFlowJson { thread_flows: vec![ThreadFlowJson { locations }] }
    }

    /// A SARIF result for a path ending in an error event.
    pub fn to_sarif_result(&self) -> Result<String, ExecError> {
        let (rule_id, message) = match self.last().map(|e| &e.kind) {
            Some(EventKind::Err { rule_id, message }) => (rule_id.clone(), message.clone()),
            _ => return Err(ExecError::Serialization("path does not end in an error".to_string())),
        };
        let result = ResultJson { rule_id, message: MessageJson { text: message }, code_flows: vec![self.serialize()] };
        Ok(serde_json::to_string_pretty(&result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(block: u32, line: u64) -> Arc<CodeLocation> {
        CodeLocation::new(PathIndex { block, instruction: 0 }, None, "main.c", line)
    }

    #[test]
    fn test_recorder_sharing() {
        let mut a = EventRecorder::new();
        a.record(CodeEvent::new(EventKind::Alloc(AllocKind::Local), at(0, 1)));
        let mut b = a.clone();
        b.record(CodeEvent::new(EventKind::Br { chosen: true }, at(1, 2)));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 2);
        assert_eq!(b.tail(PathIndex { block: 1, instruction: 0 }).len(), 1);
        a.append(&b.tail(PathIndex { block: 1, instruction: 0 }));
        assert_eq!(a, b)
    }

    #[test]
    fn test_sarif() {
        let mut events = EventRecorder::new();
        events.record(CodeEvent::new(EventKind::Call { function: "f".to_string() }, at(0, 3)));
        assert!(events.to_sarif_result().is_err());
        events.record(CodeEvent::new(
            EventKind::Err { rule_id: "NullPointerException".to_string(), message: "null dereference".to_string() },
            at(1, 12),
        ));
        let json: serde_json::Value = serde_json::from_str(&events.to_sarif_result().unwrap()).unwrap();
        assert_eq!(json["ruleId"], "NullPointerException");
        let locations = &json["codeFlows"][0]["threadFlows"][0]["locations"];
        assert_eq!(locations[0]["location"]["message"]["text"], "Calling 'f()'");
        assert_eq!(locations[1]["location"]["physicalLocation"]["region"]["startLine"], 12)
    }
}
