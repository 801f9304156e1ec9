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

use std::error::Error;
use std::fmt;
use std::io;

use crate::solver::SolverError;
use crate::state::TerminationReason;

#[derive(Debug)]
pub enum ExecError {
    Config(String),
    Module(String),
    /// An access at `offset` that lies outside the object with the
    /// given id.
    OutOfBounds {
        object: u64,
        offset: u64,
    },
    ReadOnly(u64),
    UnboundObject(u64),
    /// The operation needs a concrete object size.
    SymbolicSize(u64),
    InvalidModel(String),
    Serialization(String),
    Io(io::Error),
    Solver(SolverError),
    /// Raised to unwind an interpreter step once the state has been
    /// terminated.
    Terminated(TerminationReason),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ExecError::*;
        match self {
            Config(msg) => write!(f, "configuration error: {}", msg),
            Module(msg) => write!(f, "malformed module: {}", msg),
            OutOfBounds { object, offset } => write!(f, "out of bounds access to object {} at offset {}", object, offset),
            ReadOnly(id) => write!(f, "write to read-only object {}", id),
            UnboundObject(id) => write!(f, "object {} is not bound in this address space", id),
            SymbolicSize(id) => write!(f, "object {} has a symbolic size", id),
            InvalidModel(msg) => write!(f, "invalid model: {}", msg),
            Serialization(msg) => write!(f, "serialization failed: {}", msg),
            Io(e) => write!(f, "{}", e),
            Solver(e) => write!(f, "{}", e),
            Terminated(reason) => write!(f, "state terminated: {:?}", reason),
        }
    }
}

impl Error for ExecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExecError::Io(e) => Some(e),
            ExecError::Solver(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ExecError {
    fn from(e: io::Error) -> Self {
        ExecError::Io(e)
    }
}

impl From<SolverError> for ExecError {
    fn from(e: SolverError) -> Self {
        ExecError::Solver(e)
    }
}

impl From<bincode::Error> for ExecError {
    fn from(e: bincode::Error) -> Self {
        ExecError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for ExecError {
    fn from(e: serde_json::Error) -> Self {
        ExecError::Serialization(e.to_string())
    }
}
