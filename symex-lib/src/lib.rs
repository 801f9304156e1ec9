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

//! Core of a symbolic execution engine: copy-on-write memory and
//! address spaces, execution states, and the searchers that decide
//! which state runs next, including searchers guided towards targets.

pub mod adt;
pub mod address_space;
pub mod allocation_record;
pub mod code_graph;
pub mod config;
pub mod constant_address_space;
pub mod context;
pub mod error;
pub mod events;
pub mod executor;
pub mod expr;
pub mod ktest;
pub mod locations;
pub mod log;
pub mod memory;
pub mod module;
pub mod ptree;
pub mod searcher;
pub mod solver;
pub mod state;
pub mod stats;
pub mod target;
pub mod target_forest;
pub mod targeted_execution_manager;
