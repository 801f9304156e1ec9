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

//! Properties of the target machine that memory operations depend
//! on. A `Context` is created once per run and passed by reference.

use crate::expr::Width;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Context {
    pointer_width: Width,
    little_endian: bool,
}

impl Default for Context {
    fn default() -> Self {
        Context { pointer_width: 64, little_endian: true }
    }
}

impl Context {
    pub fn new(pointer_width: Width, little_endian: bool) -> Self {
        assert!(pointer_width % 8 == 0 && pointer_width > 0 && pointer_width <= 64, "unsupported pointer width");
        Context { pointer_width, little_endian }
    }

    pub fn pointer_width(&self) -> Width {
        self.pointer_width
    }

    pub fn pointer_bytes(&self) -> u64 {
        self.pointer_width as u64 / 8
    }

    pub fn is_little_endian(&self) -> bool {
        self.little_endian
    }

    /// Byte index, counted from the least significant byte, of the
    /// `i`th byte in memory of a `bytes`-wide value.
    pub fn byte_order(&self, i: u64, bytes: u64) -> u64 {
        if self.little_endian {
            i
        } else {
            bytes - 1 - i
        }
    }
}
