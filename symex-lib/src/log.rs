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

//! Logging for the exploration, split into channels that can be
//! enabled independently. Messages go to stderr, tagged with the
//! channel or with the id of the state they concern.

use std::sync::atomic::{AtomicU32, Ordering::*};

pub static FLAGS: AtomicU32 = AtomicU32::new(0);

pub const VERBOSE: u32 = 1u32;
pub const MEMORY: u32 = 2u32;
pub const FORK: u32 = 4u32;
pub const SEARCH: u32 = 8u32;
pub const TARGET: u32 = 16u32;
pub const SOLVER: u32 = 32u32;
pub const EVENTS: u32 = 64u32;

const CHANNELS: [(&str, u32); 7] = [
    ("verbose", VERBOSE),
    ("memory", MEMORY),
    ("fork", FORK),
    ("search", SEARCH),
    ("target", TARGET),
    ("solver", SOLVER),
    ("events", EVENTS),
];

const PALETTE: [&str; 7] = ["\x1b[91m", "\x1b[92m", "\x1b[93m", "\x1b[94m", "\x1b[95m", "\x1b[96m", "\x1b[97m"];

/// A terminal color for each execution state. Ids past the end of the
/// palette wrap around with an underline.
pub fn color(id: u32) -> String {
    let i = id as usize % (2 * PALETTE.len());
    if i < PALETTE.len() {
        PALETTE[i].to_string()
    } else {
        format!("{}\x1b[4m", PALETTE[i - PALETTE.len()])
    }
}

/// The name of the lowest channel in `flags`.
pub fn channel_name(flags: u32) -> &'static str {
    CHANNELS.iter().find(|(_, flag)| flags & flag > 0).map_or("log", |(name, _)| name)
}

/// Parse a comma separated list of channel names, e.g. `fork,search`.
pub fn parse_channels(names: &str) -> Result<u32, String> {
    let mut flags = 0;
    for name in names.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        match CHANNELS.iter().find(|(channel, _)| *channel == name) {
            Some((_, flag)) => flags |= flag,
            None if name == "all" => flags |= CHANNELS.iter().fold(0, |acc, (_, flag)| acc | flag),
            None => return Err(format!("Unknown log channel {}", name)),
        }
    }
    Ok(flags)
}

pub fn set_flags(flags: u32) {
    FLAGS.store(flags, SeqCst);
}

pub fn add_flags(flags: u32) {
    FLAGS.fetch_or(flags, SeqCst);
}

/// Map a command line verbosity count onto a set of flags. Each
/// additional level turns on more detailed channels.
pub fn verbosity_flags(level: usize) -> u32 {
    match level {
        0 => 0,
        1 => VERBOSE,
        2 => VERBOSE | FORK | TARGET,
        3 => VERBOSE | FORK | TARGET | SEARCH | EVENTS,
        _ => VERBOSE | FORK | TARGET | SEARCH | EVENTS | MEMORY | SOLVER,
    }
}

pub fn set_verbosity(level: usize) {
    set_flags(verbosity_flags(level))
}

#[macro_export]
macro_rules! log {
    ($flags: expr, $msg: expr) => {
        if log::FLAGS.load(std::sync::atomic::Ordering::Relaxed) & $flags > 0u32 {
            eprintln!("[{}]: {}", log::channel_name($flags), $msg)
        }
    };
}

#[macro_export]
macro_rules! log_from {
    ($id: expr, $flags: expr, $msg: expr) => {
        if log::FLAGS.load(std::sync::atomic::Ordering::Relaxed) & $flags > 0u32 {
            eprintln!("[{}{:<3}\x1b[0m {}]: {}", log::color($id), $id, log::channel_name($flags), $msg)
        }
    };
}

#[macro_export]
macro_rules! if_logging {
    ($flags: expr, $body:block) => {
        if log::FLAGS.load(std::sync::atomic::Ordering::Relaxed) & $flags > 0u32 $body
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels() {
        assert_eq!(parse_channels("fork, search"), Ok(FORK | SEARCH));
        assert_eq!(parse_channels(""), Ok(0));
        assert_eq!(parse_channels("all"), Ok(verbosity_flags(4)));
        assert!(parse_channels("fork,cache").is_err());
        assert_eq!(channel_name(SEARCH | TARGET), "search");
        assert_eq!(channel_name(0), "log")
    }

    #[test]
    fn test_colors_wrap() {
        assert_eq!(color(1), color(15));
        assert_ne!(color(1), color(8));
        assert!(color(8).ends_with("\x1b[4m"))
    }
}
