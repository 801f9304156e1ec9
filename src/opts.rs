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

use getopts::{Matches, Options};
use std::process::exit;
use std::sync::Arc;

use symex_lib::config::ExplorationConfig;
use symex_lib::log;
use symex_lib::module::KModule;

fn tool_name() -> Option<String> {
    match std::env::current_exe() {
        Ok(path) => Some(path.components().last()?.as_os_str().to_str()?.to_string()),
        Err(_) => None,
    }
}

pub fn print_usage(opts: &Options, code: i32) -> ! {
    let tool = match tool_name() {
        Some(name) => name,
        None => "[tool]".to_string(),
    };
    let brief = format!("Usage: {} [options]", tool);
    eprint!("{}", opts.usage(&brief));
    exit(code)
}

pub fn common_opts() -> Options {
    let mut opts = Options::new();
    opts.optopt("m", "module", "load this module description", "FILE");
    opts.optopt("c", "config", "load exploration config", "FILE");
    opts.optflag("h", "help", "print this help message");
    opts.optflagmulti("v", "verbose", "print verbose output");
    opts.optopt("", "log", "enable these log channels (memory, fork, search, target, solver, events or all)", "LIST");
    opts
}

pub struct CommonOpts {
    pub module: Arc<KModule>,
    pub config: ExplorationConfig,
}

pub fn parse(opts: &Options) -> Matches {
    let args: Vec<String> = std::env::args().collect();

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{}", f);
            print_usage(opts, 1)
        }
    };

    if matches.opt_present("help") {
        print_usage(opts, 0)
    }

    log::set_verbosity(matches.opt_count("verbose"));
    if let Some(channels) = matches.opt_str("log") {
        match log::parse_channels(&channels) {
            Ok(flags) => log::add_flags(flags),
            Err(e) => {
                eprintln!("{}", e);
                print_usage(opts, 1)
            }
        }
    }

    matches
}

pub fn parse_with_module(opts: &Options, matches: &Matches) -> CommonOpts {
    let module = match matches.opt_str("module") {
        Some(file) => match KModule::from_file(&file) {
            Ok(module) => module,
            Err(e) => {
                eprintln!("Error when loading module {}: {}", file, e);
                exit(1)
            }
        },
        None => {
            eprintln!("No module given");
            print_usage(opts, 1)
        }
    };

    let config = if let Some(file) = matches.opt_str("config") {
        match ExplorationConfig::from_file(file) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                exit(1)
            }
        }
    } else {
        ExplorationConfig::default()
    };

    CommonOpts { module: Arc::new(module), config }
}
