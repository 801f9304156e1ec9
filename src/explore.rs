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

use crossbeam::queue::SegQueue;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;

mod opts;
use opts::*;

use symex_lib::config::Guidance;
use symex_lib::error::ExecError;
use symex_lib::executor::{CfgWalker, Executor};
use symex_lib::ktest::{self, KTest};
use symex_lib::locations::Locations;
use symex_lib::{log, log_from};
use symex_lib::module::FunctionId;
use symex_lib::solver::enumerate::EnumSolver;
use symex_lib::solver::TimingSolver;
use symex_lib::state::{ExecutionState, StateId, TerminationReason};
use symex_lib::target_forest::TargetForest;
use symex_lib::targeted_execution_manager::TargetedExecutionManager;

/// A test case for one terminated path, with the error report if the
/// path ended in one.
struct GeneratedTest {
    state: StateId,
    reason: TerminationReason,
    ktest: KTest,
    stack: Option<String>,
    sarif: Option<String>,
}

fn main() {
    let code = explore_main();
    exit(code)
}

fn extension(reason: &TerminationReason) -> Option<String> {
    match reason {
        TerminationReason::Error(error) => Some(format!("{}.err", error.name())),
        TerminationReason::MemoryError(_) => Some("ptr.err".to_string()),
        reason if reason.is_early() => Some("early".to_string()),
        _ => None,
    }
}

fn write_test(dir: &Path, number: usize, test: &GeneratedTest) -> Result<(), ExecError> {
    let stem = format!("test{:06}", number);
    test.ktest.write_to_file(dir.join(format!("{}.ktest", stem)))?;
    if let Some(ext) = extension(&test.reason) {
        let mut report = format!("Path {}: {}\n", test.state, test.reason);
        if let Some(stack) = &test.stack {
            report.push_str(stack)
        }
        fs::write(dir.join(format!("{}.{}", stem, ext)), report)?
    }
    if let Some(sarif) = &test.sarif {
        fs::write(dir.join(format!("{}.sarif", stem)), sarif)?
    }
    Ok(())
}

fn explore_main() -> i32 {
    let mut opts = common_opts();
    opts.optopt("e", "entry", "start exploring from this function", "NAME");
    opts.optopt("t", "targets", "load paths to target locations", "FILE");
    opts.optopt("o", "output", "write test cases to this directory", "DIR");
    opts.optopt("", "input-size", "size of the symbolic input in bytes", "N");

    let matches = parse(&opts);
    let CommonOpts { module, mut config } = parse_with_module(&opts, &matches);

    let input_size = match matches.opt_get_default("input-size", 64) {
        Ok(size) => size,
        Err(f) => {
            eprintln!("Could not parse --input-size option: {}", f);
            print_usage(&opts, 1)
        }
    };

    let entry_name = matches.opt_str("entry").unwrap_or_else(|| "main".to_string());

    let runs: Vec<(FunctionId, Option<TargetForest>)> = if let Some(file) = matches.opt_str("targets") {
        let paths = match Locations::from_file(&file) {
            Ok(paths) => paths,
            Err(e) => {
                eprintln!("Error when loading targets {}: {}", file, e);
                return 1;
            }
        };
        let mut manager = TargetedExecutionManager::new();
        let prepared = manager.prepare_targets(&module, &paths);
        if prepared.is_empty() {
            eprintln!("None of the paths in {} could be resolved in the module", file);
            return 1;
        }
        if config.search.guidance == Guidance::None {
            config.search.guidance = Guidance::Error
        }
        prepared.into_iter().map(|(function, forest)| (function, Some(forest))).collect()
    } else {
        match module.function_id(&entry_name) {
            Some(function) => vec![(function, None)],
            None => {
                eprintln!("No function named {} in module", entry_name);
                return 1;
            }
        }
    };

    let output = matches.opt_str("output").map(PathBuf::from);
    if let Some(dir) = &output {
        if let Err(e) = fs::create_dir_all(dir) {
            eprintln!("Could not create output directory {}: {}", dir.display(), e);
            return 1;
        }
    }

    let context = config.memory.context();
    let mut number = 0;
    let mut failed = false;

    for (function, forest) in runs {
        let name = module.function(function).name.clone();
        log!(log::VERBOSE, format!("exploring from {}", name));

        let mut executor = Executor::new(module.clone(), config.clone(), Box::new(EnumSolver::new()), CfgWalker::new(input_size));
        let initial = match forest {
            Some(forest) => executor.initial_targeted_state(function, forest),
            None => executor.initial_state(function),
        };
        let initial = match initial {
            Ok(state) => state,
            Err(e) => {
                eprintln!("Could not create initial state for {}: {}", name, e);
                return 1;
            }
        };

        let tests: SegQueue<GeneratedTest> = SegQueue::new();
        let args = vec![name.to_string()];
        let collector = |state: &ExecutionState, reason: &TerminationReason, solver: &mut TimingSolver, tests: &SegQueue<GeneratedTest>| {
            match ktest::generate(state, solver, &context) {
                Ok(Some(mut ktest)) => {
                    ktest.args = args.clone();
                    let (stack, sarif) = if reason.is_error() {
                        (Some(state.dump_stack(&module)), state.events.to_sarif_result().ok())
                    } else {
                        (None, None)
                    };
                    tests.push(GeneratedTest { state: state.id, reason: reason.clone(), ktest, stack, sarif })
                }
                Ok(None) => log_from!(state.id, log::VERBOSE, "no model for path"),
                Err(e) => eprintln!("Could not generate a test for path {}: {}", state.id, e),
            }
        };

        let summary = executor.run(initial, &tests, &collector);
        println!("{}: {}", name, summary);

        let mut generated = Vec::new();
        while let Some(test) = tests.pop() {
            generated.push(test)
        }
        generated.sort_by_key(|test| test.state);

        if let Some(dir) = &output {
            for test in &generated {
                number += 1;
                if let Err(e) = write_test(dir, number, test) {
                    eprintln!("Could not write test {}: {}", number, e);
                    failed = true
                }
            }
        } else {
            number += generated.len()
        }
    }

    println!("generated {} tests", number);
    if failed {
        1
    } else {
        0
    }
}
