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
use std::sync::Arc;

use symex_lib::config::{ExplorationConfig, Guidance, SearcherKind};
use symex_lib::executor::{CfgWalker, Executor};
use symex_lib::ktest::{self, KTest};
use symex_lib::locations::Locations;
use symex_lib::module::{BlockRef, KModule};
use symex_lib::solver::enumerate::EnumSolver;
use symex_lib::solver::TimingSolver;
use symex_lib::state::{ExecutionState, TerminationReason};
use symex_lib::target::ReachWithError;
use symex_lib::targeted_execution_manager::TargetedExecutionManager;

fn diamond() -> Arc<KModule> {
    Arc::new(KModule::parse(include_str!("../../configs/diamond.toml")).unwrap())
}

fn explore_with_tests(config: ExplorationConfig) -> Vec<(TerminationReason, KTest)> {
    let module = diamond();
    let context = config.memory.context();
    let mut executor = Executor::new(module.clone(), config, Box::new(EnumSolver::new()), CfgWalker::new(4));
    let main = module.function_id("main").unwrap();
    let initial = executor.initial_state(main).unwrap();

    let tests = SegQueue::new();
    let collector = |state: &ExecutionState, reason: &TerminationReason, solver: &mut TimingSolver, tests: &SegQueue<(TerminationReason, KTest)>| {
        if let Some(ktest) = ktest::generate(state, solver, &context).unwrap() {
            tests.push((reason.clone(), ktest))
        }
    };
    executor.run(initial, &tests, &collector);

    let mut generated = Vec::new();
    while let Some(test) = tests.pop() {
        generated.push(test)
    }
    generated
}

#[test]
fn test_default_config_file_parses() {
    let config = ExplorationConfig::parse(include_str!("../../configs/default.toml")).unwrap();
    assert_eq!(config.memory.deterministic_base, 65536);
    assert_eq!(config.search.searchers.len(), 2);
    assert_eq!(config.search.searchers[0], SearcherKind::RandomPath);
    assert_eq!(config.search.guidance, Guidance::None)
}

#[test]
fn test_every_path_gets_a_test() {
    let generated = explore_with_tests(ExplorationConfig::default());
    assert_eq!(generated.len(), 3);

    for (reason, ktest) in &generated {
        assert_eq!(ktest.objects.len(), 1);
        let input = &ktest.objects[0];
        assert_eq!(input.name, "input");
        assert_eq!(input.content.bytes.len(), 4);
        match reason {
            // main goes left and f raises the error
            TerminationReason::Error(ReachWithError::NullPointerException) => {
                assert!(input.content.bytes[0] < 128);
                assert!(input.content.bytes[1] < 128)
            }
            TerminationReason::Exit => (),
            other => panic!("unexpected termination {}", other),
        }
    }

    let errors = generated.iter().filter(|(reason, _)| reason.is_error()).count();
    assert_eq!(errors, 1);

    // The two exits differ in the direction main took
    let mut first_bytes: Vec<u8> = generated.iter().map(|(_, ktest)| ktest.objects[0].content.bytes[0]).collect();
    first_bytes.sort();
    assert!(first_bytes[0] < 128);
    assert!(first_bytes[2] >= 128)
}

#[test]
fn test_tests_survive_serialization() {
    for (_, ktest) in explore_with_tests(ExplorationConfig::default()) {
        let bytes = ktest.to_bytes().unwrap();
        assert_eq!(KTest::from_bytes(&bytes).unwrap(), ktest)
    }
}

#[test]
fn test_targets_file_guides_to_error() {
    let module = diamond();
    let paths = Locations::parse_paths(include_str!("../../configs/diamond-targets.toml")).unwrap();
    let mut manager = TargetedExecutionManager::new();
    let mut targets = manager.prepare_targets(&module, &paths);
    assert_eq!(targets.len(), 1);
    let (function, forest) = targets.remove(0);
    assert_eq!(module.function(function).name, "main");

    let mut config = ExplorationConfig::default();
    config.search.guidance = Guidance::Error;
    let mut executor = Executor::new(module.clone(), config, Box::new(EnumSolver::new()), CfgWalker::new(4));
    let initial = executor.initial_targeted_state(function, forest).unwrap();
    assert!(initial.is_targeted());

    let collected = SegQueue::new();
    let summary = executor.run(initial, &collected, &symex_lib::executor::reason_collector);
    assert_eq!(summary.errors, 1);
    let f = module.function_id("f").unwrap();
    let bad = manager.target_of(BlockRef::new(f, 1)).unwrap();
    assert!(summary.reached.contains_key(bad))
}

#[test]
fn test_branching_deepens_both_states() {
    let module = diamond();
    let mut config = ExplorationConfig::default();
    config.limits.max_depth = Some(1);
    let mut executor = Executor::new(module.clone(), config, Box::new(EnumSolver::new()), CfgWalker::new(4));
    let main = module.function_id("main").unwrap();
    let initial = executor.initial_state(main).unwrap();
    let collected = SegQueue::new();
    let summary = executor.run(initial, &collected, &symex_lib::executor::reason_collector);
    // The branch in main is allowed, the one in f is not
    assert_eq!(summary.paths(), 3);
    assert_eq!(summary.errors, 0);
    let mut depth_limited = 0;
    while let Some((_, reason)) = collected.pop() {
        if reason == TerminationReason::MaxDepth {
            depth_limited += 1
        }
    }
    assert_eq!(depth_limited, 2)
}
