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

use std::sync::Arc;

use symex_lib::locations::Locations;
use symex_lib::module::{BlockRef, KModule};
use symex_lib::target::{ReachWithError, Target};
use symex_lib::target_forest::TargetForest;
use symex_lib::targeted_execution_manager::TargetedExecutionManager;

fn prepared() -> (KModule, TargetedExecutionManager, TargetForest) {
    let module = KModule::parse(include_str!("../../configs/diamond.toml")).unwrap();
    let paths = Locations::parse_paths(include_str!("../../configs/diamond-targets.toml")).unwrap();
    let mut manager = TargetedExecutionManager::new();
    let (_, forest) = manager.prepare_targets(&module, &paths).remove(0);
    (module, manager, forest)
}

#[test]
fn test_copies_share_until_stepped() {
    let (module, manager, forest) = prepared();
    let main = module.function_id("main").unwrap();
    let f = module.function_id("f").unwrap();
    let left = manager.target_of(BlockRef::new(main, 1)).unwrap().clone();
    let bad = manager.target_of(BlockRef::new(f, 1)).unwrap().clone();

    let mut copy = forest.clone();
    assert!(Arc::ptr_eq(forest.layer(), copy.layer()));

    copy.step_to(&left);
    assert!(!Arc::ptr_eq(forest.layer(), copy.layer()));
    assert!(forest.contains(&left));
    assert!(!forest.contains(&bad));
    assert!(copy.contains(&bad));
    assert!(!copy.contains(&left));
    assert_eq!(copy.history().len(), 1);
    assert!(forest.history().is_empty());

    // Reaching the error ends the forest
    copy.step_to(&bad);
    assert!(copy.is_empty());
    assert_eq!(copy.history().len(), 2);
    assert!(forest.contains(&left))
}

#[test]
fn test_stepping_to_unknown_target_is_ignored() {
    let (module, _, forest) = prepared();
    let main = module.function_id("main").unwrap();
    let right = Target::new(&module, BlockRef::new(main, 2), ReachWithError::None);
    let mut copy = forest.clone();
    copy.step_to(&right);
    assert!(Arc::ptr_eq(forest.layer(), copy.layer()));
    assert!(copy.history().is_empty())
}

#[test]
fn test_add_and_remove_leave_original_alone() {
    let (module, _, forest) = prepared();
    let main = module.function_id("main").unwrap();
    let exit = Target::new(&module, BlockRef::new(main, 3), ReachWithError::None);
    assert!(exit.at_return());

    let mut copy = forest.clone();
    copy.add(exit.clone());
    assert!(copy.contains(&exit));
    assert!(!forest.contains(&exit));
    assert_eq!(copy.len(), forest.len() + 1);

    copy.remove(&exit);
    assert_eq!(copy.len(), forest.len())
}
