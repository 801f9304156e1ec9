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

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;

use symex_lib::config::{ResolveConfig, SearchConfig, SearcherKind};
use symex_lib::module::KModule;
use symex_lib::searcher::random_path::RandomPathSearcher;
use symex_lib::searcher::{construct_searcher, SearchContext, Searcher};
use symex_lib::state::{ExecutionState, StateId, StateIds, StatePool};

fn diamond() -> Arc<KModule> {
    Arc::new(KModule::parse(include_str!("../../configs/diamond.toml")).unwrap())
}

fn initial_pool(module: &KModule) -> (StatePool, StateId) {
    let state = ExecutionState::for_function(&StateIds::new(), Arc::new(ResolveConfig::default()), module.function(0));
    let id = state.id;
    (StatePool::new(state), id)
}

fn fork(pool: &mut StatePool, parent: StateId) -> StateId {
    let forked = pool.get_mut(parent).unwrap().branch();
    let id = forked.id;
    pool.add_forked(parent, forked);
    id
}

/// Drive `searcher` through a random sequence of forks and
/// terminations, checking every selection is a live state.
fn exercise(searcher: &mut dyn Searcher, pool: &mut StatePool, first: StateId, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    searcher.update(pool, None, &[first], &[]);
    for _ in 0..300 {
        if searcher.is_empty() {
            break;
        }
        let id = searcher.select_state(pool);
        assert!(pool.contains(id), "{} selected dead state {}", searcher.name(), id);
        match rng.gen_range(0, 3) {
            0 if pool.len() < 16 => {
                let forked = fork(pool, id);
                searcher.update(pool, Some(id), &[forked], &[])
            }
            1 if pool.len() > 1 => {
                searcher.update(pool, Some(id), &[], &[id]);
                pool.remove(id);
            }
            _ => searcher.update(pool, Some(id), &[], &[]),
        }
    }
    // Drain everything that is left
    while !searcher.is_empty() {
        let id = searcher.select_state(pool);
        assert!(pool.contains(id));
        searcher.update(pool, Some(id), &[], &[id]);
        pool.remove(id);
    }
}

#[test]
fn test_every_searcher_selects_live_states() {
    let names = [
        "dfs",
        "bfs",
        "random-state",
        "random-path",
        "nurs:depth",
        "nurs:rp",
        "nurs:icnt",
        "nurs:cpicnt",
        "nurs:qc",
        "nurs:md2u",
        "nurs:covnew",
    ];
    let module = diamond();
    for (i, name) in names.iter().enumerate() {
        let config = SearchConfig { searchers: vec![SearcherKind::parse(name).unwrap()], ..SearchConfig::default() };
        let ctx = SearchContext::new(module.clone());
        let (mut pool, first) = initial_pool(&module);
        let mut searcher = construct_searcher(&config, &ctx, &mut pool);
        exercise(searcher.as_mut(), &mut pool, first, i as u64);
        assert!(pool.is_empty(), "{} left states behind", name)
    }
}

#[test]
fn test_decorated_searchers_select_live_states() {
    let module = diamond();
    let configs = vec![
        SearchConfig::default(),
        SearchConfig { batch_instructions: 3, ..SearchConfig::default() },
        SearchConfig { batch_time: Some(Duration::from_millis(1)), ..SearchConfig::default() },
        SearchConfig { iterative_deepening: true, ..SearchConfig::default() },
        SearchConfig { merge: true, iterative_deepening: true, ..SearchConfig::default() },
        SearchConfig {
            searchers: vec![SearcherKind::Dfs, SearcherKind::Bfs, SearcherKind::RandomState],
            ..SearchConfig::default()
        },
    ];
    for (i, config) in configs.iter().enumerate() {
        let ctx = SearchContext::new(module.clone());
        let (mut pool, first) = initial_pool(&module);
        let mut searcher = construct_searcher(config, &ctx, &mut pool);
        exercise(searcher.as_mut(), &mut pool, first, 100 + i as u64);
        assert!(pool.is_empty())
    }
}

fn random_path_selections(seed: u64) -> Vec<StateId> {
    let module = diamond();
    let (mut pool, first) = initial_pool(&module);
    let mut searcher = RandomPathSearcher::new(pool.ptree_mut(), seed);
    searcher.update(&mut pool, None, &[first], &[]);
    let mut parent = first;
    for _ in 0..6 {
        let forked = fork(&mut pool, parent);
        searcher.update(&mut pool, Some(parent), &[forked], &[]);
        parent = forked
    }
    (0..32).map(|_| searcher.select_state(&pool)).collect()
}

#[test]
fn test_random_path_is_deterministic() {
    let a = random_path_selections(7);
    assert_eq!(a, random_path_selections(7));
    let distinct: std::collections::BTreeSet<_> = a.iter().collect();
    assert!(distinct.len() > 1, "{:?}", a)
}

#[test]
fn test_random_path_prefers_shallow_leaves() {
    let module = diamond();
    let (mut pool, first) = initial_pool(&module);
    let mut searcher = RandomPathSearcher::new(pool.ptree_mut(), 11);
    searcher.update(&mut pool, None, &[first], &[]);
    // first forks into first and a, then a forks into a and b
    let a = fork(&mut pool, first);
    searcher.update(&mut pool, Some(first), &[a], &[]);
    let b = fork(&mut pool, a);
    searcher.update(&mut pool, Some(a), &[b], &[]);

    let mut count = std::collections::BTreeMap::new();
    for _ in 0..4000 {
        *count.entry(searcher.select_state(&pool)).or_insert(0) += 1
    }
    // first is reached with probability 1/2, the others with 1/4
    assert!(count[&first] > 1700, "{:?}", count);
    assert!(count[&a] > 700 && count[&b] > 700, "{:?}", count)
}
