use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::canonicalize::remove_redundant_nodes;
use crate::config::ExtractConfig;
use crate::egraph::{EGraph, EGraphBuilder};
use crate::extract::{
  AstDepthExtractor, BottomUpExtractor, Extractor, GreedyDagExtractor,
  ParallelGreedyDagExtractor, greedy_dag::improves,
};
use crate::id::ClassId;

const SEEDS: u64 = 64;

/// A random e-graph with integer costs. The first node of every class only
/// uses lower classes, so every class can be realized. With `cyclic`, the
/// other nodes may point anywhere.
fn random_builder(seed: u64, cyclic: bool) -> EGraphBuilder {
  let mut rng = StdRng::seed_from_u64(seed);
  let num_classes: u32 = rng.gen_range(2..24);
  let mut b = EGraphBuilder::new();

  for class in 0..num_classes {
    let num_nodes = rng.gen_range(1..4);
    for i in 0..num_nodes {
      let arity = if class == 0 { 0 } else { rng.gen_range(0..4) };
      let children: Vec<u32> = (0..arity)
        .map(|_| {
          if cyclic && i > 0 {
            rng.gen_range(0..num_classes)
          } else {
            rng.gen_range(0..class)
          }
        })
        .collect();
      let cost = f64::from(rng.gen_range(0..10_u32));
      let op = if children.is_empty() { "x" } else { "f" };
      b.push(class, op, &children, cost).unwrap();
    }
  }
  b.add_root(ClassId(num_classes - 1));
  if num_classes > 3 && rng.gen_bool(0.5) {
    b.add_root(ClassId(rng.gen_range(0..num_classes - 1)));
  }
  b
}

fn random_egraph(seed: u64, cyclic: bool) -> EGraph {
  random_builder(seed, cyclic).build().unwrap()
}

fn config(f: impl FnOnce(&mut ExtractConfig)) -> ExtractConfig {
  let mut config = ExtractConfig::default();
  f(&mut config);
  config
}

#[test]
fn extractions_are_valid() {
  let _ = env_logger::builder().is_test(true).try_init();
  for seed in 0..SEEDS {
    let egraph = random_egraph(seed, false);
    let roots = egraph.root_eclasses();
    let result = GreedyDagExtractor::default()
      .extract(&egraph, roots)
      .unwrap();
    assert_eq!(result.check(&egraph), Ok(()), "seed {seed}");
    let dag = result.dag_cost(&egraph, roots).unwrap();
    let tree = result.tree_cost(&egraph, roots).unwrap();
    assert!(dag <= tree, "seed {seed}: dag {dag} > tree {tree}");
  }
}

#[test]
fn every_class_is_covered_despite_cycles() {
  for seed in 0..SEEDS {
    let egraph = random_egraph(seed, true);
    for passes in [1, 2] {
      let config = config(|c| {
        c.passes = passes;
        c.threads = Some(2);
      });
      for extractor in [
        GreedyDagExtractor::new(&config).boxed(),
        ParallelGreedyDagExtractor::new(&config).boxed(),
      ] {
        let result =
          extractor.extract(&egraph, egraph.root_eclasses()).unwrap();
        assert_eq!(result.len(), egraph.num_classes(), "seed {seed}");
        assert_eq!(result.check(&egraph), Ok(()), "seed {seed}");
      }
    }
  }
}

#[test]
fn second_pass_installs_nothing() {
  for seed in 0..SEEDS {
    let egraph = random_egraph(seed, true);
    let count = |passes| {
      let mut installs = 0;
      GreedyDagExtractor::new(&config(|c| c.passes = passes))
        .run(&egraph, egraph.root_eclasses(), |_, _, _| installs += 1)
        .unwrap();
      installs
    };
    assert_eq!(count(1), count(2), "seed {seed}");
  }
}

#[test]
fn bottom_up_is_tree_optimal() {
  for seed in 0..SEEDS {
    for cyclic in [false, true] {
      let egraph = random_egraph(seed, cyclic);
      let roots = egraph.root_eclasses();
      let tree = BottomUpExtractor::default().extract(&egraph, roots).unwrap();
      let greedy =
        GreedyDagExtractor::default().extract(&egraph, roots).unwrap();
      assert_eq!(tree.check(&egraph), Ok(()), "seed {seed}");
      assert!(
        tree.tree_cost(&egraph, roots).unwrap()
          <= greedy.tree_cost(&egraph, roots).unwrap(),
        "seed {seed}"
      );

      let shallow =
        AstDepthExtractor::default().extract(&egraph, roots).unwrap();
      assert_eq!(shallow.check(&egraph), Ok(()), "seed {seed}");
      assert!(
        shallow.depth_cost(&egraph, roots).unwrap()
          <= tree.depth_cost(&egraph, roots).unwrap(),
        "seed {seed}"
      );
    }
  }
}

#[test]
fn single_child_shortcut_never_changes_choices() {
  for seed in 0..SEEDS {
    for cyclic in [false, true] {
      let egraph = random_egraph(seed, cyclic);
      let roots = egraph.root_eclasses();
      let pruned = GreedyDagExtractor::new(&config(|c| {
        c.prune_single_child = true;
      }))
      .extract(&egraph, roots)
      .unwrap();
      let unpruned = GreedyDagExtractor::new(&config(|c| {
        c.prune_single_child = false;
      }))
      .extract(&egraph, roots)
      .unwrap();
      assert_eq!(pruned.choices(), unpruned.choices(), "seed {seed}");
    }
  }
}

#[test]
fn parallel_result_does_not_depend_on_thread_count() {
  for seed in 0..SEEDS / 4 {
    let egraph = random_egraph(seed, true);
    let roots = egraph.root_eclasses();
    let results: Vec<_> = [1, 2, 4]
      .into_iter()
      .map(|threads| {
        ParallelGreedyDagExtractor::new(&config(|c| {
          c.threads = Some(threads);
          c.batch_size = 7;
          c.passes = 2;
        }))
        .extract(&egraph, roots)
        .unwrap()
      })
      .collect();
    assert_eq!(results[0], results[1], "seed {seed}");
    assert_eq!(results[0], results[2], "seed {seed}");
  }
}

#[test]
fn parallel_with_unit_batches_matches_sequential() {
  for seed in 0..SEEDS / 4 {
    let egraph = random_egraph(seed, true);
    let roots = egraph.root_eclasses();
    let sequential = GreedyDagExtractor::default()
      .extract(&egraph, roots)
      .unwrap();
    let parallel = ParallelGreedyDagExtractor::new(&config(|c| {
      c.threads = Some(2);
      c.batch_size = 1;
    }))
    .extract(&egraph, roots)
    .unwrap();
    assert_eq!(sequential, parallel, "seed {seed}");
  }
}

#[test]
fn installs_strictly_improve_across_passes() {
  for seed in 0..SEEDS {
    let egraph = random_egraph(seed, true);
    let extractor = GreedyDagExtractor::new(&config(|c| c.passes = 3));
    extractor
      .run(&egraph, egraph.root_eclasses(), |class, old, new| {
        assert!(improves(new, old), "seed {seed}, class {class}");
      })
      .unwrap();
  }
}

#[test]
fn canonicalization_is_idempotent() {
  for seed in 0..SEEDS {
    let mut once = random_builder(seed, true);
    remove_redundant_nodes(&mut once).unwrap();
    let mut twice = once.clone();
    assert_eq!(remove_redundant_nodes(&mut twice).unwrap(), 0);
    assert_eq!(once, twice, "seed {seed}");

    let mut acyclic = random_builder(seed, false);
    remove_redundant_nodes(&mut acyclic).unwrap();
    let egraph = acyclic.build().unwrap();
    let result = GreedyDagExtractor::default()
      .extract(&egraph, egraph.root_eclasses())
      .unwrap();
    assert_eq!(result.check(&egraph), Ok(()), "seed {seed}");
  }
}
