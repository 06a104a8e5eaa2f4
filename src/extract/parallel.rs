//! The batch-synchronous parallel greedy DAG extractor.
//!
//! Each round pops up to `batch_size` queued nodes and evaluates them on a
//! rayon pool against the cost sets as they stood when the round began. The
//! round's candidates are then merged one by one, in the order the nodes were
//! popped, so the outcome does not depend on how many threads did the work.
//! Workers only ever borrow the table during a round, and the table is only
//! written between rounds.

use super::{
  Budget, ExtractError, Extractor, UniqueQueue,
  greedy_dag::{
    CostSet, Evaluation, Stats, evaluate, finish, improves, parents_index,
    pass_seeds,
  },
};
use crate::{
  config::ExtractConfig,
  egraph::EGraph,
  id::{ClassId, NodeId},
  result::ExtractionResult,
};
use indexmap::IndexMap;
use log::debug;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::time::Duration;

/// Runs the relaxation in synchronous parallel rounds.
#[derive(Debug, Clone)]
pub struct ParallelGreedyDagExtractor {
  passes: usize,
  prune_single_child: bool,
  threads: Option<usize>,
  batch_size: usize,
  timeout: Option<Duration>,
}

impl Default for ParallelGreedyDagExtractor {
  fn default() -> Self {
    Self::new(&ExtractConfig::default())
  }
}

impl ParallelGreedyDagExtractor {
  #[must_use]
  pub fn new(config: &ExtractConfig) -> Self {
    Self {
      passes: config.passes.max(1),
      prune_single_child: config.prune_single_child,
      threads: config.threads,
      batch_size: config.batch_size.max(1),
      timeout: config.timeout(),
    }
  }

  fn run(
    &self,
    egraph: &EGraph,
    roots: &[ClassId],
  ) -> Result<ExtractionResult, ExtractError> {
    let budget = Budget::start(self.timeout);
    let parents = parents_index(egraph);
    let mut costs: FxHashMap<ClassId, CostSet> =
      FxHashMap::with_capacity_and_hasher(
        egraph.num_classes(),
        Default::default(),
      );
    let mut result = ExtractionResult::new();
    let mut queue: UniqueQueue<NodeId> = UniqueQueue::default();
    let mut stats = Stats::default();
    let mut rounds = 0_usize;

    for pass in 0..self.passes {
      queue.extend(pass_seeds(egraph, pass));
      debug!("Pass {pass}: {} nodes queued", queue.len());

      while !queue.is_empty() {
        budget.check()?;
        rounds += 1;
        let batch = queue.pop_batch(self.batch_size);
        stats.evaluated += batch.len();

        let evaluations: Vec<Evaluation> = batch
          .par_iter()
          .map(|node_id| {
            evaluate(egraph, *node_id, &costs, self.prune_single_child)
          })
          .collect();

        let mut winners: IndexMap<ClassId, CostSet> = IndexMap::new();
        for (node_id, evaluation) in batch.iter().zip(evaluations) {
          let set = match evaluation {
            Evaluation::Blocked | Evaluation::Rejected => {
              result.record_candidate(*node_id, None);
              continue;
            }
            Evaluation::Candidate(set) => set,
          };
          result.record_candidate(*node_id, Some(set.total));

          let class = egraph[node_id].eclass;
          let best = winners
            .get(&class)
            .or_else(|| costs.get(&class))
            .map(|s| s.total);
          if improves(set.total, best) {
            winners.insert(class, set);
          }
        }

        for (class, set) in winners {
          costs.insert(class, set);
          stats.installs += 1;
          if let Some(parents) = parents.get(&class) {
            queue.extend(parents.iter().copied());
          }
        }
      }
      debug!(
        "Pass {pass} done after {rounds} rounds: {} evaluations, {} installs",
        stats.evaluated, stats.installs
      );
    }

    finish(
      "parallel-greedy-dag",
      egraph,
      roots,
      |class| costs.get(class).map(|set| set.choice),
      result,
      stats,
      &budget,
    )
  }
}

impl Extractor for ParallelGreedyDagExtractor {
  fn extract(
    &self,
    egraph: &EGraph,
    roots: &[ClassId],
  ) -> Result<ExtractionResult, ExtractError> {
    let pool = rayon::ThreadPoolBuilder::new()
      .num_threads(self.threads.unwrap_or(0))
      .build()?;
    pool.install(|| self.run(egraph, roots))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    egraph::{Cost, EGraphBuilder},
    extract::GreedyDagExtractor,
  };
  use ordered_float::NotNan;

  fn cost(c: f64) -> Cost {
    NotNan::new(c).unwrap()
  }

  fn ladder() -> EGraph {
    let mut b = EGraphBuilder::new();
    b.push(0, "x", &[], 2.0).unwrap();
    b.push(0, "y", &[], 3.0).unwrap();
    for class in 1..6 {
      b.push(class, "f", &[class - 1], 1.0).unwrap();
      b.push(class, "g", &[class - 1, 0], 0.5).unwrap();
      b.push(class, "c", &[], 10.0).unwrap();
    }
    b.add_root(ClassId(5));
    b.build().unwrap()
  }

  fn with(threads: usize, batch_size: usize) -> ParallelGreedyDagExtractor {
    ParallelGreedyDagExtractor::new(&ExtractConfig {
      threads: Some(threads),
      batch_size,
      ..ExtractConfig::default()
    })
  }

  #[test]
  fn agrees_with_sequential_on_a_ladder() {
    let _ = env_logger::builder().is_test(true).try_init();
    let egraph = ladder();
    let roots = egraph.root_eclasses();
    let sequential = GreedyDagExtractor::default().extract(&egraph, roots).unwrap();
    let parallel = with(2, 4).extract(&egraph, roots).unwrap();
    assert_eq!(parallel.check(&egraph), Ok(()));
    assert_eq!(
      parallel.dag_cost(&egraph, roots).unwrap(),
      sequential.dag_cost(&egraph, roots).unwrap()
    );
    assert_eq!(parallel.dag_cost(&egraph, roots).unwrap(), cost(4.5));
  }

  #[test]
  fn single_node_batches_replay_the_sequential_run() {
    let egraph = ladder();
    let roots = egraph.root_eclasses();
    let sequential = GreedyDagExtractor::default().extract(&egraph, roots).unwrap();
    let parallel = with(3, 1).extract(&egraph, roots).unwrap();
    assert_eq!(parallel, sequential);
  }

  #[test]
  fn forced_cycle_is_uncoverable() {
    let mut b = EGraphBuilder::new();
    b.push(0, "a", &[1], 1.0).unwrap();
    b.push(1, "b", &[0], 1.0).unwrap();
    b.add_root(ClassId(0));
    b.add_root(ClassId(1));
    let egraph = b.build().unwrap();
    assert!(matches!(
      with(2, 8).extract(&egraph, egraph.root_eclasses()),
      Err(ExtractError::UncoverableRoots(roots)) if roots.len() == 2
    ));
  }

  #[test]
  fn zero_budget_stops_before_the_first_round() {
    let egraph = ladder();
    let extractor = ParallelGreedyDagExtractor::new(&ExtractConfig {
      timeout_secs: Some(0),
      ..ExtractConfig::default()
    });
    assert!(matches!(
      extractor.extract(&egraph, egraph.root_eclasses()),
      Err(ExtractError::BudgetExceeded { .. })
    ));
  }
}
