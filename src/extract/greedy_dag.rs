//! The sequential greedy DAG extractor.
//!
//! A candidate for node `n` of class `c` bills every class in the closure of
//! `n`'s children at the cost recorded when that child class was last
//! improved, so a class reached along several paths is paid once. A
//! candidate whose closure already contains `c` would close a cycle and is
//! rejected.

use super::{Budget, ExtractError, Extractor, UniqueQueue};
use crate::{
  config::ExtractConfig,
  egraph::{Cost, EGraph},
  id::{ClassId, NodeId},
  result::ExtractionResult,
};
use itertools::Itertools;
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::time::Duration;

/// The budget is polled once per this many queue pops.
pub(crate) const BUDGET_CHECK_INTERVAL: usize = 1024;

/// The best known realization of one class.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct CostSet {
  /// The cost of every class in the realization's closure, this one included
  pub(crate) billed: FxHashMap<ClassId, Cost>,
  /// The sum of `billed`
  pub(crate) total: Cost,
  pub(crate) choice: NodeId,
}

/// What evaluating one node against the current cost sets produced.
#[derive(Debug)]
pub(crate) enum Evaluation {
  /// Some child class has no cost set yet
  Blocked,
  /// The node closes a cycle or cannot beat its class's best
  Rejected,
  Candidate(CostSet),
}

pub(crate) fn improves(candidate: Cost, best: Option<Cost>) -> bool {
  best.is_none_or(|best| candidate < best)
}

/// Computes the candidate cost set of `node_id` given the current `costs`.
pub(crate) fn evaluate(
  egraph: &EGraph,
  node_id: NodeId,
  costs: &FxHashMap<ClassId, CostSet>,
  prune_single_child: bool,
) -> Evaluation {
  let node = &egraph[&node_id];
  let class = node.eclass;

  if node.is_leaf() {
    let mut billed = FxHashMap::default();
    billed.insert(class, node.cost);
    return Evaluation::Candidate(CostSet {
      billed,
      total: node.cost,
      choice: node_id,
    });
  }

  let children = node.distinct_children();
  let mut child_sets: SmallVec<[&CostSet; 4]> =
    SmallVec::with_capacity(children.len());
  for child in &children {
    match costs.get(child) {
      Some(set) => child_sets.push(set),
      None => return Evaluation::Blocked,
    }
  }

  if children.contains(&class) {
    return Evaluation::Rejected;
  }
  let best = costs.get(&class).map(|set| set.total);
  if prune_single_child
    && child_sets.len() == 1
    && !improves(node.cost + child_sets[0].total, best)
  {
    return Evaluation::Rejected;
  }

  let Some(largest) = child_sets.iter().position_max_by_key(|s| s.billed.len())
  else {
    return Evaluation::Rejected;
  };
  let mut billed = child_sets[largest].billed.clone();
  for (i, set) in child_sets.iter().enumerate() {
    if i == largest {
      continue;
    }
    for (k, v) in &set.billed {
      billed.entry(*k).or_insert(*v);
    }
  }

  if billed.contains_key(&class) {
    return Evaluation::Rejected;
  }
  billed.insert(class, node.cost);
  let total = billed.values().sum();
  Evaluation::Candidate(CostSet {
    billed,
    total,
    choice: node_id,
  })
}

/// For every class, the nodes that have it as a child, each listed once.
pub(crate) fn parents_index(egraph: &EGraph) -> FxHashMap<ClassId, Vec<NodeId>> {
  let mut parents: FxHashMap<ClassId, Vec<NodeId>> =
    FxHashMap::with_capacity_and_hasher(egraph.num_classes(), Default::default());
  for (node_id, node) in egraph.nodes() {
    for child in node.distinct_children() {
      parents.entry(child).or_default().push(*node_id);
    }
  }
  parents
}

/// The nodes a pass starts from: the leaves on the first pass, every node
/// on later ones.
pub(crate) fn pass_seeds(
  egraph: &EGraph,
  pass: usize,
) -> impl Iterator<Item = NodeId> + '_ {
  egraph
    .nodes()
    .iter()
    .filter(move |(_, node)| pass > 0 || node.is_leaf())
    .map(|(node_id, _)| *node_id)
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Stats {
  pub(crate) evaluated: usize,
  pub(crate) installs: usize,
}

/// Turns the converged per-class choices into a result, in class order.
/// Fails if the budget ran out or some root was never realized.
pub(crate) fn finish<F>(
  name: &str,
  egraph: &EGraph,
  roots: &[ClassId],
  choice_of: F,
  mut result: ExtractionResult,
  stats: Stats,
  budget: &Budget,
) -> Result<ExtractionResult, ExtractError>
where
  F: Fn(&ClassId) -> Option<NodeId>,
{
  budget.check()?;

  for class in egraph.classes().keys() {
    if let Some(node_id) = choice_of(class) {
      result.choose(*class, node_id);
    }
  }

  let uncovered: Vec<ClassId> = roots
    .iter()
    .filter(|r| choice_of(r).is_none())
    .copied()
    .unique()
    .collect();
  if !uncovered.is_empty() {
    warn!("{name}: {} root classes have no realization", uncovered.len());
    return Err(ExtractError::UncoverableRoots(uncovered));
  }

  info!(
    "{name}: covered {} of {} classes, {} evaluations, {} installs, {:?}",
    result.len(),
    egraph.num_classes(),
    stats.evaluated,
    stats.installs,
    budget.elapsed()
  );
  Ok(result)
}

/// Runs the relaxation one node at a time.
#[derive(Debug, Clone)]
pub struct GreedyDagExtractor {
  passes: usize,
  prune_single_child: bool,
  timeout: Option<Duration>,
}

impl Default for GreedyDagExtractor {
  fn default() -> Self {
    Self::new(&ExtractConfig::default())
  }
}

impl GreedyDagExtractor {
  #[must_use]
  pub fn new(config: &ExtractConfig) -> Self {
    Self {
      passes: config.passes.max(1),
      prune_single_child: config.prune_single_child,
      timeout: config.timeout(),
    }
  }

  /// Runs the fixpoint, calling `on_install(class, previous, new)` every time
  /// a class's best total changes.
  pub(crate) fn run<F>(
    &self,
    egraph: &EGraph,
    roots: &[ClassId],
    mut on_install: F,
  ) -> Result<ExtractionResult, ExtractError>
  where
    F: FnMut(ClassId, Option<Cost>, Cost),
  {
    let budget = Budget::start(self.timeout);
    let parents = parents_index(egraph);
    let mut costs: FxHashMap<ClassId, CostSet> =
      FxHashMap::with_capacity_and_hasher(
        egraph.num_classes(),
        Default::default(),
      );
    let mut result = ExtractionResult::new();
    let mut queue = UniqueQueue::default();
    let mut stats = Stats::default();

    for pass in 0..self.passes {
      queue.extend(pass_seeds(egraph, pass));
      debug!("Pass {pass}: {} nodes queued", queue.len());

      while let Some(node_id) = queue.pop() {
        if stats.evaluated % BUDGET_CHECK_INTERVAL == 0 {
          budget.check()?;
        }
        stats.evaluated += 1;

        let set = match evaluate(
          egraph,
          node_id,
          &costs,
          self.prune_single_child,
        ) {
          Evaluation::Blocked | Evaluation::Rejected => {
            result.record_candidate(node_id, None);
            continue;
          }
          Evaluation::Candidate(set) => set,
        };
        result.record_candidate(node_id, Some(set.total));

        let class = egraph[&node_id].eclass;
        let best = costs.get(&class).map(|s| s.total);
        if improves(set.total, best) {
          on_install(class, best, set.total);
          costs.insert(class, set);
          stats.installs += 1;
          if let Some(parents) = parents.get(&class) {
            queue.extend(parents.iter().copied());
          }
        }
      }
      debug!(
        "Pass {pass} done: {} evaluations, {} installs so far",
        stats.evaluated, stats.installs
      );
    }

    finish(
      "greedy-dag",
      egraph,
      roots,
      |class| costs.get(class).map(|set| set.choice),
      result,
      stats,
      &budget,
    )
  }
}

impl Extractor for GreedyDagExtractor {
  fn extract(
    &self,
    egraph: &EGraph,
    roots: &[ClassId],
  ) -> Result<ExtractionResult, ExtractError> {
    self.run(egraph, roots, |_, _, _| {})
  }
}
