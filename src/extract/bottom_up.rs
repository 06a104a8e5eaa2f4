//! Tree-cost baselines.
//!
//! Both extractors keep one number per class and relax it from the leaves
//! up, requeueing the parents of a class whenever its number drops.
//! [`BottomUpExtractor`] minimizes the tree cost of every class, so a class
//! reached along several paths is paid along each of them.
//! [`AstDepthExtractor`] ignores node costs and minimizes the height of the
//! extracted expression.
//!
//! Children only ever get cheaper, and a node's number is never below any of
//! its children's, so the choices can't close a cycle.

use super::{
  Budget, ExtractError, Extractor, UniqueQueue,
  greedy_dag::{
    BUDGET_CHECK_INTERVAL, Stats, finish, improves, parents_index, pass_seeds,
  },
};
use crate::{
  config::ExtractConfig,
  egraph::{Cost, EGraph, Node},
  id::{ClassId, NodeId},
  result::ExtractionResult,
};
use log::debug;
use rustc_hash::FxHashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Measure {
  TreeCost,
  Depth,
}

impl Measure {
  /// The value of `node` given the best value of each class, or `None`
  /// while some child is unrealized.
  fn of(
    self,
    node: &Node,
    best: &FxHashMap<ClassId, (Cost, NodeId)>,
  ) -> Option<Cost> {
    let mut children = node
      .children
      .iter()
      .map(|child| best.get(child).map(|(value, _)| *value));
    match self {
      Measure::TreeCost => {
        children.try_fold(node.cost, |sum, child| child.map(|c| sum + c))
      }
      Measure::Depth => children
        .try_fold(Cost::default(), |deepest, child| {
          child.map(|c| deepest.max(c))
        })
        .map(|deepest| deepest + Cost::new(1.0).unwrap()),
    }
  }
}

fn relax(
  name: &str,
  measure: Measure,
  egraph: &EGraph,
  roots: &[ClassId],
  timeout: Option<Duration>,
) -> Result<ExtractionResult, ExtractError> {
  let budget = Budget::start(timeout);
  let parents = parents_index(egraph);
  let mut best: FxHashMap<ClassId, (Cost, NodeId)> =
    FxHashMap::with_capacity_and_hasher(
      egraph.num_classes(),
      Default::default(),
    );
  let mut result = ExtractionResult::new();
  let mut queue = UniqueQueue::default();
  let mut stats = Stats::default();

  queue.extend(pass_seeds(egraph, 0));
  debug!("{name}: {} leaves queued", queue.len());

  while let Some(node_id) = queue.pop() {
    if stats.evaluated % BUDGET_CHECK_INTERVAL == 0 {
      budget.check()?;
    }
    stats.evaluated += 1;

    let node = &egraph[&node_id];
    let value = measure.of(node, &best);
    result.record_candidate(node_id, value);
    let Some(value) = value else {
      continue;
    };

    let class = node.eclass;
    if improves(value, best.get(&class).map(|(v, _)| *v)) {
      best.insert(class, (value, node_id));
      stats.installs += 1;
      if let Some(parents) = parents.get(&class) {
        queue.extend(parents.iter().copied());
      }
    }
  }

  finish(
    name,
    egraph,
    roots,
    |class| best.get(class).map(|(_, node_id)| *node_id),
    result,
    stats,
    &budget,
  )
}

/// Picks, for every class, the node of least tree cost.
#[derive(Debug, Clone, Default)]
pub struct BottomUpExtractor {
  timeout: Option<Duration>,
}

impl BottomUpExtractor {
  #[must_use]
  pub fn new(config: &ExtractConfig) -> Self {
    Self {
      timeout: config.timeout(),
    }
  }
}

impl Extractor for BottomUpExtractor {
  fn extract(
    &self,
    egraph: &EGraph,
    roots: &[ClassId],
  ) -> Result<ExtractionResult, ExtractError> {
    relax("bottom-up", Measure::TreeCost, egraph, roots, self.timeout)
  }
}

/// Picks, for every class, the node heading the shallowest expression.
#[derive(Debug, Clone, Default)]
pub struct AstDepthExtractor {
  timeout: Option<Duration>,
}

impl AstDepthExtractor {
  #[must_use]
  pub fn new(config: &ExtractConfig) -> Self {
    Self {
      timeout: config.timeout(),
    }
  }
}

impl Extractor for AstDepthExtractor {
  fn extract(
    &self,
    egraph: &EGraph,
    roots: &[ClassId],
  ) -> Result<ExtractionResult, ExtractError> {
    relax("ast-depth", Measure::Depth, egraph, roots, self.timeout)
  }
}
