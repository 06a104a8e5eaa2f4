//! The outcome of an extraction, and the costs it implies.

use crate::{
  check::{CheckError, post_order},
  egraph::{Cost, EGraph},
  id::{ClassId, NodeId},
};
use bitvec::vec::BitVec;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// One chosen node per extracted class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
  choices: IndexMap<ClassId, NodeId>,
  /// The best candidate total each evaluated node produced, or `None` if
  /// every evaluation of it was rejected.
  candidate_costs: FxHashMap<NodeId, Option<Cost>>,
}

impl ExtractionResult {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Chooses `node` for `class`, replacing any earlier choice.
  pub fn choose(&mut self, class: ClassId, node: NodeId) {
    self.choices.insert(class, node);
  }

  #[must_use]
  pub fn choice(&self, class: &ClassId) -> Option<NodeId> {
    self.choices.get(class).copied()
  }

  #[must_use]
  pub fn choices(&self) -> &IndexMap<ClassId, NodeId> {
    &self.choices
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.choices.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.choices.is_empty()
  }

  pub(crate) fn record_candidate(&mut self, node: NodeId, total: Option<Cost>) {
    let best = self.candidate_costs.entry(node).or_insert(None);
    if let Some(total) = total {
      if best.is_none_or(|b| total < b) {
        *best = Some(total);
      }
    }
  }

  #[must_use]
  pub fn candidate_costs(&self) -> &FxHashMap<NodeId, Option<Cost>> {
    &self.candidate_costs
  }

  /// The cost of the extraction written out as a tree: a class reached
  /// through several parents is paid once per parent.
  ///
  /// # Errors
  /// Fails if a class below the roots has no choice, or if the choices form
  /// a cycle.
  pub fn tree_cost(
    &self,
    egraph: &EGraph,
    roots: &[ClassId],
  ) -> Result<Cost, CheckError> {
    let mut costs: FxHashMap<ClassId, Cost> = FxHashMap::default();
    post_order(self, egraph, roots, |class, _, node| {
      let children: Cost = node.children.iter().map(|c| costs[c]).sum();
      costs.insert(class, node.cost + children);
      Ok(())
    })?;
    Ok(roots.iter().map(|r| costs[r]).sum())
  }

  /// The cost of the extraction as a DAG: every reachable class is paid once.
  ///
  /// # Errors
  /// Fails if a class below the roots has no choice.
  pub fn dag_cost(
    &self,
    egraph: &EGraph,
    roots: &[ClassId],
  ) -> Result<Cost, CheckError> {
    Ok(
      self
        .reachable(egraph, roots)?
        .into_iter()
        .map(|(_, node_id)| egraph[&node_id].cost)
        .sum(),
    )
  }

  /// The number of nodes on the longest chain of choices below a root. A
  /// leaf has depth one.
  ///
  /// # Errors
  /// Fails if a class below the roots has no choice, or if the choices form
  /// a cycle.
  pub fn depth_cost(
    &self,
    egraph: &EGraph,
    roots: &[ClassId],
  ) -> Result<usize, CheckError> {
    let mut depths: FxHashMap<ClassId, usize> = FxHashMap::default();
    post_order(self, egraph, roots, |class, _, node| {
      let below = node.children.iter().map(|c| depths[c]).max();
      depths.insert(class, 1 + below.unwrap_or(0));
      Ok(())
    })?;
    Ok(roots.iter().map(|r| depths[r]).max().unwrap_or(0))
  }

  /// The chosen nodes reachable from `roots`, sorted.
  ///
  /// # Errors
  /// Fails if a class below the roots has no choice.
  pub fn active_nodes(
    &self,
    egraph: &EGraph,
    roots: &[ClassId],
  ) -> Result<Vec<NodeId>, CheckError> {
    let mut active: Vec<NodeId> = self
      .reachable(egraph, roots)?
      .into_iter()
      .map(|(_, node_id)| node_id)
      .collect();
    active.sort_unstable();
    Ok(active)
  }

  /// Every `(class, chosen node)` reachable from `roots`, each class once.
  fn reachable(
    &self,
    egraph: &EGraph,
    roots: &[ClassId],
  ) -> Result<Vec<(ClassId, NodeId)>, CheckError> {
    let mut visited: BitVec = BitVec::repeat(false, egraph.num_classes());
    let mut reached = Vec::new();
    let mut todo: Vec<ClassId> = roots.to_vec();

    while let Some(class) = todo.pop() {
      let index = egraph
        .class_index(&class)
        .ok_or(CheckError::UnknownClass(class))?;
      if visited.replace(index, true) {
        continue;
      }
      let node_id =
        self.choice(&class).ok_or(CheckError::MissingChoice(class))?;
      let node = egraph
        .node(&node_id)
        .ok_or(CheckError::UnknownNode { class, node: node_id })?;
      reached.push((class, node_id));
      todo.extend(node.children.iter().copied());
    }
    Ok(reached)
  }

  /// Nodes worth forcing to zero in an exact solver: those whose best
  /// candidate cost more than `bound` times the cheapest candidate of their
  /// class, or that never had a feasible candidate while their class did.
  /// Sorted by id.
  #[must_use]
  pub fn zero_nodes(&self, bound: Cost) -> Vec<NodeId> {
    let mut by_class: BTreeMap<ClassId, Vec<(NodeId, Option<Cost>)>> =
      BTreeMap::new();
    for (node_id, total) in &self.candidate_costs {
      by_class
        .entry(node_id.class())
        .or_default()
        .push((*node_id, *total));
    }

    let mut zero = Vec::new();
    for nodes in by_class.values() {
      let Some(min) = nodes.iter().filter_map(|(_, total)| *total).min() else {
        continue;
      };
      let threshold = min * bound;
      zero.extend(
        nodes
          .iter()
          .filter(|(_, total)| total.is_none_or(|t| t > threshold))
          .map(|(node_id, _)| *node_id),
      );
    }
    zero.sort_unstable();
    zero
  }
}
