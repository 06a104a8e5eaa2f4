//! Removal of redundant nodes before extraction.
//!
//! Two nodes of the same class whose children form the same multiset of
//! classes are interchangeable as far as the extractor is concerned. For each
//! such group only the first node in storage order is kept.
//!
//! Node ids are not remapped. Anything computed before the pass that refers to
//! a removed node (a warm-start hint, say) is stale, and consumers are expected
//! to ignore the unknown id.

use crate::{
  egraph::{EGraphBuilder, EGraphError},
  id::{ClassId, NodeId},
};
use indexmap::IndexMap;
use itertools::Itertools;
use log::info;
use rustc_hash::FxHashSet;

/// The multiset of a node's child classes, as `(class, multiplicity)` pairs
/// sorted by class.
pub type Signature = Vec<(ClassId, usize)>;

#[must_use]
pub fn signature(children: &[ClassId]) -> Signature {
  children
    .iter()
    .copied()
    .sorted_unstable()
    .dedup_with_count()
    .map(|(count, class)| (class, count))
    .collect()
}

/// Drops every node that has the same signature as an earlier node of its
/// class. Root classes are untouched. Returns the number of nodes removed.
///
/// # Errors
/// Fails if the class grouping names a node that is not in the node table,
/// which means the graph is corrupt.
pub fn remove_redundant_nodes(
  builder: &mut EGraphBuilder,
) -> Result<usize, EGraphError> {
  let mut doomed: FxHashSet<NodeId> = FxHashSet::default();

  for (_, node_ids) in builder.group_by_class() {
    if node_ids.len() < 2 {
      continue;
    }
    let mut grouped: IndexMap<Signature, Vec<NodeId>> = IndexMap::new();
    for node_id in node_ids {
      let node = builder
        .node(&node_id)
        .ok_or(EGraphError::UnknownNode(node_id))?;
      grouped
        .entry(signature(&node.children))
        .or_default()
        .push(node_id);
    }
    for (_, group) in grouped {
      doomed.extend(group.into_iter().skip(1));
    }
  }

  let removed = builder.remove_nodes(&doomed);
  info!("Removed {removed} redundant nodes");
  Ok(removed)
}
