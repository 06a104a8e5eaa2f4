//! The e-graph data model.
//!
//! An e-graph is built through an [`EGraphBuilder`], which owns a mutable node
//! table. [`EGraphBuilder::build`] checks the table for dangling references and
//! seals it into an [`EGraph`], computing the grouping of nodes into classes
//! exactly once. A sealed graph is never mutated; to edit it again, reopen it
//! with [`EGraph::into_builder`].

use crate::id::{ClassId, NodeId, OpId};
use indexmap::{IndexMap, IndexSet, map::Entry};
use log::info;
use ordered_float::NotNan;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::ops::Index;
use thiserror::Error;

/// The cost of a single node. Always finite and non-negative once it is part
/// of a graph.
pub type Cost = NotNan<f64>;

/// One candidate operation inside an e-class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
  /// The operator, interned in the graph's [`OpTable`].
  pub op: OpId,
  /// The classes this node takes as operands.
  pub children: Vec<ClassId>,
  /// The class this node belongs to.
  pub eclass: ClassId,
  pub cost: Cost,
}

impl Node {
  #[must_use]
  pub fn new(
    op: OpId,
    children: Vec<ClassId>,
    eclass: ClassId,
    cost: Cost,
  ) -> Self {
    Self {
      op,
      children,
      eclass,
      cost,
    }
  }

  #[must_use]
  pub fn is_leaf(&self) -> bool {
    self.children.is_empty()
  }

  /// The children of this node as a sorted set.
  #[must_use]
  pub fn distinct_children(&self) -> SmallVec<[ClassId; 4]> {
    let mut children: SmallVec<[ClassId; 4]> =
      self.children.iter().copied().collect();
    children.sort_unstable();
    children.dedup();
    children
  }
}

/// A derived view of an e-class: its id and the ids of its nodes, in the
/// order they are stored in the node table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Class {
  pub id: ClassId,
  pub nodes: Vec<NodeId>,
}

/// Interning table for operator names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpTable {
  names: IndexSet<String>,
}

impl OpTable {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Builds a table whose `i`-th entry is `names[i]`.
  ///
  /// # Errors
  /// Fails if a name occurs twice, since the indices would no longer line up.
  pub fn from_names<I, S>(names: I) -> Result<Self, EGraphError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut table = Self::new();
    for name in names {
      let name = name.into();
      if table.names.contains(&name) {
        return Err(EGraphError::DuplicateOp(name));
      }
      table.names.insert(name);
    }
    Ok(table)
  }

  /// Returns the id of `name`, adding it to the table if needed.
  pub fn intern(&mut self, name: &str) -> OpId {
    match self.names.get_index_of(name) {
      Some(index) => OpId(index as u32),
      None => {
        let (index, _) = self.names.insert_full(name.to_owned());
        OpId(index as u32)
      }
    }
  }

  #[must_use]
  pub fn get(&self, name: &str) -> Option<OpId> {
    self.names.get_index_of(name).map(|index| OpId(index as u32))
  }

  #[must_use]
  pub fn name(&self, op: OpId) -> Option<&str> {
    self.names.get_index(usize::from(op)).map(String::as_str)
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.names.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }
}

/// Ways in which an e-graph can be malformed.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum EGraphError {
  #[error("duplicate node with id {0}")]
  DuplicateNode(NodeId),
  #[error("node {node} is stored under the wrong class (claims {eclass})")]
  ClassMismatch { node: NodeId, eclass: ClassId },
  #[error("node {node} references class {child}, which has no nodes")]
  DanglingChild { node: NodeId, child: ClassId },
  #[error("root class {0} has no nodes")]
  DanglingRoot(ClassId),
  #[error("node {node} has negative cost {cost}")]
  NegativeCost { node: NodeId, cost: f64 },
  #[error("node {0} has a NaN cost")]
  NanCost(NodeId),
  #[error("node {node} has non-finite cost {cost}")]
  NonFiniteCost { node: NodeId, cost: f64 },
  #[error("node {0} has the largest local index, leaving none to allocate")]
  IndexOutOfRange(NodeId),
  #[error("node {node} uses operator {op}, which is not in the op table")]
  UnknownOp { node: NodeId, op: OpId },
  #[error("operator {0:?} appears twice in the op table")]
  DuplicateOp(String),
  #[error("no node with id {0}")]
  UnknownNode(NodeId),
}

/// An open, mutable e-graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EGraphBuilder {
  nodes: IndexMap<NodeId, Node>,
  root_eclasses: Vec<ClassId>,
  ops: OpTable,
  next_index: FxHashMap<ClassId, u32>,
}

impl EGraphBuilder {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn with_ops(ops: OpTable) -> Self {
    Self {
      ops,
      ..Self::default()
    }
  }

  pub fn intern_op(&mut self, name: &str) -> OpId {
    self.ops.intern(name)
  }

  #[must_use]
  pub fn ops(&self) -> &OpTable {
    &self.ops
  }

  /// Adds a node under an explicit id.
  ///
  /// # Errors
  /// Fails if the id is already taken, if the id's class component differs
  /// from `node.eclass`, if the cost is negative or infinite, if the local
  /// index is `u32::MAX`, or if the operator is not in the op table.
  pub fn add_node(
    &mut self,
    node_id: impl Into<NodeId>,
    node: Node,
  ) -> Result<(), EGraphError> {
    let node_id = node_id.into();
    if node_id.class() != node.eclass {
      return Err(EGraphError::ClassMismatch {
        node: node_id,
        eclass: node.eclass,
      });
    }
    let cost = node.cost.into_inner();
    if !cost.is_finite() {
      return Err(EGraphError::NonFiniteCost {
        node: node_id,
        cost,
      });
    }
    if cost < 0.0 {
      return Err(EGraphError::NegativeCost {
        node: node_id,
        cost,
      });
    }
    let Some(after) = node_id.index().checked_add(1) else {
      return Err(EGraphError::IndexOutOfRange(node_id));
    };
    if self.ops.name(node.op).is_none() {
      return Err(EGraphError::UnknownOp {
        node: node_id,
        op: node.op,
      });
    }
    match self.nodes.entry(node_id) {
      Entry::Occupied(e) => return Err(EGraphError::DuplicateNode(*e.key())),
      Entry::Vacant(e) => e.insert(node),
    };
    let next = self.next_index.entry(node_id.class()).or_insert(0);
    *next = (*next).max(after);
    Ok(())
  }

  /// Adds a node to `class` with the next free local index, interning `op`.
  ///
  /// # Errors
  /// Fails on a NaN, infinite or negative cost, or once the class has used
  /// up its local indices.
  pub fn push(
    &mut self,
    class: u32,
    op: &str,
    children: &[u32],
    cost: f64,
  ) -> Result<NodeId, EGraphError> {
    let class = ClassId(class);
    let index = self.next_index.get(&class).copied().unwrap_or(0);
    let node_id = NodeId::new(class, index);
    let cost = NotNan::new(cost).map_err(|_| EGraphError::NanCost(node_id))?;
    let op = self.intern_op(op);
    let children = children.iter().copied().map(ClassId).collect();
    self.add_node(node_id, Node::new(op, children, class, cost))?;
    Ok(node_id)
  }

  pub fn add_root(&mut self, class: ClassId) {
    self.root_eclasses.push(class);
  }

  #[must_use]
  pub fn root_eclasses(&self) -> &[ClassId] {
    &self.root_eclasses
  }

  #[must_use]
  pub fn nodes(&self) -> &IndexMap<NodeId, Node> {
    &self.nodes
  }

  #[must_use]
  pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
    self.nodes.get(node_id)
  }

  /// Removes every node in `doomed`, keeping the order of the rest. Returns
  /// the number of nodes removed.
  pub fn remove_nodes(&mut self, doomed: &FxHashSet<NodeId>) -> usize {
    let before = self.nodes.len();
    self.nodes.retain(|node_id, _| !doomed.contains(node_id));
    before - self.nodes.len()
  }

  /// Groups node ids by class, in storage order.
  #[must_use]
  pub fn group_by_class(&self) -> IndexMap<ClassId, Vec<NodeId>> {
    let mut groups: IndexMap<ClassId, Vec<NodeId>> = IndexMap::new();
    for (node_id, node) in &self.nodes {
      groups.entry(node.eclass).or_default().push(*node_id);
    }
    groups
  }

  /// Validates the node table and seals it.
  ///
  /// # Errors
  /// Fails if a root or a child references a class with no nodes.
  pub fn build(self) -> Result<EGraph, EGraphError> {
    let classes: IndexMap<ClassId, Class> = self
      .group_by_class()
      .into_iter()
      .map(|(id, nodes)| (id, Class { id, nodes }))
      .collect();

    for (node_id, node) in &self.nodes {
      if let Some(child) =
        node.children.iter().find(|c| !classes.contains_key(*c))
      {
        return Err(EGraphError::DanglingChild {
          node: *node_id,
          child: *child,
        });
      }
    }
    if let Some(root) =
      self.root_eclasses.iter().find(|r| !classes.contains_key(*r))
    {
      return Err(EGraphError::DanglingRoot(*root));
    }

    info!(
      "Sealed e-graph: {} nodes in {} classes, {} roots, {} operators",
      self.nodes.len(),
      classes.len(),
      self.root_eclasses.len(),
      self.ops.len()
    );
    Ok(EGraph {
      nodes: self.nodes,
      classes,
      root_eclasses: self.root_eclasses,
      ops: self.ops,
      next_index: self.next_index,
    })
  }
}

/// A sealed, read-only e-graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EGraph {
  nodes: IndexMap<NodeId, Node>,
  classes: IndexMap<ClassId, Class>,
  root_eclasses: Vec<ClassId>,
  ops: OpTable,
  next_index: FxHashMap<ClassId, u32>,
}

impl EGraph {
  /// Reopens the graph for editing. The class grouping is discarded and
  /// recomputed by the next [`EGraphBuilder::build`].
  #[must_use]
  pub fn into_builder(self) -> EGraphBuilder {
    EGraphBuilder {
      nodes: self.nodes,
      root_eclasses: self.root_eclasses,
      ops: self.ops,
      next_index: self.next_index,
    }
  }

  #[must_use]
  pub fn classes(&self) -> &IndexMap<ClassId, Class> {
    &self.classes
  }

  #[must_use]
  pub fn class(&self, class_id: &ClassId) -> Option<&Class> {
    self.classes.get(class_id)
  }

  /// The dense position of a class in [`EGraph::classes`].
  #[must_use]
  pub fn class_index(&self, class_id: &ClassId) -> Option<usize> {
    self.classes.get_index_of(class_id)
  }

  #[must_use]
  pub fn nodes(&self) -> &IndexMap<NodeId, Node> {
    &self.nodes
  }

  #[must_use]
  pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
    self.nodes.get(node_id)
  }

  #[must_use]
  pub fn num_nodes(&self) -> usize {
    self.nodes.len()
  }

  #[must_use]
  pub fn num_classes(&self) -> usize {
    self.classes.len()
  }

  #[must_use]
  pub fn root_eclasses(&self) -> &[ClassId] {
    &self.root_eclasses
  }

  #[must_use]
  pub fn ops(&self) -> &OpTable {
    &self.ops
  }

  #[must_use]
  pub fn op_name(&self, node: &Node) -> Option<&str> {
    self.ops.name(node.op)
  }

  #[must_use]
  pub fn nid_to_cid(&self, node_id: &NodeId) -> Option<ClassId> {
    self.nodes.get(node_id).map(|node| node.eclass)
  }

  #[must_use]
  pub fn nid_to_class(&self, node_id: &NodeId) -> Option<&Class> {
    self.nid_to_cid(node_id).and_then(|cid| self.classes.get(&cid))
  }
}

impl Index<&NodeId> for EGraph {
  type Output = Node;

  fn index(&self, index: &NodeId) -> &Self::Output {
    self
      .nodes
      .get(index)
      .unwrap_or_else(|| panic!("No node with id {index:?}"))
  }
}

impl Index<&ClassId> for EGraph {
  type Output = Class;

  fn index(&self, index: &ClassId) -> &Self::Output {
    self
      .classes
      .get(index)
      .unwrap_or_else(|| panic!("No class with id {index:?}"))
  }
}
