//! Reading and writing the JSON form of an e-graph.
//!
//! The wire format is
//!
//! ```text
//! {
//!   "nodes": { "<class>": { "<index>": { "op": .., "children": [..],
//!                                         "eclass": .., "cost": .. } } },
//!   "root_eclasses": [..],
//!   "op": ["and", "or", ..]
//! }
//! ```
//!
//! Class ids may be written as numbers or numeric strings. A node's `op` is
//! either an index into the top-level `op` table or an operator name; both
//! are interned into the same [`OpTable`]. A missing `cost` defaults to one.

use crate::{
  egraph::{EGraph, EGraphBuilder, EGraphError, Node, OpTable},
  id::{ClassId, NodeId, OpId, ParseIdError},
};
use indexmap::IndexMap;
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};
use std::{
  fs::File,
  io::{BufReader, BufWriter, Read, Write},
  path::Path,
};
use thiserror::Error;

/// An error while reading or writing a serialized e-graph.
#[derive(Debug, Error)]
pub enum SerializeError {
  #[error(transparent)]
  Json(#[from] serde_json::Error),
  #[error(transparent)]
  Io(#[from] std::io::Error),
  #[error("invalid id {text:?}")]
  InvalidId {
    text: String,
    #[source]
    source: ParseIdError,
  },
  #[error("id {0} does not fit in 32 bits")]
  IdOutOfRange(u64),
  #[error("node {node} uses op index {index}, but the op table has {len} entries")]
  UnknownOpIndex { node: NodeId, index: u64, len: usize },
  #[error(transparent)]
  EGraph(#[from] EGraphError),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
  Num(u64),
  Str(String),
}

impl RawId {
  fn to_u32(&self) -> Result<u32, SerializeError> {
    match self {
      RawId::Num(n) => {
        u32::try_from(*n).map_err(|_| SerializeError::IdOutOfRange(*n))
      }
      RawId::Str(s) => parse_u32(s),
    }
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOp {
  Index(u64),
  Name(String),
}

#[derive(Deserialize)]
struct RawNode {
  op: RawOp,
  #[serde(default)]
  children: Vec<RawId>,
  eclass: RawId,
  #[serde(default)]
  cost: Option<f64>,
}

#[derive(Deserialize)]
struct RawEGraph {
  nodes: IndexMap<String, IndexMap<String, RawNode>>,
  #[serde(default)]
  root_eclasses: Vec<RawId>,
  #[serde(default)]
  op: Option<Vec<String>>,
}

#[derive(Serialize)]
struct WireNode<'a> {
  op: u32,
  children: &'a [ClassId],
  eclass: ClassId,
  cost: f64,
}

#[derive(Serialize)]
struct WireEGraph<'a> {
  nodes: IndexMap<String, IndexMap<String, WireNode<'a>>>,
  root_eclasses: &'a [ClassId],
  op: Vec<&'a str>,
}

fn parse_u32(s: &str) -> Result<u32, SerializeError> {
  s.parse::<ClassId>()
    .map(ClassId::value)
    .map_err(|source| SerializeError::InvalidId {
      text: s.to_owned(),
      source,
    })
}

impl RawEGraph {
  fn into_builder(self) -> Result<EGraphBuilder, SerializeError> {
    let ops = match self.op {
      Some(names) => OpTable::from_names(names)?,
      None => OpTable::new(),
    };
    let table_len = ops.len();
    let mut builder = EGraphBuilder::with_ops(ops);

    for (class_key, class_nodes) in self.nodes {
      let class = parse_u32(&class_key)?;
      for (index_key, raw) in class_nodes {
        let node_id = NodeId([class, parse_u32(&index_key)?]);
        let op = match raw.op {
          RawOp::Index(index) if (index as usize) < table_len => {
            OpId(index as u32)
          }
          RawOp::Index(index) => {
            return Err(SerializeError::UnknownOpIndex {
              node: node_id,
              index,
              len: table_len,
            });
          }
          RawOp::Name(name) => builder.intern_op(&name),
        };
        let children = raw
          .children
          .iter()
          .map(|c| c.to_u32().map(ClassId))
          .collect::<Result<Vec<_>, _>>()?;
        let eclass = ClassId(raw.eclass.to_u32()?);
        let cost = NotNan::new(raw.cost.unwrap_or(1.0))
          .map_err(|_| EGraphError::NanCost(node_id))?;
        builder.add_node(node_id, Node::new(op, children, eclass, cost))?;
      }
    }
    for root in &self.root_eclasses {
      builder.add_root(ClassId(root.to_u32()?));
    }
    Ok(builder)
  }
}

/// Parses an e-graph from JSON text into an open builder.
///
/// # Errors
/// Fails on malformed JSON, unparsable ids, unknown op indices, duplicate
/// nodes, or invalid costs. Dangling references are reported later, by
/// [`EGraphBuilder::build`].
pub fn from_json_str(json: &str) -> Result<EGraphBuilder, SerializeError> {
  let raw: RawEGraph = serde_json::from_str(json)?;
  raw.into_builder()
}

/// Parses an e-graph from a JSON reader into an open builder.
///
/// # Errors
/// See [`from_json_str`].
pub fn from_json_reader<R: Read>(
  reader: R,
) -> Result<EGraphBuilder, SerializeError> {
  let raw: RawEGraph = serde_json::from_reader(reader)?;
  raw.into_builder()
}

/// Parses an e-graph from a JSON file into an open builder.
///
/// # Errors
/// See [`from_json_str`]; also fails if the file cannot be opened.
pub fn from_json_file(
  path: impl AsRef<Path>,
) -> Result<EGraphBuilder, SerializeError> {
  let file = File::open(path)?;
  from_json_reader(BufReader::new(file))
}

fn to_wire(egraph: &EGraph) -> WireEGraph<'_> {
  let mut nodes: IndexMap<String, IndexMap<String, WireNode<'_>>> =
    IndexMap::new();
  for (node_id, node) in egraph.nodes() {
    nodes
      .entry(node_id.class().to_string())
      .or_default()
      .insert(
        node_id.index().to_string(),
        WireNode {
          op: node.op.0,
          children: &node.children,
          eclass: node.eclass,
          cost: node.cost.into_inner(),
        },
      );
  }
  WireEGraph {
    nodes,
    root_eclasses: egraph.root_eclasses(),
    op: egraph.ops().iter().collect(),
  }
}

/// Writes `egraph` as JSON, using the op-table form.
///
/// # Errors
/// Fails if serialization fails.
pub fn to_json_string(egraph: &EGraph) -> Result<String, SerializeError> {
  Ok(serde_json::to_string_pretty(&to_wire(egraph))?)
}

/// Writes `egraph` as JSON to a file, using the op-table form.
///
/// # Errors
/// Fails if the file cannot be created or written.
pub fn to_json_file(
  egraph: &EGraph,
  path: impl AsRef<Path>,
) -> Result<(), SerializeError> {
  let mut writer = BufWriter::new(File::create(path)?);
  serde_json::to_writer_pretty(&mut writer, &to_wire(egraph))?;
  writer.flush()?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  const INDEXED: &str = r#"{
    "nodes": {
      "0": { "0": { "op": 0, "children": [], "eclass": 0, "cost": 1 } },
      "1": {
        "0": { "op": 1, "children": [0, 0], "eclass": "1", "cost": 2.5 },
        "1": { "op": 2, "children": ["0"], "eclass": 1 }
      }
    },
    "root_eclasses": ["1"],
    "op": ["x", "and", "not"]
  }"#;

  #[test]
  fn reads_indexed_ops_and_string_ids() {
    let egraph = from_json_str(INDEXED).unwrap().build().unwrap();
    assert_eq!(egraph.num_nodes(), 3);
    assert_eq!(egraph.root_eclasses(), &[ClassId(1)]);
    let and = &egraph[&NodeId::from((1, 0))];
    assert_eq!(egraph.op_name(and), Some("and"));
    assert_eq!(and.children, vec![ClassId(0), ClassId(0)]);
    assert_eq!(and.cost.into_inner(), 2.5);
    let not = &egraph[&NodeId::from((1, 1))];
    assert_eq!(not.cost.into_inner(), 1.0);
  }

  #[test]
  fn string_ops_normalize_to_the_same_table() {
    let named = r#"{
      "nodes": {
        "0": { "0": { "op": "x", "children": [], "eclass": 0, "cost": 1 } },
        "1": {
          "0": { "op": "and", "children": [0, 0], "eclass": 1, "cost": 2.5 },
          "1": { "op": "not", "children": [0], "eclass": 1 }
        }
      },
      "root_eclasses": [1]
    }"#;
    let a = from_json_str(INDEXED).unwrap().build().unwrap();
    let b = from_json_str(named).unwrap().build().unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn written_json_reads_back() {
    let egraph = from_json_str(INDEXED).unwrap().build().unwrap();
    let json = to_json_string(&egraph).unwrap();
    let again = from_json_str(&json).unwrap().build().unwrap();
    assert_eq!(egraph, again);
  }

  #[test]
  fn malformed_records_are_errors() {
    let bad_op = r#"{ "nodes": { "0": { "0":
      { "op": 5, "children": [], "eclass": 0 } } }, "op": ["x"] }"#;
    assert!(matches!(
      from_json_str(bad_op),
      Err(SerializeError::UnknownOpIndex { index: 5, .. })
    ));

    let bad_id = r#"{ "nodes": { "zero": { "0":
      { "op": "x", "children": [], "eclass": 0 } } } }"#;
    assert!(matches!(
      from_json_str(bad_id),
      Err(SerializeError::InvalidId { .. })
    ));

    let wrong_class = r#"{ "nodes": { "0": { "0":
      { "op": "x", "children": [], "eclass": 3 } } } }"#;
    assert!(matches!(
      from_json_str(wrong_class),
      Err(SerializeError::EGraph(EGraphError::ClassMismatch { .. }))
    ));

    let dangling = r#"{ "nodes": { "0": { "0":
      { "op": "f", "children": [4], "eclass": 0 } } } }"#;
    assert!(matches!(
      from_json_str(dangling).unwrap().build(),
      Err(EGraphError::DanglingChild { .. })
    ));
  }

  #[test]
  fn largest_local_index_is_rejected() {
    let last = r#"{ "nodes": { "0": { "4294967295":
      { "op": "x", "children": [], "eclass": 0 } } },
      "root_eclasses": [0] }"#;
    assert!(matches!(
      from_json_str(last),
      Err(SerializeError::EGraph(EGraphError::IndexOutOfRange(node)))
        if node == NodeId::from((0, u32::MAX))
    ));

    let below = r#"{ "nodes": { "0": { "4294967294":
      { "op": "x", "children": [], "eclass": 0 } } },
      "root_eclasses": [0] }"#;
    let egraph = from_json_str(below).unwrap().build().unwrap();
    assert_eq!(egraph.num_nodes(), 1);
  }
}
