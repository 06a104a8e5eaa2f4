//! Identifiers for e-classes, e-nodes and interned operators.
//!
//! All three are plain integers so that the graph can be stored as owned
//! tables indexed by id rather than as a web of references.

use serde::{Deserialize, Serialize};
use std::{
  fmt::{self, Display, Formatter},
  num::ParseIntError,
  str::FromStr,
};
use thiserror::Error;

/// The identity of an equivalence class.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Default,
  Serialize,
  Deserialize,
)]
pub struct ClassId(pub u32);

/// The identity of a node: the owning class followed by a local index that
/// disambiguates nodes within that class.
///
/// Ordering is lexicographic on `(class, index)`.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Default,
  Serialize,
  Deserialize,
)]
pub struct NodeId(pub [u32; 2]);

/// An index into an [`OpTable`](crate::egraph::OpTable).
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Default,
  Serialize,
  Deserialize,
)]
pub struct OpId(pub u32);

impl ClassId {
  #[must_use]
  pub fn value(self) -> u32 {
    self.0
  }
}

impl NodeId {
  #[must_use]
  pub fn new(class: ClassId, index: u32) -> Self {
    NodeId([class.0, index])
  }

  /// The class component of this id.
  #[must_use]
  pub fn class(self) -> ClassId {
    ClassId(self.0[0])
  }

  /// The local index of this node within its class.
  #[must_use]
  pub fn index(self) -> u32 {
    self.0[1]
  }
}

impl From<u32> for ClassId {
  fn from(value: u32) -> Self {
    ClassId(value)
  }
}

impl From<(u32, u32)> for NodeId {
  fn from(value: (u32, u32)) -> Self {
    NodeId([value.0, value.1])
  }
}

impl From<OpId> for usize {
  fn from(op: OpId) -> Self {
    op.0 as usize
  }
}

impl Display for ClassId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl Display for NodeId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.0[0], self.0[1])
  }
}

impl Display for OpId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "op{}", self.0)
  }
}

/// An error when parsing a [`ClassId`] or [`NodeId`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseIdError {
  /// A node id was not of the form `<class>.<index>`
  #[error("expected node id of the form '<class>.<index>', got {0:?}")]
  MissingDot(String),
  /// A component is not a valid unsigned integer
  #[error("invalid id component {text:?}: {source}")]
  InvalidComponent {
    text: String,
    #[source]
    source: ParseIntError,
  },
}

fn parse_component(s: &str) -> Result<u32, ParseIdError> {
  s.trim()
    .parse()
    .map_err(|source| ParseIdError::InvalidComponent {
      text: s.to_owned(),
      source,
    })
}

impl FromStr for ClassId {
  type Err = ParseIdError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    parse_component(s).map(ClassId)
  }
}

impl FromStr for NodeId {
  type Err = ParseIdError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (class, index) = s
      .split_once('.')
      .ok_or_else(|| ParseIdError::MissingDot(s.to_owned()))?;
    Ok(NodeId([parse_component(class)?, parse_component(index)?]))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn node_ids_order_by_class_then_index() {
    let mut ids = vec![
      NodeId::from((2, 0)),
      NodeId::from((1, 5)),
      NodeId::from((1, 2)),
    ];
    ids.sort();
    assert_eq!(
      ids,
      vec![NodeId::from((1, 2)), NodeId::from((1, 5)), NodeId::from((2, 0))]
    );
    assert_eq!(ids[0].class(), ClassId(1));
    assert_eq!(ids[0].index(), 2);
  }

  #[test]
  fn display_and_parse_agree() {
    let nid = NodeId::from((17, 3));
    assert_eq!(nid.to_string(), "17.3");
    assert_eq!("17.3".parse::<NodeId>(), Ok(nid));
    assert_eq!(" 42 ".parse::<ClassId>(), Ok(ClassId(42)));
  }

  #[test]
  fn malformed_ids_are_rejected() {
    assert!(matches!(
      "17".parse::<NodeId>(),
      Err(ParseIdError::MissingDot(_))
    ));
    assert!(matches!(
      "a.1".parse::<NodeId>(),
      Err(ParseIdError::InvalidComponent { .. })
    ));
    assert!("-1".parse::<ClassId>().is_err());
  }
}
