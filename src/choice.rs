//! The text format used to pass decisions to and from an exact solver.
//!
//! Each line sets one 0/1 variable:
//!
//! ```text
//! N_3_1 1    # node 1 of class 3 is chosen
//! A_7 0      # class 7 is not active
//! ```
//!
//! Values written by solvers may be reals (`9.9999e-01`) and are rounded. A
//! node line without a value, as in a plain list of nodes forced to zero,
//! reads as 0.

use crate::{
  check::CheckError,
  egraph::EGraph,
  id::{ClassId, NodeId},
  result::ExtractionResult,
};
use log::debug;
use nom::{
  IResult,
  branch::alt,
  bytes::complete::tag,
  character::complete::{char, space1, u32 as decimal},
  combinator::{all_consuming, map, opt},
  number::complete::double,
  sequence::{pair, preceded, separated_pair},
};
use rustc_hash::FxHashSet;
use std::{
  fmt::{self, Display, Formatter},
  fs::{self, File},
  io::{self, BufWriter, Write},
  path::Path,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChoiceError {
  #[error("line {line}: cannot parse {text:?}")]
  Syntax { line: usize, text: String },
  #[error("line {line}: value {value} does not round to 0 or 1")]
  InvalidValue { line: usize, value: f64 },
  /// Two different nodes of one class are both set to 1
  #[error("class {class} chooses both {first} and {second}")]
  Conflict {
    class: ClassId,
    first: NodeId,
    second: NodeId,
  },
  #[error(transparent)]
  Io(#[from] io::Error),
}

/// One variable assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
  Node(NodeId, bool),
  Class(ClassId, bool),
}

impl Display for Decision {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      Decision::Node(node, value) => {
        write!(f, "N_{}_{} {}", node.class(), node.index(), u8::from(*value))
      }
      Decision::Class(class, value) => {
        write!(f, "A_{class} {}", u8::from(*value))
      }
    }
  }
}

enum Variable {
  Node(NodeId),
  Class(ClassId),
}

fn variable(input: &str) -> IResult<&str, Variable> {
  alt((
    map(
      preceded(tag("N_"), separated_pair(decimal, char('_'), decimal)),
      |(class, index)| Variable::Node(NodeId([class, index])),
    ),
    map(preceded(tag("A_"), decimal), |class| {
      Variable::Class(ClassId(class))
    }),
  ))(input)
}

fn assignment(input: &str) -> IResult<&str, (Variable, Option<f64>)> {
  all_consuming(pair(variable, opt(preceded(space1, double))))(input)
}

/// An ordered list of decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChoiceFile {
  decisions: Vec<Decision>,
}

impl ChoiceFile {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, decision: Decision) {
    self.decisions.push(decision);
  }

  #[must_use]
  pub fn decisions(&self) -> &[Decision] {
    &self.decisions
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.decisions.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.decisions.is_empty()
  }

  /// Warm-start hints from a heuristic extraction. Every chosen node that is
  /// reachable from the graph's roots is set to 1; the class of every other
  /// choice is set inactive.
  ///
  /// # Errors
  /// Fails if the choices below the roots are incomplete.
  pub fn warm_start(
    result: &ExtractionResult,
    egraph: &EGraph,
  ) -> Result<Self, CheckError> {
    let active: FxHashSet<NodeId> = result
      .active_nodes(egraph, egraph.root_eclasses())?
      .into_iter()
      .collect();
    let decisions = result
      .choices()
      .iter()
      .map(|(class, node)| {
        if active.contains(node) {
          Decision::Node(*node, true)
        } else {
          Decision::Class(*class, false)
        }
      })
      .collect();
    Ok(Self { decisions })
  }

  /// Sets every node in `nodes` to 0.
  #[must_use]
  pub fn zero_nodes(nodes: &[NodeId]) -> Self {
    Self {
      decisions: nodes.iter().map(|n| Decision::Node(*n, false)).collect(),
    }
  }

  /// Parses a choice file. Blank lines and lines starting with `#` are
  /// skipped.
  ///
  /// # Errors
  /// Fails on a line of any other shape, or on a value that is not 0 or 1.
  pub fn parse(text: &str) -> Result<Self, ChoiceError> {
    let mut decisions = Vec::new();
    for (i, raw) in text.lines().enumerate() {
      let line = i + 1;
      let trimmed = raw.trim();
      if trimmed.is_empty() || trimmed.starts_with('#') {
        continue;
      }
      let (_, (var, value)) =
        assignment(trimmed).map_err(|_| ChoiceError::Syntax {
          line,
          text: trimmed.to_owned(),
        })?;
      let value = match value {
        None => false,
        Some(v) if v.round() == 0.0 => false,
        Some(v) if v.round() == 1.0 => true,
        Some(value) => return Err(ChoiceError::InvalidValue { line, value }),
      };
      decisions.push(match var {
        Variable::Node(node) => Decision::Node(node, value),
        Variable::Class(class) => Decision::Class(class, value),
      });
    }
    Ok(Self { decisions })
  }

  /// # Errors
  /// Fails if the file cannot be read or does not parse.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ChoiceError> {
    Self::parse(&fs::read_to_string(path)?)
  }

  /// # Errors
  /// Fails if writing fails.
  pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
    for decision in &self.decisions {
      writeln!(writer, "{decision}")?;
    }
    Ok(())
  }

  /// # Errors
  /// Fails if the file cannot be written.
  pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ChoiceError> {
    let mut writer = BufWriter::new(File::create(path)?);
    self.write_to(&mut writer)?;
    writer.flush()?;
    Ok(())
  }

  /// The node ids set to 0, in file order.
  #[must_use]
  pub fn forced_zero(&self) -> Vec<NodeId> {
    self
      .decisions
      .iter()
      .filter_map(|d| match d {
        Decision::Node(node, false) => Some(*node),
        _ => None,
      })
      .collect()
  }

  /// Builds an extraction from the nodes set to 1. Nodes that are not in
  /// `egraph`, such as ones removed as redundant, are skipped.
  ///
  /// # Errors
  /// Fails if two different nodes of one class are set to 1.
  pub fn to_result(
    &self,
    egraph: &EGraph,
  ) -> Result<ExtractionResult, ChoiceError> {
    let mut result = ExtractionResult::new();
    let mut ignored = 0_usize;
    for decision in &self.decisions {
      let Decision::Node(node, true) = decision else {
        continue;
      };
      if egraph.node(node).is_none() {
        debug!("Ignoring unknown node {node}");
        ignored += 1;
        continue;
      }
      let class = node.class();
      match result.choice(&class) {
        Some(first) if first != *node => {
          return Err(ChoiceError::Conflict {
            class,
            first,
            second: *node,
          });
        }
        _ => result.choose(class, *node),
      }
    }
    if ignored > 0 {
      debug!("Ignored {ignored} chosen nodes not in the e-graph");
    }
    Ok(result)
  }
}

impl Display for ChoiceFile {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    for decision in &self.decisions {
      writeln!(f, "{decision}")?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    egraph::EGraphBuilder,
    extract::{Extractor, GreedyDagExtractor},
  };

  fn sample() -> EGraph {
    let mut b = EGraphBuilder::new();
    b.push(0, "x", &[], 1.0).unwrap();
    b.push(1, "y", &[], 1.0).unwrap();
    b.push(1, "f", &[0], 7.0).unwrap();
    b.push(2, "g", &[1], 1.0).unwrap();
    b.add_root(ClassId(2));
    b.build().unwrap()
  }

  #[test]
  fn warm_start_marks_inactive_classes() {
    let egraph = sample();
    let result = GreedyDagExtractor::default()
      .extract(&egraph, egraph.root_eclasses())
      .unwrap();
    let file = ChoiceFile::warm_start(&result, &egraph).unwrap();
    assert_eq!(file.to_string(), "A_0 0\nN_1_0 1\nN_2_0 1\n");

    let back = ChoiceFile::parse(&file.to_string()).unwrap();
    assert_eq!(back, file);
    let seeded = back.to_result(&egraph).unwrap();
    assert_eq!(seeded.check(&egraph), Ok(()));
    assert_eq!(
      seeded.dag_cost(&egraph, egraph.root_eclasses()),
      result.dag_cost(&egraph, egraph.root_eclasses())
    );
  }

  #[test]
  fn solver_output_is_rounded_and_comments_skipped() {
    let text = "# Objective value = 2\n\nN_1_0 9.99999e-01\nN_2_0 1\n\
                N_1_1 -0\nA_0 0.0000001\n";
    let file = ChoiceFile::parse(text).unwrap();
    assert_eq!(
      file.decisions(),
      &[
        Decision::Node(NodeId::from((1, 0)), true),
        Decision::Node(NodeId::from((2, 0)), true),
        Decision::Node(NodeId::from((1, 1)), false),
        Decision::Class(ClassId(0), false),
      ]
    );
    assert_eq!(file.forced_zero(), vec![NodeId::from((1, 1))]);
  }

  #[test]
  fn bare_node_lines_are_zero() {
    let file = ChoiceFile::parse("N_4_2\nN_5_0\n").unwrap();
    assert_eq!(
      file.forced_zero(),
      vec![NodeId::from((4, 2)), NodeId::from((5, 0))]
    );
    let zero = ChoiceFile::zero_nodes(&file.forced_zero());
    assert_eq!(zero.to_string(), "N_4_2 0\nN_5_0 0\n");
  }

  #[test]
  fn malformed_lines_are_rejected() {
    assert!(matches!(
      ChoiceFile::parse("N_1_0 1\nX_3 1\n"),
      Err(ChoiceError::Syntax { line: 2, .. })
    ));
    assert!(matches!(
      ChoiceFile::parse("N_1 1"),
      Err(ChoiceError::Syntax { line: 1, .. })
    ));
    assert!(matches!(
      ChoiceFile::parse("A_1 3"),
      Err(ChoiceError::InvalidValue { line: 1, .. })
    ));
  }

  #[test]
  fn unknown_nodes_are_ignored_and_conflicts_fail() {
    let egraph = sample();
    let file = ChoiceFile::parse("N_0_0 1\nN_0_9 1\nN_2_0 1\n").unwrap();
    let result = file.to_result(&egraph).unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result.choice(&ClassId(0)), Some(NodeId::from((0, 0))));

    let file = ChoiceFile::parse("N_1_0 1\nN_1_1 1\n").unwrap();
    assert!(matches!(
      file.to_result(&egraph),
      Err(ChoiceError::Conflict { class: ClassId(1), .. })
    ));
  }
}
