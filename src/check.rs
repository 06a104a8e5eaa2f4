//! Validation of an [`ExtractionResult`] against the graph it came from.

use crate::{
  egraph::{EGraph, Node},
  id::{ClassId, NodeId},
  result::ExtractionResult,
};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Ways in which an extraction can be wrong.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CheckError {
  /// The graph declares no roots, so there is nothing to cover
  #[error("the e-graph has no root classes")]
  NoRoots,
  #[error("root class {0} has no choice")]
  MissingRoot(ClassId),
  #[error("class {class} chose node {node}, which is not in the e-graph")]
  UnknownNode { class: ClassId, node: NodeId },
  #[error("class {class} chose node {node}, which belongs to class {eclass}")]
  ClassMismatch {
    class: ClassId,
    node: NodeId,
    eclass: ClassId,
  },
  /// A class reachable from the roots has no choice
  #[error("class {0} is needed but has no choice")]
  MissingChoice(ClassId),
  #[error("class {0} is not in the e-graph")]
  UnknownClass(ClassId),
  /// The chosen nodes form a cycle through these classes
  #[error("the choices form a cycle through classes {0:?}")]
  Cycle(Vec<ClassId>),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
  Grey,
  Black,
}

enum Frame<'a> {
  Enter(ClassId),
  Exit(ClassId, NodeId, &'a Node),
}

/// Walks the choices reachable from `roots` depth first and calls `visit`
/// on every class once, after all of its children. Fails on the first
/// cycle met, naming the classes on it in path order.
pub(crate) fn post_order<'a, F>(
  result: &ExtractionResult,
  egraph: &'a EGraph,
  roots: &[ClassId],
  mut visit: F,
) -> Result<(), CheckError>
where
  F: FnMut(ClassId, NodeId, &'a Node) -> Result<(), CheckError>,
{
  let mut color: FxHashMap<ClassId, Color> = FxHashMap::default();
  let mut path: Vec<ClassId> = Vec::new();
  let mut stack: Vec<Frame<'a>> =
    roots.iter().rev().map(|r| Frame::Enter(*r)).collect();

  while let Some(frame) = stack.pop() {
    match frame {
      Frame::Enter(class) => match color.get(&class) {
        Some(Color::Black) => {}
        Some(Color::Grey) => {
          let start = path.iter().position(|c| *c == class).unwrap_or(0);
          return Err(CheckError::Cycle(path[start..].to_vec()));
        }
        None => {
          if egraph.class(&class).is_none() {
            return Err(CheckError::UnknownClass(class));
          }
          let node_id =
            result.choice(&class).ok_or(CheckError::MissingChoice(class))?;
          let node = egraph
            .node(&node_id)
            .ok_or(CheckError::UnknownNode { class, node: node_id })?;
          if node.eclass != class {
            return Err(CheckError::ClassMismatch {
              class,
              node: node_id,
              eclass: node.eclass,
            });
          }
          color.insert(class, Color::Grey);
          path.push(class);
          stack.push(Frame::Exit(class, node_id, node));
          stack.extend(node.children.iter().rev().map(|c| Frame::Enter(*c)));
        }
      },
      Frame::Exit(class, node_id, node) => {
        color.insert(class, Color::Black);
        path.pop();
        visit(class, node_id, node)?;
      }
    }
  }
  Ok(())
}

impl ExtractionResult {
  /// Checks that the result is a valid extraction of `egraph`'s roots: every
  /// root is chosen, every choice names a node of its own class, every class
  /// below the roots is chosen, and the choices are acyclic.
  ///
  /// # Errors
  /// Returns the first violation found.
  pub fn check(&self, egraph: &EGraph) -> Result<(), CheckError> {
    let roots = egraph.root_eclasses();
    if roots.is_empty() {
      return Err(CheckError::NoRoots);
    }
    if let Some(root) = roots.iter().find(|r| self.choice(r).is_none()) {
      return Err(CheckError::MissingRoot(*root));
    }
    for (class, node_id) in self.choices() {
      let node = egraph.node(node_id).ok_or(CheckError::UnknownNode {
        class: *class,
        node: *node_id,
      })?;
      if node.eclass != *class {
        return Err(CheckError::ClassMismatch {
          class: *class,
          node: *node_id,
          eclass: node.eclass,
        });
      }
    }
    post_order(self, egraph, roots, |_, _, _| Ok(()))
  }
}
