//! Greedy, sharing-aware extraction of acyclic expressions from e-graphs.
//!
//! An [`EGraph`] is loaded through [`serialize`], optionally shrunk by
//! [`canonicalize::remove_redundant_nodes`], and handed to an [`Extractor`].
//! The resulting [`ExtractionResult`] can be validated, costed as a tree or
//! a DAG, and written out as warm-start hints for an exact solver.

#![warn(
  clippy::all,
  clippy::pedantic,
  anonymous_parameters,
  elided_lifetimes_in_paths,
  missing_copy_implementations,
  unreachable_pub,
  unused_lifetimes
)]
#![allow(clippy::non_ascii_literal)]
#![allow(clippy::cast_possible_truncation, clippy::module_name_repetitions)]

pub mod canonicalize;
pub mod check;
pub mod choice;
pub mod config;
pub mod cost_log;
pub mod egraph;
pub mod extract;
pub mod id;
pub mod result;
pub mod serialize;

pub use check::CheckError;
pub use choice::{ChoiceError, ChoiceFile, Decision};
pub use config::{ConfigError, ExtractConfig};
pub use cost_log::{Incumbent, IncumbentLog, parse_cost_log};
pub use egraph::{
  Class, Cost, EGraph, EGraphBuilder, EGraphError, Node, OpTable,
};
pub use extract::{
  AstDepthExtractor, Budget, BottomUpExtractor, ExtractError, Extractor,
  ExtractorKind, GreedyDagExtractor, ParallelGreedyDagExtractor,
};
pub use id::{ClassId, NodeId, OpId, ParseIdError};
pub use result::ExtractionResult;
pub use serialize::SerializeError;
