//! Extracting an acyclic, cost-minimizing selection of nodes from an e-graph.
//!
//! Both extractors here run the same greedy relaxation. Every class keeps the
//! cheapest realization found so far together with the cost of each class in
//! that realization's transitive closure, so that shared substructure is
//! billed once. When a class improves, the nodes that use it are queued for
//! re-evaluation; the run ends when the queue is empty.
//!
//! [`GreedyDagExtractor`] processes one node at a time.
//! [`ParallelGreedyDagExtractor`] evaluates batches of queued nodes on a
//! rayon pool against a frozen snapshot and merges the batch sequentially.
//! The [`bottom_up`] extractors run the same queue over a single number per
//! class and serve as tree-cost and depth baselines.

pub mod bottom_up;
pub mod greedy_dag;
pub mod parallel;
mod queue;

#[cfg(test)]
mod prop_test;

pub use bottom_up::{AstDepthExtractor, BottomUpExtractor};
pub use greedy_dag::GreedyDagExtractor;
pub use parallel::ParallelGreedyDagExtractor;

pub(crate) use queue::UniqueQueue;

use crate::{
  config::{ConfigError, ExtractConfig},
  egraph::EGraph,
  id::ClassId,
  result::ExtractionResult,
};
use itertools::Itertools;
use log::warn;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

/// Something that can pick one node per class needed by `roots`.
pub trait Extractor: Sync {
  /// Extracts a selection covering `roots`.
  ///
  /// # Errors
  /// Fails if some root has no acyclic realization, or if the extractor's
  /// budget runs out. A budget failure discards all partial progress.
  fn extract(
    &self,
    egraph: &EGraph,
    roots: &[ClassId],
  ) -> Result<ExtractionResult, ExtractError>;

  fn boxed(self) -> Box<dyn Extractor>
  where
    Self: Sized + 'static,
  {
    Box::new(self)
  }
}

/// The extractors that can be selected by name.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ExtractorKind {
  #[default]
  GreedyDag,
  ParallelGreedyDag,
  BottomUp,
  AstDepth,
}

impl ExtractorKind {
  /// Builds the extractor, configured from `config`.
  ///
  /// # Errors
  /// Fails if `config` does not validate.
  pub fn build(
    self,
    config: &ExtractConfig,
  ) -> Result<Box<dyn Extractor>, ExtractError> {
    config.validate()?;
    Ok(match self {
      ExtractorKind::GreedyDag => GreedyDagExtractor::new(config).boxed(),
      ExtractorKind::ParallelGreedyDag => {
        ParallelGreedyDagExtractor::new(config).boxed()
      }
      ExtractorKind::BottomUp => BottomUpExtractor::new(config).boxed(),
      ExtractorKind::AstDepth => AstDepthExtractor::new(config).boxed(),
    })
  }
}

fn join_classes(classes: &[ClassId]) -> String {
  classes.iter().join(", ")
}

#[derive(Debug, Error)]
pub enum ExtractError {
  /// The fixpoint finished without realizing these roots
  #[error("no acyclic realization for root classes [{}]", join_classes(.0))]
  UncoverableRoots(Vec<ClassId>),
  /// The wall-clock budget ran out; nothing was extracted
  #[error("extraction budget of {budget:?} exceeded after {elapsed:?}")]
  BudgetExceeded { budget: Duration, elapsed: Duration },
  #[error(transparent)]
  ThreadPool(#[from] rayon::ThreadPoolBuildError),
  #[error(transparent)]
  Config(#[from] ConfigError),
}

/// A wall-clock budget, started when the extraction starts.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
  start: Instant,
  limit: Option<Duration>,
}

impl Budget {
  #[must_use]
  pub fn start(limit: Option<Duration>) -> Self {
    Self {
      start: Instant::now(),
      limit,
    }
  }

  #[must_use]
  pub fn unlimited() -> Self {
    Self::start(None)
  }

  #[must_use]
  pub fn elapsed(&self) -> Duration {
    self.start.elapsed()
  }

  /// # Errors
  /// Fails once the elapsed time reaches the limit.
  pub fn check(&self) -> Result<(), ExtractError> {
    match self.limit {
      Some(budget) => {
        let elapsed = self.elapsed();
        if elapsed >= budget {
          warn!("Extraction budget of {budget:?} exceeded after {elapsed:?}");
          Err(ExtractError::BudgetExceeded { budget, elapsed })
        } else {
          Ok(())
        }
      }
      None => Ok(()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::str::FromStr;
  use strum::IntoEnumIterator;

  #[test]
  fn kinds_parse_from_their_names() {
    for kind in ExtractorKind::iter() {
      assert_eq!(ExtractorKind::from_str(&kind.to_string()), Ok(kind));
    }
    assert_eq!(
      "parallel-greedy-dag".parse::<ExtractorKind>(),
      Ok(ExtractorKind::ParallelGreedyDag)
    );
    assert_eq!(
      "bottom-up".parse::<ExtractorKind>(),
      Ok(ExtractorKind::BottomUp)
    );
    assert!("ilp".parse::<ExtractorKind>().is_err());
  }

  #[test]
  fn zero_budget_is_exceeded_immediately() {
    assert!(matches!(
      Budget::start(Some(Duration::ZERO)).check(),
      Err(ExtractError::BudgetExceeded { .. })
    ));
    assert!(Budget::unlimited().check().is_ok());
  }

  #[test]
  fn invalid_config_is_rejected_at_build() {
    let config = ExtractConfig {
      passes: 0,
      ..ExtractConfig::default()
    };
    assert!(matches!(
      ExtractorKind::GreedyDag.build(&config),
      Err(ExtractError::Config(ConfigError::NoPasses))
    ));
  }
}
