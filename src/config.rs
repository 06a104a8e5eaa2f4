//! Extraction settings, loadable from a TOML file.
//!
//! ```toml
//! extractor = "parallel-greedy-dag"
//! passes = 2
//! threads = 8
//! timeout_secs = 600
//! bound = 1.25
//! ```

use crate::{egraph::Cost, extract::ExtractorKind};
use anyhow::Context;
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};
use thiserror::Error;

/// Configuration for an extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractConfig {
  /// Which extractor to run
  pub extractor: ExtractorKind,
  /// Number of fixpoint passes. Every pass after the first requeues all
  /// nodes once the queue has emptied.
  pub passes: usize,
  /// Reject a single-child candidate early unless it beats the class's
  /// current best
  pub prune_single_child: bool,
  /// Worker threads for the parallel extractor; `None` uses rayon's default
  pub threads: Option<usize>,
  /// Nodes evaluated per synchronous round of the parallel extractor
  pub batch_size: usize,
  /// Wall-clock budget for one extraction
  pub timeout_secs: Option<u64>,
  /// Whether to remove redundant nodes before extraction
  pub canonicalize: bool,
  /// Nodes costing more than `bound` times their class's cheapest candidate
  /// are hinted to zero for an exact solver
  pub bound: f64,
}

impl Default for ExtractConfig {
  fn default() -> Self {
    Self {
      extractor: ExtractorKind::GreedyDag,
      passes: 1,
      prune_single_child: true,
      threads: None,
      batch_size: 8192,
      timeout_secs: None,
      canonicalize: true,
      bound: 1.25,
    }
  }
}

/// An invalid configuration value.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
  #[error("passes must be at least 1")]
  NoPasses,
  #[error("batch_size must be at least 1")]
  EmptyBatch,
  #[error("threads must be at least 1 when given")]
  NoThreads,
  #[error("bound must be a finite number >= 1, got {0}")]
  InvalidBound(f64),
}

impl ExtractConfig {
  /// Reads a configuration from a TOML file. Missing keys take their default
  /// values.
  ///
  /// # Errors
  /// Fails if the file can't be read, doesn't parse, or holds invalid values.
  pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
      .with_context(|| format!("failed to read {}", path.display()))?;
    let config: Self = toml::from_str(&contents)
      .with_context(|| format!("failed to parse {}", path.display()))?;
    config.validate()?;
    Ok(config)
  }

  /// # Errors
  /// Fails on the first out-of-range value.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.passes == 0 {
      return Err(ConfigError::NoPasses);
    }
    if self.batch_size == 0 {
      return Err(ConfigError::EmptyBatch);
    }
    if self.threads == Some(0) {
      return Err(ConfigError::NoThreads);
    }
    self.zero_node_bound()?;
    Ok(())
  }

  /// `bound` as a cost factor.
  ///
  /// # Errors
  /// Fails if the bound is out of range.
  pub fn zero_node_bound(&self) -> Result<Cost, ConfigError> {
    if !self.bound.is_finite() || self.bound < 1.0 {
      return Err(ConfigError::InvalidBound(self.bound));
    }
    NotNan::new(self.bound).map_err(|_| ConfigError::InvalidBound(self.bound))
  }

  #[must_use]
  pub fn timeout(&self) -> Option<Duration> {
    self.timeout_secs.map(Duration::from_secs)
  }
}
