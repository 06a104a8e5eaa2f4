//! A log of improving incumbents, one `<elapsed-seconds>: <objective>` line
//! each.

use nom::{
  IResult,
  bytes::complete::tag,
  character::complete::space0,
  combinator::all_consuming,
  number::complete::double,
  sequence::{separated_pair, terminated},
};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use thiserror::Error;

/// One line of the log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Incumbent {
  pub elapsed: f64,
  pub objective: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CostLogError {
  #[error("line {line}: cannot parse {text:?}")]
  Syntax { line: usize, text: String },
  /// Elapsed time did not advance, or the objective did not improve
  #[error("line {line}: not an improvement on the previous incumbent")]
  NotMonotone { line: usize },
}

/// Writes a line for every incumbent that improves on the last one written.
#[derive(Debug)]
pub struct IncumbentLog<W: Write> {
  writer: W,
  best: Option<Incumbent>,
}

impl<W: Write> IncumbentLog<W> {
  pub fn new(writer: W) -> Self {
    Self { writer, best: None }
  }

  /// Logs an incumbent if its objective is strictly lower than the best so
  /// far and it was found strictly later than that one. Returns whether a
  /// line was written.
  ///
  /// # Errors
  /// Fails if writing fails.
  pub fn record(
    &mut self,
    elapsed_secs: f64,
    objective: f64,
  ) -> io::Result<bool> {
    if !elapsed_secs.is_finite() || !objective.is_finite() {
      return Ok(false);
    }
    if let Some(best) = self.best {
      if elapsed_secs <= best.elapsed || objective >= best.objective {
        return Ok(false);
      }
    }
    writeln!(self.writer, "{elapsed_secs}: {objective}")?;
    self.writer.flush()?;
    self.best = Some(Incumbent {
      elapsed: elapsed_secs,
      objective,
    });
    Ok(true)
  }

  #[must_use]
  pub fn best(&self) -> Option<Incumbent> {
    self.best
  }

  pub fn into_inner(self) -> W {
    self.writer
  }
}

fn incumbent(input: &str) -> IResult<&str, (f64, f64)> {
  all_consuming(separated_pair(double, terminated(tag(":"), space0), double))(
    input,
  )
}

/// Reads a log back. Blank lines are skipped.
///
/// # Errors
/// Fails on a malformed line, or if the lines are not successive
/// improvements.
pub fn parse_cost_log(text: &str) -> Result<Vec<Incumbent>, CostLogError> {
  let mut incumbents: Vec<Incumbent> = Vec::new();
  for (i, raw) in text.lines().enumerate() {
    let line = i + 1;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
      continue;
    }
    let (_, (elapsed, objective)) =
      incumbent(trimmed).map_err(|_| CostLogError::Syntax {
        line,
        text: trimmed.to_owned(),
      })?;
    if let Some(last) = incumbents.last() {
      if elapsed <= last.elapsed || objective >= last.objective {
        return Err(CostLogError::NotMonotone { line });
      }
    }
    incumbents.push(Incumbent { elapsed, objective });
  }
  Ok(incumbents)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_improvements_are_logged() {
    let mut log = IncumbentLog::new(Vec::new());
    assert!(log.record(0.5, 120.0).unwrap());
    assert!(!log.record(0.7, 120.0).unwrap());
    assert!(log.record(1.25, 98.5).unwrap());
    assert!(!log.record(1.0, 90.0).unwrap());
    assert!(!log.record(1.25, 90.0).unwrap());
    assert!(!log.record(2.0, f64::NAN).unwrap());
    assert!(log.record(3.0, 97.0).unwrap());
    assert_eq!(
      log.best(),
      Some(Incumbent {
        elapsed: 3.0,
        objective: 97.0
      })
    );

    let text = String::from_utf8(log.into_inner()).unwrap();
    assert_eq!(text, "0.5: 120\n1.25: 98.5\n3: 97\n");
    let parsed = parse_cost_log(&text).unwrap();
    assert_eq!(parsed.len(), 3);
    assert_eq!(parsed[1].objective, 98.5);
  }

  #[test]
  fn bad_logs_are_rejected() {
    assert!(matches!(
      parse_cost_log("0.1: 5\nfast: 4\n"),
      Err(CostLogError::Syntax { line: 2, .. })
    ));
    assert_eq!(
      parse_cost_log("0.1: 5\n0.2: 6\n"),
      Err(CostLogError::NotMonotone { line: 2 })
    );
    assert_eq!(
      parse_cost_log("0.1: 5\n0.1: 4\n"),
      Err(CostLogError::NotMonotone { line: 2 })
    );
    assert_eq!(parse_cost_log("\n2.5:3e2\n").unwrap()[0].objective, 300.0);
  }
}
