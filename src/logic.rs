//! Core behaviors behind the CLI commands.
//!
//! This includes:
//!   - reading attempt histories from JSON files
//!   - the stateless "train then pick" path used for one-off requests
//!   - rendering the full table with its per-level policy
//!   - parsing answer outcomes given on the command line

use std::path::Path;

use tracing::{debug, instrument};

use crate::domain::{HistoryRecord, ModelParams};
use crate::error::{Result, SelectorError};
use crate::model::{select_difficulty, train};
use crate::protocol::{Recommendation, TableOut};

#[instrument(level = "debug", skip(path), fields(path = %path.display()))]
pub fn load_history(path: &Path) -> Result<Vec<HistoryRecord>> {
  let raw = std::fs::read_to_string(path)?;
  let history: Vec<HistoryRecord> = serde_json::from_str(&raw)?;
  debug!(target: "adaptive_difficulty", records = history.len(), "Loaded history file");
  Ok(history)
}

/// Retrain from the full history and pick a difficulty for `performance_level`.
#[instrument(level = "info", skip(history, params), fields(records = history.len()))]
pub fn recommend_from_history(
  history: &[HistoryRecord],
  params: &ModelParams,
  performance_level: i64,
) -> Result<Recommendation> {
  let table = train(history, params)?;
  let difficulty = select_difficulty(&table, performance_level)?;
  Ok(Recommendation { difficulty, performance_level, history_len: history.len() })
}

pub fn table_report(history: &[HistoryRecord], params: &ModelParams) -> Result<TableOut> {
  let table = train(history, params)?;
  let policy = (0..table.num_states() as i64)
    .map(|level| select_difficulty(&table, level))
    .collect::<Result<Vec<_>>>()?;
  Ok(TableOut { table, policy })
}

/// Parse "true,false,1,0" style outcome lists.
pub fn parse_outcomes(s: &str) -> Result<Vec<bool>> {
  s.split(',')
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .map(|t| match t.to_ascii_lowercase().as_str() {
      "true" | "t" | "1" | "yes" => Ok(true),
      "false" | "f" | "0" | "no" => Ok(false),
      other => Err(SelectorError::Config(format!("unrecognised outcome '{}'", other))),
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn seed_history_file_recommends_three() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(f, "[[5,3,1],[5,4,0],[7,5,1],[7,6,1],[4,5,0],[3,2,1]]").unwrap();
    let history = load_history(f.path()).unwrap();
    assert_eq!(history.len(), 6);

    let rec = recommend_from_history(&history, &ModelParams::default(), 5).unwrap();
    assert_eq!(rec, Recommendation { difficulty: 3, performance_level: 5, history_len: 6 });
  }

  #[test]
  fn table_report_lists_a_policy_per_level() {
    let history = vec![HistoryRecord::new(7, 6, true), HistoryRecord::new(0, 2, true)];
    let report = table_report(&history, &ModelParams::default()).unwrap();
    assert_eq!(report.policy.len(), 11);
    assert_eq!(report.policy[7], 6);
    assert_eq!(report.policy[0], 2);
    assert_eq!(report.policy[10], 1);
  }

  #[test]
  fn invalid_history_surfaces_the_record() {
    let history = vec![HistoryRecord::new(3, 2, true), HistoryRecord::new(12, 2, true)];
    let err = recommend_from_history(&history, &ModelParams::default(), 5).unwrap_err();
    assert!(matches!(err, SelectorError::InvalidRecord { index: 1, performance_level: 12, .. }));
  }

  #[test]
  fn malformed_history_file_is_a_json_error() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(f, "[[5, 3]]").unwrap();
    assert!(matches!(load_history(f.path()), Err(SelectorError::Json(_))));
  }

  #[test]
  fn outcomes_parse() {
    assert_eq!(parse_outcomes("true, false,1,0,").unwrap(), vec![true, false, true, false]);
    assert!(parse_outcomes("").unwrap().is_empty());
    assert!(parse_outcomes("true,maybe").is_err());
  }
}
