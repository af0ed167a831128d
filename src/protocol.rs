//! Public output structs for the CLI (serde ready).
//! Keep this small and stable so scripts consuming the JSON don't break.

use serde::{Deserialize, Serialize};

use crate::model::ValueTable;

/// Result of recording one batch of answers for a student.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSummary {
  pub total: usize,
  pub correct: usize,
  pub wrong: usize,
  /// Window level after the last answer of the batch.
  pub performance_level: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
  pub difficulty: usize,
  pub performance_level: i64,
  pub history_len: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
  pub subject: String,
  pub correct: usize,
  pub total: usize,
}

/// `submit` prints what was recorded and what to serve next.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOut {
  pub summary: SubmitSummary,
  pub next: Recommendation,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOut {
  pub table: ValueTable,
  /// Best difficulty for every performance level, row by row.
  pub policy: Vec<usize>,
}
