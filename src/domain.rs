//! Domain models: history records, model parameters and student identity.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SelectorError};

/// One observed attempt: the student's performance level at the time, the
/// difficulty that was served (1-based) and whether the answer was correct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RecordRepr")]
pub struct HistoryRecord {
  pub performance_level: i64,
  pub difficulty_level: i64,
  pub correct: bool,
}

impl HistoryRecord {
  pub fn new(performance_level: i64, difficulty_level: i64, correct: bool) -> Self {
    Self { performance_level, difficulty_level, correct }
  }
}

impl From<(i64, i64, bool)> for HistoryRecord {
  fn from((performance_level, difficulty_level, correct): (i64, i64, bool)) -> Self {
    Self::new(performance_level, difficulty_level, correct)
  }
}

/// Wire shapes accepted for a record: `[5, 3, true]` (or `[5, 3, 1]`) and
/// `{"performanceLevel": 5, "difficultyLevel": 3, "correct": true}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordRepr {
  Tuple(i64, i64, Flag),
  #[serde(rename_all = "camelCase")]
  Object {
    performance_level: i64,
    difficulty_level: i64,
    correct: Flag,
  },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
  Bool(bool),
  Int(i64),
}

impl From<Flag> for bool {
  fn from(f: Flag) -> bool {
    match f {
      Flag::Bool(b) => b,
      Flag::Int(i) => i != 0,
    }
  }
}

impl From<RecordRepr> for HistoryRecord {
  fn from(r: RecordRepr) -> Self {
    match r {
      RecordRepr::Tuple(p, d, c) => Self::new(p, d, c.into()),
      RecordRepr::Object { performance_level, difficulty_level, correct } => {
        Self::new(performance_level, difficulty_level, correct.into())
      }
    }
  }
}

/// Largest table the selector will allocate (rows x columns).
pub const MAX_TABLE_CELLS: usize = 1 << 20;

/// `num_states * num_actions`, if it stays within `MAX_TABLE_CELLS`.
pub fn table_cells(num_states: usize, num_actions: usize) -> Option<usize> {
  num_states.checked_mul(num_actions).filter(|c| *c <= MAX_TABLE_CELLS)
}

/// Table dimensions and learning hyperparameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ModelParams {
  /// Number of performance levels (rows).
  pub num_states: usize,
  /// Number of difficulty levels (columns); difficulties run 1..=num_actions.
  pub num_actions: usize,
  /// Learning rate.
  pub alpha: f64,
  /// Discount factor.
  pub gamma: f64,
}

impl Default for ModelParams {
  fn default() -> Self {
    Self { num_states: 11, num_actions: 10, alpha: 0.1, gamma: 0.9 }
  }
}

impl ModelParams {
  /// Reject shapes and rates that would make the table meaningless.
  /// Rates outside (0, 1] are allowed but reported.
  pub fn validate(&self) -> Result<()> {
    if self.num_states == 0 || self.num_actions == 0 {
      return Err(SelectorError::InvalidParams(format!(
        "table shape must be non-empty, got {}x{}",
        self.num_states, self.num_actions
      )));
    }
    if table_cells(self.num_states, self.num_actions).is_none() {
      return Err(SelectorError::InvalidParams(format!(
        "table shape {}x{} exceeds {} cells",
        self.num_states, self.num_actions, MAX_TABLE_CELLS
      )));
    }
    if !self.alpha.is_finite() || !self.gamma.is_finite() {
      return Err(SelectorError::InvalidParams(format!(
        "alpha and gamma must be finite, got alpha={} gamma={}",
        self.alpha, self.gamma
      )));
    }
    if !(self.alpha > 0.0 && self.alpha <= 1.0) || !(self.gamma > 0.0 && self.gamma <= 1.0) {
      warn!(target: "selector", alpha = self.alpha, gamma = self.gamma, "Learning parameters outside (0, 1]");
    }
    Ok(())
  }
}

/// A student's progress is tracked per subject.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudentKey {
  pub username: String,
  pub subject: String,
}

impl StudentKey {
  pub fn new(username: impl Into<String>, subject: impl Into<String>) -> Self {
    Self { username: username.into(), subject: subject.into() }
  }
}
