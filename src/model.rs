//! Tabular Q-learning difficulty selector.
//!
//! Rows of the table are performance levels, columns are difficulty levels
//! (column `a` is difficulty `a + 1`). Every observation is a one-step update
//! anchored at its own state: the "next state" is the same performance level,
//! so the bootstrap term is the best value already in that row.
//!
//! Records are applied strictly in order; later records see the values written
//! by earlier ones, including earlier records for the same state.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::{table_cells, HistoryRecord, ModelParams, MAX_TABLE_CELLS};
use crate::error::{Result, SelectorError};

/// Dense `num_states x num_actions` table, stored row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "TableRepr", try_from = "TableRepr")]
pub struct ValueTable {
  num_states: usize,
  num_actions: usize,
  values: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableRepr {
  num_states: usize,
  num_actions: usize,
  values: Vec<Vec<f64>>,
}

impl From<ValueTable> for TableRepr {
  fn from(t: ValueTable) -> Self {
    let values = t.rows().map(|r| r.to_vec()).collect();
    Self { num_states: t.num_states, num_actions: t.num_actions, values }
  }
}

impl TryFrom<TableRepr> for ValueTable {
  type Error = SelectorError;

  fn try_from(r: TableRepr) -> Result<Self> {
    if r.num_states == 0 || r.num_actions == 0 {
      return Err(SelectorError::InvalidTable(format!(
        "shape must be non-empty, got {}x{}",
        r.num_states, r.num_actions
      )));
    }
    if table_cells(r.num_states, r.num_actions).is_none() {
      return Err(SelectorError::InvalidTable(format!(
        "shape {}x{} exceeds {} cells",
        r.num_states, r.num_actions, MAX_TABLE_CELLS
      )));
    }
    if r.values.len() != r.num_states {
      return Err(SelectorError::InvalidTable(format!(
        "expected {} rows, found {}",
        r.num_states,
        r.values.len()
      )));
    }
    for (i, row) in r.values.iter().enumerate() {
      if row.len() != r.num_actions {
        return Err(SelectorError::InvalidTable(format!(
          "row {} has {} columns, expected {}",
          i,
          row.len(),
          r.num_actions
        )));
      }
      if let Some(v) = row.iter().find(|v| !v.is_finite()) {
        return Err(SelectorError::InvalidTable(format!("row {} holds non-finite value {}", i, v)));
      }
    }
    let values = r.values.into_iter().flatten().collect();
    Ok(Self { num_states: r.num_states, num_actions: r.num_actions, values })
  }
}

impl ValueTable {
  /// All-zero table of the given shape.
  ///
  /// Panics if the shape does not fit in memory; `ModelParams::validate`
  /// rejects such shapes before any table is built from them.
  pub fn zeros(num_states: usize, num_actions: usize) -> Self {
    Self { num_states, num_actions, values: vec![0.0; num_states * num_actions] }
  }

  pub fn num_states(&self) -> usize { self.num_states }
  pub fn num_actions(&self) -> usize { self.num_actions }

  pub fn get(&self, state: usize, action: usize) -> Option<f64> {
    if state < self.num_states && action < self.num_actions {
      Some(self.values[state * self.num_actions + action])
    } else {
      None
    }
  }

  pub fn row(&self, state: usize) -> Option<&[f64]> {
    if state < self.num_states {
      let start = state * self.num_actions;
      Some(&self.values[start..start + self.num_actions])
    } else {
      None
    }
  }

  pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
    self.values.chunks(self.num_actions.max(1))
  }

  pub fn values(&self) -> &[f64] { &self.values }

  fn state_row(&self, performance_level: i64) -> Result<&[f64]> {
    usize::try_from(performance_level)
      .ok()
      .and_then(|s| self.row(s))
      .ok_or(SelectorError::InvalidState { performance_level, num_states: self.num_states })
  }
}

/// Immediate reward for one attempt.
///
/// Correct answers earn `1 + d/10`; wrong answers cost `ln(d + 1) / 5`, so a
/// miss on a harder question is penalised more.
pub fn reward(difficulty_level: i64, correct: bool) -> f64 {
  let d = difficulty_level as f64;
  if correct {
    1.0 + d / 10.0
  } else {
    -(d + 1.0).ln() / 5.0
  }
}

/// Map a record onto (row, column), or explain why it does not fit.
fn locate(record: &HistoryRecord, index: usize, num_states: usize, num_actions: usize) -> Result<(usize, usize)> {
  let state = usize::try_from(record.performance_level).ok().filter(|s| *s < num_states);
  let action = usize::try_from(record.difficulty_level)
    .ok()
    .filter(|d| (1..=num_actions).contains(d))
    .map(|d| d - 1);
  match (state, action) {
    (Some(s), Some(a)) => Ok((s, a)),
    _ => Err(SelectorError::InvalidRecord {
      index,
      performance_level: record.performance_level,
      difficulty_level: record.difficulty_level,
      num_states,
      num_actions,
    }),
  }
}

fn apply(table: &mut ValueTable, state: usize, action: usize, r: f64, alpha: f64, gamma: f64) {
  let start = state * table.num_actions;
  let row = &mut table.values[start..start + table.num_actions];
  let best_next = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  let q = row[action];
  row[action] += alpha * (r + gamma * best_next - q);
}

/// Train a fresh table from an ordered history.
///
/// Every record is validated before the table is built, so a bad record never
/// leaves a half-trained table behind. An empty history yields all zeros.
#[instrument(level = "debug", skip(history), fields(records = history.len()))]
pub fn train(history: &[HistoryRecord], params: &ModelParams) -> Result<ValueTable> {
  params.validate()?;
  let cells = history
    .iter()
    .enumerate()
    .map(|(i, rec)| locate(rec, i, params.num_states, params.num_actions))
    .collect::<Result<Vec<_>>>()?;

  let mut table = ValueTable::zeros(params.num_states, params.num_actions);
  for (rec, (state, action)) in history.iter().zip(cells) {
    apply(&mut table, state, action, reward(rec.difficulty_level, rec.correct), params.alpha, params.gamma);
  }
  debug!(target: "selector", records = history.len(), "Trained value table");
  Ok(table)
}

/// Apply a single record to a caller-owned table.
///
/// The table's own shape bounds the record; only `alpha` and `gamma` are read
/// from `params`. On error the table is untouched.
pub fn update(table: &mut ValueTable, record: &HistoryRecord, params: &ModelParams) -> Result<()> {
  let (state, action) = locate(record, 0, table.num_states, table.num_actions)?;
  apply(table, state, action, reward(record.difficulty_level, record.correct), params.alpha, params.gamma);
  Ok(())
}

/// Best difficulty (1-based) for a performance level. Ties go to the lowest difficulty.
pub fn select_difficulty(table: &ValueTable, performance_level: i64) -> Result<usize> {
  let row = table.state_row(performance_level)?;
  let mut best = 0;
  for (i, v) in row.iter().enumerate().skip(1) {
    if *v > row[best] {
      best = i;
    }
  }
  Ok(best + 1)
}

/// A table together with the parameters it was trained with, for callers
/// that keep learning across requests instead of retraining each time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifficultyModel {
  params: ModelParams,
  table: ValueTable,
}

impl DifficultyModel {
  pub fn new(params: ModelParams) -> Result<Self> {
    params.validate()?;
    Ok(Self { params, table: ValueTable::zeros(params.num_states, params.num_actions) })
  }

  pub fn fit(params: ModelParams, history: &[HistoryRecord]) -> Result<Self> {
    let table = train(history, &params)?;
    Ok(Self { params, table })
  }

  pub fn observe(&mut self, record: &HistoryRecord) -> Result<()> {
    update(&mut self.table, record, &self.params)
  }

  pub fn recommend(&self, performance_level: i64) -> Result<usize> {
    select_difficulty(&self.table, performance_level)
  }

  pub fn table(&self) -> &ValueTable { &self.table }
}
