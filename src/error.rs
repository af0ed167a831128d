//! Error type shared by the model, the progress store and configuration loading.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SelectorError {
  /// A history entry does not fit the table dimensions.
  #[error(
    "invalid record #{index}: performance level {performance_level} must be in 0..{num_states}, \
     difficulty {difficulty_level} must be in 1..={num_actions}"
  )]
  InvalidRecord {
    index: usize,
    performance_level: i64,
    difficulty_level: i64,
    num_states: usize,
    num_actions: usize,
  },

  #[error("invalid state: performance level {performance_level} must be in 0..{num_states}")]
  InvalidState { performance_level: i64, num_states: usize },

  #[error("invalid model parameters: {0}")]
  InvalidParams(String),

  #[error("invalid value table: {0}")]
  InvalidTable(String),

  #[error("config error: {0}")]
  Config(String),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SelectorError>;
