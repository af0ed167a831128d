//! Adaptive difficulty selection for practice exams.
//!
//! A tabular Q-learning model learns, from a student's past attempts, which
//! difficulty tends to pay off at each performance level, and answers "what
//! difficulty should come next". Around it sits a small progress store that
//! keeps each student's rolling window of outcomes and their attempt history.
//!
//! ```
//! use adaptive_difficulty::{select_difficulty, train, HistoryRecord, ModelParams};
//!
//! let history = vec![
//!   HistoryRecord::new(5, 3, true),
//!   HistoryRecord::new(5, 4, false),
//! ];
//! let table = train(&history, &ModelParams::default()).unwrap();
//! assert_eq!(select_difficulty(&table, 5).unwrap(), 3);
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod logic;
pub mod model;
pub mod protocol;
pub mod state;
pub mod telemetry;
pub mod window;

pub use config::SelectorConfig;
pub use domain::{HistoryRecord, ModelParams, StudentKey};
pub use error::{Result, SelectorError};
pub use model::{reward, select_difficulty, train, update, DifficultyModel, ValueTable};
pub use state::ProgressStore;
pub use window::PerformanceWindow;
