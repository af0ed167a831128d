//! Rolling window over a student's most recent outcomes.
//!
//! The performance level fed to the selector is the number of correct answers
//! among the last `capacity` attempts (so levels run `0..=capacity`).

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

pub const DEFAULT_WINDOW: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceWindow {
  capacity: usize,
  outcomes: VecDeque<bool>,
}

impl Default for PerformanceWindow {
  fn default() -> Self { Self::new(DEFAULT_WINDOW) }
}

impl PerformanceWindow {
  pub fn new(capacity: usize) -> Self {
    Self { capacity, outcomes: VecDeque::with_capacity(capacity) }
  }

  /// Record an outcome, evicting the oldest when full, and return the new level.
  pub fn push(&mut self, correct: bool) -> i64 {
    if self.capacity == 0 {
      return 0;
    }
    if self.outcomes.len() == self.capacity {
      self.outcomes.pop_front();
    }
    self.outcomes.push_back(correct);
    self.level()
  }

  /// Same recent outcomes under a different capacity (oldest dropped first).
  pub fn resized(&self, capacity: usize) -> Self {
    let mut w = Self::new(capacity);
    for c in &self.outcomes {
      w.push(*c);
    }
    w
  }

  pub fn level(&self) -> i64 {
    self.outcomes.iter().filter(|c| **c).count() as i64
  }

  pub fn len(&self) -> usize { self.outcomes.len() }
  pub fn is_empty(&self) -> bool { self.outcomes.is_empty() }
  pub fn capacity(&self) -> usize { self.capacity }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn level_counts_correct_outcomes() {
    let mut w = PerformanceWindow::default();
    assert_eq!(w.level(), 0);
    assert_eq!(w.push(true), 1);
    assert_eq!(w.push(false), 1);
    assert_eq!(w.push(true), 2);
    assert_eq!(w.len(), 3);
  }

  #[test]
  fn oldest_outcome_is_evicted() {
    let mut w = PerformanceWindow::new(3);
    w.push(true);
    w.push(true);
    w.push(true);
    assert_eq!(w.level(), 3);
    // The first `true` drops out.
    assert_eq!(w.push(false), 2);
    assert_eq!(w.len(), 3);
  }

  #[test]
  fn resizing_keeps_the_most_recent_outcomes() {
    let mut w = PerformanceWindow::new(4);
    for c in [true, true, false, false] {
      w.push(c);
    }
    let small = w.resized(2);
    assert_eq!(small.capacity(), 2);
    assert_eq!(small.level(), 0);
    assert_eq!(w.resized(8).level(), 2);
  }

  #[test]
  fn full_window_of_successes_hits_top_level() {
    let mut w = PerformanceWindow::default();
    for _ in 0..25 {
      w.push(true);
    }
    assert_eq!(w.level(), DEFAULT_WINDOW as i64);
    assert_eq!(w.len(), DEFAULT_WINDOW);
  }
}
