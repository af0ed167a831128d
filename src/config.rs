//! Loading selector configuration (model parameters + bookkeeping settings) from TOML.
//!
//! Example:
//!
//! ```toml
//! window_size = 10
//! default_performance_level = 5
//! state_path = "progress.json"
//!
//! [model]
//! num_states = 11
//! num_actions = 10
//! alpha = 0.1
//! gamma = 0.9
//! ```

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::ModelParams;
use crate::error::{Result, SelectorError};
use crate::window::DEFAULT_WINDOW;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectorConfig {
  pub model: ModelParams,
  /// Number of recent outcomes that make up the performance level.
  pub window_size: usize,
  /// Level used for students with no recorded attempts.
  pub default_performance_level: i64,
  /// Where the CLI keeps student progress between runs.
  pub state_path: Option<PathBuf>,
}

impl Default for SelectorConfig {
  fn default() -> Self {
    Self {
      model: ModelParams::default(),
      window_size: DEFAULT_WINDOW,
      default_performance_level: 5,
      state_path: None,
    }
  }
}

impl SelectorConfig {
  pub fn from_toml_str(s: &str) -> Result<Self> {
    let cfg: SelectorConfig = toml::from_str(s).map_err(|e| SelectorError::Config(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
  }

  /// The window must produce levels that are valid rows of the table.
  pub fn validate(&self) -> Result<()> {
    self.model.validate()?;
    if self.window_size == 0 {
      return Err(SelectorError::Config("window_size must be at least 1".into()));
    }
    if self.window_size >= self.model.num_states {
      return Err(SelectorError::Config(format!(
        "window_size {} yields levels up to {}, but the table only has {} states",
        self.window_size, self.window_size, self.model.num_states
      )));
    }
    let level = self.default_performance_level;
    if level < 0 || level as usize >= self.model.num_states {
      return Err(SelectorError::Config(format!(
        "default_performance_level {} is outside 0..{}",
        level, self.model.num_states
      )));
    }
    Ok(())
  }
}

/// Attempt to load `SelectorConfig` from SELECTOR_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<SelectorConfig> {
  let path = std::env::var("SELECTOR_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match SelectorConfig::from_toml_str(&s) {
      Ok(cfg) => {
        info!(target: "adaptive_difficulty", %path, "Loaded selector config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "adaptive_difficulty", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "adaptive_difficulty", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
