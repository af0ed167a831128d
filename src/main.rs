//! Adaptive Difficulty · next-question difficulty selector
//!
//! - One-off recommendations straight from a history file
//! - Persistent per-student progress (rolling window + attempt history)
//!
//! Important env variables:
//!   SELECTOR_CONFIG_PATH : path to TOML config (model params, window, state file)
//!   LOG_LEVEL            : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT           : "pretty" (default) or "json"

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, instrument};

use adaptive_difficulty::config::{load_config_from_env, SelectorConfig};
use adaptive_difficulty::logic::{load_history, parse_outcomes, recommend_from_history, table_report};
use adaptive_difficulty::protocol::SubmitOut;
use adaptive_difficulty::{telemetry, ProgressStore, StudentKey};

const DEFAULT_STATE_PATH: &str = "progress.json";

#[derive(Parser)]
#[command(name = "adaptive-difficulty")]
#[command(about = "Pick the next exam difficulty from a student's recent performance", long_about = None)]
#[command(version)]
struct Cli {
  /// Learning rate override
  #[arg(long, global = true)]
  alpha: Option<f64>,

  /// Discount factor override
  #[arg(long, global = true)]
  gamma: Option<f64>,

  /// Progress file used by submit/advise/summary
  #[arg(long, global = true)]
  state: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Train on a history file and recommend a difficulty
  Recommend {
    /// JSON array of [performance, difficulty, correct] records
    #[arg(long)]
    history: PathBuf,

    /// Current performance level (defaults to the configured mid-level)
    #[arg(long, allow_hyphen_values = true)]
    performance: Option<i64>,
  },

  /// Train on a history file and print the whole value table
  Table {
    #[arg(long)]
    history: PathBuf,
  },

  /// Record a batch of answers for a student
  Submit {
    #[arg(long)]
    user: String,
    #[arg(long)]
    subject: String,
    /// Difficulty the answers were served at (1-based)
    #[arg(long, allow_hyphen_values = true)]
    difficulty: i64,
    /// Comma-separated outcomes, e.g. "true,false,true"
    #[arg(long)]
    outcomes: String,
  },

  /// Recommend the next difficulty for a tracked student
  Advise {
    #[arg(long)]
    user: String,
    #[arg(long)]
    subject: String,
    #[arg(long, allow_hyphen_values = true)]
    performance: Option<i64>,
  },

  /// Correct/total per subject for a user
  Summary {
    #[arg(long)]
    user: String,
  },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn resolve_config(cli: &Cli) -> Result<SelectorConfig, Box<dyn std::error::Error>> {
  let mut cfg = load_config_from_env().unwrap_or_default();
  if let Some(alpha) = cli.alpha {
    cfg.model.alpha = alpha;
  }
  if let Some(gamma) = cli.gamma {
    cfg.model.gamma = gamma;
  }
  if let Some(state) = &cli.state {
    cfg.state_path = Some(state.clone());
  }
  cfg.validate()?;
  Ok(cfg)
}

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let cli = Cli::parse();
  let cfg = resolve_config(&cli)?;
  let state_path = cfg.state_path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH));

  match cli.command {
    Commands::Recommend { history, performance } => {
      let records = load_history(&history)?;
      let level = performance.unwrap_or(cfg.default_performance_level);
      let rec = recommend_from_history(&records, &cfg.model, level)?;
      info!(target: "adaptive_difficulty", difficulty = rec.difficulty, level, "Recommendation from history file");
      print_json(&rec)?;
    }

    Commands::Table { history } => {
      let records = load_history(&history)?;
      print_json(&table_report(&records, &cfg.model)?)?;
    }

    Commands::Submit { user, subject, difficulty, outcomes } => {
      let outcomes = parse_outcomes(&outcomes)?;
      let store = ProgressStore::load(cfg, &state_path)?;
      let key = StudentKey::new(user, subject);
      let summary = store.submit(&key, difficulty, &outcomes).await?;
      let next = store.recommend(&key, None).await?;
      store.save(&state_path).await?;
      print_json(&SubmitOut { summary, next })?;
    }

    Commands::Advise { user, subject, performance } => {
      let store = ProgressStore::load(cfg, &state_path)?;
      let rec = store.recommend(&StudentKey::new(user, subject), performance).await?;
      print_json(&rec)?;
    }

    Commands::Summary { user } => {
      let store = ProgressStore::load(cfg, &state_path)?;
      print_json(&store.subject_summary(&user).await)?;
    }
  }
  Ok(())
}
