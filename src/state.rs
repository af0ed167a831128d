//! Shared progress store: per-student windows, per-subject histories and cached models.
//!
//! This module owns:
//!   - one `PerformanceWindow` per username, shared by all of that user's subjects
//!   - one history + cached model per (username, subject)
//!   - the selector configuration those entries were built with
//!
//! Each submission runs under the write guard for its whole batch, so a
//! student's window, history and cached table always move together.
//! Readers clone snapshots out and never hold the guard across an await.

use std::{collections::HashMap, ffi::OsString, path::Path, path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::config::SelectorConfig;
use crate::domain::{HistoryRecord, StudentKey};
use crate::error::{Result, SelectorError};
use crate::model::{select_difficulty, DifficultyModel, ValueTable};
use crate::protocol::{Recommendation, SubjectSummary, SubmitSummary};
use crate::window::PerformanceWindow;

#[derive(Clone, Debug)]
struct SubjectProgress {
    history: Vec<HistoryRecord>,
    model: DifficultyModel,
}

impl SubjectProgress {
    fn new(config: &SelectorConfig) -> Result<Self> {
        Ok(Self { history: Vec::new(), model: DifficultyModel::new(config.model)? })
    }
}

#[derive(Debug, Default)]
struct Progress {
    windows: HashMap<String, PerformanceWindow>,
    subjects: HashMap<StudentKey, SubjectProgress>,
}

/// Serialized form of the store. Tables are not stored; they are rebuilt
/// from the histories on load.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(default)]
    pub windows: Vec<WindowSnapshot>,
    #[serde(default)]
    pub subjects: Vec<SubjectSnapshot>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub username: String,
    pub window: PerformanceWindow,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubjectSnapshot {
    #[serde(flatten)]
    pub key: StudentKey,
    pub history: Vec<HistoryRecord>,
}

#[derive(Clone)]
pub struct ProgressStore {
    config: SelectorConfig,
    progress: Arc<RwLock<Progress>>,
}

impl ProgressStore {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config, progress: Arc::new(RwLock::new(Progress::default())) }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Record a batch of answers served at one difficulty.
    ///
    /// Every outcome moves the user's window first; the resulting level
    /// becomes the state of that outcome's history record. A bad difficulty
    /// rejects the whole batch before anything is written, and the reported
    /// record index is the position within the batch.
    #[instrument(level = "info", skip(self, outcomes), fields(user = %key.username, subject = %key.subject, answers = outcomes.len()))]
    pub async fn submit(&self, key: &StudentKey, difficulty: i64, outcomes: &[bool]) -> Result<SubmitSummary> {
        let num_actions = self.config.model.num_actions;
        let mut progress = self.progress.write().await;

        let mut window = progress
            .windows
            .get(&key.username)
            .cloned()
            .unwrap_or_else(|| PerformanceWindow::new(self.config.window_size));

        if !(1..=num_actions as i64).contains(&difficulty) {
            return Err(SelectorError::InvalidRecord {
                index: 0,
                performance_level: window.level(),
                difficulty_level: difficulty,
                num_states: self.config.model.num_states,
                num_actions,
            });
        }
        if outcomes.is_empty() {
            return Ok(SubmitSummary { total: 0, correct: 0, wrong: 0, performance_level: window.level() });
        }

        let mut subject = match progress.subjects.get(key) {
            Some(p) => p.clone(),
            None => SubjectProgress::new(&self.config)?,
        };
        for &outcome in outcomes {
            let level = window.push(outcome);
            let record = HistoryRecord::new(level, difficulty, outcome);
            subject.model.observe(&record)?;
            subject.history.push(record);
        }

        let correct = outcomes.iter().filter(|c| **c).count();
        let summary = SubmitSummary {
            total: outcomes.len(),
            correct,
            wrong: outcomes.len() - correct,
            performance_level: window.level(),
        };
        progress.windows.insert(key.username.clone(), window);
        progress.subjects.insert(key.clone(), subject);
        info!(target: "selector", user = %key.username, subject = %key.subject, difficulty, total = summary.total, correct = summary.correct, level = summary.performance_level, "Recorded answers");
        Ok(summary)
    }

    /// Next difficulty for a student in one subject.
    ///
    /// Without an explicit level, the user's current window level is used,
    /// or the configured default for users we have never seen. Subjects
    /// without history are scored against an all-zero table.
    #[instrument(level = "info", skip(self), fields(user = %key.username, subject = %key.subject))]
    pub async fn recommend(&self, key: &StudentKey, performance_level: Option<i64>) -> Result<Recommendation> {
        let progress = self.progress.read().await;
        let level = match performance_level {
            Some(level) => level,
            None => progress
                .windows
                .get(&key.username)
                .map(|w| w.level())
                .unwrap_or(self.config.default_performance_level),
        };
        let rec = match progress.subjects.get(key) {
            Some(p) => Recommendation { difficulty: p.model.recommend(level)?, performance_level: level, history_len: p.history.len() },
            None => {
                let zeros = ValueTable::zeros(self.config.model.num_states, self.config.model.num_actions);
                debug!(target: "selector", user = %key.username, subject = %key.subject, "No history; using empty table");
                Recommendation { difficulty: select_difficulty(&zeros, level)?, performance_level: level, history_len: 0 }
            }
        };
        info!(target: "selector", difficulty = rec.difficulty, level = rec.performance_level, history = rec.history_len, "Recommended difficulty");
        Ok(rec)
    }

    /// Rebuild a subject's cached table from the full stored history.
    #[instrument(level = "debug", skip(self), fields(user = %key.username, subject = %key.subject))]
    pub async fn retrain(&self, key: &StudentKey) -> Result<Option<ValueTable>> {
        let mut progress = self.progress.write().await;
        let Some(subject) = progress.subjects.get_mut(key) else {
            return Ok(None);
        };
        let fresh = DifficultyModel::fit(self.config.model, &subject.history)?;
        if fresh.table() != subject.model.table() {
            warn!(target: "selector", user = %key.username, subject = %key.subject, "Cached table drifted from history; replaced");
        }
        subject.model = fresh;
        Ok(Some(subject.model.table().clone()))
    }

    pub async fn history(&self, key: &StudentKey) -> Option<Vec<HistoryRecord>> {
        self.progress.read().await.subjects.get(key).map(|p| p.history.clone())
    }

    pub async fn table(&self, key: &StudentKey) -> Option<ValueTable> {
        self.progress.read().await.subjects.get(key).map(|p| p.model.table().clone())
    }

    /// Correct/total counts for every subject a user has answered, sorted by subject.
    pub async fn subject_summary(&self, username: &str) -> Vec<SubjectSummary> {
        let progress = self.progress.read().await;
        let mut out: Vec<SubjectSummary> = progress
            .subjects
            .iter()
            .filter(|(k, _)| k.username == username)
            .map(|(k, p)| SubjectSummary {
                subject: k.subject.clone(),
                correct: p.history.iter().filter(|r| r.correct).count(),
                total: p.history.len(),
            })
            .collect();
        out.sort_by(|a, b| a.subject.cmp(&b.subject));
        out
    }

    pub async fn snapshot(&self) -> ProgressSnapshot {
        let progress = self.progress.read().await;
        let mut windows: Vec<WindowSnapshot> = progress
            .windows
            .iter()
            .map(|(u, w)| WindowSnapshot { username: u.clone(), window: w.clone() })
            .collect();
        windows.sort_by(|a, b| a.username.cmp(&b.username));
        let mut subjects: Vec<SubjectSnapshot> = progress
            .subjects
            .iter()
            .map(|(k, p)| SubjectSnapshot { key: k.clone(), history: p.history.clone() })
            .collect();
        subjects.sort_by(|a, b| a.key.cmp(&b.key));
        ProgressSnapshot { windows, subjects }
    }

    /// Restore a store, retraining every subject's table from its history.
    ///
    /// Stored windows always pass through `resized`, so a window holding more
    /// outcomes than the configured size cannot yield a level outside the table.
    #[instrument(level = "info", skip_all, fields(users = snapshot.windows.len(), subjects = snapshot.subjects.len()))]
    pub fn from_snapshot(config: SelectorConfig, snapshot: ProgressSnapshot) -> Result<Self> {
        let mut progress = Progress::default();
        for w in snapshot.windows {
            if w.window.capacity() != config.window_size || w.window.len() > config.window_size {
                warn!(target: "selector", user = %w.username, capacity = w.window.capacity(), outcomes = w.window.len(), to = config.window_size, "Resizing stored window");
            }
            progress.windows.insert(w.username, w.window.resized(config.window_size));
        }
        for s in snapshot.subjects {
            let model = DifficultyModel::fit(config.model, &s.history)?;
            progress.subjects.insert(s.key, SubjectProgress { history: s.history, model });
        }
        Ok(Self { config, progress: Arc::new(RwLock::new(progress)) })
    }

    /// Load from a JSON state file; a missing file means a fresh store.
    pub fn load(config: SelectorConfig, path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(s) => {
                let snapshot: ProgressSnapshot = serde_json::from_str(&s)?;
                info!(target: "adaptive_difficulty", path = %path.display(), users = snapshot.windows.len(), subjects = snapshot.subjects.len(), "Loaded progress");
                Self::from_snapshot(config, snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(target: "adaptive_difficulty", path = %path.display(), "No progress file yet; starting empty");
                Ok(Self::new(config))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the snapshot next to `path` and rename it into place, so a
    /// crash mid-write never leaves a truncated state file behind.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot().await;
        let tmp = staging_path(path);
        std::fs::write(&tmp, serde_json::to_string_pretty(&snapshot)?)?;
        std::fs::rename(&tmp, path)?;
        debug!(target: "adaptive_difficulty", path = %path.display(), users = snapshot.windows.len(), subjects = snapshot.subjects.len(), "Saved progress");
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::train;

    fn store() -> ProgressStore {
        ProgressStore::new(SelectorConfig::default())
    }

    #[tokio::test]
    async fn submit_tracks_window_levels() {
        let s = store();
        let key = StudentKey::new("rahim", "physics");
        let summary = s.submit(&key, 4, &[true, false, true, true]).await.unwrap();
        assert_eq!(summary, SubmitSummary { total: 4, correct: 3, wrong: 1, performance_level: 3 });

        let history = s.history(&key).await.unwrap();
        assert_eq!(
            history,
            vec![
                HistoryRecord::new(1, 4, true),
                HistoryRecord::new(1, 4, false),
                HistoryRecord::new(2, 4, true),
                HistoryRecord::new(3, 4, true),
            ]
        );
    }

    #[tokio::test]
    async fn cached_table_matches_retraining() {
        let s = store();
        let key = StudentKey::new("rahim", "physics");
        s.submit(&key, 3, &[true, true, false]).await.unwrap();
        s.submit(&key, 7, &[false, false, true, true]).await.unwrap();

        let cached = s.table(&key).await.unwrap();
        let history = s.history(&key).await.unwrap();
        assert_eq!(cached, train(&history, &SelectorConfig::default().model).unwrap());
        assert_eq!(s.retrain(&key).await.unwrap(), Some(cached));
    }

    #[tokio::test]
    async fn bad_difficulty_rejects_whole_batch() {
        let s = store();
        let key = StudentKey::new("rahim", "physics");
        s.submit(&key, 2, &[true]).await.unwrap();
        let err = s.submit(&key, 11, &[true, true]).await.unwrap_err();
        assert!(matches!(err, SelectorError::InvalidRecord { index: 0, performance_level: 1, difficulty_level: 11, .. }));
        assert_eq!(s.history(&key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_student_gets_easiest_difficulty() {
        let s = store();
        let rec = s.recommend(&StudentKey::new("nobody", "math"), None).await.unwrap();
        assert_eq!(rec, Recommendation { difficulty: 1, performance_level: 5, history_len: 0 });
    }

    #[tokio::test]
    async fn recommend_uses_current_level_and_rejects_bad_levels() {
        let s = store();
        let key = StudentKey::new("rahim", "physics");
        s.submit(&key, 6, &[true, true]).await.unwrap();
        // Level 1 then level 2 both rewarded difficulty 6.
        let rec = s.recommend(&key, None).await.unwrap();
        assert_eq!(rec, Recommendation { difficulty: 6, performance_level: 2, history_len: 2 });
        assert_eq!(s.recommend(&key, Some(1)).await.unwrap().difficulty, 6);
        assert_eq!(s.recommend(&key, Some(9)).await.unwrap().difficulty, 1);
        assert!(matches!(s.recommend(&key, Some(11)).await, Err(SelectorError::InvalidState { .. })));
        assert!(matches!(s.recommend(&key, Some(-1)).await, Err(SelectorError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn subject_summary_groups_by_subject() {
        let s = store();
        s.submit(&StudentKey::new("rahim", "physics"), 3, &[true, false]).await.unwrap();
        s.submit(&StudentKey::new("rahim", "chemistry"), 5, &[true, true, true]).await.unwrap();
        s.submit(&StudentKey::new("karim", "physics"), 5, &[false]).await.unwrap();

        let out = s.subject_summary("rahim").await;
        assert_eq!(
            out,
            vec![
                SubjectSummary { subject: "chemistry".into(), correct: 3, total: 3 },
                SubjectSummary { subject: "physics".into(), correct: 1, total: 2 },
            ]
        );
        assert!(s.subject_summary("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_submissions_are_all_recorded() {
        let s = store();
        let key = StudentKey::new("rahim", "physics");
        let mut handles = Vec::new();
        for i in 0..8 {
            let s = s.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move { s.submit(&key, (i % 10) + 1, &[i % 2 == 0]).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let history = s.history(&key).await.unwrap();
        assert_eq!(history.len(), 8);
        assert_eq!(s.table(&key).await.unwrap(), train(&history, &s.config().model).unwrap());
    }

    #[tokio::test]
    async fn progress_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");

        let s = store();
        let key = StudentKey::new("rahim", "physics");
        s.submit(&key, 4, &[true, false, true]).await.unwrap();
        s.save(&path).await.unwrap();

        let loaded = ProgressStore::load(SelectorConfig::default(), &path).unwrap();
        assert_eq!(loaded.history(&key).await, s.history(&key).await);
        assert_eq!(loaded.table(&key).await, s.table(&key).await);
        assert_eq!(loaded.recommend(&key, None).await.unwrap(), s.recommend(&key, None).await.unwrap());

        let fresh = ProgressStore::load(SelectorConfig::default(), &dir.path().join("missing.json")).unwrap();
        let snapshot = fresh.snapshot().await;
        assert!(snapshot.windows.is_empty() && snapshot.subjects.is_empty());
    }

    #[tokio::test]
    async fn window_is_shared_across_subjects() {
        let s = store();
        let physics = StudentKey::new("rahim", "physics");
        let chemistry = StudentKey::new("rahim", "chemistry");
        s.submit(&physics, 3, &[true, true, true]).await.unwrap();
        let summary = s.submit(&chemistry, 2, &[true]).await.unwrap();
        assert_eq!(summary.performance_level, 4);
        assert_eq!(s.history(&chemistry).await.unwrap(), vec![HistoryRecord::new(4, 2, true)]);

        // Another user's window is untouched.
        let other = s.submit(&StudentKey::new("karim", "chemistry"), 2, &[true]).await.unwrap();
        assert_eq!(other.performance_level, 1);

        // A subject with no history still starts from the user's window level.
        let rec = s.recommend(&StudentKey::new("rahim", "biology"), None).await.unwrap();
        assert_eq!(rec, Recommendation { difficulty: 1, performance_level: 4, history_len: 0 });
    }

    #[tokio::test]
    async fn oversized_stored_window_is_trimmed_on_load() {
        let outcomes = vec![true; 15];
        let json = serde_json::json!({
            "windows": [{ "username": "rahim", "window": { "capacity": 10, "outcomes": outcomes } }],
            "subjects": [{ "username": "rahim", "subject": "physics", "history": [[1, 4, true]] }],
        });
        let snapshot: ProgressSnapshot = serde_json::from_value(json).unwrap();
        let s = ProgressStore::from_snapshot(SelectorConfig::default(), snapshot).unwrap();

        let key = StudentKey::new("rahim", "physics");
        let rec = s.recommend(&key, None).await.unwrap();
        assert_eq!(rec.performance_level, 10);
        assert_eq!(s.snapshot().await.windows[0].window.len(), 10);
        assert_eq!(s.submit(&key, 4, &[false]).await.unwrap().performance_level, 9);
    }

    #[tokio::test]
    async fn save_replaces_the_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, "not json").unwrap();

        let s = store();
        let key = StudentKey::new("rahim", "physics");
        s.submit(&key, 4, &[true]).await.unwrap();
        s.save(&path).await.unwrap();
        s.submit(&key, 4, &[false]).await.unwrap();
        s.save(&path).await.unwrap();

        assert!(!staging_path(&path).exists());
        let loaded = ProgressStore::load(SelectorConfig::default(), &path).unwrap();
        assert_eq!(loaded.history(&key).await.unwrap().len(), 2);
    }
}
