//! Key-value state shared by the scanners, the coordinator and the control
//! surface.
//!
//! The whole state lives in one JSON document whose keys follow the names the
//! export file uses (`notifierEnabled`, `reloadInterval`, `seenItems`,
//! `seenPostIds`). Every mutation is written through to disk before the call
//! returns.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

use crate::{AppError, Result};

pub const DEFAULT_RELOAD_INTERVAL_SECS: u64 = 60;
pub const MAX_RELOAD_INTERVAL_SECS: u64 = 24 * 60 * 60;
pub const EXPORT_FILE_NAME: &str = "facebook_seen_data.json";

/// Insertion-ordered set of identifiers that have already been notified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct SeenSet {
    order: Vec<String>,
    index: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Returns `false` when the id was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.index.contains(&id) {
            return false;
        }
        self.index.insert(id.clone());
        self.order.push(id);
        true
    }

    pub fn extend<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = 0;
        for id in ids {
            if self.insert(id) {
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl From<Vec<String>> for SeenSet {
    fn from(ids: Vec<String>) -> Self {
        let mut set = SeenSet::new();
        set.extend(ids);
        set
    }
}

impl From<SeenSet> for Vec<String> {
    fn from(set: SeenSet) -> Self {
        set.order
    }
}

/// The two values the control surface edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub notifier_enabled: bool,
    pub reload_interval: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredState {
    #[serde(default)]
    notifier_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reload_interval: Option<u64>,
    #[serde(default)]
    seen_items: SeenSet,
    #[serde(default)]
    seen_post_ids: SeenSet,
}

impl StoredState {
    fn settings(&self) -> Settings {
        Settings {
            notifier_enabled: self.notifier_enabled,
            reload_interval: self
                .reload_interval
                .filter(|secs| *secs > 0)
                .map(|secs| secs.min(MAX_RELOAD_INTERVAL_SECS))
                .unwrap_or(DEFAULT_RELOAD_INTERVAL_SECS),
        }
    }
}

/// Export/import document for the seen-sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenExport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seen_items: Option<SeenSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seen_post_ids: Option<SeenSet>,
    /// Older name for `seenPostIds`; merged into it on import.
    #[serde(default, skip_serializing)]
    pub seen_notification_ids: Option<SeenSet>,
}

impl SeenExport {
    /// Post ids from both keys, `seenPostIds` first.
    fn post_ids(&mut self) -> Option<SeenSet> {
        match (self.seen_post_ids.take(), self.seen_notification_ids.take()) {
            (Some(mut current), Some(legacy)) => {
                current.extend(Vec::<String>::from(legacy));
                Some(current)
            }
            (current, legacy) => current.or(legacy),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub seen_items: Option<usize>,
    pub seen_post_ids: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    pub settings: Settings,
    pub seen_items: usize,
    pub seen_post_ids: usize,
}

/// Which seen-set a scanner works against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeenKind {
    Items,
    PostIds,
}

#[derive(Clone)]
pub struct StateStore {
    path: Arc<PathBuf>,
    state: Arc<Mutex<StoredState>>,
    settings_tx: Arc<watch::Sender<Settings>>,
}

impl StateStore {
    /// Opens the state file, starting empty when it does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<StoredState>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No state file at {}, starting empty", path.display());
                StoredState::default()
            }
            Err(e) => return Err(e.into()),
        };

        let (settings_tx, _) = watch::channel(state.settings());

        Ok(Self {
            path: Arc::new(path),
            state: Arc::new(Mutex::new(state)),
            settings_tx: Arc::new(settings_tx),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.settings_tx.subscribe()
    }

    pub async fn settings(&self) -> Settings {
        self.state.lock().await.settings()
    }

    pub async fn status(&self) -> StoreStatus {
        let state = self.state.lock().await;
        StoreStatus {
            settings: state.settings(),
            seen_items: state.seen_items.len(),
            seen_post_ids: state.seen_post_ids.len(),
        }
    }

    /// Enables polling with the given period; zero falls back to the default.
    pub async fn start(&self, interval_secs: u64) -> Result<Settings> {
        let interval = if interval_secs == 0 {
            DEFAULT_RELOAD_INTERVAL_SECS
        } else {
            interval_secs
        };
        self.update_settings(|state| {
            state.notifier_enabled = true;
            state.reload_interval = Some(interval);
        })
        .await
    }

    pub async fn stop(&self) -> Result<Settings> {
        self.update_settings(|state| state.notifier_enabled = false).await
    }

    pub async fn seen(&self, kind: SeenKind) -> SeenSet {
        let state = self.state.lock().await;
        match kind {
            SeenKind::Items => state.seen_items.clone(),
            SeenKind::PostIds => state.seen_post_ids.clone(),
        }
    }

    /// Adds ids to a seen-set and persists it. Returns how many were new.
    pub async fn record_seen<I, S>(&self, kind: SeenKind, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.lock().await;
        let added = match kind {
            SeenKind::Items => state.seen_items.extend(ids),
            SeenKind::PostIds => state.seen_post_ids.extend(ids),
        };
        if added > 0 {
            self.persist(&state).await?;
        }
        Ok(added)
    }

    pub async fn export_seen(&self) -> Result<String> {
        let state = self.state.lock().await;
        let export = SeenExport {
            seen_items: Some(state.seen_items.clone()),
            seen_post_ids: Some(state.seen_post_ids.clone()),
            seen_notification_ids: None,
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Replaces the seen-sets present in `document`.
    pub async fn import_seen(&self, document: &str) -> Result<ImportSummary> {
        let mut import: SeenExport = serde_json::from_str(document)
            .map_err(|e| AppError::InvalidImport(format!("failed to parse file: {}", e)))?;
        let seen_post_ids = import.post_ids();

        if import.seen_items.is_none() && seen_post_ids.is_none() {
            return Err(AppError::InvalidImport(
                "expected seenItems or seenPostIds".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        let summary = ImportSummary {
            seen_items: import.seen_items.as_ref().map(SeenSet::len),
            seen_post_ids: seen_post_ids.as_ref().map(SeenSet::len),
        };
        if let Some(items) = import.seen_items {
            state.seen_items = items;
        }
        if let Some(posts) = seen_post_ids {
            state.seen_post_ids = posts;
        }
        self.persist(&state).await?;

        tracing::info!(
            "Imported seen data: items={:?}, posts={:?}",
            summary.seen_items,
            summary.seen_post_ids
        );
        Ok(summary)
    }

    async fn update_settings<F>(&self, apply: F) -> Result<Settings>
    where
        F: FnOnce(&mut StoredState),
    {
        let mut state = self.state.lock().await;
        let before = state.settings();
        apply(&mut state);
        self.persist(&state).await?;

        let after = state.settings();
        if before != after {
            self.settings_tx.send_replace(after);
        }
        Ok(after)
    }

    async fn persist(&self, state: &StoredState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, self.path.as_path()).await?;
        Ok(())
    }
}
