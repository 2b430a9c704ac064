//! The fetch → detect → append → persist round trip.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::detector::detect;
use crate::error::{FetchError, WatchError};
use crate::store::UpdateLogStore;

/// Anything that can produce the current page text.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self) -> Result<String, FetchError>;

    /// Short human-readable description used in logs.
    fn describe(&self) -> String;
}

/// Derives labels from fetched content.  An empty result falls back to the
/// watcher's fixed labels.
pub type LabelFn = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Changed {
        fingerprint: String,
        total_updates: usize,
    },
    Unchanged,
    FetchFailed,
    /// Another cycle held the writer role; nothing was done.
    Skipped,
}

pub struct Watcher {
    store: UpdateLogStore,
    source: Arc<dyn ContentSource>,
    labels: Vec<String>,
    label_fn: Option<LabelFn>,
    running: Mutex<()>,
}

impl Watcher {
    pub fn new(store: UpdateLogStore, source: Arc<dyn ContentSource>, labels: Vec<String>) -> Self {
        Self {
            store,
            source,
            labels,
            label_fn: None,
            running: Mutex::new(()),
        }
    }

    pub fn with_label_fn(mut self, label_fn: LabelFn) -> Self {
        self.label_fn = Some(label_fn);
        self
    }

    pub fn store(&self) -> &UpdateLogStore {
        &self.store
    }

    fn labels_for(&self, content: &str) -> Vec<String> {
        self.label_fn
            .as_ref()
            .map(|f| f(content))
            .filter(|labels| !labels.is_empty())
            .unwrap_or_else(|| self.labels.clone())
    }

    /// Run one detection cycle.
    ///
    /// Fetch failures are logged and reported as [`CycleOutcome::FetchFailed`];
    /// only storage failures come back as errors.  Unchanged content never
    /// touches the file.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, WatchError> {
        let Ok(_running) = self.running.try_lock() else {
            debug!("previous cycle still running — skipping tick");
            return Ok(CycleOutcome::Skipped);
        };
        let Some(_writer) = self.store.try_lock_writer()? else {
            debug!(path = %self.store.path().display(), "update log locked by another writer — skipping tick");
            return Ok(CycleOutcome::Skipped);
        };

        let state = self.store.load().await?;

        let content = match self.source.fetch().await {
            Ok(content) => content,
            Err(err) => {
                warn!(
                    source = %self.source.describe(),
                    error = %err,
                    "fetch failed — state left unchanged"
                );
                return Ok(CycleOutcome::FetchFailed);
            }
        };

        let detection = detect(&content, &state.last_fingerprint);
        if !detection.changed {
            debug!(fingerprint = %detection.fingerprint, "no change detected — skipping write");
            return Ok(CycleOutcome::Unchanged);
        }

        let labels = self.labels_for(&content);
        let state = self
            .store
            .append(state, detection.fingerprint.clone(), labels);
        let total_updates = state.updates.len();
        self.store.save(&state).await?;

        info!(
            fingerprint = %detection.fingerprint,
            total_updates,
            path = %self.store.path().display(),
            "change detected — update recorded"
        );
        Ok(CycleOutcome::Changed {
            fingerprint: detection.fingerprint,
            total_updates,
        })
    }
}
