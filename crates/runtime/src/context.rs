use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use pagewatch_config::AppConfig;
use pagewatch_watch::{ContentSource, UpdateLogStore, Watcher};

use crate::labels::selector_labels;
use crate::source::HttpSource;

/// Everything the scheduler and the query handlers share.  Built once at
/// startup and passed explicitly; cheap to clone.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    /// Read side of the update log, used by the query surface.
    pub store: UpdateLogStore,
    pub watcher: Arc<Watcher>,
}

impl AppContext {
    /// Validate `config` and wire up the HTTP source.  Any error here is a
    /// startup failure.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let source = HttpSource::from_config(&config.source)?;
        Self::with_source(config, Arc::new(source))
    }

    /// Like [`from_config`](Self::from_config) with a caller-supplied source.
    /// The configuration is still validated.
    pub fn with_source(config: AppConfig, source: Arc<dyn ContentSource>) -> Result<Self> {
        config.validate()?;
        let store = UpdateLogStore::new(config.store_path()).with_max_updates(config.store.max_updates);

        let mut watcher = Watcher::new(store.clone(), source, config.poll.labels.clone());
        let selector = config.poll.label_selector.trim();
        if !selector.is_empty() {
            watcher = watcher.with_label_fn(selector_labels(selector)?);
        }

        Ok(Self {
            config: Arc::new(config),
            store,
            watcher: Arc::new(watcher),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.poll.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn from_config_rejects_invalid_configuration() {
        let mut config = AppConfig::default();
        config.poll.interval_secs = 1;
        assert!(AppContext::from_config(config).is_err());

        let mut config = AppConfig::default();
        config.source.url = String::new();
        assert!(AppContext::from_config(config).is_err());
    }

    #[test]
    fn from_config_points_store_at_configured_path() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.store.path = dir.path().join("log.json").display().to_string();
        config.poll.interval_secs = 60;

        let ctx = AppContext::from_config(config).unwrap();
        assert_eq!(ctx.store.path(), dir.path().join("log.json"));
        assert_eq!(ctx.watcher.store().path(), ctx.store.path());
        assert_eq!(ctx.poll_interval(), Duration::from_secs(60));
    }

    #[test]
    fn with_source_rejects_a_zero_interval() {
        let mut config = AppConfig::default();
        config.poll.interval_secs = 0;
        let source: Arc<dyn ContentSource> = Arc::new(HttpSource::from_config(&config.source).unwrap());
        let err = AppContext::with_source(config, source).err().unwrap();
        assert!(err.to_string().contains("interval"), "got {err}");
    }

    #[test]
    fn bad_label_selector_fails_at_startup() {
        let mut config = AppConfig::default();
        config.poll.label_selector = "h2[".to_string();
        assert!(AppContext::from_config(config).is_err());
    }
}
