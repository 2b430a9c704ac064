//! Periodic driver for the detection cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use pagewatch_config::MIN_INTERVAL_SECS;
use pagewatch_watch::Watcher;

/// Run a detection cycle every `interval` until `shutdown` flips to `true`.
///
/// The first tick fires immediately.  Each cycle is awaited inside the loop,
/// so ticks never overlap; ticks missed while a slow cycle runs are dropped.
/// A zero interval is raised to the configured minimum.
pub async fn run_scheduler(
    watcher: Arc<Watcher>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = if interval.is_zero() {
        warn!(min_secs = MIN_INTERVAL_SECS, "zero poll interval — using the minimum");
        Duration::from_secs(MIN_INTERVAL_SECS)
    } else {
        interval
    };
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = interval.as_secs(), "scheduler started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() { break; }
                continue;
            }
        }

        match watcher.run_cycle().await {
            Ok(outcome) => debug!(?outcome, "detection cycle finished"),
            Err(err) => error!(
                error = %err,
                "failed to persist update — change will be re-detected next tick"
            ),
        }
    }

    info!("scheduler stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use pagewatch_watch::{ContentSource, FetchError, UpdateLogStore};

    use super::*;

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentSource for CountingSource {
        async fn fetch(&self) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("static page".to_string())
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    #[tokio::test]
    async fn ticks_until_shutdown_and_records_once() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let store = UpdateLogStore::new(dir.path().join("log.json"));
        let watcher = Arc::new(Watcher::new(store.clone(), source.clone(), vec!["x".into()]));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_scheduler(watcher, Duration::from_millis(25), rx));

        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let calls = source.calls.load(Ordering::SeqCst);
        assert!(calls >= 2, "expected several ticks, got {calls}");
        assert_eq!(store.load().await.unwrap().updates.len(), 1);

        // No more ticks after shutdown.
        tokio::time::sleep(Duration::from_millis(75)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn stops_when_sender_is_dropped() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let store = UpdateLogStore::new(dir.path().join("log.json"));
        let watcher = Arc::new(Watcher::new(store, source, vec![]));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_scheduler(watcher, Duration::from_secs(3600), rx));
        drop(tx);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler should exit once the sender is gone")
            .unwrap();
    }

    #[tokio::test]
    async fn zero_interval_polls_once_then_waits() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let store = UpdateLogStore::new(dir.path().join("log.json"));
        let watcher = Arc::new(Watcher::new(store, source.clone(), vec![]));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_scheduler(watcher, Duration::ZERO, rx));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
