use std::path::Path;

use anyhow::Result;
use tracing::error;

use pagewatch_runtime::LatestView;
use pagewatch_watch::{CycleOutcome, LogState, UpdateLogStore, Watcher};

/// One detection cycle on demand.  Storage failures are logged at error
/// level, as the scheduler does, before being returned.
pub(crate) async fn run_check(watcher: &Watcher) -> Result<()> {
    match watcher.run_cycle().await {
        Ok(outcome) => {
            println!("{}", describe_outcome(&outcome));
            Ok(())
        }
        Err(err) => {
            error!(
                error = %err,
                path = %watcher.store().path().display(),
                "detection cycle failed — update log left as it was"
            );
            Err(err.into())
        }
    }
}

pub(crate) async fn run_latest(store_path: &Path) {
    let state = UpdateLogStore::new(store_path).load_for_read().await;
    print!("{}", render_latest(&LatestView::from_state(state.as_ref())));
}

pub(crate) async fn run_log(store_path: &Path, json: bool) -> Result<()> {
    let state = UpdateLogStore::new(store_path)
        .load_for_read()
        .await
        .unwrap_or_default();
    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        print!("{}", render_log(&state));
    }
    Ok(())
}

pub(crate) fn render_latest(view: &LatestView) -> String {
    let mut out = format!("last updated: {}\n", view.last_updated);
    for headline in &view.headlines {
        out.push_str(&format!("  • {headline}\n"));
    }
    out
}

pub(crate) fn render_log(state: &LogState) -> String {
    if state.updates.is_empty() {
        return "no updates recorded yet\n".to_string();
    }

    let mut out = String::from("── update log ───────────────────────────────────────\n");
    for (idx, update) in state.updates.iter().enumerate() {
        out.push_str(&format!(
            "  {:>4}  {}  {}\n",
            idx + 1,
            update.last_updated,
            update.labels.join(" | ")
        ));
    }
    out.push_str(&format!("  ({} updates total)\n", state.updates.len()));
    out.push_str(&format!("  last hash: {}\n", state.last_fingerprint));
    out
}

pub(crate) fn describe_outcome(outcome: &CycleOutcome) -> String {
    match outcome {
        CycleOutcome::Changed {
            fingerprint,
            total_updates,
        } => format!("change detected ({fingerprint}); {total_updates} updates recorded"),
        CycleOutcome::Unchanged => "no change detected".to_string(),
        CycleOutcome::FetchFailed => "fetch failed; state left unchanged (see log)".to_string(),
        CycleOutcome::Skipped => "another cycle is running; skipped".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use pagewatch_config::SourceConfig;
    use pagewatch_runtime::HttpSource;
    use pagewatch_watch::{UpdateRecord, WatchError};

    use super::*;

    #[tokio::test]
    async fn check_returns_storage_failures() {
        let dir = TempDir::new().unwrap();
        // A directory in place of the log file fails before anything is fetched.
        let log_path = dir.path().join("log.json");
        std::fs::create_dir(&log_path).unwrap();
        let source = HttpSource::from_config(&SourceConfig::default()).unwrap();
        let watcher = Watcher::new(UpdateLogStore::new(&log_path), Arc::new(source), vec![]);

        let err = run_check(&watcher).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WatchError>(),
            Some(WatchError::StorageRead { .. })
        ));
        assert!(log_path.is_dir());
    }

    #[test]
    fn latest_lists_headlines() {
        let view = LatestView {
            headlines: vec!["In the news".to_string()],
            last_updated: "2024-05-01 12:00:00".to_string(),
        };
        assert_eq!(
            render_latest(&view),
            "last updated: 2024-05-01 12:00:00\n  • In the news\n"
        );
    }

    #[test]
    fn empty_log_says_so() {
        assert_eq!(render_log(&LogState::default()), "no updates recorded yet\n");
    }

    #[test]
    fn log_numbers_updates_in_order() {
        let state = LogState {
            last_fingerprint: "abc".to_string(),
            updates: vec![
                UpdateRecord {
                    labels: vec!["a".to_string(), "b".to_string()],
                    last_updated: "2024-05-01 12:00:00".to_string(),
                },
                UpdateRecord {
                    labels: vec![],
                    last_updated: "2024-05-02 12:00:00".to_string(),
                },
            ],
        };
        let out = render_log(&state);
        assert!(out.contains("     1  2024-05-01 12:00:00  a | b"));
        assert!(out.contains("     2  2024-05-02 12:00:00"));
        assert!(out.contains("(2 updates total)"));
        assert!(out.contains("last hash: abc"));
    }

    #[test]
    fn outcomes_have_readable_descriptions() {
        let changed = CycleOutcome::Changed {
            fingerprint: "ff".to_string(),
            total_updates: 3,
        };
        assert_eq!(describe_outcome(&changed), "change detected (ff); 3 updates recorded");
        assert_eq!(describe_outcome(&CycleOutcome::Unchanged), "no change detected");
    }
}
