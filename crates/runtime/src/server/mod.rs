//! Read-only query surface over the update log.

mod page;

use std::future::Future;

use anyhow::Result;
use axum::Router;
use axum::extract::State;
use axum::response::{Html, Json};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use pagewatch_watch::LogState;

use crate::AppContext;

pub use page::LatestView;

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/updates", get(api_updates))
        .route("/health", get(|| async { "OK" }))
        .with_state(ctx)
}

async fn index(State(ctx): State<AppContext>) -> Html<String> {
    let state = ctx.store.load_for_read().await;
    Html(page::render_index(&LatestView::from_state(state.as_ref())))
}

async fn api_updates(State(ctx): State<AppContext>) -> Json<LogState> {
    Json(ctx.store.load_for_read().await.unwrap_or_default())
}

/// Serve `ctx` on an already-bound listener until `shutdown` flips to `true`.
pub async fn serve(
    listener: TcpListener,
    ctx: AppContext,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "query server listening");
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await?;
    info!("query server stopped");
    Ok(())
}

fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) -> impl Future<Output = ()> {
    async move {
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use pagewatch_config::AppConfig;
    use pagewatch_watch::{ContentSource, FetchError};

    use super::*;

    struct FixedSource(&'static str);

    #[async_trait]
    impl ContentSource for FixedSource {
        async fn fetch(&self) -> Result<String, FetchError> {
            Ok(self.0.to_string())
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    fn context(dir: &TempDir) -> AppContext {
        let mut config = AppConfig::default();
        config.store.path = dir.path().join("wiki_updates.json").display().to_string();
        AppContext::with_source(config, Arc::new(FixedSource("hello"))).unwrap()
    }

    async fn get_body(ctx: AppContext, uri: &str) -> (StatusCode, String) {
        let response = router(ctx)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn index_before_any_poll_shows_placeholder() {
        let dir = TempDir::new().unwrap();
        let (status, body) = get_body(context(&dir), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("No data available yet."));
        assert!(body.contains("Unknown"));
    }

    #[tokio::test]
    async fn api_before_any_poll_returns_empty_state() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let (status, body) = get_body(ctx.clone(), "/api/updates").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "last_hash": "", "updates": [] }));
        // Readers never create the file.
        assert!(!ctx.store.path().exists());
    }

    #[tokio::test]
    async fn endpoints_reflect_recorded_update() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        ctx.watcher.run_cycle().await.unwrap();

        let (_, html) = get_body(ctx.clone(), "/").await;
        assert!(html.contains("<li>From today&#39;s featured article</li>"));

        let (_, body) = get_body(ctx.clone(), "/api/updates").await;
        let state: LogState = serde_json::from_str(&body).unwrap();
        assert_eq!(state, ctx.store.load().await.unwrap());
        assert_eq!(state.updates.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_log_is_served_as_placeholder() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        std::fs::write(ctx.store.path(), "{ truncated").unwrap();

        let (status, body) = get_body(ctx.clone(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("No data available yet."));

        let (status, _) = get_body(ctx, "/api/updates").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_and_unknown_routes() {
        let dir = TempDir::new().unwrap();
        let (status, body) = get_body(context(&dir), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");

        let (status, _) = get_body(context(&dir), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown_signal() {
        let dir = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(serve(listener, context(&dir), rx));

        let body = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "OK");

        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
