//! HTTP content source: fetches the watched page and extracts the text to hash.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use pagewatch_config::SourceConfig;
use pagewatch_watch::{ContentSource, FetchError};

pub struct HttpSource {
    client: reqwest::Client,
    url: String,
    query: Vec<(String, String)>,
    content_pointer: String,
    timeout: Duration,
}

impl HttpSource {
    pub fn new(
        url: impl Into<String>,
        query: Vec<(String, String)>,
        content_pointer: impl Into<String>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            query,
            content_pointer: content_pointer.into(),
            timeout,
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let query = config
            .query
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self::new(
            config.url.clone(),
            query,
            config.content_pointer.clone(),
            Duration::from_secs(config.timeout_secs),
            &config.user_agent,
        )
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl ContentSource for HttpSource {
    async fn fetch(&self) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(&self.url)
            .query(&self.query)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = resp.text().await.map_err(|e| self.classify(e))?;
        extract_content(&body, &self.content_pointer)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Pick the text to hash out of a response body.
///
/// An empty pointer hashes the whole body.  Otherwise the body must be JSON
/// and the pointer must resolve; string values are used as-is and anything
/// else is hashed in its compact JSON form.
pub fn extract_content(body: &str, pointer: &str) -> Result<String, FetchError> {
    if pointer.is_empty() {
        return Ok(body.to_string());
    }

    let json: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Malformed(format!("response is not JSON: {e}")))?;

    match json.pointer(pointer) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => Ok(other.to_string()),
        None => {
            // The MediaWiki API reports failures in-band with HTTP 200.
            if let Some(info) = json["error"]["info"].as_str() {
                return Err(FetchError::Malformed(format!("upstream error: {info}")));
            }
            Err(FetchError::Malformed(format!("no value at `{pointer}`")))
        }
    }
}
