//! Label extraction from fetched HTML via a CSS selector.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use scraper::{Html, Selector};

use pagewatch_watch::LabelFn;

/// Build a [`LabelFn`] that returns the whitespace-normalised text of every
/// element matching `selector`, deduplicated, in document order.
///
/// The selector is checked here so a typo fails at startup rather than
/// silently producing no labels on every tick.
pub fn selector_labels(selector: &str) -> Result<LabelFn> {
    let selector = parse_selector(selector)?;
    Ok(Arc::new(move |content: &str| extract_labels(&selector, content)))
}

pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("invalid label selector `{selector}`: {e}"))
}

pub fn extract_labels(selector: &Selector, content: &str) -> Vec<String> {
    let document = Html::parse_document(content);
    let mut labels: Vec<String> = Vec::new();
    for element in document.select(selector) {
        let text = element
            .text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ");
        if !text.is_empty() && !labels.contains(&text) {
            labels.push(text);
        }
    }
    labels
}
