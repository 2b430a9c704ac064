//! HTML rendering for the human-facing page.

use pagewatch_watch::LogState;

/// What the index page shows: the most recent record or a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestView {
    pub headlines: Vec<String>,
    pub last_updated: String,
}

impl LatestView {
    /// `None` means no log could be read (nothing polled yet).
    pub fn from_state(state: Option<&LogState>) -> Self {
        match state {
            None => Self {
                headlines: vec!["No data available yet.".to_string()],
                last_updated: "Unknown".to_string(),
            },
            Some(state) => match state.latest() {
                Some(latest) => Self {
                    headlines: latest.labels.clone(),
                    last_updated: latest.last_updated.clone(),
                },
                None => Self {
                    headlines: Vec::new(),
                    last_updated: "No updates available".to_string(),
                },
            },
        }
    }
}

pub(super) fn render_index(view: &LatestView) -> String {
    let items: String = view
        .headlines
        .iter()
        .map(|h| format!("      <li>{}</li>\n", escape_html(h)))
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <title>Page updates</title>
  </head>
  <body>
    <h1>Latest update</h1>
    <ul>
{items}    </ul>
    <p>Last updated: <time>{updated}</time></p>
    <p><a href="/api/updates">Full log (JSON)</a></p>
  </body>
</html>
"#,
        items = items,
        updated = escape_html(&view.last_updated),
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
