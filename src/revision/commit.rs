//! Upstream commit metadata.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `<description> [(#<pr>)] (<author> on <date>)`, anchored at the end of the text.
static ATTRIBUTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?s)(?P<desc>.*?)\s*(?:\((?P<pr>#\d+)\))?\s*\((?P<author>[^()]*?) on (?P<date>[^()]*?)\)\s*$",
    )
    .expect("attribution pattern is valid")
});

/// An upstream commit that has not yet been merged downstream.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// The upstream commit id.
    pub id: String,
    /// The commit description. The raw metadata text if it carried no attribution.
    pub description: String,
    /// The pull request marker, e.g. `#123`.
    pub pull_request: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
}

impl Commit {
    /// Parses the free-text metadata the revision tool reports for commit `id`.
    ///
    /// Text without a trailing `(<author> on <date>)` attribution is kept verbatim as the
    /// description, with no structured fields.
    pub fn parse(id: &str, raw: &str) -> Self {
        let Some(captures) = ATTRIBUTION.captures(raw) else {
            return Self {
                id: id.to_string(),
                description: raw.to_string(),
                pull_request: None,
                author: None,
                date: None,
            };
        };

        let field = |name: &str| captures.name(name).map(|m| m.as_str().to_string());
        Self {
            id: id.to_string(),
            description: field("desc").unwrap_or_default(),
            pull_request: field("pr"),
            author: field("author"),
            date: field("date"),
        }
    }

    /// Link to the commit on the upstream web host.
    pub fn url(&self, upstream_url: &str) -> String {
        format!("{}/commit/{}", upstream_url.trim_end_matches('/'), self.id)
    }

    /// Link to the commit's pull request, if it names one.
    pub fn pull_request_url(&self, upstream_url: &str) -> Option<String> {
        self.pull_request.as_ref().map(|pr| {
            format!(
                "{}/pull/{}",
                upstream_url.trim_end_matches('/'),
                pr.trim_start_matches('#')
            )
        })
    }
}
