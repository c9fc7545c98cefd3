//! Link extraction and validation.
//!
//! Policy: a link that cannot be probed (live checks disabled, or the probe
//! fails for network reasons) counts as VALID. Transient network trouble
//! must never flag a syllabus; only a syntactically broken URL does.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::types::{ItemResult, Method};
use crate::checklist::ChecklistItem;
use crate::document::DocumentText;

/// URLs actually probed over the network per run, to protect the wall clock.
pub const MAX_LIVE_CHECKS: usize = 10;

/// How many offending links an override result names.
const EXAMPLE_LINKS: usize = 3;

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:https?://[^\s<>"')\]]+|www\.[A-Za-z0-9][A-Za-z0-9.-]*\.[^\s<>"')\]]+)"#)
        .unwrap()
});

/// One extracted URL and its validity verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRecord {
    pub url: String,
    pub valid: bool,
}

/// Validation output for one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkReport {
    pub valid: Vec<LinkRecord>,
    pub invalid: Vec<LinkRecord>,
}

impl LinkReport {
    pub fn total(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }

    /// The override verdict for a link-related item. Always wins at merge.
    pub fn override_result(&self, item: &ChecklistItem) -> ItemResult {
        if self.invalid.is_empty() {
            let explanation = if self.total() == 0 {
                "No links found in the outline.".to_string()
            } else {
                format!("All {} links in the outline are valid.", self.total())
            };
            ItemResult::present(item.text(), 0.95, explanation, "", Method::LinkValidation)
        } else {
            let examples: Vec<&str> = self
                .invalid
                .iter()
                .take(EXAMPLE_LINKS)
                .map(|l| l.url.as_str())
                .collect();
            ItemResult::missing(
                item.text(),
                0.95,
                format!("{} invalid link(s) found in the outline.", self.invalid.len()),
                examples.join("\n"),
                Method::LinkValidation,
            )
        }
    }
}

/// Extract URL-like substrings, deduplicated in encounter order.
pub fn extract_urls(document: &DocumentText) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for m in URL_RE.find_iter(document.as_str()) {
        let url = m.as_str().trim_end_matches(['.', ',', ';']).to_string();
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

/// Validates links found in a document.
#[derive(Debug, Clone)]
pub struct LinkValidator {
    live_checks: bool,
    probe_timeout: Duration,
    http: reqwest::Client,
}

impl Default for LinkValidator {
    fn default() -> Self {
        Self::new(false)
    }
}

impl LinkValidator {
    pub fn new(live_checks: bool) -> Self {
        Self {
            live_checks,
            probe_timeout: Duration::from_secs(3),
            http: reqwest::Client::new(),
        }
    }

    /// Classify every extracted URL as valid or invalid.
    ///
    /// Syntactic validity requires a well-formed scheme and host. Live
    /// probes only run when enabled, and only for the first
    /// `MAX_LIVE_CHECKS` URLs; an unreachable link stays valid (unknown
    /// counts as valid, see module docs).
    pub async fn validate(&self, document: &DocumentText) -> LinkReport {
        let mut report = LinkReport::default();
        let urls = extract_urls(document);
        debug!(count = urls.len(), "extracted urls from outline");

        for (index, url) in urls.iter().enumerate() {
            let normalized = if url.starts_with("http://") || url.starts_with("https://") {
                url.clone()
            } else {
                format!("http://{url}")
            };

            let parsed = reqwest::Url::parse(&normalized);
            let syntactically_valid = parsed
                .as_ref()
                .map(|u| u.host_str().is_some())
                .unwrap_or(false);

            if !syntactically_valid {
                warn!(url = %url, "malformed url in outline");
                report.invalid.push(LinkRecord {
                    url: url.clone(),
                    valid: false,
                });
                continue;
            }

            let valid = if self.live_checks && index < MAX_LIVE_CHECKS {
                self.probe(&normalized).await
            } else {
                true
            };

            let record = LinkRecord {
                url: url.clone(),
                valid,
            };
            if valid {
                report.valid.push(record);
            } else {
                report.invalid.push(record);
            }
        }

        report
    }

    /// Best-effort reachability check. `None`-like outcomes (timeouts,
    /// connection errors) report true: unknown counts as valid.
    async fn probe(&self, url: &str) -> bool {
        match self
            .http
            .head(url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => {
                // 4xx from the server is a real answer: the link is broken.
                !response.status().is_client_error()
            }
            Err(e) => {
                debug!(url = %url, error = %e, "link probe failed, counting as valid");
                true
            }
        }
    }
}
