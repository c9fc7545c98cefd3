//! Session-keyed storage for completed analyses.
//!
//! Each analysis run is stored under a caller-supplied session id, so
//! concurrent reviews never observe each other's results. Evidence lookup
//! reads the stored report and document only; it never re-runs analysis.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::types::AnalysisReport;
use crate::checklist::ChecklistItem;
use crate::document::DocumentText;

const DEFAULT_CAPACITY: usize = 64;

/// Longest excerpt returned by evidence lookup.
const EXCERPT_CHARS: usize = 300;

const STOPWORDS: &[&str] = &[
    "the", "and", "with", "that", "this", "from", "are", "for", "has", "have",
    "does", "each", "all", "any", "been", "was", "were", "will", "would",
];

/// One completed analysis, frozen at completion time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAnalysis {
    pub document: DocumentText,
    pub report: AnalysisReport,
    pub created_at: DateTime<Utc>,
}

/// Outcome of an evidence lookup for one checklist item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceMatch {
    pub found: bool,
    /// Verbatim excerpt from the stored document, or empty.
    pub excerpt: String,
    /// Whether the item belongs to the grade-table family, which widens
    /// the search to weight lines.
    pub is_grade_item: bool,
}

/// Bounded store of analyses keyed by session id.
pub struct AnalysisStore {
    sessions: DashMap<String, StoredAnalysis>,
    capacity: usize,
    /// Serializes the capacity check, eviction, and insert; concurrent
    /// inserts of new sessions must not both pass the check.
    insert_lock: Mutex<()>,
}

impl Default for AnalysisStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl AnalysisStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            capacity: capacity.max(1),
            insert_lock: Mutex::new(()),
        }
    }

    /// Store a completed run, evicting the oldest sessions at capacity.
    pub fn insert(&self, session: &str, document: DocumentText, report: AnalysisReport) {
        let _guard = self
            .insert_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !self.sessions.contains_key(session) {
            while self.sessions.len() >= self.capacity {
                self.evict_oldest();
            }
        }
        self.sessions.insert(
            session.to_string(),
            StoredAnalysis {
                document,
                report,
                created_at: Utc::now(),
            },
        );
    }

    pub fn get(&self, session: &str) -> Option<StoredAnalysis> {
        self.sessions.get(session).map(|entry| entry.clone())
    }

    pub fn remove(&self, session: &str) -> Option<StoredAnalysis> {
        self.sessions.remove(session).map(|(_, stored)| stored)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Locate document evidence for an item in a stored analysis.
    ///
    /// Prefers the evidence recorded in the report; otherwise searches the
    /// stored document for lines carrying the item's key terms. Returns
    /// `None` only when the session is unknown.
    pub fn locate_evidence(&self, session: &str, item: &ChecklistItem) -> Option<EvidenceMatch> {
        let stored = self.sessions.get(session)?;
        let is_grade_item = item.is_grade_item();

        if let Some(result) = stored.report.result_for(item.text()) {
            if !result.evidence.trim().is_empty() {
                return Some(EvidenceMatch {
                    found: true,
                    excerpt: clip(&result.evidence),
                    is_grade_item,
                });
            }
        }

        let terms = key_terms(item);
        for line in stored.document.lines() {
            let lower = line.to_lowercase();
            let term_hit = terms.iter().any(|t| lower.contains(t));
            let weight_hit = is_grade_item && lower.contains('%');
            if term_hit || weight_hit {
                debug!(session, item = item.text(), "evidence located by line search");
                return Some(EvidenceMatch {
                    found: true,
                    excerpt: clip(line.trim()),
                    is_grade_item,
                });
            }
        }

        Some(EvidenceMatch {
            found: false,
            excerpt: String::new(),
            is_grade_item,
        })
    }

    fn evict_oldest(&self) {
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|entry| entry.value().created_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            debug!(session = %key, "evicting oldest stored analysis");
            self.sessions.remove(&key);
        }
    }
}

fn key_terms(item: &ChecklistItem) -> Vec<String> {
    item.normalized()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3 && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

fn clip(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        text.to_string()
    } else {
        text.chars().take(EXCERPT_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::{AnalysisReport, AnalysisSummary, ItemResult, Method};

    fn report_with(results: Vec<ItemResult>) -> AnalysisReport {
        AnalysisReport {
            summary: AnalysisSummary {
                total: results.len(),
                ..AnalysisSummary::default()
            },
            results,
        }
    }

    #[test]
    fn sessions_are_isolated() {
        let store = AnalysisStore::default();
        store.insert(
            "alpha",
            DocumentText::new("Outline A"),
            report_with(vec![]),
        );
        store.insert(
            "beta",
            DocumentText::new("Outline B"),
            report_with(vec![]),
        );

        assert_eq!(store.get("alpha").unwrap().document.as_str(), "Outline A");
        assert_eq!(store.get("beta").unwrap().document.as_str(), "Outline B");
        assert!(store.get("gamma").is_none());
    }

    #[test]
    fn capacity_evicts_the_oldest_session() {
        let store = AnalysisStore::new(2);
        store.insert("first", DocumentText::new("1"), report_with(vec![]));
        store.insert("second", DocumentText::new("2"), report_with(vec![]));
        store.insert("third", DocumentText::new("3"), report_with(vec![]));

        assert_eq!(store.len(), 2);
        assert!(store.get("first").is_none());
        assert!(store.get("third").is_some());
    }

    #[test]
    fn concurrent_inserts_never_exceed_capacity() {
        let store = AnalysisStore::new(4);
        std::thread::scope(|scope| {
            for t in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..16 {
                        store.insert(
                            &format!("session-{t}-{i}"),
                            DocumentText::new("body"),
                            report_with(vec![]),
                        );
                    }
                });
            }
        });
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn evidence_prefers_the_stored_report() {
        let store = AnalysisStore::default();
        let item = ChecklistItem::new("Late Policy: penalties explained");
        store.insert(
            "s",
            DocumentText::new("Late Policy: 5% per day."),
            report_with(vec![ItemResult::present(
                item.text(),
                0.9,
                "found",
                "Late Policy: 5% per day.",
                Method::AiGeneralAnalysis,
            )]),
        );

        let found = store.locate_evidence("s", &item).unwrap();
        assert!(found.found);
        assert_eq!(found.excerpt, "Late Policy: 5% per day.");
    }

    #[test]
    fn evidence_falls_back_to_line_search() {
        let store = AnalysisStore::default();
        let item = ChecklistItem::new("Textbook information provided");
        store.insert(
            "s",
            DocumentText::new("Intro\nRequired textbook: Algorithms, 4th ed.\nEnd"),
            report_with(vec![ItemResult::present(
                item.text(),
                0.8,
                "found",
                "",
                Method::AiGeneralAnalysis,
            )]),
        );

        let found = store.locate_evidence("s", &item).unwrap();
        assert!(found.found);
        assert!(found.excerpt.contains("Required textbook"));
    }

    #[test]
    fn grade_items_match_weight_lines() {
        let store = AnalysisStore::default();
        let item = ChecklistItem::new("Grade Distribution Table: weights assigned");
        store.insert(
            "s",
            DocumentText::new("Schedule\nAssignments: 40%\nMidterm: 25%"),
            report_with(vec![]),
        );

        let found = store.locate_evidence("s", &item).unwrap();
        assert!(found.found);
        assert!(found.is_grade_item);
        assert!(found.excerpt.contains('%'));
    }

    #[test]
    fn unknown_session_is_none_but_absent_evidence_is_not() {
        let store = AnalysisStore::default();
        let item = ChecklistItem::new("Prohibited materials statement");
        assert!(store.locate_evidence("nope", &item).is_none());

        store.insert("s", DocumentText::new("Nothing relevant here."), report_with(vec![]));
        let result = store.locate_evidence("s", &item).unwrap();
        assert!(!result.found);
        assert!(result.excerpt.is_empty());
    }
}
