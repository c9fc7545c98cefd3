//! Merges verdicts from the analysis engines into one report.
//!
//! Priority per item: link-validation override for link items, then a
//! usable semantic verdict, then the pattern verdict. The error-fallback
//! placeholder a failed semantic item carries is never surfaced; the
//! pattern verdict takes its place.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::analysis::link::LinkReport;
use crate::analysis::types::{
    AnalysisReport, AnalysisSummary, ItemResult, ItemStatus, Method,
};
use crate::checklist::ChecklistItem;

#[derive(Debug, Default)]
pub struct ResultMerger;

impl ResultMerger {
    pub fn new() -> Self {
        Self
    }

    /// Merge engine outputs into a report ordered like `items`.
    ///
    /// Duplicate items (same normalized text) collapse to their first
    /// occurrence. Both maps are keyed by normalized item text.
    pub fn merge(
        &self,
        items: &[ChecklistItem],
        pattern_results: &HashMap<String, ItemResult>,
        semantic_results: &HashMap<String, ItemResult>,
        links: Option<&LinkReport>,
    ) -> AnalysisReport {
        let mut seen: Vec<&str> = Vec::with_capacity(items.len());
        let mut results: Vec<ItemResult> = Vec::with_capacity(items.len());

        for item in items {
            if seen.contains(&item.normalized()) {
                continue;
            }
            seen.push(item.normalized());
            results.push(self.resolve(item, pattern_results, semantic_results, links));
        }

        let summary = summarize(&results);
        AnalysisReport { results, summary }
    }

    fn resolve(
        &self,
        item: &ChecklistItem,
        pattern_results: &HashMap<String, ItemResult>,
        semantic_results: &HashMap<String, ItemResult>,
        links: Option<&LinkReport>,
    ) -> ItemResult {
        if item.is_link_item() {
            if let Some(report) = links {
                return report.override_result(item);
            }
        }

        let semantic = semantic_results.get(item.normalized());
        if let Some(result) = semantic {
            if result.is_usable() {
                return result.clone();
            }
            debug!(item = item.text(), "semantic verdict failed, using pattern verdict");
        }

        match pattern_results.get(item.normalized()) {
            Some(result) => {
                // Keep the verification counters visible even when the
                // semantic verdict was discarded.
                let (attempts, votes) = semantic
                    .map(|s| (s.verification_attempts, s.verification_present_votes))
                    .unwrap_or((0, 0));
                result.clone().with_votes(attempts, votes)
            }
            None => {
                warn!(item = item.text(), "no pattern verdict for item");
                ItemResult::missing(
                    item.text(),
                    0.2,
                    "Could not locate this requirement in the outline.",
                    "",
                    Method::PatternMatching,
                )
            }
        }
    }
}

fn summarize(results: &[ItemResult]) -> AnalysisSummary {
    let mut summary = AnalysisSummary {
        total: results.len(),
        ..AnalysisSummary::default()
    };
    for result in results {
        match result.status {
            ItemStatus::Present => summary.present += 1,
            ItemStatus::Missing => summary.missing += 1,
            ItemStatus::Na => summary.na += 1,
        }
        *summary
            .by_method
            .entry(result.method.as_str().to_string())
            .or_insert(0) += 1;
        summary.verification_calls += result.verification_attempts;
        if result.method == Method::AiGeneralAnalysis {
            summary.ai_reviewed += 1;
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::link::LinkRecord;

    fn keyed(result: ItemResult) -> (String, ItemResult) {
        (crate::checklist::normalize(&result.item), result)
    }

    #[test]
    fn semantic_wins_over_pattern() {
        let items = vec![ChecklistItem::new("Late Policy")];
        let pattern: HashMap<_, _> = [keyed(ItemResult::missing(
            "Late Policy",
            0.2,
            "no match",
            "",
            Method::PatternMatching,
        ))]
        .into();
        let semantic: HashMap<_, _> = [keyed(
            ItemResult::present("Late Policy", 0.8, "found it", "", Method::AiGeneralAnalysis)
                .with_votes(3, 3),
        )]
        .into();

        let report = ResultMerger::new().merge(&items, &pattern, &semantic, None);
        assert_eq!(report.results.len(), 1);
        assert!(report.results[0].present);
        assert_eq!(report.results[0].method, Method::AiGeneralAnalysis);
        assert_eq!(report.summary.ai_reviewed, 1);
        assert_eq!(report.summary.verification_calls, 3);
    }

    #[test]
    fn failed_semantic_falls_back_to_pattern() {
        let items = vec![ChecklistItem::new("Workload")];
        let pattern: HashMap<_, _> = [keyed(ItemResult::present(
            "Workload",
            0.7,
            "matched phrases",
            "3 hours/week",
            Method::PatternMatching,
        ))]
        .into();
        let semantic: HashMap<_, _> = [keyed(ItemResult::missing(
            "Workload",
            0.0,
            "failed",
            "",
            Method::AiGeneralAnalysisFallback,
        ))]
        .into();

        let report = ResultMerger::new().merge(&items, &pattern, &semantic, None);
        let result = &report.results[0];
        assert!(result.present);
        assert_eq!(result.method, Method::PatternMatching);
        assert_eq!(report.summary.ai_reviewed, 0);
    }

    #[test]
    fn link_override_beats_confident_semantic() {
        let items = vec![ChecklistItem::new(
            "Functional Web Links: all links valid and working",
        )];
        let semantic: HashMap<_, _> = [keyed(ItemResult::present(
            "Functional Web Links: all links valid and working",
            0.99,
            "links look fine",
            "",
            Method::AiGeneralAnalysis,
        ))]
        .into();
        let links = LinkReport {
            valid: vec![],
            invalid: vec![LinkRecord {
                url: "http://broken.example/page".into(),
                valid: false,
            }],
        };

        let report =
            ResultMerger::new().merge(&items, &HashMap::new(), &semantic, Some(&links));
        let result = &report.results[0];
        assert!(!result.present);
        assert_eq!(result.method, Method::LinkValidation);
        assert!(result.evidence.contains("broken.example"));
    }

    #[test]
    fn duplicates_collapse_to_first_occurrence() {
        let items = vec![
            ChecklistItem::new("Late  Policy"),
            ChecklistItem::new("late policy"),
            ChecklistItem::new("Workload"),
        ];
        let pattern: HashMap<_, _> = [
            keyed(ItemResult::present("Late  Policy", 0.5, "", "", Method::PatternMatching)),
            keyed(ItemResult::missing("Workload", 0.2, "", "", Method::PatternMatching)),
        ]
        .into();

        let report = ResultMerger::new().merge(&items, &pattern, &HashMap::new(), None);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].item, "Late  Policy");
        assert_eq!(report.results[1].item, "Workload");
        assert_eq!(report.summary.total, 2);
    }

    #[test]
    fn missing_pattern_entry_gets_generic_verdict() {
        let items = vec![ChecklistItem::new("Unmatched item")];
        let report =
            ResultMerger::new().merge(&items, &HashMap::new(), &HashMap::new(), None);
        let result = &report.results[0];
        assert!(!result.present);
        assert!((result.confidence - 0.2).abs() < f64::EPSILON);
    }
}
