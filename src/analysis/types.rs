//! Core types for the checklist evaluation pipeline.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::judge::truncate_explanation;

/// Verdict for one checklist item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Present,
    Missing,
    /// The requirement does not apply to this course.
    Na,
}

/// Which engine produced the final verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    PatternMatching,
    AiGeneralAnalysis,
    /// Placeholder emitted when every semantic attempt failed; the merge
    /// step substitutes the pattern result.
    AiGeneralAnalysisFallback,
    LinkValidation,
    GradeTableExtraction,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::PatternMatching => "pattern_matching",
            Method::AiGeneralAnalysis => "ai_general_analysis",
            Method::AiGeneralAnalysisFallback => "ai_general_analysis_fallback",
            Method::LinkValidation => "link_validation",
            Method::GradeTableExtraction => "grade_table_extraction",
        }
    }
}

/// The per-item analysis output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResult {
    /// Original item text, as supplied by the caller.
    pub item: String,
    pub present: bool,
    pub status: ItemStatus,
    /// In [0,1].
    pub confidence: f64,
    /// Bounded to 150 characters.
    pub explanation: String,
    /// Verbatim excerpt from the document, or empty.
    pub evidence: String,
    pub method: Method,
    /// Semantic verification calls that returned a verdict for this item.
    pub verification_attempts: u32,
    /// How many of those voted present.
    pub verification_present_votes: u32,
    /// Set when the verdict came from a targeted second-chance pass.
    #[serde(default)]
    pub second_chance: bool,
}

impl ItemResult {
    pub fn new(
        item: impl Into<String>,
        status: ItemStatus,
        confidence: f64,
        explanation: impl Into<String>,
        evidence: impl Into<String>,
        method: Method,
    ) -> Self {
        Self {
            item: item.into(),
            // A not-applicable requirement is satisfied by definition.
            present: !matches!(status, ItemStatus::Missing),
            status,
            confidence: confidence.clamp(0.0, 1.0),
            explanation: truncate_explanation(&explanation.into()),
            evidence: evidence.into(),
            method,
            verification_attempts: 0,
            verification_present_votes: 0,
            second_chance: false,
        }
    }

    pub fn present(
        item: impl Into<String>,
        confidence: f64,
        explanation: impl Into<String>,
        evidence: impl Into<String>,
        method: Method,
    ) -> Self {
        Self::new(item, ItemStatus::Present, confidence, explanation, evidence, method)
    }

    pub fn missing(
        item: impl Into<String>,
        confidence: f64,
        explanation: impl Into<String>,
        evidence: impl Into<String>,
        method: Method,
    ) -> Self {
        Self::new(item, ItemStatus::Missing, confidence, explanation, evidence, method)
    }

    pub fn not_applicable(item: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self::new(
            item,
            ItemStatus::Na,
            0.9,
            explanation,
            "",
            Method::PatternMatching,
        )
    }

    pub fn with_votes(mut self, attempts: u32, present_votes: u32) -> Self {
        self.verification_attempts = attempts;
        self.verification_present_votes = present_votes;
        self
    }

    /// Whether this result is usable as a final verdict. The error-fallback
    /// placeholder is not; it exists only to signal the merge step.
    pub fn is_usable(&self) -> bool {
        !matches!(self.method, Method::AiGeneralAnalysisFallback)
    }
}

/// Tunables for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Independent semantic verification calls per item. Zero skips the
    /// semantic engine entirely (pattern matching only).
    pub api_attempts: u32,
    /// Items per semantic batch, clamped to 1..=3.
    pub batch_size: usize,
    /// Concurrent semantic batches.
    pub llm_concurrency: usize,
    /// Wall-clock budget for the whole semantic pass. Items left
    /// unprocessed when it expires fall back to pattern verdicts.
    pub budget: Duration,
    /// Probe extracted URLs over the network. Off by default; syntactic
    /// validation always runs.
    pub live_link_checks: bool,
    /// Document prefix passed to the judge.
    pub max_document_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_attempts: 3,
            batch_size: 3,
            llm_concurrency: 2,
            budget: Duration::from_secs(120),
            live_link_checks: false,
            max_document_chars: 12_000,
        }
    }
}

impl AnalysisConfig {
    /// Pattern matching only, no judge calls.
    pub fn pattern_only() -> Self {
        Self {
            api_attempts: 0,
            ..Self::default()
        }
    }

    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, 3)
    }
}

/// Errors surfaced by an analysis run.
///
/// Judge failures never appear here; they degrade to pattern verdicts.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("document text is empty")]
    EmptyDocument,

    #[error("checklist contains no items")]
    EmptyChecklist,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Aggregate statistics over a merged result set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total: usize,
    pub present: usize,
    pub missing: usize,
    pub na: usize,
    /// Result counts keyed by final method tag.
    pub by_method: HashMap<String, usize>,
    /// Semantic verification calls across all items.
    pub verification_calls: u32,
    /// Items with at least one successful semantic verification.
    pub ai_reviewed: usize,
}

/// Merged output of one analysis run, in fixed item order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub results: Vec<ItemResult>,
    pub summary: AnalysisSummary,
}

impl AnalysisReport {
    /// Find a result by normalized item text.
    pub fn result_for(&self, item: &str) -> Option<&ItemResult> {
        let key = crate::checklist::normalize(item);
        self.results
            .iter()
            .find(|r| crate::checklist::normalize(&r.item) == key)
    }

    pub fn missing_items(&self) -> Vec<&ItemResult> {
        self.results
            .iter()
            .filter(|r| r.status == ItemStatus::Missing)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn na_results_count_as_satisfied() {
        let result = ItemResult::not_applicable("Group Work Weight", "no group work");
        assert!(result.present);
        assert_eq!(result.status, ItemStatus::Na);
        assert!((result.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn confidence_is_clamped() {
        let result = ItemResult::present("x", 1.7, "", "", Method::PatternMatching);
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn long_explanations_are_bounded() {
        let result = ItemResult::missing("x", 0.2, "y".repeat(400), "", Method::PatternMatching);
        assert_eq!(result.explanation.chars().count(), 150);
    }

    #[test]
    fn fallback_placeholder_is_not_usable() {
        let result = ItemResult::missing("x", 0.0, "", "", Method::AiGeneralAnalysisFallback);
        assert!(!result.is_usable());
        assert!(ItemResult::missing("x", 0.2, "", "", Method::PatternMatching).is_usable());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&ItemStatus::Na).unwrap(), "\"na\"");
        assert_eq!(
            serde_json::to_string(&Method::AiGeneralAnalysisFallback).unwrap(),
            "\"ai_general_analysis_fallback\""
        );
    }

    #[test]
    fn batch_size_clamped() {
        let mut config = AnalysisConfig::default();
        config.batch_size = 50;
        assert_eq!(config.effective_batch_size(), 3);
        config.batch_size = 0;
        assert_eq!(config.effective_batch_size(), 1);
    }
}
