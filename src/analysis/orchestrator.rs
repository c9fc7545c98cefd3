//! Coordinates the engines for a full analysis run.
//!
//! Pattern matching runs first and answers every item. Items it marks
//! not-applicable, and items owned by the link validator, are withheld from
//! the semantic pass. Whatever the semantic pass produces is reconciled
//! with the deterministic verdicts at merge.

use std::sync::Arc;

use tracing::{debug, info};

use crate::analysis::link::LinkValidator;
use crate::analysis::merger::ResultMerger;
use crate::analysis::pattern::{PatternEngine, TriggerConfig};
use crate::analysis::semantic::SemanticEngine;
use crate::analysis::types::{AnalysisConfig, AnalysisError, AnalysisReport, ItemStatus};
use crate::checklist::{AdditionalContext, ChecklistItem};
use crate::document::DocumentText;
use crate::judge::OutlineJudge;

pub struct AnalysisOrchestrator {
    pattern: PatternEngine,
    semantic: SemanticEngine,
    links: LinkValidator,
    merger: ResultMerger,
    config: AnalysisConfig,
}

impl AnalysisOrchestrator {
    pub fn new(judge: Arc<dyn OutlineJudge>, config: AnalysisConfig) -> Self {
        Self {
            pattern: PatternEngine::new(TriggerConfig::default()),
            semantic: SemanticEngine::new(judge),
            links: LinkValidator::new(config.live_link_checks),
            merger: ResultMerger::new(),
            config,
        }
    }

    /// Replace the default trigger phrases, e.g. with a tuned YAML config.
    pub fn with_triggers(mut self, triggers: TriggerConfig) -> Self {
        self.pattern = PatternEngine::new(triggers);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run the full pipeline over the checklist.
    pub async fn analyze(
        &self,
        document: &DocumentText,
        items: &[ChecklistItem],
        context: &AdditionalContext,
    ) -> Result<AnalysisReport, AnalysisError> {
        if document.is_empty() {
            return Err(AnalysisError::EmptyDocument);
        }
        if items.is_empty() {
            return Err(AnalysisError::EmptyChecklist);
        }

        let mut unique: Vec<ChecklistItem> = Vec::with_capacity(items.len());
        for item in items {
            if !unique.iter().any(|u| u == item) {
                unique.push(item.clone());
            }
        }

        let pattern_results: std::collections::HashMap<_, _> = unique
            .iter()
            .map(|item| {
                let result = self.pattern.evaluate(item, document, context);
                (item.normalized().to_string(), result)
            })
            .collect();

        let link_report = if unique.iter().any(ChecklistItem::is_link_item) {
            Some(self.links.validate(document).await)
        } else {
            None
        };

        // Items the deterministic engines already settled stay out of the
        // semantic pass.
        let semantic_items: Vec<ChecklistItem> = unique
            .iter()
            .filter(|item| !item.is_link_item())
            .filter(|item| {
                pattern_results
                    .get(item.normalized())
                    .map(|r| r.status != ItemStatus::Na)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        debug!(
            total = unique.len(),
            semantic = semantic_items.len(),
            "analysis pass starting"
        );

        let semantic_results = self
            .semantic
            .analyze_batch(&semantic_items, document, context, &self.config)
            .await;

        let report = self.merger.merge(
            &unique,
            &pattern_results,
            &semantic_results,
            link_report.as_ref(),
        );
        info!(
            total = report.summary.total,
            present = report.summary.present,
            missing = report.summary.missing,
            na = report.summary.na,
            "analysis complete"
        );
        Ok(report)
    }
}
