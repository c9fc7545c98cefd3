//! The checklist analysis pipeline: deterministic pattern matching,
//! grade-table cross-checks, link validation, semantic verification, and
//! result reconciliation.

pub mod grade_table;
pub mod link;
pub mod merger;
pub mod orchestrator;
pub mod pattern;
pub mod semantic;
pub mod types;

pub use link::{LinkRecord, LinkReport, LinkValidator};
pub use merger::ResultMerger;
pub use orchestrator::AnalysisOrchestrator;
pub use pattern::{PatternEngine, TriggerConfig};
pub use semantic::SemanticEngine;
pub use types::{
    AnalysisConfig, AnalysisError, AnalysisReport, AnalysisSummary, ItemResult, ItemStatus,
    Method,
};
