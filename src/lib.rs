//! Syllascan checks course outlines against an institutional checklist.
//!
//! A deterministic pattern-matching engine answers every checklist item
//! from keyword signals and grade-table cross-checks. An LLM-backed
//! semantic engine re-judges items with majority voting, and a link
//! validator settles link-related items outright. The merge step
//! reconciles the three, always preferring the most reliable verdict
//! available and degrading to the deterministic answer when the judge is
//! unreachable.
//!
//! ```no_run
//! use std::sync::Arc;
//! use syllascan::{AnalysisConfig, AnalyzeRequest, OpenAiJudge, OpenAiJudgeConfig, SyllascanApi};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let judge = OpenAiJudge::new(OpenAiJudgeConfig::from_env())?;
//! let api = SyllascanApi::new(Arc::new(judge), AnalysisConfig::default());
//! let report = api
//!     .analyze(AnalyzeRequest::from_text("review-1", "Course Outline ..."))
//!     .await?;
//! println!("{} of {} items present", report.summary.present, report.summary.total);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod api;
pub mod checklist;
pub mod document;
pub mod judge;
pub mod store;

pub use analysis::{
    AnalysisConfig, AnalysisError, AnalysisReport, AnalysisSummary, ItemResult, ItemStatus,
    Method, TriggerConfig,
};
pub use api::{AnalyzeRequest, ApiError, DocumentSource, SyllascanApi};
pub use checklist::{default_checklist, parse_checklist, AdditionalContext, ChecklistItem};
pub use document::{extract_text, DocumentText, ExtractionError};
pub use judge::{JudgeError, MockJudge, OpenAiJudge, OpenAiJudgeConfig, OutlineJudge};
pub use store::{AnalysisStore, EvidenceMatch, StoredAnalysis};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
