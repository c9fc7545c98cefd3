//! High-level entry point for outline compliance review.
//!
//! `SyllascanApi` bundles the analysis pipeline with the session store:
//! callers submit a document plus optional checklist and context, get back
//! the merged report, and can later fetch per-item evidence for the same
//! session without re-running analysis.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::analysis::orchestrator::AnalysisOrchestrator;
use crate::analysis::pattern::TriggerConfig;
use crate::analysis::types::{AnalysisConfig, AnalysisError, AnalysisReport, AnalysisSummary};
use crate::checklist::{self, AdditionalContext, ChecklistItem};
use crate::document::{self, DocumentText, ExtractionError};
use crate::judge::OutlineJudge;
use crate::store::{AnalysisStore, EvidenceMatch};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("unknown session: {0}")]
    UnknownSession(String),
}

/// Where the outline text comes from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Text(String),
    Path(PathBuf),
}

/// One analysis request.
#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    /// Session id the results are stored under.
    pub session: String,
    pub document: DocumentSource,
    /// Raw checklist text; the built-in institutional checklist when absent.
    pub checklist: Option<String>,
    /// Free-text course context, e.g. "this course has no final exam".
    pub context: Option<String>,
    /// Override for semantic verification calls per item.
    pub api_attempts: Option<u32>,
}

impl AnalyzeRequest {
    pub fn from_text(session: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            document: DocumentSource::Text(text.into()),
            checklist: None,
            context: None,
            api_attempts: None,
        }
    }
}

pub struct SyllascanApi {
    judge: Arc<dyn OutlineJudge>,
    config: AnalysisConfig,
    triggers: TriggerConfig,
    store: AnalysisStore,
}

impl SyllascanApi {
    pub fn new(judge: Arc<dyn OutlineJudge>, config: AnalysisConfig) -> Self {
        Self {
            judge,
            config,
            triggers: TriggerConfig::default(),
            store: AnalysisStore::default(),
        }
    }

    pub fn with_triggers(mut self, triggers: TriggerConfig) -> Self {
        self.triggers = triggers;
        self
    }

    /// Run a full analysis and store the report under the session id.
    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalysisReport, ApiError> {
        let document = match &request.document {
            DocumentSource::Text(text) => DocumentText::new(text.clone()),
            DocumentSource::Path(path) => document::extract_text(path)?,
        };

        let items: Vec<ChecklistItem> = match &request.checklist {
            Some(text) => checklist::parse_checklist(text),
            None => checklist::default_checklist(),
        };

        let context = request
            .context
            .as_deref()
            .map(AdditionalContext::new)
            .unwrap_or_default();

        let mut config = self.config.clone();
        if let Some(attempts) = request.api_attempts {
            config.api_attempts = attempts;
        }

        info!(
            session = %request.session,
            items = items.len(),
            api_attempts = config.api_attempts,
            "starting outline analysis"
        );
        let orchestrator = AnalysisOrchestrator::new(Arc::clone(&self.judge), config)
            .with_triggers(self.triggers.clone());
        let report = orchestrator.analyze(&document, &items, &context).await?;

        self.store
            .insert(&request.session, document, report.clone());
        Ok(report)
    }

    /// The stored report for a session.
    pub fn report(&self, session: &str) -> Result<AnalysisReport, ApiError> {
        self.store
            .get(session)
            .map(|stored| stored.report)
            .ok_or_else(|| ApiError::UnknownSession(session.to_string()))
    }

    /// Aggregate statistics for a stored session.
    pub fn summary(&self, session: &str) -> Result<AnalysisSummary, ApiError> {
        self.report(session).map(|report| report.summary)
    }

    /// Evidence for one item from a stored analysis. Reads the stored
    /// report and document only.
    pub fn evidence(&self, session: &str, item: &str) -> Result<EvidenceMatch, ApiError> {
        let item = ChecklistItem::new(item);
        self.store
            .locate_evidence(session, &item)
            .ok_or_else(|| ApiError::UnknownSession(session.to_string()))
    }
}
