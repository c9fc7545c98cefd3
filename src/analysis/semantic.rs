//! Semantic analysis engine.
//!
//! Delegates each checklist item to the outline judge and aggregates
//! independent calls by majority vote. Judge failures never surface as
//! errors here: an item whose every vote failed gets one targeted
//! second-chance call, and failing that, the error-fallback placeholder,
//! which tells the merge step to substitute the pattern verdict.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::analysis::types::{AnalysisConfig, ItemResult, ItemStatus, Method};
use crate::checklist::{AdditionalContext, ChecklistItem};
use crate::document::DocumentText;
use crate::judge::{JudgeRequest, JudgeVerdict, OutlineJudge, Perspective};

/// Runs multi-pass semantic verification over batches of items.
pub struct SemanticEngine {
    judge: Arc<dyn OutlineJudge>,
}

impl SemanticEngine {
    pub fn new(judge: Arc<dyn OutlineJudge>) -> Self {
        Self { judge }
    }

    /// Analyze all items, keyed by normalized item text in the output.
    ///
    /// Items are grouped into small batches and processed concurrently up
    /// to the configured bound. Batches still outstanding when the
    /// wall-clock budget expires are abandoned; their items simply do not
    /// appear in the map and fall back to pattern verdicts at merge.
    pub async fn analyze_batch(
        &self,
        items: &[ChecklistItem],
        document: &DocumentText,
        context: &AdditionalContext,
        config: &AnalysisConfig,
    ) -> HashMap<String, ItemResult> {
        let mut results = HashMap::new();
        if config.api_attempts == 0 || items.is_empty() {
            return results;
        }

        let excerpt = Arc::new(document.excerpt(config.max_document_chars));
        let context_text = Arc::new(context.as_str().to_string());
        let semaphore = Arc::new(Semaphore::new(config.llm_concurrency.max(1)));
        let batch_size = config.effective_batch_size();

        let mut set: JoinSet<Vec<(String, ItemResult)>> = JoinSet::new();
        for batch in items.chunks(batch_size) {
            let batch: Vec<ChecklistItem> = batch.to_vec();
            let judge = Arc::clone(&self.judge);
            let excerpt = Arc::clone(&excerpt);
            let context_text = Arc::clone(&context_text);
            let semaphore = Arc::clone(&semaphore);
            let attempts = config.api_attempts;

            set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return Vec::new();
                };
                let mut out = Vec::with_capacity(batch.len());
                for item in &batch {
                    let result =
                        judge_item(judge.as_ref(), item, &excerpt, &context_text, attempts).await;
                    out.push((item.normalized().to_string(), result));
                }
                out
            });
        }

        let deadline = tokio::time::sleep(config.budget);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => {
                    warn!(
                        budget_secs = config.budget.as_secs(),
                        finished = results.len(),
                        total = items.len(),
                        "semantic budget exhausted, abandoning outstanding batches"
                    );
                    set.abort_all();
                    break;
                }
                joined = set.join_next() => match joined {
                    Some(Ok(batch_results)) => {
                        for (key, result) in batch_results {
                            results.insert(key, result);
                        }
                    }
                    Some(Err(e)) => warn!(error = %e, "semantic batch task failed"),
                    None => break,
                },
            }
        }

        info!(
            analyzed = results.len(),
            total = items.len(),
            "semantic pass complete"
        );
        results
    }
}

/// Judge one item: `attempts` independent calls aggregated by majority vote.
///
/// Per-call retries and timeouts belong to the judge implementation; each
/// loop iteration here is one vote.
async fn judge_item(
    judge: &dyn OutlineJudge,
    item: &ChecklistItem,
    excerpt: &str,
    context: &str,
    attempts: u32,
) -> ItemResult {
    let mut verdicts: Vec<JudgeVerdict> = Vec::with_capacity(attempts as usize);

    for attempt in 0..attempts {
        let request = JudgeRequest {
            item: item.text().to_string(),
            document_excerpt: excerpt.to_string(),
            context: context.to_string(),
            perspective: Perspective::for_attempt(attempt),
        };
        match judge.judge(&request).await {
            Ok(verdict) => verdicts.push(verdict.normalized()),
            Err(e) => {
                debug!(item = item.text(), attempt, error = %e, "verification attempt failed");
            }
        }
    }

    if verdicts.is_empty() {
        // Every voting attempt failed. One targeted second-chance pass with
        // the auditing framing before giving up on this item.
        let request = JudgeRequest {
            item: item.text().to_string(),
            document_excerpt: excerpt.to_string(),
            context: context.to_string(),
            perspective: Perspective::Administrator,
        };
        match judge.judge(&request).await {
            Ok(verdict) => {
                let verdict = verdict.normalized();
                let status = if verdict.present {
                    ItemStatus::Present
                } else {
                    ItemStatus::Missing
                };
                let mut result = ItemResult::new(
                    item.text(),
                    status,
                    verdict.confidence,
                    format!("Second-chance review: {}", verdict.explanation),
                    verdict.evidence,
                    Method::AiGeneralAnalysis,
                )
                .with_votes(1, verdict.present as u32);
                result.second_chance = true;
                return result;
            }
            Err(e) => {
                warn!(item = item.text(), error = %e, "all semantic attempts failed");
                return ItemResult::missing(
                    item.text(),
                    0.0,
                    "Semantic analysis failed for this item.",
                    "",
                    Method::AiGeneralAnalysisFallback,
                );
            }
        }
    }

    aggregate(item, &verdicts)
}

/// Majority vote across successful verdicts.
///
/// `present` iff votes/attempts >= 0.5; confidence reports the raw present
/// vote share so callers can read consensus strength directly off it,
/// together with the attempt counters.
fn aggregate(item: &ChecklistItem, verdicts: &[JudgeVerdict]) -> ItemResult {
    let attempts = verdicts.len() as u32;
    let votes = verdicts.iter().filter(|v| v.present).count() as u32;
    let share = votes as f64 / attempts as f64;
    let present = share >= 0.5;

    // Explanation and evidence come from the highest-confidence verdict on
    // the winning side.
    let representative = verdicts
        .iter()
        .filter(|v| v.present == present)
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence));

    let (explanation, evidence) = match representative {
        Some(v) => (v.explanation.clone(), v.evidence.clone()),
        None => (String::new(), String::new()),
    };

    let status = if present {
        ItemStatus::Present
    } else {
        ItemStatus::Missing
    };
    ItemResult::new(
        item.text(),
        status,
        share,
        explanation,
        evidence,
        Method::AiGeneralAnalysis,
    )
    .with_votes(attempts, votes)
}
