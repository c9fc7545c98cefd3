//! Outline judge: the capability interface for semantic presence judgments.
//!
//! Two implementations:
//! - `OpenAiJudge`: speaks the OpenAI chat-completions protocol over HTTP (production)
//! - `MockJudge`: returns scripted verdicts (testing)
//!
//! The voting, retry, and merge logic upstream depends only on the
//! `OutlineJudge` trait, never on how the model is reached.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The framing used when phrasing a judgment prompt.
///
/// Independent voting attempts rotate across perspectives so consensus is
/// not an artifact of a single phrasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    Instructor,
    Student,
    Administrator,
}

impl Perspective {
    pub fn for_attempt(attempt: u32) -> Self {
        match attempt % 3 {
            0 => Perspective::Instructor,
            1 => Perspective::Student,
            _ => Perspective::Administrator,
        }
    }

    fn framing(&self) -> &'static str {
        match self {
            Perspective::Instructor => {
                "an instructor preparing this outline for departmental review"
            }
            Perspective::Student => {
                "a student reading this outline to understand what the course requires"
            }
            Perspective::Administrator => {
                "an academic administrator auditing this outline for policy compliance"
            }
        }
    }
}

/// One judgment request: a single checklist item against a document excerpt.
#[derive(Debug, Clone)]
pub struct JudgeRequest {
    pub item: String,
    pub document_excerpt: String,
    pub context: String,
    pub perspective: Perspective,
}

/// A structured presence verdict returned by a judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub present: bool,
    pub confidence: f64,
    pub explanation: String,
    pub evidence: String,
}

impl JudgeVerdict {
    /// Clamp confidence into [0,1] and bound the explanation length.
    pub fn normalized(mut self) -> Self {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self.explanation = truncate_explanation(&self.explanation);
        self
    }
}

/// Bound a human-readable explanation to 150 characters.
pub fn truncate_explanation(text: &str) -> String {
    if text.chars().count() <= 150 {
        return text.to_string();
    }
    let mut out: String = text.chars().take(147).collect();
    out.push_str("...");
    out
}

/// Errors from judge calls.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned error: status={status} message={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("malformed verdict: {0}")]
    MalformedVerdict(String),

    #[error("judge call timed out after {0:?}")]
    Timeout(Duration),

    #[error("judge unavailable: {0}")]
    Unavailable(String),
}

impl JudgeError {
    /// Whether a fresh attempt could plausibly succeed.
    ///
    /// Timeouts, transport failures, rate limits, server errors, and
    /// malformed model output are all retried. Client errors other than 429
    /// are not; they will not fix themselves.
    pub fn is_retryable(&self) -> bool {
        match self {
            JudgeError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            JudgeError::Upstream { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            JudgeError::MalformedVerdict(_) | JudgeError::Timeout(_) => true,
            JudgeError::Unavailable(_) => false,
        }
    }
}

/// Bounded retry with escalating per-call timeouts.
///
/// An explicit value object so the semantic engine and the HTTP judge share
/// one definition of "try again" instead of nesting ad hoc handlers.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Timeout for the first attempt.
    pub base_timeout: Duration,
    /// Added to the timeout on each subsequent attempt.
    pub timeout_step: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_timeout: Duration::from_secs(20),
            timeout_step: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_millis(5_000),
        }
    }
}

impl RetryPolicy {
    /// Per-call timeout for a given zero-based attempt index.
    pub fn timeout_for(&self, attempt: u32) -> Duration {
        self.base_timeout + self.timeout_step * attempt
    }

    /// Exponential backoff with jitter before the given retry.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let mult = 1u128.checked_shl(attempt).unwrap_or(u128::MAX);
        let base_ms = self.initial_backoff.as_millis().saturating_mul(mult);
        let capped_ms = std::cmp::min(base_ms, self.max_backoff.as_millis()) as u64;
        let jitter_cap = std::cmp::max(1, capped_ms / 4);
        Duration::from_millis(capped_ms.saturating_add(pseudo_jitter_ms(jitter_cap)))
    }
}

fn pseudo_jitter_ms(max_inclusive: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    (now.subsec_nanos() as u64) % (max_inclusive + 1)
}

/// Capability interface for semantic presence judgment.
#[async_trait]
pub trait OutlineJudge: Send + Sync {
    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError>;
}

/// Configuration for the HTTP judge.
#[derive(Debug, Clone)]
pub struct OpenAiJudgeConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub retry: RetryPolicy,
}

impl Default for OpenAiJudgeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4-turbo".to_string(),
            temperature: 0.1,
            max_tokens: 600,
            retry: RetryPolicy::default(),
        }
    }
}

impl OpenAiJudgeConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        config.api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            config.model = model;
        }
        config
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorEnvelope {
    error: UpstreamErrorObject,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorObject {
    message: Option<String>,
}

/// Tolerant wire form of a verdict; models do not always emit clean types.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    present: serde_json::Value,
    #[serde(default)]
    confidence: serde_json::Value,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    evidence: String,
}

/// HTTP judge speaking the OpenAI chat-completions protocol.
pub struct OpenAiJudge {
    config: OpenAiJudgeConfig,
    http: reqwest::Client,
}

impl OpenAiJudge {
    pub fn new(config: OpenAiJudgeConfig) -> Result<Self, JudgeError> {
        let http = reqwest::Client::builder()
            .user_agent("syllascan")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &OpenAiJudgeConfig {
        &self.config
    }

    fn system_message(perspective: Perspective) -> String {
        format!(
            "You are an expert academic policy compliance checker reviewing a course \
             outline as {}. Judge the requirement contextually: consider paraphrases \
             and restructured sections, and do not rely on exact keyword matching. \
             Be strict; if compliance is unclear, the requirement is not met. \
             Respond with a single JSON object with keys \"present\" (boolean), \
             \"confidence\" (number in [0,1]), \"explanation\" (under 150 characters), \
             and \"evidence\" (a direct quote from the outline, or \"\").",
            perspective.framing()
        )
    }

    fn user_message(request: &JudgeRequest) -> String {
        let mut message = format!(
            "CHECKLIST REQUIREMENT:\n{}\n\nCOURSE OUTLINE TEXT:\n{}\n",
            request.item, request.document_excerpt
        );
        if !request.context.trim().is_empty() {
            message.push_str(&format!("\nADDITIONAL CONTEXT FROM THE CALLER:\n{}\n", request.context));
        }
        message.push_str("\nReturn only the JSON object. No markdown, no surrounding text.");
        message
    }

    async fn call_once(
        &self,
        request: &JudgeRequest,
        timeout: Duration,
    ) -> Result<JudgeVerdict, JudgeError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: Self::system_message(request.perspective),
                },
                ChatMessage {
                    role: "user",
                    content: Self::user_message(request),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let mut http_request = self.http.post(&url).timeout(timeout).json(&body);
        if let Some(key) = &self.config.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<UpstreamErrorEnvelope>(&text)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| text.chars().take(200).collect());
            return Err(JudgeError::Upstream { status, message });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| JudgeError::MalformedVerdict(format!("invalid completion JSON: {e}")))?;
        let content = completion
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| JudgeError::MalformedVerdict("completion had no content".to_string()))?;

        parse_verdict(content)
    }
}

/// Extract and normalize a verdict from model output.
///
/// Models sometimes wrap the JSON in prose; take the outermost braces.
pub fn parse_verdict(text: &str) -> Result<JudgeVerdict, JudgeError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => {
            return Err(JudgeError::MalformedVerdict(
                "no JSON object found in response".to_string(),
            ))
        }
    };

    let raw: RawVerdict = serde_json::from_str(json)
        .map_err(|e| JudgeError::MalformedVerdict(format!("verdict JSON did not parse: {e}")))?;

    let present = match &raw.present {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => s.eq_ignore_ascii_case("true"),
        other => {
            return Err(JudgeError::MalformedVerdict(format!(
                "present field was neither bool nor string: {other}"
            )))
        }
    };
    let confidence = match &raw.confidence {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.5),
        serde_json::Value::String(s) => s.parse().unwrap_or(0.5),
        _ => 0.5,
    };

    Ok(JudgeVerdict {
        present,
        confidence,
        explanation: raw.explanation,
        evidence: raw.evidence,
    }
    .normalized())
}

#[async_trait]
impl OutlineJudge for OpenAiJudge {
    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError> {
        let retry = &self.config.retry;
        let mut attempt: u32 = 0;
        loop {
            let timeout = retry.timeout_for(attempt);
            let result = match tokio::time::timeout(timeout, self.call_once(request, timeout)).await
            {
                Ok(result) => result,
                Err(_) => Err(JudgeError::Timeout(timeout)),
            };
            match result {
                Ok(verdict) => return Ok(verdict),
                Err(e) => {
                    if attempt >= retry.max_retries || !e.is_retryable() {
                        return Err(e);
                    }
                    let delay = retry.backoff_delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "judge call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Scripted response for one item in `MockJudge`: a verdict or a failure.
type ScriptedCall = Result<JudgeVerdict, String>;

/// Mock judge for testing: returns scripted verdicts keyed by normalized
/// item text. Sequences pop one call at a time; the last entry repeats.
#[derive(Default)]
pub struct MockJudge {
    scripts: Mutex<HashMap<String, Vec<ScriptedCall>>>,
    fail_unscripted: bool,
}

impl MockJudge {
    pub fn new() -> Self {
        Self::default()
    }

    /// A judge whose every call fails, including unscripted ones.
    pub fn failing() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fail_unscripted: true,
        }
    }

    /// Always return this verdict for the item.
    pub fn with_verdict(self, item: &str, verdict: JudgeVerdict) -> Self {
        self.with_sequence(item, vec![Ok(verdict)])
    }

    /// Return these calls in order; the last repeats once exhausted.
    pub fn with_sequence(self, item: &str, calls: Vec<ScriptedCall>) -> Self {
        {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.insert(crate::checklist::normalize(item), calls);
        }
        self
    }
}

/// Shorthand verdict constructor for tests.
pub fn verdict(present: bool, confidence: f64, explanation: &str, evidence: &str) -> JudgeVerdict {
    JudgeVerdict {
        present,
        confidence,
        explanation: explanation.to_string(),
        evidence: evidence.to_string(),
    }
}

#[async_trait]
impl OutlineJudge for MockJudge {
    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError> {
        let key = crate::checklist::normalize(&request.item);
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(&key) {
            Some(calls) if !calls.is_empty() => {
                let call = if calls.len() == 1 {
                    calls[0].clone()
                } else {
                    calls.remove(0)
                };
                call.map_err(JudgeError::MalformedVerdict)
            }
            _ if self.fail_unscripted => Err(JudgeError::MalformedVerdict(
                "mock judge configured to fail".to_string(),
            )),
            _ => Err(JudgeError::Unavailable(format!(
                "no scripted verdict for item '{}'",
                request.item
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_verdict_accepts_clean_json() {
        let v = parse_verdict(
            r#"{"present": true, "confidence": 0.8, "explanation": "found", "evidence": "quote"}"#,
        )
        .unwrap();
        assert!(v.present);
        assert!((v.confidence - 0.8).abs() < f64::EPSILON);
        assert_eq!(v.evidence, "quote");
    }

    #[test]
    fn parse_verdict_tolerates_surrounding_prose() {
        let v = parse_verdict(
            "Here is my judgment:\n{\"present\": false, \"confidence\": 0.9, \"explanation\": \"missing\", \"evidence\": \"\"}\nDone.",
        )
        .unwrap();
        assert!(!v.present);
    }

    #[test]
    fn parse_verdict_coerces_string_fields() {
        let v = parse_verdict(r#"{"present": "true", "confidence": "0.75"}"#).unwrap();
        assert!(v.present);
        assert!((v.confidence - 0.75).abs() < f64::EPSILON);
        assert_eq!(v.explanation, "");
    }

    #[test]
    fn parse_verdict_clamps_confidence() {
        let v = parse_verdict(r#"{"present": true, "confidence": 3.5}"#).unwrap();
        assert!((v.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_verdict_rejects_prose_only() {
        assert!(parse_verdict("the item is present, trust me").is_err());
    }

    #[test]
    fn explanation_truncated_to_150_chars() {
        let long = "x".repeat(200);
        let truncated = truncate_explanation(&long);
        assert_eq!(truncated.chars().count(), 150);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn retry_policy_escalates_timeout() {
        let policy = RetryPolicy::default();
        assert!(policy.timeout_for(1) > policy.timeout_for(0));
        assert!(policy.timeout_for(2) > policy.timeout_for(1));
    }

    #[test]
    fn backoff_stays_within_cap_plus_jitter() {
        let policy = RetryPolicy::default();
        for attempt in 0..10 {
            let delay = policy.backoff_delay(attempt);
            assert!(delay <= policy.max_backoff + policy.max_backoff / 4 + Duration::from_millis(1));
        }
    }

    #[test]
    fn perspectives_rotate() {
        assert_eq!(Perspective::for_attempt(0), Perspective::Instructor);
        assert_eq!(Perspective::for_attempt(1), Perspective::Student);
        assert_eq!(Perspective::for_attempt(2), Perspective::Administrator);
        assert_eq!(Perspective::for_attempt(3), Perspective::Instructor);
    }

    #[tokio::test]
    async fn mock_judge_pops_sequences() {
        let judge = MockJudge::new().with_sequence(
            "Late Policy",
            vec![
                Ok(verdict(true, 0.9, "present", "")),
                Ok(verdict(false, 0.8, "missing", "")),
            ],
        );
        let request = JudgeRequest {
            item: "late   policy".to_string(),
            document_excerpt: String::new(),
            context: String::new(),
            perspective: Perspective::Instructor,
        };
        assert!(judge.judge(&request).await.unwrap().present);
        assert!(!judge.judge(&request).await.unwrap().present);
        // Last scripted call repeats.
        assert!(!judge.judge(&request).await.unwrap().present);
    }

    #[tokio::test]
    async fn failing_mock_judge_errors() {
        let judge = MockJudge::failing();
        let request = JudgeRequest {
            item: "anything".to_string(),
            document_excerpt: String::new(),
            context: String::new(),
            perspective: Perspective::Student,
        };
        assert!(judge.judge(&request).await.is_err());
    }

    // Requires OPENAI_API_KEY; run with `--features real_llm -- --ignored`.
    #[cfg(feature = "real_llm")]
    #[tokio::test]
    #[ignore]
    async fn live_judge_returns_a_verdict() {
        let judge = OpenAiJudge::new(OpenAiJudgeConfig::from_env()).unwrap();
        let request = JudgeRequest {
            item: "Instructor email address is provided".to_string(),
            document_excerpt: "Instructor: Dr. Lee\nEmail: lee@ucalgary.ca\n".to_string(),
            context: String::new(),
            perspective: Perspective::Instructor,
        };
        let verdict = judge.judge(&request).await.unwrap();
        assert!(verdict.confidence >= 0.0 && verdict.confidence <= 1.0);
    }
}
