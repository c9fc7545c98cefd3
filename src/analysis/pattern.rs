//! Deterministic pattern-matching engine.
//!
//! The fallback of record: every item gets a defined answer here even when
//! no judge call ever happens. Evaluation never fails; the worst case is a
//! missing verdict at confidence 0.2 with a generic explanation.
//!
//! Trigger-phrase lists are tuning data, not algorithmic structure, so they
//! live in `TriggerConfig` (YAML-loadable) while the signal-counting
//! contract stays fixed: base 0.3, +0.2 per independent fired signal,
//! capped at 0.95.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::analysis::grade_table;
use crate::analysis::types::{ItemResult, Method};
use crate::checklist::{self, AdditionalContext, ChecklistItem};
use crate::document::DocumentText;

const BASE_CONFIDENCE: f64 = 0.3;
const SIGNAL_CONFIDENCE: f64 = 0.2;
const MAX_CONFIDENCE: f64 = 0.95;
const FLOOR_CONFIDENCE: f64 = 0.2;
/// Independent signals required before a trigger-based verdict is present.
const MIN_SIGNALS: usize = 2;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]*ucalgary\.ca\b").unwrap());

/// Per-category trigger phrases, externalized as configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub categories: HashMap<String, Vec<String>>,
}

impl TriggerConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn triggers_for(&self, category: &str) -> Option<&[String]> {
        self.categories.get(category).map(Vec::as_slice)
    }
}

const DEFAULT_TRIGGERS: &[(&str, &[&str])] = &[
    (
        "instructor_email",
        &["instructor", "email", "contact", "professor", "ucalgary.ca", "@ucalgary", "reach me"],
    ),
    (
        "course_objectives",
        &["objectives", "outcomes", "goals", "learning outcomes", "upon completion", "students will", "able to", "by the end of this course"],
    ),
    (
        "textbooks",
        &["textbook", "readings", "materials", "required text", "course material", "reading list", "recommended text", "course pack"],
    ),
    (
        "prohibited_materials",
        &["prohibited", "not allowed", "restricted", "not permitted", "generative ai", "ai tools", "academic integrity", "plagiarism"],
    ),
    (
        "course_workload",
        &["workload", "time commitment", "hours per week", "expected effort", "time required", "weekly time", "hours of work"],
    ),
    (
        "grading_scale",
        &["grading scale", "grade scale", "letter grade", "grade conversion", "a+", "a-", "b+", "grade points"],
    ),
    (
        "grade_distribution",
        &["grade distribution", "assignment weights", "assessment weight", "percent", "weight", "worth", "marking scheme", "evaluation"],
    ),
    (
        "group_work",
        &["group work", "group project", "team", "collaborative", "group assignment", "teamwork", "group members"],
    ),
    (
        "assessment_objectives",
        &["assessment", "objective", "learning outcome", "measure", "align", "mapped to", "linked to", "demonstrates"],
    ),
    (
        "due_dates",
        &["due date", "deadline", "due on", "submit by", "submission date", "schedule", "due"],
    ),
    (
        "early_assessment",
        &["30%", "thirty percent", "early feedback", "before last class", "before final", "before end of term", "mid-term", "early in the course"],
    ),
    (
        "post_term_assignments",
        &["after last class", "after term ends", "beyond last day", "past final class", "post-term", "after final lecture"],
    ),
    (
        "missed_assessment",
        &["missed", "absence", "deferral", "deferred", "make-up", "makeup", "accommodation", "illness", "extenuating circumstances", "excused"],
    ),
    (
        "late_policy",
        &["late", "past deadline", "after due date", "penalty", "deduction", "percent off", "late submission", "grace period"],
    ),
    (
        "participation",
        &["participation", "engagement", "contribution", "discussion", "attendance", "class participation", "involvement"],
    ),
    (
        "assignment_submission",
        &["submission", "submit", "turn in", "hand in", "upload", "d2l", "dropbox", "how to submit", "where to submit", "file format"],
    ),
    (
        "group_project",
        &["group project", "team project", "team assignment", "group formation", "team members", "group responsibilities", "peer evaluation"],
    ),
    (
        "midterm_quiz",
        &["midterm", "mid-term", "quiz", "test", "timing", "location", "format", "duration", "open book", "closed book", "permitted materials"],
    ),
    (
        "final_exam",
        &["final exam", "final assessment", "examination", "exam period", "registrar", "duration", "location", "modality", "format", "permitted materials"],
    ),
    (
        "final_exam_weight",
        &["final exam", "weight", "percentage", "worth", "less than 50%", "no more than", "portion", "constitutes"],
    ),
    (
        "take_home_final",
        &["take home", "take-home", "at home", "remotely", "final project", "final paper", "culminating project"],
    ),
    (
        "instructor_contact",
        &["contacting", "contact", "reach", "availability", "office hours", "office location", "response time", "communication"],
    ),
    (
        "class_schedule",
        &["schedule", "calendar", "timetable", "weekly", "topics", "sessions", "lectures", "week by week", "course progression"],
    ),
    (
        "schedule_assignments",
        &["schedule", "calendar", "timeline", "assignment", "due date", "deadline", "submission", "due"],
    ),
    (
        "schedule_exams",
        &["schedule", "calendar", "exam date", "test date", "quiz date", "midterm", "final exam", "examination period"],
    ),
];

impl Default for TriggerConfig {
    fn default() -> Self {
        let categories = DEFAULT_TRIGGERS
            .iter()
            .map(|(name, triggers)| {
                (
                    name.to_string(),
                    triggers.iter().map(|t| t.to_string()).collect(),
                )
            })
            .collect();
        Self { categories }
    }
}

/// Map an item's text to a trigger category, mirroring the catalog phrasing.
///
/// Unknown items return `None` and take the keyword-overlap path.
fn classify(normalized: &str) -> Option<&'static str> {
    let has = |s: &str| normalized.contains(s);

    if has("email") && has("instructor") {
        Some("instructor_email")
    } else if has("objective") && !has("assessment") {
        Some("course_objectives")
    } else if has("textbook") || has("course material") {
        Some("textbooks")
    } else if has("prohibited") {
        Some("prohibited_materials")
    } else if has("workload") {
        Some("course_workload")
    } else if has("grade scale") || has("grading scale") {
        Some("grading_scale")
    } else if has("grade distribution") {
        Some("grade_distribution")
    } else if has("group work") && has("40%") {
        Some("group_work")
    } else if has("assessment") && has("objective") {
        Some("assessment_objectives")
    } else if has("due date") && (has("grade table") || has("distribution table")) {
        Some("due_dates")
    } else if has("30%") {
        Some("early_assessment")
    } else if has("after the last day") || has("post-term") {
        Some("post_term_assignments")
    } else if has("missed assessment") {
        Some("missed_assessment")
    } else if has("late") && has("policy") {
        Some("late_policy")
    } else if has("participation") {
        Some("participation")
    } else if has("submission") || (has("assignment") && has("submit")) {
        Some("assignment_submission")
    } else if has("group project") {
        Some("group_project")
    } else if has("class schedule") && (has("exam") || has("quiz") || has("test")) {
        // Before the midterm/quiz branch: "Exam Dates in Schedule" mentions
        // quizzes too, and it is about the schedule, not exam logistics.
        Some("schedule_exams")
    } else if has("class schedule") && has("due date") {
        Some("schedule_assignments")
    } else if (has("midterm") || has("quiz")) && !has("final") {
        Some("midterm_quiz")
    } else if has("final exam") && has("50%") {
        Some("final_exam_weight")
    } else if has("take-home") || has("take home") {
        Some("take_home_final")
    } else if has("final exam") {
        Some("final_exam")
    } else if has("contact") && has("instructor") {
        Some("instructor_contact")
    } else if has("class schedule") || has("schedule") {
        Some("class_schedule")
    } else {
        None
    }
}

/// The deterministic engine. Construction takes the trigger configuration;
/// evaluation is a pure function of (item, document, context).
#[derive(Debug, Clone, Default)]
pub struct PatternEngine {
    triggers: TriggerConfig,
}

impl PatternEngine {
    pub fn new(triggers: TriggerConfig) -> Self {
        Self { triggers }
    }

    /// Evaluate one item. Never errors.
    pub fn evaluate(
        &self,
        item: &ChecklistItem,
        document: &DocumentText,
        context: &AdditionalContext,
    ) -> ItemResult {
        if let Some(reason) = checklist::not_applicable(item, document, context) {
            return ItemResult::not_applicable(item.text(), reason);
        }

        if let Some(result) = self.check_special_cases(item, document, context) {
            return result;
        }

        let normalized = item.normalized();
        match classify(normalized).and_then(|c| self.triggers.triggers_for(c)) {
            Some(triggers) => self.score_triggers(item, document, triggers),
            None => self.score_keyword_overlap(item, document),
        }
    }

    /// Custom logic for items whose semantics a keyword count cannot carry.
    fn check_special_cases(
        &self,
        item: &ChecklistItem,
        document: &DocumentText,
        context: &AdditionalContext,
    ) -> Option<ItemResult> {
        let normalized = item.normalized();

        if normalized.contains("email") && normalized.contains("instructor") {
            if let Some(found) = EMAIL_RE.find(document.as_str()) {
                let evidence = document
                    .lines()
                    .find(|line| line.contains(found.as_str()))
                    .unwrap_or(found.as_str());
                return Some(ItemResult::present(
                    item.text(),
                    0.95,
                    "Instructor email found ending in ucalgary.ca.",
                    evidence,
                    Method::PatternMatching,
                ));
            }
            return Some(ItemResult::missing(
                item.text(),
                0.85,
                "No ucalgary.ca email address found in the outline.",
                "",
                Method::PatternMatching,
            ));
        }

        let table = grade_table::extract(document);

        if normalized.contains("grade distribution") {
            let table = table?;
            let checks = grade_table::check(&table, None);
            if !checks.weight_sum_ok {
                return Some(ItemResult::missing(
                    item.text(),
                    0.9,
                    format!(
                        "Assessment weights sum to {:.1}%, expected 100%.",
                        checks.weight_sum
                    ),
                    table.excerpt.clone(),
                    Method::GradeTableExtraction,
                ));
            }
            return Some(ItemResult::present(
                item.text(),
                0.9,
                format!(
                    "Grade distribution found with {} assessments summing to {:.1}%.",
                    table.rows.len(),
                    checks.weight_sum
                ),
                table.excerpt.clone(),
                Method::GradeTableExtraction,
            ));
        }

        if normalized.contains("group work") && normalized.contains("40%") {
            let table = table?;
            let checks = grade_table::check(&table, None);
            if checks.group_weight <= 0.0 {
                return None;
            }
            let result = if checks.group_within_cap {
                ItemResult::present(
                    item.text(),
                    0.9,
                    format!(
                        "Group work totals {:.1}%, within the 40% cap.",
                        checks.group_weight
                    ),
                    table.excerpt.clone(),
                    Method::GradeTableExtraction,
                )
            } else {
                ItemResult::missing(
                    item.text(),
                    0.9,
                    format!(
                        "Group work totals {:.2}%, exceeding the 40% cap.",
                        checks.group_weight
                    ),
                    table.excerpt.clone(),
                    Method::GradeTableExtraction,
                )
            };
            return Some(result);
        }

        if normalized.contains("30%") {
            let table = table?;
            let last_class = grade_table::resolve_last_class(document, context);
            let checks = grade_table::check(&table, last_class);
            let (early, ok) = (checks.early_weight?, checks.early_ok?);
            let result = if ok {
                ItemResult::present(
                    item.text(),
                    0.9,
                    format!(
                        "{early:.1}% of the grade is returned before the last class."
                    ),
                    table.excerpt.clone(),
                    Method::GradeTableExtraction,
                )
            } else {
                ItemResult::missing(
                    item.text(),
                    0.9,
                    format!(
                        "Only {early:.1}% of the grade is due before the last class; at least 30% is required."
                    ),
                    table.excerpt.clone(),
                    Method::GradeTableExtraction,
                )
            };
            return Some(result);
        }

        if normalized.contains("after the last day") || normalized.contains("post-term") {
            let table = table?;
            let last_class = grade_table::resolve_last_class(document, context)?;
            let checks = grade_table::check(&table, Some(last_class));
            if checks.early_weight.is_none() {
                return None;
            }
            let result = if checks.post_term.is_empty() {
                ItemResult::present(
                    item.text(),
                    0.9,
                    "No assessments are due after the last day of classes.",
                    table.excerpt.clone(),
                    Method::GradeTableExtraction,
                )
            } else {
                ItemResult::missing(
                    item.text(),
                    0.9,
                    format!("Due after the last class: {}.", checks.post_term.join(", ")),
                    table.excerpt.clone(),
                    Method::GradeTableExtraction,
                )
            };
            return Some(result);
        }

        if normalized.contains("due date")
            && (normalized.contains("grade table") || normalized.contains("distribution table"))
        {
            let table = table?;
            let undated = table.rows.iter().filter(|r| r.due_date.is_none()).count();
            let result = if undated == 0 {
                ItemResult::present(
                    item.text(),
                    0.9,
                    "Every assessment in the grade table carries a due date.",
                    table.excerpt.clone(),
                    Method::GradeTableExtraction,
                )
            } else {
                ItemResult::missing(
                    item.text(),
                    0.9,
                    format!("{undated} assessment(s) in the grade table have no due date."),
                    table.excerpt.clone(),
                    Method::GradeTableExtraction,
                )
            };
            return Some(result);
        }

        if normalized.contains("final exam") && normalized.contains("50%") {
            let table = table?;
            let final_weight: f64 = table
                .rows
                .iter()
                .filter(|r| r.assessment.to_lowercase().contains("final"))
                .map(|r| r.weight)
                .sum();
            if final_weight <= 0.0 {
                return None;
            }
            let result = if final_weight < 50.0 {
                ItemResult::present(
                    item.text(),
                    0.9,
                    format!("Final exam counts for {final_weight:.1}%, under the 50% limit."),
                    table.excerpt.clone(),
                    Method::GradeTableExtraction,
                )
            } else {
                ItemResult::missing(
                    item.text(),
                    0.9,
                    format!("Final exam counts for {final_weight:.1}%; it must be under 50%."),
                    table.excerpt.clone(),
                    Method::GradeTableExtraction,
                )
            };
            return Some(result);
        }

        None
    }

    /// Count independent trigger signals and derive the verdict.
    fn score_triggers(
        &self,
        item: &ChecklistItem,
        document: &DocumentText,
        triggers: &[String],
    ) -> ItemResult {
        let fired: Vec<&String> = triggers
            .iter()
            .filter(|t| document.contains(t))
            .collect();

        if fired.len() >= MIN_SIGNALS {
            let confidence =
                (BASE_CONFIDENCE + SIGNAL_CONFIDENCE * fired.len() as f64).min(MAX_CONFIDENCE);
            let evidence = extract_section(document, &fired);
            ItemResult::present(
                item.text(),
                confidence,
                format!("Matched {} indicative phrases in the outline.", fired.len()),
                evidence,
                Method::PatternMatching,
            )
        } else {
            ItemResult::missing(
                item.text(),
                FLOOR_CONFIDENCE,
                "No section of the outline matched this requirement.",
                "",
                Method::PatternMatching,
            )
        }
    }

    /// Generic path for custom items: word overlap between the item text and
    /// the document, with confidence scaled by the overlap ratio.
    fn score_keyword_overlap(&self, item: &ChecklistItem, document: &DocumentText) -> ItemResult {
        const STOPWORDS: &[&str] = &[
            "this", "that", "with", "from", "have", "does", "item", "section", "check",
            "include", "included", "there", "their", "course", "outline",
        ];

        let keywords: Vec<&str> = item
            .normalized()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 3 && !STOPWORDS.contains(w))
            .collect();

        if keywords.is_empty() {
            return ItemResult::missing(
                item.text(),
                FLOOR_CONFIDENCE,
                "Item text carries no searchable terms.",
                "",
                Method::PatternMatching,
            );
        }

        let fired: Vec<String> = keywords
            .iter()
            .filter(|k| document.contains(k))
            .map(|k| k.to_string())
            .collect();
        let ratio = fired.len() as f64 / keywords.len() as f64;

        if ratio >= 0.5 {
            let fired_refs: Vec<&String> = fired.iter().collect();
            let evidence = extract_section(document, &fired_refs);
            ItemResult::present(
                item.text(),
                (BASE_CONFIDENCE + 0.6 * ratio).min(MAX_CONFIDENCE),
                format!(
                    "{} of {} key terms from the item appear in the outline.",
                    fired.len(),
                    keywords.len()
                ),
                evidence,
                Method::PatternMatching,
            )
        } else {
            ItemResult::missing(
                item.text(),
                FLOOR_CONFIDENCE,
                "Too few of the item's key terms appear in the outline.",
                "",
                Method::PatternMatching,
            )
        }
    }
}

/// Lines around the first trigger match, bounded to keep evidence readable.
fn extract_section(document: &DocumentText, triggers: &[&String]) -> String {
    const CONTEXT_LINES: usize = 2;
    const MAX_CHARS: usize = 400;

    let lines: Vec<&str> = document.lines().collect();
    let first_match = lines.iter().position(|line| {
        let lower = line.to_lowercase();
        triggers.iter().any(|t| lower.contains(&t.to_lowercase()))
    });

    let Some(index) = first_match else {
        return String::new();
    };
    let start = index.saturating_sub(CONTEXT_LINES);
    let end = (index + CONTEXT_LINES + 1).min(lines.len());
    let section = lines[start..end].join("\n");

    if section.chars().count() <= MAX_CHARS {
        section
    } else {
        section.chars().take(MAX_CHARS).collect()
    }
}
