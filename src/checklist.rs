//! Checklist items: normalized identity, the default catalog, freeform
//! parsing, and classification helpers.
//!
//! The engine is parametric over any item list. The shipped 26-item catalog
//! is configuration data, not logic.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::DocumentText;

/// One compliance requirement to verify against a document.
///
/// Identity is by normalized text (lowercased, whitespace-collapsed) so the
/// same requirement pasted twice is processed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    text: String,
    normalized: String,
}

impl ChecklistItem {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into().trim().to_string();
        let normalized = normalize(&text);
        Self { text, normalized }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Whether this item's verdict is decided by the link validator.
    pub fn is_link_item(&self) -> bool {
        self.normalized.contains("link") || self.normalized.contains("url")
    }

    /// Whether this item semantically concerns the grade-distribution table.
    ///
    /// Derived by keyword classification, never stored.
    pub fn is_grade_item(&self) -> bool {
        const GRADE_TERMS: &[&str] = &[
            "grade distribution table",
            "weight",
            "assessment",
            "due date",
            "participation",
            "group project",
            "final exam",
            "take home",
            "take-home",
            "class schedule",
            "missed assessment policy",
            "late policy",
        ];
        GRADE_TERMS.iter().any(|t| self.normalized.contains(t))
    }
}

impl PartialEq for ChecklistItem {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for ChecklistItem {}

/// Lowercase and collapse runs of whitespace to single spaces.
pub fn normalize(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Free text supplied by the caller alongside the outline, e.g. "this course
/// has no final exam". Drives not-applicable detection.
#[derive(Debug, Clone, Default)]
pub struct AdditionalContext(String);

impl AdditionalContext {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    fn mentions_any(&self, phrases: &[&str]) -> bool {
        let lower = self.0.to_lowercase();
        phrases.iter().any(|p| lower.contains(p))
    }
}

/// Decide whether an item does not apply to this course.
///
/// Returns the explanation to attach when it does not. Checked before either
/// engine runs; a not-applicable item skips analysis entirely.
pub fn not_applicable(
    item: &ChecklistItem,
    document: &DocumentText,
    context: &AdditionalContext,
) -> Option<String> {
    let norm = item.normalized();

    if item.is_link_item() {
        return None;
    }

    if norm.contains("group") {
        if context.mentions_any(&[
            "no group work",
            "no group",
            "no team",
            "individual only",
            "no collaborative",
            "course has no group",
            "course doesn't have group",
        ]) {
            return Some("Not applicable: the course has no group work.".to_string());
        }
        // A course that never mentions groups or teams has nothing to cap.
        if !document.contains("group") && !document.contains("team") {
            return Some(
                "Not applicable: the outline does not mention group or team work.".to_string(),
            );
        }
    }

    if norm.contains("final") {
        if context.mentions_any(&[
            "no final",
            "no exam",
            "without final",
            "exempt from final",
            "final exam is not",
            "course has no final",
            "course doesn't have a final",
        ]) {
            return Some("Not applicable: the course has no final exam.".to_string());
        }
    }

    if norm.contains("participation")
        && context.mentions_any(&["no participation", "participation is not graded"])
    {
        return Some("Not applicable: participation is not part of the grade.".to_string());
    }

    if (norm.contains("midterm") || norm.contains("quiz"))
        && context.mentions_any(&["no midterm", "no quiz", "no midterms", "no quizzes"])
    {
        return Some("Not applicable: the course has no midterms or quizzes.".to_string());
    }

    if norm.contains("textbook") && context.mentions_any(&["no textbook", "no required text"]) {
        return Some("Not applicable: the course has no required textbook.".to_string());
    }

    None
}

static NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+[.)]\s+\w").unwrap());
static LETTERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z][.)]\s+\w").unwrap());
static BULLETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[*\-+•⚫⚪○●◆◇■□▪▫➢➤➔→⇒✓✔✗✘]\s+\w").unwrap());
static LIST_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+[.)]|[a-zA-Z][.)]|[*\-+•⚫⚪○●◆◇■□▪▫➢➤➔→⇒✓✔✗✘])\s*").unwrap());

/// Parse a freeform pasted checklist into items.
///
/// Handles numbered, lettered, and bulleted lists. When no list markers are
/// detected at all, each substantial plain line becomes an item. Duplicates
/// (by normalized text) are dropped, first occurrence wins.
pub fn parse_checklist(text: &str) -> Vec<ChecklistItem> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    let has_markers = lines
        .iter()
        .any(|l| NUMBERED.is_match(l) || LETTERED.is_match(l) || BULLETED.is_match(l));

    let mut items: Vec<ChecklistItem> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    for line in lines {
        let keep = if has_markers {
            NUMBERED.is_match(line) || LETTERED.is_match(line) || BULLETED.is_match(line)
        } else {
            line.len() > 10
        };
        if !keep {
            continue;
        }
        let cleaned = LIST_PREFIX.replace(line, "").trim().to_string();
        if cleaned.is_empty() {
            continue;
        }
        let item = ChecklistItem::new(cleaned);
        if seen.contains(&item.normalized().to_string()) {
            continue;
        }
        seen.push(item.normalized().to_string());
        items.push(item);
    }

    items
}

/// The institutional 26-item catalog.
///
/// External configuration data; callers may substitute any list.
pub const DEFAULT_CHECKLIST: [&str; 26] = [
    "Instructor Email: Does the outline include the instructor's email? An acceptable email must end with \"ucalgary.ca\".",
    "Course Objectives: Are the course objectives listed and numbered?",
    "Textbooks & Other Course Material: Are any textbooks, readings, and additional course materials listed?",
    "Prohibited Materials: Check for information that details any prohibited platforms, resources, and tools that cannot be used.",
    "Course Workload: Is there a course workload section?",
    "Grading Scale: Does the course outline include the Grade Scale header and a table mapping percentages to letter grades?",
    "Grade Distribution Table: Does the course outline include a Grade Distribution statement with weights assigned to assessments?",
    "Group Work Weight: If group work is included, verify it doesn't exceed 40% of the overall final grade.",
    "Assessment-Objectives Alignment: Check that assessments indicate which course objectives each assessment measures.",
    "Due Dates in Grade Table: Does the grade distribution table include due dates for all assignments and examinations?",
    "30% Before Last Class: Will students receive AT LEAST 30% of their final grade before the last day of classes?",
    "No Post-Term Assignments: Are there any assignments due after the last day of classes?",
    "Missed Assessment Policy: Does the outline have a missed assessment policy section?",
    "Late Submission Policy: Does the outline have a Late Policy section that explains penalties for late submissions?",
    "Participation Grading Criteria: If class participation is listed, are details provided on how it's evaluated?",
    "Assignment Submission Instructions: Are assignment details included with instructions on how and where to submit work?",
    "Group Project Guidelines: If a group project is listed, are details provided including the first group work deadline?",
    "Midterm/Quiz Information: For any midterms or quizzes, is information provided about timing, location, format, and permitted materials?",
    "Final Exam Details: If a Final Exam is listed, does the outline include information on timing, location, modality, and permitted materials?",
    "Final Exam Weight Limit: Does the Final Exam count for LESS THAN 50% of the final grade?",
    "Take-Home Final Identification: If there is a Take-Home Final Examination, is it clearly identified?",
    "Instructor Contact Guidelines: Is the \"Contacting Your Instructor\" section included with guidelines for communication?",
    "Class Schedule Inclusion: Is there a Class Schedule and Topics section showing weekly topics and activities?",
    "Due Dates in Schedule: Does the Class Schedule include or reference assignment due dates?",
    "Exam Dates in Schedule: Does the Class Schedule include quiz, test, or exam dates?",
    "Functional Web Links: Are all links in the outline valid and working?",
];

/// The default catalog as owned items, in fixed order.
pub fn default_checklist() -> Vec<ChecklistItem> {
    DEFAULT_CHECKLIST.iter().copied().map(ChecklistItem::new).collect()
}
