//! Grade-distribution table extraction and cross-checks.
//!
//! Locates a table-like region (consecutive lines pairing an assessment name
//! with a percentage), parses (assessment, weight, due date?) rows, and
//! verifies the institutional invariants: weights sum to ~100%, group work
//! is capped at 40% inclusive, at least 30% of the grade lands strictly
//! before the last class, and nothing is due after it.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::checklist::AdditionalContext;
use crate::document::DocumentText;

/// Tolerance for the weight-sum check, in percentage points.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1.0;

/// Inclusive cap on the group-work share of the final grade.
pub const GROUP_WORK_CAP: f64 = 40.0;

/// Inclusive minimum share of the grade due before the last class.
pub const EARLY_FEEDBACK_MINIMUM: f64 = 30.0;

const EPSILON: f64 = 1e-9;

/// One parsed table row.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeRow {
    pub assessment: String,
    /// Weight as a percentage of the final grade.
    pub weight: f64,
    pub due_date: Option<NaiveDate>,
}

impl GradeRow {
    pub fn is_group_work(&self) -> bool {
        let lower = self.assessment.to_lowercase();
        lower.contains("group") || lower.contains("team")
    }
}

/// The extracted grade-distribution table plus its source excerpt.
#[derive(Debug, Clone)]
pub struct GradeTable {
    pub rows: Vec<GradeRow>,
    pub excerpt: String,
}

/// Outcomes of the institutional invariant checks.
#[derive(Debug, Clone)]
pub struct GradeChecks {
    pub weight_sum: f64,
    pub weight_sum_ok: bool,
    pub group_weight: f64,
    pub group_within_cap: bool,
    /// Cumulative weight due strictly before the last class, when a last
    /// class date is known and any rows carry due dates.
    pub early_weight: Option<f64>,
    pub early_ok: Option<bool>,
    /// Assessments due after the last class.
    pub post_term: Vec<String>,
    pub last_class: Option<NaiveDate>,
}

static ROW_RE: Lazy<Regex> = Lazy::new(|| {
    // An assessment-name-like token followed by a percentage on the same line.
    Regex::new(r"(?i)^\s*([A-Za-z][A-Za-z0-9 /&'().\-]{2,60}?)\s*[:\-–]?\s*(\d{1,3}(?:\.\d+)?)\s*%").unwrap()
});

static MONTH_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:\s*,?\s*(\d{4}))?",
    )
    .unwrap()
});

static ISO_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap());

fn month_number(prefix: &str) -> Option<u32> {
    match prefix.to_lowercase().as_str() {
        "jan" => Some(1),
        "feb" => Some(2),
        "mar" => Some(3),
        "apr" => Some(4),
        "may" => Some(5),
        "jun" => Some(6),
        "jul" => Some(7),
        "aug" => Some(8),
        "sep" => Some(9),
        "oct" => Some(10),
        "nov" => Some(11),
        "dec" => Some(12),
        _ => None,
    }
}

/// Find the first date-like token in a line.
///
/// Month-name dates without a year are pinned to `default_year`; only
/// within-term ordering matters for the checks, never the absolute year.
pub fn parse_date(text: &str, default_year: i32) -> Option<NaiveDate> {
    if let Some(caps) = ISO_DATE_RE.captures(text) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    if let Some(caps) = MONTH_DATE_RE.captures(text) {
        let month = month_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let year: i32 = caps
            .get(3)
            .and_then(|y| y.as_str().parse().ok())
            .unwrap_or(default_year);
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    None
}

/// All date-like tokens across the document.
pub fn find_dates(document: &DocumentText, default_year: i32) -> Vec<NaiveDate> {
    document
        .lines()
        .filter_map(|line| parse_date(line, default_year))
        .collect()
}

/// Resolve the last class date: from the caller context when present there,
/// else the latest date parsed anywhere in the document.
pub fn resolve_last_class(document: &DocumentText, context: &AdditionalContext) -> Option<NaiveDate> {
    let default_year = chrono::Utc::now().year();
    if let Some(date) = parse_date(context.as_str(), default_year) {
        return Some(date);
    }
    find_dates(document, default_year).into_iter().max()
}

/// Locate and parse the grade-distribution table.
///
/// Heuristic: every line pairing an assessment-name token with a percentage
/// is a row candidate; two or more candidates make a table. Header and
/// letter-grade-scale lines are filtered out so a grading scale does not
/// masquerade as a distribution table.
pub fn extract(document: &DocumentText) -> Option<GradeTable> {
    let default_year = chrono::Utc::now().year();
    let mut rows = Vec::new();
    let mut excerpt_lines = Vec::new();

    for line in document.lines() {
        let Some(caps) = ROW_RE.captures(line) else {
            continue;
        };
        let assessment = caps[1].trim().trim_end_matches([':', '-']).trim().to_string();
        // Letter-grade rows ("A 85%") belong to the grading scale.
        if assessment.chars().filter(|c| c.is_alphabetic()).count() < 3 {
            continue;
        }
        let Ok(weight) = caps[2].parse::<f64>() else {
            continue;
        };
        if weight <= 0.0 || weight > 100.0 {
            continue;
        }
        let due_date = parse_date(line, default_year);
        rows.push(GradeRow {
            assessment,
            weight,
            due_date,
        });
        excerpt_lines.push(line.trim().to_string());
    }

    if rows.len() < 2 {
        return None;
    }
    Some(GradeTable {
        rows,
        excerpt: excerpt_lines.join("\n"),
    })
}

/// Run the institutional invariant checks over a parsed table.
pub fn check(table: &GradeTable, last_class: Option<NaiveDate>) -> GradeChecks {
    let weight_sum: f64 = table.rows.iter().map(|r| r.weight).sum();
    let weight_sum_ok = (weight_sum - 100.0).abs() <= WEIGHT_SUM_TOLERANCE + EPSILON;

    let group_weight: f64 = table
        .rows
        .iter()
        .filter(|r| r.is_group_work())
        .map(|r| r.weight)
        .sum();
    let group_within_cap = group_weight <= GROUP_WORK_CAP + EPSILON;

    let dated_rows: Vec<&GradeRow> = table.rows.iter().filter(|r| r.due_date.is_some()).collect();
    let (early_weight, early_ok, post_term) = match last_class {
        Some(last) if !dated_rows.is_empty() => {
            let early: f64 = dated_rows
                .iter()
                .filter(|r| r.due_date.is_some_and(|d| d < last))
                .map(|r| r.weight)
                .sum();
            let post: Vec<String> = dated_rows
                .iter()
                .filter(|r| r.due_date.is_some_and(|d| d > last))
                .map(|r| r.assessment.clone())
                .collect();
            (
                Some(early),
                Some(early >= EARLY_FEEDBACK_MINIMUM - EPSILON),
                post,
            )
        }
        // Without a last class date or dated rows, the date-dependent
        // checks degrade to the generic pattern verdict.
        _ => (None, None, Vec::new()),
    };

    GradeChecks {
        weight_sum,
        weight_sum_ok,
        group_weight,
        group_within_cap,
        early_weight,
        early_ok,
        post_term,
        last_class,
    }
}
