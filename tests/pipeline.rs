//! End-to-end pipeline tests over the public API with a scripted judge.

use std::sync::Arc;

use syllascan::analysis::AnalysisOrchestrator;
use syllascan::judge::verdict;
use syllascan::{
    AdditionalContext, AnalysisConfig, AnalyzeRequest, ChecklistItem, DocumentText, ItemStatus,
    Method, MockJudge, SyllascanApi,
};

const OUTLINE: &str = "\
Course Outline: PHIL 201 - Introduction to Logic
Instructor: Dr. A. Navarro
Email: anavarro@ucalgary.ca
Office Hours: Tuesdays 2-4pm, SS 528

Course Description
An introduction to formal logic. Students should expect to spend about
six hours per week outside of lectures.

Grade Distribution
Assignments: 30%
Midterm Exam: 30%
Final Exam: 40%

Late Policy
Late assignments lose 5% per day unless an extension is granted.

Resources: https://d2l.ucalgary.ca/phil201
";

fn items(texts: &[&str]) -> Vec<ChecklistItem> {
    texts.iter().copied().map(ChecklistItem::new).collect()
}

fn orchestrator(judge: MockJudge, config: AnalysisConfig) -> AnalysisOrchestrator {
    AnalysisOrchestrator::new(Arc::new(judge), config)
}

#[tokio::test]
async fn results_keep_checklist_order_and_collapse_duplicates() {
    let orch = orchestrator(MockJudge::new(), AnalysisConfig::pattern_only());
    let checklist = items(&[
        "Instructor Email: ucalgary.ca address present",
        "Late Policy: penalties for late work explained",
        "instructor email: ucalgary.ca address present",
        "Course workload expectations stated",
    ]);

    let report = orch
        .analyze(&DocumentText::new(OUTLINE), &checklist, &AdditionalContext::default())
        .await
        .unwrap();

    assert_eq!(report.results.len(), 3);
    assert_eq!(report.results[0].item, "Instructor Email: ucalgary.ca address present");
    assert_eq!(report.results[1].item, "Late Policy: penalties for late work explained");
    assert_eq!(report.results[2].item, "Course workload expectations stated");
}

#[tokio::test]
async fn email_detection_is_high_confidence_with_evidence() {
    let orch = orchestrator(MockJudge::new(), AnalysisConfig::pattern_only());
    let checklist = items(&["Instructor Email: ucalgary.ca address present"]);

    let report = orch
        .analyze(&DocumentText::new(OUTLINE), &checklist, &AdditionalContext::default())
        .await
        .unwrap();

    let result = &report.results[0];
    assert!(result.present);
    assert!(result.confidence >= 0.9);
    assert!(result.evidence.contains("anavarro@ucalgary.ca"));
}

#[tokio::test]
async fn majority_vote_carries_through_the_pipeline() {
    let item = "Course workload expectations stated";
    let judge = MockJudge::new().with_sequence(
        item,
        vec![
            Ok(verdict(true, 0.9, "about six hours per week", "six hours per week")),
            Ok(verdict(true, 0.8, "workload stated", "")),
            Ok(verdict(false, 0.6, "not explicit", "")),
        ],
    );
    let orch = orchestrator(judge, AnalysisConfig::default());

    let report = orch
        .analyze(&DocumentText::new(OUTLINE), &items(&[item]), &AdditionalContext::default())
        .await
        .unwrap();

    let result = &report.results[0];
    assert!(result.present);
    assert_eq!(result.method, Method::AiGeneralAnalysis);
    assert!((result.confidence - 2.0 / 3.0).abs() < 0.01);
    assert_eq!(result.verification_attempts, 3);
    assert_eq!(result.verification_present_votes, 2);
    assert_eq!(report.summary.verification_calls, 3);
}

#[tokio::test]
async fn judge_outage_degrades_to_pattern_verdicts() {
    let checklist = items(&[
        "Late Policy: penalties for late work explained",
        "Course workload expectations stated",
    ]);
    let document = DocumentText::new(OUTLINE);

    // Unscripted items fail every call, including the second chance.
    let with_outage = orchestrator(MockJudge::new(), AnalysisConfig::default());
    let degraded = with_outage
        .analyze(&document, &checklist, &AdditionalContext::default())
        .await
        .unwrap();

    let pattern_only = orchestrator(MockJudge::new(), AnalysisConfig::pattern_only());
    let baseline = pattern_only
        .analyze(&document, &checklist, &AdditionalContext::default())
        .await
        .unwrap();

    for (got, want) in degraded.results.iter().zip(baseline.results.iter()) {
        assert_eq!(got.item, want.item);
        assert_eq!(got.status, want.status);
        assert_eq!(got.method, want.method);
        assert!((got.confidence - want.confidence).abs() < f64::EPSILON);
    }
}

#[tokio::test]
async fn invalid_link_overrides_a_confident_semantic_verdict() {
    let item = "Functional Web Links: Are all links valid and working?";
    let judge = MockJudge::new().with_verdict(item, verdict(true, 0.99, "links fine", ""));
    let orch = orchestrator(judge, AnalysisConfig::default());
    let document = DocumentText::new("Course page: http://:80/broken-course-page\n");

    let report = orch
        .analyze(&document, &items(&[item]), &AdditionalContext::default())
        .await
        .unwrap();

    let result = &report.results[0];
    assert!(!result.present);
    assert_eq!(result.method, Method::LinkValidation);
    assert!(result.evidence.contains(":80/broken-course-page"));
}

#[tokio::test]
async fn absent_group_work_is_not_applicable() {
    let item = "Group Work Weight: combined group work is no more than 40%";
    let judge = MockJudge::new().with_verdict(item, verdict(true, 0.95, "group work found", ""));
    let orch = orchestrator(judge, AnalysisConfig::default());

    let report = orch
        .analyze(&DocumentText::new(OUTLINE), &items(&[item]), &AdditionalContext::default())
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.status, ItemStatus::Na);
    assert!(result.present);
    assert!((result.confidence - 0.9).abs() < f64::EPSILON);
}

#[tokio::test]
async fn inconsistent_weight_sum_is_flagged() {
    let document = DocumentText::new(
        "Grade Distribution\nAssignments: 40%\nMidterm: 30%\nFinal Exam: 40%\n",
    );
    let orch = orchestrator(MockJudge::new(), AnalysisConfig::pattern_only());
    let checklist = items(&["Grade Distribution Table: weights assigned to each assessment"]);

    let report = orch
        .analyze(&document, &checklist, &AdditionalContext::default())
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.status, ItemStatus::Missing);
    assert_eq!(result.method, Method::GradeTableExtraction);
    assert!(result.explanation.contains("110"));
}

#[tokio::test]
async fn pattern_only_runs_are_idempotent() {
    let orch = orchestrator(MockJudge::new(), AnalysisConfig::pattern_only());
    let checklist = items(&[
        "Instructor Email: ucalgary.ca address present",
        "Late Policy: penalties for late work explained",
        "Grade Distribution Table: weights assigned to each assessment",
    ]);
    let document = DocumentText::new(OUTLINE);

    let first = orch
        .analyze(&document, &checklist, &AdditionalContext::default())
        .await
        .unwrap();
    let second = orch
        .analyze(&document, &checklist, &AdditionalContext::default())
        .await
        .unwrap();

    for (a, b) in first.results.iter().zip(second.results.iter()) {
        assert_eq!(a.status, b.status);
        assert!((a.confidence - b.confidence).abs() < f64::EPSILON);
        assert_eq!(a.explanation, b.explanation);
        assert_eq!(a.evidence, b.evidence);
    }
}

#[tokio::test]
async fn sessions_are_isolated_in_the_api() {
    let api = SyllascanApi::new(Arc::new(MockJudge::new()), AnalysisConfig::pattern_only());

    let mut first = AnalyzeRequest::from_text("review-a", OUTLINE);
    first.checklist = Some("- Instructor Email: ucalgary.ca address present".to_string());
    api.analyze(first).await.unwrap();

    let mut second = AnalyzeRequest::from_text(
        "review-b",
        "Contact the department office for instructor information.",
    );
    second.checklist = Some("- Instructor Email: ucalgary.ca address present".to_string());
    api.analyze(second).await.unwrap();

    let a = api.report("review-a").unwrap();
    let b = api.report("review-b").unwrap();
    assert!(a.results[0].present);
    assert!(!b.results[0].present);

    let evidence = api
        .evidence("review-a", "Instructor Email: ucalgary.ca address present")
        .unwrap();
    assert!(evidence.found);
    assert!(evidence.excerpt.contains("ucalgary.ca"));
}
