//! End-to-end orchestrator scenarios against scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use campaign_core::fakes::{
    analyzer_report, sample_content, sample_delivery, sample_design, sample_request,
    FakeCollaborators, RecordingPublisher, Scripted, ScriptedAnalyzer, ScriptedAnalyzers,
    ScriptedCompiler, ScriptedContentGenerator, ScriptedDesignRenderer,
};
use campaign_core::{
    CampaignRequest, CollaboratorError, CollaboratorErrorKind, FailureKind, FailureReport,
    Orchestrator, PipelineConfig, PipelineState, PublicationStatus, RunId, RunOutcome, Severity,
    Stage, StagePayload, Tone,
};
use serde_json::json;

const EPS: f64 = 1e-9;

async fn run_with(fakes: &FakeCollaborators) -> RunOutcome {
    run_request(fakes, sample_request()).await
}

async fn run_request(fakes: &FakeCollaborators, request: CampaignRequest) -> RunOutcome {
    let orchestrator = Orchestrator::new(
        RunId::new(),
        Arc::new(PipelineConfig::default()),
        fakes.collaborators(),
    );
    orchestrator.run(Arc::new(request)).await
}

fn expect_failure(outcome: &RunOutcome) -> &FailureReport {
    match outcome.failure() {
        Some(report) => report,
        None => panic!("Expected failed run, got {:?}", outcome),
    }
}

fn stages(records: &[campaign_core::StageRecord]) -> Vec<(Stage, u32)> {
    records.iter().map(|r| (r.stage(), r.iteration())).collect()
}

// -------------------------------------------------------------------------
// Scenario A: accepted on the first pass
// -------------------------------------------------------------------------

#[tokio::test]
async fn scenario_a_first_pass_accept_produces_four_records() {
    let fakes = FakeCollaborators::happy_path(&[82.0]);
    let outcome = run_with(&fakes).await;

    let package = outcome.package().expect("package");
    assert_eq!(
        stages(&package.records),
        vec![
            (Stage::Content, 1),
            (Stage::Design, 1),
            (Stage::Quality, 1),
            (Stage::Delivery, 1),
        ]
    );
    assert!((package.final_score.overall - 82.0).abs() < EPS);
    assert!(package.records.iter().all(|r| r.verify().is_ok()));

    assert!(package.manifest.find("hero").is_some());
    assert!(package.manifest.find("logo").is_some());
    let html = package.manifest.find("email.html").expect("html entry");
    assert_eq!(html.uri, "record://delivery/3");
    assert!(html.digest.is_some());
    assert!(package.html().unwrap().contains("Spring"));

    match &outcome {
        RunOutcome::Completed { publication, .. } => {
            assert_eq!(publication, &PublicationStatus::NotConfigured)
        }
        other => panic!("Expected completed run, got {:?}", other),
    }

    assert_eq!(fakes.content.calls(), 1);
    assert_eq!(fakes.design.calls(), 1);
    assert_eq!(fakes.analyzers.content.calls(), 1);
    assert_eq!(fakes.compiler.calls(), 1);
    assert_eq!(fakes.compiler.sources()[0], sample_design()["markup_source"]);
}

// -------------------------------------------------------------------------
// Scenario B: critical content issue, retry, accept
// -------------------------------------------------------------------------

#[tokio::test]
async fn scenario_b_content_retry_then_accept() {
    let analyzers = ScriptedAnalyzers::new(
        ScriptedAnalyzer::new(vec![
            Scripted::Respond(analyzer_report(
                55.0,
                &[(Severity::Critical, "Subject line ignores the brief")],
            )),
            Scripted::Respond(analyzer_report(75.0, &[])),
        ]),
        ScriptedAnalyzer::scores(&[55.0, 75.0]),
        ScriptedAnalyzer::scores(&[55.0, 75.0]),
        ScriptedAnalyzer::scores(&[55.0, 75.0]),
    );
    let fakes = FakeCollaborators::happy_path(&[]).with_analyzers(analyzers);
    let outcome = run_with(&fakes).await;

    let package = outcome.package().expect("package");
    assert_eq!(
        stages(&package.records),
        vec![
            (Stage::Content, 1),
            (Stage::Design, 1),
            (Stage::Quality, 1),
            (Stage::Content, 2),
            (Stage::Design, 2),
            (Stage::Quality, 2),
            (Stage::Delivery, 2),
        ]
    );
    assert!((package.final_score.overall - 75.0).abs() < EPS);
    assert_eq!(fakes.content.calls(), 2);
    assert_eq!(fakes.design.calls(), 2);

    let prompts = fakes.content.prompts();
    assert!(prompts[0].revision.is_none());
    let revision = prompts[1].revision.as_ref().expect("revision instruction");
    assert_eq!(revision.target, Stage::Content);
    assert_eq!(revision.iteration, 2);
    assert_eq!(revision.issues.len(), 1);
    assert_eq!(revision.issues[0].severity, Severity::Critical);
    assert!(matches!(revision.prior_output, StagePayload::Content(_)));
    assert!((revision.previous_overall - 55.0).abs() < EPS);
    assert!(prompts[1].instruction.contains("Revision 2"));
    assert!(prompts[1].instruction.contains("Subject line ignores the brief"));

    // Design re-ran downstream of the content retry without a revision of its own.
    let requirements = fakes.design.requirements();
    assert_eq!(requirements.len(), 2);
    assert!(requirements[1].corrections.is_empty());
}

// -------------------------------------------------------------------------
// Scenario C: quality never recovers
// -------------------------------------------------------------------------

#[tokio::test]
async fn scenario_c_three_low_scores_escalate() {
    let fakes = FakeCollaborators::happy_path(&[40.0]);
    let outcome = run_with(&fakes).await;

    let report = expect_failure(&outcome);
    assert_eq!(report.kind, FailureKind::QualityGateExhausted);
    assert_eq!(report.failed_stage, Some(Stage::Quality));
    assert_eq!(report.iteration, 3);
    assert_eq!(report.quality_history.len(), 3);
    assert!(report
        .quality_history
        .iter()
        .all(|s| (s.overall - 40.0).abs() < EPS));
    assert!((report.last_quality_score.as_ref().unwrap().overall - 40.0).abs() < EPS);
    assert!(report.issues[0].contains("quality gate not met"));

    // No stage ran more than three times, delivery never ran.
    assert_eq!(fakes.content.calls(), 3);
    assert_eq!(fakes.design.calls(), 3);
    assert_eq!(fakes.compiler.calls(), 0);
    assert_eq!(report.records.len(), 9);
}

// -------------------------------------------------------------------------
// Scenario D: transient design timeouts are absorbed
// -------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn scenario_d_design_timeouts_recover_transparently() {
    let fakes = FakeCollaborators::happy_path(&[82.0]).with_design(ScriptedDesignRenderer::new(
        vec![
            Scripted::Hang,
            Scripted::Hang,
            Scripted::Respond(sample_design()),
        ],
    ));

    let started = tokio::time::Instant::now();
    let outcome = run_with(&fakes).await;

    assert!(outcome.is_success(), "outcome: {:?}", outcome);
    assert_eq!(outcome.package().unwrap().records.len(), 4);
    assert_eq!(fakes.design.calls(), 3);
    // Two 30s timeouts plus 1s and 2s of backoff.
    assert!(started.elapsed() >= Duration::from_secs(63));
}

// -------------------------------------------------------------------------
// Scenario E: schema violation fails fast
// -------------------------------------------------------------------------

#[tokio::test]
async fn scenario_e_missing_subject_fails_before_quality() {
    let mut content = sample_content();
    content.as_object_mut().unwrap().remove("subject");
    let fakes =
        FakeCollaborators::happy_path(&[82.0]).with_content(ScriptedContentGenerator::always(content));

    let outcome = run_with(&fakes).await;
    let report = expect_failure(&outcome);

    assert_eq!(report.kind, FailureKind::SchemaViolation);
    assert_eq!(report.failed_stage, Some(Stage::Content));
    assert_eq!(report.iteration, 1);
    assert!(report.validation_errors.iter().any(|e| e.field == "subject"));
    assert!(report.offending_payload.is_some());
    assert!(report.records.is_empty());
    assert!(report.last_quality_score.is_none());

    assert_eq!(fakes.content.calls(), 1);
    assert_eq!(fakes.design.calls(), 0);
    assert_eq!(fakes.analyzers.content.calls(), 0);
    assert_eq!(fakes.analyzers.brand.calls(), 0);
}

// -------------------------------------------------------------------------
// Further behaviour
// -------------------------------------------------------------------------

#[tokio::test]
async fn technical_issues_send_work_back_to_design() {
    let analyzers = ScriptedAnalyzers::new(
        ScriptedAnalyzer::scores(&[80.0]),
        ScriptedAnalyzer::scores(&[60.0, 85.0]),
        ScriptedAnalyzer::new(vec![
            Scripted::Respond(json!({
                "score": 30,
                "issues": [{
                    "severity": "high",
                    "message": "Images lack alt text",
                    "suggestion": "Add alt text to every image"
                }]
            })),
            Scripted::Respond(analyzer_report(90.0, &[])),
        ]),
        ScriptedAnalyzer::scores(&[80.0]),
    );
    let fakes = FakeCollaborators::happy_path(&[]).with_analyzers(analyzers);
    let outcome = run_with(&fakes).await;

    let package = outcome.package().expect("package");
    assert_eq!(
        stages(&package.records),
        vec![
            (Stage::Content, 1),
            (Stage::Design, 1),
            (Stage::Quality, 1),
            (Stage::Design, 2),
            (Stage::Quality, 2),
            (Stage::Delivery, 2),
        ]
    );
    assert_eq!(fakes.content.calls(), 1);

    let requirements = fakes.design.requirements();
    assert_eq!(requirements[1].corrections, vec!["Add alt text to every image"]);
    assert!(requirements[1].prior_markup.is_some());
}

#[tokio::test]
async fn permanent_collaborator_failure_is_not_retried() {
    let fakes = FakeCollaborators::happy_path(&[82.0]).with_content(ScriptedContentGenerator::new(
        vec![Scripted::Fail(CollaboratorError::rejected("prompt violates policy"))],
    ));

    let outcome = run_with(&fakes).await;
    let report = expect_failure(&outcome);

    assert_eq!(report.kind, FailureKind::PermanentCollaborator);
    assert_eq!(report.failed_stage, Some(Stage::Content));
    assert_eq!(report.stage_errors.len(), 1);
    assert_eq!(report.stage_errors[0].error.kind, CollaboratorErrorKind::Rejected);
    assert_eq!(fakes.content.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_transient_retries_become_permanent() {
    let fakes = FakeCollaborators::happy_path(&[82.0]).with_compiler(ScriptedCompiler::new(vec![
        Scripted::Fail(CollaboratorError::unavailable("compiler overloaded")),
    ]));

    let outcome = run_with(&fakes).await;
    let report = expect_failure(&outcome);

    assert_eq!(report.kind, FailureKind::PermanentCollaborator);
    assert_eq!(report.failed_stage, Some(Stage::Delivery));
    assert_eq!(report.stage_errors.len(), 3);
    assert!(report.stage_errors.iter().all(|e| e.stage == Stage::Delivery));
    assert_eq!(
        report.stage_errors.iter().map(|e| e.attempt).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!((report.last_quality_score.as_ref().unwrap().overall - 82.0).abs() < EPS);
    assert_eq!(report.records.len(), 3);
}

#[tokio::test]
async fn failed_analyzer_scores_zero_but_still_counts() {
    let analyzers = ScriptedAnalyzers::new(
        ScriptedAnalyzer::scores(&[90.0]),
        ScriptedAnalyzer::scores(&[90.0]),
        ScriptedAnalyzer::new(vec![Scripted::Fail(CollaboratorError::internal("crashed"))]),
        ScriptedAnalyzer::scores(&[90.0]),
    );
    let fakes = FakeCollaborators::happy_path(&[]).with_analyzers(analyzers);
    let outcome = run_with(&fakes).await;

    // 0.30*90 + 0.25*90 + 0.20*0 + 0.25*90 = 72
    let package = outcome.package().expect("package");
    assert!((package.final_score.overall - 72.0).abs() < EPS);
    assert_eq!(package.final_score.technical, 0.0);
    assert!(package
        .final_score
        .issues
        .iter()
        .any(|i| i.severity == Severity::Critical && i.message.contains("technical")));
}

#[tokio::test]
async fn malformed_analyzer_report_is_degraded() {
    let analyzers = ScriptedAnalyzers::new(
        ScriptedAnalyzer::scores(&[100.0]),
        ScriptedAnalyzer::scores(&[100.0]),
        ScriptedAnalyzer::scores(&[100.0]),
        ScriptedAnalyzer::new(vec![Scripted::Respond(json!({ "score": "great" }))]),
    );
    let fakes = FakeCollaborators::happy_path(&[]).with_analyzers(analyzers);
    let outcome = run_with(&fakes).await;

    let package = outcome.package().expect("package");
    assert!((package.final_score.overall - 75.0).abs() < EPS);
    assert_eq!(package.final_score.brand, 0.0);
}

#[tokio::test]
async fn invalid_request_fails_in_init() {
    let fakes = FakeCollaborators::happy_path(&[82.0]);
    let request = CampaignRequest::new("", "list", Tone::Urgent, "en");

    let outcome = run_request(&fakes, request).await;
    let report = expect_failure(&outcome);

    assert_eq!(report.kind, FailureKind::InvalidRequest);
    assert_eq!(report.failed_stage, None);
    assert!(report.validation_errors.iter().any(|e| e.field == "brief"));
    assert_eq!(fakes.content.calls(), 0);
}

#[tokio::test]
async fn invalid_delivery_output_is_a_schema_violation() {
    let fakes = FakeCollaborators::happy_path(&[82.0])
        .with_compiler(ScriptedCompiler::always(json!({ "html": "" })));

    let outcome = run_with(&fakes).await;
    let report = expect_failure(&outcome);

    assert_eq!(report.kind, FailureKind::SchemaViolation);
    assert_eq!(report.failed_stage, Some(Stage::Delivery));
    assert_eq!(report.validation_errors[0].field, "html");
}

#[tokio::test]
async fn publisher_runs_after_done() {
    let fakes = FakeCollaborators::happy_path(&[82.0]).with_publisher(RecordingPublisher::new());
    let outcome = run_with(&fakes).await;

    match &outcome {
        RunOutcome::Completed { package, publication } => {
            match publication {
                PublicationStatus::Published { urls } => {
                    assert_eq!(urls.len(), 1);
                    assert!(urls[0].contains(&package.run_id.to_string()));
                }
                other => panic!("Expected Published, got {:?}", other),
            }
            let publisher = fakes.publisher.as_ref().unwrap();
            assert_eq!(publisher.published(), vec![package.run_id]);
        }
        other => panic!("Expected completed run, got {:?}", other),
    }
}

#[tokio::test]
async fn publish_failure_keeps_run_done() {
    let fakes = FakeCollaborators::happy_path(&[82.0]).with_publisher(RecordingPublisher::failing(
        CollaboratorError::rejected("bucket is read-only"),
    ));
    let outcome = run_with(&fakes).await;

    assert!(outcome.is_success());
    match outcome {
        RunOutcome::Completed { publication, .. } => {
            assert!(matches!(publication, PublicationStatus::Failed { .. }))
        }
        other => panic!("Expected completed run, got {:?}", other),
    }
}

#[tokio::test]
async fn status_channel_reports_terminal_state() {
    let fakes = FakeCollaborators::happy_path(&[82.0]);
    let orchestrator = Orchestrator::new(
        RunId::new(),
        Arc::new(PipelineConfig::default()),
        fakes.collaborators(),
    );
    let status = orchestrator.subscribe();
    assert_eq!(status.borrow().state, PipelineState::Init);

    let outcome = orchestrator.run(Arc::new(sample_request())).await;
    assert!(outcome.is_success());

    let last = status.borrow().clone();
    assert_eq!(last.state, PipelineState::Done);
    assert!((last.last_quality_score.unwrap().overall - 82.0).abs() < EPS);
}

#[tokio::test]
async fn custom_threshold_is_respected() {
    let config = PipelineConfig::from_toml_str("[quality]\nthreshold = 85.0\nmax_iterations = 1\n")
        .unwrap();
    let fakes = FakeCollaborators::happy_path(&[82.0]);
    let orchestrator = Orchestrator::new(RunId::new(), Arc::new(config), fakes.collaborators());

    let outcome = orchestrator.run(Arc::new(sample_request())).await;
    let report = expect_failure(&outcome);
    assert_eq!(report.kind, FailureKind::QualityGateExhausted);
    assert_eq!(report.quality_history.len(), 1);
    assert_eq!(fakes.content.calls(), 1);
}

#[tokio::test]
async fn alternating_retry_targets_respect_design_budget() {
    let critical = |message| Scripted::Respond(analyzer_report(40.0, &[(Severity::Critical, message)]));
    let clean = || Scripted::Respond(analyzer_report(40.0, &[]));
    let analyzers = ScriptedAnalyzers::new(
        ScriptedAnalyzer::new(vec![critical("Off-brief copy"), clean(), critical("Still off-brief")]),
        ScriptedAnalyzer::new(vec![clean(), critical("Broken layout"), clean()]),
        ScriptedAnalyzer::scores(&[40.0]),
        ScriptedAnalyzer::scores(&[40.0]),
    );
    let fakes = FakeCollaborators::happy_path(&[]).with_analyzers(analyzers);
    let outcome = run_with(&fakes).await;

    let report = expect_failure(&outcome);
    assert_eq!(report.kind, FailureKind::QualityGateExhausted);
    assert_eq!(report.quality_history.len(), 3);
    assert!(report.issues[0].contains("3 design iterations"), "{}", report.issues[0]);
    assert_eq!(
        stages(&report.records),
        vec![
            (Stage::Content, 1),
            (Stage::Design, 1),
            (Stage::Quality, 1),
            (Stage::Content, 2),
            (Stage::Design, 2),
            (Stage::Quality, 2),
            (Stage::Design, 3),
            (Stage::Quality, 3),
        ]
    );

    // The third content revision would have forced a fourth design run.
    assert_eq!(fakes.content.calls(), 2);
    assert_eq!(fakes.design.calls(), 3);
    assert_eq!(fakes.compiler.calls(), 0);
}

#[tokio::test]
async fn oversized_analyzer_issue_degrades_dimension() {
    let analyzers = ScriptedAnalyzers::new(
        ScriptedAnalyzer::scores(&[100.0]),
        ScriptedAnalyzer::scores(&[100.0]),
        ScriptedAnalyzer::scores(&[100.0]),
        ScriptedAnalyzer::new(vec![Scripted::Respond(json!({
            "score": 90,
            "issues": [{ "severity": "low", "message": "x".repeat(2_001) }]
        }))]),
    );
    let fakes = FakeCollaborators::happy_path(&[]).with_analyzers(analyzers);
    let outcome = run_with(&fakes).await;

    let package = outcome.package().expect("package");
    // 0.30*100 + 0.25*100 + 0.20*100 + 0.25*0
    assert!((package.final_score.overall - 75.0).abs() < EPS);
    assert_eq!(package.final_score.brand, 0.0);
    let issue = &package.final_score.issues[0];
    assert_eq!(issue.severity, Severity::Critical);
    assert!(issue.message.contains("issues[0].message"));
}

#[test]
fn sample_delivery_is_valid_html_payload() {
    assert!(sample_delivery()["html"].as_str().unwrap().starts_with("<!doctype html>"));
}
