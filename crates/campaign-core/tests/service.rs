//! CampaignService: submission, status queries, results and cancellation.

use std::time::Duration;

use campaign_core::fakes::{
    sample_request, FakeCollaborators, Scripted, ScriptedContentGenerator, ScriptedDesignRenderer,
};
use campaign_core::{
    CampaignError, CampaignService, FailureKind, PipelineConfig, PipelineState, RunId, Stage,
};

fn service(fakes: &FakeCollaborators) -> CampaignService {
    CampaignService::new(PipelineConfig::default(), fakes.collaborators())
}

fn hanging_content() -> FakeCollaborators {
    FakeCollaborators::happy_path(&[82.0])
        .with_content(ScriptedContentGenerator::new(vec![Scripted::Hang]))
}

async fn wait_for_state(service: &CampaignService, run_id: RunId, state: PipelineState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if service.get_run_status(run_id).unwrap().state == state {
                return;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("run never reached the expected state");
}

#[tokio::test]
async fn submit_and_wait_for_result() {
    let fakes = FakeCollaborators::happy_path(&[82.0]);
    let service = service(&fakes);

    let run_id = service.submit_campaign(sample_request());
    let outcome = service.wait_for_result(run_id).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.run_id(), run_id);

    let status = service.get_run_status(run_id).unwrap();
    assert_eq!(status.state, PipelineState::Done);
    assert_eq!(status.iteration, 1);

    let stored = service.get_result(run_id).unwrap().expect("stored outcome");
    assert_eq!(stored.package().unwrap().records.len(), 4);
    assert!(service.active_runs().is_empty());
}

#[tokio::test]
async fn unknown_run_is_reported() {
    let service = service(&FakeCollaborators::happy_path(&[82.0]));
    let unknown = RunId::new();

    assert!(matches!(
        service.get_run_status(unknown),
        Err(CampaignError::RunNotFound(id)) if id == unknown
    ));
    assert!(matches!(
        service.get_result(unknown),
        Err(CampaignError::RunNotFound(_))
    ));
    assert!(matches!(service.cancel(unknown), Err(CampaignError::RunNotFound(_))));
    assert!(matches!(
        service.wait_for_result(unknown).await,
        Err(CampaignError::RunNotFound(_))
    ));
}

#[tokio::test]
async fn concurrent_runs_are_isolated() {
    let fakes = FakeCollaborators::happy_path(&[82.0]);
    let service = service(&fakes);

    let ids: Vec<RunId> = (0..5)
        .map(|_| service.submit_campaign(sample_request()))
        .collect();

    let results = futures::future::join_all(ids.iter().map(|id| service.wait_for_result(*id))).await;

    for (id, result) in ids.iter().zip(results) {
        let outcome = result.unwrap();
        assert_eq!(outcome.run_id(), *id);
        let package = outcome.package().expect("package");
        assert_eq!(package.records.len(), 4);
        assert_eq!(package.records[0].sequence(), 0);
    }
    assert_eq!(fakes.content.calls(), 5);
}

#[tokio::test]
async fn result_is_absent_while_in_flight() {
    let fakes = hanging_content();
    let service = service(&fakes);

    let run_id = service.submit_campaign(sample_request());
    wait_for_state(&service, run_id, PipelineState::Content).await;

    assert!(service.get_result(run_id).unwrap().is_none());
    assert_eq!(service.active_runs(), vec![run_id]);
    let status = service.get_run_status(run_id).unwrap();
    assert_eq!(status.current_stage, Some(Stage::Content));

    assert!(service.cancel(run_id).unwrap());
    service.wait_for_result(run_id).await.unwrap();
}

#[tokio::test]
async fn cancel_in_flight_run() {
    let fakes = hanging_content();
    let service = service(&fakes);

    let run_id = service.submit_campaign(sample_request());
    wait_for_state(&service, run_id, PipelineState::Content).await;

    assert!(service.cancel(run_id).unwrap());
    let outcome = service.wait_for_result(run_id).await.unwrap();

    let report = outcome.failure().expect("failure report");
    assert_eq!(report.kind, FailureKind::Cancelled);
    assert_eq!(report.failed_stage, Some(Stage::Content));
    assert!(report.records.is_empty());

    let status = service.get_run_status(run_id).unwrap();
    assert_eq!(status.state, PipelineState::Failed);
    assert_eq!(fakes.design.calls(), 0);

    // Already finished.
    assert!(!service.cancel(run_id).unwrap());
}

#[tokio::test]
async fn cancel_immediately_after_submit() {
    let fakes = hanging_content();
    let service = service(&fakes);

    let run_id = service.submit_campaign(sample_request());
    assert!(service.cancel(run_id).unwrap());

    let outcome = service.wait_for_result(run_id).await.unwrap();
    assert_eq!(outcome.failure().unwrap().kind, FailureKind::Cancelled);
}

#[tokio::test]
async fn panicking_run_still_terminates() {
    let fakes = FakeCollaborators::happy_path(&[82.0]).with_design(ScriptedDesignRenderer::new(
        vec![Scripted::Panic("renderer blew up")],
    ));
    let service = service(&fakes);

    let run_id = service.submit_campaign(sample_request());
    let outcome = service.wait_for_result(run_id).await.unwrap();

    let report = outcome.failure().expect("failure report");
    assert_eq!(report.kind, FailureKind::Aborted);
    assert_eq!(report.run_id, run_id);
    assert_eq!(report.failed_stage, Some(Stage::Design));
    assert!(report.issues[0].contains("run task terminated"));

    let stored = service.get_result(run_id).unwrap().expect("stored outcome");
    assert_eq!(stored.failure().unwrap().kind, FailureKind::Aborted);
    assert_eq!(service.get_run_status(run_id).unwrap().state, PipelineState::Failed);
    assert!(service.active_runs().is_empty());
    assert!(!service.cancel(run_id).unwrap());

    // Other runs are unaffected.
    let healthy = CampaignService::new(
        PipelineConfig::default(),
        FakeCollaborators::happy_path(&[82.0]).collaborators(),
    );
    let ok = healthy.submit_campaign(sample_request());
    assert!(healthy.wait_for_result(ok).await.unwrap().is_success());
}

#[tokio::test]
async fn prune_drops_only_finished_runs() {
    let service = service(&FakeCollaborators::happy_path(&[82.0]));

    let done = service.submit_campaign(sample_request());
    service.wait_for_result(done).await.unwrap();

    assert_eq!(service.prune_finished(), 1);
    assert!(matches!(
        service.get_run_status(done),
        Err(CampaignError::RunNotFound(_))
    ));
    assert_eq!(service.prune_finished(), 0);
}

#[tokio::test]
async fn service_exposes_config() {
    let config = PipelineConfig::from_toml_str("[quality]\nthreshold = 80.0\n").unwrap();
    let fakes = FakeCollaborators::happy_path(&[75.0, 85.0]);
    let service = CampaignService::new(config, fakes.collaborators());
    assert!((service.config().quality.threshold - 80.0).abs() < 1e-9);

    let run_id = service.submit_campaign(sample_request());
    let outcome = service.wait_for_result(run_id).await.unwrap();
    let package = outcome.package().expect("package");
    assert_eq!(package.records.len(), 7);
}
