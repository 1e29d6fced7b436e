//! Pipeline orchestrator.
//!
//! One [`Orchestrator`] drives one campaign request through the state machine
//!
//! ```text
//! INIT → CONTENT → DESIGN → QUALITY → {RETRY_CONTENT | RETRY_DESIGN | DELIVERY} → DONE | FAILED
//! ```
//!
//! and returns a [`RunOutcome`]. Every transition is published on a `watch`
//! channel so observers can follow the run without touching its context.

mod pipeline;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::Instrument;

use crate::collaborator::Collaborators;
use crate::config::PipelineConfig;
use crate::domain::{CampaignRequest, RunId, RunOutcome, RunStatus};
use crate::executor::CancelSignal;
use crate::obs;

use pipeline::PipelineRun;

/// Drives a single pipeline run.
pub struct Orchestrator {
    run_id: RunId,
    config: Arc<PipelineConfig>,
    collaborators: Collaborators,
    cancel: CancelSignal,
    status: watch::Sender<RunStatus>,
}

impl Orchestrator {
    pub fn new(run_id: RunId, config: Arc<PipelineConfig>, collaborators: Collaborators) -> Self {
        let (status, _) = watch::channel(RunStatus::initial(run_id));
        Self {
            run_id,
            config,
            collaborators,
            cancel: CancelSignal::never(),
            status,
        }
    }

    /// Attach a cancel signal raced against every collaborator call.
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Receive every status transition of this run.
    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.status.subscribe()
    }

    /// Current status snapshot.
    pub fn status(&self) -> RunStatus {
        self.status.borrow().clone()
    }

    /// Execute the run to completion.
    ///
    /// Never panics on collaborator misbehaviour: every failure ends in a
    /// `RunOutcome::Failed` carrying a structured report.
    pub async fn run(self, request: Arc<CampaignRequest>) -> RunOutcome {
        let run = PipelineRun::new(&self, request);
        let span = obs::run_span(self.run_id, Some(run.trace_id()));
        run.execute().instrument(span).await
    }
}
