//! Campaign service: the surface exposed to the request-handling layer.
//!
//! Each submitted request becomes an independent tokio task with its own
//! orchestrator and context. The run registry is the only shared structure;
//! it maps run ids to status receivers, cancel handles and outcome slots.
//!
//! A supervisor task awaits every run task. A run whose task panics still
//! terminates: it is reported FAILED with kind `aborted`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::collaborator::Collaborators;
use crate::config::PipelineConfig;
use crate::domain::{
    CampaignError, CampaignRequest, FailureReport, PipelineState, Result, RunId, RunOutcome,
    RunStatus,
};
use crate::executor::{cancel_pair, CancelHandle};
use crate::orchestrator::Orchestrator;

type OutcomeSlot = watch::Receiver<Option<Arc<RunOutcome>>>;

struct RunEntry {
    status: watch::Receiver<RunStatus>,
    cancel: CancelHandle,
    outcome: OutcomeSlot,
}

/// Submits campaign runs and answers status and result queries.
#[derive(Clone)]
pub struct CampaignService {
    config: Arc<PipelineConfig>,
    collaborators: Collaborators,
    runs: Arc<RwLock<HashMap<RunId, RunEntry>>>,
}

impl CampaignService {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Self {
        Self {
            config: Arc::new(config),
            collaborators,
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start a run for `request` and return its id immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit_campaign(&self, request: CampaignRequest) -> RunId {
        let run_id = RunId::new();
        let (cancel, signal) = cancel_pair();
        let orchestrator = Orchestrator::new(run_id, self.config.clone(), self.collaborators.clone())
            .with_cancel(signal);
        let (outcome_tx, outcome_rx) = watch::channel(None);

        let status = orchestrator.subscribe();

        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                run_id,
                RunEntry {
                    status: status.clone(),
                    cancel,
                    outcome: outcome_rx,
                },
            );

        info!(run_id = %run_id, "campaign submitted");
        let task = tokio::spawn(async move { orchestrator.run(Arc::new(request)).await });
        tokio::spawn(async move {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    let reason = format!("run task terminated: {join_error}");
                    error!(run_id = %run_id, error = %join_error, "run task aborted");
                    RunOutcome::Failed {
                        report: FailureReport::aborted(&status.borrow(), reason),
                    }
                }
            };
            outcome_tx.send_replace(Some(Arc::new(outcome)));
        });

        run_id
    }

    /// Latest published status of a run.
    ///
    /// Once an outcome exists the state is terminal, even if the run task
    /// died before publishing it.
    pub fn get_run_status(&self, run_id: RunId) -> Result<RunStatus> {
        self.with_entry(run_id, |entry| {
            let mut status = entry.status.borrow().clone();
            if let Some(outcome) = entry.outcome.borrow().as_ref() {
                if !status.state.is_terminal() {
                    status.state = if outcome.is_success() {
                        PipelineState::Done
                    } else {
                        PipelineState::Failed
                    };
                }
            }
            status
        })
    }

    /// Terminal outcome of a run, or `None` while it is still in flight.
    pub fn get_result(&self, run_id: RunId) -> Result<Option<Arc<RunOutcome>>> {
        self.with_entry(run_id, |entry| entry.outcome.borrow().clone())
    }

    /// Request cancellation. Returns `false` if the run already finished.
    pub fn cancel(&self, run_id: RunId) -> Result<bool> {
        self.with_entry(run_id, |entry| {
            if entry.outcome.borrow().is_some() {
                return false;
            }
            debug!(run_id = %run_id, "cancellation requested");
            entry.cancel.cancel();
            true
        })
    }

    /// Wait until the run reaches DONE or FAILED.
    pub async fn wait_for_result(&self, run_id: RunId) -> Result<Arc<RunOutcome>> {
        let mut outcome = self.with_entry(run_id, |entry| entry.outcome.clone())?;
        loop {
            if let Some(result) = outcome.borrow_and_update().clone() {
                return Ok(result);
            }
            if outcome.changed().await.is_err() {
                // The supervisor itself was dropped, e.g. at runtime shutdown.
                return outcome
                    .borrow()
                    .clone()
                    .ok_or(CampaignError::RunAborted(run_id));
            }
        }
    }

    /// Runs that have not produced an outcome yet.
    pub fn active_runs(&self) -> Vec<RunId> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        let mut active: Vec<RunId> = runs
            .iter()
            .filter(|(_, entry)| entry.outcome.borrow().is_none())
            .map(|(id, _)| *id)
            .collect();
        active.sort();
        active
    }

    /// Drop finished runs from the registry; returns how many were removed.
    pub fn prune_finished(&self) -> usize {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        let before = runs.len();
        runs.retain(|_, entry| entry.outcome.borrow().is_none());
        before - runs.len()
    }

    fn with_entry<T>(&self, run_id: RunId, f: impl FnOnce(&RunEntry) -> T) -> Result<T> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        runs.get(&run_id)
            .map(f)
            .ok_or(CampaignError::RunNotFound(run_id))
    }
}

impl std::fmt::Debug for CampaignService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
