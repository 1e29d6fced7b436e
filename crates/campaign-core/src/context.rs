//! Per-run workflow context.
//!
//! Exclusively owned by one orchestrator for the lifetime of a run. Records
//! are append-only: a correction produces a new record and the previous one
//! stays in place, superseded.

use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::contracts::AcceptedPayload;
use crate::domain::{
    CampaignError, CampaignRequest, ContentDraft, DesignOutput, QualityScore, Result, Stage,
    StagePayload, StageRecord,
};

/// Accumulated state of one pipeline run.
#[derive(Debug)]
pub struct WorkflowContext {
    trace_id: Uuid,
    request: Arc<CampaignRequest>,
    records: Vec<StageRecord>,
    executions: BTreeMap<Stage, u32>,
}

impl WorkflowContext {
    pub fn new(request: Arc<CampaignRequest>) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            request,
            records: Vec::new(),
            executions: BTreeMap::new(),
        }
    }

    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    pub fn request(&self) -> &Arc<CampaignRequest> {
        &self.request
    }

    /// Append a validated payload produced during pipeline pass `iteration`.
    ///
    /// Fails if the stage's predecessor has no record yet, or if `iteration`
    /// is lower than the iteration of the last appended record.
    pub fn append(&mut self, accepted: AcceptedPayload, iteration: u32) -> Result<&StageRecord> {
        let stage = accepted.stage();

        if let Some(requires) = stage.predecessor() {
            if self.latest(requires).is_none() {
                return Err(CampaignError::HandoffOutOfOrder { stage, requires });
            }
        }

        if let Some(last) = self.records.last() {
            if iteration < last.iteration() {
                return Err(CampaignError::IterationRegression {
                    stage,
                    iteration,
                    previous: last.iteration(),
                });
            }
        }

        let (payload, contract_version) = accepted.into_parts();
        let record = StageRecord::new(
            self.records.len() as u32,
            payload,
            iteration,
            contract_version,
        )?;
        *self.executions.entry(stage).or_insert(0) += 1;
        self.records.push(record);

        let index = self.records.len() - 1;
        Ok(&self.records[index])
    }

    /// The live (most recent) record of a stage.
    pub fn latest(&self, stage: Stage) -> Option<&StageRecord> {
        self.records.iter().rev().find(|r| r.stage() == stage)
    }

    pub fn content(&self) -> Option<&ContentDraft> {
        match self.latest(Stage::Content)?.payload() {
            StagePayload::Content(draft) => Some(draft),
            _ => None,
        }
    }

    pub fn design(&self) -> Option<&DesignOutput> {
        match self.latest(Stage::Design)?.payload() {
            StagePayload::Design(design) => Some(design),
            _ => None,
        }
    }

    pub fn latest_score(&self) -> Option<&QualityScore> {
        match self.latest(Stage::Quality)?.payload() {
            StagePayload::Quality(score) => Some(score),
            _ => None,
        }
    }

    /// Every recorded quality score, oldest first.
    pub fn quality_history(&self) -> Vec<QualityScore> {
        self.records
            .iter()
            .filter_map(|r| match r.payload() {
                StagePayload::Quality(score) => Some(score.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of accepted records for `stage`.
    pub fn executions(&self, stage: Stage) -> u32 {
        self.executions.get(&stage).copied().unwrap_or(0)
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
