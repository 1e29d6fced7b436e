//! Validated stage records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Digest as _;

use super::error::{CampaignError, Result};
use super::stage::{Stage, StagePayload};

/// One stage's validated output.
///
/// Records are immutable once constructed: fields are private and only
/// exposed through getters. A correction produces a new record with a higher
/// iteration number instead of editing this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    sequence: u32,
    stage: Stage,
    iteration: u32,
    contract_version: u32,
    validated_at: DateTime<Utc>,
    /// SHA-256 hex digest of `serde_json::to_vec(&payload)`.
    digest: String,
    payload: StagePayload,
}

impl StageRecord {
    pub(crate) fn new(
        sequence: u32,
        payload: StagePayload,
        iteration: u32,
        contract_version: u32,
    ) -> Result<Self> {
        let digest = payload_digest(&payload)?;
        Ok(Self {
            sequence,
            stage: payload.stage(),
            iteration,
            contract_version,
            validated_at: Utc::now(),
            digest,
            payload,
        })
    }

    /// Position of this record in the run's record list (0-based).
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Pipeline pass that produced this record (1-based).
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn contract_version(&self) -> u32 {
        self.contract_version
    }

    pub fn validated_at(&self) -> DateTime<Utc> {
        self.validated_at
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn payload(&self) -> &StagePayload {
        &self.payload
    }

    /// Re-derive the payload digest and compare it with the stored one.
    ///
    /// Returns `CampaignError::DigestMismatch` if the payload was altered
    /// after validation (e.g. in a persisted artifact).
    pub fn verify(&self) -> Result<()> {
        let computed = payload_digest(&self.payload)?;
        if computed != self.digest {
            return Err(CampaignError::DigestMismatch {
                expected: self.digest.clone(),
                actual: computed,
            });
        }
        if self.payload.stage() != self.stage {
            return Err(CampaignError::PayloadMismatch {
                expected: self.stage,
                actual: self.payload.stage(),
            });
        }
        Ok(())
    }
}

fn payload_digest(payload: &StagePayload) -> Result<String> {
    let bytes = serde_json::to_vec(payload)?;
    Ok(hex::encode(sha2::Sha256::digest(&bytes)))
}
