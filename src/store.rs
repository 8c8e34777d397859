// Media record store for mediascribe
//
// In-memory repository for media records. Creation belongs to the upload
// path; every status/result mutation after creation goes through the
// orchestrator, and the compare-and-set below is what keeps two runs from
// owning the same record.

use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{MediaRecord, TranscriptionStatus};

/// Outcome of attempting to claim a record for processing
#[derive(Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Record moved to Processing; the caller owns the run
    Claimed,
    /// Another run already owns this record; caller must back off
    AlreadyProcessing,
    /// No record under this id
    NotFound,
}

/// Repository for media records
#[derive(Clone)]
pub struct MediaStore {
    records: Arc<Mutex<HashMap<Uuid, MediaRecord>>>,
}

impl MediaStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn insert(&self, record: MediaRecord) {
        let mut records = self.records.lock().await;
        records.insert(record.id, record);
    }

    pub async fn get(&self, id: Uuid) -> Option<MediaRecord> {
        let records = self.records.lock().await;
        records.get(&id).cloned()
    }

    /// Compare-and-set claim used as the advisory lock for a run.
    ///
    /// Any state except Processing may be claimed: Pending for a first run,
    /// Error for a manual retry, Completed for an explicit re-request. The
    /// transcript and error fields are cleared on claim so the mutual
    /// exclusivity invariant holds while the run is in flight.
    pub async fn try_claim_for_processing(&self, id: Uuid) -> ClaimOutcome {
        let mut records = self.records.lock().await;
        match records.get_mut(&id) {
            None => ClaimOutcome::NotFound,
            Some(record) if record.status == TranscriptionStatus::Processing => {
                ClaimOutcome::AlreadyProcessing
            }
            Some(record) => {
                record.status = TranscriptionStatus::Processing;
                record.transcript = None;
                record.error_message = None;
                record.transcribed_at = None;
                debug!("Media {} claimed for processing", id);
                ClaimOutcome::Claimed
            }
        }
    }

    /// Persist a successful transcription: status, text and timestamp land
    /// in one visible mutation.
    pub async fn complete(&self, id: Uuid, transcript: String) -> bool {
        let mut records = self.records.lock().await;
        match records.get_mut(&id) {
            Some(record) => {
                record.status = TranscriptionStatus::Completed;
                record.transcript = Some(transcript);
                record.error_message = None;
                record.transcribed_at = Some(chrono::Utc::now());
                true
            }
            None => false,
        }
    }

    /// Remove a record, e.g. when the owning media is deleted. A run that
    /// loses its record mid-flight logs and drops its result.
    pub async fn remove(&self, id: Uuid) -> bool {
        let mut records = self.records.lock().await;
        records.remove(&id).is_some()
    }

    /// Record a terminal run failure
    pub async fn fail(&self, id: Uuid, message: String) -> bool {
        let mut records = self.records.lock().await;
        match records.get_mut(&id) {
            Some(record) => {
                record.status = TranscriptionStatus::Error;
                record.error_message = Some(message);
                record.transcript = None;
                true
            }
            None => false,
        }
    }
}

impl Default for MediaStore {
    fn default() -> Self {
        Self::new()
    }
}
