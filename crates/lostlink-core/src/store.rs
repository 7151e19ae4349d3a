use serde::{Deserialize, Serialize};
use std::sync::mpsc::Receiver;

use chrono::{DateTime, Utc};

use crate::event::ReportEvent;
use crate::query::ReportQuery;
use crate::report::{
    HandoverDetails, OwnerDetails, Report, ReportDraft, ReportId, ReportStatus,
};

/// Mutation to apply to a report's fields through the manual edit path.
///
/// There is deliberately no variant that writes `match_id`, and `SetStatus`
/// rejects `Matched`: the linked state is only ever reachable through
/// [`PairUpdate`], which keeps the matcher the sole writer of that state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReportMutation {
    SetName(String),
    SetCategory(String),
    SetDescription(String),
    SetLocation(String),
    SetDate(DateTime<Utc>),
    SetPictureUrl(String),
    SetStatus(ReportStatus),
    SetOwnerDetails(Option<OwnerDetails>),
    SetHandoverDetails(Option<HandoverDetails>),
}

impl ReportMutation {
    /// Reject edits reserved for the matcher.
    pub fn validate(&self) -> Result<(), StoreError> {
        if matches!(self, ReportMutation::SetStatus(ReportStatus::Matched)) {
            return Err(StoreError::Validation(
                "status 'Matched' is only set by a pair update".into(),
            ));
        }
        Ok(())
    }

    /// Apply this mutation to an in-memory record.
    pub fn apply_to(&self, report: &mut Report) {
        match self {
            ReportMutation::SetName(v) => report.name = v.clone(),
            ReportMutation::SetCategory(v) => report.category = v.clone(),
            ReportMutation::SetDescription(v) => report.description = v.clone(),
            ReportMutation::SetLocation(v) => report.location = v.clone(),
            ReportMutation::SetDate(v) => report.date = *v,
            ReportMutation::SetPictureUrl(v) => report.picture_url = v.clone(),
            ReportMutation::SetStatus(v) => report.status = *v,
            ReportMutation::SetOwnerDetails(v) => report.owner_details = v.clone(),
            ReportMutation::SetHandoverDetails(v) => report.handover_details = v.clone(),
        }
    }
}

/// One side of a coordinated two-record write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairEntry {
    pub id: ReportId,
    pub status: ReportStatus,
    pub match_id: ReportId,
}

/// The coordinated write that links two reports.
///
/// Carries exactly the two `(id, status, match_id)` tuples a successful
/// match produces. Backends apply both entries in one observable state
/// transition, guarded by both records still being `Pending`; a record
/// deleted or edited since candidate selection makes the whole update a
/// no-op rather than leaving one side linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairUpdate {
    pub first: PairEntry,
    pub second: PairEntry,
}

impl PairUpdate {
    /// Build the reciprocal link between a new report and its candidate.
    pub fn link(report_id: ReportId, candidate_id: ReportId) -> Self {
        Self {
            first: PairEntry {
                id: report_id,
                status: ReportStatus::Matched,
                match_id: candidate_id,
            },
            second: PairEntry {
                id: candidate_id,
                status: ReportStatus::Matched,
                match_id: report_id,
            },
        }
    }
}

/// The trait all report storage backends implement.
pub trait ReportStore: Send + Sync {
    /// Persist a draft. Assigns identity, creation time and `Pending`
    /// status, and returns the materialized record.
    fn create(&self, draft: ReportDraft) -> Result<Report, StoreError>;

    /// Get a report by ID.
    fn get(&self, id: ReportId) -> Result<Option<Report>, StoreError>;

    /// Apply manual-edit mutations to an existing report.
    fn update(&self, id: ReportId, mutations: Vec<ReportMutation>) -> Result<(), StoreError>;

    /// Delete a report by ID. Deleting half of a matched pair leaves the
    /// survivor's `match_id` dangling; there is no unmatch path.
    fn delete(&self, id: ReportId) -> Result<(), StoreError>;

    /// The full collection in creation order (id as tie-break). This is
    /// the snapshot the matcher scans, so the order is the first-match
    /// tie-break.
    fn snapshot_all(&self) -> Result<Vec<Report>, StoreError>;

    /// Reports matching a filter, in snapshot order.
    fn query(&self, q: &ReportQuery) -> Result<Vec<Report>, StoreError>;

    /// Count reports matching a filter without fetching them.
    fn count(&self, q: &ReportQuery) -> Result<usize, StoreError>;

    /// Apply a coordinated two-record write. Returns `Ok(true)` when both
    /// entries were applied, `Ok(false)` when either target was missing or
    /// no longer `Pending` (nothing is written in that case), and `Err`
    /// only for backend failures.
    fn apply_pair_update(&self, update: PairUpdate) -> Result<bool, StoreError>;

    /// Subscribe to change events. Returns a channel of events.
    fn subscribe(&self) -> Result<Receiver<ReportEvent>, StoreError>;
}

/// Errors from the report store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Report not found: {0}")]
    NotFound(ReportId),

    #[error("Report already exists: {0}")]
    AlreadyExists(ReportId),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
