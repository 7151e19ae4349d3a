use std::sync::Arc;

use tracing::info;

use crate::matcher::{MatchOutcome, Matcher};
use crate::notify::Notifier;
use crate::query::ReportQuery;
use crate::report::{HandoverDetails, Report, ReportDraft, ReportId, ReportStatus};
use crate::store::{ReportMutation, ReportStore, StoreError};

/// Coordination façade over the store, matcher and notifier.
///
/// This is the surface a UI binds to: submitting a report persists it and
/// then runs one match attempt against the acknowledged record; edits and
/// deletions never trigger matching.
pub struct ReportRegistry<S: ReportStore + ?Sized, N: Notifier + ?Sized> {
    store: Arc<S>,
    matcher: Matcher<S, N>,
}

impl<S: ReportStore + ?Sized, N: Notifier + ?Sized> ReportRegistry<S, N> {
    pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
        let matcher = Matcher::new(Arc::clone(&store), notifier);
        Self { store, matcher }
    }

    /// Persist a new report, then evaluate it for a match. The match
    /// attempt runs only once the create has completed and the record
    /// carries its store-assigned identity.
    pub fn submit(&self, draft: ReportDraft) -> Result<(Report, MatchOutcome), StoreError> {
        let report = self.store.create(draft)?;
        info!(report_id = %report.id, report_type = ?report.report_type, "report submitted");
        let outcome = self.matcher.evaluate_and_link(&report)?;
        // Return the post-match state so callers see the linked record
        let report = self.store.get(report.id)?.unwrap_or(report);
        Ok((report, outcome))
    }

    /// Manual edit path. Does not re-run matching.
    pub fn edit(&self, id: ReportId, mutations: Vec<ReportMutation>) -> Result<(), StoreError> {
        self.store.update(id, mutations)
    }

    /// Record handover of a claimed item to a custodian. The status must
    /// be one of the handover states.
    pub fn record_handover(
        &self,
        id: ReportId,
        details: HandoverDetails,
        status: ReportStatus,
    ) -> Result<(), StoreError> {
        if !status.is_handover_state() {
            return Err(StoreError::Validation(format!(
                "handover requires status Claimed or Returned, got {:?}",
                status
            )));
        }
        self.store.update(
            id,
            vec![
                ReportMutation::SetHandoverDetails(Some(details)),
                ReportMutation::SetStatus(status),
            ],
        )
    }

    /// Delete a report. The matched counterpart, if any, keeps its
    /// `match_id` pointing at the removed record.
    pub fn remove(&self, id: ReportId) -> Result<(), StoreError> {
        self.store.delete(id)
    }

    pub fn report(&self, id: ReportId) -> Result<Option<Report>, StoreError> {
        self.store.get(id)
    }

    pub fn reports(&self) -> Result<Vec<Report>, StoreError> {
        self.store.snapshot_all()
    }

    pub fn search(&self, q: &ReportQuery) -> Result<Vec<Report>, StoreError> {
        self.store.query(q)
    }

    pub fn count(&self, q: &ReportQuery) -> Result<usize, StoreError> {
        self.store.count(q)
    }
}
