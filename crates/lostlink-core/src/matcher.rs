use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::notify::{MatchNotification, Notifier};
use crate::report::{Report, ReportId, ReportStatus};
use crate::store::{PairUpdate, ReportStore, StoreError};

/// Result of a match attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
    /// Precondition not met (report not `Pending`); nothing was read or
    /// written.
    Skipped,
    /// No candidate satisfied the predicate; the report stays `Pending`.
    NoMatch,
    /// Both sides were linked in one pair update.
    Linked { candidate_id: ReportId },
}

/// Pick the first pending opposite-type report whose category matches the
/// new report's (case-folded, exact) and whose name overlaps it (case-folded
/// substring containment in either direction, no trimming or punctuation
/// normalization).
///
/// First match wins in snapshot order; there is no scoring and no tie-break
/// among equally valid candidates beyond that order.
pub fn find_candidate<'a>(new_report: &Report, snapshot: &'a [Report]) -> Option<&'a Report> {
    let wanted = new_report.report_type.opposite();
    let category = new_report.category.to_lowercase();
    let name = new_report.name.to_lowercase();

    snapshot
        .iter()
        .filter(|c| c.id != new_report.id)
        .filter(|c| c.report_type == wanted && c.status == ReportStatus::Pending)
        .find(|c| {
            let candidate_name = c.name.to_lowercase();
            c.category.to_lowercase() == category
                && (candidate_name.contains(&name) || name.contains(&candidate_name))
        })
}

/// Pairs newly created reports against pending reports of the opposite
/// type.
///
/// This is the only component that sets `Matched` or writes `match_id`,
/// and it does so exclusively through [`PairUpdate`]. It runs synchronously
/// over a snapshot taken after the triggering create was acknowledged;
/// concurrent sessions creating opposite-type reports at the same instant
/// can still each see a snapshot without the other, which the pending
/// compare-and-set inside the pair update narrows to at most one applied
/// link.
pub struct Matcher<S: ReportStore + ?Sized, N: Notifier + ?Sized> {
    store: Arc<S>,
    notifier: Arc<N>,
}

impl<S: ReportStore + ?Sized, N: Notifier + ?Sized> Matcher<S, N> {
    pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
        Self { store, notifier }
    }

    /// Evaluate a freshly persisted report against the current snapshot
    /// and, on success, link both sides and raise a notification.
    ///
    /// Must be called only after the store has acknowledged the create
    /// that produced `new_report`, and never twice concurrently for the
    /// same report id.
    pub fn evaluate_and_link(&self, new_report: &Report) -> Result<MatchOutcome, StoreError> {
        if new_report.status != ReportStatus::Pending {
            debug!(report_id = %new_report.id, status = ?new_report.status, "match skipped");
            return Ok(MatchOutcome::Skipped);
        }

        let snapshot = self.store.snapshot_all()?;
        let candidate_id = match find_candidate(new_report, &snapshot) {
            Some(candidate) => candidate.id,
            None => return Ok(MatchOutcome::NoMatch),
        };

        let applied = self
            .store
            .apply_pair_update(PairUpdate::link(new_report.id, candidate_id))
            .map_err(|e| {
                self.notifier.notify(MatchNotification::MatchFailed {
                    report_name: new_report.name.clone(),
                });
                e
            })?;

        if !applied {
            // Candidate deleted or edited out of Pending between
            // selection and write; nothing was linked.
            debug!(report_id = %new_report.id, %candidate_id, "pair update dropped");
            return Ok(MatchOutcome::NoMatch);
        }

        info!(report_id = %new_report.id, %candidate_id, "reports linked");
        self.notifier.notify(MatchNotification::MatchFound {
            report_name: new_report.name.clone(),
            candidate_id,
        });
        Ok(MatchOutcome::Linked { candidate_id })
    }
}
