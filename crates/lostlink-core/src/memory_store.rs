use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, RwLock};

use chrono::Utc;
use uuid::Uuid;

use crate::event::ReportEvent;
use crate::query::ReportQuery;
use crate::report::{Report, ReportDraft, ReportId, ReportStatus};
use crate::store::{PairUpdate, ReportMutation, ReportStore, StoreError};

/// In-memory implementation of the ReportStore trait.
///
/// Records are kept in creation order, so `snapshot_all` needs no sort and
/// the matcher's first-match tie-break is insertion order. Pair updates run
/// under a single write lock, so both sides of a link flip in the same
/// observable state transition.
pub struct InMemoryReportStore {
    reports: RwLock<Vec<Report>>,
    subscribers: Mutex<Vec<Sender<ReportEvent>>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self {
            reports: RwLock::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.reports.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn emit(&self, event: ReportEvent) {
        // Drop subscribers whose receiver has gone away
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

impl Default for InMemoryReportStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportStore for InMemoryReportStore {
    fn create(&self, draft: ReportDraft) -> Result<Report, StoreError> {
        let report = Report::from_draft(Uuid::new_v4(), Utc::now(), draft);
        let mut reports = self
            .reports
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        reports.push(report.clone());
        drop(reports);
        self.emit(ReportEvent::Created(Box::new(report.clone())));
        Ok(report)
    }

    fn get(&self, id: ReportId) -> Result<Option<Report>, StoreError> {
        let reports = self
            .reports
            .read()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(reports.iter().find(|r| r.id == id).cloned())
    }

    fn update(&self, id: ReportId, mutations: Vec<ReportMutation>) -> Result<(), StoreError> {
        for m in &mutations {
            m.validate()?;
        }
        let mut reports = self
            .reports
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        let report = reports
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;
        for m in &mutations {
            m.apply_to(report);
        }
        drop(reports);
        self.emit(ReportEvent::Updated { id, mutations });
        Ok(())
    }

    fn delete(&self, id: ReportId) -> Result<(), StoreError> {
        let mut reports = self
            .reports
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        let pos = reports
            .iter()
            .position(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;
        reports.remove(pos);
        drop(reports);
        self.emit(ReportEvent::Deleted(id));
        Ok(())
    }

    fn snapshot_all(&self) -> Result<Vec<Report>, StoreError> {
        let reports = self
            .reports
            .read()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(reports.clone())
    }

    fn query(&self, q: &ReportQuery) -> Result<Vec<Report>, StoreError> {
        let reports = self
            .reports
            .read()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(reports.iter().filter(|r| q.matches(r)).cloned().collect())
    }

    fn count(&self, q: &ReportQuery) -> Result<usize, StoreError> {
        let reports = self
            .reports
            .read()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(reports.iter().filter(|r| q.matches(r)).count())
    }

    fn apply_pair_update(&self, update: PairUpdate) -> Result<bool, StoreError> {
        let mut reports = self
            .reports
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let first_pos = reports.iter().position(|r| r.id == update.first.id);
        let second_pos = reports.iter().position(|r| r.id == update.second.id);
        let (first_pos, second_pos) = match (first_pos, second_pos) {
            (Some(a), Some(b)) => (a, b),
            // Either side deleted since candidate selection: whole update
            // is a no-op, never half-applied.
            _ => return Ok(false),
        };
        if reports[first_pos].status != ReportStatus::Pending
            || reports[second_pos].status != ReportStatus::Pending
        {
            return Ok(false);
        }

        reports[first_pos].status = update.first.status;
        reports[first_pos].match_id = Some(update.first.match_id);
        reports[second_pos].status = update.second.status;
        reports[second_pos].match_id = Some(update.second.match_id);
        drop(reports);

        self.emit(ReportEvent::MatchLinked {
            report_id: update.first.id,
            candidate_id: update.second.id,
        });
        Ok(true)
    }

    fn subscribe(&self) -> Result<Receiver<ReportEvent>, StoreError> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .map_err(|e| StoreError::Storage(e.to_string()))?
            .push(tx);
        Ok(rx)
    }
}
