use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::event::ReportEvent;
use crate::query::ReportQuery;
use crate::report::{
    HandoverDetails, OwnerDetails, Report, ReportDraft, ReportId, ReportStatus, ReportType,
};
use crate::store::{PairUpdate, ReportMutation, ReportStore, StoreError};

/// SQLite-backed implementation of the ReportStore trait.
pub struct SqliteReportStore {
    conn: Mutex<Connection>,
    subscribers: Mutex<Vec<Sender<ReportEvent>>>,
}

impl SqliteReportStore {
    /// Open (or create) a database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn =
            Connection::open(path).map_err(|e| StoreError::Storage(format!("open: {}", e)))?;
        Self::init_with_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Storage(format!("open_in_memory: {}", e)))?;
        Self::init_with_connection(conn)
    }

    fn init_with_connection(conn: Connection) -> Result<Self, StoreError> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                report_type TEXT NOT NULL,
                category TEXT NOT NULL,
                description TEXT NOT NULL,
                location TEXT NOT NULL,
                date INTEGER NOT NULL,
                status TEXT NOT NULL,
                picture_url TEXT NOT NULL,
                owner_register TEXT,
                owner_year INTEGER,
                owner_dept TEXT,
                handover_name TEXT,
                handover_faculty TEXT,
                handover_dept TEXT,
                handover_cabin TEXT,
                match_id TEXT,
                created INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_reports_type ON reports(report_type);
            CREATE INDEX IF NOT EXISTS idx_reports_status ON reports(status);
            CREATE INDEX IF NOT EXISTS idx_reports_created ON reports(created);
            ",
        )
        .map_err(|e| StoreError::Storage(format!("init_schema: {}", e)))?;
        Ok(())
    }

    fn emit(&self, event: ReportEvent) {
        // Drop subscribers whose receiver has gone away
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Storage(e.to_string()))
    }

    fn row_to_report(row: &rusqlite::Row<'_>) -> rusqlite::Result<Report> {
        let id_str: String = row.get(0)?;
        let name: String = row.get(1)?;
        let type_str: String = row.get(2)?;
        let category: String = row.get(3)?;
        let description: String = row.get(4)?;
        let location: String = row.get(5)?;
        let date_ms: i64 = row.get(6)?;
        let status_str: String = row.get(7)?;
        let picture_url: String = row.get(8)?;
        let owner_register: Option<String> = row.get(9)?;
        let owner_year: Option<i32> = row.get(10)?;
        let owner_dept: Option<String> = row.get(11)?;
        let handover_name: Option<String> = row.get(12)?;
        let handover_faculty: Option<String> = row.get(13)?;
        let handover_dept: Option<String> = row.get(14)?;
        let handover_cabin: Option<String> = row.get(15)?;
        let match_id_str: Option<String> = row.get(16)?;
        let created_ms: i64 = row.get(17)?;

        let owner_details = owner_register.map(|register_number| OwnerDetails {
            register_number,
            year: owner_year.unwrap_or(0),
            dept: owner_dept.unwrap_or_default(),
        });
        let handover_details = handover_name.map(|name| HandoverDetails {
            name,
            faculty: handover_faculty.unwrap_or_default(),
            dept: handover_dept.unwrap_or_default(),
            cabin_no: handover_cabin.unwrap_or_default(),
        });

        Ok(Report {
            id: Uuid::parse_str(&id_str).unwrap_or_default(),
            name,
            report_type: parse_type(&type_str),
            category,
            description,
            location,
            date: millis_to_utc(date_ms),
            status: parse_status(&status_str),
            picture_url,
            owner_details,
            handover_details,
            match_id: match_id_str.and_then(|s| Uuid::parse_str(&s).ok()),
            created: millis_to_utc(created_ms),
        })
    }
}

const SELECT_COLUMNS: &str = "id, name, report_type, category, description, location, date, \
     status, picture_url, owner_register, owner_year, owner_dept, \
     handover_name, handover_faculty, handover_dept, handover_cabin, match_id, created";

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn type_str(t: ReportType) -> &'static str {
    match t {
        ReportType::Lost => "lost",
        ReportType::Found => "found",
    }
}

fn parse_type(s: &str) -> ReportType {
    match s {
        "found" => ReportType::Found,
        _ => ReportType::Lost,
    }
}

fn status_str(s: ReportStatus) -> &'static str {
    match s {
        ReportStatus::Pending => "pending",
        ReportStatus::Matched => "matched",
        ReportStatus::Claimed => "claimed",
        ReportStatus::Returned => "returned",
    }
}

fn parse_status(s: &str) -> ReportStatus {
    match s {
        "matched" => ReportStatus::Matched,
        "claimed" => ReportStatus::Claimed,
        "returned" => ReportStatus::Returned,
        _ => ReportStatus::Pending,
    }
}

impl ReportStore for SqliteReportStore {
    fn create(&self, draft: ReportDraft) -> Result<Report, StoreError> {
        let report = Report::from_draft(Uuid::new_v4(), Utc::now(), draft);
        let conn = self.lock_conn()?;
        let (owner_register, owner_year, owner_dept) = match &report.owner_details {
            Some(o) => (Some(o.register_number.clone()), Some(o.year), Some(o.dept.clone())),
            None => (None, None, None),
        };
        conn.execute(
            "INSERT INTO reports (id, name, report_type, category, description, location, date, \
             status, picture_url, owner_register, owner_year, owner_dept, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                report.id.to_string(),
                report.name,
                type_str(report.report_type),
                report.category,
                report.description,
                report.location,
                report.date.timestamp_millis(),
                status_str(report.status),
                report.picture_url,
                owner_register,
                owner_year,
                owner_dept,
                report.created.timestamp_millis(),
            ],
        )
        .map_err(|e| {
            if let rusqlite::Error::SqliteFailure(ref err, _) = e {
                if err.code == rusqlite::ErrorCode::ConstraintViolation {
                    return StoreError::AlreadyExists(report.id);
                }
            }
            StoreError::Storage(format!("insert: {}", e))
        })?;
        drop(conn);
        self.emit(ReportEvent::Created(Box::new(report.clone())));
        Ok(report)
    }

    fn get(&self, id: ReportId) -> Result<Option<Report>, StoreError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM reports WHERE id = ?1", SELECT_COLUMNS))
            .map_err(|e| StoreError::Storage(format!("prepare get: {}", e)))?;
        stmt.query_row(params![id.to_string()], Self::row_to_report)
            .optional()
            .map_err(|e| StoreError::Storage(format!("query get: {}", e)))
    }

    fn update(&self, id: ReportId, mutations: Vec<ReportMutation>) -> Result<(), StoreError> {
        for m in &mutations {
            m.validate()?;
        }
        let conn = self.lock_conn()?;
        let id_str = id.to_string();

        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM reports WHERE id = ?1",
                params![&id_str],
                |row| row.get::<_, i64>(0),
            )
            .map(|c| c > 0)
            .map_err(|e| StoreError::Storage(format!("check exists: {}", e)))?;
        if !exists {
            return Err(StoreError::NotFound(id));
        }

        for mutation in &mutations {
            let result = match mutation {
                ReportMutation::SetName(v) => conn.execute(
                    "UPDATE reports SET name = ?1 WHERE id = ?2",
                    params![v, &id_str],
                ),
                ReportMutation::SetCategory(v) => conn.execute(
                    "UPDATE reports SET category = ?1 WHERE id = ?2",
                    params![v, &id_str],
                ),
                ReportMutation::SetDescription(v) => conn.execute(
                    "UPDATE reports SET description = ?1 WHERE id = ?2",
                    params![v, &id_str],
                ),
                ReportMutation::SetLocation(v) => conn.execute(
                    "UPDATE reports SET location = ?1 WHERE id = ?2",
                    params![v, &id_str],
                ),
                ReportMutation::SetDate(v) => conn.execute(
                    "UPDATE reports SET date = ?1 WHERE id = ?2",
                    params![v.timestamp_millis(), &id_str],
                ),
                ReportMutation::SetPictureUrl(v) => conn.execute(
                    "UPDATE reports SET picture_url = ?1 WHERE id = ?2",
                    params![v, &id_str],
                ),
                ReportMutation::SetStatus(v) => conn.execute(
                    "UPDATE reports SET status = ?1 WHERE id = ?2",
                    params![status_str(*v), &id_str],
                ),
                ReportMutation::SetOwnerDetails(v) => {
                    let (register, year, dept) = match v {
                        Some(o) => (
                            Some(o.register_number.clone()),
                            Some(o.year),
                            Some(o.dept.clone()),
                        ),
                        None => (None, None, None),
                    };
                    conn.execute(
                        "UPDATE reports SET owner_register = ?1, owner_year = ?2, owner_dept = ?3 \
                         WHERE id = ?4",
                        params![register, year, dept, &id_str],
                    )
                }
                ReportMutation::SetHandoverDetails(v) => {
                    let (name, faculty, dept, cabin) = match v {
                        Some(h) => (
                            Some(h.name.clone()),
                            Some(h.faculty.clone()),
                            Some(h.dept.clone()),
                            Some(h.cabin_no.clone()),
                        ),
                        None => (None, None, None, None),
                    };
                    conn.execute(
                        "UPDATE reports SET handover_name = ?1, handover_faculty = ?2, \
                         handover_dept = ?3, handover_cabin = ?4 WHERE id = ?5",
                        params![name, faculty, dept, cabin, &id_str],
                    )
                }
            };
            result.map_err(|e| StoreError::Storage(format!("update: {}", e)))?;
        }
        drop(conn);
        self.emit(ReportEvent::Updated { id, mutations });
        Ok(())
    }

    fn delete(&self, id: ReportId) -> Result<(), StoreError> {
        let conn = self.lock_conn()?;
        let n = conn
            .execute("DELETE FROM reports WHERE id = ?1", params![id.to_string()])
            .map_err(|e| StoreError::Storage(format!("delete: {}", e)))?;
        drop(conn);
        if n == 0 {
            return Err(StoreError::NotFound(id));
        }
        self.emit(ReportEvent::Deleted(id));
        Ok(())
    }

    fn snapshot_all(&self) -> Result<Vec<Report>, StoreError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM reports ORDER BY created, id",
                SELECT_COLUMNS
            ))
            .map_err(|e| StoreError::Storage(format!("prepare snapshot: {}", e)))?;
        let reports = stmt
            .query_map([], Self::row_to_report)
            .map_err(|e| StoreError::Storage(format!("query snapshot: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Storage(format!("collect snapshot: {}", e)))?;
        Ok(reports)
    }

    fn query(&self, q: &ReportQuery) -> Result<Vec<Report>, StoreError> {
        // The filter language is small; evaluate it over the ordered
        // snapshot rather than compiling SQL.
        Ok(self
            .snapshot_all()?
            .into_iter()
            .filter(|r| q.matches(r))
            .collect())
    }

    fn count(&self, q: &ReportQuery) -> Result<usize, StoreError> {
        Ok(self.query(q)?.len())
    }

    fn apply_pair_update(&self, update: PairUpdate) -> Result<bool, StoreError> {
        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StoreError::Storage(format!("begin tx: {}", e)))?;

        // Compare-and-set on both sides still being pending; either side
        // failing rolls the whole link back.
        let mut applied = 0usize;
        for entry in [update.first, update.second] {
            applied += tx
                .execute(
                    "UPDATE reports SET status = ?1, match_id = ?2 \
                     WHERE id = ?3 AND status = 'pending'",
                    params![
                        status_str(entry.status),
                        entry.match_id.to_string(),
                        entry.id.to_string()
                    ],
                )
                .map_err(|e| StoreError::Storage(format!("pair update: {}", e)))?;
        }

        if applied != 2 {
            tx.rollback()
                .map_err(|e| StoreError::Storage(format!("rollback: {}", e)))?;
            return Ok(false);
        }
        tx.commit()
            .map_err(|e| StoreError::Storage(format!("commit: {}", e)))?;
        drop(conn);

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{MatchOutcome, Matcher};
    use crate::notify::ChannelNotifier;
    use std::sync::mpsc;
    use std::sync::Arc;

    fn draft(name: &str, t: ReportType, category: &str) -> ReportDraft {
        ReportDraft {
            name: name.into(),
            report_type: t,
            category: category.into(),
            description: "left on a bench".into(),
            location: "Sports Complex".into(),
            date: Utc::now(),
            picture_url: String::new(),
            owner_details: None,
        }
    }

    #[test]
    fn create_and_get_round_trip() {
        let store = SqliteReportStore::open_in_memory().unwrap();
        let mut d = draft("ID Card", ReportType::Lost, "Documents");
        d.owner_details = Some(OwnerDetails {
            register_number: "21BCE1042".into(),
            year: 3,
            dept: "CSE".into(),
        });
        let report = store.create(d).unwrap();
        let back = store.get(report.id).unwrap().unwrap();
        assert_eq!(back.name, "ID Card");
        assert_eq!(back.status, ReportStatus::Pending);
        assert_eq!(back.owner_details.as_ref().unwrap().register_number, "21BCE1042");
        assert!(back.match_id.is_none());
    }

    #[test]
    fn snapshot_orders_by_creation() {
        let store = SqliteReportStore::open_in_memory().unwrap();
        let a = store.create(draft("A", ReportType::Lost, "Misc")).unwrap();
        let b = store.create(draft("B", ReportType::Found, "Misc")).unwrap();
        let snapshot = store.snapshot_all().unwrap();
        assert_eq!(snapshot.len(), 2);
        // created millis tie-break falls back to id ordering, so both
        // orders keep a and b adjacent and stable across calls
        let again = store.snapshot_all().unwrap();
        assert_eq!(
            snapshot.iter().map(|r| r.id).collect::<Vec<_>>(),
            again.iter().map(|r| r.id).collect::<Vec<_>>()
        );
        assert!(snapshot.iter().any(|r| r.id == a.id));
        assert!(snapshot.iter().any(|r| r.id == b.id));
    }

    #[test]
    fn update_and_handover_fields() {
        let store = SqliteReportStore::open_in_memory().unwrap();
        let report = store.create(draft("Calculator", ReportType::Found, "Electronics")).unwrap();
        store
            .update(
                report.id,
                vec![
                    ReportMutation::SetHandoverDetails(Some(HandoverDetails {
                        name: "R. Menon".into(),
                        faculty: "Prof. Das".into(),
                        dept: "EEE".into(),
                        cabin_no: "D-310".into(),
                    })),
                    ReportMutation::SetStatus(ReportStatus::Claimed),
                ],
            )
            .unwrap();
        let back = store.get(report.id).unwrap().unwrap();
        assert_eq!(back.status, ReportStatus::Claimed);
        assert_eq!(back.handover_details.unwrap().cabin_no, "D-310");

        let q = ReportQuery {
            handed_over_only: true,
            ..Default::default()
        };
        assert_eq!(store.count(&q).unwrap(), 1);
    }

    #[test]
    fn update_rejects_manual_matched_status() {
        let store = SqliteReportStore::open_in_memory().unwrap();
        let report = store.create(draft("Wallet", ReportType::Found, "Wallet")).unwrap();
        let err = store
            .update(
                report.id,
                vec![ReportMutation::SetStatus(ReportStatus::Matched)],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn pair_update_is_all_or_nothing() {
        let store = SqliteReportStore::open_in_memory().unwrap();
        let lost = store.create(draft("Wallet", ReportType::Lost, "Wallet")).unwrap();
        let found = store.create(draft("Wallet", ReportType::Found, "Wallet")).unwrap();

        assert!(store
            .apply_pair_update(PairUpdate::link(found.id, lost.id))
            .unwrap());
        let lost_back = store.get(lost.id).unwrap().unwrap();
        assert_eq!(lost_back.status, ReportStatus::Matched);
        assert_eq!(lost_back.match_id, Some(found.id));

        // A second link attempt against the now-matched pair is a no-op
        let third = store.create(draft("Wallet", ReportType::Found, "Wallet")).unwrap();
        assert!(!store
            .apply_pair_update(PairUpdate::link(third.id, lost.id))
            .unwrap());
        let third_back = store.get(third.id).unwrap().unwrap();
        assert_eq!(third_back.status, ReportStatus::Pending);
        assert!(third_back.match_id.is_none());
    }

    #[test]
    fn pair_update_with_deleted_side_rolls_back() {
        let store = SqliteReportStore::open_in_memory().unwrap();
        let lost = store.create(draft("Wallet", ReportType::Lost, "Wallet")).unwrap();
        let found = store.create(draft("Wallet", ReportType::Found, "Wallet")).unwrap();
        store.delete(lost.id).unwrap();

        assert!(!store
            .apply_pair_update(PairUpdate::link(found.id, lost.id))
            .unwrap());
        let found = store.get(found.id).unwrap().unwrap();
        assert_eq!(found.status, ReportStatus::Pending);
        assert!(found.match_id.is_none());
    }

    #[test]
    fn matcher_links_through_sqlite_backend() {
        let store = Arc::new(SqliteReportStore::open_in_memory().unwrap());
        let (tx, rx) = mpsc::channel();
        let matcher = Matcher::new(Arc::clone(&store), Arc::new(ChannelNotifier::new(tx)));

        let lost = store.create(draft("Wallet", ReportType::Lost, "WALLET")).unwrap();
        let found = store.create(draft("Blue Wallet", ReportType::Found, "Wallet")).unwrap();

        let outcome = matcher.evaluate_and_link(&found).unwrap();
        assert_eq!(
            outcome,
            MatchOutcome::Linked {
                candidate_id: lost.id
            }
        );
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn reopening_a_file_store_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.db");

        let id = {
            let store = SqliteReportStore::open(&path).unwrap();
            store.create(draft("Umbrella", ReportType::Lost, "Accessories")).unwrap().id
        };

        let store = SqliteReportStore::open(&path).unwrap();
        let back = store.get(id).unwrap().unwrap();
        assert_eq!(back.name, "Umbrella");
    }

    #[test]
    fn subscribers_observe_link_events() {
        let store = SqliteReportStore::open_in_memory().unwrap();
        let rx = store.subscribe().unwrap();
        let lost = store.create(draft("Wallet", ReportType::Lost, "Wallet")).unwrap();
        let found = store.create(draft("Wallet", ReportType::Found, "Wallet")).unwrap();
        store
            .apply_pair_update(PairUpdate::link(found.id, lost.id))
            .unwrap();

        assert!(matches!(rx.try_recv().unwrap(), ReportEvent::Created(_)));
        assert!(matches!(rx.try_recv().unwrap(), ReportEvent::Created(_)));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ReportEvent::MatchLinked { .. }
        ));
    }
}
