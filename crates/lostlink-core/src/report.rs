use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique report identifier (UUID v4), assigned by the store.
pub type ReportId = Uuid;

/// Whether an item was reported as lost or as found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportType {
    Lost,
    Found,
}

impl ReportType {
    /// A lost report is only ever matched against found reports, and
    /// vice versa.
    pub fn opposite(self) -> Self {
        match self {
            ReportType::Lost => ReportType::Found,
            ReportType::Found => ReportType::Lost,
        }
    }
}

/// Lifecycle state of a report.
///
/// `Matched` is set exclusively by the matcher through a pair update;
/// `Claimed` and `Returned` are reachable only through manual edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportStatus {
    Pending,
    Matched,
    Claimed,
    Returned,
}

impl ReportStatus {
    /// True for the states a staff member records at handover time.
    pub fn is_handover_state(self) -> bool {
        matches!(self, ReportStatus::Claimed | ReportStatus::Returned)
    }
}

/// Who owns a lost item (student register details).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerDetails {
    pub register_number: String,
    pub year: i32,
    pub dept: String,
}

/// Who an item was handed over to once claimed or returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverDetails {
    pub name: String,
    pub faculty: String,
    pub dept: String,
    pub cabin_no: String,
}

/// User-submitted report fields, before the store has assigned an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDraft {
    pub name: String,
    pub report_type: ReportType,
    pub category: String,
    pub description: String,
    pub location: String,
    pub date: DateTime<Utc>,
    pub picture_url: String,
    pub owner_details: Option<OwnerDetails>,
}

/// A single lost-or-found item record.
///
/// `id` and `created` are assigned by the store at creation time and are
/// stable for the record's lifetime. `match_id`, when present, references
/// a report whose own `match_id` points back here; the two sides are only
/// ever written together through a pair update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub name: String,
    pub report_type: ReportType,
    pub category: String,
    pub description: String,
    pub location: String,
    pub date: DateTime<Utc>,
    pub status: ReportStatus,
    pub picture_url: String,
    pub owner_details: Option<OwnerDetails>,
    pub handover_details: Option<HandoverDetails>,
    pub match_id: Option<ReportId>,
    pub created: DateTime<Utc>,
}

impl Report {
    /// Materialize a draft into a pending record with a store-assigned
    /// identity.
    pub fn from_draft(id: ReportId, created: DateTime<Utc>, draft: ReportDraft) -> Self {
        Self {
            id,
            name: draft.name,
            report_type: draft.report_type,
            category: draft.category,
            description: draft.description,
            location: draft.location,
            date: draft.date,
            status: ReportStatus::Pending,
            picture_url: draft.picture_url,
            owner_details: draft.owner_details,
            handover_details: None,
            match_id: None,
            created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet_draft() -> ReportDraft {
        ReportDraft {
            name: "Blue Wallet".into(),
            report_type: ReportType::Found,
            category: "Wallet".into(),
            description: "Leather wallet with a zipper".into(),
            location: "Library, second floor".into(),
            date: Utc::now(),
            picture_url: String::new(),
            owner_details: None,
        }
    }

    #[test]
    fn opposite_type() {
        assert_eq!(ReportType::Lost.opposite(), ReportType::Found);
        assert_eq!(ReportType::Found.opposite(), ReportType::Lost);
    }

    #[test]
    fn draft_materializes_pending_and_unlinked() {
        let report = Report::from_draft(Uuid::new_v4(), Utc::now(), wallet_draft());
        assert_eq!(report.status, ReportStatus::Pending);
        assert!(report.match_id.is_none());
        assert!(report.handover_details.is_none());
    }

    #[test]
    fn handover_states() {
        assert!(ReportStatus::Claimed.is_handover_state());
        assert!(ReportStatus::Returned.is_handover_state());
        assert!(!ReportStatus::Pending.is_handover_state());
        assert!(!ReportStatus::Matched.is_handover_state());
    }

    #[test]
    fn report_serde_round_trip() {
        let mut report = Report::from_draft(Uuid::new_v4(), Utc::now(), wallet_draft());
        report.owner_details = Some(OwnerDetails {
            register_number: "21BCE1042".into(),
            year: 3,
            dept: "CSE".into(),
        });
        report.handover_details = Some(HandoverDetails {
            name: "A. Kumar".into(),
            faculty: "Dr. Rao".into(),
            dept: "CSE".into(),
            cabin_no: "B-214".into(),
        });
        let json = serde_json::to_string_pretty(&report).unwrap();
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(report, back);
    }
}
