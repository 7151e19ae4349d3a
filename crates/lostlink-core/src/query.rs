use serde::{Deserialize, Serialize};

use crate::report::{Report, ReportStatus, ReportType};

/// A filter against the report collection.
///
/// Maps to the listing surfaces of the registry UI:
/// - items tab → `ReportQuery { report_type: Some(t), .. }`
/// - search box → `ReportQuery { search: Some(term), .. }`
/// - handover records → `ReportQuery { handed_over_only: true, .. }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportQuery {
    pub report_type: Option<ReportType>,
    pub status: Option<ReportStatus>,
    /// Case-insensitive substring match over name, location and
    /// description. For handover records the handover fields are
    /// searched as well.
    pub search: Option<String>,
    /// Restrict to reports that carry a named handover record.
    pub handed_over_only: bool,
}

impl ReportQuery {
    pub fn matches(&self, report: &Report) -> bool {
        if let Some(t) = self.report_type {
            if report.report_type != t {
                return false;
            }
        }
        if let Some(s) = self.status {
            if report.status != s {
                return false;
            }
        }
        if self.handed_over_only
            && !report
                .handover_details
                .as_ref()
                .is_some_and(|h| !h.name.is_empty())
        {
            return false;
        }
        if let Some(ref term) = self.search {
            if !term.is_empty() && !self.search_hits(report, term) {
                return false;
            }
        }
        true
    }

    fn search_hits(&self, report: &Report, term: &str) -> bool {
        let term = term.to_lowercase();
        let hit = report.name.to_lowercase().contains(&term)
            || report.location.to_lowercase().contains(&term)
            || report.description.to_lowercase().contains(&term);
        if hit {
            return true;
        }
        if self.handed_over_only {
            if let Some(h) = &report.handover_details {
                return h.name.to_lowercase().contains(&term)
                    || h.faculty.to_lowercase().contains(&term)
                    || h.dept.to_lowercase().contains(&term)
                    || h.cabin_no.to_lowercase().contains(&term);
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{HandoverDetails, ReportDraft};
    use chrono::Utc;
    use uuid::Uuid;

    fn report(name: &str, t: ReportType, location: &str) -> Report {
        Report::from_draft(
            Uuid::new_v4(),
            Utc::now(),
            ReportDraft {
                name: name.into(),
                report_type: t,
                category: "Misc".into(),
                description: "no distinguishing marks".into(),
                location: location.into(),
                date: Utc::now(),
                picture_url: String::new(),
                owner_details: None,
            },
        )
    }

    #[test]
    fn default_query_matches_everything() {
        let q = ReportQuery::default();
        assert!(q.matches(&report("Umbrella", ReportType::Lost, "Gate 2")));
    }

    #[test]
    fn filters_by_type_and_status() {
        let q = ReportQuery {
            report_type: Some(ReportType::Found),
            ..Default::default()
        };
        assert!(!q.matches(&report("Umbrella", ReportType::Lost, "Gate 2")));
        assert!(q.matches(&report("Umbrella", ReportType::Found, "Gate 2")));

        let q = ReportQuery {
            status: Some(ReportStatus::Matched),
            ..Default::default()
        };
        assert!(!q.matches(&report("Umbrella", ReportType::Lost, "Gate 2")));
    }

    #[test]
    fn search_is_case_insensitive_over_name_location_description() {
        let q = ReportQuery {
            search: Some("gate".into()),
            ..Default::default()
        };
        assert!(q.matches(&report("Umbrella", ReportType::Lost, "Gate 2")));

        let q = ReportQuery {
            search: Some("UMBRELLA".into()),
            ..Default::default()
        };
        assert!(q.matches(&report("Umbrella", ReportType::Lost, "Gate 2")));

        let q = ReportQuery {
            search: Some("keychain".into()),
            ..Default::default()
        };
        assert!(!q.matches(&report("Umbrella", ReportType::Lost, "Gate 2")));
    }

    #[test]
    fn handed_over_only_requires_a_named_record() {
        let q = ReportQuery {
            handed_over_only: true,
            ..Default::default()
        };
        let mut r = report("Calculator", ReportType::Found, "Lab 4");
        assert!(!q.matches(&r));

        r.handover_details = Some(HandoverDetails {
            name: String::new(),
            faculty: String::new(),
            dept: String::new(),
            cabin_no: String::new(),
        });
        assert!(!q.matches(&r));

        r.handover_details = Some(HandoverDetails {
            name: "S. Iyer".into(),
            faculty: "Prof. Nair".into(),
            dept: "ECE".into(),
            cabin_no: "C-101".into(),
        });
        assert!(q.matches(&r));
    }

    #[test]
    fn handover_search_covers_handover_fields() {
        let q = ReportQuery {
            handed_over_only: true,
            search: Some("nair".into()),
            ..Default::default()
        };
        let mut r = report("Calculator", ReportType::Found, "Lab 4");
        r.handover_details = Some(HandoverDetails {
            name: "S. Iyer".into(),
            faculty: "Prof. Nair".into(),
            dept: "ECE".into(),
            cabin_no: "C-101".into(),
        });
        assert!(q.matches(&r));
    }

    #[test]
    fn query_serde_round_trip() {
        let q = ReportQuery {
            report_type: Some(ReportType::Lost),
            status: Some(ReportStatus::Pending),
            search: Some("wallet".into()),
            handed_over_only: false,
        };
        let json = serde_json::to_string(&q).unwrap();
        let back: ReportQuery = serde_json::from_str(&json).unwrap();
        assert_eq!(q, back);
    }
}
