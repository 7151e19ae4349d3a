use serde::{Deserialize, Serialize};

use crate::report::{Report, ReportId};
use crate::store::ReportMutation;

/// Events emitted by the report store when records change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReportEvent {
    Created(Box<Report>),
    Updated {
        id: ReportId,
        mutations: Vec<ReportMutation>,
    },
    Deleted(ReportId),
    /// Both sides of a pair update were applied in one transition.
    MatchLinked {
        report_id: ReportId,
        candidate_id: ReportId,
    },
}
