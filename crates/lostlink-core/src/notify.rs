use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::report::ReportId;

/// User-facing alert raised by the matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchNotification {
    MatchFound {
        report_name: String,
        candidate_id: ReportId,
    },
    /// The coordinated write failed in the storage backend; the new
    /// report stays in its last committed state.
    MatchFailed {
        report_name: String,
    },
}

impl fmt::Display for MatchNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchNotification::MatchFound {
                report_name,
                candidate_id,
            } => write!(
                f,
                "Potential match found for {}! Item ID: {}",
                report_name, candidate_id
            ),
            MatchNotification::MatchFailed { report_name } => {
                write!(f, "Could not complete match for {}", report_name)
            }
        }
    }
}

/// Fire-and-forget alert sink; no return value is consumed.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: MatchNotification);
}

/// Routes notifications into the tracing stream.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: MatchNotification) {
        match &notification {
            MatchNotification::MatchFound { .. } => tracing::info!("{}", notification),
            MatchNotification::MatchFailed { .. } => tracing::warn!("{}", notification),
        }
    }
}

/// Forwards notifications over a channel. Used by tests and by callers
/// that surface alerts elsewhere.
pub struct ChannelNotifier {
    tx: Mutex<Sender<MatchNotification>>,
}

impl ChannelNotifier {
    pub fn new(tx: Sender<MatchNotification>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: MatchNotification) {
        // Fire and forget: a dropped receiver is not an error
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(notification);
        }
    }
}
