use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::event::DocType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNotification {
    pub event_id: String,
    pub doc_type: DocType,
    pub correlation_token: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientEntry {
    pub pending_notifications: Vec<PendingNotification>,
    pub sent: bool,

    /// Number of leading pending notifications covered by a sent digest.
    #[serde(default)]
    pub acknowledged: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl RecipientEntry {
    pub fn unacknowledged(&self) -> &[PendingNotification] {
        let start = self.acknowledged.min(self.pending_notifications.len());
        &self.pending_notifications[start..]
    }

    pub fn has_unsent(&self) -> bool {
        !self.unacknowledged().is_empty()
    }

    fn contains(&self, event_id: &str) -> bool {
        self.pending_notifications
            .iter()
            .any(|n| n.event_id == event_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocTypeLabel {
    Single(DocType),
    Aggregate,
}

/// Label for a digest covering `notifications`: the doc type itself when only
/// one distinct type is present, the aggregate label from two on.
pub fn digest_label(notifications: &[PendingNotification]) -> Option<DocTypeLabel> {
    let distinct: BTreeSet<DocType> = notifications.iter().map(|n| n.doc_type).collect();

    match distinct.len() {
        0 => None,
        1 => distinct.into_iter().next().map(DocTypeLabel::Single),
        _ => Some(DocTypeLabel::Aggregate),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    Appended,
    Duplicate,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseOutcome {
    Closed,
    AlreadyClosed,
    PendingRemain(usize),
}

/// Per-calendar-day aggregation record. Once `processed` is set the pending
/// notifications are frozen and the record is kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyBucket {
    pub date: NaiveDate,
    pub processed: bool,

    /// Set when the first digest run for this date starts. A closing bucket
    /// takes no new contributions, only acknowledgements.
    #[serde(default)]
    pub closing: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub recipients: BTreeMap<String, RecipientEntry>,
}

impl DailyBucket {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            processed: false,
            closing: false,
            processed_at: None,
            recipients: BTreeMap::new(),
        }
    }

    pub fn contains(&self, address: &str, event_id: &str) -> bool {
        self.recipients
            .get(address)
            .is_some_and(|entry| entry.contains(event_id))
    }

    pub fn merge(&mut self, address: &str, notification: PendingNotification) -> MergeOutcome {
        if self.contains(address, &notification.event_id) {
            return MergeOutcome::Duplicate;
        }

        if self.processed || self.closing {
            return MergeOutcome::Closed;
        }

        let entry = self.recipients.entry(address.to_string()).or_default();
        entry.pending_notifications.push(notification);
        entry.sent = false;

        MergeOutcome::Appended
    }

    /// Records that a digest covering the first `through` notifications of
    /// `address` went out. Returns false when nothing changed.
    pub fn acknowledge(
        &mut self,
        address: &str,
        through: usize,
        message_id: &str,
        at: DateTime<Utc>,
    ) -> bool {
        let Some(entry) = self.recipients.get_mut(address) else {
            return false;
        };

        let through = through.min(entry.pending_notifications.len());
        if through <= entry.acknowledged {
            return false;
        }

        entry.acknowledged = through;
        entry.sent = through == entry.pending_notifications.len();
        entry.message_id = Some(message_id.to_string());
        entry.sent_at = Some(at);

        true
    }

    pub fn unsent_recipients(&self) -> impl Iterator<Item = (&String, &RecipientEntry)> {
        self.recipients
            .iter()
            .filter(|(_, entry)| entry.has_unsent())
    }

    /// Stops accepting contributions. Returns false when already frozen.
    pub fn freeze(&mut self) -> bool {
        if self.processed || self.closing {
            return false;
        }

        self.closing = true;
        true
    }

    pub fn close(&mut self, at: DateTime<Utc>) -> CloseOutcome {
        if self.processed {
            return CloseOutcome::AlreadyClosed;
        }

        let remaining = self.unsent_recipients().count();
        if remaining > 0 {
            return CloseOutcome::PendingRemain(remaining);
        }

        self.processed = true;
        self.closing = true;
        self.processed_at = Some(at);

        CloseOutcome::Closed
    }
}
