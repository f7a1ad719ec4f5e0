use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("No usable recipient address in '{0}'")]
    NoRecipients(String),

    #[error("Recipient preference lookup failed: {0}")]
    ConfigLookup(anyhow::Error),

    #[error("Bucket for {date} still conflicting after {attempts} write attempts")]
    BucketWriteConflict { date: NaiveDate, attempts: u32 },

    #[error("Buckets for {date} and the following day are both processed")]
    BucketClosed { date: NaiveDate },

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Event {event_id} exceeded the {timeout_secs}s processing timeout")]
    EventTimeout { event_id: String, timeout_secs: u64 },

    #[error("Invalid event payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Digest run aborted: {0}")]
    SchedulerInternal(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl RoutingError {
    /// Whether redelivering the same event may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RoutingError::ConfigLookup(_)
                | RoutingError::BucketWriteConflict { .. }
                | RoutingError::Dispatch(_)
                | RoutingError::EventTimeout { .. }
                | RoutingError::Storage(_)
        )
    }
}
