//! Conflict-safe access to the per-day digest buckets.
//!
//! Every mutation is a read-modify-write against [`BucketStorage`]: read the
//! record and its revision, apply the change in memory, then write only if
//! the revision is unchanged. A conflicting write re-reads and re-applies,
//! so concurrent merges from event tasks and acknowledgements from the
//! scheduler never overwrite each other.

use std::{fmt::Display, sync::Arc};

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};

use crate::{
    clients::{BucketStorage, WriteOutcome},
    errors::RoutingError,
    models::{
        bucket::{CloseOutcome, DailyBucket, MergeOutcome, PendingNotification},
        retry::RetryConfig,
    },
    utils::retry_with_backoff,
};

enum Change<T> {
    Write(T),
    Keep(T),
}

#[derive(Debug)]
enum AttemptError {
    Conflict,
    Storage(anyhow::Error),
}

impl Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Conflict => write!(f, "revision conflict"),
            AttemptError::Storage(e) => write!(f, "{}", e),
        }
    }
}

pub struct DailyBucketStore {
    storage: Arc<dyn BucketStorage>,
    retry_config: RetryConfig,
}

impl DailyBucketStore {
    pub fn new(storage: Arc<dyn BucketStorage>, retry_config: RetryConfig) -> Self {
        Self {
            storage,
            retry_config,
        }
    }

    /// Idempotent upsert of one contribution. A repeated `(address, event_id)`
    /// is a no-op; a processed bucket is never modified.
    pub async fn merge_contribution(
        &self,
        date: NaiveDate,
        address: &str,
        notification: PendingNotification,
    ) -> Result<MergeOutcome, RoutingError> {
        let outcome = self
            .update(date, |bucket, _| match bucket.merge(address, notification.clone()) {
                MergeOutcome::Appended => Change::Write(MergeOutcome::Appended),
                other => Change::Keep(other),
            })
            .await?;

        debug!(
            %date,
            address,
            event_id = %notification.event_id,
            ?outcome,
            "Contribution merged"
        );

        Ok(outcome)
    }

    pub async fn load(&self, date: NaiveDate) -> Result<Option<DailyBucket>, RoutingError> {
        Ok(self.storage.read(date).await?.map(|v| v.bucket))
    }

    pub async fn load_or_create(&self, date: NaiveDate) -> Result<DailyBucket, RoutingError> {
        self.update(date, |bucket, is_new| {
            if is_new {
                Change::Write(bucket.clone())
            } else {
                Change::Keep(bucket.clone())
            }
        })
        .await
    }

    /// Freezes the bucket for a digest run and returns the frozen contents.
    /// Contributions arriving afterwards are refused with
    /// [`MergeOutcome::Closed`] and roll over to the next day.
    pub async fn begin_run(&self, date: NaiveDate) -> Result<DailyBucket, RoutingError> {
        let bucket = self
            .update(date, |bucket, _| {
                if bucket.freeze() {
                    Change::Write(bucket.clone())
                } else {
                    Change::Keep(bucket.clone())
                }
            })
            .await?;

        debug!(%date, processed = bucket.processed, "Bucket frozen for digest run");

        Ok(bucket)
    }

    /// Acknowledges the first `through` pending notifications of `address`.
    /// Returns false when the recipient is unknown or already acknowledged.
    pub async fn mark_sent(
        &self,
        date: NaiveDate,
        address: &str,
        through: usize,
        message_id: &str,
    ) -> Result<bool, RoutingError> {
        let now = Utc::now();

        self.update(date, |bucket, is_new| {
            if is_new {
                return Change::Keep(false);
            }

            if bucket.acknowledge(address, through, message_id, now) {
                Change::Write(true)
            } else {
                Change::Keep(false)
            }
        })
        .await
    }

    /// One-shot transition to processed. Repeating it is a no-op; it refuses
    /// while any recipient still has unacknowledged notifications.
    pub async fn mark_processed(&self, date: NaiveDate) -> Result<CloseOutcome, RoutingError> {
        let now = Utc::now();

        let outcome = self
            .update(date, |bucket, _| match bucket.close(now) {
                CloseOutcome::Closed => Change::Write(CloseOutcome::Closed),
                other => Change::Keep(other),
            })
            .await?;

        if outcome == CloseOutcome::Closed {
            info!(%date, "Daily bucket marked processed");
        }

        Ok(outcome)
    }

    async fn update<T, F>(&self, date: NaiveDate, mutate: F) -> Result<T, RoutingError>
    where
        F: Fn(&mut DailyBucket, bool) -> Change<T>,
    {
        retry_with_backoff(&self.retry_config, || self.try_update(date, &mutate))
            .await
            .map_err(|e| match e {
                AttemptError::Conflict => RoutingError::BucketWriteConflict {
                    date,
                    attempts: self.retry_config.max_attempts,
                },
                AttemptError::Storage(e) => RoutingError::Storage(e),
            })
    }

    async fn try_update<T, F>(&self, date: NaiveDate, mutate: &F) -> Result<T, AttemptError>
    where
        F: Fn(&mut DailyBucket, bool) -> Change<T>,
    {
        let current = self
            .storage
            .read(date)
            .await
            .map_err(AttemptError::Storage)?;

        let (mut bucket, expected) = match current {
            Some(versioned) => (versioned.bucket, Some(versioned.revision)),
            None => (DailyBucket::new(date), None),
        };

        let value = match mutate(&mut bucket, expected.is_none()) {
            Change::Keep(value) => return Ok(value),
            Change::Write(value) => value,
        };

        match self
            .storage
            .write_if_revision(&bucket, expected)
            .await
            .map_err(AttemptError::Storage)?
        {
            WriteOutcome::Written { revision } => {
                debug!(%date, revision, "Bucket revision committed");
                Ok(value)
            }
            WriteOutcome::Conflict => {
                debug!(%date, ?expected, "Bucket changed underneath, retrying");
                Err(AttemptError::Conflict)
            }
        }
    }
}
