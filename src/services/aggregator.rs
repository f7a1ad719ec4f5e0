use std::{collections::BTreeSet, sync::Arc};

use chrono::{Days, NaiveDate, Utc};
use tracing::{debug, info};

use crate::{
    errors::RoutingError,
    models::{
        bucket::{MergeOutcome, PendingNotification},
        event::DocumentEvent,
        schedule::DigestSchedule,
    },
    services::bucket_store::DailyBucketStore,
};

/// Folds the daily-frequency recipients of an event into today's bucket.
/// Holds no state of its own.
pub struct DailyAggregator {
    store: Arc<DailyBucketStore>,
    schedule: DigestSchedule,
}

impl DailyAggregator {
    pub fn new(store: Arc<DailyBucketStore>, schedule: DigestSchedule) -> Self {
        Self { store, schedule }
    }

    pub async fn aggregate(
        &self,
        event: &DocumentEvent,
        daily_addresses: &BTreeSet<String>,
        correlation_token: &str,
    ) -> Result<(), RoutingError> {
        let today = self.schedule.local_date(Utc::now());
        self.aggregate_on(today, event, daily_addresses, correlation_token)
            .await
    }

    pub async fn aggregate_on(
        &self,
        date: NaiveDate,
        event: &DocumentEvent,
        daily_addresses: &BTreeSet<String>,
        correlation_token: &str,
    ) -> Result<(), RoutingError> {
        let notification = PendingNotification {
            event_id: event.event_id.clone(),
            doc_type: event.doc_type,
            correlation_token: correlation_token.to_string(),
            occurred_at: event.occurred_at,
        };

        // A redelivery after midnight may find the event in the previous day.
        let previous = match date.checked_sub_days(Days::new(1)) {
            Some(previous) => self.store.load(previous).await?,
            None => None,
        };

        for address in daily_addresses {
            if previous
                .as_ref()
                .is_some_and(|bucket| bucket.contains(address, &event.event_id))
            {
                debug!(
                    event_id = %event.event_id,
                    address = %address,
                    "Contribution already recorded the day before"
                );
                continue;
            }

            let outcome = self
                .store
                .merge_contribution(date, address, notification.clone())
                .await?;

            if outcome != MergeOutcome::Closed {
                continue;
            }

            // Today's digest already went out; carry the contribution over.
            let next = date
                .checked_add_days(Days::new(1))
                .ok_or(RoutingError::BucketClosed { date })?;

            info!(
                event_id = %event.event_id,
                address = %address,
                from = %date,
                to = %next,
                "Bucket already processed, contribution moved to next day"
            );

            let outcome = self
                .store
                .merge_contribution(next, address, notification.clone())
                .await?;

            if outcome == MergeOutcome::Closed {
                return Err(RoutingError::BucketClosed { date });
            }
        }

        debug!(
            event_id = %event.event_id,
            %date,
            recipients = daily_addresses.len(),
            "Daily contributions merged"
        );

        Ok(())
    }
}
