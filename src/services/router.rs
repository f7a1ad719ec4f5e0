use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    errors::RoutingError,
    models::event::{DocumentEvent, EventOutcome},
    services::{
        aggregator::DailyAggregator, classifier::RecipientClassifier, live::LiveDispatcher,
    },
    utils::generate_token,
};

/// Entry point for one document-change event: classify, then send live and
/// aggregate daily concurrently.
pub struct EventRouter {
    classifier: RecipientClassifier,
    live: LiveDispatcher,
    aggregator: DailyAggregator,
    event_timeout: Duration,
}

impl EventRouter {
    pub fn new(
        classifier: RecipientClassifier,
        live: LiveDispatcher,
        aggregator: DailyAggregator,
        event_timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            live,
            aggregator,
            event_timeout,
        }
    }

    pub async fn process_event(&self, event: &DocumentEvent) -> Result<EventOutcome, RoutingError> {
        timeout(self.event_timeout, self.route(event))
            .await
            .map_err(|_| {
                warn!(event_id = %event.event_id, "Event processing timed out");
                RoutingError::EventTimeout {
                    event_id: event.event_id.clone(),
                    timeout_secs: self.event_timeout.as_secs(),
                }
            })?
    }

    async fn route(&self, event: &DocumentEvent) -> Result<EventOutcome, RoutingError> {
        info!(
            event_id = %event.event_id,
            doc_type = %event.doc_type,
            config_ref = %event.config_ref,
            occurred_at = %event.occurred_at,
            "Routing document event"
        );

        let classification = self
            .classifier
            .classify(&event.raw_recipients, &event.config_ref)
            .await?;

        let correlation_token = generate_token();

        let (live_result, daily_result) = tokio::join!(
            self.live.dispatch_live(
                event.doc_type,
                &classification.live,
                &event.raw_recipients,
                &correlation_token,
            ),
            self.aggregator
                .aggregate(event, &classification.daily, &correlation_token),
        );

        daily_result?;
        let live_message_id = live_result?;

        info!(
            event_id = %event.event_id,
            live = classification.live.len(),
            daily = classification.daily.len(),
            "Document event routed"
        );

        Ok(EventOutcome {
            event_id: event.event_id.clone(),
            correlation_token,
            live_recipients: classification.live.into_iter().collect(),
            daily_recipients: classification.daily.into_iter().collect(),
            live_message_id,
        })
    }
}
