use std::sync::Arc;

use anyhow::{Error, Result};
use chrono::{SecondsFormat, Utc};
use futures_util::StreamExt;
use lapin::message::Delivery;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    clients::{DeliveryQueue, rbmq::RabbitMqClient, slack::SlackReporter},
    models::{
        event::{DocumentEvent, Envelope},
        message::DlqMessage,
        status::DeliveryAction,
    },
    services::router::EventRouter,
    utils::{delivery_action, process_payload},
};

pub struct EventWorker {
    rabbitmq: Arc<RabbitMqClient>,
    router: Arc<EventRouter>,
    reporter: Option<SlackReporter>,
    concurrency: usize,
}

impl EventWorker {
    pub fn new(
        rabbitmq: Arc<RabbitMqClient>,
        router: Arc<EventRouter>,
        reporter: Option<SlackReporter>,
        concurrency: usize,
    ) -> Self {
        Self {
            rabbitmq,
            router,
            reporter,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<(), Error> {
        let consumer = self.rabbitmq.create_consumer().await?;

        info!(concurrency = self.concurrency, "Event worker started");

        let processing = consumer.for_each_concurrent(self.concurrency, |delivery| async move {
            match delivery {
                Ok(delivery) => self.handle(delivery).await,
                Err(e) => error!(error = %e, "Failed to receive delivery"),
            }
        });

        tokio::select! {
            _ = cancel.cancelled() => info!("Event worker cancelled"),
            _ = processing => warn!("Event consumer stream ended"),
        }

        Ok(())
    }

    async fn handle(&self, delivery: Delivery) {
        let result = process_payload(&delivery.data, &self.router).await;
        let action = delivery_action(&result, delivery.redelivered);

        if let Err(e) = settle_delivery(
            self.rabbitmq.as_ref(),
            self.reporter.as_ref(),
            delivery.delivery_tag,
            &delivery.data,
            action,
        )
        .await
        {
            error!(
                delivery_tag = delivery.delivery_tag,
                error = %e,
                "Failed to settle delivery"
            );
        }
    }
}

/// Applies `action` to one delivery. A dead-lettered delivery is rejected
/// even when the copy to the failed queue could not be published.
pub async fn settle_delivery(
    queue: &dyn DeliveryQueue,
    reporter: Option<&SlackReporter>,
    delivery_tag: u64,
    payload: &[u8],
    action: DeliveryAction,
) -> Result<(), Error> {
    match action {
        DeliveryAction::Ack => queue.acknowledge(delivery_tag).await,
        DeliveryAction::Requeue => {
            warn!(delivery_tag, "Event failed, requeueing for redelivery");
            queue.reject(delivery_tag, true).await
        }
        DeliveryAction::DeadLetter(reason) => {
            let subject = describe_payload(payload);
            error!(delivery_tag, subject = %subject, reason = %reason, "Event dead-lettered");

            let dlq_message = DlqMessage {
                original_payload: String::from_utf8_lossy(payload).into_owned(),
                failure_reason: reason.clone(),
                failed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            };

            if let Err(e) = queue.publish_to_dlq(&dlq_message).await {
                error!(
                    delivery_tag,
                    subject = %subject,
                    error = %e,
                    "Failed to publish dead-lettered event, payload is dropped"
                );
            }
            queue.reject(delivery_tag, false).await?;

            if let Some(reporter) = reporter {
                if let Err(e) = reporter.report_failure(&subject, &reason).await {
                    warn!(error = %e, "Failed to report dead-lettered event");
                }
            }

            Ok(())
        }
    }
}

pub fn describe_payload(payload: &[u8]) -> String {
    serde_json::from_slice::<Envelope<DocumentEvent>>(payload)
        .map(|e| format!("event {} ({})", e.data.event_id, e.data.doc_type))
        .unwrap_or_else(|_| "an unreadable event payload".to_string())
}
