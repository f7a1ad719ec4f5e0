use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, ConfirmSelectOptions, QueueDeclareOptions,
    },
    types::FieldTable,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    clients::{DeliveryQueue, MessageSink},
    config::Config,
    models::{
        message::DlqMessage,
        outbound::{MessageId, OutboundMessage},
    },
};

pub struct RabbitMqClient {
    channel: Channel,
    event_queue_name: String,
    failed_queue_name: String,
    mail_queue_name: String,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|_| anyhow!("Failed to connect to RabbitMQ"))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|_| anyhow!("RabbitMQ channel creation failed"))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|_| anyhow!("Failed to set up QoS"))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|_| anyhow!("Failed to enable publisher confirms"))?;

        for queue in [
            &config.event_queue_name,
            &config.failed_queue_name,
            &config.mail_queue_name,
        ] {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|_| anyhow!("Failed to declare queue {}", queue))?;

            debug!(queue = %queue, "Queue declared");
        }

        info!("RabbitMQ channel ready");

        Ok(Self {
            channel,
            event_queue_name: config.event_queue_name.clone(),
            failed_queue_name: config.failed_queue_name.clone(),
            mail_queue_name: config.mail_queue_name.clone(),
        })
    }

    pub async fn create_consumer(&self) -> Result<Consumer, Error> {
        let consumer = self
            .channel
            .basic_consume(
                &self.event_queue_name,
                "feed_worker",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|_| anyhow!("Failed to create consumer"))?;

        info!(queue = %self.event_queue_name, "Consumer created for queue");

        Ok(consumer)
    }

    pub fn email_job_sink(&self) -> EmailJobSink {
        EmailJobSink {
            channel: self.channel.clone(),
            queue_name: self.mail_queue_name.clone(),
        }
    }
}

#[async_trait]
impl DeliveryQueue for RabbitMqClient {
    async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|_| anyhow!("Failed to acknowledge message"))?;

        Ok(())
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await
            .map_err(|_| anyhow!("Failed to reject message"))?;

        Ok(())
    }

    async fn publish_to_dlq(&self, message: &DlqMessage) -> Result<(), Error> {
        let payload = serde_json::to_vec(message)?;

        self.channel
            .basic_publish(
                "",
                &self.failed_queue_name,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|_| anyhow!("Failed to publish message to dlq"))?;

        Ok(())
    }
}

/// Outbound sink that hands composed messages to the mail service queue.
pub struct EmailJobSink {
    channel: Channel,
    queue_name: String,
}

#[async_trait]
impl MessageSink for EmailJobSink {
    async fn send(&self, message: &OutboundMessage) -> Result<MessageId> {
        let message_id = Uuid::new_v4().to_string();
        let payload = serde_json::to_vec(message)?;

        let confirm = self
            .channel
            .basic_publish(
                "",
                &self.queue_name,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_delivery_mode(2)
                    .with_content_type("application/json".into())
                    .with_message_id(message_id.clone().into()),
            )
            .await
            .map_err(|e| anyhow!("Failed to publish email job: {}", e))?
            .await
            .map_err(|e| anyhow!("Email job was not confirmed: {}", e))?;

        if confirm.is_nack() {
            return Err(anyhow!("Broker rejected email job {}", message_id));
        }

        debug!(
            message_id = %message_id,
            kind = ?message.kind,
            recipients = message.to.len(),
            "Email job published"
        );

        Ok(message_id)
    }
}
