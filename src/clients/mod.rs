use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{
    bucket::DailyBucket,
    message::DlqMessage,
    outbound::{MessageId, OutboundMessage},
    preference::Frequency,
};

pub mod database;
pub mod health;
pub mod memory;
pub mod rbmq;
pub mod redis;
pub mod slack;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedBucket {
    pub bucket: DailyBucket,
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { revision: u64 },
    Conflict,
}

/// Durable per-date bucket records with revision-checked writes.
/// `expected = None` means "only if no record exists yet".
#[async_trait]
pub trait BucketStorage: Send + Sync {
    async fn read(&self, date: NaiveDate) -> anyhow::Result<Option<VersionedBucket>>;

    async fn write_if_revision(
        &self,
        bucket: &DailyBucket,
        expected: Option<u64>,
    ) -> anyhow::Result<WriteOutcome>;
}

#[async_trait]
pub trait PreferenceLookup: Send + Sync {
    async fn get(&self, config_ref: &str, address: &str) -> anyhow::Result<Option<Frequency>>;
}

#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<MessageId>;
}

/// Settlement side of the inbound event queue.
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn acknowledge(&self, delivery_tag: u64) -> anyhow::Result<()>;

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> anyhow::Result<()>;

    async fn publish_to_dlq(&self, message: &DlqMessage) -> anyhow::Result<()>;
}
