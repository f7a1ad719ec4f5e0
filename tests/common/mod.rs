#![allow(dead_code)]

use std::{
    collections::{BTreeSet, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use feed_service::{
    clients::{
        BucketStorage, DeliveryQueue, MessageSink, PreferenceLookup, VersionedBucket, WriteOutcome,
        memory::{InMemoryBucketStorage, InMemoryPreferenceLookup},
    },
    models::{
        bucket::{DailyBucket, PendingNotification},
        event::{DocType, DocumentEvent},
        message::DlqMessage,
        outbound::{MessageId, OutboundMessage},
        preference::Frequency,
        retry::RetryConfig,
        schedule::DigestSchedule,
    },
    services::{
        aggregator::DailyAggregator, bucket_store::DailyBucketStore,
        classifier::RecipientClassifier, composer::MessageComposer, live::LiveDispatcher,
        router::EventRouter, scheduler::DigestScheduler,
    },
};

pub const CONFIG_REF: &str = "trading-partners/tp-1";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        backoff_multiplier: 2,
    }
}

pub fn utc_schedule() -> DigestSchedule {
    DigestSchedule::new(
        NaiveTime::from_hms_opt(8, 0, 0).expect("valid time"),
        chrono_tz::UTC,
    )
}

pub fn composer() -> MessageComposer {
    MessageComposer::new(
        "notifications@example.com",
        "[Document Notification]",
        "all",
        "https://portal.example.com/conductor",
        "portal.example.com",
        "default",
    )
    .expect("valid composer")
}

pub fn store_over(storage: Arc<dyn BucketStorage>) -> Arc<DailyBucketStore> {
    Arc::new(DailyBucketStore::new(storage, fast_retry(20)))
}

pub fn memory_store() -> Arc<DailyBucketStore> {
    store_over(Arc::new(InMemoryBucketStorage::new()))
}

pub fn notification(event_id: &str, doc_type: DocType) -> PendingNotification {
    PendingNotification {
        event_id: event_id.to_string(),
        doc_type,
        correlation_token: format!("token-{}", event_id),
        occurred_at: Utc::now(),
    }
}

pub fn event(event_id: &str, doc_type: DocType, raw_recipients: &str) -> DocumentEvent {
    DocumentEvent {
        event_id: event_id.to_string(),
        doc_type,
        raw_recipients: raw_recipients.to_string(),
        config_ref: CONFIG_REF.to_string(),
        occurred_at: Utc::now(),
    }
}

pub fn scheduler(store: Arc<DailyBucketStore>, sink: Arc<dyn MessageSink>) -> DigestScheduler {
    DigestScheduler::new(
        store,
        sink,
        composer(),
        utc_schedule(),
        Duration::from_millis(200),
    )
}

pub async fn preferences(entries: &[(&str, Frequency)]) -> Arc<InMemoryPreferenceLookup> {
    let lookup = Arc::new(InMemoryPreferenceLookup::new());
    for (address, frequency) in entries {
        lookup.set(CONFIG_REF, address, *frequency).await;
    }
    lookup
}

pub fn event_router(
    lookup: Arc<dyn PreferenceLookup>,
    sink: Arc<dyn MessageSink>,
    store: Arc<DailyBucketStore>,
) -> EventRouter {
    EventRouter::new(
        RecipientClassifier::new(lookup),
        LiveDispatcher::new(sink, composer(), Duration::from_millis(200)),
        DailyAggregator::new(store, utc_schedule()),
        Duration::from_secs(5),
    )
}

/// Sink that records every message and can be told to reject addresses.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<OutboundMessage>>,
    failing: Mutex<HashSet<String>>,
    attempts: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_for(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    pub fn heal(&self, address: &str) {
        self.failing.lock().unwrap().remove(address);
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn messages_to(&self, address: &str) -> Vec<OutboundMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.to.iter().any(|a| a == address))
            .collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, message: &OutboundMessage) -> Result<MessageId> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let rejected = {
            let failing = self.failing.lock().unwrap();
            message.to.iter().find(|a| failing.contains(*a)).cloned()
        };
        if let Some(address) = rejected {
            return Err(anyhow!("mailbox {} unavailable", address));
        }

        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        Ok(format!("msg-{}", sent.len()))
    }
}

/// Sink that never answers.
pub struct HangingSink;

#[async_trait]
impl MessageSink for HangingSink {
    async fn send(&self, _message: &OutboundMessage) -> Result<MessageId> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("never".to_string())
    }
}

pub struct FailingLookup;

#[async_trait]
impl PreferenceLookup for FailingLookup {
    async fn get(&self, _config_ref: &str, _address: &str) -> Result<Option<Frequency>> {
        Err(anyhow!("preference store unreachable"))
    }
}

/// Storage that rejects the next `conflicts` writes as if another writer got
/// there first.
pub struct ConflictingStorage {
    inner: InMemoryBucketStorage,
    conflicts: AtomicU32,
    writes: AtomicU32,
}

impl ConflictingStorage {
    pub fn new(conflicts: u32) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryBucketStorage::new(),
            conflicts: AtomicU32::new(conflicts),
            writes: AtomicU32::new(0),
        })
    }

    pub fn write_attempts(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BucketStorage for ConflictingStorage {
    async fn read(&self, date: NaiveDate) -> Result<Option<VersionedBucket>> {
        self.inner.read(date).await
    }

    async fn write_if_revision(
        &self,
        bucket: &DailyBucket,
        expected: Option<u64>,
    ) -> Result<WriteOutcome> {
        self.writes.fetch_add(1, Ordering::SeqCst);

        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining - 1, Ordering::SeqCst);
            return Ok(WriteOutcome::Conflict);
        }

        self.inner.write_if_revision(bucket, expected).await
    }
}

/// Storage that lets a competing writer commit a contribution between the
/// store's read and its first write.
pub struct InterferingStorage {
    inner: InMemoryBucketStorage,
    competing: Mutex<Option<(String, PendingNotification)>>,
}

impl InterferingStorage {
    pub fn new(address: &str, competing: PendingNotification) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryBucketStorage::new(),
            competing: Mutex::new(Some((address.to_string(), competing))),
        })
    }
}

#[async_trait]
impl BucketStorage for InterferingStorage {
    async fn read(&self, date: NaiveDate) -> Result<Option<VersionedBucket>> {
        self.inner.read(date).await
    }

    async fn write_if_revision(
        &self,
        bucket: &DailyBucket,
        expected: Option<u64>,
    ) -> Result<WriteOutcome> {
        let competing = self.competing.lock().unwrap().take();

        if let Some((address, notification)) = competing {
            let current = self.inner.read(bucket.date).await?;
            let (mut theirs, revision) = match current {
                Some(v) => (v.bucket, Some(v.revision)),
                None => (DailyBucket::new(bucket.date), None),
            };
            theirs.merge(&address, notification);
            self.inner.write_if_revision(&theirs, revision).await?;
        }

        self.inner.write_if_revision(bucket, expected).await
    }
}

/// Sink that lets an event be aggregated into `date` while the first
/// message is in flight, then records like [`RecordingSink`].
pub struct InterleavingSink {
    pub inner: Arc<RecordingSink>,
    aggregator: DailyAggregator,
    date: NaiveDate,
    pending: Mutex<Option<(DocumentEvent, BTreeSet<String>)>>,
}

impl InterleavingSink {
    pub fn new(
        store: Arc<DailyBucketStore>,
        date: NaiveDate,
        event: DocumentEvent,
        addresses: &[&str],
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: RecordingSink::new(),
            aggregator: DailyAggregator::new(store, utc_schedule()),
            date,
            pending: Mutex::new(Some((
                event,
                addresses.iter().map(|a| a.to_string()).collect(),
            ))),
        })
    }
}

#[async_trait]
impl MessageSink for InterleavingSink {
    async fn send(&self, message: &OutboundMessage) -> Result<MessageId> {
        let pending = self.pending.lock().unwrap().take();
        if let Some((event, addresses)) = pending {
            self.aggregator
                .aggregate_on(self.date, &event, &addresses, "token-interleaved")
                .await?;
        }

        self.inner.send(message).await
    }
}

/// Event queue double that records settlements.
#[derive(Default)]
pub struct RecordingQueue {
    pub acked: Mutex<Vec<u64>>,
    pub rejected: Mutex<Vec<(u64, bool)>>,
    pub dead_lettered: Mutex<Vec<DlqMessage>>,
    fail_dlq: bool,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_dlq() -> Self {
        Self {
            fail_dlq: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl DeliveryQueue for RecordingQueue {
    async fn acknowledge(&self, delivery_tag: u64) -> Result<()> {
        self.acked.lock().unwrap().push(delivery_tag);
        Ok(())
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        self.rejected.lock().unwrap().push((delivery_tag, requeue));
        Ok(())
    }

    async fn publish_to_dlq(&self, message: &DlqMessage) -> Result<()> {
        if self.fail_dlq {
            return Err(anyhow!("failed queue unavailable"));
        }
        self.dead_lettered.lock().unwrap().push(message.clone());
        Ok(())
    }
}
