use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::{
    clients::{BucketStorage, PreferenceLookup, VersionedBucket, WriteOutcome},
    models::{bucket::DailyBucket, preference::Frequency},
};

/// Process-local bucket storage. Contents vanish with the process.
#[derive(Default, Clone)]
pub struct InMemoryBucketStorage {
    buckets: Arc<RwLock<HashMap<NaiveDate, VersionedBucket>>>,
}

impl InMemoryBucketStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BucketStorage for InMemoryBucketStorage {
    async fn read(&self, date: NaiveDate) -> anyhow::Result<Option<VersionedBucket>> {
        let buckets = self.buckets.read().await;
        Ok(buckets.get(&date).cloned())
    }

    async fn write_if_revision(
        &self,
        bucket: &DailyBucket,
        expected: Option<u64>,
    ) -> anyhow::Result<WriteOutcome> {
        let mut buckets = self.buckets.write().await;
        let current = buckets.get(&bucket.date).map(|v| v.revision);

        if current != expected {
            return Ok(WriteOutcome::Conflict);
        }

        let revision = expected.unwrap_or(0) + 1;
        buckets.insert(
            bucket.date,
            VersionedBucket {
                bucket: bucket.clone(),
                revision,
            },
        );

        Ok(WriteOutcome::Written { revision })
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPreferenceLookup {
    preferences: Arc<RwLock<HashMap<(String, String), Frequency>>>,
}

impl InMemoryPreferenceLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, config_ref: &str, address: &str, frequency: Frequency) {
        let mut preferences = self.preferences.write().await;
        preferences.insert(
            (config_ref.to_string(), address.to_lowercase()),
            frequency,
        );
    }
}

#[async_trait]
impl PreferenceLookup for InMemoryPreferenceLookup {
    async fn get(&self, config_ref: &str, address: &str) -> anyhow::Result<Option<Frequency>> {
        let preferences = self.preferences.read().await;
        Ok(preferences
            .get(&(config_ref.to_string(), address.to_lowercase()))
            .copied())
    }
}
