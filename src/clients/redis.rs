use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use redis::{Client, Script, aio::MultiplexedConnection};
use tracing::{debug, info};

use crate::{
    clients::{BucketStorage, VersionedBucket, WriteOutcome},
    config::Config,
    models::bucket::DailyBucket,
};

const BUCKET_KEY_PREFIX: &str = "digest:bucket";

// KEYS[1] bucket hash; ARGV[1] expected revision ("" = absent), ARGV[2] new
// revision, ARGV[3] serialized bucket.
const COMPARE_AND_SET: &str = r#"
local current = redis.call('HGET', KEYS[1], 'rev')
if (current == false and ARGV[1] == '') or current == ARGV[1] then
    redis.call('HSET', KEYS[1], 'rev', ARGV[2], 'data', ARGV[3])
    return 1
end
return 0
"#;

pub struct RedisBucketStorage {
    connection: MultiplexedConnection,
    compare_and_set: Script,
}

impl RedisBucketStorage {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to Redis bucket storage");

        let client = Client::open(config.redis_url.as_str())
            .map_err(|_| anyhow!("Failed to create redis client"))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|_| anyhow!("Failed to connect to redis client"))?;

        info!("Redis connection established");

        Ok(Self::from_connection(connection))
    }

    pub fn from_connection(connection: MultiplexedConnection) -> Self {
        Self {
            connection,
            compare_and_set: Script::new(COMPARE_AND_SET),
        }
    }

    pub fn bucket_key(date: NaiveDate) -> String {
        format!("{}:{}", BUCKET_KEY_PREFIX, date.format("%Y-%m-%d"))
    }
}

#[async_trait]
impl BucketStorage for RedisBucketStorage {
    async fn read(&self, date: NaiveDate) -> Result<Option<VersionedBucket>> {
        let key = Self::bucket_key(date);
        let mut conn = self.connection.clone();

        let (data, revision): (Option<String>, Option<u64>) = redis::cmd("HMGET")
            .arg(&key)
            .arg("data")
            .arg("rev")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow!("Failed to read bucket {}: {}", key, e))?;

        match (data, revision) {
            (Some(data), Some(revision)) => {
                let bucket = serde_json::from_str::<DailyBucket>(&data)
                    .map_err(|e| anyhow!("Corrupt bucket record {}: {}", key, e))?;
                Ok(Some(VersionedBucket { bucket, revision }))
            }
            _ => Ok(None),
        }
    }

    async fn write_if_revision(
        &self,
        bucket: &DailyBucket,
        expected: Option<u64>,
    ) -> Result<WriteOutcome> {
        let key = Self::bucket_key(bucket.date);
        let payload = serde_json::to_string(bucket)?;
        let expected_arg = expected.map(|r| r.to_string()).unwrap_or_default();
        let revision = expected.unwrap_or(0) + 1;
        let mut conn = self.connection.clone();

        let written: i64 = self
            .compare_and_set
            .key(&key)
            .arg(expected_arg)
            .arg(revision)
            .arg(payload)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| anyhow!("Failed to write bucket {}: {}", key, e))?;

        if written == 1 {
            debug!(key = %key, revision, "Bucket written");
            Ok(WriteOutcome::Written { revision })
        } else {
            debug!(key = %key, ?expected, "Bucket revision moved, write rejected");
            Ok(WriteOutcome::Conflict)
        }
    }
}
