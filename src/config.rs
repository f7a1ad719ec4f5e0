use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use chrono::NaiveTime;
use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::{retry::RetryConfig, schedule::DigestSchedule};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    pub event_queue_name: String,
    pub failed_queue_name: String,
    pub mail_queue_name: String,
    pub prefetch_count: u16,

    pub redis_url: String,

    pub database_url: String,

    #[serde(default = "default_event_timeout_seconds")]
    pub event_timeout_seconds: u64,
    #[serde(default = "default_dispatch_timeout_seconds")]
    pub dispatch_timeout_seconds: u64,

    #[serde(default = "default_digest_time")]
    pub digest_time: String,
    #[serde(default = "default_digest_timezone")]
    pub digest_timezone: String,
    #[serde(default = "default_aggregate_label")]
    pub aggregate_label: String,

    pub max_retry_attempts: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub retry_backoff_multiplier: u64,

    pub worker_concurrency: usize,

    pub server_port: u16,

    pub mail_from: String,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    pub portal_url: String,
    pub portal_domain: String,
    #[serde(default = "default_portal_skin")]
    pub portal_skin: String,

    pub slack_post_url: Option<String>,
}

fn default_event_timeout_seconds() -> u64 {
    300
}

fn default_dispatch_timeout_seconds() -> u64 {
    10
}

fn default_digest_time() -> String {
    "08:00".to_string()
}

fn default_digest_timezone() -> String {
    "UTC".to_string()
}

fn default_aggregate_label() -> String {
    "all".to_string()
}

fn default_subject_prefix() -> String {
    "[Document Notification]".to_string()
}

fn default_portal_skin() -> String {
    "default".to_string()
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;

        config.digest_schedule()?;

        Ok(config)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    pub fn digest_schedule(&self) -> Result<DigestSchedule, Error> {
        let time = NaiveTime::parse_from_str(self.digest_time.trim(), "%H:%M")
            .map_err(|e| anyhow!("Invalid DIGEST_TIME '{}': {}", self.digest_time, e))?;

        let timezone = self
            .digest_timezone
            .trim()
            .parse::<Tz>()
            .map_err(|e| anyhow!("Invalid DIGEST_TIMEZONE '{}': {}", self.digest_timezone, e))?;

        Ok(DigestSchedule::new(time, timezone))
    }

    pub fn event_timeout(&self) -> Duration {
        Duration::from_secs(self.event_timeout_seconds)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_seconds)
    }
}
