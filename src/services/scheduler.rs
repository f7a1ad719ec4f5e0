//! Daily digest scheduler.
//!
//! [`DigestScheduler`] parks until the configured local trigger time, then
//! freezes that day's bucket and sends one digest per recipient with
//! unacknowledged notifications. Contributions arriving after the freeze
//! roll over to the next day. Each recipient is acknowledged right after its
//! send, so a crash or a failed send only leaves the unsent remainder, which
//! every later tick retries for up to [`LOOKBACK_DAYS`] back. The bucket is
//! marked processed once nothing is left, which also makes repeated fires for
//! the same date harmless.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Days, NaiveDate, Utc};
use tokio::{
    sync::{Mutex, watch},
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    clients::MessageSink,
    errors::RoutingError,
    models::{
        bucket::{CloseOutcome, DailyBucket},
        schedule::DigestSchedule,
        status::{DigestReport, SchedulerState},
    },
    services::{bucket_store::DailyBucketStore, composer::MessageComposer},
};

/// How far back a tick looks for buckets left open by failed sends.
pub const LOOKBACK_DAYS: u64 = 7;

pub struct DigestScheduler {
    store: Arc<DailyBucketStore>,
    sink: Arc<dyn MessageSink>,
    composer: MessageComposer,
    schedule: DigestSchedule,
    send_timeout: Duration,
    state: watch::Sender<SchedulerState>,
    run_lock: Mutex<()>,
}

impl DigestScheduler {
    pub fn new(
        store: Arc<DailyBucketStore>,
        sink: Arc<dyn MessageSink>,
        composer: MessageComposer,
        schedule: DigestSchedule,
        send_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);

        Self {
            store,
            sink,
            composer,
            schedule,
            send_timeout,
            state,
            run_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Timer loop. Exits when `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        self.catch_up(Utc::now()).await;

        loop {
            let now = Utc::now();
            let next_trigger = self.schedule.next_trigger_after(now);
            let wait = (next_trigger - now).to_std().unwrap_or_default();

            self.state.send_replace(SchedulerState::Armed { next_trigger });
            info!(%next_trigger, wait_secs = wait.as_secs(), "Digest scheduler armed");

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Digest scheduler cancelled");
                    self.state.send_replace(SchedulerState::Idle);
                    break;
                }
                _ = sleep(wait) => {}
            }

            self.run_tick(self.schedule.local_date(next_trigger)).await;
        }
    }

    pub fn schedule(&self) -> DigestSchedule {
        self.schedule
    }

    /// One timer fire for `date`: earlier days still open are retried first,
    /// then `date` itself is digested.
    pub async fn run_tick(&self, date: NaiveDate) -> Vec<DigestReport> {
        let mut reports = self.retry_open_days(date).await;

        match self.run_for_date(date).await {
            Ok(report) => reports.push(report),
            Err(e) => error!(%date, error = %e, "Digest run failed"),
        }

        reports
    }

    /// Digests buckets whose trigger passed while the process was down:
    /// earlier days still open, and today's once today's trigger time is
    /// behind `now`.
    pub async fn catch_up(&self, now: DateTime<Utc>) -> Vec<DigestReport> {
        let today = self.schedule.local_date(now);
        let mut reports = self.retry_open_days(today).await;

        if self.schedule.has_fired_today(now) {
            reports.extend(self.run_if_open(today).await);
        }

        reports
    }

    async fn retry_open_days(&self, today: NaiveDate) -> Vec<DigestReport> {
        let mut reports = Vec::new();

        for back in (1..=LOOKBACK_DAYS).rev() {
            let Some(date) = today.checked_sub_days(Days::new(back)) else {
                continue;
            };
            reports.extend(self.run_if_open(date).await);
        }

        reports
    }

    async fn run_if_open(&self, date: NaiveDate) -> Option<DigestReport> {
        match self.store.load(date).await {
            Ok(Some(bucket)) if !bucket.processed => {
                info!(%date, "Retrying open digest bucket");
                match self.run_for_date(date).await {
                    Ok(report) => Some(report),
                    Err(e) => {
                        error!(%date, error = %e, "Retry digest run failed");
                        None
                    }
                }
            }
            Ok(_) => None,
            Err(e) => {
                error!(%date, error = %e, "Failed to inspect bucket for retry");
                None
            }
        }
    }

    /// One digest run for `date`. Runs are serialized within the process.
    pub async fn run_for_date(&self, date: NaiveDate) -> Result<DigestReport, RoutingError> {
        let _guard = self.run_lock.lock().await;

        let previous = self.state.send_replace(SchedulerState::Running { date });
        let result = self.run_once(date).await;
        self.state.send_replace(match previous {
            SchedulerState::Running { .. } => SchedulerState::Idle,
            other => other,
        });

        match &result {
            Ok(report) => info!(
                %date,
                dispatched = report.dispatched.len(),
                failed = report.failed.len(),
                processed = report.processed,
                already_processed = report.already_processed,
                "Digest run finished"
            ),
            Err(e) => error!(%date, error = %e, "Digest run aborted"),
        }

        result
    }

    async fn run_once(&self, date: NaiveDate) -> Result<DigestReport, RoutingError> {
        let mut report = DigestReport::new(date);

        let bucket = self.store.begin_run(date).await.map_err(internal)?;
        if bucket.processed {
            info!(%date, "Bucket already processed, nothing to send");
            report.already_processed = true;
            return Ok(report);
        }

        let failures = self.dispatch_pass(&bucket, &mut report).await?;
        if failures > 0 {
            warn!(%date, failures, "Digest run left recipients unsent, bucket stays open");
            return Ok(report);
        }

        match self.store.mark_processed(date).await.map_err(internal)? {
            CloseOutcome::Closed | CloseOutcome::AlreadyClosed => report.processed = true,
            CloseOutcome::PendingRemain(remaining) => {
                warn!(%date, remaining, "Unacknowledged notifications remain, bucket stays open");
            }
        }

        Ok(report)
    }

    /// Sends to every recipient with unacknowledged notifications in
    /// `bucket`. Returns how many sends failed.
    async fn dispatch_pass(
        &self,
        bucket: &DailyBucket,
        report: &mut DigestReport,
    ) -> Result<usize, RoutingError> {
        let date = bucket.date;
        let mut failures = 0;

        for (address, entry) in bucket.unsent_recipients() {
            let Some(message) = self.composer.digest(address, entry.unacknowledged()) else {
                continue;
            };
            let through = entry.pending_notifications.len();

            match timeout(self.send_timeout, self.sink.send(&message)).await {
                Ok(Ok(message_id)) => {
                    self.store
                        .mark_sent(date, address, through, &message_id)
                        .await
                        .map_err(|e| {
                            RoutingError::SchedulerInternal(format!(
                                "digest {} to {} sent but not acknowledged: {}",
                                message_id, address, e
                            ))
                        })?;

                    info!(
                        %date,
                        address = %address,
                        message_id = %message_id,
                        label = %message.doc_type_label,
                        notifications = entry.unacknowledged().len(),
                        "Digest dispatched"
                    );
                    report.dispatched.push(address.clone());
                }
                Ok(Err(e)) => {
                    warn!(%date, address = %address, error = %e, "Digest dispatch failed");
                    report.failed.push(address.clone());
                    failures += 1;
                }
                Err(_) => {
                    warn!(
                        %date,
                        address = %address,
                        timeout_ms = self.send_timeout.as_millis() as u64,
                        "Digest dispatch timed out"
                    );
                    report.failed.push(address.clone());
                    failures += 1;
                }
            }
        }

        Ok(failures)
    }
}

fn internal(e: RoutingError) -> RoutingError {
    match e {
        RoutingError::SchedulerInternal(_) => e,
        other => RoutingError::SchedulerInternal(other.to_string()),
    }
}
