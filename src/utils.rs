use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    errors::RoutingError,
    models::{
        event::{DocumentEvent, Envelope, EventOutcome},
        retry::RetryConfig,
        status::DeliveryAction,
    },
    services::router::EventRouter,
};

/// Opaque per-event correlation token.
pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub async fn process_payload(
    payload: &[u8],
    router: &EventRouter,
) -> Result<EventOutcome, RoutingError> {
    let enveloped = serde_json::from_slice::<Envelope<DocumentEvent>>(payload)?;
    let event = enveloped.data;

    debug!(event_id = %event.event_id, "Document event decoded");

    router.process_event(&event).await
}

/// What to do with a delivery after processing. Retryable failures get one
/// redelivery; everything else that failed is dead-lettered.
pub fn delivery_action(
    result: &Result<EventOutcome, RoutingError>,
    redelivered: bool,
) -> DeliveryAction {
    match result {
        Ok(_) => DeliveryAction::Ack,
        Err(e) if e.is_retryable() && !redelivered => DeliveryAction::Requeue,
        Err(e) => DeliveryAction::DeadLetter(e.to_string()),
    }
}

pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        attempt,
                        max_attempts = config.max_attempts,
                        "Retry succeeded"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt >= config.max_attempts {
                    warn!(
                        max_attempts = config.max_attempts,
                        error = %e,
                        "Retry failed after exhausting all attempts"
                    );
                    return Err(e);
                }

                debug!(
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms,
                    "Retry attempt failed, backing off"
                );

                let jitter = rand::random_range(-0.1..=0.1);

                let jittered_delay = (delay_ms as f64 * (1.0 + jitter)) as u64;

                sleep(Duration::from_millis(jittered_delay)).await;

                delay_ms = std::cmp::min(delay_ms * config.backoff_multiplier, config.max_delay_ms);
            }
        }
    }
}
