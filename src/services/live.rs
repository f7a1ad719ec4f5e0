use std::{collections::BTreeSet, sync::Arc, time::Duration};

use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    clients::MessageSink,
    errors::RoutingError,
    models::{event::DocType, outbound::MessageId},
    services::composer::MessageComposer,
};

pub struct LiveDispatcher {
    sink: Arc<dyn MessageSink>,
    composer: MessageComposer,
    send_timeout: Duration,
}

impl LiveDispatcher {
    pub fn new(
        sink: Arc<dyn MessageSink>,
        composer: MessageComposer,
        send_timeout: Duration,
    ) -> Self {
        Self {
            sink,
            composer,
            send_timeout,
        }
    }

    /// Sends one message to the whole live set, or nothing when it is empty.
    /// Sink failures are surfaced, never retried here.
    pub async fn dispatch_live(
        &self,
        doc_type: DocType,
        live_addresses: &BTreeSet<String>,
        raw_recipients: &str,
        correlation_token: &str,
    ) -> Result<Option<MessageId>, RoutingError> {
        if live_addresses.is_empty() {
            return Ok(None);
        }

        let message = self
            .composer
            .live(doc_type, live_addresses, raw_recipients, correlation_token);

        let message_id = match timeout(self.send_timeout, self.sink.send(&message)).await {
            Ok(Ok(message_id)) => message_id,
            Ok(Err(e)) => {
                warn!(%doc_type, error = %e, "Live message rejected by sink");
                return Err(RoutingError::Dispatch(e.to_string()));
            }
            Err(_) => {
                warn!(
                    %doc_type,
                    timeout_ms = self.send_timeout.as_millis() as u64,
                    "Live message timed out"
                );
                return Err(RoutingError::Dispatch(format!(
                    "sink did not answer within {:?}",
                    self.send_timeout
                )));
            }
        };

        info!(
            %doc_type,
            message_id = %message_id,
            recipients = live_addresses.len(),
            "Live notification dispatched"
        );

        Ok(Some(message_id))
    }
}
