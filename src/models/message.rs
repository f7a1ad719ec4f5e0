use serde::{Deserialize, Serialize};

/// Body published to the failed-events queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqMessage {
    pub original_payload: String,
    pub failure_reason: String,
    pub failed_at: String,
}
