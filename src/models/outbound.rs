use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::event::DocType;

pub type MessageId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Live,
    Digest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestItem {
    pub event_id: String,
    pub doc_type: DocType,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateData {
    pub recipients: String,
    pub link: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notifications: Vec<DigestItem>,
}

/// A composed message handed to the sink. Rendering and transport belong to
/// the mail service on the other side of the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub kind: MessageKind,
    pub to: Vec<String>,
    pub from: String,
    pub subject: String,
    pub doc_type_label: String,
    pub template_data: TemplateData,
}
