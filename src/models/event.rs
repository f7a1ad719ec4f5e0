use std::fmt::{Display, Formatter, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DocType {
    #[serde(rename = "audit")]
    Audit,
    #[serde(rename = "cert", alias = "certificate")]
    Certificate,
    #[serde(rename = "coi", alias = "insurance-certificate")]
    InsuranceCertificate,
    #[serde(rename = "log", alias = "letter-of-guarantee")]
    LetterOfGuarantee,
}

impl DocType {
    pub const ALL: [DocType; 4] = [
        DocType::Audit,
        DocType::Certificate,
        DocType::InsuranceCertificate,
        DocType::LetterOfGuarantee,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Audit => "audit",
            DocType::Certificate => "cert",
            DocType::InsuranceCertificate => "coi",
            DocType::LetterOfGuarantee => "log",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            DocType::Audit => "New FSQA audit available",
            DocType::Certificate => "New FSQA certificate available",
            DocType::InsuranceCertificate => "New certificate of insurance available",
            DocType::LetterOfGuarantee => "New letter of guarantee available",
        }
    }
}

impl Display for DocType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.as_str())
    }
}

/// One document-change trigger as delivered by the job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEvent {
    pub event_id: String,
    pub doc_type: DocType,
    pub raw_recipients: String,
    pub config_ref: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// What the router did with one event.
#[derive(Debug, Clone, Serialize)]
pub struct EventOutcome {
    pub event_id: String,
    pub correlation_token: String,
    pub live_recipients: Vec<String>,
    pub daily_recipients: Vec<String>,
    pub live_message_id: Option<String>,
}
