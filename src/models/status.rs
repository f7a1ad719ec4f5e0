use std::fmt::{Display, Formatter, Result};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Armed { next_trigger: DateTime<Utc> },
    Running { date: NaiveDate },
}

impl Display for SchedulerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            SchedulerState::Idle => write!(f, "idle"),
            SchedulerState::Armed { next_trigger } => write!(f, "armed until {}", next_trigger),
            SchedulerState::Running { date } => write!(f, "running {}", date),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestReport {
    pub date: NaiveDate,
    pub dispatched: Vec<String>,
    pub failed: Vec<String>,
    pub already_processed: bool,
    pub processed: bool,
}

impl DigestReport {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            dispatched: Vec::new(),
            failed: Vec::new(),
            already_processed: false,
            processed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryAction {
    Ack,
    Requeue,
    DeadLetter(String),
}
