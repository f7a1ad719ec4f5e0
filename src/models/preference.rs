use std::{collections::BTreeSet, str::FromStr};

use anyhow::{Error, anyhow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Frequency {
    #[default]
    #[serde(rename = "live-feed", alias = "live")]
    Live,
    #[serde(rename = "daily-feed", alias = "daily")]
    Daily,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Live => "live-feed",
            Frequency::Daily => "daily-feed",
        }
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live-feed" | "live" => Ok(Frequency::Live),
            "daily-feed" | "daily" => Ok(Frequency::Daily),
            other => Err(anyhow!("Unknown frequency '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: Option<String>,
    pub address: String,
}

/// Recipients of one event split by delivery frequency. The two sets are
/// disjoint and together hold every parsed address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub live: BTreeSet<String>,
    pub daily: BTreeSet<String>,
}

impl Classification {
    pub fn insert(&mut self, address: String, frequency: Frequency) {
        match frequency {
            Frequency::Live => self.live.insert(address),
            Frequency::Daily => self.daily.insert(address),
        };
    }

    pub fn len(&self) -> usize {
        self.live.len() + self.daily.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty() && self.daily.is_empty()
    }
}
