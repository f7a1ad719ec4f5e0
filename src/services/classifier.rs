use std::{collections::BTreeMap, str::FromStr, sync::Arc};

use futures_util::future::try_join_all;
use lettre::message::Mailbox;
use tracing::{debug, warn};

use crate::{
    clients::PreferenceLookup,
    errors::RoutingError,
    models::preference::{Classification, Recipient},
};

/// Splits a free-text address list on commas that sit outside quoted display
/// names and angle brackets.
pub fn split_address_list(raw: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut escaped = false;

    for c in raw.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }

        match c {
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '<' if !in_quotes => {
                in_angle = true;
                current.push(c);
            }
            '>' if !in_quotes => {
                in_angle = false;
                current.push(c);
            }
            ',' if !in_quotes && !in_angle => {
                entries.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    entries.push(current);

    entries
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Parses and normalizes an address list. Malformed entries are dropped with
/// a warning; addresses are lowercased and deduplicated, keeping the first
/// display name seen.
pub fn parse_recipients(raw: &str) -> Vec<Recipient> {
    let mut recipients: BTreeMap<String, Recipient> = BTreeMap::new();

    for entry in split_address_list(raw) {
        match Mailbox::from_str(&entry) {
            Ok(mailbox) => {
                let address = mailbox.email.to_string().to_lowercase();
                recipients.entry(address.clone()).or_insert(Recipient {
                    name: mailbox.name.filter(|n| !n.trim().is_empty()),
                    address,
                });
            }
            Err(e) => {
                warn!(entry = %entry, error = %e, "Dropping malformed recipient");
            }
        }
    }

    recipients.into_values().collect()
}

pub struct RecipientClassifier {
    lookup: Arc<dyn PreferenceLookup>,
}

impl RecipientClassifier {
    pub fn new(lookup: Arc<dyn PreferenceLookup>) -> Self {
        Self { lookup }
    }

    /// Resolves every parsed recipient to exactly one frequency. Recipients
    /// without a configured preference are delivered live.
    pub async fn classify(
        &self,
        raw_recipients: &str,
        config_ref: &str,
    ) -> Result<Classification, RoutingError> {
        let recipients = parse_recipients(raw_recipients);

        if recipients.is_empty() {
            return Err(RoutingError::NoRecipients(raw_recipients.to_string()));
        }

        let lookups = recipients.iter().map(|recipient| async move {
            let frequency = self.lookup.get(config_ref, &recipient.address).await?;
            Ok::<_, anyhow::Error>((recipient.address.clone(), frequency.unwrap_or_default()))
        });

        let resolved = try_join_all(lookups)
            .await
            .map_err(RoutingError::ConfigLookup)?;

        let mut classification = Classification::default();
        for (address, frequency) in resolved {
            classification.insert(address, frequency);
        }

        debug!(
            config_ref,
            live = classification.live.len(),
            daily = classification.daily.len(),
            "Recipients classified"
        );

        Ok(classification)
    }
}
