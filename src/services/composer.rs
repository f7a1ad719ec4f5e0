use std::collections::BTreeSet;

use anyhow::{Error, Result, anyhow};
use reqwest::Url;

use crate::{
    config::Config,
    models::{
        bucket::{DocTypeLabel, PendingNotification, digest_label},
        event::DocType,
        outbound::{DigestItem, MessageKind, OutboundMessage, TemplateData},
    },
};

const AGGREGATE_SUBJECT: &str = "Daily digest - new documents available";

/// Builds outbound messages. Rendering the body is left to the mail service.
#[derive(Debug, Clone)]
pub struct MessageComposer {
    from: String,
    subject_prefix: String,
    aggregate_label: String,
    portal_url: Url,
    portal_domain: String,
    portal_skin: String,
}

impl MessageComposer {
    pub fn new(
        from: &str,
        subject_prefix: &str,
        aggregate_label: &str,
        portal_url: &str,
        portal_domain: &str,
        portal_skin: &str,
    ) -> Result<Self, Error> {
        let portal_url = Url::parse(portal_url)
            .map_err(|e| anyhow!("Invalid portal url '{}': {}", portal_url, e))?;

        Ok(Self {
            from: from.to_string(),
            subject_prefix: subject_prefix.to_string(),
            aggregate_label: aggregate_label.to_string(),
            portal_url,
            portal_domain: portal_domain.to_string(),
            portal_skin: portal_skin.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::new(
            &config.mail_from,
            &config.subject_prefix,
            &config.aggregate_label,
            &config.portal_url,
            &config.portal_domain,
            &config.portal_skin,
        )
    }

    pub fn label_text(&self, label: DocTypeLabel) -> String {
        match label {
            DocTypeLabel::Single(doc_type) => doc_type.as_str().to_string(),
            DocTypeLabel::Aggregate => self.aggregate_label.clone(),
        }
    }

    pub fn subject(&self, label: DocTypeLabel) -> String {
        let subject = match label {
            DocTypeLabel::Single(doc_type) => doc_type.subject(),
            DocTypeLabel::Aggregate => AGGREGATE_SUBJECT,
        };

        format!("{} - [{}]", self.subject_prefix, subject)
    }

    pub fn link(&self, correlation_token: &str) -> String {
        let mut url = self.portal_url.clone();
        url.query_pairs_mut()
            .append_pair("d", &self.portal_domain)
            .append_pair("t", correlation_token)
            .append_pair("s", &self.portal_skin);
        url.to_string()
    }

    pub fn live(
        &self,
        doc_type: DocType,
        to: &BTreeSet<String>,
        raw_recipients: &str,
        correlation_token: &str,
    ) -> OutboundMessage {
        let label = DocTypeLabel::Single(doc_type);

        OutboundMessage {
            kind: MessageKind::Live,
            to: to.iter().cloned().collect(),
            from: self.from.clone(),
            subject: self.subject(label),
            doc_type_label: self.label_text(label),
            template_data: TemplateData {
                recipients: raw_recipients.to_string(),
                link: self.link(correlation_token),
                notifications: Vec::new(),
            },
        }
    }

    /// One digest for `address` covering `notifications`; `None` when there
    /// is nothing to report.
    pub fn digest(
        &self,
        address: &str,
        notifications: &[PendingNotification],
    ) -> Option<OutboundMessage> {
        let label = digest_label(notifications)?;
        let latest = notifications.iter().max_by_key(|n| n.occurred_at)?;

        Some(OutboundMessage {
            kind: MessageKind::Digest,
            to: vec![address.to_string()],
            from: self.from.clone(),
            subject: self.subject(label),
            doc_type_label: self.label_text(label),
            template_data: TemplateData {
                recipients: address.to_string(),
                link: self.link(&latest.correlation_token),
                notifications: notifications
                    .iter()
                    .map(|n| DigestItem {
                        event_id: n.event_id.clone(),
                        doc_type: n.doc_type,
                        occurred_at: n.occurred_at,
                    })
                    .collect(),
            },
        })
    }
}
