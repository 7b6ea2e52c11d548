use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;
use webhookhub_types::models::{ChannelPrefs, NotificationRecord};

use crate::Backend;
use crate::config::SmtpConfig;
use crate::error::NotifyError;
use crate::utils::{channel_title, escape_html};

const NAME: &str = "smtp";

pub struct SmtpBackend {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl SmtpBackend {
    /// Port 465 connects with implicit TLS, every other port with STARTTLS.
    /// Invalid addresses or TLS setup errors are reported as unavailable.
    pub fn new(config: SmtpConfig) -> Result<Self, NotifyError> {
        let builder = if config.implicit_tls() {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| NotifyError::unavailable(NAME, e))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(config.username.clone(), config.password.clone()))
            .timeout(Some(Duration::from_secs(15)))
            .build();

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| NotifyError::unavailable(NAME, format!("invalid SMTP_FROM: {e}")))?;
        let to = config
            .to
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>()
                    .map_err(|e| NotifyError::unavailable(NAME, format!("invalid recipient {addr}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { transport, from, to })
    }
}

pub(crate) fn subject(record: &NotificationRecord, prefs: &ChannelPrefs) -> String {
    if prefs.name.is_empty() {
        format!("[WebhookHub] {}", record.title)
    } else {
        format!("[WebhookHub]{}", channel_title(&prefs.name, &record.title))
    }
}

pub(crate) fn plain_body(record: &NotificationRecord, prefs: &ChannelPrefs) -> String {
    let mut body = format!(
        "{}\n\n{}\n\nChannel: {}\nPriority: {}\nReceived: {}\n",
        record.title,
        record.message,
        prefs.name,
        record.priority,
        record.created_at.to_rfc3339(),
    );
    for (label, value) in record.enrichment.labelled() {
        body.push_str(&format!("{label}: {value}\n"));
    }
    if let Some(url) = &record.enrichment.image_url {
        body.push_str(&format!("Image: {url}\n"));
    }
    body
}

pub(crate) fn html_body(record: &NotificationRecord, prefs: &ChannelPrefs) -> String {
    let mut rows = format!(
        "<tr><th align=\"left\">Channel</th><td>{}</td></tr>\
         <tr><th align=\"left\">Priority</th><td>{}</td></tr>\
         <tr><th align=\"left\">Received</th><td>{}</td></tr>",
        escape_html(&prefs.name),
        record.priority,
        record.created_at.to_rfc3339(),
    );
    for (label, value) in record.enrichment.labelled() {
        rows.push_str(&format!(
            "<tr><th align=\"left\">{}</th><td>{}</td></tr>",
            label,
            escape_html(value)
        ));
    }

    let image = record
        .enrichment
        .image_url
        .as_deref()
        .map(|url| format!("<p><img src=\"{}\" alt=\"\" style=\"max-width:100%\"></p>", escape_html(url)))
        .unwrap_or_default();

    format!(
        "<html><body><h2>{}</h2><p>{}</p>{}<table>{}</table></body></html>",
        escape_html(&record.title),
        escape_html(&record.message).replace('\n', "<br>"),
        image,
        rows,
    )
}

pub(crate) fn build_message(
    from: &Mailbox,
    to: &[Mailbox],
    record: &NotificationRecord,
    prefs: &ChannelPrefs,
) -> Result<Message, NotifyError> {
    let mut builder = Message::builder().from(from.clone()).subject(subject(record, prefs));
    for recipient in to {
        builder = builder.to(recipient.clone());
    }
    builder
        .multipart(MultiPart::alternative_plain_html(
            plain_body(record, prefs),
            html_body(record, prefs),
        ))
        .map_err(|e| NotifyError::unavailable(NAME, format!("building message: {e}")))
}

#[async_trait]
impl Backend for SmtpBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn send(&self, record: &NotificationRecord, prefs: &ChannelPrefs) -> Result<(), NotifyError> {
        let message = build_message(&self.from, &self.to, record, prefs)?;
        let response = self.transport.send(message).await.map_err(|e| {
            if e.is_permanent() {
                NotifyError::rejected(NAME, e)
            } else {
                NotifyError::unavailable(NAME, e)
            }
        })?;
        debug!("SMTP accepted webhook {}: {:?}", record.id, response.code());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use webhookhub_types::models::Priority;

    use super::*;
    use crate::fixtures::{prefs, record};

    #[test]
    fn subject_is_prefixed() {
        assert_eq!(
            subject(&record(Priority::Normal), &prefs()),
            "[WebhookHub][Plex] Playback Started"
        );

        let unnamed = ChannelPrefs {
            name: String::new(),
            ..prefs()
        };
        assert_eq!(
            subject(&record(Priority::Normal), &unnamed),
            "[WebhookHub] Playback Started"
        );
    }

    #[test]
    fn plain_body_lists_enrichment() {
        let body = plain_body(&record(Priority::High), &prefs());
        assert!(body.starts_with("Playback Started\n\nAlice started The Matrix"));
        assert!(body.contains("Priority: high"));
        assert!(body.contains("Player: Living Room TV"));
        assert!(!body.contains("IP Address"));
    }

    #[test]
    fn html_body_is_escaped_and_shows_image() {
        let mut rec = record(Priority::Normal);
        rec.message = "<script>alert(1)</script>\nsecond line".into();
        rec.enrichment.image_url = Some("https://img.example.com/p.jpg?a=1&b=2".into());

        let html = html_body(&rec, &prefs());
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("<br>second line"));
        assert!(html.contains("<img src=\"https://img.example.com/p.jpg?a=1&amp;b=2\""));
        assert!(html.contains("<th align=\"left\">User</th><td>alice</td>"));
    }

    #[test]
    fn message_goes_to_every_recipient() {
        let from: Mailbox = "hub@example.com".parse().unwrap();
        let to: Vec<Mailbox> = vec![
            "a@example.com".parse().unwrap(),
            "b@example.com".parse().unwrap(),
        ];
        let message = build_message(&from, &to, &record(Priority::Low), &prefs()).unwrap();

        let envelope = message.envelope();
        assert_eq!(envelope.to().len(), 2);

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: [WebhookHub][Plex] Playback Started"));
        assert!(raw.contains("multipart/alternative"));
    }
}
