use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use webhookhub_types::models::{ChannelPrefs, NotificationRecord, Priority};

use crate::Backend;
use crate::config::DiscordConfig;
use crate::error::NotifyError;
use crate::utils::{channel_title, truncate_chars};

const NAME: &str = "discord";
const MAX_TITLE: usize = 256;
const MAX_DESCRIPTION: usize = 4096;
const MAX_FIELD_VALUE: usize = 1024;

pub struct DiscordBackend {
    config: DiscordConfig,
    client: Client,
}

impl DiscordBackend {
    pub fn new(config: DiscordConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    pub fn color_for(priority: Priority) -> u32 {
        match priority {
            Priority::Low => 0x556480,
            Priority::Normal => 0x3b82f6,
            Priority::High => 0xf59e0b,
            Priority::Critical => 0xef4444,
        }
    }

    pub fn build_payload(record: &NotificationRecord, prefs: &ChannelPrefs) -> Value {
        let fields: Vec<Value> = record
            .enrichment
            .labelled()
            .into_iter()
            .map(|(name, value)| {
                json!({
                    "name": name,
                    "value": truncate_chars(value, MAX_FIELD_VALUE),
                    "inline": true,
                })
            })
            .collect();

        let mut embed = json!({
            "title": truncate_chars(&channel_title(&prefs.name, &record.title), MAX_TITLE),
            "color": Self::color_for(record.priority),
            "fields": fields,
            "footer": { "text": format!("WebhookHub • priority {}", record.priority) },
            "timestamp": record.created_at.to_rfc3339(),
        });
        // Discord refuses empty descriptions.
        if !record.message.trim().is_empty() {
            embed["description"] = json!(truncate_chars(&record.message, MAX_DESCRIPTION));
        }
        if let Some(url) = record.enrichment.image_url.as_deref() {
            embed["image"] = json!({ "url": url });
        }

        json!({ "embeds": [embed] })
    }
}

#[async_trait]
impl Backend for DiscordBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn send(&self, record: &NotificationRecord, prefs: &ChannelPrefs) -> Result<(), NotifyError> {
        let payload = Self::build_payload(record, prefs);
        let resp = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::unavailable(NAME, e))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(NotifyError::rejected(
                NAME,
                format!("status={}, body={}", status, truncate_chars(&body, 200)),
            ))
        }
    }
}
