use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use tracing::{debug, warn};
use webhookhub_types::models::{ChannelPrefs, NotificationRecord, Priority};

use crate::Backend;
use crate::config::PushoverConfig;
use crate::error::NotifyError;
use crate::utils::{channel_title, truncate_chars};

const NAME: &str = "pushover";
const MAX_TITLE: usize = 250;
const MAX_MESSAGE: usize = 1024;
/// Pushover's attachment size limit.
const MAX_ATTACHMENT_BYTES: usize = 2_621_440;
const EMERGENCY_RETRY_SECS: u32 = 60;
const EMERGENCY_EXPIRE_SECS: u32 = 3600;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Image download budget. Together with the message POST it stays under the
/// dispatcher's per-backend limit, so a slow image host still leaves time
/// for the text-only fallback.
pub const IMAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(4);

pub struct PushoverBackend {
    config: PushoverConfig,
    client: Client,
    image_timeout: Duration,
}

impl PushoverBackend {
    pub fn new(config: PushoverConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            config,
            client,
            image_timeout: IMAGE_FETCH_TIMEOUT,
        }
    }

    pub fn with_image_timeout(mut self, timeout: Duration) -> Self {
        self.image_timeout = timeout;
        self
    }

    /// Pushover priority for a record; the channel override replaces the
    /// mapped value.
    pub fn priority_for(record: &NotificationRecord, prefs: &ChannelPrefs) -> i32 {
        let mapped = match record.priority {
            Priority::Low => -1,
            Priority::Normal => 0,
            Priority::High => 1,
            Priority::Critical => 2,
        };
        prefs.pushover_priority.unwrap_or(mapped).clamp(-2, 2)
    }

    /// Form fields without any attachment.
    pub fn build_form(&self, record: &NotificationRecord, prefs: &ChannelPrefs) -> Vec<(&'static str, String)> {
        let message = if record.message.trim().is_empty() {
            " ".to_string()
        } else {
            truncate_chars(&record.message, MAX_MESSAGE)
        };
        let priority = Self::priority_for(record, prefs);

        let mut form = vec![
            ("token", self.config.api_token.clone()),
            ("user", self.config.user_key.clone()),
            ("title", truncate_chars(&channel_title(&prefs.name, &record.title), MAX_TITLE)),
            ("message", message),
            ("priority", priority.to_string()),
            ("timestamp", record.created_at.timestamp().to_string()),
        ];
        if priority == 2 {
            form.push(("retry", EMERGENCY_RETRY_SECS.to_string()));
            form.push(("expire", EMERGENCY_EXPIRE_SECS.to_string()));
        }
        if let Some(sound) = prefs.pushover_sound.as_deref().filter(|s| !s.is_empty()) {
            form.push(("sound", sound.to_string()));
        }
        form
    }

    /// Downloads an image and returns `(mime type, base64 data)`.
    async fn fetch_attachment(&self, url: &str) -> Result<(String, String), NotifyError> {
        let resp = self
            .client
            .get(url)
            .timeout(self.image_timeout)
            .send()
            .await
            .map_err(|e| NotifyError::unavailable(NAME, format!("image fetch: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::rejected(NAME, format!("image fetch status={status}")));
        }

        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| "image/jpeg".to_string());
        if !mime.starts_with("image/") {
            return Err(NotifyError::rejected(NAME, format!("not an image: {mime}")));
        }

        if resp
            .content_length()
            .is_some_and(|len| len as usize > MAX_ATTACHMENT_BYTES)
        {
            return Err(NotifyError::rejected(NAME, "image too large"));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| NotifyError::unavailable(NAME, format!("image fetch: {e}")))?;
        if bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(NotifyError::rejected(NAME, "image too large"));
        }

        Ok((mime, STANDARD.encode(&bytes)))
    }
}

#[async_trait]
impl Backend for PushoverBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn accepts(&self, record: &NotificationRecord, prefs: &ChannelPrefs) -> bool {
        record.push_enabled && prefs.pushover_enabled
    }

    async fn send(&self, record: &NotificationRecord, prefs: &ChannelPrefs) -> Result<(), NotifyError> {
        let mut form = self.build_form(record, prefs);

        if let Some(image_url) = record.enrichment.image_url.as_deref() {
            match self.fetch_attachment(image_url).await {
                Ok((mime, data)) => {
                    debug!("Attaching {} image ({} base64 bytes)", mime, data.len());
                    form.push(("attachment_base64", data));
                    form.push(("attachment_type", mime));
                }
                Err(e) => {
                    warn!("Sending without attachment: {}", e);
                    form.push(("url", image_url.to_string()));
                }
            }
        }

        let resp = self
            .client
            .post(&self.config.api_url)
            .form(&form)
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
