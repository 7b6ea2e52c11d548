//! Database row types. These map directly to SQLite rows and are converted
//! into the `webhookhub-types` models at the crate boundary.

use std::collections::BTreeMap;

use rusqlite::Row;
use tracing::warn;
use webhookhub_types::models::{Channel, Enrichment, NotificationRecord, Priority};

use crate::parse_ts_or_default;

pub const CHANNEL_COLUMNS: &str = "slug, name, description, icon, color, pushover_enabled, \
     pushover_priority, pushover_sound, created_at, updated_at";

pub const WEBHOOK_COLUMNS: &str = "id, channel_slug, title, message, priority, push_enabled, \
     player, user_name, ip_address, timestamp_text, image_url, source_ip, raw_payload, \
     received_headers, pushover_sent, created_at";

pub struct ChannelRow {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub pushover_enabled: bool,
    pub pushover_priority: Option<i32>,
    pub pushover_sound: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ChannelRow {
    /// Reads the columns listed in [`CHANNEL_COLUMNS`], starting at `offset`.
    pub fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            slug: row.get(offset)?,
            name: row.get(offset + 1)?,
            description: row.get(offset + 2)?,
            icon: row.get(offset + 3)?,
            color: row.get(offset + 4)?,
            pushover_enabled: row.get(offset + 5)?,
            pushover_priority: row.get(offset + 6)?,
            pushover_sound: row.get(offset + 7)?,
            created_at: row.get(offset + 8)?,
            updated_at: row.get(offset + 9)?,
        })
    }

    pub fn into_channel(self) -> Channel {
        let context = format!("channel '{}'", self.slug);
        Channel {
            created_at: parse_ts_or_default(&self.created_at, &context),
            updated_at: parse_ts_or_default(&self.updated_at, &context),
            slug: self.slug,
            name: self.name,
            description: self.description,
            icon: self.icon,
            color: self.color,
            pushover_enabled: self.pushover_enabled,
            pushover_priority: self.pushover_priority,
            pushover_sound: self.pushover_sound,
        }
    }
}

pub struct WebhookRow {
    pub id: i64,
    pub channel_slug: String,
    pub title: String,
    pub message: String,
    pub priority: String,
    pub push_enabled: bool,
    pub player: Option<String>,
    pub user_name: Option<String>,
    pub ip_address: Option<String>,
    pub timestamp_text: Option<String>,
    pub image_url: Option<String>,
    pub source_ip: Option<String>,
    pub raw_payload: String,
    pub received_headers: String,
    pub pushover_sent: Option<bool>,
    pub created_at: String,
}

impl WebhookRow {
    /// Reads the columns listed in [`WEBHOOK_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            channel_slug: row.get(1)?,
            title: row.get(2)?,
            message: row.get(3)?,
            priority: row.get(4)?,
            push_enabled: row.get(5)?,
            player: row.get(6)?,
            user_name: row.get(7)?,
            ip_address: row.get(8)?,
            timestamp_text: row.get(9)?,
            image_url: row.get(10)?,
            source_ip: row.get(11)?,
            raw_payload: row.get(12)?,
            received_headers: row.get(13)?,
            pushover_sent: row.get(14)?,
            created_at: row.get(15)?,
        })
    }

    pub fn into_record(self) -> NotificationRecord {
        let context = format!("webhook {}", self.id);

        let raw_payload = serde_json::from_str(&self.raw_payload).unwrap_or_else(|e| {
            warn!("Corrupt raw_payload on {}: {}", context, e);
            serde_json::Value::String(self.raw_payload.clone())
        });
        let received_headers: BTreeMap<String, String> =
            serde_json::from_str(&self.received_headers).unwrap_or_else(|e| {
                warn!("Corrupt received_headers on {}: {}", context, e);
                BTreeMap::new()
            });

        NotificationRecord {
            id: self.id,
            channel_slug: self.channel_slug,
            title: self.title,
            message: self.message,
            priority: Priority::lenient(Some(&self.priority)),
            push_enabled: self.push_enabled,
            enrichment: Enrichment {
                player: self.player,
                user: self.user_name,
                ip_address: self.ip_address,
                timestamp_text: self.timestamp_text,
                image_url: self.image_url,
            },
            source_ip: self.source_ip,
            raw_payload,
            received_headers,
            pushover_sent: self.pushover_sent,
            created_at: parse_ts_or_default(&self.created_at, &context),
        }
    }
}
