use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{NotificationRecord, Priority};

/// Largest page the webhook listing will return.
pub const MAX_PAGE_SIZE: u32 = 500;
pub const DEFAULT_PAGE_SIZE: u32 = 50;

// -- Ingest --

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: String,
    pub id: i64,
    pub channel: String,
}

// -- Channels --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub slug: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub pushover_enabled: Option<bool>,
    pub pushover_priority: Option<i32>,
    pub pushover_sound: Option<String>,
}

/// Partial channel update. For the nullable preferences, an explicit `null`
/// clears the value while an absent key leaves it untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub pushover_enabled: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub pushover_priority: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub pushover_sound: Option<Option<String>>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// -- Webhooks --

/// Query-string value where an empty parameter (`?channel=`) means absent.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map(Some).map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookFilter {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub channel: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub search: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub limit: Option<u32>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub offset: Option<u32>,
}

impl WebhookFilter {
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookPage {
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub webhooks: Vec<NotificationRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BulkDeleteQuery {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub channel: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub older_than: Option<DateTime<Utc>>,
}

// -- Stats --

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStat {
    pub name: String,
    pub icon: String,
    pub color: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub total_webhooks: u64,
    pub total_channels: u64,
    pub today_count: u64,
    pub pushover_sent: u64,
    pub by_priority: BTreeMap<String, u64>,
    pub by_channel: BTreeMap<String, ChannelStat>,
}

// -- Settings --

/// Retention knobs stored alongside the branding settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionSettings {
    pub enabled: bool,
    pub days: u32,
    pub last_run: Option<DateTime<Utc>>,
    pub last_deleted: u64,
}

// -- Test notifications --

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestRequest {
    pub channel: Option<String>,
    pub title: Option<String>,
    pub message: Option<String>,
    pub priority: Option<Priority>,
}
