use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use webhookhub_types::api::RetentionSettings;

use crate::{Database, DbError, format_ts, parse_ts};

pub const CLEANUP_ENABLED: &str = "cleanup_enabled";
pub const CLEANUP_DAYS: &str = "cleanup_days";
pub const CLEANUP_LAST_RUN: &str = "cleanup_last_run";
pub const CLEANUP_LAST_DELETED: &str = "cleanup_last_deleted";

const DEFAULT_CLEANUP_DAYS: u32 = 30;
/// A century; keeps the retention cutoff inside chrono's date range.
pub const MAX_CLEANUP_DAYS: u32 = 36_500;

pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("site_title", "WebhookHub"),
    ("header_text", "WebhookHub"),
    ("favicon_url", "/static/favicon.svg"),
    ("font_family", "DM Sans"),
    ("font_size", "14"),
    ("color_accent", "#3b82f6"),
    ("color_text_primary", "#e2e8f0"),
    ("color_text_secondary", "#8896b0"),
    (CLEANUP_ENABLED, "false"),
    (CLEANUP_DAYS, "30"),
    (CLEANUP_LAST_RUN, ""),
    (CLEANUP_LAST_DELETED, "0"),
];

/// Keys only the sweeper writes.
const READ_ONLY_KEYS: &[&str] = &[CLEANUP_LAST_RUN, CLEANUP_LAST_DELETED];

pub(crate) fn seed_defaults(conn: &Connection) -> Result<()> {
    for (key, value) in DEFAULT_SETTINGS {
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
    }
    Ok(())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}

fn parse_days(value: &str) -> Option<u32> {
    value
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|d| (1..=MAX_CLEANUP_DAYS).contains(d))
}

impl Database {
    /// Every known setting, with defaults filled in for missing rows.
    pub fn get_settings(&self) -> Result<BTreeMap<String, String>> {
        self.with_conn(|conn| {
            let mut settings: BTreeMap<String, String> = DEFAULT_SETTINGS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();

            let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            settings.extend(rows);
            Ok(settings)
        })
    }

    /// Writes the known, writable keys in one transaction and returns how many
    /// were applied. Unknown keys are ignored; invalid retention values fail
    /// the whole update with [`DbError::InvalidSetting`].
    pub fn update_settings(&self, values: &BTreeMap<String, String>) -> Result<usize> {
        let mut accepted = Vec::new();
        for (key, value) in values {
            let known = DEFAULT_SETTINGS.iter().any(|(k, _)| *k == key.as_str());
            if !known || READ_ONLY_KEYS.contains(&key.as_str()) {
                continue;
            }

            let value = match key.as_str() {
                CLEANUP_ENABLED => parse_flag(value).map(|b| b.to_string()),
                CLEANUP_DAYS => parse_days(value).map(|d| d.to_string()),
                _ => Some(value.clone()),
            }
            .ok_or_else(|| DbError::InvalidSetting {
                key: key.clone(),
                value: value.clone(),
            })?;
            accepted.push((key.clone(), value));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for (key, value) in &accepted {
                tx.execute(
                    "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )?;
            }
            tx.commit()?;
            Ok(accepted.len())
        })
    }

    /// Read fresh on every call; nothing is cached.
    pub fn retention_settings(&self) -> Result<RetentionSettings> {
        let settings = self.get_settings()?;
        let get = |key: &str| settings.get(key).map(String::as_str).unwrap_or_default();

        Ok(RetentionSettings {
            enabled: parse_flag(get(CLEANUP_ENABLED)).unwrap_or(false),
            days: parse_days(get(CLEANUP_DAYS)).unwrap_or(DEFAULT_CLEANUP_DAYS),
            last_run: parse_ts(get(CLEANUP_LAST_RUN)),
            last_deleted: get(CLEANUP_LAST_DELETED).parse().unwrap_or(0),
        })
    }

    pub fn record_sweep(&self, ran_at: DateTime<Utc>, deleted: usize) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                params![CLEANUP_LAST_RUN, format_ts(ran_at)],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                params![CLEANUP_LAST_DELETED, deleted.to_string()],
            )?;
            tx.commit()?;
            Ok(())
        })
    }
}
