use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a notification. Anything unrecognised normalizes to `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Case-insensitive match; missing or unknown input yields `Normal`.
    pub fn lenient(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

// -- Channels --

pub const MAX_SLUG_LEN: usize = 64;

/// URL-safe channel key: 1 to 64 ASCII alphanumerics, `-` or `_`.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && slug
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub pushover_enabled: bool,
    /// Replaces the priority derived from the record when set (Pushover scale, -2..=2).
    pub pushover_priority: Option<i32>,
    pub pushover_sound: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    pub fn prefs(&self) -> ChannelPrefs {
        ChannelPrefs {
            name: self.name.clone(),
            pushover_enabled: self.pushover_enabled,
            pushover_priority: self.pushover_priority,
            pushover_sound: self.pushover_sound.clone(),
        }
    }
}

/// Channel row plus aggregate counts, as listed on the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    #[serde(flatten)]
    pub channel: Channel,
    pub webhook_count: u64,
    pub last_received: Option<DateTime<Utc>>,
}

/// The slice of a channel that notification backends care about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelPrefs {
    pub name: String,
    pub pushover_enabled: bool,
    pub pushover_priority: Option<i32>,
    pub pushover_sound: Option<String>,
}

impl ChannelPrefs {
    /// Preferences used when a record's channel row cannot be loaded.
    pub fn fallback(slug: &str) -> Self {
        Self {
            name: slug.to_string(),
            pushover_enabled: true,
            pushover_priority: None,
            pushover_sound: None,
        }
    }
}

// -- Records --

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub player: Option<String>,
    pub user: Option<String>,
    pub ip_address: Option<String>,
    pub timestamp_text: Option<String>,
    pub image_url: Option<String>,
}

impl Enrichment {
    /// Labelled text fields in display order. `image_url` is rendered separately.
    pub fn labelled(&self) -> Vec<(&'static str, &str)> {
        [
            ("Player", self.player.as_deref()),
            ("User", self.user.as_deref()),
            ("IP Address", self.ip_address.as_deref()),
            ("Timestamp", self.timestamp_text.as_deref()),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.map(|v| (label, v)))
        .collect()
    }
}

/// A normalized webhook that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftRecord {
    pub channel_slug: String,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub push_enabled: bool,
    #[serde(flatten)]
    pub enrichment: Enrichment,
    pub source_ip: Option<String>,
    pub raw_payload: serde_json::Value,
    pub received_headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRecord {
    pub id: i64,
    pub channel_slug: String,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub push_enabled: bool,
    #[serde(flatten)]
    pub enrichment: Enrichment,
    pub source_ip: Option<String>,
    pub raw_payload: serde_json::Value,
    pub received_headers: BTreeMap<String, String>,
    /// `None` until dispatch has finished (or when Pushover was not attempted).
    pub pushover_sent: Option<bool>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_parse_is_case_insensitive() {
        assert_eq!("HIGH".parse::<Priority>(), Ok(Priority::High));
        assert_eq!(" Critical ".parse::<Priority>(), Ok(Priority::Critical));
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn slugs_are_url_safe() {
        assert!(is_valid_slug("plex"));
        assert!(is_valid_slug("home_lab-2"));
        assert!(is_valid_slug(&"a".repeat(MAX_SLUG_LEN)));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("has space"));
        assert!(!is_valid_slug("dots.not.allowed"));
        assert!(!is_valid_slug("ünïcode"));
        assert!(!is_valid_slug(&"a".repeat(MAX_SLUG_LEN + 1)));
    }

    #[test]
    fn lenient_priority_defaults_to_normal() {
        assert_eq!(Priority::lenient(None), Priority::Normal);
        assert_eq!(Priority::lenient(Some("urgent")), Priority::Normal);
        assert_eq!(Priority::lenient(Some("Low")), Priority::Low);
    }

    #[test]
    fn priority_serializes_lowercase() {
        let json = serde_json::to_string(&Priority::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
    }

    #[test]
    fn labelled_enrichment_skips_missing() {
        let enrichment = Enrichment {
            player: Some("Roku".into()),
            ip_address: Some("10.0.0.2".into()),
            image_url: Some("https://img.example/x.png".into()),
            ..Default::default()
        };
        assert_eq!(
            enrichment.labelled(),
            vec![("Player", "Roku"), ("IP Address", "10.0.0.2")]
        );
    }
}
