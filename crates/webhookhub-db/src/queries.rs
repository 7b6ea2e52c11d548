use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use webhookhub_types::api::{
    ChannelStat, ChannelUpdate, CreateChannelRequest, Stats, WebhookFilter, WebhookPage,
};
use webhookhub_types::models::{Channel, ChannelSummary, DraftRecord, NotificationRecord, Priority};

use crate::models::{CHANNEL_COLUMNS, ChannelRow, WEBHOOK_COLUMNS, WebhookRow};
use crate::{Database, DbError, format_ts, parse_ts};

const DEFAULT_ICON: &str = "📡";
const DEFAULT_COLOR: &str = "#6366f1";

impl Database {
    // -- Channels --

    /// Returns the channel, creating it with derived metadata if it is new.
    pub fn get_or_create_channel(&self, slug: &str) -> Result<Channel> {
        let now = format_ts(Utc::now());
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let channel = ensure_channel(&tx, slug, &now)?;
            tx.commit()?;
            Ok(channel)
        })
    }

    pub fn get_channel(&self, slug: &str) -> Result<Option<Channel>> {
        self.with_conn(|conn| query_channel(conn, slug))
    }

    /// Channels ordered by display name, with record counts.
    pub fn list_channels(&self) -> Result<Vec<ChannelSummary>> {
        let columns = CHANNEL_COLUMNS
            .split(',')
            .map(|c| format!("c.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {columns}, COUNT(w.id), MAX(w.created_at)
             FROM channels c
             LEFT JOIN webhooks w ON w.channel_slug = c.slug
             GROUP BY c.slug
             ORDER BY c.name COLLATE NOCASE, c.slug"
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        ChannelRow::from_row(row, 0)?,
                        row.get::<_, i64>(10)?,
                        row.get::<_, Option<String>>(11)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows
                .into_iter()
                .map(|(channel, count, last)| ChannelSummary {
                    channel: channel.into_channel(),
                    webhook_count: count as u64,
                    last_received: last.as_deref().and_then(parse_ts),
                })
                .collect())
        })
    }

    /// Explicit creation from the dashboard. Fails with [`DbError::Conflict`]
    /// if the slug is taken.
    pub fn create_channel(&self, req: &CreateChannelRequest) -> Result<Channel> {
        let now = format_ts(Utc::now());
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_channel(&tx, &req.slug)?.is_some() {
                return Err(DbError::Conflict(req.slug.clone()).into());
            }

            tx.execute(
                "INSERT INTO channels (slug, name, description, icon, color, pushover_enabled,
                                       pushover_priority, pushover_sound, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    req.slug,
                    req.name.clone().unwrap_or_else(|| display_name(&req.slug)),
                    req.description.clone().unwrap_or_default(),
                    req.icon.as_deref().unwrap_or(DEFAULT_ICON),
                    req.color.as_deref().unwrap_or(DEFAULT_COLOR),
                    req.pushover_enabled.unwrap_or(true),
                    req.pushover_priority,
                    req.pushover_sound,
                    now,
                ],
            )?;

            let channel = query_channel(&tx, &req.slug)?
                .ok_or_else(|| anyhow!("Channel vanished after insert: {}", req.slug))?;
            tx.commit()?;
            Ok(channel)
        })
    }

    /// Applies the present fields of `update`. Returns `None` for an unknown slug.
    pub fn update_channel(&self, slug: &str, update: &ChannelUpdate) -> Result<Option<Channel>> {
        let now = format_ts(Utc::now());
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(mut channel) = query_channel(&tx, slug)? else {
                return Ok(None);
            };

            if let Some(name) = &update.name {
                channel.name = name.clone();
            }
            if let Some(description) = &update.description {
                channel.description = description.clone();
            }
            if let Some(icon) = &update.icon {
                channel.icon = icon.clone();
            }
            if let Some(color) = &update.color {
                channel.color = color.clone();
            }
            if let Some(enabled) = update.pushover_enabled {
                channel.pushover_enabled = enabled;
            }
            if let Some(priority) = update.pushover_priority {
                channel.pushover_priority = priority;
            }
            if let Some(sound) = &update.pushover_sound {
                channel.pushover_sound = sound.clone();
            }

            tx.execute(
                "UPDATE channels SET name = ?1, description = ?2, icon = ?3, color = ?4,
                        pushover_enabled = ?5, pushover_priority = ?6, pushover_sound = ?7,
                        updated_at = ?8
                 WHERE slug = ?9",
                params![
                    channel.name,
                    channel.description,
                    channel.icon,
                    channel.color,
                    channel.pushover_enabled,
                    channel.pushover_priority,
                    channel.pushover_sound,
                    now,
                    slug,
                ],
            )?;

            let updated = query_channel(&tx, slug)?;
            tx.commit()?;
            Ok(updated)
        })
    }

    /// Deletes a channel and all of its webhooks. Returns the number of
    /// webhooks removed, or `None` if the channel does not exist.
    pub fn delete_channel(&self, slug: &str) -> Result<Option<usize>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_channel(&tx, slug)?.is_none() {
                return Ok(None);
            }

            let removed = tx.execute("DELETE FROM webhooks WHERE channel_slug = ?1", [slug])?;
            tx.execute("DELETE FROM channels WHERE slug = ?1", [slug])?;
            tx.commit()?;
            Ok(Some(removed))
        })
    }

    // -- Webhooks --

    /// Stores a normalized webhook, creating its channel if needed, in one
    /// transaction. `created_at` never goes backwards relative to existing
    /// rows, so it stays ordered with `id`.
    pub fn insert_webhook(&self, draft: &DraftRecord, now: DateTime<Utc>) -> Result<NotificationRecord> {
        let now = format_ts(now);
        let raw_payload = serde_json::to_string(&draft.raw_payload)?;
        let received_headers = serde_json::to_string(&draft.received_headers)?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            ensure_channel(&tx, &draft.channel_slug, &now)?;

            let latest: Option<String> =
                tx.query_row("SELECT MAX(created_at) FROM webhooks", [], |row| row.get(0))?;
            let created_at = match latest {
                Some(latest) if latest > now => latest,
                _ => now,
            };

            let enrichment = &draft.enrichment;
            tx.execute(
                "INSERT INTO webhooks (channel_slug, title, message, priority, push_enabled,
                                       player, user_name, ip_address, timestamp_text, image_url,
                                       source_ip, raw_payload, received_headers, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    draft.channel_slug,
                    draft.title,
                    draft.message,
                    draft.priority.as_str(),
                    draft.push_enabled,
                    enrichment.player,
                    enrichment.user,
                    enrichment.ip_address,
                    enrichment.timestamp_text,
                    enrichment.image_url,
                    draft.source_ip,
                    raw_payload,
                    received_headers,
                    created_at,
                ],
            )?;

            let id = tx.last_insert_rowid();
            let record = query_webhook(&tx, id)?
                .ok_or_else(|| anyhow!("Webhook vanished after insert: {}", id))?;
            tx.commit()?;
            Ok(record)
        })
    }

    pub fn get_webhook(&self, id: i64) -> Result<Option<NotificationRecord>> {
        self.with_conn(|conn| query_webhook(conn, id))
    }

    /// Newest-first page of webhooks matching `filter`.
    pub fn query_webhooks(&self, filter: &WebhookFilter) -> Result<WebhookPage> {
        let limit = filter.effective_limit();
        let offset = filter.effective_offset();

        let mut clauses = Vec::new();
        let mut args: Vec<SqlValue> = Vec::new();

        if let Some(channel) = &filter.channel {
            args.push(SqlValue::Text(channel.clone()));
            clauses.push(format!("channel_slug = ?{}", args.len()));
        }
        if let Some(priority) = filter.priority {
            args.push(SqlValue::Text(priority.as_str().to_string()));
            clauses.push(format!("priority = ?{}", args.len()));
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            args.push(SqlValue::Text(like_pattern(search)));
            let n = args.len();
            clauses.push(format!(
                "(title LIKE ?{n} ESCAPE '\\' OR message LIKE ?{n} ESCAPE '\\')"
            ));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM webhooks {where_sql}"),
                params_from_iter(args.iter()),
                |row| row.get(0),
            )?;

            let mut page_args = args.clone();
            page_args.push(SqlValue::Integer(i64::from(limit)));
            page_args.push(SqlValue::Integer(i64::from(offset)));
            let sql = format!(
                "SELECT {WEBHOOK_COLUMNS} FROM webhooks {where_sql}
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?{} OFFSET ?{}",
                page_args.len() - 1,
                page_args.len()
            );

            let mut stmt = conn.prepare(&sql)?;
            let webhooks = stmt
                .query_map(params_from_iter(page_args.iter()), WebhookRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
                .into_iter()
                .map(WebhookRow::into_record)
                .collect();

            Ok(WebhookPage {
                total: total as u64,
                limit,
                offset,
                webhooks,
            })
        })
    }

    /// Returns `false` if no webhook had this id.
    pub fn delete_webhook(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute("DELETE FROM webhooks WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }

    /// Bulk delete. With neither filter set, every webhook is removed.
    pub fn delete_webhooks(
        &self,
        channel: Option<&str>,
        older_than: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let mut clauses = Vec::new();
        let mut args: Vec<SqlValue> = Vec::new();

        if let Some(channel) = channel {
            args.push(SqlValue::Text(channel.to_string()));
            clauses.push(format!("channel_slug = ?{}", args.len()));
        }
        if let Some(cutoff) = older_than {
            args.push(SqlValue::Text(format_ts(cutoff)));
            clauses.push(format!("created_at < ?{}", args.len()));
        }

        let mut sql = "DELETE FROM webhooks".to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        self.with_conn_mut(|conn| Ok(conn.execute(&sql, params_from_iter(args.iter()))?))
    }

    pub fn delete_webhooks_by_channel(&self, slug: &str) -> Result<usize> {
        self.delete_webhooks(Some(slug), None)
    }

    pub fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.delete_webhooks(None, Some(cutoff))
    }

    pub fn mark_pushover_sent(&self, id: i64, sent: bool) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE webhooks SET pushover_sent = ?1 WHERE id = ?2",
                params![sent, id],
            )?;
            Ok(())
        })
    }

    // -- Stats --

    pub fn stats(&self, today: NaiveDate) -> Result<Stats> {
        self.with_conn(|conn| {
            let count = |sql: &str, args: &[&dyn rusqlite::ToSql]| -> Result<u64> {
                let n: i64 = conn.query_row(sql, args, |row| row.get(0))?;
                Ok(n as u64)
            };

            let total_webhooks = count("SELECT COUNT(*) FROM webhooks", &[])?;
            let total_channels = count("SELECT COUNT(*) FROM channels", &[])?;
            let today_count = count(
                "SELECT COUNT(*) FROM webhooks WHERE substr(created_at, 1, 10) = ?1",
                &[&today.format("%Y-%m-%d").to_string()],
            )?;
            let pushover_sent = count("SELECT COUNT(*) FROM webhooks WHERE pushover_sent = 1", &[])?;

            let mut by_priority: BTreeMap<String, u64> = Priority::ALL
                .iter()
                .map(|p| (p.as_str().to_string(), 0))
                .collect();
            let mut stmt = conn.prepare("SELECT priority, COUNT(*) FROM webhooks GROUP BY priority")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for (priority, n) in rows {
                by_priority.insert(priority, n as u64);
            }

            let mut stmt = conn.prepare(
                "SELECT c.slug, c.name, c.icon, c.color, COUNT(w.id)
                 FROM channels c
                 LEFT JOIN webhooks w ON w.channel_slug = c.slug
                 GROUP BY c.slug",
            )?;
            let by_channel = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        ChannelStat {
                            name: row.get(1)?,
                            icon: row.get(2)?,
                            color: row.get(3)?,
                            count: row.get::<_, i64>(4)? as u64,
                        },
                    ))
                })?
                .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;

            Ok(Stats {
                total_webhooks,
                total_channels,
                today_count,
                pushover_sent,
                by_priority,
                by_channel,
            })
        })
    }
}

/// Insert-if-absent on the unique slug, then read back. Concurrent callers
/// both end up reading the single surviving row.
fn ensure_channel(conn: &Connection, slug: &str, now: &str) -> Result<Channel> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO channels (slug, name, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![slug, display_name(slug), format!("Auto-created channel: {slug}"), now],
    )?;
    if inserted > 0 {
        tracing::info!(channel = %slug, "Auto-created channel");
    }

    query_channel(conn, slug)?.ok_or_else(|| anyhow!("Channel missing after upsert: {}", slug))
}

fn query_channel(conn: &Connection, slug: &str) -> Result<Option<Channel>> {
    let row = conn
        .query_row(
            &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE slug = ?1"),
            [slug],
            |row| ChannelRow::from_row(row, 0),
        )
        .optional()?;

    Ok(row.map(ChannelRow::into_channel))
}

fn query_webhook(conn: &Connection, id: i64) -> Result<Option<NotificationRecord>> {
    let row = conn
        .query_row(
            &format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE id = ?1"),
            [id],
            WebhookRow::from_row,
        )
        .optional()?;

    Ok(row.map(WebhookRow::into_record))
}

/// `build-server` → `Build Server`.
pub fn display_name(slug: &str) -> String {
    let name = slug
        .split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if name.is_empty() { slug.to_string() } else { name }
}

fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
