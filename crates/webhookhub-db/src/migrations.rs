use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE channels (
                slug              TEXT PRIMARY KEY,
                name              TEXT NOT NULL,
                description       TEXT NOT NULL DEFAULT '',
                icon              TEXT NOT NULL DEFAULT '📡',
                color             TEXT NOT NULL DEFAULT '#6366f1',
                pushover_enabled  INTEGER NOT NULL DEFAULT 1,
                pushover_priority INTEGER,
                pushover_sound    TEXT,
                created_at        TEXT NOT NULL,
                updated_at        TEXT NOT NULL
            );

            CREATE TABLE webhooks (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                channel_slug      TEXT NOT NULL REFERENCES channels(slug) ON DELETE CASCADE,
                title             TEXT NOT NULL DEFAULT '',
                message           TEXT NOT NULL DEFAULT '',
                priority          TEXT NOT NULL DEFAULT 'normal'
                                  CHECK (priority IN ('low', 'normal', 'high', 'critical')),
                push_enabled      INTEGER NOT NULL DEFAULT 1,
                player            TEXT,
                user_name         TEXT,
                ip_address        TEXT,
                timestamp_text    TEXT,
                image_url         TEXT,
                source_ip         TEXT,
                raw_payload       TEXT NOT NULL DEFAULT '{}',
                received_headers  TEXT NOT NULL DEFAULT '{}',
                pushover_sent     INTEGER,
                created_at        TEXT NOT NULL
            );

            CREATE INDEX idx_webhooks_channel  ON webhooks(channel_slug);
            CREATE INDEX idx_webhooks_created  ON webhooks(created_at DESC, id DESC);
            CREATE INDEX idx_webhooks_priority ON webhooks(priority);

            CREATE TABLE settings (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL DEFAULT ''
            );

            -- Seed the default general channel
            INSERT INTO channels (slug, name, description, created_at, updated_at)
                VALUES ('general', 'General', 'General purpose notifications',
                        strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                        strftime('%Y-%m-%dT%H:%M:%fZ', 'now'));

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
