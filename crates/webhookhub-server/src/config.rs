use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use webhookhub_notify::{DiscordConfig, NotifyConfig, PushoverConfig, SmtpConfig};

const DEFAULT_DB_PATH: &str = "/data/webhookhub.db";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_INGEST_PORT: u16 = 8181;
const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub db_path: PathBuf,
    pub host: String,
    /// Dashboard + API listener.
    pub port: u16,
    /// Webhook-only listener.
    pub ingest_port: u16,
    pub static_dir: Option<PathBuf>,
    pub notify: NotifyConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let port = |key: &str, default: u16| -> Result<u16> {
            match get(key) {
                Some(v) => v.parse().with_context(|| format!("{key} is not a valid port: {v:?}")),
                None => Ok(default),
            }
        };

        let Some(api_key) = get("WEBHOOKHUB_API_KEY") else {
            bail!("WEBHOOKHUB_API_KEY is not set; webhooks cannot be authenticated");
        };

        let text = |key: &str| get(key).unwrap_or_default();
        let notify = NotifyConfig {
            pushover: PushoverConfig::new(&text("PUSHOVER_USER_KEY"), &text("PUSHOVER_API_TOKEN")),
            discord: DiscordConfig::new(&text("DISCORD_WEBHOOK_URL")),
            smtp: SmtpConfig::new(
                &text("SMTP_HOST"),
                port("SMTP_PORT", DEFAULT_SMTP_PORT)?,
                &text("SMTP_USER"),
                &text("SMTP_PASS"),
                &text("SMTP_FROM"),
                &text("SMTP_TO"),
            ),
        };

        Ok(Self {
            api_key,
            db_path: get("WEBHOOKHUB_DB").unwrap_or_else(|| DEFAULT_DB_PATH.into()).into(),
            host: get("WEBHOOKHUB_HOST").unwrap_or_else(|| DEFAULT_HOST.into()),
            port: port("WEBHOOKHUB_PORT", DEFAULT_PORT)?,
            ingest_port: port("WEBHOOKHUB_INGEST_PORT", DEFAULT_INGEST_PORT)?,
            static_dir: get("WEBHOOKHUB_STATIC_DIR").map(PathBuf::from),
            notify,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn parse(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn api_key_is_required() {
        let err = parse(&[]).unwrap_err();
        assert!(err.to_string().contains("WEBHOOKHUB_API_KEY"));
        assert!(parse(&[("WEBHOOKHUB_API_KEY", "   ")]).is_err());
    }

    #[test]
    fn defaults_apply() {
        let config = parse(&[("WEBHOOKHUB_API_KEY", "k")]).unwrap();
        assert_eq!(config.api_key, "k");
        assert_eq!(config.db_path, PathBuf::from("/data/webhookhub.db"));
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.ingest_port, 8181);
        assert!(config.static_dir.is_none());
        assert!(config.notify.pushover.is_none());
        assert!(config.notify.discord.is_none());
        assert!(config.notify.smtp.is_none());
    }

    #[test]
    fn backends_enable_only_when_complete() {
        let config = parse(&[
            ("WEBHOOKHUB_API_KEY", "k"),
            ("PUSHOVER_USER_KEY", "u"),
            ("DISCORD_WEBHOOK_URL", "https://discord.com/api/webhooks/1/abc"),
            ("SMTP_HOST", "mail.example.com"),
            ("SMTP_PORT", "465"),
            ("SMTP_USER", "hub"),
            ("SMTP_PASS", "pw"),
            ("SMTP_FROM", "hub@example.com"),
            ("SMTP_TO", "a@example.com, b@example.com"),
        ])
        .unwrap();

        assert!(config.notify.pushover.is_none());
        assert!(config.notify.discord.is_some());
        let smtp = config.notify.smtp.unwrap();
        assert_eq!(smtp.port, 465);
        assert_eq!(smtp.to.len(), 2);
    }

    #[test]
    fn invalid_ports_are_errors() {
        let err = parse(&[("WEBHOOKHUB_API_KEY", "k"), ("WEBHOOKHUB_PORT", "http")]).unwrap_err();
        assert!(err.to_string().contains("WEBHOOKHUB_PORT"));
        assert!(parse(&[("WEBHOOKHUB_API_KEY", "k"), ("SMTP_PORT", "99999")]).is_err());
    }
}
