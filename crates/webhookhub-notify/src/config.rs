/// Port on which SMTP uses implicit TLS; any other port upgrades with STARTTLS.
pub const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Clone)]
pub struct PushoverConfig {
    pub user_key: String,
    pub api_token: String,
    pub api_url: String,
}

impl PushoverConfig {
    pub const DEFAULT_API_URL: &'static str = "https://api.pushover.net/1/messages.json";

    /// `None` unless both credentials are present.
    pub fn new(user_key: &str, api_token: &str) -> Option<Self> {
        let user_key = non_blank(user_key)?;
        let api_token = non_blank(api_token)?;
        Some(Self {
            user_key,
            api_token,
            api_url: Self::DEFAULT_API_URL.to_string(),
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub webhook_url: String,
}

impl DiscordConfig {
    pub fn new(webhook_url: &str) -> Option<Self> {
        Some(Self {
            webhook_url: non_blank(webhook_url)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
}

impl SmtpConfig {
    /// `None` when host, credentials, sender or recipients are missing.
    /// `to` is a comma-separated recipient list.
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        from: &str,
        to: &str,
    ) -> Option<Self> {
        let recipients = split_recipients(to);
        if recipients.is_empty() {
            return None;
        }
        Some(Self {
            host: non_blank(host)?,
            port,
            username: non_blank(username)?,
            password: non_blank(password)?,
            from: non_blank(from)?,
            to: recipients,
        })
    }

    pub fn implicit_tls(&self) -> bool {
        self.port == IMPLICIT_TLS_PORT
    }
}

/// Which backends to construct. A missing section means that backend is
/// disabled.
#[derive(Debug, Clone, Default)]
pub struct NotifyConfig {
    pub pushover: Option<PushoverConfig>,
    pub discord: Option<DiscordConfig>,
    pub smtp: Option<SmtpConfig>,
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn split_recipients(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_credentials_disable_backends() {
        assert!(PushoverConfig::new("user", "").is_none());
        assert!(PushoverConfig::new("  ", "token").is_none());
        assert!(DiscordConfig::new("").is_none());
        assert!(SmtpConfig::new("mail.example.com", 587, "u", "p", "hub@example.com", " , ").is_none());
        assert!(SmtpConfig::new("", 587, "u", "p", "hub@example.com", "a@example.com").is_none());
    }

    #[test]
    fn recipients_are_split_and_trimmed() {
        let smtp = SmtpConfig::new(
            "mail.example.com",
            465,
            "u",
            "p",
            "hub@example.com",
            "a@example.com, b@example.com,,",
        )
        .unwrap();
        assert_eq!(smtp.to, vec!["a@example.com", "b@example.com"]);
        assert!(smtp.implicit_tls());
    }

    #[test]
    fn pushover_url_can_be_overridden() {
        let cfg = PushoverConfig::new("user", "token").unwrap();
        assert_eq!(cfg.api_url, PushoverConfig::DEFAULT_API_URL);
        let cfg = cfg.with_api_url("http://127.0.0.1:9/messages.json");
        assert_eq!(cfg.api_url, "http://127.0.0.1:9/messages.json");
    }
}
