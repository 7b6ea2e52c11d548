use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use webhookhub_types::models::Enrichment;

/// Accepted field names, primary name first.
pub mod aliases {
    pub const TITLE: &[&str] = &["title", "subject", "name", "event"];
    pub const MESSAGE: &[&str] = &["message", "body", "text", "description", "content"];
    pub const PRIORITY: &[&str] = &["priority", "level", "severity"];
    pub const PUSH: &[&str] = &["push", "pushover", "notify"];
    pub const PLAYER: &[&str] = &["player", "player_name", "friendly_name"];
    pub const USER: &[&str] = &["user", "username", "user_name"];
    pub const IP_ADDRESS: &[&str] = &["ip_address", "ip", "ip_addr", "client_ip"];
    pub const TIMESTAMP: &[&str] = &["timestamp", "time", "datetime", "date"];
    pub const IMAGE_URL: &[&str] = &["image_url", "image", "thumbnail", "poster_url"];
}

/// Canonical fields extracted from a payload. Every field is optional; the
/// normalizer fills in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFields {
    pub title: Option<String>,
    pub message: Option<String>,
    pub priority: Option<String>,
    pub push: Option<String>,
    pub enrichment: Enrichment,
}

/// Maps one source-specific payload shape onto [`ParsedFields`].
pub trait Parser: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    fn parse(&self, body: &Map<String, Value>) -> ParsedFields;
}

/// Render a scalar JSON value as text. Blank strings, null, arrays and
/// objects count as absent.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// First present value among `names`, in order.
pub fn lookup(body: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| body.get(*name).and_then(scalar_text))
}

/// Fallback parser: primary field names, then aliases.
pub struct GenericParser;

impl GenericParser {
    pub fn enrichment(body: &Map<String, Value>) -> Enrichment {
        Enrichment {
            player: lookup(body, aliases::PLAYER),
            user: lookup(body, aliases::USER),
            ip_address: lookup(body, aliases::IP_ADDRESS),
            timestamp_text: lookup(body, aliases::TIMESTAMP),
            image_url: lookup(body, aliases::IMAGE_URL),
        }
    }
}

impl Parser for GenericParser {
    fn name(&self) -> &str {
        "generic"
    }

    fn parse(&self, body: &Map<String, Value>) -> ParsedFields {
        ParsedFields {
            title: lookup(body, aliases::TITLE),
            message: lookup(body, aliases::MESSAGE),
            priority: lookup(body, aliases::PRIORITY),
            push: lookup(body, aliases::PUSH),
            enrichment: Self::enrichment(body),
        }
    }
}

/// Tautulli (Plex monitoring) notification agent payloads.
///
/// Tautulli sends `subject`/`body` plus the trigger name in `action`; playback
/// problems are raised to `high`.
pub struct TautulliParser;

const TAUTULLI_URGENT_ACTIONS: &[&str] = &["buffer", "error"];

impl Parser for TautulliParser {
    fn name(&self) -> &str {
        "tautulli"
    }

    fn parse(&self, body: &Map<String, Value>) -> ParsedFields {
        let subject = lookup(body, &["subject", "title"])
            .unwrap_or_else(|| "Tautulli Notification".to_string());
        let action = lookup(body, &["action", "trigger"]);

        let title = match &action {
            Some(action) => format!("{action}: {subject}"),
            None => subject,
        };

        let priority = match &action {
            Some(action) if TAUTULLI_URGENT_ACTIONS.contains(&action.to_ascii_lowercase().as_str()) => {
                Some("high".to_string())
            }
            _ => lookup(body, aliases::PRIORITY),
        };

        ParsedFields {
            title: Some(title),
            message: lookup(body, &["body", "message"]),
            priority,
            push: lookup(body, aliases::PUSH),
            enrichment: GenericParser::enrichment(body),
        }
    }
}

/// Registry of payload parsers keyed by channel slug.
///
/// Slugs without a registered parser use [`GenericParser`].
///
/// # Examples
///
/// ```
/// use webhookhub_ingest::{GenericParser, ParserRegistry};
///
/// let mut registry = ParserRegistry::default();
/// assert!(registry.has_parser("tautulli"));
/// registry.register("sonarr", GenericParser);
/// assert!(registry.has_parser("sonarr"));
/// assert_eq!(registry.get("unknown").name(), "generic");
/// ```
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn Parser>>,
    fallback: Arc<dyn Parser>,
}

impl ParserRegistry {
    /// An empty registry that only knows the generic fallback.
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
            fallback: Arc::new(GenericParser),
        }
    }

    pub fn register(&mut self, key: impl Into<String>, parser: impl Parser + 'static) {
        let key = key.into();
        tracing::debug!(key = %key, parser = parser.name(), "Registered webhook parser");
        self.parsers.insert(key, Arc::new(parser));
    }

    pub fn get(&self, key: &str) -> &dyn Parser {
        self.parsers
            .get(key)
            .map(|p| p.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }

    pub fn has_parser(&self, key: &str) -> bool {
        self.parsers.contains_key(key)
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.parsers.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        keys
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register("tautulli", TautulliParser);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn generic_prefers_primary_name_over_alias() {
        let parsed = GenericParser.parse(&object(json!({"subject": "B", "title": "A"})));
        assert_eq!(parsed.title.as_deref(), Some("A"));
    }

    #[test]
    fn generic_uses_first_matching_alias() {
        let parsed = GenericParser.parse(&object(json!({"event": "deploy", "subject": "S"})));
        assert_eq!(parsed.title.as_deref(), Some("S"));

        let parsed = GenericParser.parse(&object(json!({"content": "c", "text": "t"})));
        assert_eq!(parsed.message.as_deref(), Some("t"));
    }

    #[test]
    fn blank_and_structured_values_are_absent() {
        let parsed = GenericParser.parse(&object(json!({
            "title": "   ",
            "subject": {"nested": true},
            "name": "fallback",
            "message": null,
            "body": 42
        })));
        assert_eq!(parsed.title.as_deref(), Some("fallback"));
        assert_eq!(parsed.message.as_deref(), Some("42"));
    }

    #[test]
    fn enrichment_aliases_resolve_independently() {
        let parsed = GenericParser.parse(&object(json!({
            "friendly_name": "Living Room",
            "username": "alice",
            "ip": "192.168.1.4",
            "time": "12:00",
            "thumbnail": "https://img.example/t.jpg"
        })));
        assert_eq!(
            parsed.enrichment,
            Enrichment {
                player: Some("Living Room".into()),
                user: Some("alice".into()),
                ip_address: Some("192.168.1.4".into()),
                timestamp_text: Some("12:00".into()),
                image_url: Some("https://img.example/t.jpg".into()),
            }
        );
    }

    #[test]
    fn tautulli_builds_action_title_and_escalates() {
        let parsed = TautulliParser.parse(&object(json!({
            "action": "buffer",
            "subject": "Alien (1979)",
            "body": "Buffering on Roku",
            "player": "Roku"
        })));
        assert_eq!(parsed.title.as_deref(), Some("buffer: Alien (1979)"));
        assert_eq!(parsed.message.as_deref(), Some("Buffering on Roku"));
        assert_eq!(parsed.priority.as_deref(), Some("high"));
        assert_eq!(parsed.enrichment.player.as_deref(), Some("Roku"));
    }

    #[test]
    fn tautulli_play_keeps_payload_priority() {
        let parsed = TautulliParser.parse(&object(json!({"trigger": "play", "priority": "low"})));
        assert_eq!(parsed.title.as_deref(), Some("play: Tautulli Notification"));
        assert_eq!(parsed.priority.as_deref(), Some("low"));
    }

    #[test]
    fn registry_falls_back_to_generic() {
        let registry = ParserRegistry::default();
        assert_eq!(registry.get("tautulli").name(), "tautulli");
        assert_eq!(registry.get("anything-else").name(), "generic");
        assert_eq!(registry.keys(), vec!["tautulli"]);
    }
}
