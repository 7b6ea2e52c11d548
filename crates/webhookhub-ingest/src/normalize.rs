use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};
use webhookhub_types::models::{DraftRecord, Priority};

use crate::parser::{ParsedFields, ParserRegistry};

pub const DEFAULT_TITLE: &str = "Webhook Received";

/// Query-string overrides, keyed by field name.
pub type Overrides = HashMap<String, String>;

/// Applies the configured parser, query-string overrides and defaults.
///
/// Normalization never fails: every decodable body yields a draft with a
/// valid priority and non-null title/message.
#[derive(Clone, Default)]
pub struct Normalizer {
    registry: ParserRegistry,
}

impl Normalizer {
    pub fn new(registry: ParserRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    pub fn normalize(&self, slug: &str, payload: &Value, overrides: &Overrides) -> DraftRecord {
        let empty = Map::new();
        let body = payload.as_object().unwrap_or(&empty);

        let ParsedFields {
            title,
            message,
            priority,
            push,
            mut enrichment,
        } = self.registry.get(slug).parse(body);

        let pick = |keys: &[&str], parsed: Option<String>| -> Option<String> {
            keys.iter()
                .find_map(|k| overrides.get(*k).filter(|v| !v.trim().is_empty()).cloned())
                .or(parsed)
        };

        let title = pick(&["title"], title).unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let message = pick(&["message"], message).unwrap_or_default();
        let priority = Priority::lenient(pick(&["priority"], priority).as_deref());
        let push_enabled = pick(&["push"], push).as_deref().is_none_or(coerce_push);

        enrichment.player = pick(&["player"], enrichment.player);
        enrichment.user = pick(&["user"], enrichment.user);
        enrichment.ip_address = pick(&["ip_address"], enrichment.ip_address);
        enrichment.timestamp_text = pick(&["timestamp", "timestamp_text"], enrichment.timestamp_text);
        enrichment.image_url = pick(&["image_url"], enrichment.image_url);

        DraftRecord {
            channel_slug: slug.to_string(),
            title,
            message,
            priority,
            push_enabled,
            enrichment,
            source_ip: None,
            raw_payload: payload.clone(),
            received_headers: BTreeMap::new(),
        }
    }
}

/// `false`/`0` (any case) disable push; everything else enables it.
fn coerce_push(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "false" | "0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(body: Value, overrides: &[(&str, &str)]) -> DraftRecord {
        let overrides: Overrides = overrides
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Normalizer::default().normalize("general", &body, &overrides)
    }

    #[test]
    fn empty_object_gets_defaults() {
        let draft = normalize(json!({}), &[]);
        assert_eq!(draft.title, DEFAULT_TITLE);
        assert_eq!(draft.message, "");
        assert_eq!(draft.priority, Priority::Normal);
        assert!(draft.push_enabled);
        assert_eq!(draft.channel_slug, "general");
    }

    #[test]
    fn non_object_body_is_total_and_retained() {
        let body = json!(["a", "b"]);
        let draft = normalize(body.clone(), &[]);
        assert_eq!(draft.title, DEFAULT_TITLE);
        assert_eq!(draft.raw_payload, body);
    }

    #[test]
    fn alias_resolution_precedence() {
        assert_eq!(normalize(json!({"subject": "A"}), &[]).title, "A");
        assert_eq!(normalize(json!({"title": "A", "subject": "B"}), &[]).title, "A");
    }

    #[test]
    fn query_override_beats_body() {
        let draft = normalize(json!({"priority": "low"}), &[("priority", "high")]);
        assert_eq!(draft.priority, Priority::High);

        let draft = normalize(json!({"title": "body"}), &[("title", "query")]);
        assert_eq!(draft.title, "query");
    }

    #[test]
    fn blank_override_is_ignored() {
        let draft = normalize(json!({"title": "body"}), &[("title", "")]);
        assert_eq!(draft.title, "body");
    }

    #[test]
    fn invalid_priority_normalizes_to_normal() {
        assert_eq!(normalize(json!({"priority": "urgent"}), &[]).priority, Priority::Normal);
        assert_eq!(normalize(json!({"priority": "CRITICAL"}), &[]).priority, Priority::Critical);
        assert_eq!(normalize(json!({"priority": 5}), &[]).priority, Priority::Normal);
    }

    #[test]
    fn push_coercion() {
        assert!(!normalize(json!({"push": false}), &[]).push_enabled);
        assert!(!normalize(json!({"push": 0}), &[]).push_enabled);
        assert!(!normalize(json!({"push": "FALSE"}), &[]).push_enabled);
        assert!(normalize(json!({"push": "no"}), &[]).push_enabled);
        assert!(normalize(json!({"push": true}), &[]).push_enabled);
        assert!(!normalize(json!({}), &[("push", "0")]).push_enabled);
    }

    #[test]
    fn message_newlines_are_preserved() {
        let draft = normalize(json!({"message": "line1\nline2"}), &[]);
        assert_eq!(draft.message, "line1\nline2");
    }

    #[test]
    fn enrichment_overrides() {
        let draft = normalize(
            json!({"player": "TV", "image": "https://a/1.png"}),
            &[("player", "Phone"), ("timestamp", "noon")],
        );
        assert_eq!(draft.enrichment.player.as_deref(), Some("Phone"));
        assert_eq!(draft.enrichment.timestamp_text.as_deref(), Some("noon"));
        assert_eq!(draft.enrichment.image_url.as_deref(), Some("https://a/1.png"));
        assert_eq!(draft.enrichment.user, None);
    }

    #[test]
    fn unknown_fields_are_kept_in_raw_payload() {
        let body = json!({"title": "x", "custom": {"deep": [1, 2]}});
        let draft = normalize(body.clone(), &[]);
        assert_eq!(draft.raw_payload, body);
    }

    #[test]
    fn normalization_is_deterministic() {
        let body = json!({"title": "t", "severity": "high", "ip": "1.2.3.4"});
        assert_eq!(normalize(body.clone(), &[]), normalize(body, &[]));
    }

    #[test]
    fn registered_parser_is_used_for_its_slug() {
        let normalizer = Normalizer::default();
        let draft = normalizer.normalize(
            "tautulli",
            &json!({"action": "error", "subject": "Transcode"}),
            &Overrides::new(),
        );
        assert_eq!(draft.title, "error: Transcode");
        assert_eq!(draft.priority, Priority::High);
    }
}
