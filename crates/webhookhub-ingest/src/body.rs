use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Decode a request body according to its content type.
///
/// JSON bodies must parse; form bodies become a flat object (last value wins
/// for repeated keys); anything else is wrapped as `{"raw": <text>}`. An empty
/// body is always an empty object.
pub fn decode_body(content_type: Option<&str>, body: &[u8]) -> Result<Value, DecodeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if mime == "application/json" || mime.ends_with("+json") {
        return Ok(serde_json::from_slice(body)?);
    }

    if mime == "application/x-www-form-urlencoded" {
        let fields = url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect::<Map<_, _>>();
        return Ok(Value::Object(fields));
    }

    let mut raw = Map::new();
    raw.insert(
        "raw".to_string(),
        Value::String(String::from_utf8_lossy(body).into_owned()),
    );
    Ok(Value::Object(raw))
}
