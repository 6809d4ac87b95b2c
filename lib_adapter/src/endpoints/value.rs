use bytes::Bytes;
use serde_json::Value;

use crate::topics::TopicType;

/// # Topic Value
///
/// A decoded endpoint response, ready to be published.
#[derive(Debug, Clone, PartialEq)]
pub enum TopicValue {
    /// A parsed JSON document.
    Json(Value),
    /// Decoded text.
    String(String),
    /// The raw body.
    Binary(Bytes),
}

impl TopicValue {
    /// The topic type able to hold this value.
    pub fn topic_type(&self) -> TopicType {
        match self {
            TopicValue::Json(_) => TopicType::Json,
            TopicValue::String(_) => TopicType::String,
            TopicValue::Binary(_) => TopicType::Binary,
        }
    }

    /// Approximate encoded size in bytes, reported to the publication listeners.
    pub fn encoded_len(&self) -> usize {
        match self {
            TopicValue::Json(value) => value.to_string().len(),
            TopicValue::String(text) => text.len(),
            TopicValue::Binary(bytes) => bytes.len(),
        }
    }
}

/// Extracts the lower-cased `charset` parameter of a content type.
pub(crate) fn charset_of(content_type: Option<&str>) -> Option<String> {
    content_type?
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches('"').to_ascii_lowercase())
}

/// Decodes a body as text using the response charset.
///
/// Without a charset the body is read as UTF-8, falling back to ISO-8859-1
/// when it is not valid UTF-8.
pub(crate) fn decode_text(body: &[u8], content_type: Option<&str>) -> Result<String, String> {
    match charset_of(content_type).as_deref() {
        None => Ok(match std::str::from_utf8(body) {
            Ok(text) => text.to_string(),
            Err(_) => latin1(body),
        }),
        Some("utf-8") | Some("utf8") => {
            String::from_utf8(body.to_vec()).map_err(|e| format!("invalid UTF-8: {}", e))
        }
        Some("us-ascii") | Some("ascii") => {
            if body.is_ascii() {
                Ok(latin1(body))
            } else {
                Err("body is not US-ASCII".to_string())
            }
        }
        Some("iso-8859-1") | Some("latin1") | Some("latin-1") => Ok(latin1(body)),
        Some(other) => Err(format!("unsupported charset {}", other)),
    }
}

fn latin1(body: &[u8]) -> String {
    body.iter().map(|&b| b as char).collect()
}
