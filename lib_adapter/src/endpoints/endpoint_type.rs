use std::fmt;

use serde::Serialize;

use super::value::{decode_text, TopicValue};
use crate::error::AdapterError;
use crate::retrieve::EndpointResponse;
use crate::topics::TopicType;

/// # Endpoint Type
///
/// How an endpoint's responses are interpreted and which kind of topic they
/// are published to.
///
/// | Type        | Identifiers                                  | Topic type |
/// |-------------|----------------------------------------------|------------|
/// | `Json`      | `json`, `application/json`, `text/json`      | JSON       |
/// | `PlainText` | `string`, `text/plain`                       | String     |
/// | `Binary`    | `binary`, `application/octet-stream`         | Binary     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EndpointType {
    /// JSON documents.
    Json,
    /// Text in any charset the decoder understands.
    PlainText,
    /// Anything; the body is published untouched.
    Binary,
}

impl EndpointType {
    /// Every type, in inference order. The first type able to handle a content
    /// type wins, so the most specific type comes first.
    pub const INFERENCE_ORDER: [EndpointType; 3] =
        [EndpointType::Json, EndpointType::PlainText, EndpointType::Binary];

    /// The identifiers a "produces" value may use to name this type.
    pub fn identifiers(self) -> &'static [&'static str] {
        match self {
            EndpointType::Json => &["json", "application/json", "text/json"],
            EndpointType::PlainText => &["string", "text/plain"],
            EndpointType::Binary => &["binary", "application/octet-stream"],
        }
    }

    /// The short name of the type.
    pub fn identifier(self) -> &'static str {
        self.identifiers()[0]
    }

    /// The broker topic type values of this endpoint type are published to.
    pub fn topic_type(self) -> TopicType {
        match self {
            EndpointType::Json => TopicType::Json,
            EndpointType::PlainText => TopicType::String,
            EndpointType::Binary => TopicType::Binary,
        }
    }

    /// Whether a response with the given content type can be decoded as this type.
    ///
    /// Parameters such as `charset` are ignored and media types compare
    /// case-insensitively.
    pub fn can_handle(self, content_type: &str) -> bool {
        let media_type = media_type(content_type);
        match self {
            EndpointType::Json => media_type == "application/json" || media_type == "text/json",
            EndpointType::PlainText => media_type == "text/plain" || EndpointType::Json.can_handle(content_type),
            EndpointType::Binary => true,
        }
    }

    /// Decodes a response body into a topic value.
    ///
    /// # Errors
    /// `AdapterError::DecodeFailed` when the body is not valid for this type or
    /// its charset is not supported.
    pub fn decode(self, response: &EndpointResponse) -> Result<TopicValue, AdapterError> {
        let failed = |detail: String| AdapterError::DecodeFailed {
            endpoint_type: self,
            detail,
        };

        match self {
            EndpointType::Json => {
                let text = decode_text(&response.body, response.content_type()).map_err(failed)?;
                serde_json::from_str(&text)
                    .map(TopicValue::Json)
                    .map_err(|e| failed(e.to_string()))
            }
            EndpointType::PlainText => decode_text(&response.body, response.content_type())
                .map(TopicValue::String)
                .map_err(failed),
            EndpointType::Binary => Ok(TopicValue::Binary(response.body.clone())),
        }
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// The lower-cased media type without parameters.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_accepts_everything_json_accepts() {
        for ct in ["application/json", "text/json", "application/json; charset=utf-8", "Text/JSON"] {
            assert!(EndpointType::Json.can_handle(ct), "{}", ct);
            assert!(EndpointType::PlainText.can_handle(ct), "{}", ct);
        }
        assert!(EndpointType::PlainText.can_handle("text/plain; charset=iso-8859-1"));
        assert!(!EndpointType::Json.can_handle("text/plain"));
        assert!(!EndpointType::PlainText.can_handle("image/png"));
        assert!(EndpointType::Binary.can_handle("image/png"));
        assert!(EndpointType::Binary.can_handle(""));
    }

    #[test]
    fn maps_to_topic_types() {
        assert_eq!(EndpointType::Json.topic_type(), TopicType::Json);
        assert_eq!(EndpointType::PlainText.topic_type(), TopicType::String);
        assert_eq!(EndpointType::Binary.topic_type(), TopicType::Binary);
        assert_eq!(EndpointType::PlainText.to_string(), "string");
    }

    #[test]
    fn decodes_json_bodies() {
        let response = EndpointResponse::ok(Some("application/json"), r#"{"a":1}"#);
        let value = EndpointType::Json.decode(&response).unwrap();
        assert_eq!(value, TopicValue::Json(serde_json::json!({ "a": 1 })));
    }

    #[test]
    fn malformed_json_is_a_decode_failure() {
        let response = EndpointResponse::ok(Some("application/json"), "{not json");
        let err = EndpointType::Json.decode(&response).unwrap_err();
        assert!(matches!(
            err,
            AdapterError::DecodeFailed {
                endpoint_type: EndpointType::Json,
                ..
            }
        ));
    }

    #[test]
    fn decodes_text_with_its_charset() {
        let response = EndpointResponse::ok(Some("text/plain; charset=ISO-8859-1"), vec![0x6e, 0x61, 0xef, 0x76, 0x65]);
        assert_eq!(
            EndpointType::PlainText.decode(&response).unwrap(),
            TopicValue::String("naïve".to_string())
        );
    }

    #[test]
    fn binary_keeps_the_body_untouched() {
        let body = vec![0u8, 159, 146, 150];
        let response = EndpointResponse::ok(None, body.clone());
        assert_eq!(
            EndpointType::Binary.decode(&response).unwrap(),
            TopicValue::Binary(body.into())
        );
    }
}
