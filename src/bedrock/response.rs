//! Decoding of complete (non-streaming) model responses.

use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct ResponseDocument {
    #[serde(default)]
    content: Option<ContentList>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentList {
    Blocks(Vec<ContentBlock>),
    Other(IgnoredAny),
}

/// One element of `content`. Only maps can carry text; anything else lands
/// in `Other` and is skipped.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentBlock {
    Map(Map<String, Value>),
    Other(IgnoredAny),
}

impl ContentBlock {
    fn text(&self) -> Option<&str> {
        match self {
            ContentBlock::Map(map) => map.get("text").and_then(Value::as_str),
            ContentBlock::Other(_) => None,
        }
    }
}

/// Concatenate the text blocks of a response body, in order.
pub fn decode_response(body: &[u8]) -> Result<String> {
    let document: ResponseDocument = serde_json::from_slice(body)
        .map_err(|e| Error::MalformedResponse(format!("invalid JSON body: {}", e)))?;

    let blocks = match document.content {
        Some(ContentList::Blocks(blocks)) if !blocks.is_empty() => blocks,
        Some(ContentList::Blocks(_)) => {
            return Err(Error::MalformedResponse("empty content list".to_string()))
        }
        Some(ContentList::Other(_)) => {
            return Err(Error::MalformedResponse("content is not a list".to_string()))
        }
        None => return Err(Error::MalformedResponse("missing content".to_string())),
    };

    let mut result = String::new();
    for block in &blocks {
        match block.text() {
            Some(text) => result.push_str(text),
            None => tracing::debug!("skipping content block without text"),
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concatenates_in_order() {
        let body = br#"{"content":[{"text":"fn "},{"text":"main(){}"}]}"#;
        assert_eq!(decode_response(body).unwrap(), "fn main(){}");
    }

    #[test]
    fn test_skips_blocks_without_text() {
        let body = br#"{
            "id": "msg_1",
            "content": [
                {"type": "text", "text": "a"},
                {"type": "tool_use", "id": "t1"},
                {"text": 42},
                "loose string",
                null,
                {"type": "text", "text": "b"}
            ],
            "stop_reason": "end_turn"
        }"#;
        assert_eq!(decode_response(body).unwrap(), "ab");
    }

    #[test]
    fn test_array_blocks_carry_no_text() {
        let body = br#"{"content":[["x"],{"text":"y"}]}"#;
        assert_eq!(decode_response(body).unwrap(), "y");
    }

    #[test]
    fn test_no_text_blocks_yields_empty_string() {
        let body = br#"{"content":[{"type":"tool_use"}]}"#;
        assert_eq!(decode_response(body).unwrap(), "");
    }

    #[test]
    fn test_empty_content_is_malformed() {
        let err = decode_response(br#"{"content":[]}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_missing_content_is_malformed() {
        let err = decode_response(br#"{"stop_reason":"end_turn"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_non_list_content_is_malformed() {
        let err = decode_response(br#"{"content":"hello"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = decode_response(b"not json").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }
}
