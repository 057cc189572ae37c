//! Pulling JSON out of free-form model output

use crate::error::ModelError;
use serde::de::{DeserializeOwned, IgnoredAny};

/// Locate the JSON document inside a model response
///
/// Handles fenced code blocks (```` ```json ````) and chatter before or
/// after the document. Returns the first complete JSON object or array,
/// or `None` when the response holds none.
#[must_use]
pub fn extract_json(response: &str) -> Option<&str> {
    json_documents(response).next()
}

/// Every complete JSON object or array in the response, in start order
///
/// A bracket that does not open a valid document (`[v2]`, `{draft}`) is
/// skipped, so chatter with brackets before the real document is harmless.
pub fn json_documents(response: &str) -> impl Iterator<Item = &str> {
    let body = strip_fence(response.trim());
    body.char_indices()
        .filter(|&(_, c)| matches!(c, '{' | '['))
        .filter_map(move |(start, _)| {
            let rest = &body[start..];
            let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<IgnoredAny>();
            match stream.next() {
                Some(Ok(_)) => Some(&rest[..stream.byte_offset()]),
                _ => None,
            }
        })
}

fn strip_fence(trimmed: &str) -> &str {
    match trimmed.find("```") {
        Some(open) => {
            let after_fence = &trimmed[open + 3..];
            let content_start = after_fence.find('\n').map_or(0, |i| i + 1);
            let content = &after_fence[content_start..];
            content.find("```").map_or(content, |close| &content[..close])
        }
        None => trimmed,
    }
}

/// Extract and deserialize the JSON document in a model response
///
/// Candidates are tried in start order and the first one matching `T`
/// wins.
///
/// # Errors
/// - `ModelError::EmptyResponse` for blank output
/// - `ModelError::Malformed` when no JSON is found or none matches `T`
pub fn parse_json<T: DeserializeOwned>(response: &str) -> Result<T, ModelError> {
    if response.trim().is_empty() {
        return Err(ModelError::EmptyResponse);
    }

    let mut first_error = None;
    for json in json_documents(response) {
        match serde_json::from_str(json) {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_error.get_or_insert_with(|| format!("{e}; response was: {}", preview(json)));
            }
        }
    }

    Err(ModelError::Malformed(first_error.unwrap_or_else(|| {
        format!("no JSON document in response: {}", preview(response))
    })))
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.len() <= LIMIT {
        return text.to_string();
    }
    let mut cut = LIMIT;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... ({} bytes)", &text[..cut], text.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Label {
        label: String,
    }

    #[test]
    fn bare_object() {
        assert_eq!(extract_json(r#"{"label": "Amount"}"#), Some(r#"{"label": "Amount"}"#));
    }

    #[test]
    fn object_with_chatter() {
        let text = "Sure! Here is the mapping:\n{\"label\": \"Amount\"}\nHope this helps.";
        assert_eq!(extract_json(text), Some("{\"label\": \"Amount\"}"));
    }

    #[test]
    fn fenced_block() {
        let text = "```json\n{\"label\": \"Amount\"}\n```";
        let parsed: Label = parse_json(text).unwrap();
        assert_eq!(parsed.label, "Amount");
    }

    #[test]
    fn array_before_object() {
        assert_eq!(extract_json(r#"[{"a": 1}]"#), Some(r#"[{"a": 1}]"#));
    }

    #[test]
    fn bracketed_chatter_before_object() {
        let text = r#"Plan [v2]: {"operations": [{"op": "chart"}]}"#;
        assert_eq!(extract_json(text), Some(r#"{"operations": [{"op": "chart"}]}"#));
    }

    #[test]
    fn trailing_chatter_with_braces() {
        let text = r#"{"label": "Amount"} (see {notes})"#;
        assert_eq!(extract_json(text), Some(r#"{"label": "Amount"}"#));
    }

    #[test]
    fn first_document_of_the_wrong_shape_is_skipped() {
        let text = r#"Columns [1, 2] then {"label": "Amount"}"#;
        let parsed: Label = parse_json(text).unwrap();
        assert_eq!(parsed.label, "Amount");
    }

    #[test]
    fn no_json() {
        assert_eq!(extract_json("I cannot help with that."), None);
        let err = parse_json::<Label>("I cannot help with that.").unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn blank_is_empty_response() {
        assert_eq!(parse_json::<Label>("   ").unwrap_err(), ModelError::EmptyResponse);
    }

    #[test]
    fn wrong_shape_is_malformed() {
        let err = parse_json::<Label>(r#"{"name": "Amount"}"#).unwrap_err();
        assert!(matches!(err, ModelError::Malformed(_)));
    }
}
