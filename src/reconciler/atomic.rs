//! Single JSON envelope replies

use crate::error::{WidgetError, WidgetResult};
use serde_json::Value;

/// Text and optional thread identity decoded from one JSON reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomicReply {
    pub content: String,
    pub thread_id: Option<String>,
}

/// Decode `{"message"?, "response"?, "error"?, "threadId"?}`.
///
/// `message` is preferred over `response`; an empty string in one falls
/// through to the other. A reply with neither as a string is malformed.
pub fn resolve_atomic(body: &[u8]) -> WidgetResult<AtomicReply> {
    let value: Value = serde_json::from_slice(body)?;
    let envelope = value.as_object().ok_or_else(|| {
        WidgetError::MalformedResponse(format!("expected a JSON object, got {}", kind(&value)))
    })?;

    let text_field = |name: &str| envelope.get(name).and_then(Value::as_str);
    let message = text_field("message");
    let response = text_field("response");

    let content = match (message, response) {
        (Some(m), _) if !m.is_empty() => m,
        (_, Some(r)) if !r.is_empty() => r,
        (Some(m), _) => m,
        (None, Some(r)) => r,
        (None, None) => {
            let detail = match text_field("error") {
                Some(error) => format!("reply has no message text (server error: {})", error),
                None => "reply has no `message` or `response` string".to_string(),
            };
            return Err(WidgetError::MalformedResponse(detail));
        }
    };

    let thread_id = text_field("threadId")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    Ok(AtomicReply {
        content: content.to_string(),
        thread_id,
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_field_is_used() {
        let reply = resolve_atomic(br#"{"message": "hi"}"#).unwrap();
        assert_eq!(reply.content, "hi");
        assert_eq!(reply.thread_id, None);
    }

    #[test]
    fn message_wins_over_response() {
        let reply = resolve_atomic(br#"{"message": "a", "response": "b"}"#).unwrap();
        assert_eq!(reply.content, "a");
    }

    #[test]
    fn response_is_the_fallback() {
        let reply = resolve_atomic(br#"{"response": "b"}"#).unwrap();
        assert_eq!(reply.content, "b");

        let reply = resolve_atomic(br#"{"message": "", "response": "b"}"#).unwrap();
        assert_eq!(reply.content, "b");
    }

    #[test]
    fn non_string_fields_are_malformed() {
        assert!(matches!(
            resolve_atomic(br#"{"threadId": 123}"#),
            Err(WidgetError::MalformedResponse(_))
        ));
        assert!(matches!(
            resolve_atomic(br#"{"message": 5}"#),
            Err(WidgetError::MalformedResponse(_))
        ));
        assert!(matches!(
            resolve_atomic(br#"["hi"]"#),
            Err(WidgetError::MalformedResponse(_))
        ));
        assert!(matches!(
            resolve_atomic(b"plain text"),
            Err(WidgetError::MalformedResponse(_))
        ));
    }

    #[test]
    fn server_error_text_is_reported() {
        let err = resolve_atomic(br#"{"error": "quota exceeded"}"#).unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn string_thread_id_is_picked_up() {
        let reply = resolve_atomic(br#"{"message": "hi", "threadId": "t9"}"#).unwrap();
        assert_eq!(reply.thread_id.as_deref(), Some("t9"));

        let reply = resolve_atomic(br#"{"message": "hi", "threadId": 9}"#).unwrap();
        assert_eq!(reply.thread_id, None);
    }
}
