//! Phoenix channels v2 wire frames: `[join_ref, ref, topic, event, payload]`.
//!
//! Accessors live on [`PhoenixFrame`], which can only be built through
//! [`PhoenixFrame::parse`]; frames of any other shape never reach them.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};

static TOPIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(phoenix|[A-Za-z0-9_.\-]+:[^\s]*)$").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct PhoenixFrame {
    join_ref: Option<String>,
    reference: Option<String>,
    topic: String,
    event: String,
    payload: Value,
}

impl PhoenixFrame {
    pub fn parse(raw: &str) -> Option<Self> {
        let Ok(Value::Array(parts)) = serde_json::from_str::<Value>(raw) else {
            return None;
        };
        let [join_ref, reference, topic, event, payload]: [Value; 5] = parts.try_into().ok()?;

        let topic = topic.as_str().filter(|topic| TOPIC_RE.is_match(topic))?;
        let event = event.as_str()?;

        Some(Self {
            join_ref: ref_text(&join_ref),
            reference: ref_text(&reference),
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
        })
    }

    pub fn name(&self) -> String {
        self.event.clone()
    }

    pub fn tag(&self) -> String {
        self.topic.clone()
    }

    pub fn params(&self) -> Value {
        self.payload.clone()
    }

    /// Replies carry `{status, response}`; the response is the result.
    pub fn result(&self) -> Value {
        if self.is_reply() {
            if let Some(response) = self.payload.get("response") {
                return response.clone();
            }
        }
        self.payload.clone()
    }

    pub fn is_error(&self) -> bool {
        self.event == "phx_error" || (self.is_reply() && self.reply_status() == Some("error"))
    }

    pub fn meta(&self) -> Value {
        json!({
            "joinRef": self.join_ref,
            "ref": self.reference,
            "topic": self.topic,
            "event": self.event,
            "status": self.reply_status(),
        })
    }

    fn is_reply(&self) -> bool {
        self.event == "phx_reply"
    }

    fn reply_status(&self) -> Option<&str> {
        self.payload.get("status").and_then(Value::as_str)
    }
}

fn ref_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_match(raw: &str) -> bool {
        PhoenixFrame::parse(raw).is_some()
    }

    #[test]
    fn accepts_channel_frames() {
        let frame = PhoenixFrame::parse(r#"["3","4","room:lobby","new_msg",{"body":"hi"}]"#)
            .expect("valid frame");

        assert_eq!(frame.name(), "new_msg");
        assert_eq!(frame.tag(), "room:lobby");
        assert_eq!(frame.params(), json!({ "body": "hi" }));
        assert!(!frame.is_error());
        assert_eq!(frame.meta()["joinRef"], json!("3"));

        assert!(is_match(r#"[null,"1","phoenix","heartbeat",{}]"#));
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(!is_match(r#"["3","4","room:lobby","new_msg"]"#));
        assert!(!is_match(r#"["3","4","room:lobby","new_msg",{},1]"#));
        assert!(!is_match(r#"["3","4","no topic here","new_msg",{}]"#));
        assert!(!is_match(r#"["3","4",12,"new_msg",{}]"#));
        assert!(!is_match(r#"["3","4","room:lobby",null,{}]"#));
        assert!(!is_match(r#"{"topic":"room:lobby"}"#));
        assert!(!is_match("plain text"));
    }

    #[test]
    fn replies_unwrap_response_and_classify_errors() {
        let ok = PhoenixFrame::parse(
            r#"["3","5","room:lobby","phx_reply",{"status":"ok","response":{"id":9}}]"#,
        )
        .expect("valid frame");
        assert_eq!(ok.result(), json!({ "id": 9 }));
        assert!(!ok.is_error());
        assert_eq!(ok.meta()["status"], json!("ok"));

        let failed = PhoenixFrame::parse(
            r#"["3","6","room:lobby","phx_reply",{"status":"error","response":{"reason":"denied"}}]"#,
        )
        .expect("valid frame");
        assert!(failed.is_error());

        let crashed = PhoenixFrame::parse(r#"["3","3","room:lobby","phx_error",{}]"#)
            .expect("valid frame");
        assert!(crashed.is_error());
        assert_eq!(crashed.result(), json!({}));
    }
}
