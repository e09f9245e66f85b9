use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::{Content, Item, ItemKind};
use crate::{
    profile::phoenix::PhoenixFrame,
    protocol::{
        Entry, EntryComment, FrameKind, Request, Response, ResponseContent, WebSocketFrame,
        iso_timestamp, now_millis,
    },
    search::SearchConfig,
};

const GENERIC_TAG: &str = "WS";

/// One WebSocket frame. Display fields are fixed at construction, either by
/// the channel-frame decoder or by generic JSON parsing.
#[derive(Debug, Clone)]
pub struct WebSocketItem {
    id: Uuid,
    timestamp: i64,
    kind: FrameKind,
    url: String,
    raw_params: Option<String>,
    raw_result: Option<String>,
    computed: Computed,
}

#[derive(Debug, Clone)]
struct Computed {
    name: String,
    tag: String,
    params: Value,
    result: Value,
    meta: Value,
    is_error: bool,
}

impl WebSocketItem {
    pub fn new(frame: WebSocketFrame) -> Self {
        let url = frame.url.unwrap_or_default();
        let computed = compute(&frame.kind, &url, frame.params.as_deref(), frame.result.as_deref());

        Self {
            id: Uuid::new_v4(),
            timestamp: frame.timestamp.unwrap_or_else(now_millis),
            kind: frame.kind,
            url,
            raw_params: frame.params,
            raw_result: frame.result,
            computed,
        }
    }

    pub fn from_entry(entry: &Entry) -> Self {
        Self::new(WebSocketFrame {
            kind: FrameKind::parse(&entry.request.method),
            timestamp: Some(entry.started_at_millis()),
            url: Some(entry.request.url.clone()),
            params: entry.request.body_text().map(str::to_string),
            result: entry.response.content.text.clone(),
        })
    }

    pub fn frame_kind(&self) -> &FrameKind {
        &self.kind
    }
}

fn compute(kind: &FrameKind, url: &str, params: Option<&str>, result: Option<&str>) -> Computed {
    let frames: Vec<PhoenixFrame> = [params, result]
        .into_iter()
        .flatten()
        .filter_map(PhoenixFrame::parse)
        .collect();

    if let Some(frame) = frames.first() {
        let mut meta = frame.meta();
        if let Value::Object(map) = &mut meta {
            map.insert("type".into(), Value::String(kind.as_str().to_string()));
            map.insert("url".into(), Value::String(url.to_string()));
        }

        return Computed {
            name: frame.name(),
            tag: frame.tag(),
            params: frame.params(),
            result: frame.result(),
            meta,
            is_error: frames.iter().any(PhoenixFrame::is_error),
        };
    }

    Computed {
        name: kind.as_str().to_string(),
        tag: GENERIC_TAG.to_string(),
        params: parse_payload(params, "params"),
        result: parse_payload(result, "result"),
        meta: json!({ "type": kind.as_str(), "url": url }),
        is_error: false,
    }
}

/// JSON when it parses, unwrapping a lone `{envelope: ...}` key; raw text is
/// kept under `raw`.
fn parse_payload(raw: Option<&str>, envelope: &str) -> Value {
    let Some(raw) = raw else {
        return Value::Null;
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(mut map)) if map.len() == 1 && map.contains_key(envelope) => {
            map.remove(envelope).unwrap_or(Value::Null)
        }
        Ok(value) => value,
        Err(_) => {
            let mut wrapped = Map::new();
            wrapped.insert("raw".into(), Value::String(raw.to_string()));
            Value::Object(wrapped)
        }
    }
}

impl Item for WebSocketItem {
    fn id(&self) -> Uuid {
        self.id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn kind(&self) -> ItemKind {
        ItemKind::WebSocket
    }

    fn should_show(&self, config: Option<&SearchConfig>) -> bool {
        match config {
            Some(config) => config.accepts(
                &[self.url.as_str(), self.computed.name.as_str()],
                &self.computed.params,
                &self.content(),
            ),
            None => true,
        }
    }

    fn tag(&self) -> String {
        self.computed.tag.clone()
    }

    fn name(&self) -> String {
        self.computed.name.clone()
    }

    fn params(&self) -> Value {
        self.computed.params.clone()
    }

    fn content(&self) -> Content {
        Content::Plain(self.computed.result.clone())
    }

    fn meta(&self) -> Value {
        self.computed.meta.clone()
    }

    fn is_error(&self) -> bool {
        self.computed.is_error
    }

    fn duration(&self) -> f64 {
        0.0
    }

    fn to_entry(&self) -> Entry {
        let mut request = Request::new(self.kind.as_str(), self.url.clone());
        if let Some(params) = &self.raw_params {
            request = request.with_body("text/plain", params.clone());
        }
        let content = match &self.raw_result {
            Some(result) => ResponseContent::text("text/plain", result.clone()),
            None => ResponseContent::default(),
        };

        Entry {
            started_date_time: iso_timestamp(self.timestamp),
            time: 0.0,
            comment: EntryComment::WebSocket.as_str().to_string(),
            request,
            response: Response::with_content(101, content),
            ..Entry::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Marker;
    use std::sync::Arc;

    fn frame(kind: FrameKind, params: Option<&str>, result: Option<&str>) -> WebSocketFrame {
        WebSocketFrame {
            kind,
            timestamp: Some(1_000),
            url: Some("wss://x.dev/socket/websocket".into()),
            params: params.map(str::to_string),
            result: result.map(str::to_string),
        }
    }

    #[test]
    fn channel_frames_use_topic_and_event() {
        let item = WebSocketItem::new(frame(
            FrameKind::Sent,
            Some(r#"["1","2","room:lobby","new_msg",{"body":"hi"}]"#),
            None,
        ));

        assert_eq!(item.name(), "new_msg");
        assert_eq!(item.tag(), "room:lobby");
        assert_eq!(item.params(), json!({ "body": "hi" }));
        assert_eq!(item.meta()["type"], "sent");
        assert_eq!(item.meta()["topic"], "room:lobby");
        assert!(!item.is_error());
    }

    #[test]
    fn channel_error_replies_are_errors() {
        let item = WebSocketItem::new(frame(
            FrameKind::Received,
            None,
            Some(r#"["1","2","room:lobby","phx_reply",{"status":"error","response":{"reason":"denied"}}]"#),
        ));

        assert!(item.is_error());
        assert_eq!(item.result(), json!({ "reason": "denied" }));
    }

    #[test]
    fn generic_frames_unwrap_envelopes_and_keep_raw_text() {
        let item = WebSocketItem::new(frame(
            FrameKind::Sent,
            Some(r#"{"params":{"channel":"ticker"}}"#),
            Some("pong"),
        ));

        assert_eq!(item.tag(), "WS");
        assert_eq!(item.name(), "sent");
        assert_eq!(item.params(), json!({ "channel": "ticker" }));
        assert_eq!(item.result(), json!({ "raw": "pong" }));

        let two_keys = WebSocketItem::new(frame(
            FrameKind::Received,
            None,
            Some(r#"{"result":1,"id":2}"#),
        ));
        assert_eq!(two_keys.result(), json!({ "result": 1, "id": 2 }));
        assert_eq!(two_keys.params(), Value::Null);
    }

    #[test]
    fn search_reaches_frame_payloads() {
        let item = WebSocketItem::new(frame(
            FrameKind::Received,
            None,
            Some(r#"{"price":{"symbol":"BTC"}}"#),
        ));
        let hit = SearchConfig::default().with_search("btc", Arc::new(Marker::new("btc", false)));
        let miss = SearchConfig::default().with_search("eth", Arc::new(Marker::new("eth", false)));

        assert!(item.should_show(Some(&hit)));
        assert!(!item.should_show(Some(&miss)));
    }

    #[test]
    fn round_trips_through_entry() {
        let item = WebSocketItem::new(frame(
            FrameKind::Other("ping".into()),
            Some("1"),
            Some(r#"["1","2","phoenix","phx_reply",{"status":"ok","response":{}}]"#),
        ));
        let restored = WebSocketItem::from_entry(&item.to_entry());

        assert_eq!(restored.frame_kind(), &FrameKind::Other("ping".into()));
        assert_eq!(restored.to_entry().request.url, item.to_entry().request.url);
        assert_eq!(restored.name(), item.name());
        assert_eq!(restored.tag(), "phoenix");
        assert_eq!(restored.params(), item.params());
        assert_eq!(restored.timestamp(), item.timestamp());
    }
}
