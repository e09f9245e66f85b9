use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use url::Url;

pub const HAR_VERSION: &str = "1.2";

const BODY_METHODS: &[&str] = &["POST", "PUT", "PATCH", "DELETE"];

/// Top-level HAR document: `{ "log": { ... } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarFile {
    pub log: HarLog,
}

impl HarFile {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self {
            log: HarLog::new(entries),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarLog {
    #[serde(default = "default_har_version")]
    pub version: String,
    #[serde(default)]
    pub creator: Creator,
    #[serde(default)]
    pub comment: String,
    pub entries: Vec<Entry>,
}

impl HarLog {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self {
            version: HAR_VERSION.to_string(),
            creator: Creator {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            comment: String::new(),
            entries,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Creator {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// One interchange record. Network items store the record verbatim; the other
/// item variants encode themselves into the same shape and mark it through
/// `comment`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(default)]
    pub started_date_time: String,
    #[serde(default = "unknown_time")]
    pub time: f64,
    #[serde(default)]
    pub comment: String,
    pub request: Request,
    #[serde(default)]
    pub response: Response,
    #[serde(default)]
    pub timings: BTreeMap<String, Value>,
    #[serde(
        default,
        rename = "serverIPAddress",
        skip_serializing_if = "Option::is_none"
    )]
    pub server_ip_address: Option<String>,
    #[serde(default, rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Entry {
    pub fn discriminator(&self) -> EntryComment {
        EntryComment::from_comment(&self.comment)
    }

    pub fn started_at_millis(&self) -> i64 {
        epoch_millis(&self.started_date_time)
    }

    /// Decoded response body, or the empty string when the record has none.
    pub fn content_text(&self) -> &str {
        self.response.content.text.as_deref().unwrap_or("")
    }

    pub fn mime_type(&self) -> &str {
        self.response.content.mime_type.as_str()
    }

    pub fn pending_key(&self) -> String {
        pending_key(&self.request.method, &self.request.url)
    }

    pub fn request_key(&self) -> String {
        request_key(
            &self.request.method,
            &self.request.url,
            self.request.body_text(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryComment {
    Network,
    ContentOnly,
    WithName,
    Transaction,
    WebSocket,
    Pending,
}

impl EntryComment {
    pub fn from_comment(comment: &str) -> Self {
        match comment {
            "ContentOnly" => Self::ContentOnly,
            "WithName" => Self::WithName,
            "Transaction" => Self::Transaction,
            "WebSocket" => Self::WebSocket,
            "Pending" => Self::Pending,
            _ => Self::Network,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "",
            Self::ContentOnly => "ContentOnly",
            Self::WithName => "WithName",
            Self::Transaction => "Transaction",
            Self::WebSocket => "WebSocket",
            Self::Pending => "Pending",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub method: String,
    pub url: String,
    #[serde(default = "default_http_version")]
    pub http_version: String,
    #[serde(default)]
    pub headers: Vec<NameValue>,
    #[serde(default)]
    pub query_string: Vec<NameValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<PostData>,
    #[serde(default = "unknown_size")]
    pub headers_size: i64,
    #[serde(default = "unknown_size")]
    pub body_size: i64,
}

impl Request {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            http_version: default_http_version(),
            headers: Vec::new(),
            query_string: Vec::new(),
            post_data: None,
            headers_size: unknown_size(),
            body_size: unknown_size(),
        }
    }

    pub fn with_body(mut self, mime_type: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        self.body_size = text.len() as i64;
        self.post_data = Some(PostData {
            mime_type: mime_type.into(),
            text,
        });
        self
    }

    pub fn body_text(&self) -> Option<&str> {
        self.post_data.as_ref().map(|body| body.text.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub status_text: String,
    #[serde(default = "default_http_version")]
    pub http_version: String,
    #[serde(default)]
    pub headers: Vec<NameValue>,
    #[serde(default)]
    pub content: ResponseContent,
    #[serde(default, rename = "redirectURL")]
    pub redirect_url: String,
    #[serde(default = "unknown_size")]
    pub headers_size: i64,
    #[serde(default = "unknown_size")]
    pub body_size: i64,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 0,
            status_text: String::new(),
            http_version: default_http_version(),
            headers: Vec::new(),
            content: ResponseContent::default(),
            redirect_url: String::new(),
            headers_size: unknown_size(),
            body_size: unknown_size(),
        }
    }
}

impl Response {
    pub fn with_content(status: i64, content: ResponseContent) -> Self {
        Self {
            status,
            body_size: content.size,
            content,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseContent {
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

impl ResponseContent {
    pub fn text(mime_type: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            size: text.len() as i64,
            mime_type: mime_type.into(),
            text: Some(text),
            encoding: None,
        }
    }

    pub fn json(value: &Value) -> Self {
        Self::text("application/json", value.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValue {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostData {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub text: String,
}

/// Announcement that a request left the page but has not completed yet.
/// `id` correlates with the interception layer, not with item ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAnnouncement {
    pub id: String,
    pub timestamp: i64,
    pub request: Request,
}

impl PendingAnnouncement {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSocketFrame {
    #[serde(rename = "type", default)]
    pub kind: FrameKind,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub params: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    Sent,
    Received,
    Other(String),
}

impl Default for FrameKind {
    fn default() -> Self {
        Self::Other("message".to_string())
    }
}

impl FrameKind {
    pub fn parse(input: &str) -> Self {
        match input {
            "sent" | "send" => Self::Sent,
            "received" | "receive" => Self::Received,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Sent => "sent",
            Self::Received => "received",
            Self::Other(kind) => kind.as_str(),
        }
    }
}

impl<'de> Deserialize<'de> for FrameKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let input = String::deserialize(deserializer)?;
        Ok(Self::parse(&input))
    }
}

impl Serialize for FrameKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationEvent {
    pub url: String,
    #[serde(default)]
    pub preserve: bool,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// `"{METHOD}:{url}:{bodyHash}"`. The hash is only present for methods that
/// may carry a body, so identical POSTs with different payloads differ.
pub fn request_key(method: &str, url: &str, body: Option<&str>) -> String {
    let method = method.to_ascii_uppercase();
    let hash = match body {
        Some(body) if BODY_METHODS.contains(&method.as_str()) => hash_body(body),
        _ => String::new(),
    };
    format!("{}:{}:{}", method, url, hash)
}

pub fn hash_body(body: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(body.as_bytes()));
    digest[..16].to_string()
}

/// Key used to pair pending announcements with completions.
pub fn pending_key(method: &str, url: &str) -> String {
    format!("{}:{}", method.to_ascii_uppercase(), url)
}

/// Path component of an absolute URL, or the input when it does not parse.
pub fn url_path(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        Err(_) => raw.to_string(),
    }
}

pub fn epoch_millis(iso: &str) -> i64 {
    DateTime::parse_from_rfc3339(iso)
        .map(|time| time.timestamp_millis())
        .unwrap_or(0)
}

pub fn iso_timestamp(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn default_har_version() -> String {
    HAR_VERSION.to_string()
}

fn default_http_version() -> String {
    "HTTP/1.1".to_string()
}

fn unknown_size() -> i64 {
    -1
}

fn unknown_time() -> f64 {
    -1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entry_with_missing_optional_fields() {
        let raw = r#"
        {
            "startedDateTime": "2024-05-01T10:00:00.000Z",
            "time": 42.5,
            "request": {
                "method": "POST",
                "url": "https://api.example.com/rpc",
                "postData": { "mimeType": "application/json", "text": "{}" }
            },
            "response": {
                "status": 200,
                "content": { "mimeType": "application/json", "text": "{\"ok\":true}" }
            },
            "timings": { "send": 1, "wait": 30.5, "receive": 11 }
        }
        "#;

        let entry: Entry = serde_json::from_str(raw).expect("entry should parse");

        assert_eq!(entry.discriminator(), EntryComment::Network);
        assert_eq!(entry.request.http_version, "HTTP/1.1");
        assert_eq!(entry.request.body_text(), Some("{}"));
        assert_eq!(entry.content_text(), "{\"ok\":true}");
        assert_eq!(entry.mime_type(), "application/json");
        assert_eq!(entry.started_at_millis(), 1_714_557_600_000);
        assert_eq!(entry.pending_key(), "POST:https://api.example.com/rpc");
    }

    #[test]
    fn log_without_entries_is_rejected() {
        let raw = r#"{ "log": { "version": "1.2", "creator": { "name": "x", "version": "1" } } }"#;
        assert!(serde_json::from_str::<HarFile>(raw).is_err());
    }

    #[test]
    fn serializes_har_field_names() {
        let mut entry = Entry {
            request: Request::new("GET", "https://example.com/"),
            server_ip_address: Some("10.0.0.1".into()),
            ..Entry::default()
        };
        entry.response.redirect_url = "https://example.com/next".into();

        let value = serde_json::to_value(HarFile::new(vec![entry])).expect("serializes");
        let first = &value["log"]["entries"][0];

        assert_eq!(value["log"]["version"], "1.2");
        assert_eq!(value["log"]["creator"]["name"], env!("CARGO_PKG_NAME"));
        assert_eq!(first["serverIPAddress"], "10.0.0.1");
        assert_eq!(first["response"]["redirectURL"], "https://example.com/next");
        assert!(first.get("_meta").is_none());
    }

    #[test]
    fn request_key_hashes_bodies_only_for_body_methods() {
        let get = request_key("get", "https://example.com/a", Some("ignored"));
        assert_eq!(get, "GET:https://example.com/a:");

        let first = request_key("post", "https://example.com/a", Some("{\"n\":1}"));
        let second = request_key("POST", "https://example.com/a", Some("{\"n\":2}"));
        let repeat = request_key("POST", "https://example.com/a", Some("{\"n\":1}"));

        assert!(first.starts_with("POST:https://example.com/a:"));
        assert_ne!(first, second);
        assert_eq!(first, repeat);
        assert_eq!(first.rsplit(':').next().map(str::len), Some(16));
    }

    #[test]
    fn malformed_pending_announcement_is_an_error() {
        assert!(PendingAnnouncement::parse("{ not json").is_err());
        assert!(PendingAnnouncement::parse(r#"{ "id": "1" }"#).is_err());

        let parsed = PendingAnnouncement::parse(
            r#"{ "id": "req-1", "timestamp": 1000, "request": { "method": "GET", "url": "https://x.dev/" } }"#,
        )
        .expect("announcement should parse");
        assert_eq!(parsed.id, "req-1");
        assert_eq!(parsed.request.method, "GET");
    }

    #[test]
    fn preserves_unknown_frame_kinds() {
        let frame: WebSocketFrame =
            serde_json::from_str(r#"{ "type": "ping", "params": "1" }"#).expect("frame parses");
        assert_eq!(frame.kind, FrameKind::Other("ping".into()));

        let frame: WebSocketFrame =
            serde_json::from_str(r#"{ "type": "received", "result": "{}" }"#).expect("frame parses");
        assert_eq!(frame.kind, FrameKind::Received);
        assert_eq!(
            serde_json::to_value(&frame).expect("serializes")["type"],
            "received"
        );
    }

    #[test]
    fn iso_timestamps_round_trip() {
        let iso = iso_timestamp(1_714_557_600_123);
        assert_eq!(iso, "2024-05-01T10:00:00.123Z");
        assert_eq!(epoch_millis(&iso), 1_714_557_600_123);
        assert_eq!(epoch_millis("yesterday"), 0);
    }
}
