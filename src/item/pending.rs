use serde_json::{Value, json};
use uuid::Uuid;

use super::{Content, Item, ItemKind};
use crate::{
    profile::request_params,
    protocol::{
        Entry, EntryComment, PendingAnnouncement, Request, iso_timestamp, now_millis,
        pending_key, url_path,
    },
    search::SearchConfig,
};

/// Placeholder for a request that started but has not completed.
#[derive(Debug, Clone)]
pub struct PendingItem {
    id: Uuid,
    request_id: String,
    timestamp: i64,
    request: Request,
}

impl PendingItem {
    pub fn new(announcement: PendingAnnouncement) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id: announcement.id,
            timestamp: announcement.timestamp,
            request: announcement.request,
        }
    }

    pub fn from_entry(entry: &Entry) -> Self {
        let request_id = entry
            .meta
            .as_ref()
            .and_then(|meta| meta.get("requestId"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Self {
            id: Uuid::new_v4(),
            request_id,
            timestamp: entry.started_at_millis(),
            request: entry.request.clone(),
        }
    }

    /// Correlation id assigned by the interception layer.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn method(&self) -> &str {
        &self.request.method
    }

    pub fn url(&self) -> &str {
        &self.request.url
    }

    pub fn pending_key(&self) -> String {
        pending_key(&self.request.method, &self.request.url)
    }
}

impl Item for PendingItem {
    fn id(&self) -> Uuid {
        self.id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn kind(&self) -> ItemKind {
        ItemKind::Pending
    }

    fn should_show(&self, config: Option<&SearchConfig>) -> bool {
        match config {
            Some(config) => config.accepts(
                &[self.request.url.as_str()],
                &self.params(),
                &Content::Plain(Value::Null),
            ),
            None => true,
        }
    }

    fn tag(&self) -> String {
        self.request.method.to_ascii_uppercase()
    }

    fn name(&self) -> String {
        url_path(&self.request.url)
    }

    fn params(&self) -> Value {
        request_params(&self.request)
    }

    fn content(&self) -> Content {
        Content::Plain(Value::Null)
    }

    fn meta(&self) -> Value {
        json!({
            "requestId": self.request_id,
            "method": self.request.method,
            "url": self.request.url,
            "headers": self.request.headers,
        })
    }

    fn is_error(&self) -> bool {
        false
    }

    fn duration(&self) -> f64 {
        (now_millis() - self.timestamp).max(0) as f64
    }

    fn to_entry(&self) -> Entry {
        Entry {
            started_date_time: iso_timestamp(self.timestamp),
            time: -1.0,
            comment: EntryComment::Pending.as_str().to_string(),
            request: self.request.clone(),
            meta: Some(json!({ "requestId": self.request_id })),
            ..Entry::default()
        }
    }
}
