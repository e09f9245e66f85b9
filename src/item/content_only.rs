use serde_json::Value;
use uuid::Uuid;

use super::{Content, Item, ItemKind};
use crate::{
    profile::parse_json_or_raw,
    protocol::{Entry, EntryComment, Request, Response, ResponseContent, iso_timestamp, now_millis},
    search::SearchConfig,
};

/// Free-form status line such as "file opened" or a navigation marker.
#[derive(Debug, Clone)]
pub struct ContentOnlyItem {
    id: Uuid,
    timestamp: i64,
    tag: String,
    name: Option<String>,
    content: Value,
}

impl ContentOnlyItem {
    pub fn new(tag: impl Into<String>, content: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: now_millis(),
            tag: tag.into(),
            name: None,
            content,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn from_entry(entry: &Entry) -> Self {
        let text = entry.content_text();
        let content = if entry.mime_type().starts_with("text/plain") {
            Value::String(text.to_string())
        } else {
            parse_json_or_raw(text)
        };
        let name = match entry.discriminator() {
            EntryComment::WithName => Some(entry.request.url.clone()),
            _ => None,
        };

        Self {
            id: Uuid::new_v4(),
            timestamp: entry.started_at_millis(),
            tag: entry.request.method.clone(),
            name,
            content,
        }
    }
}

impl Item for ContentOnlyItem {
    fn id(&self) -> Uuid {
        self.id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn kind(&self) -> ItemKind {
        ItemKind::ContentOnly
    }

    fn should_show(&self, _config: Option<&SearchConfig>) -> bool {
        true
    }

    fn tag(&self) -> String {
        self.tag.clone()
    }

    fn name(&self) -> String {
        self.name.clone().unwrap_or_default()
    }

    fn params(&self) -> Value {
        self.content.clone()
    }

    fn content(&self) -> Content {
        Content::Plain(self.content.clone())
    }

    fn meta(&self) -> Value {
        Value::Null
    }

    fn is_error(&self) -> bool {
        false
    }

    fn duration(&self) -> f64 {
        0.0
    }

    fn to_entry(&self) -> Entry {
        let (comment, url) = match &self.name {
            Some(name) => (EntryComment::WithName, name.clone()),
            None => (EntryComment::ContentOnly, String::new()),
        };
        let content = match &self.content {
            Value::String(text) => ResponseContent::text("text/plain", text.clone()),
            other => ResponseContent::json(other),
        };

        Entry {
            started_date_time: iso_timestamp(self.timestamp),
            time: 0.0,
            comment: comment.as_str().to_string(),
            request: Request::new(self.tag.clone(), url),
            response: Response::with_content(200, content),
            ..Entry::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_content_stays_a_string() {
        let item = ContentOnlyItem::new("Log", json!("{\"looks\":\"like json\"}"));
        let restored = ContentOnlyItem::from_entry(&item.to_entry());
        assert_eq!(restored.params(), json!("{\"looks\":\"like json\"}"));
    }

    #[test]
    fn name_selects_with_name_discriminator() {
        let plain = ContentOnlyItem::new("File", json!({ "path": "/a" }));
        assert_eq!(plain.to_entry().comment, "ContentOnly");
        assert_eq!(plain.name(), "");

        let named = plain.clone().with_name("opened");
        let entry = named.to_entry();
        assert_eq!(entry.comment, "WithName");
        assert_eq!(ContentOnlyItem::from_entry(&entry).name(), "opened");
    }

    #[test]
    fn never_filtered_or_failed() {
        let item = ContentOnlyItem::new("Navigation", json!("https://x.dev"));
        assert!(item.should_show(Some(&SearchConfig::default().with_filter("zzz"))));
        assert!(!item.is_error());
        assert_eq!(item.duration(), 0.0);
        assert_eq!(item.params(), item.result());
    }
}
