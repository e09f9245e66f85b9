use serde_json::Value;
use uuid::Uuid;

use super::{Content, Item, ItemKind};
use crate::{
    profile::parse_json_or_raw,
    protocol::{Entry, EntryComment, Request, Response, ResponseContent, iso_timestamp},
    search::SearchConfig,
};

/// Pre-resolved log entry. Every display field is stored verbatim.
#[derive(Debug, Clone)]
pub struct TransactionItem {
    id: Uuid,
    timestamp: i64,
    name: String,
    tag: String,
    duration: f64,
    params: Value,
    result: Value,
    meta: Value,
    is_error: bool,
}

impl TransactionItem {
    pub fn new(timestamp: i64, name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            name: name.into(),
            tag: tag.into(),
            duration: 0.0,
            params: Value::Null,
            result: Value::Null,
            meta: Value::Null,
            is_error: false,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = result;
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration.max(0.0);
        self
    }

    pub fn with_error(mut self, is_error: bool) -> Self {
        self.is_error = is_error;
        self
    }

    pub fn from_entry(entry: &Entry) -> Self {
        let params = entry
            .request
            .body_text()
            .map(parse_json_or_raw)
            .unwrap_or(Value::Null);
        let result = entry
            .response
            .content
            .text
            .as_deref()
            .map(parse_json_or_raw)
            .unwrap_or(Value::Null);

        Self::new(
            entry.started_at_millis(),
            entry.request.url.clone(),
            entry.request.method.clone(),
        )
        .with_params(params)
        .with_result(result)
        .with_meta(entry.meta.clone().unwrap_or(Value::Null))
        .with_duration(entry.time)
        .with_error(entry.response.status >= 500)
    }
}

impl Item for TransactionItem {
    fn id(&self) -> Uuid {
        self.id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn kind(&self) -> ItemKind {
        ItemKind::Transaction
    }

    fn should_show(&self, _config: Option<&SearchConfig>) -> bool {
        true
    }

    fn tag(&self) -> String {
        self.tag.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn params(&self) -> Value {
        self.params.clone()
    }

    fn content(&self) -> Content {
        Content::Plain(self.result.clone())
    }

    fn meta(&self) -> Value {
        self.meta.clone()
    }

    fn is_error(&self) -> bool {
        self.is_error
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn to_entry(&self) -> Entry {
        let mut request = Request::new(self.tag.clone(), self.name.clone());
        if !self.params.is_null() {
            request = request.with_body("application/json", self.params.to_string());
        }
        let status = if self.is_error { 500 } else { 200 };

        Entry {
            started_date_time: iso_timestamp(self.timestamp),
            time: self.duration,
            comment: EntryComment::Transaction.as_str().to_string(),
            request,
            response: Response::with_content(status, ResponseContent::json(&self.result)),
            meta: (!self.meta.is_null()).then(|| self.meta.clone()),
            ..Entry::default()
        }
    }
}
