//! Log items: one row of the log view each. Five variants share the [`Item`]
//! contract and serialize through the HAR [`Entry`] shape, tagged by
//! `comment` so an exported log can be rebuilt variant by variant.

mod content_only;
mod network;
mod pending;
mod transaction;
mod websocket;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    profile::ProfileRegistry,
    protocol::{Entry, EntryComment},
    search::SearchConfig,
};

pub use content_only::ContentOnlyItem;
pub use network::NetworkItem;
pub use pending::PendingItem;
pub use transaction::TransactionItem;
pub use websocket::WebSocketItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    Network,
    Pending,
    Transaction,
    ContentOnly,
    WebSocket,
}

impl ItemKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Pending => "pending",
            Self::Transaction => "transaction",
            Self::ContentOnly => "content",
            Self::WebSocket => "websocket",
        }
    }
}

/// Renderable media families that get the raw body instead of a value tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    Html,
    Xml,
}

impl MediaKind {
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let mime = mime_type.to_ascii_lowercase();
        if mime.starts_with("image/") {
            Some(Self::Image)
        } else if mime.starts_with("audio/") {
            Some(Self::Audio)
        } else if mime.starts_with("video/") {
            Some(Self::Video)
        } else if mime.contains("html") {
            Some(Self::Html)
        } else if mime.contains("xml") {
            Some(Self::Xml)
        } else {
            None
        }
    }
}

/// Result payload of an item. `Tagged` keeps the mime type and the raw body
/// next to the decoded value for media-aware rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Plain(Value),
    Tagged {
        mime_type: String,
        value: Value,
        raw: String,
    },
}

impl Content {
    pub fn for_mime(mime_type: &str, value: Value, raw: &str) -> Self {
        match MediaKind::from_mime(mime_type) {
            Some(_) => Self::Tagged {
                mime_type: mime_type.to_string(),
                value,
                raw: raw.to_string(),
            },
            None => Self::Plain(value),
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            Self::Plain(value) | Self::Tagged { value, .. } => value,
        }
    }

    pub fn mime_type(&self) -> Option<&str> {
        match self {
            Self::Plain(_) => None,
            Self::Tagged { mime_type, .. } => Some(mime_type),
        }
    }

    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::Plain(_) => None,
            Self::Tagged { raw, .. } => Some(raw),
        }
    }

    pub fn media_kind(&self) -> Option<MediaKind> {
        self.mime_type().and_then(MediaKind::from_mime)
    }
}

/// Contract shared by every item variant.
pub trait Item {
    fn id(&self) -> Uuid;

    /// Epoch milliseconds.
    fn timestamp(&self) -> i64;

    fn kind(&self) -> ItemKind;

    fn should_show(&self, config: Option<&SearchConfig>) -> bool;

    fn tag(&self) -> String;

    fn name(&self) -> String;

    fn params(&self) -> Value;

    fn content(&self) -> Content;

    fn result(&self) -> Value {
        self.content().value().clone()
    }

    fn meta(&self) -> Value;

    fn is_error(&self) -> bool;

    /// Milliseconds, never negative.
    fn duration(&self) -> f64;

    fn to_entry(&self) -> Entry;
}

#[derive(Debug)]
pub enum LogItem {
    Network(NetworkItem),
    Pending(PendingItem),
    Transaction(TransactionItem),
    ContentOnly(ContentOnlyItem),
    WebSocket(WebSocketItem),
}

macro_rules! delegate {
    ($self:ident, $item:ident => $body:expr) => {
        match $self {
            LogItem::Network($item) => $body,
            LogItem::Pending($item) => $body,
            LogItem::Transaction($item) => $body,
            LogItem::ContentOnly($item) => $body,
            LogItem::WebSocket($item) => $body,
        }
    };
}

impl Item for LogItem {
    fn id(&self) -> Uuid {
        delegate!(self, item => item.id())
    }

    fn timestamp(&self) -> i64 {
        delegate!(self, item => item.timestamp())
    }

    fn kind(&self) -> ItemKind {
        delegate!(self, item => item.kind())
    }

    fn should_show(&self, config: Option<&SearchConfig>) -> bool {
        delegate!(self, item => item.should_show(config))
    }

    fn tag(&self) -> String {
        delegate!(self, item => item.tag())
    }

    fn name(&self) -> String {
        delegate!(self, item => item.name())
    }

    fn params(&self) -> Value {
        delegate!(self, item => item.params())
    }

    fn content(&self) -> Content {
        delegate!(self, item => item.content())
    }

    fn result(&self) -> Value {
        delegate!(self, item => item.result())
    }

    fn meta(&self) -> Value {
        delegate!(self, item => item.meta())
    }

    fn is_error(&self) -> bool {
        delegate!(self, item => item.is_error())
    }

    fn duration(&self) -> f64 {
        delegate!(self, item => item.duration())
    }

    fn to_entry(&self) -> Entry {
        delegate!(self, item => item.to_entry())
    }
}

impl LogItem {
    /// Rebuilds the variant named by the entry's `comment`.
    pub fn from_entry(entry: Entry, registry: &ProfileRegistry) -> Self {
        match entry.discriminator() {
            EntryComment::Network => Self::Network(NetworkItem::new(entry, registry)),
            EntryComment::Pending => Self::Pending(PendingItem::from_entry(&entry)),
            EntryComment::Transaction => Self::Transaction(TransactionItem::from_entry(&entry)),
            EntryComment::ContentOnly | EntryComment::WithName => {
                Self::ContentOnly(ContentOnlyItem::from_entry(&entry))
            }
            EntryComment::WebSocket => Self::WebSocket(WebSocketItem::from_entry(&entry)),
        }
    }

    pub fn as_pending(&self) -> Option<&PendingItem> {
        match self {
            Self::Pending(item) => Some(item),
            _ => None,
        }
    }

    /// Response mime type of network items; feeds the mime filter.
    pub fn mime_type(&self) -> Option<&str> {
        match self {
            Self::Network(item) => {
                Some(item.entry().mime_type()).filter(|mime| !mime.is_empty())
            }
            _ => None,
        }
    }

    pub fn summary(&self) -> ItemSummary {
        ItemSummary {
            id: self.id(),
            kind: self.kind(),
            timestamp: self.timestamp(),
            tag: self.tag(),
            name: self.name(),
            duration: self.duration(),
            is_error: self.is_error(),
            mime_type: self.mime_type().map(str::to_string),
            profile: match self {
                Self::Network(item) => Some(item.profile_key()),
                _ => None,
            },
        }
    }
}

impl From<NetworkItem> for LogItem {
    fn from(item: NetworkItem) -> Self {
        Self::Network(item)
    }
}

impl From<PendingItem> for LogItem {
    fn from(item: PendingItem) -> Self {
        Self::Pending(item)
    }
}

impl From<TransactionItem> for LogItem {
    fn from(item: TransactionItem) -> Self {
        Self::Transaction(item)
    }
}

impl From<ContentOnlyItem> for LogItem {
    fn from(item: ContentOnlyItem) -> Self {
        Self::ContentOnly(item)
    }
}

impl From<WebSocketItem> for LogItem {
    fn from(item: WebSocketItem) -> Self {
        Self::WebSocket(item)
    }
}

/// One row as served by `GET /items`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub id: Uuid,
    pub kind: ItemKind,
    pub timestamp: i64,
    pub tag: String,
    pub name: String,
    pub duration: f64,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<&'static str>,
}
