use std::{
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use once_cell::sync::OnceCell;
use serde_json::Value;
use uuid::Uuid;

use super::{Content, Item, ItemKind};
use crate::{
    profile::{Profile, ProfileRegistry},
    protocol::{Entry, iso_timestamp, now_millis},
    search::SearchConfig,
};

/// A completed HTTP transaction. Display fields are derived from the record
/// by the profile the matcher picked for its URL, on first use.
pub struct NetworkItem {
    id: Uuid,
    timestamp: i64,
    entry: Entry,
    profile: Arc<dyn Profile>,
    base_visible: bool,
    derived: OnceCell<Derived>,
    show_memo: Mutex<Option<(u64, bool)>>,
    show_evaluations: AtomicUsize,
}

struct Derived {
    name: String,
    tag: String,
    params: Value,
    content: Content,
    meta: Value,
    is_error: bool,
}

impl NetworkItem {
    pub fn new(mut entry: Entry, registry: &ProfileRegistry) -> Self {
        entry.comment.clear();
        let profile = registry.resolve(&entry.request.url);
        let base_visible = profile.should_show(&entry);
        let timestamp = match entry.started_at_millis() {
            0 => now_millis(),
            millis => millis,
        };

        Self {
            id: Uuid::new_v4(),
            timestamp,
            entry,
            profile,
            base_visible,
            derived: OnceCell::new(),
            show_memo: Mutex::new(None),
            show_evaluations: AtomicUsize::new(0),
        }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn profile_key(&self) -> &'static str {
        self.profile.key()
    }

    pub fn pending_key(&self) -> String {
        self.entry.pending_key()
    }

    fn derived(&self) -> &Derived {
        self.derived.get_or_init(|| {
            let entry = &self.entry;
            let text = entry.content_text();
            let result = self.profile.get_result(entry, text);

            Derived {
                name: self.profile.get_name(entry),
                tag: self.profile.get_tag(entry),
                params: self.profile.get_params(entry),
                content: Content::for_mime(entry.mime_type(), result, text),
                meta: self.profile.get_meta(entry),
                is_error: self.profile.is_error(entry, text),
            }
        })
    }

    fn evaluate(&self, config: &SearchConfig) -> bool {
        self.show_evaluations.fetch_add(1, Ordering::Relaxed);
        let derived = self.derived();
        config.accepts(
            &[self.entry.request.url.as_str(), derived.name.as_str()],
            &derived.params,
            &derived.content,
        )
    }

    #[cfg(test)]
    fn show_evaluations(&self) -> usize {
        self.show_evaluations.load(Ordering::Relaxed)
    }
}

impl Item for NetworkItem {
    fn id(&self) -> Uuid {
        self.id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn kind(&self) -> ItemKind {
        ItemKind::Network
    }

    fn should_show(&self, config: Option<&SearchConfig>) -> bool {
        if !self.base_visible {
            return false;
        }
        let Some(config) = config else {
            return true;
        };

        let key = config.cache_key();
        let mut memo = self
            .show_memo
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((cached_key, visible)) = *memo {
            if cached_key == key {
                return visible;
            }
        }

        let visible = self.evaluate(config);
        *memo = Some((key, visible));
        visible
    }

    fn tag(&self) -> String {
        self.derived().tag.clone()
    }

    fn name(&self) -> String {
        self.derived().name.clone()
    }

    fn params(&self) -> Value {
        self.derived().params.clone()
    }

    fn content(&self) -> Content {
        self.derived().content.clone()
    }

    fn meta(&self) -> Value {
        self.derived().meta.clone()
    }

    fn is_error(&self) -> bool {
        self.derived().is_error
    }

    fn duration(&self) -> f64 {
        let phases: f64 = self
            .entry
            .timings
            .iter()
            .filter(|(phase, _)| !phase.starts_with('_'))
            .filter_map(|(_, value)| value.as_f64())
            .filter(|value| *value > 0.0)
            .sum();

        if phases > 0.0 {
            phases
        } else {
            self.entry.time.max(0.0)
        }
    }

    /// The record as received, except that a missing or unparseable start
    /// time is replaced by the stamp the item was ordered by.
    fn to_entry(&self) -> Entry {
        let mut entry = self.entry.clone();
        if entry.started_at_millis() != self.timestamp {
            entry.started_date_time = iso_timestamp(self.timestamp);
        }
        entry
    }
}

impl fmt::Debug for NetworkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkItem")
            .field("id", &self.id)
            .field("timestamp", &self.timestamp)
            .field("method", &self.entry.request.method)
            .field("url", &self.entry.request.url)
            .field("profile", &self.profile.key())
            .finish()
    }
}
