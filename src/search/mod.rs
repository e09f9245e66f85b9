use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use serde_json::Value;

use crate::item::Content;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Precomputed deep-search predicate. Built once per search change and shared
/// by every item of a render pass, so per-item matching only walks the item.
#[derive(Debug)]
pub struct Marker {
    generation: u64,
    needle: String,
    case_sensitive: bool,
}

impl Marker {
    pub fn new(search: &str, case_sensitive: bool) -> Self {
        let needle = if case_sensitive {
            search.to_string()
        } else {
            search.to_lowercase()
        };

        Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            needle,
            case_sensitive,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn matches_text(&self, text: &str) -> bool {
        if self.case_sensitive {
            text.contains(self.needle.as_str())
        } else {
            text.to_lowercase().contains(self.needle.as_str())
        }
    }

    /// Walks keys and values depth-first and stops at the first hit.
    pub fn matches_value(&self, value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::Bool(flag) => self.matches_text(if *flag { "true" } else { "false" }),
            Value::Number(number) => self.matches_text(&number.to_string()),
            Value::String(text) => self.matches_text(text),
            Value::Array(items) => items.iter().any(|item| self.matches_value(item)),
            Value::Object(map) => map
                .iter()
                .any(|(key, item)| self.matches_text(key) || self.matches_value(item)),
        }
    }

    pub fn matches_content(&self, content: &Content) -> bool {
        match content {
            Content::Plain(value) => self.matches_value(value),
            Content::Tagged { value, raw, .. } => {
                self.matches_value(value) || self.matches_text(raw)
            }
        }
    }
}

/// Per-frame search/filter input handed to `Item::should_show`.
#[derive(Debug, Clone, Default)]
pub struct SearchConfig {
    pub search_value: Option<String>,
    pub filter_value: Option<String>,
    pub marker: Option<Arc<Marker>>,
}

impl SearchConfig {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_value = Some(filter.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>, marker: Arc<Marker>) -> Self {
        self.search_value = Some(search.into());
        self.marker = Some(marker);
        self
    }

    /// Structural memo key: the two strings plus the marker generation.
    pub fn cache_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.search_value.hash(&mut hasher);
        self.filter_value.hash(&mut hasher);
        self.marker
            .as_ref()
            .map(|marker| marker.generation())
            .hash(&mut hasher);
        hasher.finish()
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter_value.as_deref().filter(|value| !value.is_empty())
    }

    pub fn search_marker(&self) -> Option<&Marker> {
        match (self.search_value.as_deref(), self.marker.as_deref()) {
            (Some(search), Some(marker)) if !search.is_empty() => Some(marker),
            _ => None,
        }
    }

    /// Filter AND search. The filter is a case-sensitive substring of any of
    /// `haystacks`; the search needs a marker hit in params or content.
    pub fn accepts(&self, haystacks: &[&str], params: &Value, content: &Content) -> bool {
        if let Some(filter) = self.filter() {
            if !haystacks.iter().any(|haystack| haystack.contains(filter)) {
                return false;
            }
        }

        if let Some(marker) = self.search_marker() {
            if !(marker.matches_value(params) || marker.matches_content(content)) {
                return false;
            }
        }

        true
    }
}

/// UI-side owner of the search box. The marker is rebuilt only when the
/// search text or case mode changes.
#[derive(Debug)]
pub struct SearchState {
    search: String,
    filter: String,
    case_sensitive: bool,
    hide_unrelated: bool,
    marker: Option<Arc<Marker>>,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            search: String::new(),
            filter: String::new(),
            case_sensitive: false,
            hide_unrelated: true,
            marker: None,
        }
    }
}

impl SearchState {
    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn hide_unrelated(&self) -> bool {
        self.hide_unrelated
    }

    pub fn marker(&self) -> Option<&Arc<Marker>> {
        self.marker.as_ref()
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        let search = search.into();
        if search != self.search {
            self.search = search;
            self.rebuild_marker();
        }
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into();
    }

    pub fn set_case_sensitive(&mut self, case_sensitive: bool) {
        if case_sensitive != self.case_sensitive {
            self.case_sensitive = case_sensitive;
            self.rebuild_marker();
        }
    }

    pub fn set_hide_unrelated(&mut self, hide_unrelated: bool) {
        self.hide_unrelated = hide_unrelated;
    }

    pub fn toggle_case_sensitive(&mut self) {
        self.set_case_sensitive(!self.case_sensitive);
    }

    pub fn toggle_hide_unrelated(&mut self) {
        self.hide_unrelated = !self.hide_unrelated;
    }

    /// With hide-unrelated off the search text is kept but carries no
    /// marker, so it highlights without filtering.
    pub fn config(&self) -> SearchConfig {
        let mut config = SearchConfig::default();
        if !self.filter.is_empty() {
            config = config.with_filter(self.filter.as_str());
        }

        match (&self.marker, self.hide_unrelated) {
            (Some(marker), true) => config.with_search(self.search.as_str(), Arc::clone(marker)),
            _ => {
                config.search_value = (!self.search.is_empty()).then(|| self.search.clone());
                config
            }
        }
    }

    fn rebuild_marker(&mut self) {
        self.marker = (!self.search.is_empty())
            .then(|| Arc::new(Marker::new(&self.search, self.case_sensitive)));
    }
}
