use std::{
    collections::{BTreeSet, HashMap, HashSet, VecDeque},
    mem,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use serde_json::{Value, json};
use thiserror::Error;
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
    sync::{RwLock, mpsc},
    task::JoinHandle,
    time,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    item::{ContentOnlyItem, Item, LogItem, NetworkItem, PendingItem, WebSocketItem},
    profile::ProfileRegistry,
    protocol::{
        Entry, HarFile, NavigationEvent, PendingAnnouncement, WebSocketFrame, now_millis,
    },
    search::SearchConfig,
};

pub const DEFAULT_PENDING_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_CACHED_FLUSH_DELAY: Duration = Duration::from_millis(300);

const NAVIGATED_TAG: &str = "navigated";

#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// How long a pending request stays hidden before it is displayed.
    pub pending_delay: Duration,
    /// Quiet period after the last cached arrival before the batch is applied.
    pub cached_flush_delay: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pending_delay: DEFAULT_PENDING_DELAY,
            cached_flush_delay: DEFAULT_CACHED_FLUSH_DELAY,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid HAR log: {0}")]
    Import(#[from] serde_json::Error),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Owner of the ordered item list and the pending-request queues. Every
/// mutation happens under one write lock, in arrival order.
#[derive(Debug)]
pub struct LogStore {
    config: StoreConfig,
    profiles: Arc<ProfileRegistry>,
    inner: RwLock<StoreInner>,
    revision: AtomicU64,
    event_logger: Option<Arc<EventLogger>>,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(
            StoreConfig::default(),
            Arc::new(ProfileRegistry::default()),
            None,
        )
    }
}

impl LogStore {
    pub fn new(
        config: StoreConfig,
        profiles: Arc<ProfileRegistry>,
        event_logger: Option<Arc<EventLogger>>,
    ) -> Self {
        Self {
            config,
            profiles,
            inner: RwLock::new(StoreInner::default()),
            revision: AtomicU64::new(0),
            event_logger,
        }
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    /// Parses an announcement and queues it behind the display delay.
    /// Malformed input is logged and dropped.
    pub async fn announce_pending(self: &Arc<Self>, raw: &str) -> Option<Uuid> {
        let announcement = match PendingAnnouncement::parse(raw) {
            Ok(announcement) => announcement,
            Err(err) => {
                warn!(?err, "dropping malformed pending announcement");
                return None;
            }
        };
        self.log_event("pending", || serde_json::to_value(&announcement).ok());

        let item = PendingItem::new(announcement);
        let id = item.id();
        let key = item.pending_key();

        let mut inner = self.inner.write().await;
        let timer = self.schedule_reveal(key.clone(), id);
        debug!(
            %key,
            request_id = item.request_id(),
            method = item.method(),
            url = item.url(),
            "pending request queued"
        );
        inner
            .pending
            .entry(key)
            .or_default()
            .push_back(QueuedPending { item, timer });

        Some(id)
    }

    fn schedule_reveal(self: &Arc<Self>, key: String, id: Uuid) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        let delay = self.config.pending_delay;

        tokio::spawn(async move {
            time::sleep(delay).await;
            if let Some(store) = store.upgrade() {
                store.reveal_pending(&key, id).await;
            }
        })
    }

    async fn reveal_pending(&self, key: &str, id: Uuid) {
        let mut inner = self.inner.write().await;
        let Some(queued) = inner.take_queued(key, id) else {
            debug!(%key, "pending request completed before display");
            return;
        };

        if inner.dynamic {
            debug!(%key, request_id = queued.item.request_id(), "pending request displayed");
            inner.insert_sorted(LogItem::from(queued.item));
            self.bump();
        }
    }

    /// Reconciles the completion with the oldest outstanding pending entry
    /// for its method and URL, then inserts it in timestamp order.
    pub async fn record_network(&self, entry: Entry) -> Option<Uuid> {
        self.log_event("network", || serde_json::to_value(&entry).ok());

        let item = NetworkItem::new(entry, &self.profiles);
        let key = item.pending_key();

        let mut inner = self.inner.write().await;
        let mut changed = false;

        if inner.remove_visible_pending(&key) {
            debug!(%key, "visible pending request replaced");
            changed = true;
        } else if let Some(queued) = inner.pop_queued(&key) {
            queued.timer.abort();
            debug!(%key, request_id = queued.item.request_id(), "pending timer cancelled");
        }

        let id = if inner.dynamic {
            let id = item.id();
            inner.observe_mime(item.entry().mime_type());
            inner.insert_sorted(LogItem::from(item));
            changed = true;
            Some(id)
        } else {
            None
        };

        if changed {
            self.bump();
        }
        id
    }

    /// Accumulates a replayed record. Each arrival restarts the quiet period;
    /// when it elapses the whole batch lands in a single list replacement.
    pub async fn cache_network(self: &Arc<Self>, entry: Entry) -> bool {
        self.log_event("cached", || serde_json::to_value(&entry).ok());
        let dedupe_key = format!("{}|{}", entry.request_key(), entry.started_date_time);

        let mut inner = self.inner.write().await;
        let accepted = inner.cached_keys.insert(dedupe_key);
        if accepted {
            inner.cached.push(entry);
        }

        if let Some(previous) = inner.cached_flush.take() {
            previous.abort();
        }
        inner.cached_generation += 1;
        let generation = inner.cached_generation;
        inner.cached_flush = Some(self.schedule_flush(generation));

        accepted
    }

    fn schedule_flush(self: &Arc<Self>, generation: u64) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        let delay = self.config.cached_flush_delay;

        tokio::spawn(async move {
            time::sleep(delay).await;
            if let Some(store) = store.upgrade() {
                store.flush_cached(generation).await;
            }
        })
    }

    async fn flush_cached(&self, generation: u64) {
        let mut inner = self.inner.write().await;
        if inner.cached_generation != generation {
            return;
        }

        inner.cached_flush = None;
        inner.cached_keys.clear();
        let batch = mem::take(&mut inner.cached);
        if batch.is_empty() {
            return;
        }

        let count = batch.len();
        let mut items = inner.items.clone();
        for entry in batch {
            inner.observe_mime(entry.mime_type());
            items.push(Arc::new(LogItem::from(NetworkItem::new(entry, &self.profiles))));
        }
        items.sort_by_key(|item| item.timestamp());

        let dynamic = inner.dynamic;
        inner.replace(items, dynamic);
        self.bump();
        debug!(count, "cached batch applied");
    }

    /// Generic new-item event: any interchange record, dispatched on its
    /// `comment`. Malformed input is logged and dropped.
    pub async fn add_item_json(&self, raw: &str) -> Option<Uuid> {
        let entry: Entry = match serde_json::from_str(raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(?err, "dropping malformed item");
                return None;
            }
        };
        self.log_event("item", || serde_json::to_value(&entry).ok());

        self.insert_live(LogItem::from_entry(entry, &self.profiles))
            .await
    }

    pub async fn add_websocket(&self, frame: WebSocketFrame) -> Option<Uuid> {
        self.log_event("websocket", || serde_json::to_value(&frame).ok());
        self.insert_live(LogItem::from(WebSocketItem::new(frame)))
            .await
    }

    pub async fn add_content(&self, tag: &str, content: Value) -> Option<Uuid> {
        self.log_event("content", || Some(json!({ "tag": tag, "content": &content })));
        self.insert_live(LogItem::from(ContentOnlyItem::new(tag, content)))
            .await
    }

    async fn insert_live(&self, item: LogItem) -> Option<Uuid> {
        let mut inner = self.inner.write().await;
        if !inner.dynamic {
            debug!(kind = item.kind().label(), "static log, live item ignored");
            return None;
        }

        let id = item.id();
        inner.insert_sorted(item);
        self.bump();
        Some(id)
    }

    /// Page navigation. Without `preserve` the list is cleared and a
    /// navigation marker inserted; either way live mode is switched on.
    pub async fn navigated(&self, event: NavigationEvent) {
        self.log_event("navigated", || serde_json::to_value(&event).ok());

        let mut inner = self.inner.write().await;
        inner.dynamic = true;

        if !event.preserve {
            inner.items.clear();
            inner.mime_types.clear();
            let marker = ContentOnlyItem::new(NAVIGATED_TAG, json!({ "url": event.url }))
                .with_name(event.url.clone())
                .with_timestamp(event.timestamp.unwrap_or_else(now_millis));
            inner.insert_sorted(LogItem::from(marker));
        }

        self.bump();
        info!(url = %event.url, preserve = event.preserve, "page navigated");
    }

    /// Full replacement. Static lists recompute the observed mime types.
    pub async fn set_list(&self, items: Vec<LogItem>, is_dynamic: bool) {
        let mut items: Vec<Arc<LogItem>> = items.into_iter().map(Arc::new).collect();
        items.sort_by_key(|item| item.timestamp());

        let mut inner = self.inner.write().await;
        inner.replace(items, is_dynamic);
        self.bump();
    }

    /// Empties the list and mime types. Live mode stays on; requests still
    /// in flight keep their queued pending entries.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.items.clear();
        inner.mime_types.clear();
        inner.dynamic = true;
        self.bump();
    }

    /// On error the list is left unchanged.
    pub async fn import_har(&self, text: &str) -> Result<usize, StoreError> {
        let har: HarFile = serde_json::from_str(text)?;
        let items: Vec<LogItem> = har
            .log
            .entries
            .into_iter()
            .map(|entry| LogItem::from_entry(entry, &self.profiles))
            .collect();

        let count = items.len();
        self.set_list(items, false).await;
        info!(count, "HAR log imported");
        Ok(count)
    }

    pub async fn import_har_file(&self, path: &Path) -> Result<usize, StoreError> {
        let text = fs::read_to_string(path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        self.import_har(&text).await
    }

    pub async fn export_har(&self) -> HarFile {
        let inner = self.inner.read().await;
        HarFile::new(inner.items.iter().map(|item| item.to_entry()).collect())
    }

    pub async fn export_har_file(&self, path: &Path) -> Result<usize, StoreError> {
        let har = self.export_har().await;
        let count = har.log.entries.len();
        let text = serde_json::to_string_pretty(&har)?;
        fs::write(path, text)
            .await
            .map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(count)
    }

    #[cfg(test)]
    pub async fn snapshot(&self) -> Vec<Arc<LogItem>> {
        let inner = self.inner.read().await;
        inner.items.clone()
    }

    /// Items passing `should_show` for `config`, in list order.
    pub async fn visible(&self, config: Option<&SearchConfig>) -> Vec<Arc<LogItem>> {
        let inner = self.inner.read().await;
        inner
            .items
            .iter()
            .filter(|item| item.should_show(config))
            .cloned()
            .collect()
    }

    pub async fn mime_types(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        inner.mime_types.iter().cloned().collect()
    }

    pub async fn is_dynamic(&self) -> bool {
        self.inner.read().await.dynamic
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.items.len()
    }

    /// Bumped on every list mutation.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    fn log_event(&self, kind: &'static str, payload: impl FnOnce() -> Option<Value>) {
        if let Some(logger) = &self.event_logger {
            if let Some(payload) = payload() {
                logger.log(kind, payload);
            }
        }
    }

    #[cfg(test)]
    async fn queued_pending(&self, key: &str) -> usize {
        let inner = self.inner.read().await;
        inner.pending.get(key).map_or(0, VecDeque::len)
    }
}

#[derive(Debug)]
struct QueuedPending {
    item: PendingItem,
    timer: JoinHandle<()>,
}

#[derive(Debug)]
struct StoreInner {
    items: Vec<Arc<LogItem>>,
    mime_types: BTreeSet<String>,
    dynamic: bool,
    pending: HashMap<String, VecDeque<QueuedPending>>,
    cached: Vec<Entry>,
    cached_keys: HashSet<String>,
    cached_flush: Option<JoinHandle<()>>,
    cached_generation: u64,
}

impl Default for StoreInner {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            mime_types: BTreeSet::new(),
            dynamic: true,
            pending: HashMap::new(),
            cached: Vec::new(),
            cached_keys: HashSet::new(),
            cached_flush: None,
            cached_generation: 0,
        }
    }
}

impl StoreInner {
    /// Equal timestamps keep arrival order.
    fn insert_sorted(&mut self, item: LogItem) {
        let timestamp = item.timestamp();
        let index = self
            .items
            .partition_point(|existing| existing.timestamp() <= timestamp);
        self.items.insert(index, Arc::new(item));
    }

    fn replace(&mut self, items: Vec<Arc<LogItem>>, is_dynamic: bool) {
        self.items = items;
        self.dynamic = is_dynamic;
        if !is_dynamic {
            self.mime_types = self
                .items
                .iter()
                .filter_map(|item| item.mime_type())
                .map(str::to_string)
                .collect();
        }
    }

    fn observe_mime(&mut self, mime_type: &str) {
        if !mime_type.is_empty() && !self.mime_types.contains(mime_type) {
            self.mime_types.insert(mime_type.to_string());
        }
    }

    fn remove_visible_pending(&mut self, key: &str) -> bool {
        let position = self.items.iter().position(|item| {
            item.as_pending()
                .is_some_and(|pending| pending.pending_key() == key)
        });

        match position {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }

    fn pop_queued(&mut self, key: &str) -> Option<QueuedPending> {
        let queue = self.pending.get_mut(key)?;
        let queued = queue.pop_front();
        if queue.is_empty() {
            self.pending.remove(key);
        }
        queued
    }

    fn take_queued(&mut self, key: &str, id: Uuid) -> Option<QueuedPending> {
        let queue = self.pending.get_mut(key)?;
        let index = queue.iter().position(|queued| queued.item.id() == id)?;
        let queued = queue.remove(index);
        if queue.is_empty() {
            self.pending.remove(key);
        }
        queued
    }
}

/// Appends every accepted event to a file as one JSON line, off the
/// ingestion path.
#[derive(Debug)]
pub struct EventLogger {
    sender: mpsc::UnboundedSender<Value>,
}

impl EventLogger {
    pub fn new(path: PathBuf) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let logger = Arc::new(Self { sender: tx });

        tokio::spawn(async move {
            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    while let Some(record) = rx.recv().await {
                        let line = format!("{}\n", record);
                        if let Err(err) = file.write_all(line.as_bytes()).await {
                            warn!(?err, "failed to write event dump");
                            break;
                        }
                    }
                }
                Err(err) => {
                    warn!(?err, path = %path.display(), "failed to open event dump file");
                    while rx.recv().await.is_some() {}
                }
            }
        });

        logger
    }

    pub fn log(&self, kind: &str, payload: Value) {
        let record = json!({
            "kind": kind,
            "receivedAt": now_millis(),
            "payload": payload,
        });
        let _ = self.sender.send(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        item::ItemKind,
        protocol::{FrameKind, Request, Response, ResponseContent},
    };

    const URL: &str = "https://x.dev/api/orders";

    fn store() -> Arc<LogStore> {
        Arc::new(LogStore::default())
    }

    fn announcement(id: &str, timestamp: i64) -> String {
        json!({
            "id": id,
            "timestamp": timestamp,
            "request": { "method": "GET", "url": URL }
        })
        .to_string()
    }

    fn completion(url: &str, started_at: i64) -> Entry {
        Entry {
            started_date_time: crate::protocol::iso_timestamp(started_at),
            request: Request::new("GET", url),
            response: Response::with_content(200, ResponseContent::text("application/json", "[]")),
            ..Entry::default()
        }
    }

    async fn visible_request_ids(store: &LogStore) -> Vec<String> {
        store
            .snapshot()
            .await
            .iter()
            .filter_map(|item| item.as_pending().map(|p| p.request_id().to_string()))
            .collect()
    }

    async fn kinds(store: &LogStore) -> Vec<ItemKind> {
        store.snapshot().await.iter().map(|item| item.kind()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn pending_appears_only_after_the_delay() {
        let store = store();
        store
            .announce_pending(&announcement("a", 1_000))
            .await
            .expect("announcement accepted");

        time::sleep(Duration::from_millis(99)).await;
        assert!(visible_request_ids(&store).await.is_empty());

        time::sleep(Duration::from_millis(2)).await;
        assert_eq!(visible_request_ids(&store).await, vec!["a"]);
        assert_eq!(store.queued_pending(&format!("GET:{URL}")).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_completion_never_shows_pending() {
        let store = store();
        store.announce_pending(&announcement("a", 1_000)).await;

        time::sleep(Duration::from_millis(40)).await;
        store
            .record_network(completion(URL, 1_000))
            .await
            .expect("completion inserted");

        assert!(visible_request_ids(&store).await.is_empty());
        time::sleep(Duration::from_millis(500)).await;
        assert!(visible_request_ids(&store).await.is_empty());
        assert_eq!(kinds(&store).await, vec![ItemKind::Network]);
        assert_eq!(store.queued_pending(&format!("GET:{URL}")).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_in_the_timer_tick_wins() {
        let store = store();
        store.announce_pending(&announcement("a", 1_000)).await;

        time::advance(Duration::from_millis(100)).await;
        store.record_network(completion(URL, 1_000)).await;
        time::sleep(Duration::from_millis(10)).await;

        assert!(visible_request_ids(&store).await.is_empty());
        assert_eq!(kinds(&store).await, vec![ItemKind::Network]);
    }

    #[tokio::test(start_paused = true)]
    async fn completions_reconcile_fifo() {
        let store = store();
        for (index, id) in ["a", "b", "c"].into_iter().enumerate() {
            store
                .announce_pending(&announcement(id, 1_000 + index as i64))
                .await;
        }
        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(visible_request_ids(&store).await, vec!["a", "b", "c"]);

        store.record_network(completion(URL, 2_000)).await;
        assert_eq!(visible_request_ids(&store).await, vec!["b", "c"]);

        store.record_network(completion(URL, 2_001)).await;
        store.record_network(completion(URL, 2_002)).await;
        assert!(visible_request_ids(&store).await.is_empty());
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fifo_spans_visible_and_queued_entries() {
        let store = store();
        store.announce_pending(&announcement("old", 1_000)).await;
        time::sleep(Duration::from_millis(150)).await;
        store.announce_pending(&announcement("new", 1_200)).await;

        store.record_network(completion(URL, 1_300)).await;
        assert!(visible_request_ids(&store).await.is_empty());
        assert_eq!(store.queued_pending(&format!("GET:{URL}")).await, 1);

        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(visible_request_ids(&store).await, vec!["new"]);
    }

    #[tokio::test(start_paused = true)]
    async fn other_urls_are_not_reconciled() {
        let store = store();
        store.announce_pending(&announcement("a", 1_000)).await;
        time::sleep(Duration::from_millis(150)).await;

        store
            .record_network(completion("https://x.dev/api/users", 1_100))
            .await;
        assert_eq!(visible_request_ids(&store).await, vec!["a"]);
    }

    #[tokio::test]
    async fn malformed_pending_is_dropped() {
        let store = store();
        assert!(store.announce_pending("{ not json").await.is_none());
        assert!(store.announce_pending(r#"{"id":"x"}"#).await.is_none());
        assert_eq!(store.len().await, 0);
        assert_eq!(store.revision(), 0);
    }

    #[tokio::test]
    async fn live_inserts_keep_timestamp_order() {
        let store = store();
        store.record_network(completion(URL, 3_000)).await;
        store.record_network(completion(URL, 1_000)).await;
        store.record_network(completion(URL, 2_000)).await;

        let timestamps: Vec<i64> = store.snapshot().await.iter().map(|i| i.timestamp()).collect();
        assert_eq!(timestamps, vec![1_000, 2_000, 3_000]);
        assert_eq!(store.mime_types().await, vec!["application/json"]);
    }

    #[tokio::test]
    async fn failed_import_leaves_list_unchanged() {
        let store = store();
        store.record_network(completion(URL, 1_000)).await;
        let revision = store.revision();

        let missing_entries = r#"{ "log": { "version": "1.2" } }"#;
        assert!(matches!(
            store.import_har(missing_entries).await,
            Err(StoreError::Import(_))
        ));
        assert!(store.import_har("not json").await.is_err());

        assert_eq!(store.len().await, 1);
        assert_eq!(store.revision(), revision);
        assert!(store.is_dynamic().await);
    }

    #[tokio::test]
    async fn import_replaces_list_as_static_data() {
        let source = store();
        source.record_network(completion(URL, 2_000)).await;
        source.add_content("File", json!("opened")).await;
        let exported = serde_json::to_string(&source.export_har().await).expect("serializes");

        let target = store();
        target.record_network(completion("https://x.dev/other", 5_000)).await;
        let count = target.import_har(&exported).await.expect("import succeeds");

        assert_eq!(count, 2);
        assert_eq!(target.len().await, 2);
        assert!(!target.is_dynamic().await);
        assert_eq!(target.mime_types().await, vec!["application/json"]);

        assert!(target.record_network(completion(URL, 9_000)).await.is_none());
        assert_eq!(target.len().await, 2);
    }

    #[tokio::test]
    async fn navigation_clears_or_preserves() {
        let store = store();
        store.set_list(Vec::new(), false).await;
        store.record_network(completion(URL, 1_000)).await;
        assert_eq!(store.len().await, 0);

        store
            .navigated(NavigationEvent {
                url: "https://x.dev/".into(),
                preserve: true,
                timestamp: Some(1_500),
            })
            .await;
        assert!(store.is_dynamic().await);
        store.record_network(completion(URL, 2_000)).await;
        assert_eq!(kinds(&store).await, vec![ItemKind::Network]);

        store
            .navigated(NavigationEvent {
                url: "https://x.dev/next".into(),
                preserve: false,
                timestamp: Some(3_000),
            })
            .await;
        let items = store.snapshot().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind(), ItemKind::ContentOnly);
        assert_eq!(items[0].tag(), "navigated");
        assert_eq!(items[0].name(), "https://x.dev/next");
    }

    #[tokio::test]
    async fn clear_keeps_live_mode() {
        let store = store();
        store.record_network(completion(URL, 1_000)).await;
        store.clear().await;

        assert_eq!(store.len().await, 0);
        assert!(store.mime_types().await.is_empty());
        assert!(store.is_dynamic().await);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_batch_lands_in_one_replacement() {
        let store = store();
        store.record_network(completion(URL, 5_000)).await;
        let before = store.revision();

        for offset in [3, 1, 2] {
            store
                .cache_network(completion(&format!("{URL}/{offset}"), offset * 1_000))
                .await;
            time::sleep(Duration::from_millis(200)).await;
            assert_eq!(store.len().await, 1);
        }
        assert!(!store.cache_network(completion(&format!("{URL}/1"), 1_000)).await);

        time::sleep(Duration::from_millis(301)).await;
        assert_eq!(store.revision(), before + 1);

        let timestamps: Vec<i64> = store.snapshot().await.iter().map(|i| i.timestamp()).collect();
        assert_eq!(timestamps, vec![1_000, 2_000, 3_000, 5_000]);
    }

    #[tokio::test]
    async fn generic_items_dispatch_on_comment() {
        let store = store();
        let transaction = json!({
            "startedDateTime": "2024-05-01T10:00:00.000Z",
            "comment": "Transaction",
            "request": { "method": "TX", "url": "transfer" },
            "response": { "status": 200, "content": { "mimeType": "application/json", "text": "{\"ok\":true}" } }
        });

        store
            .add_item_json(&transaction.to_string())
            .await
            .expect("item accepted");
        assert!(store.add_item_json("[1, 2").await.is_none());

        store
            .add_websocket(WebSocketFrame {
                kind: FrameKind::Received,
                timestamp: Some(1_714_557_600_001),
                url: Some("wss://x.dev/socket".into()),
                params: None,
                result: Some("{}".into()),
            })
            .await;

        assert_eq!(kinds(&store).await, vec![ItemKind::Transaction, ItemKind::WebSocket]);
    }

    #[tokio::test]
    async fn visible_applies_search_config() {
        let store = store();
        store.record_network(completion(URL, 1_000)).await;
        store
            .record_network(completion("https://x.dev/site.css", 1_001))
            .await;
        store.add_content("File", json!("opened")).await;

        assert_eq!(store.len().await, 3);
        assert_eq!(store.visible(None).await.len(), 2);

        let filtered = SearchConfig::default().with_filter("/api/");
        let kinds: Vec<ItemKind> = store
            .visible(Some(&filtered))
            .await
            .iter()
            .map(|item| item.kind())
            .collect();
        assert_eq!(kinds, vec![ItemKind::Network, ItemKind::ContentOnly]);
    }

    #[tokio::test]
    async fn event_dump_writes_one_line_per_accepted_event() {
        let path = std::env::temp_dir().join(format!("netpane-events-{}.jsonl", Uuid::new_v4()));
        let store = Arc::new(LogStore::new(
            StoreConfig::default(),
            Arc::new(ProfileRegistry::default()),
            Some(EventLogger::new(path.clone())),
        ));

        store.record_network(completion(URL, 1_000)).await;
        store.cache_network(completion(URL, 900)).await;
        store.add_content("File", json!({ "path": "a.txt" })).await;

        let mut lines = Vec::new();
        for _ in 0..100 {
            if let Ok(text) = fs::read_to_string(&path).await {
                lines = text.lines().map(str::to_owned).collect();
                if lines.len() >= 3 {
                    break;
                }
            }
            time::sleep(Duration::from_millis(20)).await;
        }

        let records: Vec<Value> = lines
            .iter()
            .map(|line| serde_json::from_str(line).expect("each line is json"))
            .collect();
        let dumped: Vec<&str> = records
            .iter()
            .filter_map(|record| record["kind"].as_str())
            .collect();
        assert_eq!(dumped, vec!["network", "cached", "content"]);
        assert!(records.iter().all(|record| record["receivedAt"].as_i64().is_some()));
        assert_eq!(records[2]["payload"]["tag"], "File");
        assert_eq!(records[2]["payload"]["content"]["path"], "a.txt");
        assert_eq!(records[0]["payload"]["request"]["url"], URL);

        let _ = fs::remove_file(&path).await;
    }
}
