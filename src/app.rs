use std::{
    collections::{HashMap, HashSet},
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use color_eyre::{
    Result,
    eyre::{Report, eyre},
};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::{select, sync::mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    item::{Item, ItemKind, LogItem},
    profile::ProfileRegistry,
    search::SearchState,
    server,
    state::{EventLogger, LogStore},
    tui::{
        self, AppViewModel, DetailStateView, Event, InputTarget, RowStatus, SearchBarView,
        TerminalGuard, TimelineEntry,
    },
    ui::detail::{self, DetailViewModel, build_detail_view},
};

const PAGE: i32 = 10;

pub struct NetpaneApp {
    tick_rate: Duration,
    store: Arc<LogStore>,
    server: Option<server::ServerHandle>,
    server_addr: SocketAddr,
    export_path: Option<PathBuf>,
    search: SearchState,
    input: Option<InputTarget>,
    mime_filter: Option<String>,
    available_mimes: Vec<String>,
    selected: Option<usize>,
    focus: Focus,
    detail_states: HashMap<Uuid, DetailState>,
    rows: Vec<Arc<LogItem>>,
    seen_revision: Option<u64>,
    rows_dirty: bool,
    status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Timeline,
    Detail,
}

impl NetpaneApp {
    pub async fn bootstrap(config: Config) -> Result<Self> {
        let profiles = Arc::new(ProfileRegistry::new(config.matcher())?);
        let event_logger = config.event_dump.clone().map(EventLogger::new);
        let store = Arc::new(LogStore::new(config.store_config(), profiles, event_logger));

        let mut status = None;
        if let Some(path) = &config.import {
            match store.import_har_file(path).await {
                Ok(count) => {
                    info!(path = %path.display(), count, "imported HAR log");
                    status = Some(format!("Imported {} entries from {}", count, path.display()));
                }
                Err(err) => {
                    warn!(?err, "startup import failed");
                    status = Some(format!("Import failed: {}", err));
                }
            }
        }

        let bind_addr = config.bind_addr;
        let server = server::spawn(Arc::clone(&store), server::ServerConfig { bind_addr })
            .await
            .map_err(|err| match err {
                server::ServerError::Io(io_err) if io_err.kind() == ErrorKind::AddrInUse => eyre!(
                    "Port {} is already in use. Pass --bind <addr:port> to choose a different address.",
                    bind_addr
                ),
                other => Report::from(other),
            })?;
        let server_addr = server.addr();

        info!(addr = %server_addr, "HTTP server ready");

        Ok(Self {
            tick_rate: Duration::from_millis(250),
            store,
            server: Some(server),
            server_addr,
            export_path: config.export,
            search: SearchState::default(),
            input: None,
            mime_filter: None,
            available_mimes: Vec::new(),
            selected: None,
            focus: Focus::Timeline,
            detail_states: HashMap::new(),
            rows: Vec::new(),
            seen_revision: None,
            rows_dirty: true,
            status,
        })
    }

    pub async fn run(mut self) -> Result<()> {
        info!("starting netpane");

        let mut terminal = TerminalGuard::new()?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let event_handle = tui::spawn_event_loop(tx, self.tick_rate);

        loop {
            let view_model = self.build_view_model().await;
            terminal.draw(|frame| tui::render_app(frame, &view_model))?;

            let exit_requested = select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => self.handle_event(event, view_model.detail.as_ref()),
                        None => true,
                    }
                }
                ctrl_c = tokio::signal::ctrl_c() => {
                    if let Err(err) = ctrl_c {
                        warn!(?err, "failed to listen for ctrl+c");
                    } else {
                        info!("received ctrl+c");
                    }
                    true
                }
            };

            if exit_requested {
                break;
            }
        }

        drop(terminal);
        drop(rx);

        if let Err(err) = event_handle.await {
            warn!(?err, "terminal event loop task ended unexpectedly");
        }

        if let Some(server) = self.server.take() {
            server.shutdown().await?;
        }

        if let Some(path) = &self.export_path {
            let count = self.store.export_har_file(path).await?;
            info!(path = %path.display(), count, "exported HAR log");
        }

        info!("netpane shutting down");
        Ok(())
    }

    async fn refresh_rows(&mut self) {
        let revision = self.store.revision();
        if !self.rows_dirty && self.seen_revision == Some(revision) {
            return;
        }

        self.available_mimes = self.store.mime_types().await;
        if self
            .mime_filter
            .as_ref()
            .is_some_and(|filter| !self.available_mimes.contains(filter))
        {
            self.mime_filter = None;
        }

        let config = self.search.config();
        let mut rows = self.store.visible(Some(&config)).await;
        if let Some(filter) = &self.mime_filter {
            rows.retain(|item| item.mime_type() == Some(filter.as_str()));
        }

        let live_ids: HashSet<Uuid> = rows.iter().map(|item| item.id()).collect();
        self.detail_states.retain(|id, _| live_ids.contains(id));

        self.rows = rows;
        self.seen_revision = Some(revision);
        self.rows_dirty = false;
    }

    async fn build_view_model(&mut self) -> AppViewModel {
        self.refresh_rows().await;

        self.selected = if self.rows.is_empty() {
            None
        } else {
            Some(self.selected.unwrap_or(0).min(self.rows.len() - 1))
        };

        let timeline = self.rows.iter().map(|item| summarize_item(item.as_ref())).collect();

        let marker = self.search.marker().cloned();
        let selected_item = self.selected.and_then(|index| self.rows.get(index)).cloned();
        let detail = selected_item
            .as_ref()
            .map(|item| build_detail_view(item, marker.as_deref()));

        let mut detail_state_view = None;
        let mut detail_scroll = 0;
        if let (Some(item), Some(view)) = (&selected_item, &detail) {
            let state = self.detail_states.entry(item.id()).or_default();
            let (visible, _) = detail::visible_indices_with_children(view, Some(&state.collapsed));
            state.clamp(visible.len());
            detail_scroll = state.cursor;
            detail_state_view = Some(DetailStateView {
                cursor: state.cursor,
                collapsed: state.collapsed.clone(),
            });
        }

        AppViewModel {
            total_items: self.store.len().await,
            live: self.store.is_dynamic().await,
            bind_addr: self.server_addr,
            timeline,
            selected: self.selected,
            detail,
            detail_state: detail_state_view,
            focus_detail: self.focus == Focus::Detail,
            detail_scroll,
            search_bar: SearchBarView {
                search: self.search.search().to_string(),
                filter: self.search.filter().to_string(),
                case_sensitive: self.search.case_sensitive(),
                hide_unrelated: self.search.hide_unrelated(),
                mime_filter: self.mime_filter.clone(),
                editing: self.input,
            },
            status: self.status.clone(),
        }
    }

    fn handle_event(&mut self, event: Event, detail: Option<&DetailViewModel>) -> bool {
        match event {
            Event::Input(key) => {
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                    return true;
                }
                if let Some(target) = self.input {
                    self.handle_input_key(target, key);
                    return false;
                }
                self.status = None;
                self.handle_key(key, detail)
            }
            Event::Tick => false,
            Event::Resize(width, height) => {
                debug!(%width, %height, "terminal resized");
                false
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent, detail: Option<&DetailViewModel>) -> bool {
        let ctx = self.detail_context(detail);

        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => return true,
            KeyCode::Char('k') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.clear_log();
            }
            KeyCode::Char('/') => self.input = Some(InputTarget::Search),
            KeyCode::Char('f') => self.input = Some(InputTarget::Filter),
            KeyCode::Char('c') => {
                self.search.toggle_case_sensitive();
                self.rows_dirty = true;
            }
            KeyCode::Char('h') => {
                self.search.toggle_hide_unrelated();
                self.rows_dirty = true;
            }
            KeyCode::Char('m') => {
                self.mime_filter = next_mime_filter(self.mime_filter.as_deref(), &self.available_mimes);
                self.selected = Some(0);
                self.rows_dirty = true;
            }
            KeyCode::Tab | KeyCode::BackTab => {
                self.focus = match self.focus {
                    Focus::Timeline => Focus::Detail,
                    Focus::Detail => Focus::Timeline,
                };
            }
            KeyCode::Down | KeyCode::Char('j') => self.step(1, &ctx),
            KeyCode::Up | KeyCode::Char('k') => self.step(-1, &ctx),
            KeyCode::PageDown => self.step(PAGE, &ctx),
            KeyCode::PageUp => self.step(-PAGE, &ctx),
            KeyCode::Home => self.step(i32::MIN, &ctx),
            KeyCode::End => self.step(i32::MAX, &ctx),
            KeyCode::Right | KeyCode::Enter if self.focus == Focus::Detail => {
                if let Some(state) = self.current_detail_state_mut() {
                    state.expand(&ctx);
                }
            }
            KeyCode::Left if self.focus == Focus::Detail => {
                if let Some(state) = self.current_detail_state_mut() {
                    state.collapse(&ctx);
                }
            }
            KeyCode::Char(' ') if self.focus == Focus::Detail => {
                if let Some(state) = self.current_detail_state_mut() {
                    state.toggle(&ctx);
                }
            }
            _ => {}
        }

        false
    }

    fn handle_input_key(&mut self, target: InputTarget, key: KeyEvent) {
        let current = match target {
            InputTarget::Search => self.search.search(),
            InputTarget::Filter => self.search.filter(),
        };

        match edit_input(current, key) {
            InputEdit::Keep => {}
            InputEdit::Close => self.input = None,
            InputEdit::Update(value) => {
                match target {
                    InputTarget::Search => self.search.set_search(value),
                    InputTarget::Filter => self.search.set_filter(value),
                }
                self.selected = Some(0);
                self.rows_dirty = true;
            }
            InputEdit::Reset => {
                match target {
                    InputTarget::Search => self.search.set_search(""),
                    InputTarget::Filter => self.search.set_filter(""),
                }
                self.input = None;
                self.rows_dirty = true;
            }
        }
    }

    fn step(&mut self, delta: i32, ctx: &DetailContext) {
        match self.focus {
            Focus::Timeline => {
                self.selected = move_index(self.selected, delta, self.rows.len());
            }
            Focus::Detail => {
                if let Some(state) = self.current_detail_state_mut() {
                    state.cursor = move_index(Some(state.cursor), delta, ctx.visible_len())
                        .unwrap_or(0);
                }
            }
        }
    }

    fn clear_log(&mut self) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            store.clear().await;
        });
        self.selected = None;
        self.detail_states.clear();
        self.mime_filter = None;
        self.rows_dirty = true;
    }

    fn detail_context<'a>(&self, detail: Option<&'a DetailViewModel>) -> DetailContext<'a> {
        let collapsed = self
            .current_item_id()
            .and_then(|id| self.detail_states.get(&id))
            .map(|state| &state.collapsed);
        DetailContext::new(detail, collapsed)
    }

    fn current_item_id(&self) -> Option<Uuid> {
        self.selected
            .and_then(|index| self.rows.get(index))
            .map(|item| item.id())
    }

    fn current_detail_state_mut(&mut self) -> Option<&mut DetailState> {
        let id = self.current_item_id()?;
        Some(self.detail_states.entry(id).or_default())
    }
}

/// Per-item tree state, kept while the item stays in the list.
#[derive(Debug, Clone, Default)]
struct DetailState {
    cursor: usize,
    collapsed: HashSet<usize>,
}

impl DetailState {
    fn clamp(&mut self, visible_len: usize) {
        self.cursor = self.cursor.min(visible_len.saturating_sub(1));
    }

    fn line_under_cursor(&self, ctx: &DetailContext) -> Option<usize> {
        ctx.visible_indices.get(self.cursor).copied()
    }

    fn expand(&mut self, ctx: &DetailContext) -> bool {
        match self.line_under_cursor(ctx) {
            Some(line) if ctx.has_children(line) => self.collapsed.remove(&line),
            _ => false,
        }
    }

    fn toggle(&mut self, ctx: &DetailContext) -> bool {
        match self.line_under_cursor(ctx) {
            Some(line) if ctx.has_children(line) => {
                if !self.collapsed.remove(&line) {
                    self.collapsed.insert(line);
                }
                true
            }
            _ => false,
        }
    }

    /// Collapses an open node, otherwise moves the cursor to the parent line.
    fn collapse(&mut self, ctx: &DetailContext) -> bool {
        let Some(line) = self.line_under_cursor(ctx) else {
            return false;
        };

        if ctx.has_children(line) && self.collapsed.insert(line) {
            return true;
        }

        let indent = ctx.indent(line);
        if indent == 0 {
            return false;
        }

        match ctx.visible_indices[..self.cursor]
            .iter()
            .rposition(|&index| ctx.indent(index) < indent)
        {
            Some(parent) => {
                self.cursor = parent;
                true
            }
            None => false,
        }
    }
}

struct DetailContext<'a> {
    detail: Option<&'a DetailViewModel>,
    visible_indices: Vec<usize>,
    has_children: Vec<bool>,
}

impl<'a> DetailContext<'a> {
    fn new(detail: Option<&'a DetailViewModel>, collapsed: Option<&HashSet<usize>>) -> Self {
        let (visible_indices, has_children) = detail
            .map(|view| detail::visible_indices_with_children(view, collapsed))
            .unwrap_or_default();
        Self {
            detail,
            visible_indices,
            has_children,
        }
    }

    fn visible_len(&self) -> usize {
        self.visible_indices.len()
    }

    fn has_children(&self, line: usize) -> bool {
        self.has_children.get(line).copied().unwrap_or(false)
    }

    fn indent(&self, line: usize) -> usize {
        self.detail
            .and_then(|view| view.lines.get(line))
            .map(|line| line.indent)
            .unwrap_or(0)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum InputEdit {
    Keep,
    Close,
    Reset,
    Update(String),
}

/// Enter keeps the text, Esc clears it; both leave input mode.
fn edit_input(current: &str, key: KeyEvent) -> InputEdit {
    match key.code {
        KeyCode::Enter => InputEdit::Close,
        KeyCode::Esc => InputEdit::Reset,
        KeyCode::Backspace if current.is_empty() => InputEdit::Keep,
        KeyCode::Backspace => {
            let mut value = current.to_string();
            value.pop();
            InputEdit::Update(value)
        }
        KeyCode::Char(ch)
            if !key
                .modifiers
                .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
        {
            let mut value = current.to_string();
            value.push(ch);
            InputEdit::Update(value)
        }
        _ => InputEdit::Keep,
    }
}

/// Cycles `None -> first -> ... -> last -> None`.
fn next_mime_filter(current: Option<&str>, available: &[String]) -> Option<String> {
    let next = match current {
        None => available.first(),
        Some(current) => match available.iter().position(|mime| mime == current) {
            Some(position) => available.get(position + 1),
            None => available.first(),
        },
    };
    next.cloned()
}

fn move_index(current: Option<usize>, delta: i32, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }

    let current = current.unwrap_or(0) as i64;
    let target = (current + delta as i64).clamp(0, len as i64 - 1);
    Some(target as usize)
}

fn row_status(item: &LogItem) -> RowStatus {
    if item.kind() == ItemKind::Pending {
        RowStatus::Pending
    } else if item.is_error() {
        RowStatus::Error
    } else {
        RowStatus::Normal
    }
}

fn summarize_item(item: &LogItem) -> TimelineEntry {
    let status = row_status(item);
    let duration = match status {
        RowStatus::Pending => format!("pending {}", detail::format_duration(item.duration())),
        _ => detail::format_duration(item.duration()),
    };

    TimelineEntry {
        tag: item.tag(),
        name: detail::display_name(item),
        duration,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        item::{PendingItem, TransactionItem},
        protocol::{PendingAnnouncement, Request},
    };
    use serde_json::json;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn tree_view() -> DetailViewModel {
        let item = LogItem::from(
            TransactionItem::new(0, "transfer", "TX")
                .with_params(json!({ "to": "0xabc", "amounts": [1, 2] })),
        );
        build_detail_view(&item, None)
    }

    #[test]
    fn input_editing_appends_pops_and_closes() {
        assert_eq!(
            edit_input("us", key(KeyCode::Char('e'))),
            InputEdit::Update("use".into())
        );
        assert_eq!(
            edit_input("use", key(KeyCode::Backspace)),
            InputEdit::Update("us".into())
        );
        assert_eq!(edit_input("", key(KeyCode::Backspace)), InputEdit::Keep);
        assert_eq!(edit_input("use", key(KeyCode::Enter)), InputEdit::Close);
        assert_eq!(edit_input("use", key(KeyCode::Esc)), InputEdit::Reset);
        assert_eq!(
            edit_input("use", KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL)),
            InputEdit::Keep
        );
    }

    #[test]
    fn mime_filter_cycles_back_to_all() {
        let available = vec!["application/json".to_string(), "text/html".to_string()];

        let first = next_mime_filter(None, &available);
        assert_eq!(first.as_deref(), Some("application/json"));
        let second = next_mime_filter(first.as_deref(), &available);
        assert_eq!(second.as_deref(), Some("text/html"));
        assert_eq!(next_mime_filter(second.as_deref(), &available), None);
        assert_eq!(
            next_mime_filter(Some("image/png"), &available).as_deref(),
            Some("application/json")
        );
        assert_eq!(next_mime_filter(None, &[]), None);
    }

    #[test]
    fn selection_moves_within_bounds() {
        assert_eq!(move_index(None, 1, 0), None);
        assert_eq!(move_index(None, 1, 3), Some(1));
        assert_eq!(move_index(Some(2), 1, 3), Some(2));
        assert_eq!(move_index(Some(2), i32::MIN, 3), Some(0));
        assert_eq!(move_index(Some(0), i32::MAX, 3), Some(2));
    }

    #[test]
    fn rows_are_colored_by_state() {
        let pending = LogItem::from(PendingItem::new(PendingAnnouncement {
            id: "1".into(),
            timestamp: 0,
            request: Request::new("GET", "https://x.dev/a"),
        }));
        let failed = LogItem::from(TransactionItem::new(0, "transfer", "TX").with_error(true));
        let ok = LogItem::from(TransactionItem::new(0, "transfer", "TX").with_duration(12.0));

        assert_eq!(row_status(&pending), RowStatus::Pending);
        assert!(summarize_item(&pending).duration.starts_with("pending "));
        assert_eq!(row_status(&failed), RowStatus::Error);
        let row = summarize_item(&ok);
        assert_eq!(row.status, RowStatus::Normal);
        assert_eq!(row.tag, "TX");
        assert_eq!(row.duration, "12 ms");
    }

    #[test]
    fn collapse_then_expand_nested_node() {
        let view = tree_view();
        let mut state = DetailState {
            cursor: 1,
            ..DetailState::default()
        };

        let ctx = DetailContext::new(Some(&view), Some(&state.collapsed));
        assert!(state.collapse(&ctx));
        assert!(state.collapsed.contains(&1));

        let ctx = DetailContext::new(Some(&view), Some(&state.collapsed));
        assert_eq!(ctx.visible_indices[..3], [0, 1, 4]);
        assert!(state.expand(&ctx));
        assert!(state.collapsed.is_empty());
    }

    #[test]
    fn collapse_on_leaf_jumps_to_parent() {
        let view = tree_view();
        let mut state = DetailState {
            cursor: 3,
            ..DetailState::default()
        };

        let ctx = DetailContext::new(Some(&view), Some(&state.collapsed));
        assert!(state.collapse(&ctx));
        assert_eq!(state.cursor, 1);
        assert!(state.collapsed.is_empty());

        state.cursor = 0;
        assert!(state.toggle(&ctx));
        assert!(state.collapsed.contains(&0));

        let ctx = DetailContext::new(Some(&view), Some(&state.collapsed));
        assert!(ctx.visible_len() < view.lines.len());
        state.clamp(0);
        assert_eq!(state.cursor, 0);
    }
}
