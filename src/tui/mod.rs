use std::{
    collections::HashSet,
    io::{self, Stdout},
    net::SocketAddr,
    time::{Duration, Instant},
};

use crate::ui::detail::{self, DetailSegment, DetailViewModel, SegmentStyle};
use color_eyre::Result;
use crossterm::{
    event::{self, Event as CrosstermEvent, KeyEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use tokio::{sync::mpsc, task};
use tracing::{debug, error};

#[derive(Debug)]
pub enum Event {
    Input(KeyEvent),
    Tick,
    Resize(u16, u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Normal,
    Pending,
    Error,
}

#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub tag: String,
    pub name: String,
    pub duration: String,
    pub status: RowStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputTarget {
    Search,
    Filter,
}

#[derive(Debug, Clone)]
pub struct SearchBarView {
    pub search: String,
    pub filter: String,
    pub case_sensitive: bool,
    pub hide_unrelated: bool,
    pub mime_filter: Option<String>,
    pub editing: Option<InputTarget>,
}

#[derive(Debug, Clone)]
pub struct DetailStateView {
    pub cursor: usize,
    pub collapsed: HashSet<usize>,
}

#[derive(Debug, Clone)]
pub struct AppViewModel {
    pub total_items: usize,
    pub live: bool,
    pub bind_addr: SocketAddr,
    pub timeline: Vec<TimelineEntry>,
    pub selected: Option<usize>,
    pub detail: Option<DetailViewModel>,
    pub detail_state: Option<DetailStateView>,
    pub focus_detail: bool,
    pub detail_scroll: usize,
    pub search_bar: SearchBarView,
    pub status: Option<String>,
}

pub struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    pub fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.hide_cursor()?;

        Ok(Self { terminal })
    }

    pub fn draw<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Frame<'_>),
    {
        self.terminal.draw(f)?;
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(err) = disable_raw_mode() {
            error!(?err, "failed to disable raw mode");
        }

        let mut stdout = io::stdout();
        if let Err(err) = execute!(stdout, LeaveAlternateScreen) {
            error!(?err, "failed to leave alternate screen");
        }

        if let Err(err) = self.terminal.show_cursor() {
            error!(?err, "failed to show cursor");
        }
    }
}

pub fn spawn_event_loop(
    tx: mpsc::UnboundedSender<Event>,
    tick_rate: Duration,
) -> task::JoinHandle<()> {
    task::spawn_blocking(move || {
        let mut last_tick = Instant::now();

        loop {
            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_secs(0));

            match event::poll(timeout) {
                Ok(true) => match event::read() {
                    Ok(CrosstermEvent::Key(key)) => {
                        if tx.send(Event::Input(key)).is_err() {
                            break;
                        }
                    }
                    Ok(CrosstermEvent::Resize(w, h)) => {
                        if tx.send(Event::Resize(w, h)).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        error!(?err, "failed to read terminal event");
                        break;
                    }
                },
                Ok(false) => {}
                Err(err) => {
                    error!(?err, "failed to poll terminal events");
                    break;
                }
            }

            if last_tick.elapsed() >= tick_rate {
                if tx.send(Event::Tick).is_err() {
                    break;
                }
                last_tick = Instant::now();
            }
        }

        debug!("terminal event loop terminated");
    })
}

pub fn render_app(frame: &mut Frame<'_>, view_model: &AppViewModel) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Length(1),
            Constraint::Percentage(40),
            Constraint::Min(5),
            Constraint::Length(2),
        ])
        .split(frame.size());

    render_header(frame, layout[0], view_model);
    render_search_bar(frame, layout[1], &view_model.search_bar);
    render_timeline(frame, layout[2], view_model);
    render_detail(frame, layout[3], view_model);
    render_footer(frame, layout[4], view_model);
}

fn render_header(frame: &mut Frame<'_>, area: Rect, view_model: &AppViewModel) {
    let mode = if view_model.live { "live" } else { "static" };
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .title(format!(
            "netpane: {} shown / {} items ({}) @ {}",
            view_model.timeline.len(),
            view_model.total_items,
            mode,
            view_model.bind_addr
        ))
        .style(Style::default().fg(Color::Cyan));

    frame.render_widget(block, area);
}

fn render_search_bar(frame: &mut Frame<'_>, area: Rect, bar: &SearchBarView) {
    let field = |label: &str, value: &str, target: InputTarget| {
        let editing = bar.editing == Some(target);
        let text = if editing {
            format!("{}: {}_", label, value)
        } else if value.is_empty() {
            format!("{}: -", label)
        } else {
            format!("{}: {}", label, value)
        };
        let style = if editing {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        Span::styled(text, style)
    };
    let flag = |label: &str, on: bool| {
        Span::styled(
            format!("[{}] {}", if on { "x" } else { " " }, label),
            Style::default().fg(if on { Color::LightBlue } else { Color::DarkGray }),
        )
    };

    let line = Line::from(vec![
        field("search", &bar.search, InputTarget::Search),
        Span::raw("  "),
        field("filter", &bar.filter, InputTarget::Filter),
        Span::raw("  "),
        flag("case", bar.case_sensitive),
        Span::raw(" "),
        flag("hide unrelated", bar.hide_unrelated),
        Span::raw("  "),
        Span::styled(
            format!("mime: {}", bar.mime_filter.as_deref().unwrap_or("all")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    frame.render_widget(Paragraph::new(line), area);
}

fn render_timeline(frame: &mut Frame<'_>, area: Rect, view_model: &AppViewModel) {
    let block = Block::default()
        .title("Requests")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if view_model.focus_detail {
            Color::DarkGray
        } else {
            Color::Cyan
        }))
        .title_style(
            Style::default()
                .fg(Color::LightBlue)
                .add_modifier(Modifier::BOLD),
        );

    frame.render_widget(block, area);

    if view_model.timeline.is_empty() {
        let content = Paragraph::new(format!(
            "Waiting for traffic…\n\nPOST events to http://{}/network, /pending, /websocket or /items.\nPress `q` to exit.",
            view_model.bind_addr
        ))
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(Color::Gray));

        frame.render_widget(content, inner(area));
        return;
    }

    let items: Vec<ListItem> = view_model
        .timeline
        .iter()
        .map(|entry| {
            let text = format!("[{}] {} · {}", entry.tag, entry.name, entry.duration);
            let style = match entry.status {
                RowStatus::Normal => Style::default().fg(Color::Gray),
                RowStatus::Pending => Style::default().fg(Color::Yellow),
                RowStatus::Error => Style::default().fg(Color::Red),
            };
            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default())
        .highlight_style(Style::default().add_modifier(Modifier::BOLD).bg(Color::DarkGray));
    let mut state = ListState::default().with_selected(view_model.selected);
    frame.render_stateful_widget(list, inner(area), &mut state);
}

fn render_detail(frame: &mut Frame<'_>, area: Rect, view_model: &AppViewModel) {
    let block = Block::default()
        .title("Details")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if view_model.focus_detail {
            Color::Cyan
        } else {
            Color::DarkGray
        }))
        .title_style(
            Style::default()
                .fg(Color::LightBlue)
                .add_modifier(Modifier::BOLD),
        );

    frame.render_widget(block, area);

    let inner_area = inner(area);

    let Some(detail) = &view_model.detail else {
        let paragraph =
            Paragraph::new("No item selected").style(Style::default().fg(Color::DarkGray));
        frame.render_widget(paragraph, inner_area);
        return;
    };

    let collapsed = view_model.detail_state.as_ref().map(|state| &state.collapsed);
    let cursor = view_model.detail_state.as_ref().map(|state| state.cursor);
    let (visible, has_children) = detail::visible_indices_with_children(detail, collapsed);

    let mut lines: Vec<Line> = vec![
        Line::from(Span::styled(
            detail.header.clone(),
            Style::default()
                .fg(Color::LightBlue)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            detail.footer.clone(),
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )),
    ];

    for (position, &index) in visible.iter().enumerate() {
        let detail_line = &detail.lines[index];
        let mut spans = Vec::new();
        if detail_line.indent > 0 {
            spans.push(Span::raw("  ".repeat(detail_line.indent)));
        }
        let marker = match (has_children[index], collapsed.is_some_and(|set| set.contains(&index))) {
            (true, true) => "▸ ",
            (true, false) => "▾ ",
            (false, _) => "  ",
        };
        spans.push(Span::styled(marker, Style::default().fg(Color::DarkGray)));
        for segment in &detail_line.segments {
            spans.push(Span::styled(segment.text.clone(), style_for_segment(segment)));
        }

        let mut line = Line::from(spans);
        if view_model.focus_detail && cursor == Some(position) {
            line = line.style(Style::default().bg(Color::DarkGray));
        }
        lines.push(line);
    }

    let scroll = view_model.detail_scroll.min(u16::MAX as usize) as u16;
    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    frame.render_widget(paragraph, inner_area);
}

fn render_footer(frame: &mut Frame<'_>, area: Rect, view_model: &AppViewModel) {
    let block = Block::default()
        .borders(Borders::TOP)
        .style(Style::default().fg(Color::DarkGray));

    let text = match &view_model.status {
        Some(status) => status.clone(),
        None => "q quit · / search · f filter · c case · h hide unrelated · m mime · ctrl+k clear · Tab focus · ↑/↓ PgUp/PgDn Home/End · ←/→ Space tree".to_string(),
    };
    let style = if view_model.status.is_some() {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    frame.render_widget(block, area);
    frame.render_widget(Paragraph::new(text).style(style), inner_footer(area));
}

fn inner(area: Rect) -> Rect {
    Rect {
        x: area.x + 1,
        y: area.y + 1,
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(2),
    }
}

fn inner_footer(area: Rect) -> Rect {
    Rect {
        x: area.x,
        y: area.y + 1,
        width: area.width,
        height: area.height.saturating_sub(1),
    }
}

fn style_for_segment(segment: &DetailSegment) -> Style {
    match segment.style {
        SegmentStyle::Plain => Style::default().fg(Color::Gray),
        SegmentStyle::Key => Style::default().fg(Color::Cyan),
        SegmentStyle::Type => Style::default().fg(Color::Yellow),
        SegmentStyle::String => Style::default().fg(Color::Green),
        SegmentStyle::Number => Style::default().fg(Color::LightMagenta),
        SegmentStyle::Boolean => Style::default().fg(Color::LightBlue),
        SegmentStyle::Null => Style::default().fg(Color::DarkGray),
        SegmentStyle::Error => Style::default().fg(Color::Red),
        SegmentStyle::Match => Style::default()
            .fg(Color::Black)
            .bg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    }
}
