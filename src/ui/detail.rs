use std::collections::HashSet;

use html_escape::decode_html_entities;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::{
    item::{Content, Item, LogItem, MediaKind},
    protocol::iso_timestamp,
    search::Marker,
};

static TAG_GAP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s*<").unwrap());

const RAW_PREVIEW_CHARS: usize = 96;

#[derive(Debug, Clone)]
pub struct DetailViewModel {
    pub header: String,
    pub footer: String,
    pub lines: Vec<DetailLine>,
}

#[derive(Debug, Clone)]
pub struct DetailLine {
    pub indent: usize,
    pub segments: Vec<DetailSegment>,
}

#[derive(Debug, Clone)]
pub struct DetailSegment {
    pub text: String,
    pub style: SegmentStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStyle {
    Plain,
    Key,
    Type,
    String,
    Number,
    Boolean,
    Null,
    Error,
    Match,
}

/// Header, then `params`, `result` and `meta` trees. Segments containing the
/// current search text are restyled as matches.
pub fn build_detail_view(item: &LogItem, marker: Option<&Marker>) -> DetailViewModel {
    let header = format!(
        "[{}] {} • {}",
        item.tag(),
        display_name(item),
        iso_timestamp(item.timestamp())
    );

    let mut footer = format!("{} · {}", item.kind().label(), format_duration(item.duration()));
    if let LogItem::WebSocket(frame) = item {
        footer.push_str(" · ");
        footer.push_str(frame.frame_kind().as_str());
    }
    if let Some(mime) = item.mime_type() {
        footer.push_str(" · ");
        footer.push_str(mime);
    }
    if item.is_error() {
        footer.push_str(" · error");
    }

    let mut lines = Vec::new();
    push_value_lines(&mut lines, 0, "params", &item.params());
    push_content_lines(&mut lines, &item.content());
    push_value_lines(&mut lines, 0, "meta", &item.meta());

    if item.is_error() {
        mark_error_keys(&mut lines);
    }
    if let Some(marker) = marker {
        highlight_matches(&mut lines, marker);
    }

    DetailViewModel {
        header,
        footer,
        lines,
    }
}

pub fn display_name(item: &LogItem) -> String {
    let name = item.name();
    if name.is_empty() {
        item.kind().label().to_string()
    } else {
        name
    }
}

pub fn visible_indices_with_children(
    detail: &DetailViewModel,
    collapsed: Option<&HashSet<usize>>,
) -> (Vec<usize>, Vec<bool>) {
    let has_children = compute_has_children(&detail.lines);
    let mut visible = Vec::new();
    let mut hidden_indent: Option<usize> = None;

    for (index, line) in detail.lines.iter().enumerate() {
        if let Some(indent) = hidden_indent {
            if line.indent > indent {
                continue;
            }
            hidden_indent = None;
        }

        visible.push(index);

        let is_collapsed = collapsed.map(|set| set.contains(&index)).unwrap_or(false);

        if has_children[index] && is_collapsed {
            hidden_indent = Some(line.indent);
        }
    }

    (visible, has_children)
}

fn push_content_lines(lines: &mut Vec<DetailLine>, content: &Content) {
    let (Some(mime_type), Some(raw)) = (content.mime_type(), content.raw()) else {
        push_value_lines(lines, 0, "result", content.value());
        return;
    };

    lines.push(DetailLine {
        indent: 0,
        segments: vec![
            key_segment("result"),
            DetailSegment {
                text: format!("{} ({})", mime_type, format_bytes(raw.len())),
                style: SegmentStyle::Type,
            },
        ],
    });

    match content.media_kind() {
        Some(MediaKind::Html | MediaKind::Xml) => {
            for mut line in render_markup(raw) {
                line.indent += 1;
                lines.push(line);
            }
        }
        _ => lines.push(DetailLine {
            indent: 1,
            segments: vec![DetailSegment {
                text: truncate(raw, RAW_PREVIEW_CHARS),
                style: SegmentStyle::Plain,
            }],
        }),
    }
}

/// One line per key or element; containers get their children one level
/// deeper so they can be collapsed.
fn push_value_lines(lines: &mut Vec<DetailLine>, indent: usize, label: &str, value: &Value) {
    match value {
        Value::String(text) => {
            if text.is_empty() {
                lines.push(labelled(indent, label, "\"\"", SegmentStyle::String));
                return;
            }

            let mut pieces = text.lines();
            if let Some(first) = pieces.next() {
                lines.push(labelled(indent, label, first, SegmentStyle::String));
            }

            for extra in pieces {
                lines.push(DetailLine {
                    indent: indent + 1,
                    segments: vec![DetailSegment {
                        text: extra.to_string(),
                        style: SegmentStyle::String,
                    }],
                });
            }
        }
        Value::Number(number) => {
            lines.push(labelled(indent, label, &number.to_string(), SegmentStyle::Number));
        }
        Value::Bool(boolean) => {
            lines.push(labelled(indent, label, &boolean.to_string(), SegmentStyle::Boolean));
        }
        Value::Null => {
            lines.push(labelled(indent, label, "null", SegmentStyle::Null));
        }
        Value::Array(items) => {
            let summary = format!("[{}]", items.len());
            lines.push(labelled(indent, label, &summary, SegmentStyle::Type));
            for (index, item) in items.iter().enumerate() {
                push_value_lines(lines, indent + 1, &index.to_string(), item);
            }
        }
        Value::Object(map) => {
            let summary = match map.len() {
                1 => "{1 key}".to_string(),
                count => format!("{{{} keys}}", count),
            };
            lines.push(labelled(indent, label, &summary, SegmentStyle::Type));
            for (key, item) in map {
                push_value_lines(lines, indent + 1, key, item);
            }
        }
    }
}

fn labelled(indent: usize, label: &str, text: &str, style: SegmentStyle) -> DetailLine {
    DetailLine {
        indent,
        segments: vec![
            key_segment(label),
            DetailSegment {
                text: text.to_string(),
                style,
            },
        ],
    }
}

fn key_segment(label: &str) -> DetailSegment {
    DetailSegment {
        text: format!("{}: ", label),
        style: SegmentStyle::Key,
    }
}

/// Failed items get their `result` root and any `error`/`errors` keys flagged.
fn mark_error_keys(lines: &mut [DetailLine]) {
    for line in lines.iter_mut() {
        let indent = line.indent;
        let Some(segment) = line.segments.first_mut() else {
            continue;
        };
        if segment.style != SegmentStyle::Key {
            continue;
        }
        let flagged = match segment.text.trim_end_matches(": ") {
            "result" => indent == 0,
            "error" | "errors" => true,
            _ => false,
        };
        if flagged {
            segment.style = SegmentStyle::Error;
        }
    }
}

fn highlight_matches(lines: &mut [DetailLine], marker: &Marker) {
    for segment in lines.iter_mut().flat_map(|line| line.segments.iter_mut()) {
        let text = match segment.style {
            SegmentStyle::Key | SegmentStyle::Error => segment.text.trim_end_matches(": "),
            _ => segment.text.as_str(),
        };
        if marker.matches_text(text) {
            segment.style = SegmentStyle::Match;
        }
    }
}

fn render_markup(markup: &str) -> Vec<DetailLine> {
    let normalized = TAG_GAP_RE.replace_all(markup, ">\n<");
    let mut lines = Vec::new();
    let mut indent = 0usize;

    for raw_line in normalized.lines() {
        let trimmed = raw_line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with("</") {
            indent = indent.saturating_sub(1);
        }

        lines.push(DetailLine {
            indent,
            segments: parse_markup_segments(trimmed),
        });

        let closes_itself = trimmed.ends_with("/>") || trimmed.contains("</");
        if trimmed.starts_with('<')
            && !trimmed.starts_with("</")
            && !closes_itself
            && !trimmed.starts_with("<!")
            && !trimmed.starts_with("<?")
        {
            indent = indent.saturating_add(1);
        }
    }

    if lines.is_empty() {
        lines.push(DetailLine {
            indent: 0,
            segments: vec![DetailSegment {
                text: markup.to_string(),
                style: SegmentStyle::String,
            }],
        });
    }

    lines
}

fn parse_markup_segments(line: &str) -> Vec<DetailSegment> {
    let mut segments = Vec::new();
    let mut rest = line;

    while !rest.is_empty() {
        if let Some(pos) = rest.find('<') {
            if pos > 0 {
                let (text, tail) = rest.split_at(pos);
                segments.push(DetailSegment {
                    text: decode_html_entities(text).into_owned(),
                    style: SegmentStyle::String,
                });
                rest = tail;
                continue;
            }

            if let Some(end) = rest.find('>') {
                let (tag, tail) = rest.split_at(end + 1);
                segments.push(DetailSegment {
                    text: tag.to_string(),
                    style: SegmentStyle::Type,
                });
                rest = tail;
                continue;
            }
        }

        segments.push(DetailSegment {
            text: decode_html_entities(rest).into_owned(),
            style: SegmentStyle::String,
        });
        break;
    }

    segments
}

fn compute_has_children(lines: &[DetailLine]) -> Vec<bool> {
    let mut result = vec![false; lines.len()];
    for (index, line) in lines.iter().enumerate() {
        let current_indent = line.indent;
        let mut walker = index + 1;
        while walker < lines.len() {
            let next_indent = lines[walker].indent;
            if next_indent <= current_indent {
                break;
            }
            if next_indent == current_indent + 1 {
                result[index] = true;
                break;
            }
            walker += 1;
        }
    }
    result
}

pub fn format_duration(millis: f64) -> String {
    if millis >= 1_000.0 {
        format!("{:.2} s", millis / 1_000.0)
    } else {
        format!("{:.0} ms", millis)
    }
}

fn format_bytes(len: usize) -> String {
    let mut bytes = len as f64;
    let units = ["B", "KB", "MB", "GB"];
    let mut unit_index = 0;
    while bytes >= 1024.0 && unit_index + 1 < units.len() {
        bytes /= 1024.0;
        unit_index += 1;
    }
    if unit_index == 0 {
        format!("{} B", len)
    } else {
        format!("{:.2} {}", bytes, units[unit_index])
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }

    let truncated: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", truncated)
}
