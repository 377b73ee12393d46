// src/notify/format.rs
//! Markdown rendering of a batch of updates under a byte budget.

use crate::model::{Entry, Update};

pub const DEFAULT_MAX_BYTES: usize = 18_000;
pub const MAX_RELATED_LINKS: usize = 5;
/// Preview length inside chat and mail messages.
pub const MESSAGE_PREVIEW_CHARS: usize = 300;

const TRUNCATED_NOTE: &str = "...\n\n(content truncated)";
// room kept for the truncation note
const TRUNCATION_SLACK: usize = 100;
// a cut-down section shorter than this is not worth sending
const MIN_TRUNCATED_SECTION: usize = 500;

/// Opening of the entry's extracted text (captions first, then the page or
/// feed body), cut to `max_chars` with a trailing `...` when shortened.
pub fn preview(e: &Entry, max_chars: usize) -> Option<String> {
    let source = if e.text.trim().is_empty() { &e.body } else { &e.text };
    let flat = source.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.is_empty() || max_chars == 0 {
        return None;
    }
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => Some(format!("{}...", &flat[..cut])),
        None => Some(flat),
    }
}

fn section(u: &Update) -> String {
    let e = &u.entry;
    let published = e
        .published_at
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| e.captured_at.format("%Y-%m-%d %H:%M UTC (captured)").to_string());
    let link = e.link.as_deref().unwrap_or(&u.source_address);

    let mut s = format!("### {}\n\n", e.title);
    s.push_str(&format!("**Source:** {}\n\n", u.source_name));
    s.push_str(&format!("**Published:** {published}\n\n"));
    s.push_str(&format!("**Link:** [open]({link})\n\n"));
    if !e.summary.trim().is_empty() {
        s.push_str(&format!("**Summary:**\n\n{}\n\n", e.summary.trim()));
    }
    if !e.outline.trim().is_empty() {
        s.push_str(&format!("**Outline:**\n\n{}\n\n", e.outline.trim()));
    }
    if let Some(p) = preview(e, MESSAGE_PREVIEW_CHARS) {
        s.push_str(&format!("**Preview:**\n\n> {p}\n\n"));
    }
    if !u.links.is_empty() {
        s.push_str("**Related links:**\n\n");
        for l in u.links.iter().take(MAX_RELATED_LINKS) {
            let title = if l.title.trim().is_empty() { &l.href } else { &l.title };
            s.push_str(&format!("- [{}]({})\n", title.trim(), l.href));
        }
        s.push('\n');
    }
    s.push_str("---\n\n");
    s
}

/// Largest prefix of `s` that fits in `max` bytes without splitting a char.
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    &s[..cut]
}

/// One markdown document for `updates`, or `None` when there is nothing to send.
///
/// Sections are appended in order while they fit in `max_bytes`. A section
/// that alone exceeds the budget is cut down (or skipped when too little room
/// remains); the first ordinary section that would overflow ends the document.
pub fn format_markdown(heading: &str, updates: &[Update], max_bytes: usize) -> Option<String> {
    if updates.is_empty() {
        return None;
    }
    let mut doc = format!("## {heading}\n\n");
    let mut added = 0usize;

    for u in updates {
        let mut sec = section(u);
        if doc.len() + sec.len() > max_bytes {
            if sec.len() > max_bytes {
                let limit = max_bytes.saturating_sub(doc.len() + TRUNCATION_SLACK);
                if limit <= MIN_TRUNCATED_SECTION {
                    tracing::warn!(title = %u.entry.title, "update too large for message, skipped");
                    continue;
                }
                sec = format!("{}{}", truncate_bytes(&sec, limit), TRUNCATED_NOTE);
            } else {
                tracing::warn!(remaining = updates.len() - added, "message budget reached, dropping remaining updates");
                break;
            }
        }
        doc.push_str(&sec);
        added += 1;
    }

    (added > 0).then_some(doc)
}

/// Subject line for channels that want one.
pub fn subject(updates: &[Update]) -> String {
    match updates {
        [one] => format!("{}: {}", one.source_name, one.entry.title),
        many => format!("{} new updates", many.len()),
    }
}
