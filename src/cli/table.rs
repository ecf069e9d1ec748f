//! Plain-text session table for `list` and `watch`.

use crate::models::Session;
use chrono::{DateTime, Utc};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const HEADERS: [&str; 8] = ["NAME", "PROJECT", "STATUS", "UPTIME", "CPU%", "MEM%", "PID", "DIR"];

/// Longest cell printed for the name, project and directory columns
const MAX_CELL_WIDTH: usize = 40;

/// Render sessions as an aligned table, one row per session.
pub fn render(sessions: &[Session], now: DateTime<Utc>) -> String {
    if sessions.is_empty() {
        return "No Claude sessions found.\n".to_string();
    }

    let rows: Vec<[String; 8]> = sessions.iter().map(|s| row(s, now)).collect();

    let mut widths = HEADERS.map(|h| h.width());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.width());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &HEADERS.map(str::to_string), &widths);
    for row in &rows {
        push_line(&mut out, row, &widths);
    }
    out
}

fn row(session: &Session, now: DateTime<Utc>) -> [String; 8] {
    [
        truncate(&session.name, MAX_CELL_WIDTH),
        truncate(&session.project, MAX_CELL_WIDTH),
        session.status.label().to_string(),
        session.uptime(now),
        format!("{:.1}", session.cpu_percent),
        format!("{:.1}", session.mem_percent),
        session
            .process_id
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "-".to_string()),
        truncate_left(&session.working_directory, MAX_CELL_WIDTH),
    ]
}

fn push_line(out: &mut String, cells: &[String; 8], widths: &[usize; 8]) {
    let last = cells.len() - 1;
    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        out.push_str(cell);
        if i < last {
            let pad = width.saturating_sub(cell.width()) + 2;
            out.extend(std::iter::repeat(' ').take(pad));
        }
    }
    out.push('\n');
}

/// Cut `text` to `max` display columns, ending in `…`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

/// Like [`truncate`] but keeps the end, which is the informative part of a path.
fn truncate_left(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let mut kept = Vec::new();
    let mut used = 0;
    for c in text.chars().rev() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        kept.push(c);
        used += w;
    }
    std::iter::once('…').chain(kept.into_iter().rev()).collect()
}
