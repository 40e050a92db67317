//! Text rendering of the popup and options views.

use std::fmt::{Display, Write as _};

use chrono::{DateTime, TimeZone, Timelike, Utc};

use crate::catalog::Catalog;
use crate::citation::{preview, CitationStats};
use crate::session::SessionState;
use crate::store::{CitationEntry, KeystrokeLog, SessionHistoryEntry};
use crate::surface::host_of;

const MISSING: &str = "--";

/// Format seconds as `MM:SS`. Minutes are not capped at 59.
#[must_use]
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Format a time of day as `h:mm AM`.
#[must_use]
pub fn format_time<Tz: TimeZone>(time: &DateTime<Tz>) -> String {
    let (pm, hour) = time.hour12();
    format!(
        "{hour}:{:02} {}",
        time.minute(),
        if pm { "PM" } else { "AM" }
    )
}

/// Render the popup: the pre-session view while idle, the session view
/// while active. Times are shown in `tz`.
#[must_use]
pub fn render_status<Tz>(state: &SessionState, events: usize, catalog: &Catalog, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut out = String::new();
    match state {
        SessionState::Idle => {
            out.push_str("No active session.\n");
            if !catalog.is_empty() {
                out.push_str("\nCourses:\n");
                for course in &catalog.courses {
                    let _ = writeln!(out, "  {} ({})", course.display_name(), course.value);
                    for assignment in &course.assignments {
                        let _ = writeln!(out, "    - {} ({})", assignment.label, assignment.value);
                    }
                }
            }
            out.push_str(
                "\nStart a session with: authentiya start --course <COURSE> --assignment <ASSIGNMENT>\n",
            );
        }
        SessionState::Active(session) => {
            let started = session.started_at.with_timezone(tz);
            let field = session.field.as_ref();
            let name = field.and_then(|f| f.name.as_deref()).unwrap_or(MISSING);
            let url = field
                .and_then(|f| f.url.as_deref())
                .map_or(MISSING, host_of);

            let _ = writeln!(out, "Session active ({})", session.key);
            let _ = writeln!(out, "  Course:      {}", session.course);
            let _ = writeln!(out, "  Assignment:  {}", session.assignment);
            let _ = writeln!(out, "  Started today at {}", format_time(&started));
            let _ = writeln!(out, "  Active time: {}", format_clock(session.elapsed));
            let _ = writeln!(out, "  Word count:  {}", session.word_count);
            let _ = writeln!(out, "  Field:       {name}");
            let _ = writeln!(out, "  Page:        {url}");
            let _ = writeln!(out, "  Events:      {events}");
        }
    }
    out
}

/// Render the keystroke log as an aligned table.
#[must_use]
pub fn render_events(log: &KeystrokeLog, limit: Option<usize>) -> String {
    let skip = limit.map_or(0, |n| log.data.len().saturating_sub(n));
    let rows: Vec<Vec<String>> = log.data.iter().skip(skip).map(|r| r.fields()).collect();
    if rows.is_empty() {
        return "No events recorded\n".to_string();
    }

    let mut widths: Vec<usize> = log.label.iter().map(|l| l.chars().count()).collect();
    for row in &rows {
        for (i, field) in row.iter().enumerate() {
            let len = field.chars().count();
            match widths.get_mut(i) {
                Some(w) => *w = (*w).max(len),
                None => widths.push(len),
            }
        }
    }

    let mut out = String::new();
    push_row(&mut out, &log.label, &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

/// Render the citation view.
#[must_use]
pub fn render_citations(entries: &[CitationEntry]) -> String {
    let stats = CitationStats::of(entries);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Copy/paste events: {}  Cited: {}%",
        stats.total,
        stats.percentage()
    );
    if entries.is_empty() {
        out.push_str("No copy/paste events detected\n");
        return out;
    }
    for (i, entry) in entries.iter().enumerate() {
        let status = if entry.cited { "Cited ✓" } else { "Not cited ✗" };
        let host = if entry.url.is_empty() {
            MISSING
        } else {
            host_of(&entry.url)
        };
        let _ = writeln!(
            out,
            "[{i}] {:<5} {}  {}  {host}  {status}",
            entry.kind.to_string(),
            entry.content_hash.get(..8).unwrap_or(MISSING),
            preview(&entry.text),
        );
    }
    out
}

/// Render past sessions. Dates are shown in `tz`.
#[must_use]
pub fn render_history<Tz>(entries: &[SessionHistoryEntry], tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if entries.is_empty() {
        return "No past sessions\n".to_string();
    }
    let mut out = String::new();
    for entry in entries {
        let started = entry.session_start_time.with_timezone(tz);
        let _ = writeln!(out, "{} / {}", entry.current_course, entry.current_assignment);
        let _ = writeln!(
            out,
            "  {} at {}",
            started.format("%Y-%m-%d"),
            format_time(&started)
        );
        let _ = writeln!(
            out,
            "  Words: {}  Time: {}  Citations: {} ({}% cited)  Events: {}",
            entry.word_count,
            format_clock(entry.active_session_time),
            entry.citation_count,
            entry.cited_percentage,
            entry.event_count
        );
    }
    out
}

/// Render a UTC instant for machine-facing output.
#[must_use]
pub fn format_instant(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
