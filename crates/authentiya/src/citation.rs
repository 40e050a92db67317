//! Clipboard and citation history.
//!
//! Every copy or paste during a session becomes a [`CitationEntry`]. The user
//! can later mark an entry as cited; the share of cited entries is reported
//! with the session.

use chrono::{DateTime, Utc};

use crate::capture::{ClipboardEvent, ClipboardKind};
use crate::error::{Error, Result};
use crate::store::{CitationEntry, Store};

/// Entries longer than this are shortened for display.
pub const PREVIEW_CHARS: usize = 50;

/// Compute the BLAKE3 hex digest used to address an entry.
#[must_use]
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Build the history entry for a clipboard event.
#[must_use]
pub fn entry_from_clipboard(event: &ClipboardEvent) -> CitationEntry {
    CitationEntry {
        kind: event.kind,
        text: event.text.clone(),
        timestamp: DateTime::from_timestamp_millis(event.timestamp).unwrap_or_else(Utc::now),
        url: event.url.clone().unwrap_or_default(),
        cited: false,
        content_hash: content_hash(&event.text),
    }
}

/// Shorten text to [`PREVIEW_CHARS`] characters, ending in `...` when cut.
#[must_use]
pub fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// Summary of a citation history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CitationStats {
    /// Number of entries.
    pub total: usize,
    /// Entries marked cited.
    pub cited: usize,
    /// Copy entries.
    pub copies: usize,
    /// Paste entries.
    pub pastes: usize,
}

impl CitationStats {
    /// Tally a history.
    #[must_use]
    pub fn of(entries: &[CitationEntry]) -> Self {
        entries.iter().fold(Self::default(), |mut stats, entry| {
            stats.total += 1;
            if entry.cited {
                stats.cited += 1;
            }
            match entry.kind {
                ClipboardKind::Copy => stats.copies += 1,
                ClipboardKind::Paste => stats.pastes += 1,
            }
            stats
        })
    }

    /// Cited share, rounded to a whole percent. Zero for an empty history.
    #[must_use]
    pub fn percentage(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        // Rounds half up with integer arithmetic
        let pct = (self.cited * 200 + self.total) / (self.total * 2);
        u32::try_from(pct).unwrap_or(100)
    }
}

/// Resolve an entry by index or by a content hash prefix.
///
/// Hash prefixes must be at least four characters and match exactly one
/// entry.
#[must_use]
pub fn find(entries: &[CitationEntry], selector: &str) -> Option<usize> {
    let selector = selector.trim();
    if let Ok(index) = selector.parse::<usize>() {
        return (index < entries.len()).then_some(index);
    }
    if selector.len() < 4 {
        return None;
    }
    let mut matches = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.content_hash.starts_with(selector));
    match (matches.next(), matches.next()) {
        (Some((i, _)), None) => Some(i),
        _ => None,
    }
}

/// Mark the entry at `index` as cited and persist the history.
///
/// Returns `false` if the entry was already cited.
///
/// # Errors
///
/// Returns a validation error if there is no entry at `index`, or a storage
/// error if the history cannot be written.
pub fn mark_cited(store: &Store, index: usize) -> Result<bool> {
    let mut entries = store.load_list::<CitationEntry>()?;
    let entry = entries
        .get_mut(index)
        .ok_or_else(|| Error::validation(format!("No copy/paste event at index {index}.")))?;
    if entry.cited {
        return Ok(false);
    }
    entry.cited = true;
    store.save_list(&entries)?;
    Ok(true)
}
