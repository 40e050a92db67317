//! Typed records kept in the store, one per key.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::capture::{ClipboardKind, EventRecord, DATA_LABELS};

/// The named keys of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Current session snapshot.
    SessionData,
    /// The keystroke log of the active session.
    KeystrokeData,
    /// Copy/paste entries of the active session.
    CitationHistory,
    /// Summaries of submitted sessions.
    SessionHistory,
    /// Tracking toggle changes.
    ToggleTrackingData,
    /// Current position of the tracking toggle.
    ToggleState,
    /// Identifier of the current session.
    SessionKey,
    /// Origins verified as Canvas instances.
    CanvasDomains,
}

impl StoreKey {
    /// All keys, in display order.
    pub const ALL: [Self; 8] = [
        Self::SessionData,
        Self::KeystrokeData,
        Self::CitationHistory,
        Self::SessionHistory,
        Self::ToggleTrackingData,
        Self::ToggleState,
        Self::SessionKey,
        Self::CanvasDomains,
    ];

    /// The key as stored.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionData => "sessionData",
            Self::KeystrokeData => "keystrokeData",
            Self::CitationHistory => "citationHistory",
            Self::SessionHistory => "sessionHistory",
            Self::ToggleTrackingData => "toggleTrackingData",
            Self::ToggleState => "toggleState",
            Self::SessionKey => "sessionKey",
            Self::CanvasDomains => "canvas_domains",
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value stored under a fixed key.
pub trait Record: Serialize + DeserializeOwned {
    /// The key this record lives under.
    const KEY: StoreKey;
}

/// An element of a list stored under a fixed key.
pub trait ListItem: Serialize + DeserializeOwned {
    /// The key the list lives under.
    const KEY: StoreKey;
}

/// The last focused text field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldInfo {
    /// Element name, or its id when it has no name.
    pub name: Option<String>,
    /// Page URL.
    pub url: Option<String>,
}

/// Snapshot of the session, stored under `sessionData`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionData {
    /// Whether a session is being tracked.
    pub session_active: bool,
    /// When the session started.
    pub session_start_time: Option<DateTime<Utc>>,
    /// Elapsed seconds.
    pub active_session_time: u64,
    /// Word count of the last focused field.
    pub word_count: u64,
    /// Last focused field.
    pub current_field: Option<FieldInfo>,
    /// Course display name.
    pub current_course: Option<String>,
    /// Assignment display name.
    pub current_assignment: Option<String>,
    /// Course identifier.
    pub course_value: Option<String>,
    /// Assignment identifier.
    pub assignment_value: Option<String>,
}

impl Record for SessionData {
    const KEY: StoreKey = StoreKey::SessionData;
}

/// The keystroke log, stored under `keystrokeData` as `{label, data}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystrokeLog {
    /// Column labels.
    #[serde(default = "default_labels")]
    pub label: Vec<String>,
    /// Event Records in capture order.
    #[serde(default, deserialize_with = "lenient_rows")]
    pub data: Vec<EventRecord>,
}

impl Default for KeystrokeLog {
    fn default() -> Self {
        Self {
            label: default_labels(),
            data: Vec::new(),
        }
    }
}

impl Record for KeystrokeLog {
    const KEY: StoreKey = StoreKey::KeystrokeData;
}

fn default_labels() -> Vec<String> {
    DATA_LABELS.iter().map(ToString::to_string).collect()
}

/// Keep the rows that parse; one bad row must not discard the whole log.
fn lenient_rows<'de, D>(deserializer: D) -> Result<Vec<EventRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(rows
        .unwrap_or_default()
        .into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "dropping malformed keystroke row");
                None
            }
        })
        .collect())
}

/// A copy/paste entry, stored in the `citationHistory` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationEntry {
    /// Copy or paste.
    #[serde(rename = "type")]
    pub kind: ClipboardKind,
    /// The copied or pasted text.
    pub text: String,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Page URL.
    #[serde(default)]
    pub url: String,
    /// Whether the user marked it as attributed.
    #[serde(default)]
    pub cited: bool,
    /// BLAKE3 hex digest of `text`.
    #[serde(default)]
    pub content_hash: String,
}

impl ListItem for CitationEntry {
    const KEY: StoreKey = StoreKey::CitationHistory;
}

/// Summary of a submitted session, stored in the `sessionHistory` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistoryEntry {
    /// Session identifier.
    #[serde(default)]
    pub session_key: Option<String>,
    /// Course display name.
    #[serde(default)]
    pub current_course: String,
    /// Assignment display name.
    #[serde(default)]
    pub current_assignment: String,
    /// When the session started.
    pub session_start_time: DateTime<Utc>,
    /// Elapsed seconds at submit.
    #[serde(default)]
    pub active_session_time: u64,
    /// Word count at submit.
    #[serde(default)]
    pub word_count: u64,
    /// Number of copy/paste entries.
    #[serde(default)]
    pub citation_count: usize,
    /// Share of entries marked cited, 0 to 100.
    #[serde(default)]
    pub cited_percentage: u32,
    /// Number of Event Records exported.
    #[serde(default)]
    pub event_count: usize,
}

impl ListItem for SessionHistoryEntry {
    const KEY: StoreKey = StoreKey::SessionHistory;
}

/// Position of the tracking toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleState {
    /// Tracking switched on.
    On,
    /// Tracking switched off.
    Off,
}

impl ToggleState {
    /// Parse `on`/`off`, ignoring case.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("on") {
            Some(Self::On)
        } else if s.eq_ignore_ascii_case("off") {
            Some(Self::Off)
        } else {
            None
        }
    }
}

impl fmt::Display for ToggleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
        }
    }
}

/// A toggle change, stored in the `toggleTrackingData` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleEntry {
    /// New toggle position.
    pub state: ToggleState,
    /// When it changed.
    pub timestamp: DateTime<Utc>,
}

impl ListItem for ToggleEntry {
    const KEY: StoreKey = StoreKey::ToggleTrackingData;
}

/// Current toggle position, stored under `toggleState`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToggleFlag(pub bool);

impl Record for ToggleFlag {
    const KEY: StoreKey = StoreKey::ToggleState;
}

/// Identifier of the current session, stored under `sessionKey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(pub String);

impl SessionKey {
    /// A key derived from a start time in milliseconds.
    #[must_use]
    pub fn from_time(time: DateTime<Utc>) -> Self {
        Self(time.timestamp_millis().to_string())
    }
}

impl Record for SessionKey {
    const KEY: StoreKey = StoreKey::SessionKey;
}

/// Canvas origins confirmed by a course listing request, stored under
/// `canvas_domains`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanvasDomains(pub Vec<String>);

impl CanvasDomains {
    /// Add an origin unless it is already known. Returns `true` if added.
    pub fn insert(&mut self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/').to_ascii_lowercase();
        if self.0.contains(&origin) {
            return false;
        }
        self.0.push(origin);
        true
    }
}

impl Record for CanvasDomains {
    const KEY: StoreKey = StoreKey::CanvasDomains;
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canvas_domains_insert_dedupes() {
        let mut domains = CanvasDomains::default();
        assert!(domains.insert("https://School.Instructure.com/"));
        assert!(!domains.insert("https://school.instructure.com"));
        assert_eq!(domains.0, ["https://school.instructure.com"]);
    }

    #[test]
    fn test_store_key_names() {
        let names: Vec<_> = StoreKey::ALL.iter().map(StoreKey::as_str).collect();
        assert_eq!(
            names,
            [
                "sessionData",
                "keystrokeData",
                "citationHistory",
                "sessionHistory",
                "toggleTrackingData",
                "toggleState",
                "sessionKey",
                "canvas_domains"
            ]
        );
    }

    #[test]
    fn test_session_data_uses_extension_field_names() {
        let data = SessionData {
            session_active: true,
            active_session_time: 12,
            current_course: Some("CS 101".to_string()),
            ..SessionData::default()
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["sessionActive"], true);
        assert_eq!(json["activeSessionTime"], 12);
        assert_eq!(json["currentCourse"], "CS 101");
    }

    #[test]
    fn test_session_data_tolerates_missing_fields() {
        let data: SessionData = serde_json::from_str(r#"{"sessionActive": true}"#).unwrap();
        assert!(data.session_active);
        assert!(data.session_start_time.is_none());
        assert_eq!(data.word_count, 0);
    }

    #[test]
    fn test_keystroke_log_drops_bad_rows() {
        let json = r#"{
            "label": ["type","key","timestamp","hostname","elementID","elementName"],
            "data": [
                ["keydown","a",1,"example.com","",""],
                "garbage",
                ["keyup","a",2,"example.com","",""]
            ]
        }"#;
        let log: KeystrokeLog = serde_json::from_str(json).unwrap();
        assert_eq!(log.data.len(), 2);
        assert_eq!(log.data[1].timestamp, 2);
    }

    #[test]
    fn test_keystroke_log_defaults() {
        let log: KeystrokeLog = serde_json::from_str(r#"{"data": null}"#).unwrap();
        assert_eq!(log.label, default_labels());
        assert!(log.data.is_empty());
    }

    #[test]
    fn test_toggle_state_parse() {
        assert_eq!(ToggleState::parse("ON"), Some(ToggleState::On));
        assert_eq!(ToggleState::parse("off"), Some(ToggleState::Off));
        assert_eq!(ToggleState::parse("maybe"), None);
    }

    #[test]
    fn test_toggle_entry_json() {
        let entry: ToggleEntry =
            serde_json::from_str(r#"{"state":"on","timestamp":"2025-03-09T14:00:00.000Z"}"#)
                .unwrap();
        assert_eq!(entry.state, ToggleState::On);
        assert_eq!(entry.timestamp.timestamp(), 1_741_528_800);
    }

    #[test]
    fn test_session_key_from_time() {
        let time = DateTime::from_timestamp_millis(1_741_528_800_123).unwrap();
        assert_eq!(SessionKey::from_time(time).0, "1741528800123");
    }
}
