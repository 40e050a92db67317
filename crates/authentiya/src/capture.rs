//! Core capture types for authentiya.
//!
//! This module defines the Event Record stored in the keystroke log, the raw
//! input events a page reports, and the [`Capturer`] that turns one into the
//! other.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::message::{Command, FieldInfoUpdate};
use crate::surface::{host_of, origin_of, Surface, SurfaceMatcher};

/// The kind of action an Event Record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A key was pressed.
    #[serde(rename = "keydown")]
    KeyDown,
    /// A key was released.
    #[serde(rename = "keyup")]
    KeyUp,
    /// Text was copied.
    #[serde(rename = "copy")]
    Copy,
    /// Text was pasted.
    #[serde(rename = "paste")]
    Paste,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyDown => write!(f, "keydown"),
            Self::KeyUp => write!(f, "keyup"),
            Self::Copy => write!(f, "copy"),
            Self::Paste => write!(f, "paste"),
        }
    }
}

/// Column labels of the keystroke log, in field order.
pub const DATA_LABELS: [&str; 6] = [
    "type",
    "key",
    "timestamp",
    "hostname",
    "elementID",
    "elementName",
];

/// One captured keystroke, copy or paste.
///
/// Serialized as the fixed-order array
/// `[type, key, timestamp, hostname, elementID, elementName]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EventRow", into = "EventRow")]
pub struct EventRecord {
    /// What happened.
    pub kind: EventKind,
    /// The key for keyboard events, the text for clipboard events.
    pub key: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Host of the page the event came from.
    pub hostname: String,
    /// `id` attribute of the focused element.
    pub element_id: String,
    /// `name` attribute of the focused element.
    pub element_name: String,
}

#[derive(Serialize, Deserialize)]
struct EventRow(
    EventKind,
    String,
    i64,
    String,
    Option<String>,
    Option<String>,
);

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        Self {
            kind: row.0,
            key: row.1,
            timestamp: row.2,
            hostname: row.3,
            element_id: row.4.unwrap_or_default(),
            element_name: row.5.unwrap_or_default(),
        }
    }
}

impl From<EventRecord> for EventRow {
    fn from(record: EventRecord) -> Self {
        Self(
            record.kind,
            record.key,
            record.timestamp,
            record.hostname,
            Some(record.element_id),
            Some(record.element_name),
        )
    }
}

impl EventRecord {
    /// The record's fields as strings, in [`DATA_LABELS`] order.
    #[must_use]
    pub fn fields(&self) -> Vec<String> {
        vec![
            self.kind.to_string(),
            self.key.clone(),
            self.timestamp.to_string(),
            self.hostname.clone(),
            self.element_id.clone(),
            self.element_name.clone(),
        ]
    }
}

/// Whether a clipboard action was a copy or a paste.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipboardKind {
    /// Text copied out of the page.
    Copy,
    /// Text pasted into the page.
    Paste,
}

impl From<ClipboardKind> for EventKind {
    fn from(kind: ClipboardKind) -> Self {
        match kind {
            ClipboardKind::Copy => Self::Copy,
            ClipboardKind::Paste => Self::Paste,
        }
    }
}

impl fmt::Display for ClipboardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        EventKind::from(*self).fmt(f)
    }
}

/// A copy or paste seen on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardEvent {
    /// Copy or paste.
    pub kind: ClipboardKind,
    /// The text involved.
    pub text: String,
    /// Page URL, when known.
    pub url: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl ClipboardEvent {
    /// The Event Record this clipboard action adds to the keystroke log.
    #[must_use]
    pub fn to_record(&self) -> EventRecord {
        EventRecord {
            kind: self.kind.into(),
            key: self.text.clone(),
            timestamp: self.timestamp,
            hostname: self.url.as_deref().map(host_of).unwrap_or_default().to_string(),
            element_id: String::new(),
            element_name: String::new(),
        }
    }
}

/// The DOM event a page reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomEvent {
    /// The page finished loading.
    Load,
    /// An element gained focus.
    FocusIn,
    /// The value of an element changed.
    Input,
    /// A key was pressed.
    KeyDown,
    /// A key was released.
    KeyUp,
    /// Text was copied.
    Copy,
    /// Text was pasted.
    Paste,
}

/// The element an input event targeted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInfo {
    /// Tag name, e.g. `input` or `textarea`.
    pub tag: String,
    /// `type` attribute for inputs.
    #[serde(default, rename = "type")]
    pub input_type: Option<String>,
    /// `id` attribute.
    #[serde(default)]
    pub id: String,
    /// `name` attribute.
    #[serde(default)]
    pub name: String,
    /// Current text content.
    #[serde(default)]
    pub value: Option<String>,
}

impl ElementInfo {
    /// Check whether the element is a plain text input or a textarea.
    #[must_use]
    pub fn is_text_entry(&self) -> bool {
        if self.tag.eq_ignore_ascii_case("textarea") {
            return true;
        }
        self.tag.eq_ignore_ascii_case("input")
            && self
                .input_type
                .as_deref()
                .map_or(true, |t| t.eq_ignore_ascii_case("text"))
    }
}

/// A raw input event as reported by a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    /// Which DOM event fired.
    pub event: DomEvent,
    /// URL of the page.
    pub url: String,
    /// Key for keyboard events.
    #[serde(default)]
    pub key: Option<String>,
    /// Selected or pasted text for clipboard events.
    #[serde(default)]
    pub text: Option<String>,
    /// Document title for load events.
    #[serde(default)]
    pub title: Option<String>,
    /// Target element (the active element for keyboard events).
    #[serde(default)]
    pub target: Option<ElementInfo>,
    /// Milliseconds since the Unix epoch. Defaults to the time of capture.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Count whitespace-separated words.
#[must_use]
pub fn word_count(text: &str) -> u64 {
    u64::try_from(text.split_whitespace().count()).unwrap_or(u64::MAX)
}

/// Turns raw input events into recorder commands.
///
/// Holds the per-key state used to suppress auto-repeated keydowns.
#[derive(Debug)]
pub struct Capturer {
    repeat_window_ms: i64,
    last_keydown: HashMap<String, i64>,
    surfaces: SurfaceMatcher,
    recording: bool,
}

impl Capturer {
    /// Create a capturer with the given repeat window.
    #[must_use]
    pub fn new(repeat_window: Duration, surfaces: SurfaceMatcher) -> Self {
        Self {
            repeat_window_ms: i64::try_from(repeat_window.as_millis()).unwrap_or(i64::MAX),
            last_keydown: HashMap::new(),
            surfaces,
            recording: true,
        }
    }

    /// Tell the capturer whether its records are being kept.
    ///
    /// Keydowns seen while not recording are not remembered, so they never
    /// suppress a keydown once recording starts.
    pub fn set_recording(&mut self, recording: bool) {
        if !recording {
            self.last_keydown.clear();
        }
        self.recording = recording;
    }

    /// Recognize more Canvas origins.
    pub fn add_canvas_domains<'a>(&mut self, origins: impl IntoIterator<Item = &'a str>) {
        self.surfaces.add_canvas_domains(origins);
    }

    /// Classify the page an event came from.
    #[must_use]
    pub fn surface(&self, url: &str) -> Surface {
        self.surfaces.classify(url)
    }

    /// Translate one input event into zero or more commands.
    pub fn capture(&mut self, event: &InputEvent) -> Vec<Command> {
        let timestamp = event.timestamp.unwrap_or_else(|| Utc::now().timestamp_millis());
        let text_target = event.target.as_ref().filter(|t| t.is_text_entry());

        match event.event {
            DomEvent::KeyDown => {
                let (Some(target), Some(key)) = (text_target, event.key.as_deref()) else {
                    return Vec::new();
                };
                if self.is_repeat(key, timestamp) {
                    trace!(key, "suppressing repeated keydown");
                    return Vec::new();
                }
                if self.recording {
                    self.last_keydown.insert(key.to_string(), timestamp);
                }
                vec![Command::RecordEvent(Self::record(
                    EventKind::KeyDown,
                    key,
                    timestamp,
                    event,
                    target,
                ))]
            }
            DomEvent::KeyUp => {
                let Some(key) = event.key.as_deref() else {
                    return Vec::new();
                };
                self.last_keydown.remove(key);
                text_target
                    .map(|target| {
                        Command::RecordEvent(Self::record(
                            EventKind::KeyUp,
                            key,
                            timestamp,
                            event,
                            target,
                        ))
                    })
                    .into_iter()
                    .collect()
            }
            DomEvent::Copy | DomEvent::Paste => {
                let text = event.text.as_deref().unwrap_or_default();
                if text.is_empty() {
                    return Vec::new();
                }
                let kind = if event.event == DomEvent::Copy {
                    ClipboardKind::Copy
                } else {
                    ClipboardKind::Paste
                };
                vec![Command::Clipboard(ClipboardEvent {
                    kind,
                    text: text.to_string(),
                    url: Some(event.url.clone()),
                    timestamp,
                })]
            }
            DomEvent::FocusIn => text_target
                .map(|target| {
                    vec![
                        Command::UpdateFieldInfo(FieldInfoUpdate {
                            element_id: target.id.clone(),
                            element_name: target.name.clone(),
                            hostname: event.url.clone(),
                        }),
                        Command::UpdateWordCount(word_count(
                            target.value.as_deref().unwrap_or_default(),
                        )),
                    ]
                })
                .unwrap_or_default(),
            DomEvent::Input => text_target
                .map(|target| {
                    vec![Command::UpdateWordCount(word_count(
                        target.value.as_deref().unwrap_or_default(),
                    ))]
                })
                .unwrap_or_default(),
            DomEvent::Load => match self.surfaces.classify(&event.url) {
                Surface::GoogleDocs => vec![Command::DocumentDetected {
                    url: event.url.clone(),
                    title: event.title.clone().unwrap_or_default(),
                }],
                Surface::Canvas => vec![Command::CanvasDetected {
                    origin: origin_of(&event.url).to_string(),
                }],
                Surface::Generic => Vec::new(),
            },
        }
    }

    fn is_repeat(&self, key: &str, timestamp: i64) -> bool {
        self.last_keydown
            .get(key)
            .is_some_and(|last| timestamp.saturating_sub(*last) < self.repeat_window_ms)
    }

    fn record(
        kind: EventKind,
        key: &str,
        timestamp: i64,
        event: &InputEvent,
        target: &ElementInfo,
    ) -> EventRecord {
        EventRecord {
            kind,
            key: key.to_string(),
            timestamp,
            hostname: host_of(&event.url).to_string(),
            element_id: target.id.clone(),
            element_name: target.name.clone(),
        }
    }
}

impl Default for Capturer {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), SurfaceMatcher::default())
    }
}
