//! Inbound message vocabulary.
//!
//! Pages and the popup talk to the recorder with small JSON messages. Four
//! shapes are accepted:
//!
//! - content messages `{from, subject, data}`
//! - action messages `{action, data, state, timestamp}`
//! - clipboard messages `{type: "COPY_EVENT" | "PASTE_EVENT", text}`
//! - raw input events `{event, url, ...}` (see [`InputEvent`])
//!
//! [`Message::into_inbound`] turns every shape except raw input events into a
//! [`Command`]; raw input events go through the [`Capturer`](crate::capture::Capturer) first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capture::{ClipboardEvent, ClipboardKind, EventRecord, InputEvent};
use crate::error::{Error, Result};
use crate::store::{ToggleEntry, ToggleState};

/// A message as received on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Message {
    /// `{from, subject, data}` sent by content scripts.
    Content {
        /// Sender, usually `content`.
        from: String,
        /// What the message is about.
        subject: String,
        /// Subject-specific payload.
        #[serde(default)]
        data: Value,
    },
    /// `{action, ...}` sent by the popup.
    Action {
        /// The requested action.
        action: String,
        /// Action-specific payload.
        #[serde(default)]
        data: Value,
        /// Toggle position for `track_toggle`.
        #[serde(default)]
        state: Option<String>,
        /// RFC 3339 time for `track_toggle`.
        #[serde(default)]
        timestamp: Option<String>,
    },
    /// `{type, text}` clipboard notice.
    Clipboard {
        /// Copy or paste.
        #[serde(rename = "type")]
        kind: ClipboardMessageKind,
        /// The text involved.
        text: String,
        /// Page URL, when the sender knows it.
        #[serde(default)]
        url: Option<String>,
    },
    /// A raw input event.
    Input(InputEvent),
}

/// Wire names of clipboard notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipboardMessageKind {
    /// Text was copied.
    #[serde(rename = "COPY_EVENT")]
    Copy,
    /// Text was pasted.
    #[serde(rename = "PASTE_EVENT")]
    Paste,
}

/// Field information reported on focus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfoUpdate {
    /// Element `id`.
    #[serde(default, rename = "elementID")]
    pub element_id: String,
    /// Element `name`.
    #[serde(default, rename = "elementName")]
    pub element_name: String,
    /// Page URL.
    #[serde(default)]
    pub hostname: String,
}

/// Lifecycle notices other components announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// A session was started elsewhere.
    SessionStarted,
    /// A session ended elsewhere.
    SessionEnded,
}

/// What the recorder is asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Append an Event Record to the keystroke log.
    RecordEvent(EventRecord),
    /// Record a copy or paste.
    Clipboard(ClipboardEvent),
    /// The user focused a text field.
    UpdateFieldInfo(FieldInfoUpdate),
    /// The focused field's word count changed.
    UpdateWordCount(u64),
    /// A Google Docs document was opened.
    DocumentDetected {
        /// Document URL.
        url: String,
        /// Document title.
        title: String,
    },
    /// A page on a known Canvas instance was opened.
    CanvasDetected {
        /// Origin of the page.
        origin: String,
    },
    /// Start a session for a course and assignment.
    StartSession {
        /// Course value or name.
        course: String,
        /// Assignment value or label.
        assignment: String,
    },
    /// Submit the active session and export its report.
    SubmitSession,
    /// Discard the active session.
    ResetSession,
    /// Mark a citation entry as attributed.
    MarkCited(usize),
    /// The tracking toggle moved.
    TrackToggle(ToggleEntry),
    /// Informational notice.
    Notice(Notice, Value),
}

/// A parsed message, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A command for the recorder.
    Command(Command),
    /// A raw input event for the capturer.
    Input(InputEvent),
}

#[derive(Deserialize)]
struct WordCount {
    count: u64,
}

#[derive(Deserialize)]
struct Detected {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
struct StartData {
    #[serde(default)]
    course: String,
    #[serde(default)]
    assignment: String,
}

#[derive(Deserialize)]
struct CiteData {
    index: usize,
}

impl Message {
    /// Parse one JSON message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the text is not JSON or matches no shape.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Interpret the message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMessage`] for subjects and actions outside the
    /// vocabulary and [`Error::MalformedMessage`] for bad payloads.
    pub fn into_inbound(self) -> Result<Inbound> {
        match self {
            Self::Content {
                from,
                subject,
                data,
            } => content_command(&from, &subject, data).map(Inbound::Command),
            Self::Action {
                action,
                data,
                state,
                timestamp,
            } => action_command(&action, data, state, timestamp).map(Inbound::Command),
            Self::Clipboard { kind, text, url } => {
                Ok(Inbound::Command(Command::Clipboard(ClipboardEvent {
                    kind: match kind {
                        ClipboardMessageKind::Copy => ClipboardKind::Copy,
                        ClipboardMessageKind::Paste => ClipboardKind::Paste,
                    },
                    text,
                    url,
                    timestamp: Utc::now().timestamp_millis(),
                })))
            }
            Self::Input(event) => Ok(Inbound::Input(event)),
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(kind: &str, data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| Error::malformed(kind, e.to_string()))
}

fn content_command(from: &str, subject: &str, data: Value) -> Result<Command> {
    match subject {
        "record_event" => Ok(Command::RecordEvent(payload(subject, data)?)),
        "update_field_info" => Ok(Command::UpdateFieldInfo(payload(subject, data)?)),
        "update_word_count" => {
            let WordCount { count } = payload(subject, data)?;
            Ok(Command::UpdateWordCount(count))
        }
        "google_doc_detected" => {
            let Detected { url, title } = payload(subject, data)?;
            Ok(Command::DocumentDetected { url, title })
        }
        _ => Err(Error::UnknownMessage(format!(
            "subject '{subject}' from '{from}'"
        ))),
    }
}

fn action_command(
    action: &str,
    data: Value,
    state: Option<String>,
    timestamp: Option<String>,
) -> Result<Command> {
    match action {
        "session_started" => Ok(Command::Notice(Notice::SessionStarted, data)),
        "session_ended" => Ok(Command::Notice(Notice::SessionEnded, data)),
        "start_session" => {
            let StartData { course, assignment } = payload(action, data)?;
            Ok(Command::StartSession { course, assignment })
        }
        "submit_session" => Ok(Command::SubmitSession),
        "reset_session" | "discard_session" => Ok(Command::ResetSession),
        "mark_cited" => {
            let CiteData { index } = payload(action, data)?;
            Ok(Command::MarkCited(index))
        }
        "track_toggle" => {
            let state = state
                .as_deref()
                .and_then(ToggleState::parse)
                .ok_or_else(|| Error::malformed(action, "state must be 'on' or 'off'"))?;
            let timestamp = match timestamp {
                Some(ts) => DateTime::parse_from_rfc3339(&ts)
                    .map_err(|e| Error::malformed(action, e.to_string()))?
                    .with_timezone(&Utc),
                None => Utc::now(),
            };
            Ok(Command::TrackToggle(ToggleEntry { state, timestamp }))
        }
        _ => Err(Error::UnknownMessage(format!("action '{action}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{DomEvent, EventKind};

    fn command(json: &str) -> Command {
        match Message::from_json(json).unwrap().into_inbound().unwrap() {
            Inbound::Command(c) => c,
            Inbound::Input(e) => panic!("expected command, got input {e:?}"),
        }
    }

    #[test]
    fn test_record_event() {
        let cmd = command(
            r#"{"from":"content","subject":"record_event",
                "data":["keydown","a",1741000000000,"docs.google.com","doc","body"]}"#,
        );
        let Command::RecordEvent(record) = cmd else {
            panic!("expected record event");
        };
        assert_eq!(record.kind, EventKind::KeyDown);
        assert_eq!(record.element_name, "body");
    }

    #[test]
    fn test_record_event_malformed() {
        let err = Message::from_json(r#"{"from":"content","subject":"record_event","data":[1]}"#)
            .unwrap()
            .into_inbound()
            .unwrap_err();
        assert!(matches!(err, Error::MalformedMessage { .. }));
    }

    #[test]
    fn test_field_info_and_word_count() {
        let cmd = command(
            r#"{"from":"content","subject":"update_field_info",
                "data":{"elementID":"q","elementName":"","hostname":"https://example.com/a"}}"#,
        );
        assert_eq!(
            cmd,
            Command::UpdateFieldInfo(FieldInfoUpdate {
                element_id: "q".to_string(),
                element_name: String::new(),
                hostname: "https://example.com/a".to_string(),
            })
        );

        let cmd = command(r#"{"from":"content","subject":"update_word_count","data":{"count":57}}"#);
        assert_eq!(cmd, Command::UpdateWordCount(57));
    }

    #[test]
    fn test_unknown_subject_and_action() {
        let err = Message::from_json(r#"{"from":"content","subject":"dance"}"#)
            .unwrap()
            .into_inbound()
            .unwrap_err();
        assert!(matches!(err, Error::UnknownMessage(_)));

        let err = Message::from_json(r#"{"action":"dance"}"#)
            .unwrap()
            .into_inbound()
            .unwrap_err();
        assert!(err.is_message_error());
    }

    #[test]
    fn test_popup_actions() {
        assert_eq!(
            command(r#"{"action":"start_session","data":{"course":"cs101","assignment":"cs101-hw1"}}"#),
            Command::StartSession {
                course: "cs101".to_string(),
                assignment: "cs101-hw1".to_string(),
            }
        );
        assert_eq!(command(r#"{"action":"submit_session"}"#), Command::SubmitSession);
        assert_eq!(command(r#"{"action":"discard_session"}"#), Command::ResetSession);
        assert_eq!(
            command(r#"{"action":"mark_cited","data":{"index":2}}"#),
            Command::MarkCited(2)
        );
        assert!(matches!(
            command(r#"{"action":"session_ended"}"#),
            Command::Notice(Notice::SessionEnded, Value::Null)
        ));
    }

    #[test]
    fn test_track_toggle() {
        let cmd = command(
            r#"{"action":"track_toggle","state":"off","timestamp":"2025-03-09T14:00:00.000Z"}"#,
        );
        let Command::TrackToggle(entry) = cmd else {
            panic!("expected toggle");
        };
        assert_eq!(entry.state, ToggleState::Off);
        assert_eq!(entry.timestamp.timestamp(), 1_741_528_800);

        let err = Message::from_json(r#"{"action":"track_toggle","state":"sideways"}"#)
            .unwrap()
            .into_inbound()
            .unwrap_err();
        assert!(matches!(err, Error::MalformedMessage { .. }));
    }

    #[test]
    fn test_clipboard_message() {
        let Command::Clipboard(clip) = command(r#"{"type":"COPY_EVENT","text":"hello"}"#) else {
            panic!("expected clipboard");
        };
        assert_eq!(clip.kind, ClipboardKind::Copy);
        assert_eq!(clip.text, "hello");
        assert!(clip.url.is_none());
    }

    #[test]
    fn test_raw_input_event() {
        let inbound = Message::from_json(
            r#"{"event":"keydown","url":"https://example.com","key":"a",
                "target":{"tag":"textarea","id":"t"}}"#,
        )
        .unwrap()
        .into_inbound()
        .unwrap();
        let Inbound::Input(event) = inbound else {
            panic!("expected input event");
        };
        assert_eq!(event.event, DomEvent::KeyDown);
        assert_eq!(event.target.unwrap().id, "t");
    }

    #[test]
    fn test_unrecognized_shape() {
        assert!(Message::from_json(r#"{"hello":"world"}"#).is_err());
        assert!(Message::from_json("not json").is_err());
    }
}
