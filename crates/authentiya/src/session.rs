//! Session lifecycle.
//!
//! A session moves `idle -> active -> idle`. The [`SessionController`] owns
//! the only copy of the live session state and persists snapshots of it to
//! the [`Store`] so another process (or a restart) can pick it up.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::capture::{ClipboardEvent, EventRecord};
use crate::catalog::Catalog;
use crate::citation::{entry_from_clipboard, CitationStats};
use crate::error::{Error, Result};
use crate::export::{Exporter, Report};
use crate::message::FieldInfoUpdate;
use crate::store::{
    CitationEntry, FieldInfo, KeystrokeLog, SessionData, SessionHistoryEntry, SessionKey, Store,
    StoreKey,
};

/// Keys cleared when a session ends.
pub const SESSION_KEYS: [StoreKey; 3] = [
    StoreKey::SessionData,
    StoreKey::KeystrokeData,
    StoreKey::CitationHistory,
];

/// A tracked work interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Session identifier, the start time in milliseconds.
    pub key: SessionKey,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// Elapsed seconds.
    pub elapsed: u64,
    /// Course display name.
    pub course: String,
    /// Assignment display name.
    pub assignment: String,
    /// Course identifier.
    pub course_value: String,
    /// Assignment identifier.
    pub assignment_value: String,
    /// Word count of the last focused field.
    pub word_count: u64,
    /// Last focused field.
    pub field: Option<FieldInfo>,
}

impl Session {
    /// The snapshot stored under `sessionData`.
    #[must_use]
    pub fn to_data(&self) -> SessionData {
        SessionData {
            session_active: true,
            session_start_time: Some(self.started_at),
            active_session_time: self.elapsed,
            word_count: self.word_count,
            current_field: self.field.clone(),
            current_course: Some(self.course.clone()),
            current_assignment: Some(self.assignment.clone()),
            course_value: Some(self.course_value.clone()),
            assignment_value: Some(self.assignment_value.clone()),
        }
    }

    /// Rebuild a session from a snapshot.
    ///
    /// Returns `None` unless the snapshot marks an active session with a
    /// start time.
    #[must_use]
    pub fn from_data(data: SessionData, key: Option<SessionKey>) -> Option<Self> {
        if !data.session_active {
            return None;
        }
        let started_at = data.session_start_time?;
        let course = data.current_course.unwrap_or_default();
        let assignment = data.current_assignment.unwrap_or_default();
        Some(Self {
            key: key.unwrap_or_else(|| SessionKey::from_time(started_at)),
            started_at,
            elapsed: data.active_session_time,
            course_value: data.course_value.unwrap_or_else(|| course.clone()),
            assignment_value: data.assignment_value.unwrap_or_else(|| assignment.clone()),
            course,
            assignment,
            word_count: data.word_count,
            field: data.current_field,
        })
    }
}

/// Whether a session is being tracked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No session.
    #[default]
    Idle,
    /// A session is being tracked.
    Active(Session),
}

/// The outcome of a successful submit.
#[derive(Debug, Clone)]
pub struct Submission {
    /// The submitted report.
    pub report: Report,
    /// Where the CSV was written.
    pub path: PathBuf,
    /// The entry appended to the session history.
    pub history: SessionHistoryEntry,
}

/// Drives the session lifecycle over a [`Store`].
#[derive(Debug, Clone)]
pub struct SessionController {
    state: SessionState,
    catalog: Catalog,
    snapshot_every: u64,
}

impl SessionController {
    /// Create an idle controller.
    #[must_use]
    pub fn new(catalog: Catalog, snapshot_every: u64) -> Self {
        Self {
            state: SessionState::Idle,
            catalog,
            snapshot_every: snapshot_every.max(1),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The active session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            SessionState::Active(session) => Some(session),
            SessionState::Idle => None,
        }
    }

    /// Whether a session is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session().is_some()
    }

    /// Resume a session persisted in the store. Returns `true` if one was
    /// found.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn restore(&mut self, store: &Store) -> Result<bool> {
        let Some(data) = store.load::<SessionData>()? else {
            self.state = SessionState::Idle;
            return Ok(false);
        };
        match Session::from_data(data, store.load::<SessionKey>()?) {
            Some(session) => {
                info!(
                    session = %session.key,
                    elapsed = session.elapsed,
                    "Restored active session"
                );
                self.state = SessionState::Active(session);
                Ok(true)
            }
            None => {
                self.state = SessionState::Idle;
                Ok(false)
            }
        }
    }

    /// Start a session.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the course or assignment is blank or not
    /// in the catalog, [`Error::SessionAlreadyActive`] if a session is running,
    /// or a storage error.
    pub fn start(
        &mut self,
        store: &Store,
        course: &str,
        assignment: &str,
        now: DateTime<Utc>,
    ) -> Result<&Session> {
        let selection = self.catalog.resolve(course, assignment)?;
        if self.is_active() {
            return Err(Error::SessionAlreadyActive);
        }

        let session = Session {
            key: SessionKey::from_time(now),
            started_at: now,
            elapsed: 0,
            course: selection.course_name,
            assignment: selection.assignment_name,
            course_value: selection.course_value,
            assignment_value: selection.assignment_value,
            word_count: 0,
            field: None,
        };

        store.save(&session.key)?;
        store.save(&KeystrokeLog::default())?;
        store.save_list::<CitationEntry>(&[])?;
        store.save(&session.to_data())?;

        info!(
            session = %session.key,
            course = %session.course,
            assignment = %session.assignment,
            "Session started"
        );
        self.state = SessionState::Active(session);
        self.session()
            .ok_or_else(|| Error::internal("session missing after start"))
    }

    /// Advance the session clock by one second.
    ///
    /// Returns the new elapsed time, or `None` while idle. Every
    /// `snapshot_every` seconds a snapshot is persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn tick(&mut self, store: &Store) -> Result<Option<u64>> {
        let snapshot_every = self.snapshot_every;
        let SessionState::Active(session) = &mut self.state else {
            return Ok(None);
        };
        session.elapsed += 1;
        let elapsed = session.elapsed;
        if elapsed % snapshot_every == 0 {
            store.save(&session.to_data())?;
            debug!(session = %session.key, elapsed, "Saved session snapshot");
        }
        Ok(Some(elapsed))
    }

    /// Record the focused field. Ignored while idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn update_field(&mut self, store: &Store, update: &FieldInfoUpdate) -> Result<bool> {
        let SessionState::Active(session) = &mut self.state else {
            debug!("Ignoring field update while idle");
            return Ok(false);
        };
        let name = if update.element_name.is_empty() {
            &update.element_id
        } else {
            &update.element_name
        };
        session.field = Some(FieldInfo {
            name: (!name.is_empty()).then(|| name.clone()),
            url: (!update.hostname.is_empty()).then(|| update.hostname.clone()),
        });
        store.save(&session.to_data())?;
        Ok(true)
    }

    /// Record the focused field's word count. Ignored while idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn update_word_count(&mut self, store: &Store, count: u64) -> Result<bool> {
        let SessionState::Active(session) = &mut self.state else {
            debug!("Ignoring word count while idle");
            return Ok(false);
        };
        session.word_count = count;
        store.save(&session.to_data())?;
        Ok(true)
    }

    /// Append an Event Record to the log. Dropped while idle.
    ///
    /// Returns the new log length.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be written.
    pub fn record_event(&mut self, store: &Store, record: EventRecord) -> Result<Option<usize>> {
        if !self.is_active() {
            debug!(kind = %record.kind, "Dropping event while idle");
            return Ok(None);
        }
        store.append_event(record).map(Some)
    }

    /// Record a copy or paste in both the event log and the citation history.
    /// Dropped while idle.
    ///
    /// Returns the new log length.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn record_clipboard(
        &mut self,
        store: &Store,
        event: &ClipboardEvent,
    ) -> Result<Option<usize>> {
        if !self.is_active() {
            debug!(kind = %event.kind, "Dropping clipboard event while idle");
            return Ok(None);
        }
        let events = store.append_event(event.to_record())?;
        store.append(entry_from_clipboard(event))?;
        Ok(Some(events))
    }

    /// Persist the current snapshot. Does nothing while idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn snapshot(&self, store: &Store) -> Result<()> {
        if let Some(session) = self.session() {
            store.save(&session.to_data())?;
        }
        Ok(())
    }

    /// Submit the active session: export its report, append it to the
    /// session history and clear the session keys.
    ///
    /// If the report cannot be written the session stays active and nothing
    /// is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveSession`] while idle, or an export or storage
    /// error.
    pub fn submit(
        &mut self,
        store: &Store,
        exporter: &Exporter,
        now: DateTime<Utc>,
    ) -> Result<Submission> {
        let session = self.session().ok_or(Error::NoActiveSession)?;

        let log = store.load::<KeystrokeLog>()?.unwrap_or_default();
        let citations = store.load_list::<CitationEntry>()?;
        let report = Report {
            session_key: session.key.0.clone(),
            course: session.course.clone(),
            assignment: session.assignment.clone(),
            session_start: session.started_at,
            session_duration: session.elapsed,
            word_count: session.word_count,
            keystroke_data: log.data,
            citation_data: citations,
        };

        let path = exporter.write(&report, now)?;

        let stats = CitationStats::of(&report.citation_data);
        let history = SessionHistoryEntry {
            session_key: Some(report.session_key.clone()),
            current_course: report.course.clone(),
            current_assignment: report.assignment.clone(),
            session_start_time: report.session_start,
            active_session_time: report.session_duration,
            word_count: report.word_count,
            citation_count: stats.total,
            cited_percentage: stats.percentage(),
            event_count: report.keystroke_data.len(),
        };
        store.append(history.clone())?;
        store.remove_all(&SESSION_KEYS)?;

        info!(
            session = %report.session_key,
            elapsed = report.session_duration,
            events = report.keystroke_data.len(),
            citations = stats.total,
            "Session submitted"
        );
        self.state = SessionState::Idle;
        Ok(Submission {
            report,
            path,
            history,
        })
    }

    /// Discard the session without exporting. Always returns to idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the session keys cannot be removed.
    pub fn reset(&mut self, store: &Store) -> Result<()> {
        if let Some(session) = self.session() {
            info!(session = %session.key, "Session reset");
        }
        self.state = SessionState::Idle;
        store.remove_all(&SESSION_KEYS)?;
        Ok(())
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(Catalog::default(), 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ClipboardKind, EventKind};
    use crate::catalog::{Assignment, Course, MISSING_SELECTION_MESSAGE};

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_741_528_800_000).unwrap()
    }

    fn event(key: &str, timestamp: i64) -> EventRecord {
        EventRecord {
            kind: EventKind::KeyDown,
            key: key.to_string(),
            timestamp,
            hostname: "example.com".to_string(),
            element_id: "essay".to_string(),
            element_name: "essay".to_string(),
        }
    }

    fn started(store: &Store) -> SessionController {
        let mut controller = SessionController::default();
        controller.start(store, "CS 101", "Essay", t0()).unwrap();
        controller
    }

    #[test]
    fn test_start_requires_selection() {
        let store = store();
        let mut controller = SessionController::default();

        let err = controller.start(&store, "", "Essay", t0()).unwrap_err();
        assert_eq!(err.to_string(), MISSING_SELECTION_MESSAGE);
        let err = controller.start(&store, "CS 101", "  ", t0()).unwrap_err();
        assert!(err.is_validation_error());

        assert!(!controller.is_active());
        assert!(store.load::<SessionData>().unwrap().is_none());
    }

    #[test]
    fn test_start_checks_catalog() {
        let store = store();
        let catalog = Catalog {
            courses: vec![Course {
                value: "cs101".to_string(),
                name: "Intro to CS".to_string(),
                assignments: vec![Assignment {
                    value: "hw1".to_string(),
                    label: "Homework 1".to_string(),
                }],
            }],
        };
        let mut controller = SessionController::new(catalog, 10);

        assert!(controller.start(&store, "bio", "hw1", t0()).is_err());
        let session = controller.start(&store, "cs101", "hw1", t0()).unwrap();
        assert_eq!(session.course, "Intro to CS");
        assert_eq!(session.assignment, "Homework 1");
        assert_eq!(session.course_value, "cs101");
    }

    #[test]
    fn test_start_initializes_store() {
        let store = store();
        store.append_event(event("stale", 1)).unwrap();
        let controller = started(&store);

        let session = controller.session().unwrap();
        assert_eq!(session.key.0, "1741528800000");
        assert_eq!(store.load::<SessionKey>().unwrap(), Some(session.key.clone()));
        assert!(store.load::<KeystrokeLog>().unwrap().unwrap().data.is_empty());
        assert!(store.load_list::<CitationEntry>().unwrap().is_empty());

        let data = store.load::<SessionData>().unwrap().unwrap();
        assert!(data.session_active);
        assert_eq!(data.current_course.as_deref(), Some("CS 101"));
        assert_eq!(data.session_start_time, Some(t0()));
    }

    #[test]
    fn test_start_while_active_rejected() {
        let store = store();
        let mut controller = started(&store);
        let err = controller.start(&store, "CS 102", "Lab", t0()).unwrap_err();
        assert!(matches!(err, Error::SessionAlreadyActive));
        assert_eq!(controller.session().unwrap().course, "CS 101");
    }

    #[test]
    fn test_tick_snapshots_every_tenth_second() {
        let store = store();
        let mut controller = started(&store);

        for _ in 0..9 {
            controller.tick(&store).unwrap();
        }
        let data = store.load::<SessionData>().unwrap().unwrap();
        assert_eq!(data.active_session_time, 0);

        assert_eq!(controller.tick(&store).unwrap(), Some(10));
        let data = store.load::<SessionData>().unwrap().unwrap();
        assert_eq!(data.active_session_time, 10);
    }

    #[test]
    fn test_tick_idle() {
        let store = store();
        let mut controller = SessionController::default();
        assert_eq!(controller.tick(&store).unwrap(), None);
    }

    #[test]
    fn test_restore_resumes_elapsed_time() {
        let store = store();
        let mut controller = started(&store);
        for _ in 0..20 {
            controller.tick(&store).unwrap();
        }

        let mut resumed = SessionController::default();
        assert!(resumed.restore(&store).unwrap());
        let session = resumed.session().unwrap();
        assert_eq!(session.elapsed, 20);
        assert_eq!(session.key, controller.session().unwrap().key);
    }

    #[test]
    fn test_restore_without_active_session() {
        let store = store();
        store
            .save(&SessionData {
                session_active: true,
                ..SessionData::default()
            })
            .unwrap();
        let mut controller = SessionController::default();
        assert!(!controller.restore(&store).unwrap());
        assert_eq!(controller.state(), &SessionState::Idle);
    }

    #[test]
    fn test_field_and_word_count_updates() {
        let store = store();
        let mut controller = started(&store);

        let update = FieldInfoUpdate {
            element_id: "answer".to_string(),
            element_name: String::new(),
            hostname: "https://canvas.school.edu/quiz".to_string(),
        };
        assert!(controller.update_field(&store, &update).unwrap());
        assert!(controller.update_word_count(&store, 42).unwrap());

        let data = store.load::<SessionData>().unwrap().unwrap();
        let field = data.current_field.unwrap();
        assert_eq!(field.name.as_deref(), Some("answer"));
        assert_eq!(field.url.as_deref(), Some("https://canvas.school.edu/quiz"));
        assert_eq!(data.word_count, 42);
    }

    #[test]
    fn test_events_dropped_while_idle() {
        let store = store();
        let mut controller = SessionController::default();

        assert_eq!(controller.record_event(&store, event("a", 1)).unwrap(), None);
        let clip = ClipboardEvent {
            kind: ClipboardKind::Copy,
            text: "x".to_string(),
            url: None,
            timestamp: 1,
        };
        assert_eq!(controller.record_clipboard(&store, &clip).unwrap(), None);
        assert!(!controller.update_word_count(&store, 3).unwrap());
        assert!(store.load::<KeystrokeLog>().unwrap().is_none());
    }

    #[test]
    fn test_submit_exports_and_clears() {
        let store = store();
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path());
        let mut controller = started(&store);

        controller.record_event(&store, event("H", 1)).unwrap();
        controller.record_event(&store, event("i", 2)).unwrap();
        let clip = ClipboardEvent {
            kind: ClipboardKind::Paste,
            text: "quoted".to_string(),
            url: Some("https://example.com/src".to_string()),
            timestamp: 3,
        };
        controller.record_clipboard(&store, &clip).unwrap();
        controller.update_word_count(&store, 2).unwrap();
        controller.tick(&store).unwrap();

        let submission = controller.submit(&store, &exporter, t0()).unwrap();
        assert!(!controller.is_active());
        assert_eq!(submission.report.keystroke_data.len(), 3);
        assert_eq!(submission.history.citation_count, 1);
        assert_eq!(submission.history.cited_percentage, 0);
        assert_eq!(submission.history.active_session_time, 1);
        assert_eq!(submission.history.word_count, 2);

        let csv = std::fs::read_to_string(&submission.path).unwrap();
        let h = csv.find("\"H\"").unwrap();
        let i = csv.find("\"i\"").unwrap();
        assert!(h < i);
        assert!(csv.contains("\"paste\",\"quoted\",\"3\",\"example.com\""));

        for key in SESSION_KEYS {
            assert!(store.get_raw(key).unwrap().is_none());
        }
        assert_eq!(store.load_list::<SessionHistoryEntry>().unwrap().len(), 1);
    }

    #[test]
    fn test_submit_while_idle() {
        let store = store();
        let dir = tempfile::tempdir().unwrap();
        let mut controller = SessionController::default();
        let err = controller
            .submit(&store, &Exporter::new(dir.path()), t0())
            .unwrap_err();
        assert!(matches!(err, Error::NoActiveSession));
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_submit_export_failure_keeps_session() {
        let store = store();
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let exporter = Exporter::new(blocker.join("reports"));

        let mut controller = started(&store);
        controller.record_event(&store, event("a", 1)).unwrap();

        assert!(controller.submit(&store, &exporter, t0()).is_err());
        assert!(controller.is_active());
        assert_eq!(store.load::<KeystrokeLog>().unwrap().unwrap().data.len(), 1);
        assert!(store.load_list::<SessionHistoryEntry>().unwrap().is_empty());
    }

    #[test]
    fn test_reset_clears_unconditionally() {
        let store = store();
        let mut controller = started(&store);
        controller.record_event(&store, event("a", 1)).unwrap();

        controller.reset(&store).unwrap();
        assert!(!controller.is_active());
        for key in SESSION_KEYS {
            assert!(store.get_raw(key).unwrap().is_none());
        }

        // Resetting while idle is fine too
        controller.reset(&store).unwrap();
    }
}
