//! The recorder.
//!
//! One [`Recorder`] owns the session controller, the capture state, the
//! session timer and the remote mirror. Every inbound message ends up in
//! [`Recorder::dispatch`]; [`Recorder::run`] drives it from a channel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::capture::{Capturer, EventRecord};
use crate::citation;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::export::Exporter;
use crate::lms;
use crate::message::{Command, Inbound, Message, Notice};
use crate::session::{Session, SessionController, Submission};
use crate::sink::{self, Collection, RecordSink};
use crate::store::{CanvasDomains, SessionKey, Store, ToggleEntry, ToggleFlag, ToggleState};
use crate::surface::{origin_of, Surface, SurfaceMatcher};

/// What a dispatched command did.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Nothing; typically an event that arrived while idle.
    Ignored,
    /// An event was appended; the log now holds `events` records.
    Recorded {
        /// Length of the keystroke log.
        events: usize,
    },
    /// Session metadata changed.
    Updated,
    /// A session started.
    Started(Session),
    /// A session was submitted.
    Submitted(Box<Submission>),
    /// The session was discarded.
    Reset,
    /// A citation was marked; `changed` is false if it already was.
    Cited {
        /// Whether the entry changed.
        changed: bool,
    },
    /// The tracking toggle moved.
    Toggled(ToggleState),
    /// An informational notice was logged.
    Noticed,
}

/// Counters reported when [`Recorder::run`] returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Messages received.
    pub messages: u64,
    /// Messages or commands that failed.
    pub rejected: u64,
    /// Timer ticks while a session was active.
    pub ticks: u64,
}

/// Owns all recorder state.
#[derive(Debug)]
pub struct Recorder {
    store: Store,
    controller: SessionController,
    capturer: Capturer,
    exporter: Exporter,
    sink: Arc<dyn RecordSink>,
    tick_interval: Duration,
    ticker: Option<Interval>,
    pending: Vec<JoinHandle<()>>,
}

impl Recorder {
    /// Build a recorder from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a surface pattern does not compile or the stored
    /// Canvas domains cannot be read.
    pub fn new(config: &Config, store: Store, sink: Arc<dyn RecordSink>) -> Result<Self> {
        let mut surfaces = SurfaceMatcher::new(&config.surfaces)?;
        if let Some(domains) = store.load::<CanvasDomains>()? {
            surfaces.add_canvas_domains(domains.0.iter().map(String::as_str));
        }
        Ok(Self {
            store,
            controller: SessionController::new(
                config.catalog.clone(),
                config.session.snapshot_every_ticks,
            ),
            capturer: Capturer::new(config.repeat_window(), surfaces),
            exporter: Exporter::new(config.export_dir()),
            sink,
            tick_interval: config.tick_interval(),
            ticker: None,
            pending: Vec::new(),
        })
    }

    /// The store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The session controller.
    #[must_use]
    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Classify a page URL with the configured and stored surfaces.
    #[must_use]
    pub fn surface(&self, url: &str) -> Surface {
        self.capturer.surface(url)
    }

    /// Remember a verified Canvas origin in the store and start treating its
    /// pages as Canvas.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn remember_canvas_domain(&mut self, base_url: &str) -> Result<bool> {
        let added = lms::remember_domain(&self.store, base_url)?;
        self.capturer.add_canvas_domains([origin_of(base_url)]);
        Ok(added)
    }

    /// Whether the session timer is running.
    #[must_use]
    pub fn timer_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Resume a persisted session and its timer.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn restore(&mut self) -> Result<bool> {
        let restored = self.controller.restore(&self.store)?;
        if restored {
            self.start_timer();
        }
        Ok(restored)
    }

    fn start_timer(&mut self) {
        let mut ticker = time::interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    fn mirror(&mut self, collection: Collection, record: Value) {
        self.pending.retain(|h| !h.is_finished());
        self.pending.push(sink::mirror(&self.sink, collection, record));
    }

    fn mirror_event(&mut self, record: &EventRecord) {
        let session = self.controller.session().map(|s| s.key.0.clone());
        let value = json!({
            "sessionKey": session,
            "type": record.kind,
            "key": record.key,
            "timestamp": record.timestamp,
            "hostname": record.hostname,
            "elementID": record.element_id,
            "elementName": record.element_name,
        });
        self.mirror(Collection::KeystrokeEvents, value);
    }

    /// Wait for background mirror requests to finish.
    pub async fn flush(&mut self) {
        for handle in self.pending.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Mirror task failed");
            }
        }
    }

    /// Execute one command.
    ///
    /// # Errors
    ///
    /// Returns a validation error for lifecycle misuse and storage or export
    /// errors as they occur.
    pub fn dispatch(&mut self, command: Command) -> Result<Outcome> {
        match command {
            Command::RecordEvent(record) => {
                match self.controller.record_event(&self.store, record.clone())? {
                    Some(events) => {
                        self.mirror_event(&record);
                        Ok(Outcome::Recorded { events })
                    }
                    None => Ok(Outcome::Ignored),
                }
            }
            Command::Clipboard(event) => {
                match self.controller.record_clipboard(&self.store, &event)? {
                    Some(events) => {
                        self.mirror_event(&event.to_record());
                        Ok(Outcome::Recorded { events })
                    }
                    None => Ok(Outcome::Ignored),
                }
            }
            Command::UpdateFieldInfo(update) => {
                Ok(if self.controller.update_field(&self.store, &update)? {
                    Outcome::Updated
                } else {
                    Outcome::Ignored
                })
            }
            Command::UpdateWordCount(count) => {
                Ok(if self.controller.update_word_count(&self.store, count)? {
                    Outcome::Updated
                } else {
                    Outcome::Ignored
                })
            }
            Command::DocumentDetected { url, title } => {
                if self.controller.is_active() {
                    debug!(%url, "Google Docs document opened during a session");
                    return Ok(Outcome::Ignored);
                }
                info!(%url, %title, "Google Docs document detected");
                Ok(Outcome::Noticed)
            }
            Command::CanvasDetected { origin } => {
                info!(%origin, "Canvas LMS page detected");
                Ok(Outcome::Noticed)
            }
            Command::StartSession { course, assignment } => {
                let session = self
                    .controller
                    .start(&self.store, &course, &assignment, Utc::now())?
                    .clone();
                self.start_timer();
                self.mirror(
                    Collection::Sessions,
                    json!({
                        "event": "session_started",
                        "sessionKey": session.key.0,
                        "course": session.course,
                        "assignment": session.assignment,
                        "sessionStartTime": session.started_at,
                    }),
                );
                Ok(Outcome::Started(session))
            }
            Command::SubmitSession => {
                let submission = self
                    .controller
                    .submit(&self.store, &self.exporter, Utc::now())?;
                self.ticker = None;
                let mut record = serde_json::to_value(&submission.history)?;
                record["event"] = json!("session_ended");
                self.mirror(Collection::Sessions, record);
                Ok(Outcome::Submitted(Box::new(submission)))
            }
            Command::ResetSession => {
                let key = self.controller.session().map(|s| s.key.clone());
                self.controller.reset(&self.store)?;
                self.ticker = None;
                if let Some(SessionKey(key)) = key {
                    self.mirror(
                        Collection::Sessions,
                        json!({"event": "session_ended", "sessionKey": key, "reset": true}),
                    );
                }
                Ok(Outcome::Reset)
            }
            Command::MarkCited(index) => {
                let changed = citation::mark_cited(&self.store, index)?;
                Ok(Outcome::Cited { changed })
            }
            Command::TrackToggle(entry) => {
                let state = entry.state;
                self.toggle(entry)?;
                Ok(Outcome::Toggled(state))
            }
            Command::Notice(notice, data) => {
                match notice {
                    Notice::SessionStarted => info!(%data, "Session started notice"),
                    Notice::SessionEnded => info!(%data, "Session ended notice"),
                }
                Ok(Outcome::Noticed)
            }
        }
    }

    fn toggle(&mut self, entry: ToggleEntry) -> Result<()> {
        self.store.append(entry.clone())?;
        self.store.save(&ToggleFlag(entry.state == ToggleState::On))?;
        info!(state = %entry.state, "Tracking toggled");
        self.mirror(
            Collection::ToggleTracking,
            json!({
                "toggleName": "tracking",
                "state": entry.state,
                "timestamp": entry.timestamp,
            }),
        );
        Ok(())
    }

    /// Handle one inbound message, logging rather than returning failures.
    ///
    /// Returns `false` if the message or one of its commands failed.
    pub fn handle(&mut self, message: Message) -> bool {
        let commands = match message.into_inbound() {
            Ok(Inbound::Command(command)) => vec![command],
            Ok(Inbound::Input(event)) => {
                self.capturer.set_recording(self.controller.is_active());
                self.capturer.capture(&event)
            }
            Err(e) => {
                warn!(error = %e, "Ignoring message");
                return false;
            }
        };

        let mut ok = true;
        for command in commands {
            if let Err(e) = self.dispatch(command) {
                ok = false;
                log_failure(&e);
            }
        }
        ok
    }

    /// Advance the session clock.
    pub fn tick(&mut self) {
        match self.controller.tick(&self.store) {
            Ok(Some(elapsed)) => debug!(elapsed, "tick"),
            Ok(None) => self.ticker = None,
            Err(e) => error!(error = %e, "Failed to save session snapshot"),
        }
    }

    /// Process messages until the channel closes or `shutdown` completes.
    ///
    /// On exit the timer is dropped, a final snapshot is written and pending
    /// mirror requests are awaited.
    ///
    /// # Errors
    ///
    /// Returns an error if the final snapshot cannot be written.
    pub async fn run<F>(&mut self, mut rx: mpsc::Receiver<Message>, shutdown: F) -> Result<RunSummary>
    where
        F: Future<Output = ()>,
    {
        let mut summary = RunSummary::default();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                message = rx.recv() => {
                    let Some(message) = message else {
                        debug!("Input closed");
                        break;
                    };
                    summary.messages += 1;
                    if !self.handle(message) {
                        summary.rejected += 1;
                    }
                }
                () = next_tick(&mut self.ticker) => {
                    summary.ticks += 1;
                    self.tick();
                }
            }
        }

        self.ticker = None;
        self.controller.snapshot(&self.store)?;
        self.flush().await;
        info!(
            messages = summary.messages,
            rejected = summary.rejected,
            ticks = summary.ticks,
            "Recorder stopped"
        );
        Ok(summary)
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn log_failure(e: &Error) {
    if e.is_validation_error() || e.is_message_error() {
        warn!(error = %e, "Command rejected");
    } else {
        error!(error = %e, "Command failed");
    }
}
