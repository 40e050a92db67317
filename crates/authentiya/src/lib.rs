//! `authentiya` - Records writing sessions as verifiable activity reports
//!
//! This library tracks a student's typing, copy and paste activity inside
//! Google Docs and Canvas text fields during a course assignment session,
//! keeps the state in a shared store and exports the session as a CSV
//! report when it is submitted.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod capture;
pub mod catalog;
pub mod citation;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod lms;
pub mod logging;
pub mod message;
pub mod recorder;
pub mod session;
pub mod sink;
pub mod source;
pub mod store;
pub mod surface;
pub mod view;

pub use capture::{Capturer, ClipboardEvent, EventKind, EventRecord, InputEvent};
pub use catalog::Catalog;
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use message::{Command, Message};
pub use recorder::{Outcome, Recorder};
pub use session::{Session, SessionController, SessionState};
pub use store::{Store, StoreStats};
