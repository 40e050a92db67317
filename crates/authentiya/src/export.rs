//! CSV report export.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::capture::EventRecord;
use crate::citation::CitationStats;
use crate::error::{Error, Result};
use crate::store::{CitationEntry, SessionKey};

/// Column header of the event table in a report.
pub const REPORT_LABELS: [&str; 6] = [
    "EVENT TYPE",
    "KEY",
    "TIMESTAMP",
    "HOSTNAME",
    "ELEMENT ID",
    "ELEMENT NAME",
];

/// Render labelled rows as CSV.
///
/// The header row is the labels joined by commas. Each data row has every
/// field wrapped in double quotes, with embedded quotes doubled. Every line
/// ends in `\n`. Newlines inside fields are written as-is.
///
/// Returns an empty string, and logs an error, when either input is missing.
#[must_use]
pub fn convert_to_csv<L, F>(label: Option<&[L]>, data: Option<&[Vec<F>]>) -> String
where
    L: AsRef<str>,
    F: AsRef<str>,
{
    let (Some(label), Some(data)) = (label, data) else {
        error!("convert_to_csv: missing label or data");
        return String::new();
    };

    let mut csv = label
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",");
    csv.push('\n');

    for row in data {
        let fields: Vec<String> = row
            .iter()
            .map(|f| format!("\"{}\"", f.as_ref().replace('"', "\"\"")))
            .collect();
        csv.push_str(&fields.join(","));
        csv.push('\n');
    }
    csv
}

/// Everything known about a session at submit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Session identifier.
    pub session_key: String,
    /// Course display name.
    pub course: String,
    /// Assignment display name.
    pub assignment: String,
    /// When the session started.
    pub session_start: DateTime<Utc>,
    /// Elapsed seconds.
    pub session_duration: u64,
    /// Word count of the last focused field.
    pub word_count: u64,
    /// The keystroke log, in capture order.
    pub keystroke_data: Vec<EventRecord>,
    /// Copy/paste entries.
    pub citation_data: Vec<CitationEntry>,
}

impl Report {
    /// Citation statistics of the report.
    #[must_use]
    pub fn citation_stats(&self) -> CitationStats {
        CitationStats::of(&self.citation_data)
    }

    /// Render the report: a metadata block followed by the event table.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut out = String::from("SESSION REPORT\n");
        // Writing to a String cannot fail
        let _ = writeln!(out, "Course,{}", self.course);
        let _ = writeln!(out, "Assignment,{}", self.assignment);
        let _ = writeln!(
            out,
            "Session Start,{}",
            self.session_start.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        let _ = writeln!(out, "Session Duration (seconds),{}", self.session_duration);
        let _ = writeln!(out, "Word Count,{}", self.word_count);
        out.push('\n');

        let rows: Vec<Vec<String>> = self.keystroke_data.iter().map(EventRecord::fields).collect();
        out.push_str(&convert_to_csv(Some(&REPORT_LABELS[..]), Some(&rows[..])));
        out
    }
}

/// File name of a report: `authentiya_report_<sessionKey>_<now ms>.csv`.
#[must_use]
pub fn report_file_name(key: &SessionKey, now: DateTime<Utc>) -> String {
    format!("authentiya_report_{key}_{}.csv", now.timestamp_millis())
}

/// Writes reports into a directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    dir: PathBuf,
}

impl Exporter {
    /// Create an exporter for the given directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The export directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a report and return its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file cannot
    /// be written.
    pub fn write(&self, report: &Report, now: DateTime<Utc>) -> Result<PathBuf> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|source| Error::DirectoryCreate {
                path: self.dir.clone(),
                source,
            })?;
        }

        let key = SessionKey(report.session_key.clone());
        let path = self.dir.join(report_file_name(&key, now));
        std::fs::write(&path, report.to_csv()).map_err(|source| Error::Export {
            path: path.clone(),
            source,
        })?;

        info!(
            path = %path.display(),
            events = report.keystroke_data.len(),
            "Exported session report"
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::EventKind;

    fn report(events: Vec<EventRecord>) -> Report {
        Report {
            session_key: "1741528800000".to_string(),
            course: "Intro to CS".to_string(),
            assignment: "Essay 1".to_string(),
            session_start: DateTime::from_timestamp_millis(1_741_528_800_000).unwrap(),
            session_duration: 75,
            word_count: 120,
            keystroke_data: events,
            citation_data: Vec::new(),
        }
    }

    fn event(key: &str, timestamp: i64) -> EventRecord {
        EventRecord {
            kind: EventKind::KeyDown,
            key: key.to_string(),
            timestamp,
            hostname: "docs.google.com".to_string(),
            element_id: "doc".to_string(),
            element_name: String::new(),
        }
    }

    #[test]
    fn test_convert_to_csv_basic() {
        let label = ["a", "b"];
        let data = vec![vec!["x", "y"]];
        assert_eq!(
            convert_to_csv(Some(&label[..]), Some(&data[..])),
            "a,b\n\"x\",\"y\"\n"
        );
    }

    #[test]
    fn test_convert_to_csv_doubles_quotes() {
        let label = ["k"];
        let data = vec![vec!["say \"hi\""]];
        assert_eq!(
            convert_to_csv(Some(&label[..]), Some(&data[..])),
            "k\n\"say \"\"hi\"\"\"\n"
        );
    }

    #[test]
    fn test_convert_to_csv_missing_input() {
        let label = ["a"];
        let data: Vec<Vec<&str>> = vec![];
        assert_eq!(convert_to_csv::<&str, &str>(None, Some(&data[..])), "");
        assert_eq!(convert_to_csv::<&str, &str>(Some(&label[..]), None), "");
        assert_eq!(convert_to_csv(Some(&label[..]), Some(&data[..])), "a\n");
    }

    #[test]
    fn test_report_csv_layout() {
        let csv = report(vec![event("H", 1), event("i", 2)]).to_csv();
        let expected = "SESSION REPORT\n\
            Course,Intro to CS\n\
            Assignment,Essay 1\n\
            Session Start,2025-03-09T14:00:00.000Z\n\
            Session Duration (seconds),75\n\
            Word Count,120\n\
            \n\
            EVENT TYPE,KEY,TIMESTAMP,HOSTNAME,ELEMENT ID,ELEMENT NAME\n\
            \"keydown\",\"H\",\"1\",\"docs.google.com\",\"doc\",\"\"\n\
            \"keydown\",\"i\",\"2\",\"docs.google.com\",\"doc\",\"\"\n";
        assert_eq!(csv, expected);
    }

    #[test]
    fn test_empty_report_has_header_only() {
        let csv = report(Vec::new()).to_csv();
        assert!(csv.ends_with("Word Count,120\n\nEVENT TYPE,KEY,TIMESTAMP,HOSTNAME,ELEMENT ID,ELEMENT NAME\n"));
    }

    #[test]
    fn test_report_file_name() {
        let now = DateTime::from_timestamp_millis(1_741_528_900_000).unwrap();
        assert_eq!(
            report_file_name(&SessionKey("17".to_string()), now),
            "authentiya_report_17_1741528900000.csv"
        );
    }

    #[test]
    fn test_exporter_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path().join("reports"));
        let now = Utc::now();

        let path = exporter.write(&report(vec![event("a", 5)]), now).unwrap();
        assert!(path.starts_with(exporter.dir()));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("SESSION REPORT\n"));
        assert!(contents.contains("\"keydown\",\"a\",\"5\""));
    }

    #[test]
    fn test_exporter_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let exporter = Exporter::new(blocker.join("sub"));
        assert!(exporter.write(&report(Vec::new()), Utc::now()).is_err());
    }
}
