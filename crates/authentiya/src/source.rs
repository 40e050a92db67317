//! Message sources.
//!
//! A source reads messages from somewhere (standard input, a file, a test
//! buffer) and pushes them into the recorder channel. Sources run as their
//! own tasks; the channel closes when every source has finished.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::message::Message;

/// Counters kept by a source while it runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Non-blank lines read.
    pub lines: u64,
    /// Lines forwarded as messages.
    pub forwarded: u64,
    /// Lines that did not parse.
    pub rejected: u64,
}

impl fmt::Display for SourceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lines, {} forwarded, {} rejected",
            self.lines, self.forwarded, self.rejected
        )
    }
}

/// A cloneable stop switch for a running source.
#[derive(Debug, Clone, Default)]
pub struct SourceHandle {
    stop_signal: Arc<AtomicBool>,
}

impl SourceHandle {
    /// Create a handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the source to stop after the current line.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }
}

/// Something that produces inbound messages.
#[async_trait]
pub trait MessageSource: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Forward messages until input ends, the receiver goes away or the
    /// handle is stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the input fails.
    async fn run(&mut self, tx: mpsc::Sender<Message>, handle: SourceHandle)
        -> Result<SourceStats>;
}

/// Reads newline-delimited JSON messages.
#[derive(Debug)]
pub struct LineSource<R> {
    name: String,
    reader: R,
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// Wrap a buffered reader.
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader,
        }
    }
}

impl LineSource<BufReader<Stdin>> {
    /// A source reading standard input.
    #[must_use]
    pub fn stdin() -> Self {
        Self::new("stdin", BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R> MessageSource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &mut self,
        tx: mpsc::Sender<Message>,
        handle: SourceHandle,
    ) -> Result<SourceStats> {
        let mut stats = SourceStats::default();
        let mut line = Vec::new();

        while !handle.should_stop() {
            line.clear();
            if self.reader.read_until(b'\n', &mut line).await? == 0 {
                break;
            }
            let text = match std::str::from_utf8(&line) {
                Ok(text) => text.trim(),
                Err(e) => {
                    stats.lines += 1;
                    stats.rejected += 1;
                    warn!(source = %self.name, line = stats.lines, error = %e, "Ignoring line that is not UTF-8");
                    continue;
                }
            };
            if text.is_empty() {
                continue;
            }
            stats.lines += 1;

            match Message::from_json(text) {
                Ok(message) => {
                    if tx.send(message).await.is_err() {
                        debug!(source = %self.name, "Receiver closed");
                        break;
                    }
                    stats.forwarded += 1;
                }
                Err(e) => {
                    stats.rejected += 1;
                    warn!(source = %self.name, line = stats.lines, error = %e, "Ignoring unparseable message");
                }
            }
        }

        debug!(source = %self.name, %stats, "Source finished");
        Ok(stats)
    }
}

/// Run a source on its own task.
pub fn spawn<S>(
    mut source: S,
    tx: mpsc::Sender<Message>,
    handle: SourceHandle,
) -> tokio::task::JoinHandle<Result<SourceStats>>
where
    S: MessageSource + 'static,
{
    tokio::spawn(async move { source.run(tx, handle).await })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(input: &'static str) -> LineSource<&'static [u8]> {
        LineSource::new("test", input.as_bytes())
    }

    #[tokio::test]
    async fn test_forwards_parsed_lines() {
        let (tx, mut rx) = mpsc::channel(8);
        let input = concat!(
            "{\"action\":\"submit_session\"}\n",
            "\n",
            "not json\n",
            "{\"type\":\"PASTE_EVENT\",\"text\":\"hi\"}\n",
        );
        let stats = source(input).run(tx, SourceHandle::new()).await.unwrap();

        assert_eq!(
            stats,
            SourceStats {
                lines: 3,
                forwarded: 2,
                rejected: 1
            }
        );
        assert!(matches!(rx.recv().await, Some(Message::Action { .. })));
        assert!(matches!(rx.recv().await, Some(Message::Clipboard { .. })));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_skipped() {
        let (tx, mut rx) = mpsc::channel(8);
        let input: &[u8] = b"\xff\xfe bad\n{\"action\":\"submit_session\"}\n";
        let stats = LineSource::new("test", input)
            .run(tx, SourceHandle::new())
            .await
            .unwrap();

        assert_eq!(
            stats,
            SourceStats {
                lines: 2,
                forwarded: 1,
                rejected: 1
            }
        );
        assert!(matches!(rx.recv().await, Some(Message::Action { .. })));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let stats = source("{\"action\":\"reset_session\"}\n{\"action\":\"reset_session\"}\n")
            .run(tx, SourceHandle::new())
            .await
            .unwrap();
        assert_eq!(stats.forwarded, 0);
        assert_eq!(stats.lines, 1);
    }

    #[tokio::test]
    async fn test_stop_handle() {
        let (tx, _rx) = mpsc::channel(8);
        let handle = SourceHandle::new();
        handle.stop();
        let stats = source("{\"action\":\"reset_session\"}\n")
            .run(tx, handle.clone())
            .await
            .unwrap();
        assert!(handle.should_stop());
        assert_eq!(stats.lines, 0);
    }

    #[tokio::test]
    async fn test_spawn() {
        let (tx, mut rx) = mpsc::channel(8);
        let task = spawn(
            source("{\"action\":\"submit_session\"}\n"),
            tx,
            SourceHandle::new(),
        );
        assert!(rx.recv().await.is_some());
        assert_eq!(task.await.unwrap().unwrap().forwarded, 1);
    }
}
