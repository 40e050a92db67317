//! Remote record sink.
//!
//! Toggle changes, session lifecycle notices and captured events can be
//! mirrored to a remote append-only collection store. Mirroring is best
//! effort: a failed append is logged and never retried, and it never affects
//! local state.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::error::{Error, Result};

/// Remote collections records are appended to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Tracking toggle changes.
    ToggleTracking,
    /// Session start/end notices and submitted summaries.
    Sessions,
    /// Captured Event Records.
    KeystrokeEvents,
}

impl Collection {
    /// Collection name as used in the endpoint path.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToggleTracking => "toggle_tracking",
            Self::Sessions => "sessions",
            Self::KeystrokeEvents => "keystroke_events",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts records for remote collections.
#[async_trait]
pub trait RecordSink: Send + Sync + fmt::Debug {
    /// Append one record to a collection.
    async fn append(&self, collection: Collection, record: Value) -> Result<()>;
}

/// Posts records as JSON to `<endpoint>/<collection>`.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSink {
    /// Create a sink for an endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// The URL records for a collection are posted to.
    #[must_use]
    pub fn url(&self, collection: Collection) -> String {
        format!("{}/{collection}", self.endpoint)
    }
}

#[async_trait]
impl RecordSink for HttpSink {
    async fn append(&self, collection: Collection, record: Value) -> Result<()> {
        let url = self.url(collection);
        let response = self.client.post(&url).json(&record).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::RemoteStatus {
                url,
                status: status.as_u16(),
            });
        }
        debug!(%collection, "Mirrored record");
        Ok(())
    }
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl RecordSink for NullSink {
    async fn append(&self, _collection: Collection, _record: Value) -> Result<()> {
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(Collection, Value)>>,
}

impl MemorySink {
    /// Records appended so far.
    #[must_use]
    pub fn records(&self) -> Vec<(Collection, Value)> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn append(&self, collection: Collection, record: Value) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| Error::internal("memory sink lock poisoned"))?
            .push((collection, record));
        Ok(())
    }
}

/// Build the sink described by the configuration.
///
/// # Errors
///
/// Returns an error if remote mirroring is enabled without an endpoint or the
/// HTTP client cannot be built.
pub fn from_config(config: &RemoteConfig) -> Result<Arc<dyn RecordSink>> {
    if !config.enabled {
        return Ok(Arc::new(NullSink));
    }
    let endpoint = config
        .endpoint
        .as_deref()
        .ok_or_else(|| Error::ConfigValidation {
            message: "remote.endpoint is required when remote.enabled is true".to_string(),
        })?;
    Ok(Arc::new(HttpSink::new(
        endpoint,
        Duration::from_secs(config.timeout_secs),
    )?))
}

/// Append a record in the background, logging failures.
pub fn mirror(sink: &Arc<dyn RecordSink>, collection: Collection, record: Value) -> JoinHandle<()> {
    let sink = Arc::clone(sink);
    tokio::spawn(async move {
        if let Err(e) = sink.append(collection, record).await {
            warn!(%collection, error = %e, "Failed to mirror record");
        }
    })
}
