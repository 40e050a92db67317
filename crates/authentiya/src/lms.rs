//! Read-only Canvas LMS client.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::catalog::Course;
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::store::{CanvasDomains, Store};
use crate::surface::origin_of;

/// A course as returned by the Canvas API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CanvasCourse {
    /// Canvas course id.
    pub id: u64,
    /// Full course name.
    #[serde(default)]
    pub name: Option<String>,
    /// Short course code.
    #[serde(default)]
    pub course_code: Option<String>,
}

impl From<CanvasCourse> for Course {
    fn from(c: CanvasCourse) -> Self {
        Self {
            value: c.id.to_string(),
            name: c.name.or(c.course_code).unwrap_or_default(),
            assignments: Vec::new(),
        }
    }
}

/// Client for a Canvas instance.
#[derive(Debug, Clone)]
pub struct CanvasClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl CanvasClient {
    /// Create a client for a Canvas base URL such as `https://school.instructure.com`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build a client from the remote configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no Canvas base URL is configured.
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let base = config
            .canvas_base_url
            .as_deref()
            .ok_or_else(|| Error::ConfigValidation {
                message: "remote.canvas_base_url is not set".to_string(),
            })?;
        Self::new(
            base,
            config.canvas_token.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// The base URL requests are made against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The course listing URL for a page size.
    #[must_use]
    pub fn courses_url(&self, per_page: u32) -> String {
        format!("{}/api/v1/courses?per_page={per_page}", self.base_url)
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// List the user's courses.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, a non-success status, or an
    /// unexpected response body.
    pub async fn courses(&self) -> Result<Vec<CanvasCourse>> {
        let url = self.courses_url(100);
        let response = self.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::RemoteStatus {
                url,
                status: status.as_u16(),
            });
        }
        let courses: Vec<CanvasCourse> = response.json().await?;
        debug!(count = courses.len(), "Fetched Canvas courses");
        Ok(courses)
    }

    /// Check that the base URL answers like a Canvas instance.
    ///
    /// # Errors
    ///
    /// Returns an error only if the request cannot be sent.
    pub async fn verify(&self) -> Result<bool> {
        let response = self.get(&self.courses_url(1)).send().await?;
        Ok(response.status().is_success())
    }
}

/// Remember the origin of a verified Canvas instance so pages on it are
/// classified as Canvas. Returns `false` if it was already known.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn remember_domain(store: &Store, base_url: &str) -> Result<bool> {
    let mut domains = store.load::<CanvasDomains>()?.unwrap_or_default();
    let origin = origin_of(base_url);
    if !domains.insert(origin) {
        return Ok(false);
    }
    store.save(&domains)?;
    info!(%origin, "Canvas domain stored");
    Ok(true)
}
