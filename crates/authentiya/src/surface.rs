//! Document surface detection.
//!
//! Classifies page URLs into the editing surfaces the recorder cares about.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::SurfaceConfig;
use crate::error::{Error, Result};

/// The kind of page an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    /// A Google Docs document.
    GoogleDocs,
    /// A Canvas LMS page.
    Canvas,
    /// Any other page with text inputs.
    Generic,
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GoogleDocs => write!(f, "google_docs"),
            Self::Canvas => write!(f, "canvas"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

/// Compiled surface patterns.
#[derive(Debug, Clone)]
pub struct SurfaceMatcher {
    google_docs: Vec<Regex>,
    canvas: Vec<Regex>,
    canvas_domains: Vec<String>,
}

impl SurfaceMatcher {
    /// Compile the configured patterns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] if a pattern does not compile.
    pub fn new(config: &SurfaceConfig) -> Result<Self> {
        Ok(Self {
            google_docs: compile(&config.google_docs_patterns)?,
            canvas: compile(&config.canvas_patterns)?,
            canvas_domains: config
                .canvas_domains
                .iter()
                .map(|d| d.trim_end_matches('/').to_ascii_lowercase())
                .collect(),
        })
    }

    /// Recognize more Canvas origins, such as ones verified at runtime.
    pub fn add_canvas_domains<'a>(&mut self, origins: impl IntoIterator<Item = &'a str>) {
        for origin in origins {
            let origin = origin.trim_end_matches('/').to_ascii_lowercase();
            if !self.canvas_domains.contains(&origin) {
                self.canvas_domains.push(origin);
            }
        }
    }

    /// Classify a page URL.
    #[must_use]
    pub fn classify(&self, url: &str) -> Surface {
        if self.google_docs.iter().any(|r| r.is_match(url)) {
            return Surface::GoogleDocs;
        }

        let origin = origin_of(url).to_ascii_lowercase();
        if self.canvas_domains.iter().any(|d| *d == origin)
            || self.canvas.iter().any(|r| r.is_match(url))
        {
            return Surface::Canvas;
        }

        Surface::Generic
    }
}

impl Default for SurfaceMatcher {
    fn default() -> Self {
        // The default patterns are covered by a test
        Self::new(&SurfaceConfig::default()).unwrap_or(Self {
            google_docs: Vec::new(),
            canvas: Vec::new(),
            canvas_domains: Vec::new(),
        })
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| Error::ConfigValidation {
                message: format!("invalid regex pattern {p}: {e}"),
            })
        })
        .collect()
}

/// Extract the `host[:port]` part of a URL.
///
/// Returns the input unchanged when it has no scheme.
#[must_use]
pub fn host_of(url: &str) -> &str {
    let Some((_, rest)) = url.split_once("://") else {
        return url;
    };
    let end = rest.find(&['/', '?', '#'][..]).unwrap_or(rest.len());
    let authority = &rest[..end];
    authority.rsplit_once('@').map_or(authority, |(_, host)| host)
}

/// Extract `scheme://host[:port]` from a URL.
#[must_use]
pub fn origin_of(url: &str) -> &str {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let end = rest.find(&['/', '?', '#'][..]).unwrap_or(rest.len());
            &url[..scheme.len() + 3 + end]
        }
        None => url,
    }
}
