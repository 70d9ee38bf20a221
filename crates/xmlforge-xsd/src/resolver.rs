//! Cached schema resolution.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::errors::ResolutionError;
use crate::parser::parse_xsd;
use crate::ExternalSchema;

/// URL → parsed schema, for the lifetime of the process. Entries are
/// immutable once installed and never evicted. Concurrent installs of the
/// same URL race safely: both values are pure functions of the response
/// body, so the surviving one is equivalent.
static CACHE: Lazy<DashMap<String, Arc<ExternalSchema>>> =
    Lazy::new(DashMap::new);

/// Capability seam for the schema download, so tests never reach the
/// network.
pub trait SchemaFetcher {
    fn fetch(&self, url: &str) -> Result<String, ResolutionError>;
}

/// Blocking HTTP fetcher with a configurable timeout.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<HttpFetcher, ResolutionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResolutionError::Download { details: e.to_string() })?;
        Ok(HttpFetcher { client })
    }
}

impl SchemaFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String, ResolutionError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| ResolutionError::Download { details: e.to_string() })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolutionError::Status { status: status.as_u16() });
        }
        response
            .text()
            .map_err(|e| ResolutionError::Download { details: e.to_string() })
    }
}

/// Resolves the external schema for a document, if it declares one.
pub struct XsdResolver<F = HttpFetcher> {
    fetcher: F,
    enabled: bool,
}

impl<F: SchemaFetcher> XsdResolver<F> {
    pub fn new(fetcher: F, enabled: bool) -> XsdResolver<F> {
        XsdResolver { fetcher, enabled }
    }

    /// Probe the document root for a schema location and resolve it.
    /// Every failure path yields `None`; the caller decides whether a
    /// missing external schema is fatal.
    pub fn resolve_document(&self, path: &Path) -> Option<Arc<ExternalSchema>> {
        if !self.enabled {
            debug!("schema resolver disabled");
            return None;
        }
        let url = match xmlforge_source::schema_location(path) {
            Ok(Some(url)) => url,
            Ok(None) => {
                debug!(path = %path.display(), "no schema location on document root");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "schema location probe failed");
                return None;
            }
        };
        self.resolve_url(&url)
    }

    /// Resolve a schema URL through the process cache. Cache hits bypass
    /// the network entirely.
    pub fn resolve_url(&self, url: &str) -> Option<Arc<ExternalSchema>> {
        if !self.enabled {
            return None;
        }
        if let Some(hit) = CACHE.get(url) {
            debug!(url, "external schema cache hit");
            return Some(Arc::clone(hit.value()));
        }

        let parsed = self
            .fetcher
            .fetch(url)
            .and_then(|body| parse_xsd(&body, url));
        match parsed {
            Ok(schema) => {
                let entry = CACHE
                    .entry(url.to_string())
                    .or_insert_with(|| Arc::new(schema));
                debug!(url, elements = entry.elements.len(), "external schema resolved");
                Some(Arc::clone(entry.value()))
            }
            Err(e) => {
                warn!(url, error = %e, "external schema resolution failed");
                None
            }
        }
    }
}
