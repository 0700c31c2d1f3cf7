//! Curated season override document
//!
//! A JSON object keyed by stringified TMDB id, each value a [`SeriesEntry`].
//! The document is either a local file or a remote URL that is downloaded
//! into the data directory and refreshed on demand.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::error::{SourceError, SourceResult};
use super::rate_limiter::{ApiService, RateLimitedClient};
use crate::split::{OverrideLookup, SeriesEntry};

/// File name of the downloaded copy inside the data directory
pub const OVERRIDE_FILE_NAME: &str = "curetmdb.json";

type Document = Arc<Map<String, Value>>;

/// What [`OverrideSource::fetch_and_save_remote`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Source is a local file, nothing to download
    Local,
    /// A downloaded copy already exists
    Cached,
    Downloaded,
}

pub struct OverrideSource {
    path: PathBuf,
    remote_url: Option<String>,
    document: RwLock<Option<Document>>,
}

impl OverrideSource {
    /// `source` is an `http(s)://` URL or a local path
    pub fn new(source: &str, data_dir: &Path) -> Self {
        let source = source.trim();
        let is_remote = source.starts_with("http://") || source.starts_with("https://");

        let (path, remote_url) = if is_remote {
            (data_dir.join(OVERRIDE_FILE_NAME), Some(source.to_string()))
        } else {
            (PathBuf::from(source), None)
        };

        Self {
            path,
            remote_url,
            document: RwLock::new(None),
        }
    }

    pub fn is_remote(&self) -> bool {
        self.remote_url.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Download the remote document unless a copy exists and `force` is off
    pub async fn fetch_and_save_remote(&self, force: bool) -> SourceResult<FetchOutcome> {
        let Some(url) = &self.remote_url else {
            debug!("Override source is local, skipping download");
            return Ok(FetchOutcome::Local);
        };

        if !force && tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(FetchOutcome::Cached);
        }

        info!(url = %url, "Downloading season override document");
        let client = RateLimitedClient::new(ApiService::Download);
        let document: Value = client
            .fetch_json::<Value, _>(|http| http.get(url), "override_download")
            .await
            .and_then(|body| body.with_context(|| format!("Override document not found at {url}")))
            .map_err(SourceError::Http)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_vec(&document)?).await?;
        self.document.write().take();

        info!(path = %self.path.display(), "Season override document saved");
        Ok(FetchOutcome::Downloaded)
    }

    async fn load(&self) -> SourceResult<Document> {
        let cached = self.document.read().clone();
        if let Some(document) = cached {
            return Ok(document);
        }

        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Err(SourceError::NotFound(self.path.clone()));
        }

        let bytes = tokio::fs::read(&self.path).await?;
        let document: Document = Arc::new(serde_json::from_slice(&bytes)?);
        debug!(path = %self.path.display(), titles = document.len(), "Loaded season override document");

        *self.document.write() = Some(document.clone());
        Ok(document)
    }

    /// Declared seasons for a title, `None` when the document has no entry
    pub async fn lookup(&self, tmdb_id: u32) -> SourceResult<Option<SeriesEntry>> {
        let document = self.load().await?;
        match document.get(&tmdb_id.to_string()) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Forget the parsed document so the next lookup re-reads the file
    pub fn clear(&self) {
        self.document.write().take();
    }
}

#[async_trait]
impl OverrideLookup for OverrideSource {
    async fn lookup_override(&self, tmdb_id: u32) -> Option<SeriesEntry> {
        match self.lookup(tmdb_id).await {
            Ok(Some(entry)) => Some(entry),
            Ok(None) => {
                debug!(tmdb_id, "No season override for title");
                None
            }
            Err(SourceError::NotFound(path)) => {
                warn!(path = %path.display(), "Season override document missing");
                None
            }
            Err(e) => {
                error!(tmdb_id, error = %e, "Failed to read season override");
                None
            }
        }
    }

    fn clear(&self) {
        OverrideSource::clear(self);
    }
}
