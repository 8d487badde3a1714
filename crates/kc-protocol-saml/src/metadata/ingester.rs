//! Metadata ingestion from inline XML, local files and remote URLs.
//!
//! Inline and file sources are parsed synchronously. Remote sources are
//! fetched on background tasks bounded by a semaphore, retried with capped
//! exponential backoff, and optionally refreshed on a schedule. Results
//! only ever leave a task through the upsert callback.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kc_core::{MetadataFetchConfig, SharedClock};
use reqwest::{Client, StatusCode};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::catalog::{EntityRecord, UpsertCallback};
use super::parser::parse_metadata;
use crate::error::{SamlError, SamlResult};

/// Where a metadata document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataSource {
    /// The XML document itself.
    Inline(String),
    /// A file, or a directory whose files are all read.
    File(PathBuf),
    /// An `http` or `https` URL.
    Url(Url),
}

impl MetadataSource {
    /// Classifies a configured source string.
    ///
    /// Strings starting with `<` are inline XML, `file:` prefixes name a
    /// local path, and `http(s)://` strings are URLs.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Configuration`] for anything else.
    pub fn parse(raw: &str) -> SamlResult<Self> {
        let trimmed = raw.trim();
        if trimmed.starts_with('<') {
            return Ok(Self::Inline(trimmed.to_string()));
        }
        if let Some(rest) = trimmed.strip_prefix("file:") {
            if rest.starts_with("//") {
                let url = Url::parse(trimmed)
                    .map_err(|e| SamlError::Configuration(format!("invalid file URL: {e}")))?;
                let path = url.to_file_path().map_err(|()| {
                    SamlError::Configuration(format!("invalid file URL: {trimmed}"))
                })?;
                return Ok(Self::File(path));
            }
            if rest.is_empty() {
                return Err(SamlError::Configuration("empty file source".to_string()));
            }
            return Ok(Self::File(PathBuf::from(rest)));
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            let url = Url::parse(trimmed)
                .map_err(|e| SamlError::Configuration(format!("invalid metadata URL: {e}")))?;
            return Ok(Self::Url(url));
        }
        Err(SamlError::Configuration(format!(
            "unrecognized metadata source: {trimmed}"
        )))
    }
}

/// Background fetch tasks started by [`MetadataIngester::ingest`].
#[derive(Debug, Default)]
pub struct IngestHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl IngestHandle {
    /// Number of remote sources being fetched.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    /// Waits for every fetch task to finish.
    ///
    /// With periodic refresh enabled the tasks never finish on their own.
    pub async fn wait(self) {
        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Metadata fetch task ended abnormally");
            }
        }
    }

    /// Stops every fetch task.
    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Retrieves metadata documents and feeds the parsed records to a callback.
#[derive(Clone)]
pub struct MetadataIngester {
    client: Client,
    config: MetadataFetchConfig,
    clock: SharedClock,
    on_upsert: UpsertCallback,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for MetadataIngester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataIngester")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MetadataIngester {
    /// Creates an ingester.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Configuration`] if the HTTP client cannot be built.
    pub fn new(
        config: MetadataFetchConfig,
        clock: SharedClock,
        on_upsert: UpsertCallback,
    ) -> SamlResult<Self> {
        let client = Client::builder()
            .timeout(config.fetch_timeout())
            .build()
            .map_err(|e| SamlError::Configuration(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1))),
            config,
            clock,
            on_upsert,
        })
    }

    /// Ingests every source.
    ///
    /// Inline XML and files are processed before returning; remote sources
    /// are handed to background tasks and never block the caller.
    ///
    /// ## Errors
    ///
    /// Returns an error for malformed inline XML, or
    /// [`SamlError::Configuration`] when remote sources are given outside a
    /// Tokio runtime. Unreadable or malformed files are logged and skipped.
    pub fn ingest(&self, sources: &[MetadataSource]) -> SamlResult<IngestHandle> {
        let has_remote = sources.iter().any(|s| matches!(s, MetadataSource::Url(_)));
        let runtime = if has_remote {
            Some(tokio::runtime::Handle::try_current().map_err(|_| {
                SamlError::Configuration(
                    "remote metadata sources require a Tokio runtime".to_string(),
                )
            })?)
        } else {
            None
        };

        let mut handle = IngestHandle::default();
        for source in sources {
            match source {
                MetadataSource::Inline(xml) => {
                    let records = parse_metadata(xml, self.clock.now())?;
                    self.publish(records);
                }
                MetadataSource::File(path) => self.ingest_path(path),
                MetadataSource::Url(url) => {
                    if url.scheme() == "http" {
                        warn!(source = %url, "Metadata source uses plain HTTP and is insecure");
                    }
                    if let Some(runtime) = &runtime {
                        let this = self.clone();
                        let url = url.clone();
                        handle.tasks.push(runtime.spawn(async move { this.run_remote(url).await }));
                    }
                }
            }
        }
        Ok(handle)
    }

    /// Parses configured source strings and ingests them.
    ///
    /// Every string is classified before anything is ingested.
    ///
    /// ## Errors
    ///
    /// See [`MetadataSource::parse`] and [`Self::ingest`].
    pub fn ingest_configured(&self, raw_sources: &[String]) -> SamlResult<IngestHandle> {
        let sources = raw_sources
            .iter()
            .map(|s| MetadataSource::parse(s))
            .collect::<SamlResult<Vec<_>>>()?;
        self.ingest(&sources)
    }

    fn publish(&self, records: Vec<EntityRecord>) {
        for record in records {
            (self.on_upsert)(record);
        }
    }

    fn ingest_path(&self, path: &Path) {
        if path.is_dir() {
            let entries = match std::fs::read_dir(path) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read metadata directory, skipping");
                    return;
                }
            };
            let mut files: Vec<PathBuf> = entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|p| p.is_file())
                .collect();
            files.sort();
            for file in files {
                self.ingest_file(&file);
            }
        } else {
            self.ingest_file(path);
        }
    }

    fn ingest_file(&self, path: &Path) {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read metadata file, skipping");
                return;
            }
        };
        match parse_metadata(&contents, self.clock.now()) {
            Ok(records) => {
                debug!(path = %path.display(), entities = records.len(), "Loaded metadata file");
                self.publish(records);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Malformed metadata file, skipping");
            }
        }
    }

    async fn run_remote(self, url: Url) {
        loop {
            let earliest_expiry = self.fetch_with_retry(&url).await;

            let Some(interval) = self.config.refresh_interval() else {
                return;
            };
            let delay = self.next_refresh_delay(interval, earliest_expiry);
            debug!(source = %url, delay_secs = delay.as_secs(), "Scheduling metadata refresh");
            tokio::time::sleep(delay).await;
        }
    }

    fn next_refresh_delay(&self, interval: Duration, earliest_expiry: Option<DateTime<Utc>>) -> Duration {
        let until_expiry = earliest_expiry
            .and_then(|expiry| (expiry - self.clock.now()).to_std().ok())
            .unwrap_or(interval);
        interval.min(until_expiry).max(Duration::from_secs(1))
    }

    /// Fetches `url` until it parses or attempts run out.
    ///
    /// Returns the earliest `valid_until` among the published records.
    async fn fetch_with_retry(&self, url: &Url) -> Option<DateTime<Utc>> {
        let max_attempts = self.config.max_fetch_attempts.max(1);
        let mut backoff = self.config.initial_backoff();

        for attempt in 1..=max_attempts {
            let result = {
                let Ok(_permit) = self.permits.acquire().await else {
                    return None;
                };
                self.fetch_once(url).await
            };

            match result {
                Ok(body) => return self.publish_fetched(url, &body),
                Err(e) if attempt < max_attempts => {
                    warn!(
                        source = %url,
                        error = %e,
                        attempt = attempt,
                        wait_ms = backoff.as_millis(),
                        "Metadata fetch failed, retrying with backoff"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.max_backoff());
                }
                Err(e) => {
                    warn!(
                        source = %url,
                        error = %e,
                        attempts = attempt,
                        "Metadata fetch abandoned"
                    );
                }
            }
        }
        None
    }

    async fn fetch_once(&self, url: &Url) -> SamlResult<String> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(SamlError::Transport(format!("unexpected status {status}")));
        }
        Ok(response.text().await?)
    }

    fn publish_fetched(&self, url: &Url, body: &str) -> Option<DateTime<Utc>> {
        match parse_metadata(body, self.clock.now()) {
            Ok(records) => {
                info!(source = %url, entities = records.len(), "Fetched metadata");
                let earliest = records.iter().map(|r| r.valid_until).min();
                self.publish(records);
                earliest
            }
            Err(e) => {
                warn!(source = %url, error = %e, "Fetched metadata is malformed, ignoring");
                None
            }
        }
    }
}
