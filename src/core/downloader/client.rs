use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::hash::{file_matches, ExpectedHash};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::progress::ProgressReporter;

pub const DEFAULT_CONCURRENCY: usize = 3;

/// A single file to download, keyed by a caller-chosen id.
#[derive(Debug, Clone)]
pub struct DownloadEntry {
    pub id: String,
    pub url: String,
    pub dest: PathBuf,
    pub expected_hash: Option<ExpectedHash>,
    /// Sent as `Authorization: Bearer …` (private repositories).
    pub bearer_token: Option<String>,
}

impl DownloadEntry {
    pub fn new(id: impl Into<String>, url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            dest: dest.into(),
            expected_hash: None,
            bearer_token: None,
        }
    }

    pub fn with_hash(mut self, expected: Option<ExpectedHash>) -> Self {
        self.expected_hash = expected;
        self
    }

    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Bytes were fetched and verified.
    Downloaded { bytes: u64 },
    /// The destination already held content with the expected hash.
    AlreadyPresent,
}

/// Concurrent, hash-verified downloader.
pub struct Downloader {
    client: Client,
    /// Maximum number of parallel downloads.
    concurrency: usize,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    // ── Single file download ────────────────────────────

    /// Download `url` to `dest`, optionally verifying a digest.
    ///
    /// If `dest` already matches `expected` no request is made. Otherwise the
    /// body is streamed into a `.part` sibling, hashed on the way, and only
    /// renamed onto `dest` once it verifies. On a mismatch both the partial
    /// file and any stale `dest` are removed.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        expected: Option<&ExpectedHash>,
        progress: &ProgressReporter,
    ) -> LauncherResult<DownloadOutcome> {
        let entry = DownloadEntry::new(url, url, dest).with_hash(expected.cloned());
        self.fetch(&entry, progress).await
    }

    pub async fn fetch(
        &self,
        entry: &DownloadEntry,
        progress: &ProgressReporter,
    ) -> LauncherResult<DownloadOutcome> {
        let dest = entry.dest.as_path();

        if let Some(expected) = &entry.expected_hash {
            if file_matches(dest, expected).await? {
                debug!("Already present, skipping: {:?}", dest);
                progress.report(1.0, &format!("{} already downloaded", display_name(dest)));
                return Ok(DownloadOutcome::AlreadyPresent);
            }
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        let part = part_path(dest);
        let result = self.stream_to(entry, &part, progress).await;

        match result {
            Ok(bytes) => {
                tokio::fs::rename(&part, dest)
                    .await
                    .map_err(|e| LauncherError::io(dest, e))?;
                progress.report(1.0, &format!("Downloaded {}", display_name(dest)));
                debug!("Downloaded: {} -> {:?}", entry.url, dest);
                Ok(DownloadOutcome::Downloaded { bytes })
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                if matches!(e, LauncherError::HashMismatch { .. }) {
                    let _ = tokio::fs::remove_file(dest).await;
                }
                Err(e)
            }
        }
    }

    async fn stream_to(
        &self,
        entry: &DownloadEntry,
        part: &Path,
        progress: &ProgressReporter,
    ) -> LauncherResult<u64> {
        let mut request = self.client.get(&entry.url);
        if let Some(token) = &entry.bearer_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: entry.url.clone(),
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length().filter(|n| *n > 0);
        let mut hasher = entry.expected_hash.as_ref().map(|e| e.algorithm.hasher());
        let mut written: u64 = 0;
        let label = display_name(&entry.dest);

        // Write inside a block so the handle is dropped before the rename.
        {
            let mut file = tokio::fs::File::create(part)
                .await
                .map_err(|e| LauncherError::io(part, e))?;
            let mut body = response.bytes_stream();

            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                if let Some(h) = hasher.as_mut() {
                    h.update(&chunk);
                }
                file.write_all(&chunk)
                    .await
                    .map_err(|e| LauncherError::io(part, e))?;
                written += chunk.len() as u64;

                if let Some(total) = total_bytes {
                    progress.report(written as f64 / total as f64, &label);
                }
            }

            file.flush().await.map_err(|e| LauncherError::io(part, e))?;
        }

        if let (Some(expected), Some(hasher)) = (&entry.expected_hash, hasher) {
            let actual = hasher.finalize_hex();
            if !expected.matches(&actual) {
                warn!(
                    "Hash mismatch for {} ({}): expected {}, got {}",
                    entry.url, expected.algorithm, expected.hex, actual
                );
                return Err(LauncherError::HashMismatch {
                    path: entry.dest.clone(),
                    expected: expected.hex.clone(),
                    actual,
                });
            }
        }

        Ok(written)
    }

    // ── Batch concurrent downloads ──────────────────────

    /// Download many files with at most `max_concurrency` in flight.
    ///
    /// Every entry completes independently: one failure does not cancel its
    /// siblings. The returned map has exactly one entry per requested id.
    /// Once `cancel` fires, entries that have not started are reported as
    /// failed without touching the network; in-flight ones finish normally.
    pub async fn download_many(
        &self,
        entries: Vec<DownloadEntry>,
        max_concurrency: usize,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> HashMap<String, bool> {
        let total = entries.len();
        let max_concurrency = max_concurrency.max(1);
        info!(
            "Starting batch download: {} files, concurrency={}",
            total, max_concurrency
        );

        let completed = AtomicUsize::new(0);
        let results: Vec<(String, bool)> = stream::iter(entries)
            .map(|entry| {
                let completed = &completed;
                async move {
                    let ok = if cancel.is_cancelled() {
                        debug!("Skipping {} (cancelled)", entry.id);
                        false
                    } else {
                        match self.fetch(&entry, &ProgressReporter::silent()).await {
                            Ok(_) => true,
                            Err(e) => {
                                warn!("Download of {} failed: {}", entry.id, e);
                                false
                            }
                        }
                    };

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress.report(
                        done as f64 / total.max(1) as f64,
                        &format!("Downloaded {}/{} files", done, total),
                    );
                    (entry.id, ok)
                }
            })
            .buffer_unordered(max_concurrency)
            .collect()
            .await;

        results.into_iter().collect()
    }

    /// Batch download that fails if any entry fails.
    pub async fn download_all(
        &self,
        entries: Vec<DownloadEntry>,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        let results = self
            .download_many(entries, self.concurrency, progress, cancel)
            .await;
        if cancel.is_cancelled() {
            return Err(LauncherError::Cancelled);
        }

        let mut failed: Vec<&str> = results
            .iter()
            .filter(|(_, ok)| !**ok)
            .map(|(id, _)| id.as_str())
            .collect();
        if failed.is_empty() {
            return Ok(());
        }
        failed.sort_unstable();
        Err(LauncherError::Other(format!(
            "{} of {} downloads failed: {}",
            failed.len(),
            results.len(),
            failed.join(", ")
        )))
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".into());
    dest.with_file_name(format!(".{}.part", name))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
