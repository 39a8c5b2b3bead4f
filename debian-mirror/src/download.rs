// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Parallel download coordination.

A [DownloadCoordinator] fetches batches of URLs with a fixed pool of workers.
Each worker owns a numbered slot. While a URL is being fetched, the slot's
marker file `Download-lock.<slot>` in the var directory names the URL and its
local destination, and `Download-lock.<slot>.lock` is exclusively locked. The
marker is removed once the URL was fetched, found current or found absent. A
marker that survives a crash identifies a download that may have left a
damaged file behind. A URL that still fails after all retries keeps its marker
too, renamed to `Download-lock.<slot>.<n>` so the slot can carry on.
[DownloadCoordinator::recover_interrupted()] deletes the files named by
leftover markers so the next pass fetches them again.

The transport is abstracted by the [Fetcher] trait.
*/

use {
    crate::{
        config::MirrorSettings,
        error::{MirrorError, Result},
        sanitize::sanitize_uri,
    },
    async_trait::async_trait,
    fs2::FileExt,
    std::{
        collections::VecDeque,
        fs::OpenOptions,
        path::{Component, Path, PathBuf},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        time::Duration,
    },
};

/// Prefix of worker slot marker files.
pub const MARKER_PREFIX: &str = "Download-lock.";

/// The category of a batch of URLs.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum UrlKind {
    /// Release files and package indices.
    Index,

    /// Translation files.
    Translation,

    /// AppStream (DEP-11) metadata.
    Dep11,

    /// Package payloads from the pool.
    Archive,
}

impl std::fmt::Display for UrlKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Index => "index",
            Self::Translation => "translation",
            Self::Dep11 => "dep11",
            Self::Archive => "archive",
        })
    }
}

/// Result of fetching a single URL.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchOutcome {
    /// Content was written. Holds the number of bytes transferred.
    Downloaded(u64),

    /// The local copy is current.
    NotModified,

    /// The server does not have the file.
    NotFound,
}

/// Retrieves remote URLs into local files.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` into `dest`.
    ///
    /// Implementations must not leave a partially written file at `dest`.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<FetchOutcome>;
}

/// Describes progress of downloads.
#[derive(Clone, Debug)]
pub enum DownloadEvent {
    /// A batch of the given kind and size is starting.
    BatchStarted(UrlKind, usize),

    /// A URL was downloaded with the given number of bytes.
    Downloaded(String, u64),

    /// A URL was current and not transferred.
    NotModified(String),

    /// A URL does not exist on the server.
    NotFound(String),

    /// A URL failed and will be attempted again.
    Retrying(String, usize),

    /// A URL failed permanently.
    Failed(String, String),
}

impl std::fmt::Display for DownloadEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BatchStarted(kind, count) => {
                write!(f, "downloading {} {} files", count, kind)
            }
            Self::Downloaded(url, size) => {
                write!(f, "downloaded {} bytes from {}", size, url)
            }
            Self::NotModified(url) => {
                write!(f, "{} is current", url)
            }
            Self::NotFound(url) => {
                write!(f, "{} not found", url)
            }
            Self::Retrying(url, attempt) => {
                write!(f, "retrying {} (attempt {})", url, attempt)
            }
            Self::Failed(url, error) => {
                write!(f, "failed to download {}: {}", url, error)
            }
        }
    }
}

/// Counts of download results.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub not_modified: usize,
    pub not_found: usize,
    pub failed: usize,
    pub bytes: u64,
}

impl DownloadSummary {
    /// Fold another summary into this one.
    pub fn merge(&mut self, other: &DownloadSummary) {
        self.downloaded += other.downloaded;
        self.not_modified += other.not_modified;
        self.not_found += other.not_found;
        self.failed += other.failed;
        self.bytes += other.bytes;
    }

    /// Total URLs processed.
    pub fn total(&self) -> usize {
        self.downloaded + self.not_modified + self.not_found + self.failed
    }

    /// Whether every URL was processed without error.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Downloads batches of URLs with bounded concurrency and crash recovery.
pub struct DownloadCoordinator<'a> {
    fetcher: &'a dyn Fetcher,
    settings: &'a MirrorSettings,
    retry_delay: Duration,
    retained_markers: AtomicUsize,
}

impl<'a> DownloadCoordinator<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, settings: &'a MirrorSettings) -> Self {
        Self {
            fetcher,
            settings,
            retry_delay: Duration::from_secs(1),
            retained_markers: AtomicUsize::new(0),
        }
    }

    /// Set the base delay between attempts. Attempt `n` waits `n` times this.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Local path a URL of the given kind is downloaded to.
    ///
    /// Archives go to the mirror directory, metadata to the skel directory.
    pub fn destination(&self, kind: UrlKind, url: &str) -> PathBuf {
        let root = match kind {
            UrlKind::Archive => &self.settings.mirror_path,
            UrlKind::Index | UrlKind::Translation | UrlKind::Dep11 => &self.settings.skel_path,
        };

        root.join(sanitize_uri(url))
    }

    fn marker_path(&self, slot: usize) -> PathBuf {
        self.settings
            .var_path
            .join(format!("{}{}", MARKER_PREFIX, slot))
    }

    fn lock_path(&self, slot: usize) -> PathBuf {
        self.settings
            .var_path
            .join(format!("{}{}.lock", MARKER_PREFIX, slot))
    }

    /// Move a slot marker aside so it outlives the current batch.
    fn retain_marker(&self, marker: &Path, slot: usize) -> Result<PathBuf> {
        let retained = loop {
            let n = self.retained_markers.fetch_add(1, Ordering::SeqCst);
            let path = self
                .settings
                .var_path
                .join(format!("{}{}.{}", MARKER_PREFIX, slot, n));

            if !path.exists() {
                break path;
            }
        };

        std::fs::rename(marker, &retained)
            .map_err(|e| MirrorError::IoPath(format!("{}", retained.display()), e))?;

        Ok(retained)
    }

    /// Whether a path from a marker lies below the mirror or skel directory.
    fn is_managed_path(&self, path: &Path) -> bool {
        !path.components().any(|c| matches!(c, Component::ParentDir))
            && (path.starts_with(&self.settings.mirror_path)
                || path.starts_with(&self.settings.skel_path))
    }

    /// Clean up after downloads interrupted by an earlier process.
    ///
    /// Files named by leftover markers are deleted along with the markers.
    /// Paths outside the mirror and skel directories are never touched.
    /// Returns the URLs that were being downloaded or that failed.
    pub fn recover_interrupted(&self) -> Result<Vec<String>> {
        let var_path = &self.settings.var_path;

        if !var_path.is_dir() {
            return Ok(vec![]);
        }

        let mut markers = vec![];
        let mut locks = vec![];

        for entry in std::fs::read_dir(var_path)
            .map_err(|e| MirrorError::IoPath(format!("{}", var_path.display()), e))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();

            if !name.starts_with(MARKER_PREFIX) {
                continue;
            }

            if name.ends_with(".lock") {
                locks.push(entry.path());
            } else {
                markers.push(entry.path());
            }
        }

        markers.sort();
        let mut urls = vec![];

        for marker in markers {
            let data = std::fs::read_to_string(&marker)
                .map_err(|e| MirrorError::IoPath(format!("{}", marker.display()), e))?;
            let mut lines = data.lines();

            if let Some(url) = lines.next().map(|x| x.trim()).filter(|x| !x.is_empty()) {
                let dest = lines
                    .next()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| self.settings.skel_path.join(sanitize_uri(url)));

                if !self.is_managed_path(&dest) {
                    log::warn!(
                        "ignoring {} named by marker {}: not below the mirror",
                        dest.display(),
                        marker.display()
                    );
                } else if dest.is_file() {
                    log::warn!(
                        "removing {} left behind by interrupted download of {}",
                        dest.display(),
                        url
                    );
                    std::fs::remove_file(&dest)
                        .map_err(|e| MirrorError::IoPath(format!("{}", dest.display()), e))?;
                }

                urls.push(url.to_string());
            }

            std::fs::remove_file(&marker)
                .map_err(|e| MirrorError::IoPath(format!("{}", marker.display()), e))?;
        }

        for path in locks {
            // Only remove lock files no live process holds.
            let fh = OpenOptions::new().write(true).open(&path)?;
            if fh.try_lock_exclusive().is_ok() {
                std::fs::remove_file(&path)
                    .map_err(|e| MirrorError::IoPath(format!("{}", path.display()), e))?;
                fh.unlock()?;
            }
        }

        Ok(urls)
    }

    /// Download a batch of URLs.
    ///
    /// Every URL is attempted independently. Failures are retried, then counted
    /// in the returned summary. An error is only returned when a worker cannot
    /// operate at all.
    pub async fn download<F>(
        &self,
        urls: &[String],
        kind: UrlKind,
        progress_cb: &Option<F>,
    ) -> Result<DownloadSummary>
    where
        F: Fn(DownloadEvent),
    {
        if urls.is_empty() {
            log::info!("no {} files to download", kind);
            return Ok(DownloadSummary::default());
        }

        log::info!("downloading {} {} files", urls.len(), kind);
        if let Some(ref cb) = progress_cb {
            cb(DownloadEvent::BatchStarted(kind, urls.len()));
        }

        std::fs::create_dir_all(&self.settings.var_path).map_err(|e| {
            MirrorError::IoPath(format!("{}", self.settings.var_path.display()), e)
        })?;

        let queue = Mutex::new(urls.iter().map(|x| x.as_str()).collect::<VecDeque<_>>());
        let threads = self.settings.threads.max(1).min(urls.len());

        let results = futures::future::join_all(
            (0..threads).map(|slot| self.run_worker(slot, kind, &queue, progress_cb)),
        )
        .await;

        let mut summary = DownloadSummary::default();
        for result in results {
            summary.merge(&result?);
        }

        log::info!(
            "{} {} files: {} downloaded ({} bytes), {} current, {} missing, {} failed",
            summary.total(),
            kind,
            summary.downloaded,
            summary.bytes,
            summary.not_modified,
            summary.not_found,
            summary.failed
        );

        Ok(summary)
    }

    async fn run_worker<F>(
        &self,
        slot: usize,
        kind: UrlKind,
        queue: &Mutex<VecDeque<&str>>,
        progress_cb: &Option<F>,
    ) -> Result<DownloadSummary>
    where
        F: Fn(DownloadEvent),
    {
        let marker = self.marker_path(slot);
        let lock_path = self.lock_path(slot);

        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| MirrorError::IoPath(format!("{}", lock_path.display()), e))?;

        let mut summary = DownloadSummary::default();

        loop {
            let url = match queue
                .lock()
                .map_err(|_| MirrorError::Other("download queue poisoned".to_string()))?
                .pop_front()
            {
                Some(url) => url,
                None => break,
            };

            let dest = self.destination(kind, url);

            lock.try_lock_exclusive()
                .map_err(|_| MirrorError::WorkerSlotLocked(slot))?;

            std::fs::write(&marker, format!("{}\n{}\n", url, dest.display()))
                .map_err(|e| MirrorError::IoPath(format!("{}", marker.display()), e))?;

            let result = self.fetch_with_retries(url, &dest, progress_cb).await;

            if result.is_ok() {
                std::fs::remove_file(&marker)
                    .map_err(|e| MirrorError::IoPath(format!("{}", marker.display()), e))?;
            } else {
                let retained = self.retain_marker(&marker, slot)?;
                log::debug!("[{}] kept marker {} for {}", slot, retained.display(), url);
            }
            lock.unlock()?;

            match result {
                Ok(FetchOutcome::Downloaded(size)) => {
                    log::debug!("[{}] downloaded {} ({} bytes)", slot, url, size);
                    summary.downloaded += 1;
                    summary.bytes += size;

                    if let Some(ref cb) = progress_cb {
                        cb(DownloadEvent::Downloaded(url.to_string(), size));
                    }
                }
                Ok(FetchOutcome::NotModified) => {
                    log::debug!("[{}] {} not modified", slot, url);
                    summary.not_modified += 1;

                    if let Some(ref cb) = progress_cb {
                        cb(DownloadEvent::NotModified(url.to_string()));
                    }
                }
                Ok(FetchOutcome::NotFound) => {
                    log::debug!("[{}] {} not found", slot, url);
                    summary.not_found += 1;

                    if let Some(ref cb) = progress_cb {
                        cb(DownloadEvent::NotFound(url.to_string()));
                    }
                }
                Err(e) => {
                    log::warn!("failed to download {}: {}", url, e);
                    summary.failed += 1;

                    if let Some(ref cb) = progress_cb {
                        cb(DownloadEvent::Failed(url.to_string(), e.to_string()));
                    }
                }
            }
        }

        Ok(summary)
    }

    async fn fetch_with_retries<F>(
        &self,
        url: &str,
        dest: &Path,
        progress_cb: &Option<F>,
    ) -> Result<FetchOutcome>
    where
        F: Fn(DownloadEvent),
    {
        let mut attempt = 0;

        loop {
            match self.fetcher.fetch(url, dest).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if attempt < self.settings.retries => {
                    attempt += 1;
                    log::debug!("attempt {} of {} failed: {}", attempt, url, e);

                    if let Some(ref cb) = progress_cb {
                        cb(DownloadEvent::Retrying(url.to_string(), attempt));
                    }

                    tokio::time::sleep(self.retry_delay * attempt as u32).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
