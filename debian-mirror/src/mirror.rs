// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Mirror pass orchestration.

A [MirrorPass] runs the phases of mirroring a set of [MirrorTarget]:

1. Files left behind by interrupted or failed downloads are removed.
2. Release files and package indices are downloaded into the skel directory.
3. Modification times reveal which package indices changed.
4. Translation and AppStream metadata are downloaded.
5. Changed package indices are decompressed. Every package index is parsed and
   the payloads it references which aren't in the mirror yet are downloaded.
6. Metadata is published from the skel directory into the mirror.
7. Files in the mirror no longer referenced by any index are removed.

Metadata of a distribution is not published while any of its payloads failed
to download, so clients of the mirror never see indices referencing files the
mirror was unable to fetch.
Payloads that failed or were interrupted are fetched by a later pass even when
their index has not changed since.
*/

use {
    crate::{
        config::MirrorSettings,
        download::{DownloadCoordinator, DownloadEvent, DownloadSummary, Fetcher, UrlKind},
        error::{MirrorError, Result},
        index::{decompress_index, PackageIndex},
        repository::target::{parse_sources_list, uri_directory, MirrorTarget},
        sanitize::sanitize_uri,
    },
    std::{
        cell::RefCell,
        collections::{BTreeSet, HashSet},
        path::Path,
    },
};

/// Outcome of a [MirrorPass].
#[derive(Clone, Debug, Default)]
pub struct PassReport {
    /// Number of mirror targets.
    pub targets: usize,
    /// Repository lines that could not be parsed.
    pub skipped_lines: usize,
    /// URLs of downloads interrupted by an earlier run.
    pub recovered: Vec<String>,
    pub indexes: DownloadSummary,
    pub translations: DownloadSummary,
    pub dep11: DownloadSummary,
    pub archives: DownloadSummary,
    /// Payloads already in the mirror with the expected size.
    pub archives_current: usize,
    /// Metadata files copied into the mirror.
    pub published: usize,
    /// Distribution URLs whose metadata was not published because payloads
    /// are missing.
    pub held_back: Vec<String>,
    pub removed_files: usize,
    pub removed_bytes: u64,
}

impl PassReport {
    /// Whether every download batch completed without failures.
    pub fn is_success(&self) -> bool {
        [&self.indexes, &self.translations, &self.dep11, &self.archives]
            .iter()
            .all(|x| x.is_success())
    }
}

impl std::fmt::Display for PassReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "targets: {} ({} skipped)", self.targets, self.skipped_lines)?;
        if !self.recovered.is_empty() {
            writeln!(f, "recovered interrupted downloads: {}", self.recovered.len())?;
        }
        for (name, summary) in [
            ("index", &self.indexes),
            ("translation", &self.translations),
            ("dep11", &self.dep11),
            ("archive", &self.archives),
        ] {
            writeln!(
                f,
                "{} files: {} downloaded, {} current, {} missing, {} failed",
                name, summary.downloaded, summary.not_modified, summary.not_found, summary.failed
            )?;
        }
        writeln!(f, "archives already present: {}", self.archives_current)?;
        writeln!(f, "metadata files published: {}", self.published)?;
        for url in &self.held_back {
            writeln!(f, "metadata held back: {}", url)?;
        }
        write!(
            f,
            "removed {} files ({} bytes)",
            self.removed_files, self.removed_bytes
        )
    }
}

fn push_unique(dest: &mut Vec<String>, seen: &mut HashSet<String>, urls: Vec<String>) {
    for url in urls {
        if seen.insert(url.clone()) {
            dest.push(url);
        }
    }
}

/// Whether a payload exists locally with the expected size.
fn payload_current(path: &Path, size: u64) -> bool {
    match std::fs::metadata(path) {
        Ok(m) => m.is_file() && m.len() == size,
        Err(_) => false,
    }
}

/// Copy a file preserving its modification time.
///
/// Returns whether a copy was made. A destination with the same size and
/// modification time is considered current.
pub fn publish_file(source: &Path, dest: &Path) -> Result<bool> {
    let source_meta = std::fs::metadata(source)
        .map_err(|e| MirrorError::IoPath(format!("{}", source.display()), e))?;
    let mtime = filetime::FileTime::from_last_modification_time(&source_meta);

    if let Ok(dest_meta) = std::fs::metadata(dest) {
        if dest_meta.len() == source_meta.len()
            && filetime::FileTime::from_last_modification_time(&dest_meta) == mtime
        {
            return Ok(false);
        }
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| MirrorError::IoPath(format!("{}", parent.display()), e))?;
    }

    let mut temp = dest.as_os_str().to_owned();
    temp.push(".publish");
    let temp = std::path::PathBuf::from(temp);

    std::fs::copy(source, &temp)
        .map_err(|e| MirrorError::IoPath(format!("{}", temp.display()), e))?;
    filetime::set_file_mtime(&temp, mtime)
        .map_err(|e| MirrorError::IoPath(format!("{}", temp.display()), e))?;
    std::fs::rename(&temp, dest)
        .map_err(|e| MirrorError::IoPath(format!("{}", dest.display()), e))?;

    Ok(true)
}

/// Remove files below a repository's mirror directory which are not `required`.
///
/// `required` holds paths relative to `mirror_path`. Returns the number of
/// files removed and their total size.
pub fn clean_directory(
    mirror_path: &Path,
    uri: &str,
    required: &HashSet<String>,
) -> Result<(usize, u64)> {
    let root = uri_directory(mirror_path, uri);

    if !root.is_dir() {
        return Ok((0, 0));
    }

    let mut count = 0;
    let mut bytes = 0;

    for entry in walkdir::WalkDir::new(&root) {
        let entry = entry.map_err(std::io::Error::from)?;

        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(mirror_path)
            .map_err(|e| MirrorError::Other(format!("{}: {}", entry.path().display(), e)))?
            .to_string_lossy()
            .to_string();

        if required.contains(&rel) {
            continue;
        }

        let size = entry.metadata().map_err(std::io::Error::from)?.len();
        log::debug!("removing {}", entry.path().display());
        std::fs::remove_file(entry.path())
            .map_err(|e| MirrorError::IoPath(format!("{}", entry.path().display()), e))?;

        count += 1;
        bytes += size;
    }

    if count > 0 {
        log::info!("removed {} files ({} bytes) from {}", count, bytes, root.display());
    }

    Ok((count, bytes))
}

/// A single mirroring run over a set of targets.
pub struct MirrorPass<'a> {
    settings: &'a MirrorSettings,
    fetcher: &'a dyn Fetcher,
    targets: Vec<MirrorTarget>,
    skipped_lines: usize,
}

impl<'a> MirrorPass<'a> {
    /// Construct a pass over the repositories listed in `settings`.
    ///
    /// Malformed repository lines are logged and skipped.
    pub fn new(settings: &'a MirrorSettings, fetcher: &'a dyn Fetcher) -> Self {
        let mut targets = vec![];
        let mut skipped_lines = 0;

        for result in parse_sources_list(
            settings.sources.iter().map(|x| x.as_str()),
            &settings.default_architecture,
        ) {
            match result {
                Ok(target) => targets.push(target),
                Err(e) => {
                    log::warn!("skipping repository: {}", e);
                    skipped_lines += 1;
                }
            }
        }

        let mut pass = Self::from_targets(settings, fetcher, targets);
        pass.skipped_lines = skipped_lines;
        pass
    }

    /// Construct a pass over already parsed targets.
    pub fn from_targets(
        settings: &'a MirrorSettings,
        fetcher: &'a dyn Fetcher,
        mut targets: Vec<MirrorTarget>,
    ) -> Self {
        for target in targets.iter_mut() {
            if !settings.clean_enabled_for(target.uri()) {
                target.set_clean(false);
            }
        }

        Self {
            settings,
            fetcher,
            targets,
            skipped_lines: 0,
        }
    }

    pub fn targets(&self) -> &[MirrorTarget] {
        &self.targets
    }

    /// Metadata URLs of every target, without duplicates.
    pub fn index_urls(&mut self) -> Vec<String> {
        let mut urls = vec![];
        let mut seen = HashSet::new();

        for target in self.targets.iter_mut() {
            push_unique(&mut urls, &mut seen, target.index_urls(self.settings));
        }

        urls
    }

    /// Run the pass.
    pub async fn run<F>(&mut self, progress_cb: &Option<F>) -> Result<PassReport>
    where
        F: Fn(DownloadEvent),
    {
        let settings = self.settings;
        let coordinator = DownloadCoordinator::new(self.fetcher, settings);

        let mut report = PassReport {
            targets: self.targets.len(),
            skipped_lines: self.skipped_lines,
            ..Default::default()
        };

        report.recovered = coordinator.recover_interrupted()?;
        if !report.recovered.is_empty() {
            log::warn!(
                "cleaned up {} interrupted downloads",
                report.recovered.len()
            );
        }

        let mut metadata_urls = self.index_urls();
        report.indexes = coordinator
            .download(&metadata_urls, UrlKind::Index, progress_cb)
            .await?;

        for target in self.targets.iter_mut() {
            target.timestamp(settings);
        }

        // URIs whose metadata could not be fully processed. Never cleaned.
        let mut incomplete = HashSet::new();

        let mut translation_urls = vec![];
        let mut dep11_urls = vec![];
        let mut seen = HashSet::new();

        for target in &self.targets {
            match target.translation_indexes(settings) {
                Ok(urls) => push_unique(&mut translation_urls, &mut seen, urls),
                Err(e) => {
                    log::warn!("unable to resolve translations of {}: {}", target.uri(), e);
                    incomplete.insert(target.uri().to_string());
                }
            }

            match target.dep11_files(settings) {
                Ok(urls) => push_unique(&mut dep11_urls, &mut seen, urls),
                Err(e) => {
                    log::warn!("unable to resolve dep11 files of {}: {}", target.uri(), e);
                    incomplete.insert(target.uri().to_string());
                }
            }
        }

        report.translations = coordinator
            .download(&translation_urls, UrlKind::Translation, progress_cb)
            .await?;
        report.dep11 = coordinator
            .download(&dep11_urls, UrlKind::Dep11, progress_cb)
            .await?;

        metadata_urls.extend(translation_urls);
        metadata_urls.extend(dep11_urls);

        // Relative paths in the mirror that must be kept.
        let mut required = HashSet::new();
        let mut archive_urls = vec![];
        let mut queued = HashSet::new();
        // Payloads missing before the archive batch, with the distribution
        // URL whose indices reference them.
        let mut missing: Vec<(String, String)> = vec![];

        for target in &self.targets {
            let changed = target.release_files(true, settings);
            let unchanged = target
                .release_files(false, settings)
                .into_iter()
                .filter(|x| !changed.contains(x))
                .collect::<Vec<_>>();

            let files = changed
                .into_iter()
                .map(|x| (true, x))
                .chain(unchanged.into_iter().map(|x| (false, x)));

            for (modified, stripped) in files {
                let path = settings.skel_path.join(&stripped);

                if modified || !path.is_file() {
                    match decompress_index(&path) {
                        Ok(source) => {
                            log::info!("processing {}", source.display());
                        }
                        Err(MirrorError::IndexVariantMissing(_)) => {
                            log::warn!("no variant of index {} available", stripped);
                            continue;
                        }
                        Err(e) => {
                            log::warn!("unable to decompress {}: {}", stripped, e);
                            incomplete.insert(target.uri().to_string());
                            continue;
                        }
                    }
                }

                let entries = match PackageIndex::new(&path).archive_entries() {
                    Ok(entries) => entries,
                    Err(e) => {
                        log::warn!("unable to read {}: {}", path.display(), e);
                        incomplete.insert(target.uri().to_string());
                        continue;
                    }
                };

                for entry in entries {
                    let url = format!("{}/{}", target.uri(), entry.path.trim_start_matches('/'));
                    let local = sanitize_uri(&url);
                    let dest = settings.mirror_path.join(&local);

                    if payload_current(&dest, entry.size) {
                        if queued.insert(local.clone()) {
                            report.archives_current += 1;
                        }
                    } else {
                        if queued.insert(local.clone()) {
                            archive_urls.push(url.clone());
                        }
                        missing.push((target.dist_base_url(), url));
                    }

                    required.insert(local);
                }
            }
        }

        let failed = RefCell::new(HashSet::new());
        let archive_cb = Some(|event: DownloadEvent| {
            if let DownloadEvent::Failed(url, _) = &event {
                failed.borrow_mut().insert(url.clone());
            }
            if let Some(cb) = progress_cb {
                cb(event);
            }
        });

        report.archives = coordinator
            .download(&archive_urls, UrlKind::Archive, &archive_cb)
            .await?;

        let failed = failed.into_inner();
        let held_back = missing
            .into_iter()
            .filter(|(_, url)| failed.contains(url))
            .map(|(dist, _)| dist)
            .collect::<BTreeSet<_>>();

        for dist in &held_back {
            log::warn!("not publishing {} because payloads are missing", dist);
        }

        let mut published = HashSet::new();
        for url in &metadata_urls {
            let rel = sanitize_uri(url);

            if !published.insert(rel.clone()) {
                continue;
            }

            let source = settings.skel_path.join(&rel);
            if !source.is_file() {
                continue;
            }

            if held_back.iter().any(|dist| url.starts_with(dist.as_str())) {
                // Keep whatever the mirror already has.
                required.insert(rel);
                continue;
            }

            if publish_file(&source, &settings.mirror_path.join(&rel))? {
                log::debug!("published {}", rel);
                report.published += 1;
            }

            required.insert(rel);
        }

        report.held_back = held_back.into_iter().collect();

        if !settings.clean {
            log::info!("cleanup disabled");
        } else if !report.is_success() {
            log::warn!("skipping cleanup because some downloads failed");
        } else {
            let uris = self
                .targets
                .iter()
                .map(|t| t.uri().to_string())
                .collect::<BTreeSet<_>>();

            for uri in uris {
                let cleanable = self
                    .targets
                    .iter()
                    .filter(|t| t.uri() == uri)
                    .all(|t| t.clean());

                if !cleanable {
                    log::info!("cleanup of {} disabled", uri);
                    continue;
                }

                if incomplete.contains(&uri) {
                    log::warn!("skipping cleanup of {} because its metadata is incomplete", uri);
                    continue;
                }

                let (count, bytes) = clean_directory(&settings.mirror_path, &uri, &required)?;
                report.removed_files += count;
                report.removed_bytes += bytes;
            }
        }

        Ok(report)
    }
}
