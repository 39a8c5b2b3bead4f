// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Change tracking for package index files.

An [IndexManifest] records the package index files (`Packages*`, `Sources*`)
a mirror target expects, keyed by component and architecture. Each file carries
[FileTimestamps] captured before and after a download pass, from which the sets
of changed and unchanged indices are derived.
*/

use {
    crate::{
        repository::timestamp::{probe_mtime, FileTimestamps},
        sanitize::sanitize_uri,
    },
    std::{
        collections::{BTreeMap, BTreeSet},
        path::Path,
    },
};

/// Files of one (component, architecture) pair, keyed by sanitized path.
pub type ManifestFiles = BTreeMap<String, FileTimestamps>;

/// Package index files of a mirror target.
///
/// Keys are `(component, architecture)`. Every pair declared at construction
/// is present, even when no files were ever registered for it.
#[derive(Clone, Debug, Default)]
pub struct IndexManifest {
    entries: BTreeMap<(String, String), ManifestFiles>,
}

impl IndexManifest {
    /// Construct an instance declaring every component × architecture pair.
    pub fn new<C, A>(components: &[C], architectures: &[A]) -> Self
    where
        C: AsRef<str>,
        A: AsRef<str>,
    {
        let entries = components
            .iter()
            .flat_map(|component| {
                architectures.iter().map(move |arch| {
                    (
                        (component.as_ref().to_string(), arch.as_ref().to_string()),
                        ManifestFiles::new(),
                    )
                })
            })
            .collect();

        Self { entries }
    }

    /// Register a remote file under a component and architecture.
    ///
    /// The URL is stored in its sanitized form. Registering an already known
    /// file resets its timestamps.
    pub fn add(&mut self, component: &str, architecture: &str, url: &str) {
        self.entries
            .entry((component.to_string(), architecture.to_string()))
            .or_default()
            .insert(sanitize_uri(url), FileTimestamps::default());
    }

    /// Obtain the files registered for a component and architecture.
    pub fn files(&self, component: &str, architecture: &str) -> Option<&ManifestFiles> {
        self.entries
            .get(&(component.to_string(), architecture.to_string()))
    }

    /// Iterate over `(component, architecture, files)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &ManifestFiles)> + '_ {
        self.entries
            .iter()
            .map(|((component, arch), files)| (component.as_str(), arch.as_str(), files))
    }

    fn iter_files(&self) -> impl Iterator<Item = (&String, &FileTimestamps)> + '_ {
        self.entries.values().flat_map(|files| files.iter())
    }

    /// Record modification times of files present under `root` before downloading.
    pub fn capture_before(&mut self, root: &Path) {
        log::debug!("recording timestamps of existing files in {}", root.display());

        for ((component, arch), files) in self.entries.iter_mut() {
            for (path, ts) in files.iter_mut() {
                ts.set_before(probe_mtime(&root.join(path)));

                if let Some(before) = ts.before() {
                    log::debug!("before: [{}] [{}] [{}]: {:?}", component, arch, path, before);
                }
            }
        }
    }

    /// Record modification times after downloading.
    ///
    /// Files that do not exist after the download are dropped: the server does not
    /// offer them.
    pub fn capture_after(&mut self, root: &Path) {
        log::debug!("recording timestamps of downloaded files in {}", root.display());

        for ((component, arch), files) in self.entries.iter_mut() {
            files.retain(|path, ts| match probe_mtime(&root.join(path)) {
                Some(after) => {
                    log::debug!("after: [{}] [{}] [{}]: {:?}", component, arch, path, after);
                    ts.set_after(Some(after));
                    true
                }
                None => {
                    log::debug!("dropping missing file: [{}] [{}] [{}]", component, arch, path);
                    false
                }
            });
        }
    }

    /// Extension-stripped paths of files changed by the download pass.
    ///
    /// With `force`, every tracked file is reported.
    pub fn changed_files(&self, force: bool) -> Vec<String> {
        self.iter_files()
            .filter(|(_, ts)| force || ts.changed())
            .map(|(path, _)| strip_extension(path).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Extension-stripped paths of files left untouched by the download pass.
    pub fn unchanged_files(&self) -> Vec<String> {
        self.iter_files()
            .filter(|(_, ts)| !ts.changed())
            .map(|(path, _)| strip_extension(path).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Whether any tracked file changed.
    pub fn is_modified(&self, force: bool) -> bool {
        self.iter_files().any(|(_, ts)| force || ts.changed())
    }
}

/// Remove the extension of the final path component.
///
/// Leading dots of the file name do not start an extension.
pub fn strip_extension(path: &str) -> &str {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let name = &path[name_start..];

    match name.rfind('.') {
        Some(i) if !name[..i].chars().all(|c| c == '.') => &path[..name_start + i],
        _ => path,
    }
}
