// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Mirror targets.

A [MirrorTarget] is one `sources.list` style line:

```text
deb [arch=amd64,arm64] http://deb.debian.org/debian bullseye main contrib
deb-src http://deb.debian.org/debian bullseye main
deb http://example.com/flat-repo
```

It expands into the metadata URLs to fetch and tracks modification times of
its package indices across a download pass.
*/

use {
    crate::{
        config::MirrorSettings,
        error::{MirrorError, Result},
        io::Compression,
        repository::{
            checksum::{scan_checksum_block, ScanMode},
            manifest::IndexManifest,
        },
        sanitize::sanitize_uri,
    },
    std::{fs::File, io::BufReader, path::Path},
};

/// Component name standing in for flat repositories.
pub const FLAT_COMPONENT: &str = "Flat";

/// The kind of files a target mirrors.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SourceKind {
    /// Binary packages (`deb` lines).
    Binary,

    /// Source packages (`deb-src` lines).
    Source,
}

/// A repository to mirror.
#[derive(Clone, Debug)]
pub struct MirrorTarget {
    kind: SourceKind,
    architectures: Vec<String>,
    uri: String,
    distribution: String,
    components: Vec<String>,
    flat: bool,
    clean: bool,
    manifest: IndexManifest,
}

impl MirrorTarget {
    /// Parse a repository description line.
    ///
    /// `default_architecture` is used when the line has no `[arch=...]` option.
    pub fn parse(line: &str, default_architecture: &str) -> Result<Self> {
        let line = match line.find('#') {
            Some(pos) => &line[0..pos],
            None => line,
        }
        .trim();

        let mut tokens = line.split_whitespace().peekable();

        let kind = match tokens.next() {
            Some("deb") => SourceKind::Binary,
            Some(token) if token.contains("deb-src") => SourceKind::Source,
            Some(_) => {
                return Err(MirrorError::MalformedLine(
                    line.to_string(),
                    "expected deb or deb-src",
                ))
            }
            None => return Err(MirrorError::MalformedLine(line.to_string(), "empty line")),
        };

        // Options may only follow the type and may contain spaces.
        let mut options = vec![];
        if tokens.peek().map_or(false, |x| x.starts_with('[')) {
            for token in tokens.by_ref() {
                options.push(token.trim_start_matches('[').trim_end_matches(']'));

                if token.ends_with(']') {
                    break;
                }
            }
        }

        let architectures = options
            .iter()
            .find_map(|option| option.strip_prefix("arch="))
            .map(|value| {
                value
                    .split(',')
                    .filter(|x| !x.is_empty())
                    .map(|x| x.to_string())
                    .collect::<Vec<_>>()
            })
            .filter(|x| !x.is_empty())
            .unwrap_or_else(|| vec![default_architecture.to_string()]);

        let uri = tokens
            .next()
            .ok_or_else(|| MirrorError::MalformedLine(line.to_string(), "missing URI"))?
            .trim_end_matches('/')
            .to_string();

        let distribution = tokens.next().unwrap_or_default().to_string();
        let mut components = tokens.map(|x| x.to_string()).collect::<Vec<_>>();

        let flat = components.is_empty();
        if flat {
            components = vec![FLAT_COMPONENT.to_string()];
        }

        let manifest = IndexManifest::new(&components, &architectures);

        log::debug!(
            "target: kind={:?} arch={:?} uri={} distribution={} components={:?} flat={}",
            kind,
            architectures,
            uri,
            distribution,
            components,
            flat
        );

        Ok(Self {
            kind,
            architectures,
            uri,
            distribution,
            components,
            flat,
            clean: true,
            manifest,
        })
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn architectures(&self) -> &[String] {
        &self.architectures
    }

    /// Base URL of the repository, without trailing slash.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Distribution name.
    ///
    /// Empty for flat repositories without a path. A flat repository with a
    /// path (`deb http://host/repo ./`) keeps that path here; use
    /// [Self::is_flat()] rather than an empty distribution to detect flat
    /// repositories.
    pub fn distribution(&self) -> &str {
        &self.distribution
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Whether this is a flat repository (no `dists/` tree).
    pub fn is_flat(&self) -> bool {
        self.flat
    }

    /// Whether stale files under this repository are removed after a pass.
    pub fn clean(&self) -> bool {
        self.clean
    }

    pub fn set_clean(&mut self, value: bool) {
        self.clean = value;
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    /// URL prefix of distribution metadata, with trailing slash.
    pub fn dist_base_url(&self) -> String {
        if self.flat {
            let path = self.distribution.trim_start_matches("./").trim_matches('/');

            if path.is_empty() || path == "." {
                format!("{}/", self.uri)
            } else {
                format!("{}/{}/", self.uri, path)
            }
        } else {
            format!("{}/dists/{}/", self.uri, self.distribution)
        }
    }

    /// Metadata URLs of this target.
    ///
    /// Package indices are registered with the manifest and the modification
    /// times of their local copies under `skel_path` are recorded.
    pub fn index_urls(&mut self, settings: &MirrorSettings) -> Vec<String> {
        let base = self.dist_base_url();
        let mut urls = vec![];

        for name in ["InRelease", "Release", "Release.gpg"] {
            urls.push(format!("{}{}", base, name));
        }

        if self.flat {
            let component = &self.components[0];
            let arch = &self.architectures[0];

            for compression in Compression::published() {
                for name in ["Sources", "Packages"] {
                    let url = format!("{}{}{}", base, name, compression.extension());
                    self.manifest.add(component, arch, &url);
                    urls.push(url);
                }
            }
        } else {
            match self.kind {
                SourceKind::Binary => {
                    if settings.contents {
                        for arch in &self.architectures {
                            for compression in Compression::published() {
                                urls.push(format!(
                                    "{}Contents-{}{}",
                                    base,
                                    arch,
                                    compression.extension()
                                ));
                            }
                        }
                    }

                    for component in &self.components {
                        for arch in &self.architectures {
                            if settings.contents {
                                for compression in Compression::published() {
                                    urls.push(format!(
                                        "{}{}/Contents-{}{}",
                                        base,
                                        component,
                                        arch,
                                        compression.extension()
                                    ));
                                }
                            }

                            urls.push(format!("{}{}/binary-{}/Release", base, component, arch));

                            for compression in Compression::published() {
                                let ext = compression.extension();

                                let packages =
                                    format!("{}{}/binary-{}/Packages{}", base, component, arch, ext);
                                self.manifest.add(component, arch, &packages);
                                urls.push(packages);

                                urls.push(format!(
                                    "{}{}/cnf/Commands-{}{}",
                                    base, component, arch, ext
                                ));
                                urls.push(format!(
                                    "{}{}/i18n/cnf/Commands-{}{}",
                                    base, component, arch, ext
                                ));
                            }
                        }

                        urls.push(format!("{}{}/i18n/Index", base, component));
                    }
                }
                SourceKind::Source => {
                    let arch = &self.architectures[0];

                    for component in &self.components {
                        urls.push(format!("{}{}/source/Release", base, component));

                        for compression in Compression::published() {
                            let url = format!(
                                "{}{}/source/Sources{}",
                                base,
                                component,
                                compression.extension()
                            );
                            self.manifest.add(component, arch, &url);
                            urls.push(url);
                        }
                    }
                }
            }
        }

        self.manifest.capture_before(&settings.skel_path);

        urls
    }

    /// Record modification times of package indices after they were downloaded.
    ///
    /// Indices the server did not provide are forgotten.
    pub fn timestamp(&mut self, settings: &MirrorSettings) {
        self.manifest.capture_after(&settings.skel_path);
    }

    /// Extension-stripped local paths of package indices.
    ///
    /// With `modified`, the indices changed by the last pass (or all of them
    /// when forced), otherwise the untouched ones.
    pub fn release_files(&self, modified: bool, settings: &MirrorSettings) -> Vec<String> {
        if modified {
            self.manifest.changed_files(settings.force)
        } else {
            self.manifest.unchanged_files()
        }
    }

    /// Whether any package index changed during the last pass.
    pub fn is_modified(&self, settings: &MirrorSettings) -> bool {
        self.manifest.is_modified(settings.force)
    }

    fn open_skel_file(settings: &MirrorSettings, url: &str) -> Result<BufReader<File>> {
        let path = settings.skel_path.join(sanitize_uri(url));

        let f = File::open(&path)
            .map_err(|e| MirrorError::IoPath(format!("{}", path.display()), e))?;

        Ok(BufReader::new(f))
    }

    /// URLs of translation files.
    ///
    /// Read from each component's `i18n/Index` if it was downloaded, otherwise
    /// from the distribution `Release` file.
    pub fn translation_indexes(&self, settings: &MirrorSettings) -> Result<Vec<String>> {
        if self.kind != SourceKind::Binary || self.flat {
            return Ok(vec![]);
        }

        let base = self.dist_base_url();
        let release_url = format!("{}Release", base);
        let mut urls = vec![];

        for component in &self.components {
            let i18n_base = format!("{}{}/i18n/", base, component);
            let index_url = format!("{}Index", i18n_base);

            if settings
                .skel_path
                .join(sanitize_uri(&index_url))
                .is_file()
            {
                urls.extend(scan_checksum_block(
                    Self::open_skel_file(settings, &index_url)?,
                    ScanMode::Index {
                        base_uri: &i18n_base,
                    },
                    settings.by_hash,
                    &index_url,
                )?);
            } else {
                log::debug!("{} not found; falling back to {}", index_url, release_url);

                urls.extend(scan_checksum_block(
                    Self::open_skel_file(settings, &release_url)?,
                    ScanMode::Release {
                        base_uri: &base,
                        component,
                    },
                    settings.by_hash,
                    &release_url,
                )?);
            }
        }

        Ok(urls)
    }

    /// URLs of AppStream (DEP-11) metadata files.
    pub fn dep11_files(&self, settings: &MirrorSettings) -> Result<Vec<String>> {
        if self.kind != SourceKind::Binary || self.flat {
            return Ok(vec![]);
        }

        let base = self.dist_base_url();
        let release_url = format!("{}Release", base);
        let mut urls = vec![];

        for component in &self.components {
            urls.extend(scan_checksum_block(
                Self::open_skel_file(settings, &release_url)?,
                ScanMode::Dep11 {
                    base_uri: &base,
                    component,
                    architectures: &self.architectures,
                },
                settings.by_hash,
                &release_url,
            )?);
        }

        Ok(urls)
    }
}

/// Parse repository description lines.
///
/// Blank and comment lines are skipped. Each remaining line yields its own
/// result so callers can skip malformed entries.
pub fn parse_sources_list<'a>(
    lines: impl IntoIterator<Item = &'a str>,
    default_architecture: &str,
) -> Vec<Result<MirrorTarget>> {
    lines
        .into_iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| MirrorTarget::parse(line, default_architecture))
        .collect()
}

/// Whether a sanitized path lies within the local tree of a repository URI.
pub fn is_under_uri(path: &str, uri: &str) -> bool {
    let prefix = sanitize_uri(uri);
    let prefix = prefix.trim_end_matches('/');

    path == prefix || path.starts_with(&format!("{}/", prefix))
}

/// Local directory of a repository URI under `root`.
pub fn uri_directory(root: &Path, uri: &str) -> std::path::PathBuf {
    root.join(sanitize_uri(uri).trim_end_matches('/'))
}

#[cfg(test)]
mod test {
    use {
        super::*,
        filetime::{set_file_mtime, FileTime},
        indoc::indoc,
        std::path::PathBuf,
    };

    const DEBIAN: &str = "http://deb.debian.org/debian";

    fn settings(root: &Path) -> MirrorSettings {
        let mut settings = MirrorSettings::with_base_path(root);
        settings.default_architecture = "amd64".to_string();
        settings
    }

    fn write_skel(settings: &MirrorSettings, url: &str, data: &[u8], mtime: i64) -> Result<PathBuf> {
        let path = settings.skel_path.join(sanitize_uri(url));
        std::fs::create_dir_all(path.parent().unwrap())?;
        std::fs::write(&path, data)?;
        set_file_mtime(&path, FileTime::from_unix_time(mtime, 0))?;

        Ok(path)
    }

    #[test]
    fn parse_binary() -> Result<()> {
        let target = MirrorTarget::parse(
            "deb [arch=amd64,arm64] http://deb.debian.org/debian/ bullseye main contrib # comment",
            "i386",
        )?;

        assert_eq!(target.kind(), SourceKind::Binary);
        assert_eq!(target.architectures(), &["amd64", "arm64"]);
        assert_eq!(target.uri(), DEBIAN);
        assert_eq!(target.distribution(), "bullseye");
        assert_eq!(target.components(), &["main", "contrib"]);
        assert!(!target.is_flat());
        assert!(target.clean());

        Ok(())
    }

    #[test]
    fn parse_default_architecture() -> Result<()> {
        let target = MirrorTarget::parse("deb-src http://deb.debian.org/debian bullseye main", "arm64")?;
        assert_eq!(target.kind(), SourceKind::Source);
        assert_eq!(target.architectures(), &["arm64"]);

        let target = MirrorTarget::parse("deb [trusted=yes] http://example.com/debian sid main", "arm64")?;
        assert_eq!(target.architectures(), &["arm64"]);
        assert_eq!(target.uri(), "http://example.com/debian");

        Ok(())
    }

    #[test]
    fn parse_flat() -> Result<()> {
        let target = MirrorTarget::parse("deb http://example.com/repo", "amd64")?;
        assert!(target.is_flat());
        assert_eq!(target.distribution(), "");
        assert_eq!(target.components(), &[FLAT_COMPONENT]);
        assert_eq!(target.dist_base_url(), "http://example.com/repo/");

        let target = MirrorTarget::parse("deb http://example.com/repo ./", "amd64")?;
        assert!(target.is_flat());
        assert_eq!(target.dist_base_url(), "http://example.com/repo/");

        let target = MirrorTarget::parse("deb http://example.com/repo stable/", "amd64")?;
        assert!(target.is_flat());
        assert_eq!(target.dist_base_url(), "http://example.com/repo/stable/");

        Ok(())
    }

    #[test]
    fn parse_bracketed_host() -> Result<()> {
        let target = MirrorTarget::parse("deb http://[::1]/debian sid main", "amd64")?;
        assert_eq!(target.uri(), "http://[::1]/debian");
        assert_eq!(target.distribution(), "sid");
        assert_eq!(target.components(), &["main"]);
        assert_eq!(target.architectures(), &["amd64"]);

        let target = MirrorTarget::parse(
            "deb [ arch=arm64 trusted=yes ] http://[fd00::2]:8080/debian sid main",
            "amd64",
        )?;
        assert_eq!(target.architectures(), &["arm64"]);
        assert_eq!(target.uri(), "http://[fd00::2]:8080/debian");
        assert_eq!(target.distribution(), "sid");

        Ok(())
    }

    #[test]
    fn parse_malformed() {
        for line in ["", "   # only a comment", "rpm http://example.com/x", "deb", "deb [arch=amd64]"] {
            assert!(
                matches!(
                    MirrorTarget::parse(line, "amd64"),
                    Err(MirrorError::MalformedLine(_, _))
                ),
                "{}",
                line
            );
        }
    }

    #[test]
    fn sources_list() {
        let results = parse_sources_list(
            indoc! {"
                # mirror list
                deb http://deb.debian.org/debian bullseye main

                bogus line
                deb-src http://deb.debian.org/debian bullseye main
            "}
            .lines(),
            "amd64",
        );

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[test]
    fn binary_index_urls() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let mut settings = settings(td.path());

        let mut target = MirrorTarget::parse(
            "deb [arch=amd64,arm64] http://deb.debian.org/debian bullseye main contrib",
            "amd64",
        )?;

        let urls = target.index_urls(&settings);
        let base = "http://deb.debian.org/debian/dists/bullseye/";

        assert_eq!(urls[0], format!("{}InRelease", base));
        assert_eq!(urls[1], format!("{}Release", base));
        assert_eq!(urls[2], format!("{}Release.gpg", base));
        assert_eq!(urls[3], format!("{}Contents-amd64.gz", base));
        assert_eq!(urls[9], format!("{}main/Contents-amd64.gz", base));
        assert_eq!(urls[12], format!("{}main/binary-amd64/Release", base));
        assert_eq!(urls[13], format!("{}main/binary-amd64/Packages.gz", base));
        assert_eq!(urls[14], format!("{}main/cnf/Commands-amd64.gz", base));
        assert_eq!(urls[15], format!("{}main/i18n/cnf/Commands-amd64.gz", base));
        assert!(urls.contains(&format!("{}contrib/binary-arm64/Packages.xz", base)));
        assert!(urls.contains(&format!("{}main/i18n/Index", base)));
        // 3 release + 6 dist contents + 2 components x 2 arches x (3 contents + 1 release + 9)
        // + 2 i18n/Index.
        assert_eq!(urls.len(), 3 + 6 + 2 * 2 * 13 + 2);

        let files = target.manifest().files("main", "arm64").unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.contains_key("deb.debian.org/debian/dists/bullseye/main/binary-arm64/Packages.bz2"));

        settings.contents = false;
        let urls = target.index_urls(&settings);
        assert!(!urls.iter().any(|x| x.contains("Contents-")));
        assert_eq!(urls.len(), 3 + 2 * 2 * 10 + 2);

        Ok(())
    }

    #[test]
    fn source_index_urls() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let settings = settings(td.path());

        let mut target =
            MirrorTarget::parse("deb-src http://deb.debian.org/debian bullseye main", "amd64")?;
        let urls = target.index_urls(&settings);

        assert_eq!(
            urls,
            vec![
                "http://deb.debian.org/debian/dists/bullseye/InRelease",
                "http://deb.debian.org/debian/dists/bullseye/Release",
                "http://deb.debian.org/debian/dists/bullseye/Release.gpg",
                "http://deb.debian.org/debian/dists/bullseye/main/source/Release",
                "http://deb.debian.org/debian/dists/bullseye/main/source/Sources.gz",
                "http://deb.debian.org/debian/dists/bullseye/main/source/Sources.bz2",
                "http://deb.debian.org/debian/dists/bullseye/main/source/Sources.xz",
            ]
        );
        assert_eq!(target.manifest().files("main", "amd64").unwrap().len(), 3);
        assert!(target.translation_indexes(&settings)?.is_empty());
        assert!(target.dep11_files(&settings)?.is_empty());

        Ok(())
    }

    #[test]
    fn flat_index_urls() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let settings = settings(td.path());

        let mut target = MirrorTarget::parse("deb http://example.com/repo", "amd64")?;
        let urls = target.index_urls(&settings);

        assert_eq!(urls.len(), 9);
        assert_eq!(urls[0], "http://example.com/repo/InRelease");
        assert_eq!(urls[3], "http://example.com/repo/Sources.gz");
        assert_eq!(urls[4], "http://example.com/repo/Packages.gz");
        assert_eq!(
            target.manifest().files(FLAT_COMPONENT, "amd64").unwrap().len(),
            6
        );
        assert!(target.translation_indexes(&settings)?.is_empty());
        assert!(target.dep11_files(&settings)?.is_empty());

        Ok(())
    }

    #[test]
    fn index_urls_repeatable() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let settings = settings(td.path());

        let mut target = MirrorTarget::parse("deb http://deb.debian.org/debian bullseye main", "amd64")?;
        assert_eq!(target.index_urls(&settings), target.index_urls(&settings));

        Ok(())
    }

    #[test]
    fn declared_pairs_present() -> Result<()> {
        let target = MirrorTarget::parse(
            "deb [arch=amd64,arm64] http://deb.debian.org/debian bullseye main",
            "amd64",
        )?;

        assert!(target.manifest().files("main", "arm64").unwrap().is_empty());
        assert!(target.manifest().files("contrib", "arm64").is_none());

        Ok(())
    }

    #[test]
    fn timestamp_change_detection() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let mut settings = settings(td.path());
        let base = "http://deb.debian.org/debian/dists/bullseye/main/binary-amd64/";

        write_skel(&settings, &format!("{}Packages.gz", base), b"old", 1_000)?;
        write_skel(&settings, &format!("{}Packages.xz", base), b"old", 1_000)?;

        let mut target = MirrorTarget::parse("deb http://deb.debian.org/debian bullseye main", "amd64")?;
        target.index_urls(&settings);

        // Simulated download: .gz unchanged, .xz refreshed, .bz2 never offered.
        write_skel(&settings, &format!("{}Packages.xz", base), b"new", 2_000)?;
        target.timestamp(&settings);

        let stripped = "deb.debian.org/debian/dists/bullseye/main/binary-amd64/Packages".to_string();
        assert_eq!(target.release_files(true, &settings), vec![stripped.clone()]);
        assert_eq!(target.release_files(false, &settings), vec![stripped.clone()]);
        assert!(target.is_modified(&settings));
        assert_eq!(target.manifest().files("main", "amd64").unwrap().len(), 2);

        // Nothing changes on the next pass.
        target.index_urls(&settings);
        target.timestamp(&settings);
        assert!(target.release_files(true, &settings).is_empty());
        assert!(!target.is_modified(&settings));

        settings.force = true;
        assert_eq!(target.release_files(true, &settings), vec![stripped]);
        assert!(target.is_modified(&settings));

        Ok(())
    }

    #[test]
    fn translations_from_i18n_index() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let settings = settings(td.path());

        write_skel(
            &settings,
            "http://deb.debian.org/debian/dists/bullseye/main/i18n/Index",
            indoc! {"
                SHA1:
                 4b3c4a2fd2e8e3b5a9c2d6f1e0a7b8c9d0e1f2a3   1024 Translation-en.bz2
                 5c4d5b3ae3f9f4c6b0d3e7a2f1b8c9d0e1f2a3b4    512 Translation-de.bz2
            "}
            .as_bytes(),
            1_000,
        )?;

        let target = MirrorTarget::parse("deb http://deb.debian.org/debian bullseye main", "amd64")?;
        assert_eq!(
            target.translation_indexes(&settings)?,
            vec![
                "http://deb.debian.org/debian/dists/bullseye/main/i18n/Translation-en.bz2",
                "http://deb.debian.org/debian/dists/bullseye/main/i18n/Translation-de.bz2",
            ]
        );

        Ok(())
    }

    #[test]
    fn translations_and_dep11_from_release() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let mut settings = settings(td.path());

        write_skel(
            &settings,
            "http://deb.debian.org/debian/dists/bullseye/Release",
            indoc! {"
                Origin: Debian
                SHA256:
                 a3c1b2f0e9d8c7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f2e1d0c9b8a7f6e5d4c3b2   163282 main/i18n/Translation-en.bz2
                 b4d2c3a1f0e9d8c7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f2e1d0c9b8a7f6e5d4c3   120374 main/dep11/Components-amd64.yml.gz
                 bad-line
                 c5e3d4b2a1f0e9d8c7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f2e1d0c9b8a7f6e5d4    12000 main/dep11/Components-arm64.yml.gz
            "}
            .as_bytes(),
            1_000,
        )?;

        let target = MirrorTarget::parse("deb http://deb.debian.org/debian bullseye main", "amd64")?;
        assert_eq!(
            target.translation_indexes(&settings)?,
            vec!["http://deb.debian.org/debian/dists/bullseye/main/i18n/Translation-en.bz2"]
        );
        assert_eq!(
            target.dep11_files(&settings)?,
            vec!["http://deb.debian.org/debian/dists/bullseye/main/dep11/Components-amd64.yml.gz"]
        );

        settings.by_hash = true;
        let urls = target.translation_indexes(&settings)?;
        assert_eq!(urls.len(), 2);
        assert!(urls[1].contains("/main/i18n/by-hash/SHA256/a3c1b2f0"));

        Ok(())
    }

    #[test]
    fn missing_release_is_error() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let settings = settings(td.path());

        let target = MirrorTarget::parse("deb http://deb.debian.org/debian bullseye main", "amd64")?;
        assert!(matches!(
            target.dep11_files(&settings),
            Err(MirrorError::IoPath(_, _))
        ));

        Ok(())
    }

    #[test]
    fn uri_paths() {
        assert!(is_under_uri(
            "deb.debian.org/debian/pool/main/a/a.deb",
            "http://deb.debian.org/debian"
        ));
        assert!(!is_under_uri(
            "deb.debian.org/debian-security/pool/a.deb",
            "http://deb.debian.org/debian"
        ));
        assert_eq!(
            uri_directory(Path::new("/m"), "http://deb.debian.org/debian/"),
            PathBuf::from("/m/deb.debian.org/debian")
        );
    }
}
