// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Mirror configuration.

A [MirrorConfig] is deserialized from YAML and resolved into an immutable
[MirrorSettings], which is handed to every component that needs it.

```yaml
base_path: /srv/mirror
threads: 8
limit_rate: 500k
by_hash: true
sources:
  - deb [arch=amd64,arm64] http://deb.debian.org/debian bullseye main contrib
  - deb-src http://deb.debian.org/debian bullseye main
  - deb http://example.com/flat-repo
```
*/

use {
    crate::error::{MirrorError, Result},
    serde::{Deserialize, Serialize},
    std::path::{Path, PathBuf},
};

fn default_base_path() -> PathBuf {
    PathBuf::from("/var/spool/debian-mirror")
}

fn default_threads() -> usize {
    num_cpus::get()
}

fn default_retries() -> usize {
    5
}

fn default_true() -> bool {
    true
}

/// Debian architecture name of the running machine.
pub fn host_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "i386",
        "aarch64" => "arm64",
        "arm" => "armhf",
        "powerpc64" => "ppc64el",
        "mips64" => "mips64el",
        "mips" => "mipsel",
        arch => arch,
    }
}

fn default_architecture() -> String {
    host_architecture().to_string()
}

/// Parse a rate limit like `500k` or `2m` into bytes per second.
///
/// `k` and `m` suffixes are binary multiples (1024). Fractions are allowed.
pub fn parse_rate_limit(value: &str) -> Result<u64> {
    let value = value.trim();
    let (number, multiplier) = match value.chars().last() {
        Some('k') | Some('K') => (&value[..value.len() - 1], 1024.0),
        Some('m') | Some('M') => (&value[..value.len() - 1], 1024.0 * 1024.0),
        _ => (value, 1.0),
    };

    let number = number
        .parse::<f64>()
        .map_err(|_| MirrorError::InvalidRateLimit(value.to_string()))?;

    if !number.is_finite() || number <= 0.0 {
        return Err(MirrorError::InvalidRateLimit(value.to_string()));
    }

    Ok((number * multiplier) as u64)
}

/// A configuration file for a mirror.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorConfig {
    /// Directory holding the mirror, skel and var directories.
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// Where published metadata and package files live.
    ///
    /// Defaults to `<base_path>/mirror`.
    pub mirror_path: Option<PathBuf>,

    /// Where metadata is downloaded before being published.
    ///
    /// Defaults to `<base_path>/skel`.
    pub skel_path: Option<PathBuf>,

    /// Where download bookkeeping lives.
    ///
    /// Defaults to `<base_path>/var`.
    pub var_path: Option<PathBuf>,

    /// Architecture of sources lines not specifying `[arch=...]`.
    #[serde(default = "default_architecture")]
    pub default_architecture: String,

    /// Number of parallel downloads.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Number of times a failed download is retried.
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Bandwidth limit per download, e.g. `500k`.
    pub limit_rate: Option<String>,

    /// Whether to fetch `Contents-*` indices.
    #[serde(default = "default_true")]
    pub contents: bool,

    /// Whether to fetch `by-hash` variants of translation and AppStream files.
    #[serde(default)]
    pub by_hash: bool,

    /// Treat every package index as changed.
    #[serde(default)]
    pub force: bool,

    /// Whether files no longer referenced are removed from the mirror.
    #[serde(default = "default_true")]
    pub clean: bool,

    /// Repository URIs exempt from cleaning.
    #[serde(default)]
    pub disable_clean: Vec<String>,

    /// Accept invalid TLS certificates.
    #[serde(default)]
    pub no_check_certificate: bool,

    /// PEM file with an additional trusted root certificate.
    pub ca_certificate: Option<PathBuf>,

    /// PEM file with a client certificate.
    pub certificate: Option<PathBuf>,

    /// PEM file with the private key of `certificate`.
    pub private_key: Option<PathBuf>,

    /// Proxy URL for all requests.
    pub proxy: Option<String>,

    /// Repository lines, in `sources.list` syntax.
    #[serde(default)]
    pub sources: Vec<String>,

    /// A `sources.list` style file whose lines are appended to `sources`.
    pub sources_file: Option<PathBuf>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            mirror_path: None,
            skel_path: None,
            var_path: None,
            default_architecture: default_architecture(),
            threads: default_threads(),
            retries: default_retries(),
            limit_rate: None,
            contents: true,
            by_hash: false,
            force: false,
            clean: true,
            disable_clean: vec![],
            no_check_certificate: false,
            ca_certificate: None,
            certificate: None,
            private_key: None,
            proxy: None,
            sources: vec![],
            sources_file: None,
        }
    }
}

impl MirrorConfig {
    /// Parse a YAML configuration file.
    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = std::fs::File::open(path)
            .map_err(|e| MirrorError::IoPath(format!("{}", path.display()), e))?;

        Ok(serde_yaml::from_reader(f)?)
    }

    /// Parse YAML configuration from a string.
    pub fn from_yaml_str(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    /// Resolve into [MirrorSettings].
    ///
    /// Reads `sources_file`, if set.
    pub fn into_settings(self) -> Result<MirrorSettings> {
        let limit_rate = self
            .limit_rate
            .as_deref()
            .map(parse_rate_limit)
            .transpose()?;

        let mut sources = self.sources;
        if let Some(path) = &self.sources_file {
            let data = std::fs::read_to_string(path)
                .map_err(|e| MirrorError::IoPath(format!("{}", path.display()), e))?;
            sources.extend(data.lines().map(|x| x.to_string()));
        }

        Ok(MirrorSettings {
            mirror_path: self
                .mirror_path
                .unwrap_or_else(|| self.base_path.join("mirror")),
            skel_path: self
                .skel_path
                .unwrap_or_else(|| self.base_path.join("skel")),
            var_path: self.var_path.unwrap_or_else(|| self.base_path.join("var")),
            default_architecture: self.default_architecture,
            threads: self.threads.max(1),
            retries: self.retries,
            limit_rate,
            contents: self.contents,
            by_hash: self.by_hash,
            force: self.force,
            clean: self.clean,
            disable_clean: self
                .disable_clean
                .into_iter()
                .map(|x| x.trim_end_matches('/').to_string())
                .collect(),
            http: HttpSettings {
                no_check_certificate: self.no_check_certificate,
                ca_certificate: self.ca_certificate,
                certificate: self.certificate,
                private_key: self.private_key,
                proxy: self.proxy,
            },
            sources,
        })
    }
}

/// Transport settings of the HTTP fetcher.
#[derive(Clone, Debug, Default)]
pub struct HttpSettings {
    pub no_check_certificate: bool,
    pub ca_certificate: Option<PathBuf>,
    pub certificate: Option<PathBuf>,
    pub private_key: Option<PathBuf>,
    pub proxy: Option<String>,
}

/// Resolved, immutable settings of a mirror pass.
#[derive(Clone, Debug)]
pub struct MirrorSettings {
    pub mirror_path: PathBuf,
    pub skel_path: PathBuf,
    pub var_path: PathBuf,
    pub default_architecture: String,
    pub threads: usize,
    pub retries: usize,
    /// Bytes per second per download.
    pub limit_rate: Option<u64>,
    pub contents: bool,
    pub by_hash: bool,
    pub force: bool,
    pub clean: bool,
    pub disable_clean: Vec<String>,
    pub http: HttpSettings,
    pub sources: Vec<String>,
}

impl MirrorSettings {
    /// Settings with defaults rooted at `base_path`.
    pub fn with_base_path(base_path: impl AsRef<Path>) -> Self {
        let base_path = base_path.as_ref();

        Self {
            mirror_path: base_path.join("mirror"),
            skel_path: base_path.join("skel"),
            var_path: base_path.join("var"),
            default_architecture: default_architecture(),
            threads: default_threads().max(1),
            retries: default_retries(),
            limit_rate: None,
            contents: true,
            by_hash: false,
            force: false,
            clean: true,
            disable_clean: vec![],
            http: HttpSettings::default(),
            sources: vec![],
        }
    }

    /// Whether files of a repository URI may be cleaned.
    pub fn clean_enabled_for(&self, uri: &str) -> bool {
        self.clean
            && !self
                .disable_clean
                .iter()
                .any(|x| x == uri.trim_end_matches('/'))
    }
}
