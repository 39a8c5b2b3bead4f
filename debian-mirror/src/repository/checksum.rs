// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Scanning of checksum blocks in `Release` and `i18n/Index` files.

`Release` files list the indices files of a distribution in one block per
checksum flavor:

```text
SHA256:
 8a7e4b...  1234 main/i18n/Translation-en.bz2
 c1d2e3...  5678 main/dep11/Components-amd64.yml.gz
```

[scan_checksum_block()] walks such a file line by line, picks the entries
relevant to a [ScanMode] and turns them into fetchable URLs.
*/

use {
    crate::error::{MirrorError, Result},
    once_cell::sync::Lazy,
    regex::Regex,
    std::{collections::HashSet, io::BufRead},
};

/// Matches the line opening a checksum block and captures the flavor name.
pub static RE_CHECKSUM_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(SHA256|SHA1|MD5Sum):").unwrap());

/// Matches an entry line within a checksum block.
pub static RE_CHECKSUM_RECORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s+(\S.*)$").unwrap());

/// Checksum type / digest mechanism used in a release file.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ChecksumType {
    /// MD5.
    Md5,

    /// SHA-1.
    Sha1,

    /// SHA-256.
    Sha256,
}

impl ChecksumType {
    /// Emit variants in their preferred usage order.
    pub fn preferred_order() -> impl Iterator<Item = ChecksumType> {
        [Self::Sha256, Self::Sha1, Self::Md5].into_iter()
    }

    /// Name of the field in `Release` files holding this variant type.
    ///
    /// This is also the directory name of `by-hash` paths.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5Sum",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }

    /// Name of the field in `Packages` files holding this variant type.
    pub fn package_field_name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5sum",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }

    /// Resolve a variant from its `Release` field name.
    pub fn from_field_name(name: &str) -> Option<Self> {
        match name {
            "MD5Sum" => Some(Self::Md5),
            "SHA1" => Some(Self::Sha1),
            "SHA256" => Some(Self::Sha256),
            _ => None,
        }
    }
}

/// Selects which checksum entries are of interest and how URLs are formed.
#[derive(Clone, Copy, Debug)]
pub enum ScanMode<'a> {
    /// An `i18n/Index` file. Every entry is emitted relative to `base_uri`.
    Index { base_uri: &'a str },

    /// A distribution `Release` file, keeping `Translation-*` files of a component.
    Release { base_uri: &'a str, component: &'a str },

    /// A distribution `Release` file, keeping AppStream metadata of a component.
    Dep11 {
        base_uri: &'a str,
        component: &'a str,
        architectures: &'a [String],
    },
}

/// A [ScanMode] with its filename patterns compiled.
enum Matcher<'a> {
    Index {
        base_uri: &'a str,
    },
    Release {
        base_uri: &'a str,
        component: &'a str,
        pattern: Regex,
    },
    Dep11 {
        base_uri: &'a str,
        component: &'a str,
        patterns: Vec<Regex>,
    },
}

impl<'a> Matcher<'a> {
    fn new(mode: ScanMode<'a>) -> Result<Self> {
        Ok(match mode {
            ScanMode::Index { base_uri } => Self::Index { base_uri },
            ScanMode::Release {
                base_uri,
                component,
            } => Self::Release {
                base_uri,
                component,
                pattern: Regex::new(&format!(
                    r"^{}/i18n/Translation-[^./]*\.(gz|bz2|xz)$",
                    regex::escape(component)
                ))?,
            },
            ScanMode::Dep11 {
                base_uri,
                component,
                architectures,
            } => Self::Dep11 {
                base_uri,
                component,
                patterns: architectures
                    .iter()
                    .map(|arch| {
                        Regex::new(&format!(
                            r"^{}/dep11/(Components-{}\.yml|icons-[^./]+\.tar)\.(gz|bz2|xz)$",
                            regex::escape(component),
                            regex::escape(arch)
                        ))
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            },
        })
    }

    /// Resolve URLs for a checksum entry.
    fn urls(
        &self,
        checksum_type: ChecksumType,
        checksum: &str,
        filename: &str,
        by_hash: bool,
    ) -> Vec<String> {
        match self {
            Self::Index { base_uri } => vec![format!("{}{}", base_uri, filename)],
            Self::Release {
                base_uri,
                component,
                pattern,
            } => {
                if !pattern.is_match(filename) {
                    return vec![];
                }

                let mut urls = vec![format!("{}{}", base_uri, filename)];
                if by_hash {
                    urls.push(format!(
                        "{}{}/i18n/by-hash/{}/{}",
                        base_uri,
                        component,
                        checksum_type.field_name(),
                        checksum
                    ));
                }
                urls
            }
            Self::Dep11 {
                base_uri,
                component,
                patterns,
            } => {
                if !patterns.iter().any(|p| p.is_match(filename)) {
                    return vec![];
                }

                let mut urls = vec![format!("{}{}", base_uri, filename)];
                if by_hash {
                    urls.push(format!(
                        "{}{}/dep11/by-hash/{}/{}",
                        base_uri,
                        component,
                        checksum_type.field_name(),
                        checksum
                    ));
                }
                urls
            }
        }
    }
}

/// Scan checksum blocks of a `Release`-like file and resolve URLs of interesting entries.
///
/// `source` names the scanned file in log messages. Entries whose line doesn't
/// consist of exactly `<checksum> <size> <filename>` are logged and skipped.
///
/// URLs are emitted in file order, without duplicates. The same file is usually
/// listed once per checksum flavor.
pub fn scan_checksum_block<R: BufRead>(
    reader: R,
    mode: ScanMode<'_>,
    by_hash: bool,
    source: &str,
) -> Result<Vec<String>> {
    let matcher = Matcher::new(mode)?;

    let mut checksum_type = None;
    let mut urls = vec![];
    let mut seen = HashSet::new();

    for line in reader.lines() {
        let line = line.map_err(|e| MirrorError::IoPath(source.to_string(), e))?;

        if let Some(current) = checksum_type {
            if RE_CHECKSUM_RECORD.is_match(&line) {
                let parts = line.split_whitespace().collect::<Vec<_>>();

                if let [checksum, _size, filename] = parts.as_slice() {
                    for url in matcher.urls(current, checksum, filename, by_hash) {
                        if seen.insert(url.clone()) {
                            urls.push(url);
                        }
                    }
                } else {
                    log::warn!("malformed checksum line '{}' in {}", line, source);
                }

                continue;
            }

            // Leaving the block. The line may open the next one.
            checksum_type = None;
        }

        if let Some(captures) = RE_CHECKSUM_HEADER.captures(&line) {
            checksum_type = ChecksumType::from_field_name(&captures[1]);
        }
    }

    Ok(urls)
}

#[cfg(test)]
mod test {
    use {super::*, indoc::indoc};

    const BASE: &str = "http://deb.debian.org/debian/dists/bullseye/";

    const RELEASE: &str = indoc! {"
        Origin: Debian
        Codename: bullseye
        Components: main contrib
        MD5Sum:
         0e8f1c7a4d6b4c7ff2e1b0a3c9e54e21   163282 main/i18n/Translation-en.bz2
         5c2d8b8bd3b5a4e5d2f2d1a1d7b7e7f1   120374 main/dep11/Components-amd64.yml.gz
        SHA256:
         a3c1b2f0e9d8c7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f2e1d0c9b8a7f6e5d4c3b2   163282 main/i18n/Translation-en.bz2
         b4d2c3a1f0e9d8c7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f2e1d0c9b8a7f6e5d4c3   120374 main/dep11/Components-amd64.yml.gz
         c5e3d4b2a1f0e9d8c7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f2e1d0c9b8a7f6e5d4    12000 main/dep11/Components-arm64.yml.gz
         d6f4e5c3b2a1f0e9d8c7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f2e1d0c9b8a7f6e5    44000 main/dep11/icons-64x64.tar.gz
         e7a5f6d4c3b2a1f0e9d8c7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f2e1d0c9b8a7f6     9000 contrib/i18n/Translation-en.bz2
         f8b6a7e5d4c3b2a1f0e9d8c7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f2e1d0c9b8a7     1000 main/i18n/Translation-en
    "};

    #[test]
    fn header_pattern() {
        assert_eq!(&RE_CHECKSUM_HEADER.captures("SHA256:").unwrap()[1], "SHA256");
        assert_eq!(&RE_CHECKSUM_HEADER.captures("MD5Sum:").unwrap()[1], "MD5Sum");
        assert_eq!(&RE_CHECKSUM_HEADER.captures("SHA1: ").unwrap()[1], "SHA1");
        assert!(RE_CHECKSUM_HEADER.captures("SHA512:").is_none());
        assert!(RE_CHECKSUM_HEADER.captures("Origin: Debian").is_none());
    }

    #[test]
    fn record_pattern() {
        assert!(RE_CHECKSUM_RECORD.is_match(" abc 12 main/Release"));
        assert!(RE_CHECKSUM_RECORD.is_match("\tabc 12 main/Release"));
        assert!(!RE_CHECKSUM_RECORD.is_match("abc 12 main/Release"));
        assert!(!RE_CHECKSUM_RECORD.is_match("   "));
        assert!(!RE_CHECKSUM_RECORD.is_match(""));
    }

    #[test]
    fn checksum_type_names() {
        for checksum in ChecksumType::preferred_order() {
            assert_eq!(
                ChecksumType::from_field_name(checksum.field_name()),
                Some(checksum)
            );
        }
        assert_eq!(ChecksumType::Md5.package_field_name(), "MD5sum");
    }

    #[test]
    fn release_translation_single_url() -> Result<()> {
        let release = indoc! {"
            SHA256:
             a3c1b2f0e9d8c7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f2e1d0c9b8a7f6e5d4c3b2   163282 main/i18n/Translation-en.bz2
        "};

        let mode = ScanMode::Release {
            base_uri: BASE,
            component: "main",
        };

        let urls = scan_checksum_block(release.as_bytes(), mode, false, "Release")?;
        assert_eq!(urls.len(), 1);
        assert!(urls[0].ends_with("main/i18n/Translation-en.bz2"));

        let urls = scan_checksum_block(release.as_bytes(), mode, true, "Release")?;
        assert_eq!(
            urls,
            vec![
                format!("{}main/i18n/Translation-en.bz2", BASE),
                format!(
                    "{}main/i18n/by-hash/SHA256/a3c1b2f0e9d8c7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f2e1d0c9b8a7f6e5d4c3b2",
                    BASE
                ),
            ]
        );

        Ok(())
    }

    #[test]
    fn release_translations_across_blocks() -> Result<()> {
        let mode = ScanMode::Release {
            base_uri: BASE,
            component: "main",
        };

        // The MD5Sum block is followed directly by the SHA256 header.
        let urls = scan_checksum_block(RELEASE.as_bytes(), mode, true, "Release")?;
        assert_eq!(
            urls,
            vec![
                format!("{}main/i18n/Translation-en.bz2", BASE),
                format!(
                    "{}main/i18n/by-hash/MD5Sum/0e8f1c7a4d6b4c7ff2e1b0a3c9e54e21",
                    BASE
                ),
                format!(
                    "{}main/i18n/by-hash/SHA256/a3c1b2f0e9d8c7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f2e1d0c9b8a7f6e5d4c3b2",
                    BASE
                ),
            ]
        );

        Ok(())
    }

    #[test]
    fn dep11_filters_architectures() -> Result<()> {
        let architectures = vec!["amd64".to_string()];
        let mode = ScanMode::Dep11 {
            base_uri: BASE,
            component: "main",
            architectures: &architectures,
        };

        let urls = scan_checksum_block(RELEASE.as_bytes(), mode, false, "Release")?;
        assert_eq!(
            urls,
            vec![
                format!("{}main/dep11/Components-amd64.yml.gz", BASE),
                format!("{}main/dep11/icons-64x64.tar.gz", BASE),
            ]
        );

        let urls = scan_checksum_block(RELEASE.as_bytes(), mode, true, "Release")?;
        assert_eq!(urls.len(), 5);
        assert!(urls.contains(&format!(
            "{}main/dep11/by-hash/MD5Sum/5c2d8b8bd3b5a4e5d2f2d1a1d7b7e7f1",
            BASE
        )));

        Ok(())
    }

    #[test]
    fn index_mode_emits_everything() -> Result<()> {
        let index = indoc! {"
            SHA1:
             2a7bc2b4b8d0d9b1d3d2f7e5c4a9b8a7e6d5c4b3   163282 Translation-en.bz2
             3b8cd3c5c9e1e0c2e4e3a8f6d5b0c9b8f7e6d5c4    10000 Translation-de.bz2
        "};
        let base = format!("{}main/i18n/", BASE);

        let urls = scan_checksum_block(
            index.as_bytes(),
            ScanMode::Index { base_uri: &base },
            true,
            "Index",
        )?;

        assert_eq!(
            urls,
            vec![
                format!("{}Translation-en.bz2", base),
                format!("{}Translation-de.bz2", base),
            ]
        );

        Ok(())
    }

    #[test]
    fn malformed_line_skipped() -> Result<()> {
        let index = indoc! {"
            SHA1:
             2a7bc2b4b8d0d9b1d3d2f7e5c4a9b8a7e6d5c4b3 Translation-en.bz2
             3b8cd3c5c9e1e0c2e4e3a8f6d5b0c9b8f7e6d5c4    10000 Translation-de.bz2
        "};

        let urls = scan_checksum_block(
            index.as_bytes(),
            ScanMode::Index { base_uri: "" },
            false,
            "Index",
        )?;

        assert_eq!(urls, vec!["Translation-de.bz2".to_string()]);

        Ok(())
    }

    #[test]
    fn lines_outside_block_ignored() -> Result<()> {
        let index = indoc! {"
            Origin: Debian
             0e8f1c7a4d6b4c7ff2e1b0a3c9e54e21   163282 Translation-en.bz2
            SHA1:
             3b8cd3c5c9e1e0c2e4e3a8f6d5b0c9b8f7e6d5c4    10000 Translation-de.bz2
            Date: Sat, 09 Oct 2021 09:34:56 UTC
             0e8f1c7a4d6b4c7ff2e1b0a3c9e54e21   163282 Translation-fr.bz2
        "};

        let urls = scan_checksum_block(
            index.as_bytes(),
            ScanMode::Index { base_uri: "" },
            false,
            "Index",
        )?;

        assert_eq!(urls, vec!["Translation-de.bz2".to_string()]);

        Ok(())
    }
}
