// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package index (`Packages` / `Sources`) parsing.

Package indices are control files: paragraphs of `Field: value` lines separated
by blank lines, where indented lines continue the value of the previous field.
Only the fields needed to locate and verify payload files are retained. See
[PACKAGE_FIELDS].
*/

use {
    crate::{
        error::{MirrorError, Result},
        io::{decompress_file, open_decompressed, Compression},
        repository::checksum::ChecksumType,
    },
    once_cell::sync::Lazy,
    regex::Regex,
    std::{
        collections::BTreeMap,
        io::BufRead,
        path::{Path, PathBuf},
    },
};

/// Fields retained from package index paragraphs.
pub const PACKAGE_FIELDS: &[&str; 7] = &[
    "Filename",
    "MD5sum",
    "SHA1",
    "SHA256",
    "Size",
    "Files",
    "Directory",
];

/// Matches a line starting a new field and captures the field name.
pub static RE_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([\w-]+):").unwrap());

/// A file referenced by a package record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArchiveEntry {
    /// Path of the file relative to the repository root.
    pub path: String,
    /// Expected size of the file.
    pub size: u64,
    /// Strongest advertised digest, if any.
    pub digest: Option<(ChecksumType, String)>,
}

/// One paragraph of a package index, reduced to [PACKAGE_FIELDS].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PackageRecord {
    fields: BTreeMap<String, String>,
}

impl PackageRecord {
    /// Obtain the raw value of a field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|x| x.as_str())
    }

    /// Names of fields present in this record.
    pub fn field_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.keys().map(|x| x.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The `Filename` field of binary package records.
    pub fn filename(&self) -> Option<&str> {
        self.field("Filename")
    }

    /// The `Directory` field of source package records.
    pub fn directory(&self) -> Option<&str> {
        self.field("Directory")
    }

    /// The parsed `Size` field.
    pub fn size(&self) -> Option<Result<u64>> {
        self.field("Size")
            .map(|x| x.trim().parse::<u64>().map_err(MirrorError::from))
    }

    /// The strongest digest of a binary package record.
    pub fn digest(&self) -> Option<(ChecksumType, String)> {
        ChecksumType::preferred_order().find_map(|checksum| {
            self.field(checksum.package_field_name())
                .map(|hex| (checksum, hex.to_string()))
        })
    }

    /// Entries of the `Files` field of source package records.
    ///
    /// Each line has the form `<md5> <size> <name>`.
    pub fn files(&self) -> Option<Result<Vec<(String, u64, String)>>> {
        self.field("Files").map(|value| {
            value
                .lines()
                .map(|line| line.trim())
                .filter(|line| !line.is_empty())
                .map(|line| -> Result<(String, u64, String)> {
                    match line.split_whitespace().collect::<Vec<_>>().as_slice() {
                        [md5, size, name] => {
                            Ok((md5.to_string(), size.parse::<u64>()?, name.to_string()))
                        }
                        _ => Err(MirrorError::PackageRecordBadFilesLine(line.to_string())),
                    }
                })
                .collect()
        })
    }

    /// Files referenced by this record, relative to the repository root.
    ///
    /// Binary package records reference their `Filename`. Source package records
    /// reference every entry of `Files` under `Directory`.
    pub fn archive_entries(&self) -> Result<Vec<ArchiveEntry>> {
        if let Some(filename) = self.filename() {
            let size = self
                .size()
                .ok_or(MirrorError::PackageRecordMissingField("Size"))??;

            return Ok(vec![ArchiveEntry {
                path: filename.to_string(),
                size,
                digest: self.digest(),
            }]);
        }

        match self.files() {
            Some(files) => {
                let directory = self
                    .directory()
                    .ok_or(MirrorError::PackageRecordMissingField("Directory"))?;

                Ok(files?
                    .into_iter()
                    .map(|(md5, size, name)| ArchiveEntry {
                        path: format!("{}/{}", directory.trim_end_matches('/'), name),
                        size,
                        digest: Some((ChecksumType::Md5, md5)),
                    })
                    .collect())
            }
            None => Ok(vec![]),
        }
    }
}

/// Holds parsing state for package indices.
///
/// Lines are fed in one at a time and completed records are emitted as
/// paragraphs end.
#[derive(Clone, Debug, Default)]
pub struct PackageRecordParser {
    record: PackageRecord,
    key: Option<String>,
}

impl PackageRecordParser {
    /// Feed a line to the parser.
    ///
    /// Returns a record if the line terminated a non-empty one.
    pub fn write_line(&mut self, line: &str) -> Option<PackageRecord> {
        let line = line.trim_end();

        if line.is_empty() {
            self.key = None;
            let record = std::mem::take(&mut self.record);

            return if record.is_empty() { None } else { Some(record) };
        }

        if let Some(captures) = RE_FIELD.captures(line) {
            let name = &captures[1];

            self.key = if PACKAGE_FIELDS.contains(&name) {
                let value = line
                    .split_once(':')
                    .map(|(_, v)| v.trim())
                    .unwrap_or_default();
                self.record
                    .fields
                    .insert(name.to_string(), value.to_string());

                Some(name.to_string())
            } else {
                None
            };
        } else if let Some(key) = &self.key {
            if let Some(value) = self.record.fields.get_mut(key) {
                value.push('\n');
                value.push_str(line.trim());
            }
        }

        None
    }

    /// Finish parsing, returning the last record if it is not empty.
    pub fn finish(self) -> Option<PackageRecord> {
        if self.record.is_empty() {
            None
        } else {
            Some(self.record)
        }
    }
}

/// A package index file.
#[derive(Clone, Debug)]
pub struct PackageIndex {
    path: PathBuf,
}

impl PackageIndex {
    /// Construct an instance bound to a path.
    ///
    /// Compressed files are decompressed transparently based on their extension.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse all package records from the file.
    pub fn packages(&self) -> Result<Vec<PackageRecord>> {
        read_package_records(open_decompressed(&self.path)?)
            .map_err(|e| match e {
                MirrorError::Io(e) => MirrorError::IoPath(format!("{}", self.path.display()), e),
                e => e,
            })
    }

    /// Files referenced by the records of this index, relative to the repository root.
    pub fn archive_entries(&self) -> Result<Vec<ArchiveEntry>> {
        let mut entries = vec![];

        for record in self.packages()? {
            entries.extend(record.archive_entries()?);
        }

        Ok(entries)
    }
}

/// Parse package records from a reader.
pub fn read_package_records<R: BufRead>(reader: R) -> Result<Vec<PackageRecord>> {
    let mut parser = PackageRecordParser::default();
    let mut records = vec![];

    for line in reader.lines() {
        if let Some(record) = parser.write_line(&line?) {
            records.push(record);
        }
    }

    records.extend(parser.finish());

    Ok(records)
}

/// Materialize the uncompressed form of an index.
///
/// `stripped` is the index path without compression extension. The first
/// existing compressed variant, in preferred order, is decompressed to
/// `stripped`. Returns the path of the variant that was used.
pub fn decompress_index(stripped: &Path) -> Result<PathBuf> {
    for compression in Compression::default_preferred_order() {
        if compression == Compression::None {
            continue;
        }

        let mut candidate = stripped.as_os_str().to_owned();
        candidate.push(compression.extension());
        let candidate = PathBuf::from(candidate);

        if candidate.is_file() {
            log::debug!("decompressing {}", candidate.display());
            decompress_file(&candidate, stripped)?;

            return Ok(candidate);
        }
    }

    Err(MirrorError::IndexVariantMissing(format!(
        "{}",
        stripped.display()
    )))
}

#[cfg(test)]
mod test {
    use {super::*, indoc::indoc, std::io::Write};

    fn parse(data: &str) -> Result<Vec<PackageRecord>> {
        read_package_records(data.as_bytes())
    }

    #[test]
    fn field_pattern() {
        assert_eq!(&RE_FIELD.captures("Filename: x").unwrap()[1], "Filename");
        assert_eq!(
            &RE_FIELD.captures("Multi-Arch: same").unwrap()[1],
            "Multi-Arch"
        );
        assert!(RE_FIELD.captures(" Filename: x").is_none());
        assert!(RE_FIELD.captures("no colon here").is_none());
    }

    #[test]
    fn two_records() -> Result<()> {
        let records = parse("Filename: a/b.deb\nSize: 100\n\nFilename: c/d.deb\nSize: 200\n")?;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].len(), 2);
        assert_eq!(records[0].filename(), Some("a/b.deb"));
        assert_eq!(records[0].field("Size"), Some("100"));
        assert_eq!(records[1].len(), 2);
        assert_eq!(records[1].filename(), Some("c/d.deb"));
        assert_eq!(records[1].size().unwrap()?, 200);

        Ok(())
    }

    #[test]
    fn continuation_lines() -> Result<()> {
        let records = parse(indoc! {"
            Package: foo
            Size: 100
              extra
            Description: a thing
             more description
            Filename: pool/f/foo.deb

        "})?;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field("Size"), Some("100\nextra"));
        assert_eq!(records[0].field("Description"), None);
        assert_eq!(
            records[0].field_names().collect::<Vec<_>>(),
            vec!["Filename", "Size"]
        );

        Ok(())
    }

    #[test]
    fn value_keeps_later_colons() -> Result<()> {
        let records = parse("Filename: pool/e/epoch/e_1:2.0_all.deb\nSize: 1\n")?;
        assert_eq!(records[0].filename(), Some("pool/e/epoch/e_1:2.0_all.deb"));

        Ok(())
    }

    #[test]
    fn blank_runs_and_stray_lines() -> Result<()> {
        let records = parse("\n\n  stray\nFilename: a.deb\nSize: 1\n\n\n\n")?;
        assert_eq!(records.len(), 1);

        Ok(())
    }

    #[test]
    fn source_record_entries() -> Result<()> {
        let records = parse(indoc! {"
            Package: hello
            Directory: pool/main/h/hello
            Files:
             5cfa0a1c9b3a3a8f2c1d9f6d0f0e5e4a 1847 hello_2.10-2.dsc
             6b1a2b3c4d5e6f708192a3b4c5d6e7f8 725946 hello_2.10.orig.tar.gz
            Checksums-Sha256:
             aa 1847 hello_2.10-2.dsc
        "})?;

        assert_eq!(records.len(), 1);

        let entries = records[0].archive_entries()?;
        assert_eq!(
            entries,
            vec![
                ArchiveEntry {
                    path: "pool/main/h/hello/hello_2.10-2.dsc".to_string(),
                    size: 1847,
                    digest: Some((
                        ChecksumType::Md5,
                        "5cfa0a1c9b3a3a8f2c1d9f6d0f0e5e4a".to_string()
                    )),
                },
                ArchiveEntry {
                    path: "pool/main/h/hello/hello_2.10.orig.tar.gz".to_string(),
                    size: 725946,
                    digest: Some((
                        ChecksumType::Md5,
                        "6b1a2b3c4d5e6f708192a3b4c5d6e7f8".to_string()
                    )),
                },
            ]
        );

        Ok(())
    }

    #[test]
    fn binary_record_prefers_sha256() -> Result<()> {
        let records = parse(indoc! {"
            Filename: pool/main/h/hello/hello_2.10-2_amd64.deb
            Size: 56132
            MD5sum: 52b0cad2e741dd722c3e2e16a0aae57e
            SHA256: 35b1508eeee9c1dfba798c4c04304ef0f266990f936a51f165571edf53325cbc
        "})?;

        let entries = records[0].archive_entries()?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, 56132);
        assert_eq!(entries[0].digest.as_ref().unwrap().0, ChecksumType::Sha256);

        let missing_size = parse("Filename: a.deb\n")?;
        assert!(matches!(
            missing_size[0].archive_entries(),
            Err(MirrorError::PackageRecordMissingField("Size"))
        ));

        Ok(())
    }

    #[test]
    fn decompress_index_prefers_xz() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let stripped = td.path().join("Packages");

        let mut gz = libflate::gzip::Encoder::new(Vec::new())?;
        gz.write_all(b"Filename: gz.deb\nSize: 1\n")?;
        std::fs::write(td.path().join("Packages.gz"), gz.finish().into_result()?)?;

        let mut xz = xz2::write::XzEncoder::new(Vec::new(), 6);
        xz.write_all(b"Filename: xz.deb\nSize: 2\n")?;
        std::fs::write(td.path().join("Packages.xz"), xz.finish()?)?;

        let used = decompress_index(&stripped)?;
        assert_eq!(used, td.path().join("Packages.xz"));

        let index = PackageIndex::new(&stripped);
        let entries = index.archive_entries()?;
        assert_eq!(entries[0].path, "xz.deb");

        // Compressed variants can be read directly too.
        let index = PackageIndex::new(td.path().join("Packages.gz"));
        assert_eq!(index.packages()?[0].filename(), Some("gz.deb"));

        assert!(matches!(
            decompress_index(&td.path().join("Sources")),
            Err(MirrorError::IndexVariantMissing(_))
        ));

        Ok(())
    }
}
