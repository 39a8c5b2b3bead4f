// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! I/O helpers. */

use {
    crate::error::{MirrorError, Result},
    std::{
        fs::File,
        io::{BufRead, BufReader, Read},
        path::Path,
    },
};

/// Compression format of repository indices files.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Compression {
    /// No compression (no extension).
    None,

    /// XZ compression (.xz extension).
    Xz,

    /// Gzip compression (.gz extension).
    Gzip,

    /// Bzip2 compression (.bz2 extension).
    Bzip2,
}

impl Compression {
    /// Filename extension for files compressed in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Xz => ".xz",
            Self::Gzip => ".gz",
            Self::Bzip2 => ".bz2",
        }
    }

    /// Compressed formats published by repositories, in the order URLs are generated.
    pub fn published() -> impl Iterator<Item = Compression> {
        [Self::Gzip, Self::Bzip2, Self::Xz].into_iter()
    }

    /// The default retrieval preference order when several variants are available.
    pub fn default_preferred_order() -> impl Iterator<Item = Compression> {
        [Self::Xz, Self::Gzip, Self::Bzip2, Self::None].into_iter()
    }

    /// Resolve the compression of a file from its extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|x| x.to_str()) {
            Some("xz") => Self::Xz,
            Some("gz") => Self::Gzip,
            Some("bz2") => Self::Bzip2,
            _ => Self::None,
        }
    }
}

/// Wrap a reader with transparent decompression.
pub fn read_decompressed<'a>(
    stream: impl Read + 'a,
    compression: Compression,
) -> Result<Box<dyn BufRead + 'a>> {
    Ok(match compression {
        Compression::None => Box::new(BufReader::new(stream)),
        Compression::Gzip => Box::new(BufReader::new(libflate::gzip::Decoder::new(stream)?)),
        Compression::Xz => Box::new(BufReader::new(xz2::read::XzDecoder::new(stream))),
        Compression::Bzip2 => Box::new(BufReader::new(bzip2::read::BzDecoder::new(stream))),
    })
}

/// Open a file for reading, decompressing it according to its extension.
pub fn open_decompressed(path: &Path) -> Result<Box<dyn BufRead>> {
    let f = File::open(path)
        .map_err(|e| MirrorError::IoPath(format!("{}", path.display()), e))?;

    read_decompressed(f, Compression::from_path(path))
}

/// Decompress `source` into `dest`, preserving the modification time of `source`.
///
/// Returns the number of bytes written.
pub fn decompress_file(source: &Path, dest: &Path) -> Result<u64> {
    let mut reader = open_decompressed(source)?;

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| MirrorError::IoPath(format!("{}", parent.display()), e))?;
    }

    let mut fh = File::create(dest)
        .map_err(|e| MirrorError::IoPath(format!("{}", dest.display()), e))?;

    let size = std::io::copy(&mut reader, &mut fh)
        .map_err(|e| MirrorError::IoPath(format!("{}", source.display()), e))?;

    let metadata = std::fs::metadata(source)
        .map_err(|e| MirrorError::IoPath(format!("{}", source.display()), e))?;
    filetime::set_file_mtime(dest, filetime::FileTime::from_last_modification_time(&metadata))
        .map_err(|e| MirrorError::IoPath(format!("{}", dest.display()), e))?;

    Ok(size)
}

#[cfg(test)]
mod test {
    use {super::*, std::io::Write};

    #[test]
    fn compression_from_path() {
        assert_eq!(
            Compression::from_path(Path::new("a/Packages.xz")),
            Compression::Xz
        );
        assert_eq!(
            Compression::from_path(Path::new("a/Sources.gz")),
            Compression::Gzip
        );
        assert_eq!(
            Compression::from_path(Path::new("a/Packages.bz2")),
            Compression::Bzip2
        );
        assert_eq!(
            Compression::from_path(Path::new("a/Packages")),
            Compression::None
        );
    }

    #[test]
    fn gzip_roundtrip_file() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let source = td.path().join("Packages.gz");
        let dest = td.path().join("out/Packages");

        let mut encoder = libflate::gzip::Encoder::new(Vec::new())?;
        encoder.write_all(b"Package: foo\n")?;
        let data = encoder.finish().into_result()?;
        std::fs::write(&source, data)?;
        filetime::set_file_mtime(&source, filetime::FileTime::from_unix_time(1_600_000_000, 0))?;

        assert_eq!(decompress_file(&source, &dest)?, 13);
        assert_eq!(std::fs::read(&dest)?, b"Package: foo\n");

        let metadata = std::fs::metadata(&dest)?;
        assert_eq!(
            filetime::FileTime::from_last_modification_time(&metadata).unix_seconds(),
            1_600_000_000
        );

        Ok(())
    }

    #[test]
    fn xz_and_bzip2_readers() -> Result<()> {
        let mut xz = xz2::write::XzEncoder::new(Vec::new(), 6);
        xz.write_all(b"xz content")?;
        let xz = xz.finish()?;

        let mut bz = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        bz.write_all(b"bz content")?;
        let bz = bz.finish()?;

        let mut s = String::new();
        read_decompressed(xz.as_slice(), Compression::Xz)?.read_to_string(&mut s)?;
        assert_eq!(s, "xz content");

        s.clear();
        read_decompressed(bz.as_slice(), Compression::Bzip2)?.read_to_string(&mut s)?;
        assert_eq!(s, "bz content");

        Ok(())
    }
}
