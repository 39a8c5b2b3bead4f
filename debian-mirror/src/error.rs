// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[cfg(feature = "http")]
    #[error("URL error: {0:?}")]
    Url(#[from] url::ParseError),

    #[cfg(feature = "http")]
    #[error("HTTP error: {0:?}")]
    Reqwest(#[from] reqwest::Error),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("integer parsing error: {0:?}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("regex error: {0:?}")]
    Regex(#[from] regex::Error),

    #[error("YAML error: {0:?}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("malformed repository line '{0}': {1}")]
    MalformedLine(String, &'static str),

    #[error("I/O error on path {0}: {1:?}")]
    IoPath(String, std::io::Error),

    #[error("HTTP status {1} fetching {0}")]
    HttpStatus(String, u16),

    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),

    #[error("download worker slot {0} is locked by another process")]
    WorkerSlotLocked(usize),

    #[error("no compressed variant of index {0} found")]
    IndexVariantMissing(String),

    #[error("source index entry missing field: {0}")]
    PackageRecordMissingField(&'static str),

    #[error("malformed Files line in source index: {0}")]
    PackageRecordBadFilesLine(String),

    #[error("{0}")]
    Other(String),
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, MirrorError>;
