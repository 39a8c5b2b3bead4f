// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Before/after modification times of a mirrored file. */

use std::{path::Path, time::SystemTime};

/// Modification times of a local file around a download pass.
///
/// `None` means the file did not exist when probed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FileTimestamps {
    before: Option<SystemTime>,
    after: Option<SystemTime>,
}

impl FileTimestamps {
    /// Modification time recorded before the download pass.
    pub fn before(&self) -> Option<SystemTime> {
        self.before
    }

    /// Modification time recorded after the download pass.
    pub fn after(&self) -> Option<SystemTime> {
        self.after
    }

    pub fn set_before(&mut self, value: Option<SystemTime>) {
        self.before = value;
    }

    pub fn set_after(&mut self, value: Option<SystemTime>) {
        self.after = value;
    }

    /// Whether the download pass changed the file.
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

/// Obtain the modification time of a regular file.
///
/// Missing files and anything that isn't a regular file resolve to [None].
pub fn probe_mtime(path: &Path) -> Option<SystemTime> {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata.modified().ok(),
        Ok(_) => None,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::debug!("unable to stat {}: {}", path.display(), e);
            }
            None
        }
    }
}
