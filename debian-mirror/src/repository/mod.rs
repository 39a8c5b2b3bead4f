// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian repository metadata.

A Debian repository is a collection of files holding packages and other
support primitives. See <https://wiki.debian.org/DebianRepository/Format>
for the canonical definition of a Debian repository.

[target::MirrorTarget] describes a repository to mirror and knows the layout
of its `dists/` tree. [checksum] scans the checksum blocks of `Release` and
`i18n/Index` files. [manifest] and [timestamp] track which package indices
changed during a download pass.
*/

pub mod checksum;
#[cfg(feature = "http")]
pub mod http;
pub mod manifest;
pub mod target;
pub mod timestamp;
