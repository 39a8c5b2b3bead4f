// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian repository mirroring.

This crate mirrors Debian-style package repositories to local storage. It
discovers which metadata and package files exist upstream, determines which
of them changed since the previous run and downloads only what is needed.

# A Tour of Functionality

Repositories are described by `sources.list` style lines, which the
[repository::target] module parses into [repository::target::MirrorTarget].
A target expands into the metadata URLs of its distribution: release files,
package indices, `Contents` files and so on.

Downloads land in a *skel* directory whose layout mirrors the remote URLs
(see [sanitize::sanitize_uri]). [repository::manifest::IndexManifest] records
modification times of package indices before and after downloading, which
reveals the indices that actually changed.

Changed indices are decompressed and parsed by the [index] module, yielding
the payload files to fetch. Translation and AppStream metadata are discovered
by scanning `Release` files with [repository::checksum::scan_checksum_block].

[download::DownloadCoordinator] drives downloads with a fixed pool of workers
and keeps marker files so downloads interrupted by a crash can be cleaned up.
The transport is pluggable through [download::Fetcher]. An HTTP implementation
lives in [repository::http] (requires the `http` feature).

[mirror::MirrorPass] ties all of this together, publishes metadata into the
mirror directory once payloads are in place, and removes files no longer
referenced.

Configuration is read from YAML by the [config] module.

# Crate Features

The optional and enabled-by-default `http` feature enables the HTTP
transport, backed by the `reqwest` crate.
*/

pub mod config;
pub mod download;
pub mod error;
pub mod index;
pub mod io;
pub mod mirror;
pub mod repository;
pub mod sanitize;
