// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Mapping of remote URLs to local relative paths.

Every file fetched from a repository is stored under a root directory at a path
derived from its URL: the scheme, any credentials and any port are removed, so
`http://user:pw@deb.debian.org:80/debian/dists/stable/Release` is stored as
`deb.debian.org/debian/dists/stable/Release`.

`.` and `..` segments are resolved without ever climbing above the host
directory, so the result always stays below the root it is joined to.
*/

use {once_cell::sync::Lazy, regex::Regex};

static RE_SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+://").unwrap());
static RE_PORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([^/]+):\d+(/|$)").unwrap());
static RE_SLASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"/{2,}").unwrap());

/// Normalize a remote URL into a filesystem-safe relative path.
pub fn sanitize_uri(uri: &str) -> String {
    let stripped = RE_SCHEME.replace(uri, "");

    // Credentials can only appear in the authority, before the first `/`.
    let (authority, rest) = match stripped.split_once('/') {
        Some((authority, rest)) => (authority, Some(rest)),
        None => (stripped.as_ref(), None),
    };
    let authority = authority
        .rsplit_once('@')
        .map(|(_, host)| host)
        .unwrap_or(authority);

    let joined = match rest {
        Some(rest) => format!("{}/{}", authority, rest),
        None => authority.to_string(),
    };

    let joined = RE_PORT.replace(&joined, "$1$2");
    let joined = RE_SLASHES.replace_all(&joined, "/");

    resolve_dot_segments(&joined).replace('~', "%7E")
}

/// Resolve `.` and `..` segments of a relative path.
///
/// The first segment names the host and is never removed. A host consisting
/// only of dots is escaped. The result never starts with `/`.
fn resolve_dot_segments(path: &str) -> String {
    let mut segments = path.split('/');

    let host = match segments.next().unwrap_or_default() {
        host if !host.is_empty() && host.chars().all(|c| c == '.') => host.replace('.', "%2E"),
        host => host.to_string(),
    };

    let mut resolved: Vec<&str> = vec![];
    let mut trailing_slash = false;

    for segment in segments {
        trailing_slash = false;

        match segment {
            "" | "." => trailing_slash = true,
            ".." => {
                resolved.pop();
                trailing_slash = true;
            }
            segment => resolved.push(segment),
        }
    }

    let mut result = host;
    for segment in resolved {
        if !result.is_empty() {
            result.push('/');
        }
        result.push_str(segment);
    }
    if trailing_slash && !result.is_empty() {
        result.push('/');
    }

    result
}
