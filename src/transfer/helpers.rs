use std::path::{Path, PathBuf};

// Lightweight path display wrapper that renders with forward slashes.
// Avoids allocating strings until actually formatted for logs.
pub(crate) struct DisplayPath<'a>(pub(crate) &'a Path);

impl<'a> std::fmt::Display for DisplayPath<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.0.to_string_lossy();
        f.write_str(&normalize_path(&s, true))
    }
}

pub(crate) fn display_path(p: &Path) -> DisplayPath<'_> {
    DisplayPath(p)
}

/// Normalize a path-like string:
/// - converts backslashes to forward slashes
/// - collapses repeated slashes
/// - optionally preserves a trailing slash (keeps explicit-dir-suffix semantics)
pub fn normalize_path(p: &str, preserve_trailing_slash: bool) -> String {
    if p.is_empty() {
        return String::new();
    }
    let mut s = p.replace('\\', "/");
    while s.contains("//") {
        s = s.replace("//", "/");
    }
    if !preserve_trailing_slash {
        // keep root "/"
        while s.len() > 1 && s.ends_with('/') {
            s.pop();
        }
    }
    s
}

/// A remote path that names a directory rather than a file (empty or ends in `/`).
pub fn is_remote_dir_path(remote_path: &str) -> bool {
    remote_path.is_empty() || remote_path.ends_with('/')
}

/// Last segment of a remote path (`/pub/a/b.txt` -> `b.txt`).
pub fn remote_file_name(remote_path: &str) -> &str {
    match remote_path.rfind('/') {
        Some(i) => &remote_path[i + 1..],
        None => remote_path,
    }
}

/// Where a download lands. A local path ending in a separator is a directory
/// and receives the remote file's own name.
pub fn resolve_local_destination(local_path: &str, remote_path: &str) -> PathBuf {
    if local_path.ends_with('/') || local_path.ends_with(std::path::MAIN_SEPARATOR) {
        Path::new(local_path).join(remote_file_name(remote_path))
    } else {
        PathBuf::from(local_path)
    }
}

/// Remote destination for one upload. A remote path ending in `/` (or any
/// remote when several sources are uploaded at once) is a directory and gets
/// the local file name appended.
pub fn resolve_remote_destination(local_path: &Path, remote: &str, force_dir: bool) -> String {
    if !(force_dir || remote.ends_with('/')) {
        return remote.to_string();
    }
    let name = local_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    format!("{}/{}", remote.trim_end_matches('/'), name)
}
