//! Filesystem predicates used while searching for module builds.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Whether `path` exists (following symlinks).
pub fn exists(path: &Path) -> bool {
    let found = path.exists();
    tracing::trace!("probe {}: {}", path.display(), if found { "found" } else { "absent" });
    found
}

/// Whether `path` is a directory.
pub fn is_directory(path: &Path) -> bool {
    path.is_dir()
}

/// Whether `path` is a regular file with at least one byte.
pub fn non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

/// First candidate that is a regular file, in the given order.
pub fn first_file<I>(candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    candidates.into_iter().find(|p| {
        let found = p.is_file();
        tracing::trace!("probe {}: {}", p.display(), if found { "found" } else { "absent" });
        found
    })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|s| s.starts_with('.'))
}

/// Visible children of `dir` (names not starting with `.`), sorted by name.
///
/// Entry types come from the directory listing itself; only symlinks are
/// followed with an extra `stat`. Unreadable directories yield nothing.
fn visible_children(dir: &Path) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(Result::ok)
}

/// Visible subdirectories of `dir` as `(name, path)` pairs.
pub fn subdirectories(dir: &Path) -> Vec<(String, PathBuf)> {
    visible_children(dir)
        .filter(|e| e.file_type().is_dir())
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            Some((name, e.into_path()))
        })
        .collect()
}

/// Visible regular files of `dir` as `(name, path)` pairs.
pub fn files(dir: &Path) -> Vec<(String, PathBuf)> {
    visible_children(dir)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            Some((name, e.into_path()))
        })
        .collect()
}
