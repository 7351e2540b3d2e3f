//! Environment side-channel shared by the resolver, scripts and the host.
//!
//! Values set while resolving one module stay visible to every later
//! resolution and script line. Path lists keep a leading `.` followed by the
//! most recently added directory.

use require_schema::Platform;
use std::collections::BTreeMap;

/// Marker for the current directory at the head of a path list.
pub const CURRENT_DIR_MARKER: &str = ".";

/// A string-keyed store of scalars and path lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
    separator: char,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// An empty environment using the platform's path list separator.
    pub fn new() -> Self {
        Self::with_separator(Platform::current().path_list_separator())
    }

    /// An empty environment with an explicit path list separator.
    pub fn with_separator(separator: char) -> Self {
        Self {
            vars: BTreeMap::new(),
            separator,
        }
    }

    /// Snapshot of the process environment. Non-UTF-8 entries are skipped.
    pub fn from_process() -> Self {
        let mut env = Self::new();
        env.vars.extend(std::env::vars());
        env
    }

    /// Separator used for path list variables.
    pub fn separator(&self) -> char {
        self.separator
    }

    /// Value of `name`, if set.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Set `name` to `value`, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Remove `name`, returning its previous value.
    pub fn unset(&mut self, name: &str) -> Option<String> {
        self.vars.remove(name)
    }

    /// All variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries of the path list stored in `name`; empty if unset.
    pub fn path_list(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|list| {
                split_search_path(list, self.separator)
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Put `dir` at the front of the path list `name`, right after the
    /// leading `.` marker.
    ///
    /// An existing occurrence of `dir` is moved rather than duplicated.
    ///
    /// ```
    /// use require_core::Environment;
    ///
    /// let mut env = Environment::with_separator(':');
    /// env.set("SCRIPT_PATH", ".:/opt/a:/opt/b");
    /// env.prepend_path("SCRIPT_PATH", "/opt/b");
    /// assert_eq!(env.get("SCRIPT_PATH"), Some(".:/opt/b:/opt/a"));
    /// ```
    pub fn prepend_path(&mut self, name: &str, dir: &str) {
        let mut entries = self.path_list(name);
        if entries.first().is_some_and(|e| e == CURRENT_DIR_MARKER) {
            entries.remove(0);
        }
        entries.retain(|e| e != dir);

        let sep = self.separator.to_string();
        let mut list = vec![CURRENT_DIR_MARKER, dir];
        list.extend(entries.iter().map(String::as_str));
        let value = list.join(&sep);

        tracing::debug!("{name}={value}");
        self.set(name, value);
    }
}

/// Split a path list on `separator`.
///
/// With `:` as separator, URL-like entries (`http://host:8080/dir`) are
/// kept whole: no split happens between `://` and the next `/`, and later
/// separators split as usual. Empty entries are dropped.
///
/// ```
/// use require_core::env::split_search_path;
///
/// assert_eq!(
///     split_search_path("/a:http://host:8080/x:/b", ':'),
///     vec!["/a", "http://host:8080/x", "/b"]
/// );
/// ```
pub fn split_search_path(list: &str, separator: char) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    // Start of the host part of a URL entry, until its first `/`.
    let mut host_from = None;
    for (i, c) in list.char_indices() {
        if let Some(from) = host_from {
            if i >= from && c == '/' {
                host_from = None;
            }
            continue;
        }
        if c != separator {
            continue;
        }
        if list[i..].starts_with("://") {
            host_from = Some(i + 3);
            continue;
        }
        entries.push(&list[start..i]);
        start = i + c.len_utf8();
    }
    entries.push(&list[start..]);
    entries.retain(|e| !e.is_empty());
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_to_unset_variable() {
        let mut env = Environment::with_separator(':');
        env.prepend_path("EPICS_DB_INCLUDE_PATH", "/m/db");
        assert_eq!(env.get("EPICS_DB_INCLUDE_PATH"), Some(".:/m/db"));
    }

    #[test]
    fn test_prepend_relocates_existing_entry() {
        let mut env = Environment::with_separator(':');
        env.set("P", ".:/a:/b:/c");
        env.prepend_path("P", "/c");
        assert_eq!(env.get("P"), Some(".:/c:/a:/b"));
        env.prepend_path("P", "/a");
        assert_eq!(env.get("P"), Some(".:/a:/c:/b"));
    }

    #[test]
    fn test_prepend_already_at_front_is_stable() {
        let mut env = Environment::with_separator(':');
        env.set("P", ".:/a:/b");
        env.prepend_path("P", "/a");
        assert_eq!(env.get("P"), Some(".:/a:/b"));
    }

    #[test]
    fn test_prepend_adds_marker_when_missing() {
        let mut env = Environment::with_separator(':');
        env.set("P", "/x:/y");
        env.prepend_path("P", "/y");
        assert_eq!(env.get("P"), Some(".:/y:/x"));
    }

    #[test]
    fn test_windows_separator() {
        let mut env = Environment::with_separator(';');
        env.set("P", ".;C:\\mods;D:\\other");
        env.prepend_path("P", "D:\\other");
        assert_eq!(env.get("P"), Some(".;D:\\other;C:\\mods"));
    }

    #[test]
    fn test_split_keeps_urls_whole() {
        assert_eq!(
            split_search_path("https://a.b/c:/d::/e", ':'),
            vec!["https://a.b/c", "/d", "/e"]
        );
        assert!(split_search_path("", ':').is_empty());
    }

    #[test]
    fn test_split_keeps_url_port() {
        assert_eq!(
            split_search_path("http://host:8080/x:/y:ftp://h:21/z", ':'),
            vec!["http://host:8080/x", "/y", "ftp://h:21/z"]
        );
        assert_eq!(
            split_search_path("/a;http://host:8080/x;/b", ';'),
            vec!["/a", "http://host:8080/x", "/b"]
        );
    }

    #[test]
    fn test_set_get_unset() {
        let mut env = Environment::new();
        env.set("A", "1");
        assert_eq!(env.get("A"), Some("1"));
        assert_eq!(env.unset("A"), Some("1".to_string()));
        assert_eq!(env.get("A"), None);
    }
}
