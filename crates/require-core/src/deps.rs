//! Dependency manifests (`<module>.dep`).
//!
//! One `module [version]` pair per line. Blank lines and `#` comments are
//! ignored. A bare numeric version is a minimum: `1.0` means `1.0+`.

use require_schema::version::is_numeric;
use std::io;
use std::path::Path;

/// A module a build needs loaded first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub module: String,
    pub version: Option<String>,
}

/// Parse manifest text.
///
/// ```
/// use require_core::deps::{parse_manifest, Dependency};
///
/// let deps = parse_manifest("# needs\nasyn 4.21\ncalc,3.1+\nsscan\n");
/// assert_eq!(deps[0].version.as_deref(), Some("4.21+"));
/// assert_eq!(deps[1].version.as_deref(), Some("3.1+"));
/// assert_eq!(deps[2], Dependency { module: "sscan".into(), version: None });
/// ```
pub fn parse_manifest(text: &str) -> Vec<Dependency> {
    text.lines()
        .filter_map(|line| {
            let line = line.split('#').next().unwrap_or("").trim();
            let mut fields = line
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|f| !f.is_empty());
            let module = fields.next()?.to_string();
            let version = fields.next().map(|v| {
                if is_numeric(v) {
                    format!("{v}+")
                } else {
                    v.to_string()
                }
            });
            Some(Dependency { module, version })
        })
        .collect()
}

/// Read the manifest at `path`; a missing file means no dependencies.
pub fn read_manifest(path: &Path) -> io::Result<Vec<Dependency>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(parse_manifest(&text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_comments_and_blank_lines() {
        let deps = parse_manifest("\n   \n# header\nbaz 1.0 # trailing\n\tmotor\t6.9.1\n");
        assert_eq!(
            deps,
            vec![
                Dependency {
                    module: "baz".into(),
                    version: Some("1.0+".into())
                },
                Dependency {
                    module: "motor".into(),
                    version: Some("6.9.1+".into())
                },
            ]
        );
    }

    #[test]
    fn test_test_versions_are_exact() {
        let deps = parse_manifest("foo mybranch\nbar 2.0+\n");
        assert_eq!(deps[0].version.as_deref(), Some("mybranch"));
        assert_eq!(deps[1].version.as_deref(), Some("2.0+"));
    }

    #[test]
    fn test_read_missing_manifest() {
        let tmp = TempDir::new().unwrap();
        assert!(read_manifest(&tmp.path().join("none.dep")).unwrap().is_empty());

        let path = tmp.path().join("foo.dep");
        std::fs::write(&path, "baz 1.0\n").unwrap();
        assert_eq!(read_manifest(&path).unwrap().len(), 1);
    }
}
