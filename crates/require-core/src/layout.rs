//! On-disk layouts of installed modules and the candidate search.
//!
//! Two conventions are supported, tried in this order for every search
//! directory:
//!
//! - [`LayoutStrategy::NewStyle`]:
//!   `<dir>/<module>/<version>/R<release>/lib/<arch>/<lib><module><ext>`
//! - [`LayoutStrategy::OldStyle`]: flat
//!   `<dir>/<lib><module><infix>[-<version>]<ext>` files, only considered
//!   while no new-style candidate has been found and the directory has no
//!   new-style module directory.
//!
//! The best acceptable candidate wins: exact before compatible before
//! higher before test versions, newer before older. An exact match ends the
//! search.

use crate::probe;
use require_schema::version::newer_candidate;
use require_schema::{Target, VersionMatch, compare_versions};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// On-disk convention a candidate was found under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutStrategy {
    NewStyle,
    OldStyle,
}

impl LayoutStrategy {
    /// Strategies in the order they are tried.
    pub const ORDER: [Self; 2] = [Self::NewStyle, Self::OldStyle];
}

/// A loadable build of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub layout: LayoutStrategy,
    /// Version taken from the directory or file name; empty if unversioned.
    pub version: String,
    pub matched: VersionMatch,
    /// Module root: `R<release>` directory, or the search directory for old
    /// style builds.
    pub location: PathBuf,
    pub library: PathBuf,
    pub dependency_manifest: PathBuf,
}

impl Candidate {
    fn is_better_than(&self, other: &Candidate) -> bool {
        match self.matched.rank().cmp(&other.matched.rank()) {
            Ordering::Equal => {
                newer_candidate(&self.version, &other.version) == Ordering::Greater
            }
            order => order == Ordering::Greater,
        }
    }
}

/// Result of searching the search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(Candidate),
    /// No build of the module anywhere.
    NotFound,
    /// Builds exist, none satisfies the request.
    VersionUnavailable { available: Vec<String> },
    /// Satisfying versions exist but not for the target.
    NotForTarget { versions: Vec<String> },
}

/// Find the best build of `module` for `request` on `search_path`.
pub fn search(
    target: &Target,
    module: &str,
    request: &str,
    search_path: &[String],
) -> SearchOutcome {
    let mut search = Search {
        target,
        module,
        request,
        best: None,
        available: Vec::new(),
        wrong_target: Vec::new(),
    };

    'dirs: for dir in search_path {
        let dir = Path::new(dir);
        for strategy in LayoutStrategy::ORDER {
            let (tried, exact) = match strategy {
                LayoutStrategy::NewStyle => search.new_style(dir),
                LayoutStrategy::OldStyle if search.best.is_none() => search.old_style(dir),
                LayoutStrategy::OldStyle => (false, false),
            };
            if exact {
                break 'dirs;
            }
            if tried {
                break;
            }
        }
    }

    match search.best {
        Some(candidate) => SearchOutcome::Found(candidate),
        None if !search.wrong_target.is_empty() => SearchOutcome::NotForTarget {
            versions: search.wrong_target,
        },
        None if !search.available.is_empty() => SearchOutcome::VersionUnavailable {
            available: search.available,
        },
        None => SearchOutcome::NotFound,
    }
}

struct Search<'a> {
    target: &'a Target,
    module: &'a str,
    request: &'a str,
    best: Option<Candidate>,
    available: Vec<String>,
    wrong_target: Vec<String>,
}

impl Search<'_> {
    /// Returns whether `dir` has a new-style module directory and whether an
    /// exact match was found.
    fn new_style(&mut self, dir: &Path) -> (bool, bool) {
        let module_dir = dir.join(self.module);
        if !probe::is_directory(&module_dir) {
            return (false, false);
        }
        tracing::debug!("searching {}", module_dir.display());

        let release_dir = self.target.release_dir();
        let lib_name = self.target.library_file_name(self.module);
        for (version, version_dir) in probe::subdirectories(&module_dir) {
            let location = version_dir.join(&release_dir);
            let lib_dir = location.join("lib").join(&self.target.arch);
            let candidate = Candidate {
                layout: LayoutStrategy::NewStyle,
                matched: compare_versions(&version, self.request),
                library: lib_dir.join(&lib_name),
                dependency_manifest: lib_dir.join(format!("{}.dep", self.module)),
                location,
                version,
            };
            if self.consider(candidate) {
                return (true, true);
            }
        }
        (true, false)
    }

    fn old_style(&mut self, dir: &Path) -> (bool, bool) {
        let mut tried = false;
        for (file_name, path) in probe::files(dir) {
            let Some(version) = self.target.old_style_version(self.module, &file_name) else {
                continue;
            };
            tried = true;
            let manifest = if version.is_empty() {
                format!("{}.dep", self.module)
            } else {
                format!("{}-{version}.dep", self.module)
            };
            let matched = if version.is_empty() {
                // Unknown until the marker is read.
                VersionMatch::TestVersion
            } else {
                compare_versions(version, self.request)
            };
            let candidate = Candidate {
                layout: LayoutStrategy::OldStyle,
                version: version.to_string(),
                matched,
                location: dir.to_path_buf(),
                library: path,
                dependency_manifest: dir.join(manifest),
            };
            if self.consider(candidate) {
                return (true, true);
            }
        }
        (tried, false)
    }

    /// Keep `candidate` if it beats the current best. Returns true on an
    /// exact match.
    fn consider(&mut self, candidate: Candidate) -> bool {
        if !candidate.matched.is_acceptable() {
            tracing::debug!(
                "{} {}: does not match {}",
                self.module,
                candidate.version,
                self.request
            );
            self.available.push(candidate.version);
            return false;
        }
        if !probe::exists(&candidate.library) {
            tracing::debug!(
                "{} {}: no {}",
                self.module,
                candidate.version,
                candidate.library.display()
            );
            self.wrong_target.push(candidate.version);
            return false;
        }
        let exact = candidate.matched == VersionMatch::Exact;
        if self.best.as_ref().is_none_or(|best| candidate.is_better_than(best)) {
            tracing::debug!(
                "{} {}: {} candidate",
                self.module,
                candidate.version,
                candidate.matched
            );
            self.best = Some(candidate);
        }
        exact
    }
}

impl Candidate {
    /// Data file to load with the binary, if one exists and is non-empty.
    pub fn data_file(&self, module: &str) -> Option<PathBuf> {
        let name = format!("{module}.dbd");
        let candidates = match self.layout {
            LayoutStrategy::NewStyle => vec![
                self.location.join("dbd").join(&name),
                self.location.join("data").join(&name),
            ],
            LayoutStrategy::OldStyle if !self.version.is_empty() => vec![
                self.location.join("dbd").join(format!("{module}-{}.dbd", self.version)),
                self.location.join("dbd").join(&name),
            ],
            LayoutStrategy::OldStyle => vec![self.location.join("dbd").join(&name)],
        };
        candidates.into_iter().find(|p| probe::non_empty_file(p))
    }
}

fn parent_dir(location: &Path) -> PathBuf {
    location
        .parent()
        .map_or_else(|| location.join(".."), Path::to_path_buf)
}

/// Template directory near a module root.
pub fn template_dir(location: &Path) -> Option<PathBuf> {
    [location.join("db"), parent_dir(location).join("db")]
        .into_iter()
        .find(|p| probe::is_directory(p))
}

/// First startup script for a module root, most specific first.
pub fn startup_script(target: &Target, location: &Path) -> Option<PathBuf> {
    let names = [
        format!("{}.cmd", target.arch),
        format!("{}.cmd", target.os_class),
        "startup.cmd".to_string(),
    ];
    let parent = parent_dir(location);
    probe::first_file(
        names
            .iter()
            .flat_map(|name| [location.join(name), parent.join(name)]),
    )
}
