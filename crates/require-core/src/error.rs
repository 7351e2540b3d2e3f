//! Error types for module resolution and script execution.
//!
//! A failed dependency is returned unchanged to the outer caller, so the
//! message names the module that actually failed. A `require` issued by a
//! startup script fails the script, and reaches the caller as the source of
//! [`ResolveError::ScriptFailure`].

use crate::BoxError;
use crate::loader::LoadError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to resolve a module.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// No build of the module exists anywhere on the search path.
    #[error("module {module} not found in {}", search_path.join(", "))]
    NotFound {
        module: String,
        search_path: Vec<String>,
    },

    /// Builds exist but none satisfies the request.
    #[error("module {module} version {requested} not available (found: {})", available.join(", "))]
    VersionUnavailable {
        module: String,
        requested: String,
        available: Vec<String>,
    },

    /// Matching versions exist but none is built for this target.
    #[error(
        "module {module} version {requested} not available for {arch} (built versions: {})",
        versions.join(", ")
    )]
    NotForTarget {
        module: String,
        requested: String,
        arch: String,
        versions: Vec<String>,
    },

    /// The module is already loaded under an incompatible version.
    #[error("module {module} version {loaded} already loaded, conflicts with requested {requested}")]
    VersionConflict {
        module: String,
        requested: String,
        loaded: String,
    },

    /// The module is required again while its own resolution is under way.
    #[error("dependency cycle: {}", chain.join(" -> "))]
    CycleDetected { chain: Vec<String> },

    /// The platform loader rejected the binary.
    #[error("loading module {module} failed: {source}")]
    LoadFailure {
        module: String,
        #[source]
        source: LoadError,
    },

    /// The loaded binary reports a version that does not satisfy the request.
    #[error("{} reports version {found} of {module}, which does not match {requested}", path.display())]
    MarkerMismatch {
        module: String,
        path: PathBuf,
        requested: String,
        found: String,
    },

    /// The module's data file was found but could not be loaded.
    #[error("loading {} for module {module} failed: {source}", path.display())]
    DataFileLoadFailure {
        module: String,
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// The post-load registration routine failed.
    #[error("{routine} for module {module} failed: {source}")]
    Registration {
        module: String,
        routine: String,
        #[source]
        source: BoxError,
    },

    /// The dependency manifest exists but could not be read.
    #[error("cannot read dependency manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The module's startup script failed.
    #[error("startup script of module {module} failed: {source}")]
    ScriptFailure {
        module: String,
        #[source]
        source: Box<ScriptError>,
    },
}

/// Failure while running a script.
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("cannot open script {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error reading {} after line {line}: {source}", path.display())]
    Read {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },

    /// A dispatched line failed; the rest of the script is not run.
    #[error("{}:{line}: {command}: {source}", path.display())]
    Command {
        path: PathBuf,
        line: usize,
        command: String,
        #[source]
        source: BoxError,
    },
}
