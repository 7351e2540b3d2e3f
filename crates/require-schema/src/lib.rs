//! Shared types for the require module loader.
//!
//! Version requests and their comparison rules live in [`version`]; the
//! description of which builds this process can load lives in [`target`].

pub mod target;
pub mod version;

// Re-exports
pub use target::*;
pub use version::{VersionMatch, VersionSpec, compare_versions};

/// Suffix of the exported symbol carrying a module's version string
/// (`<module>LibRelease`).
pub const VERSION_MARKER_SUFFIX: &str = "LibRelease";

/// Name of the version marker symbol exported by `module`.
///
/// ```
/// assert_eq!(require_schema::version_marker_symbol("asyn"), "asynLibRelease");
/// ```
pub fn version_marker_symbol(module: &str) -> String {
    format!("{module}{VERSION_MARKER_SUFFIX}")
}
