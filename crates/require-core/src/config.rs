//! Resolver configuration: environment variable names and the load target.

use crate::env::Environment;
use require_schema::Target;

/// Search path for module builds.
pub const SEARCH_PATH_VAR: &str = "EPICS_DRIVER_PATH";
/// Directory of the most recently resolved module's templates.
pub const TEMPLATES_VAR: &str = "TEMPLATES";
/// Search list for database includes.
pub const DB_INCLUDE_PATH_VAR: &str = "EPICS_DB_INCLUDE_PATH";
/// Search list for scripts of loaded modules.
pub const SCRIPT_PATH_VAR: &str = "SCRIPT_PATH";
/// Target architecture override.
pub const ARCH_VAR: &str = "EPICS_HOST_ARCH";
/// Host release override.
pub const RELEASE_VAR: &str = "EPICS_RELEASE";

/// Host release assumed when none is configured.
pub const DEFAULT_HOST_RELEASE: &str = "3.14.12";

/// Names and target used by one resolver context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub target: Target,
    pub search_path_var: String,
    pub templates_var: String,
    pub db_include_path_var: String,
    pub script_path_var: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::with_target(Target::current(DEFAULT_HOST_RELEASE))
    }
}

impl ResolverConfig {
    /// Default variable names for an explicit target.
    pub fn with_target(target: Target) -> Self {
        Self {
            target,
            search_path_var: SEARCH_PATH_VAR.to_string(),
            templates_var: TEMPLATES_VAR.to_string(),
            db_include_path_var: DB_INCLUDE_PATH_VAR.to_string(),
            script_path_var: SCRIPT_PATH_VAR.to_string(),
        }
    }

    /// Configuration for the running process, with the architecture and
    /// host release taken from `env` when set.
    pub fn from_env(env: &Environment) -> Self {
        let release = env.get(RELEASE_VAR).unwrap_or(DEFAULT_HOST_RELEASE);
        let mut target = Target::current(release);
        if let Some(arch) = env.get(ARCH_VAR).filter(|a| !a.is_empty()) {
            target.arch = arch.to_string();
        }
        Self::with_target(target)
    }

    /// Directories to search, in order. Defaults to the current directory.
    pub fn search_path(&self, env: &Environment) -> Vec<String> {
        let dirs = env.path_list(&self.search_path_var);
        if dirs.is_empty() {
            vec![crate::env::CURRENT_DIR_MARKER.to_string()]
        } else {
            dirs
        }
    }
}
