//! Runtime module loader and startup-script interpreter.
//!
//! A host process calls [`resolver::require`] with a module name and a
//! version request. The resolver finds a matching build on the search path,
//! resolves its declared dependencies, loads the binary through a
//! [`loader::DynamicLoader`], records it in the [`registry::ModuleRegistry`],
//! loads its data file and runs its startup script through
//! [`script::run_script`]. Scripts dispatch their lines back to the
//! [`host::Host`], which may in turn require further modules.
//!
//! All state lives in an explicit [`context::ResolverContext`] passed down
//! the call chain; nothing touches the process environment.

pub mod config;
pub mod context;
pub mod deps;
pub mod env;
pub mod error;
pub mod expr;
pub mod host;
pub mod layout;
pub mod loader;
pub mod macros;
pub mod probe;
pub mod registry;
pub mod resolver;
pub mod script;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ResolverConfig;
pub use context::ResolverContext;
pub use env::Environment;
pub use error::{ResolveError, ScriptError};
pub use host::{Host, HostPhase};
pub use registry::{ModuleRecord, ModuleRegistry};
pub use resolver::{require, require_command};
pub use script::run_script;

/// Boxed error used where a host callback's error is carried as a source.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
