//! Contract between the resolver and the process hosting it.
//!
//! The host owns the command interpreter that script lines are sent to and
//! the loader for declarative data files. Both may re-enter the resolver,
//! which is why every callback receives the [`ResolverContext`].

use crate::context::ResolverContext;
use crate::error::ResolveError;
use std::path::Path;

/// Lifecycle phase of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HostPhase {
    /// Startup scripts are still running; failures abort startup.
    #[default]
    Initializing,
    /// The host finished initializing; failures are only reported.
    Running,
}

/// Services the resolver and script runner need from the host process.
pub trait Host {
    /// Run one expanded script line as a host command.
    fn dispatch(&mut self, ctx: &mut ResolverContext, line: &str) -> anyhow::Result<()>;

    /// Load a module's declarative data file.
    fn load_data_file(&mut self, ctx: &mut ResolverContext, path: &Path) -> anyhow::Result<()>;

    /// Current lifecycle phase.
    fn phase(&self) -> HostPhase;

    /// Called when a top-level resolution fails before the host is running.
    fn abort_startup(&mut self, error: &ResolveError);

    /// Show a script line before it is run.
    fn echo(&mut self, line: &str) {
        println!("{line}");
    }
}
