//! State threaded through every resolution and script run.

use crate::config::ResolverConfig;
use crate::env::Environment;
use crate::loader::{self, DynamicLoader};
use crate::registry::ModuleRegistry;

/// Registry, environment and loader of one host process.
///
/// Nested resolutions (dependencies and `require` lines in startup scripts)
/// share the same context, so everything they record is immediately visible
/// to the caller.
#[derive(Debug)]
pub struct ResolverContext {
    pub registry: ModuleRegistry,
    pub env: Environment,
    pub config: ResolverConfig,
    loader: Box<dyn DynamicLoader>,
    resolving: Vec<String>,
    initial_templates: Option<String>,
}

impl ResolverContext {
    pub fn new(env: Environment, config: ResolverConfig, loader: Box<dyn DynamicLoader>) -> Self {
        let initial_templates = env.get(&config.templates_var).map(str::to_string);
        Self {
            registry: ModuleRegistry::new(),
            env,
            config,
            loader,
            resolving: Vec::new(),
            initial_templates,
        }
    }

    /// Context for the running process with its native loader.
    pub fn native(env: Environment) -> Self {
        let config = ResolverConfig::from_env(&env);
        Self::new(env, config, loader::native())
    }

    pub fn loader(&self) -> &dyn DynamicLoader {
        self.loader.as_ref()
    }

    pub fn loader_mut(&mut self) -> &mut dyn DynamicLoader {
        self.loader.as_mut()
    }

    /// Template directory setting from before any module was resolved.
    pub fn initial_templates(&self) -> Option<&str> {
        self.initial_templates.as_deref()
    }

    /// Modules whose resolution is in progress, outermost first.
    pub fn resolving(&self) -> &[String] {
        &self.resolving
    }

    pub(crate) fn begin_resolving(&mut self, module: &str) {
        self.resolving.push(module.to_string());
    }

    pub(crate) fn end_resolving(&mut self, module: &str) {
        if let Some(pos) = self.resolving.iter().rposition(|m| m == module) {
            self.resolving.remove(pos);
        }
    }
}
