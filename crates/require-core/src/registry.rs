//! Registry of resolved modules.
//!
//! Append-only: once a name is registered it stays for the lifetime of the
//! context, and re-requesting it is a version check rather than an insert.

use crate::env::Environment;
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A module resolved in this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleRecord {
    pub name: String,
    /// Authoritative version; empty when the build carries none.
    pub version: String,
    /// Absolute install directory. `None` for modules linked into the host.
    pub location: Option<PathBuf>,
}

impl ModuleRecord {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        location: Option<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            location,
        }
    }
}

/// Ordered list of resolved modules.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct ModuleRegistry {
    modules: Vec<ModuleRecord>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `record` and export its environment variables.
    ///
    /// Sets `MODULE`, `<name>_VERSION` and, for modules with a location,
    /// `<name>_DIR`, prepending the location to `script_path_var`.
    pub fn register(
        &mut self,
        record: ModuleRecord,
        env: &mut Environment,
        script_path_var: &str,
    ) -> &ModuleRecord {
        if let Some(existing) = self.modules.iter().position(|m| m.name == record.name) {
            tracing::warn!(
                "{} already registered, keeping version {}",
                record.name,
                self.modules[existing].version
            );
            return &self.modules[existing];
        }

        env.set("MODULE", record.name.as_str());
        env.set(format!("{}_VERSION", record.name), record.version.as_str());
        if let Some(location) = &record.location {
            let dir = location.to_string_lossy();
            env.set(format!("{}_DIR", record.name), dir.to_string());
            env.prepend_path(script_path_var, &dir);
        }

        tracing::debug!("registered {} {}", record.name, record.version);
        self.modules.push(record);
        let last = self.modules.len() - 1;
        &self.modules[last]
    }

    /// First record named `name`.
    pub fn find(&self, name: &str) -> Option<&ModuleRecord> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Version of a loaded module.
    pub fn version_of(&self, name: &str) -> Option<&str> {
        self.find(name).map(|m| m.version.as_str())
    }

    /// Install directory of a loaded module.
    pub fn location_of(&self, name: &str) -> Option<&Path> {
        self.find(name).and_then(|m| m.location.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Print one aligned line per module in load order.
    pub fn write_table<W: Write>(&self, out: &mut W, show_location: bool) -> io::Result<()> {
        let name_width = self.modules.iter().map(|m| m.name.len()).max().unwrap_or(0);
        let version_width = self.modules.iter().map(|m| m.version.len()).max().unwrap_or(0);

        for module in &self.modules {
            let version = if module.version.is_empty() {
                "-"
            } else {
                module.version.as_str()
            };
            if show_location {
                let location = module
                    .location
                    .as_ref()
                    .map_or_else(|| "(resident)".to_string(), |l| l.display().to_string());
                writeln!(
                    out,
                    "{:<name_width$} {version:<version_width$} {location}",
                    module.name
                )?;
            } else {
                writeln!(out, "{:<name_width$} {version}", module.name)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::with_separator(':')
    }

    #[test]
    fn test_register_exports_variables() {
        let mut env = env();
        let mut registry = ModuleRegistry::new();
        registry.register(
            ModuleRecord::new("asyn", "4.21", Some(PathBuf::from("/m/asyn/4.21/R3.14.12"))),
            &mut env,
            "SCRIPT_PATH",
        );

        assert_eq!(env.get("MODULE"), Some("asyn"));
        assert_eq!(env.get("asyn_VERSION"), Some("4.21"));
        assert_eq!(env.get("asyn_DIR"), Some("/m/asyn/4.21/R3.14.12"));
        assert_eq!(env.get("SCRIPT_PATH"), Some(".:/m/asyn/4.21/R3.14.12"));
    }

    #[test]
    fn test_first_registration_wins() {
        let mut env = env();
        let mut registry = ModuleRegistry::new();
        registry.register(ModuleRecord::new("bar", "2.0", None), &mut env, "SCRIPT_PATH");
        let kept = registry.register(ModuleRecord::new("bar", "1.9", None), &mut env, "SCRIPT_PATH");

        assert_eq!(kept.version, "2.0");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.version_of("bar"), Some("2.0"));
        assert_eq!(env.get("bar_VERSION"), Some("2.0"));
    }

    #[test]
    fn test_resident_module_has_no_location() {
        let mut env = env();
        let mut registry = ModuleRegistry::new();
        registry.register(ModuleRecord::new("base", "3.14.12", None), &mut env, "SCRIPT_PATH");

        assert_eq!(registry.location_of("base"), None);
        assert_eq!(env.get("base_DIR"), None);
        assert_eq!(env.get("SCRIPT_PATH"), None);
    }

    #[test]
    fn test_write_table() {
        let mut env = env();
        let mut registry = ModuleRegistry::new();
        let asyn = ModuleRecord::new("asyn", "4.21", Some(PathBuf::from("/m/asyn")));
        registry.register(asyn, &mut env, "SCRIPT_PATH");
        registry.register(ModuleRecord::new("s7", "", None), &mut env, "SCRIPT_PATH");

        let mut out = Vec::new();
        registry.write_table(&mut out, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "asyn 4.21\ns7   -\n");

        let mut out = Vec::new();
        registry.write_table(&mut out, true).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "asyn 4.21 /m/asyn\ns7   -    (resident)\n"
        );
    }
}
