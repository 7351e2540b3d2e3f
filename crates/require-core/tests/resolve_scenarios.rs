//! Integration tests for end-to-end resolution scenarios.

use require_core::loader::{DynamicLoader, LibraryHandle, LoadError, SymbolAddress};
use require_core::{
    Environment, Host, HostPhase, ResolveError, ResolverConfig, ResolverContext, require,
};
use require_schema::{Platform, Target};
use std::cell::RefCell;
use std::collections::HashMap;
use std::error::Error as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

/// Loader whose binaries are text files of `symbol=value` lines.
#[derive(Debug, Default)]
struct FakeLoader {
    strings: Vec<String>,
    libraries: Vec<HashMap<String, SymbolAddress>>,
    loaded: Rc<RefCell<Vec<PathBuf>>>,
}

impl DynamicLoader for FakeLoader {
    fn load(&mut self, path: &Path) -> Result<LibraryHandle, LoadError> {
        let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut exports = HashMap::new();
        for (name, value) in text.lines().filter_map(|l| l.split_once('=')) {
            self.strings.push(value.to_string());
            exports.insert(name.to_string(), SymbolAddress::from_raw(self.strings.len()));
        }
        self.libraries.push(exports);
        self.loaded.borrow_mut().push(path.to_path_buf());
        Ok(LibraryHandle::from_raw(self.libraries.len() - 1))
    }

    fn resolve_symbol(&self, handle: LibraryHandle, name: &str) -> Option<SymbolAddress> {
        self.libraries.get(handle.as_raw())?.get(name).copied()
    }

    fn probe_global(&self, name: &str) -> Option<SymbolAddress> {
        self.libraries.iter().find_map(|l| l.get(name)).copied()
    }

    fn read_marker(&self, address: SymbolAddress) -> Option<String> {
        self.strings.get(address.as_raw().checked_sub(1)?).cloned()
    }
}

#[derive(Debug, Default)]
struct ScriptHost {
    commands: Vec<String>,
}

impl Host for ScriptHost {
    fn dispatch(&mut self, ctx: &mut ResolverContext, line: &str) -> anyhow::Result<()> {
        self.commands.push(line.to_string());
        let words: Vec<&str> = line.split_whitespace().collect();
        if let ["require", module, rest @ ..] = words.as_slice() {
            require(ctx, self, module, rest.first().copied(), None)?;
        }
        Ok(())
    }

    fn load_data_file(&mut self, _ctx: &mut ResolverContext, _path: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    fn phase(&self) -> HostPhase {
        HostPhase::Running
    }

    fn abort_startup(&mut self, _error: &ResolveError) {}

    fn echo(&mut self, _line: &str) {}
}

struct TestContext {
    dir: TempDir,
    ctx: ResolverContext,
    host: ScriptHost,
    loaded: Rc<RefCell<Vec<PathBuf>>>,
}

impl TestContext {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let mut env = Environment::with_separator(':');
        env.set("EPICS_DRIVER_PATH", dir.path().to_string_lossy().into_owned());
        let target = Target::new("linux-x86_64", "Linux", "3.14.12", Platform::Posix);
        let loader = FakeLoader::default();
        let loaded = loader.loaded.clone();
        let ctx = ResolverContext::new(env, ResolverConfig::with_target(target), Box::new(loader));
        Self {
            dir,
            ctx,
            host: ScriptHost::default(),
            loaded,
        }
    }

    /// Install `module` under directory `version` with marker `marker`.
    fn install(&self, module: &str, version: &str, marker: &str) -> PathBuf {
        let location = self.dir.path().join(module).join(version).join("R3.14.12");
        let lib = location.join("lib/linux-x86_64");
        fs::create_dir_all(&lib).expect("failed to create lib dir");
        fs::write(
            lib.join(format!("lib{module}.so")),
            format!("{module}LibRelease={marker}\n"),
        )
        .expect("failed to write library");
        location
    }

    fn depends(&self, location: &Path, module: &str, manifest: &str) {
        fs::write(location.join(format!("lib/linux-x86_64/{module}.dep")), manifest)
            .expect("failed to write manifest");
    }

    fn require(&mut self, module: &str, version: Option<&str>) -> Result<(), ResolveError> {
        require(&mut self.ctx, &mut self.host, module, version, None)
    }

    fn loaded_count(&self) -> usize {
        self.loaded.borrow().len()
    }
}

#[test]
fn test_second_request_does_not_touch_disk() {
    let mut t = TestContext::new();
    t.install("foo", "1.0", "1.0");

    t.require("foo", Some("1.0")).unwrap();
    fs::remove_dir_all(t.dir.path().join("foo")).unwrap();
    t.require("foo", Some("1.0")).unwrap();
    t.require("foo", None).unwrap();

    assert_eq!(t.loaded_count(), 1);
    assert_eq!(t.ctx.registry.len(), 1);
}

#[test]
fn test_conflicting_version_keeps_first() {
    let mut t = TestContext::new();
    t.install("bar", "2.0", "2.0");
    t.install("bar", "1.9", "1.9");

    t.require("bar", Some("2.0")).unwrap();
    let err = t.require("bar", Some("1.9")).unwrap_err();

    assert!(matches!(err, ResolveError::VersionConflict { .. }));
    assert_eq!(t.ctx.registry.version_of("bar"), Some("2.0"));
    assert_eq!(t.ctx.env.get("bar_VERSION"), Some("2.0"));
}

#[test]
fn test_failed_dependency_stops_before_loading() {
    let mut t = TestContext::new();
    let app = t.install("app", "1.0", "1.0");
    t.depends(&app, "app", "# needs baz\nbaz 1.0\n");
    t.install("baz", "0.9", "0.9");

    let err = t.require("app", None).unwrap_err();

    match err {
        ResolveError::VersionUnavailable { module, available, .. } => {
            assert_eq!(module, "baz");
            assert_eq!(available, vec!["0.9"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(t.loaded_count(), 0);
    assert!(t.ctx.registry.is_empty());
}

#[test]
fn test_dependencies_load_first() {
    let mut t = TestContext::new();
    let app = t.install("app", "1.0", "1.0");
    t.depends(&app, "app", "baz 1.0\n");
    t.install("baz", "1.3", "1.3");

    t.require("app", None).unwrap();

    let names: Vec<&str> = t.ctx.registry.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["baz", "app"]);
    assert_eq!(t.ctx.env.get("MODULE"), Some("app"));
}

#[test]
fn test_marker_decides_version() {
    let mut t = TestContext::new();
    t.install("foo", "1.2.5", "1.2.7");

    t.require("foo", Some("1.2+")).unwrap();

    assert_eq!(t.ctx.registry.version_of("foo"), Some("1.2.7"));
    assert_eq!(t.ctx.env.get("foo_VERSION"), Some("1.2.7"));
}

#[test]
fn test_mismatching_marker_fails() {
    let mut t = TestContext::new();
    t.install("foo", "1.2.5", "2.0.0");

    let err = t.require("foo", Some("1.2+")).unwrap_err();

    assert!(matches!(err, ResolveError::MarkerMismatch { ref found, .. } if found == "2.0.0"));
    assert!(t.ctx.registry.is_empty());
}

#[test]
fn test_cycle_through_startup_script() {
    let mut t = TestContext::new();
    let a = t.install("a", "1.0", "1.0");
    t.depends(&a, "a", "b\n");
    let b = t.install("b", "1.0", "1.0");
    fs::write(b.join("startup.cmd"), "require a\n").unwrap();

    let err = t.require("a", None).unwrap_err();

    let ResolveError::ScriptFailure { module, .. } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(module, "b");
    let mut source = err.source();
    let mut cycle = false;
    while let Some(e) = source {
        cycle |= e.to_string().contains("dependency cycle: a -> b -> a");
        source = e.source();
    }
    assert!(cycle, "cycle not reported: {err}");
}

#[test]
fn test_script_path_order() {
    let mut t = TestContext::new();
    let first = t.install("first", "1.0", "1.0");
    let second = t.install("second", "1.0", "1.0");

    t.require("first", None).unwrap();
    t.require("second", None).unwrap();
    assert_eq!(
        t.ctx.env.get("SCRIPT_PATH"),
        Some(format!(".:{}:{}", second.display(), first.display()).as_str())
    );
}

#[test]
fn test_script_requires_more_modules() {
    let mut t = TestContext::new();
    let ioc = t.install("ioc", "1.0", "1.0");
    t.install("motor", "6.9", "6.9");
    fs::write(ioc.join("startup.cmd"), "require motor 6.9\necho $(motor_VERSION)\n").unwrap();

    t.require("ioc", None).unwrap();

    assert_eq!(t.host.commands, vec!["require motor 6.9", "echo 6.9"]);
    assert_eq!(t.ctx.registry.version_of("motor"), Some("6.9"));
}
