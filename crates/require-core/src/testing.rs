//! Test doubles shared by unit tests.

use crate::config::ResolverConfig;
use crate::context::ResolverContext;
use crate::env::Environment;
use crate::error::ResolveError;
use crate::host::{Host, HostPhase};
use crate::loader::{DynamicLoader, LibraryHandle, LoadError, SymbolAddress};
use require_schema::{Platform, Target, version_marker_symbol};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub(crate) type LoadLog = Rc<RefCell<Vec<PathBuf>>>;

/// Loader reading `symbol=value` lines from the "binary".
///
/// A file containing `unresolved` fails with unresolved symbols and one
/// containing `reject` is refused. Marker addresses index `strings`.
#[derive(Debug, Default)]
pub(crate) struct MockLoader {
    strings: Vec<String>,
    libraries: Vec<HashMap<String, SymbolAddress>>,
    resident: HashMap<String, SymbolAddress>,
    loads: LoadLog,
}

impl MockLoader {
    pub(crate) fn new(loads: LoadLog) -> Self {
        Self {
            loads,
            ..Self::default()
        }
    }

    pub(crate) fn with_resident(mut self, module: &str, version: &str) -> Self {
        let address = self.intern(version);
        self.resident.insert(version_marker_symbol(module), address);
        self
    }

    fn intern(&mut self, value: &str) -> SymbolAddress {
        self.strings.push(value.to_string());
        SymbolAddress::from_raw(self.strings.len())
    }
}

impl DynamicLoader for MockLoader {
    fn load(&mut self, path: &Path) -> Result<LibraryHandle, LoadError> {
        let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match text.trim() {
            "unresolved" => {
                return Err(LoadError::UnresolvedSymbol {
                    path: path.to_path_buf(),
                    message: "undefined symbol: missing".into(),
                });
            }
            "reject" => {
                return Err(LoadError::Rejected {
                    path: path.to_path_buf(),
                    message: "invalid ELF header".into(),
                });
            }
            _ => {}
        }

        let mut exports = HashMap::new();
        for line in text.lines() {
            if let Some((name, value)) = line.split_once('=') {
                let address = self.intern(value);
                exports.insert(name.to_string(), address);
            }
        }
        self.libraries.push(exports);
        self.loads.borrow_mut().push(path.to_path_buf());
        Ok(LibraryHandle::from_raw(self.libraries.len() - 1))
    }

    fn resolve_symbol(&self, handle: LibraryHandle, name: &str) -> Option<SymbolAddress> {
        self.libraries.get(handle.as_raw())?.get(name).copied()
    }

    fn probe_global(&self, name: &str) -> Option<SymbolAddress> {
        self.resident
            .get(name)
            .or_else(|| self.libraries.iter().find_map(|l| l.get(name)))
            .copied()
    }

    fn read_marker(&self, address: SymbolAddress) -> Option<String> {
        self.strings.get(address.as_raw().checked_sub(1)?).cloned()
    }
}

/// Host recording everything the resolver and scripts ask of it.
///
/// Understands `fail ...` (errors), `setenv NAME VALUE` and
/// `require MODULE [VERSION [ARGS]]`; every other line is only recorded.
#[derive(Debug, Default)]
pub(crate) struct RecordingHost {
    pub dispatched: Vec<String>,
    pub echoed: Vec<String>,
    pub data_files: Vec<PathBuf>,
    pub phase: HostPhase,
    pub aborted: Vec<String>,
}

impl Host for RecordingHost {
    fn dispatch(&mut self, ctx: &mut ResolverContext, line: &str) -> anyhow::Result<()> {
        self.dispatched.push(line.to_string());
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["fail", ..] => anyhow::bail!("command failed"),
            ["setenv", name, value] => ctx.env.set(*name, *value),
            ["require", module, rest @ ..] => {
                let (version, args) = (rest.first().copied(), rest.get(1).copied());
                crate::resolver::require(ctx, self, module, version, args)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn load_data_file(&mut self, _ctx: &mut ResolverContext, path: &Path) -> anyhow::Result<()> {
        self.data_files.push(path.to_path_buf());
        if fs::read_to_string(path)?.trim() == "bad" {
            anyhow::bail!("syntax error in {}", path.display());
        }
        Ok(())
    }

    fn phase(&self) -> HostPhase {
        self.phase
    }

    fn abort_startup(&mut self, error: &ResolveError) {
        self.aborted.push(error.to_string());
    }

    fn echo(&mut self, line: &str) {
        self.echoed.push(line.to_string());
    }
}

pub(crate) fn test_target() -> Target {
    Target::new("linux-x86_64", "Linux", "3.14.12", Platform::Posix)
}

fn test_env(search_dir: &Path) -> Environment {
    let mut env = Environment::with_separator(':');
    env.set(
        crate::config::SEARCH_PATH_VAR,
        search_dir.to_string_lossy().into_owned(),
    );
    env
}

/// Context searching `search_dir` with a [`MockLoader`], and the loader's
/// log of loaded files.
pub(crate) fn mock_context(search_dir: &Path) -> (ResolverContext, LoadLog) {
    let loads = LoadLog::default();
    let loader = MockLoader::new(loads.clone());
    let ctx = ResolverContext::new(
        test_env(search_dir),
        ResolverConfig::with_target(test_target()),
        Box::new(loader),
    );
    (ctx, loads)
}

/// Like [`mock_context`], with `module` linked into the host at `version`.
pub(crate) fn resident_context(search_dir: &Path, module: &str, version: &str) -> ResolverContext {
    let loader = MockLoader::default().with_resident(module, version);
    ResolverContext::new(
        test_env(search_dir),
        ResolverConfig::with_target(test_target()),
        Box::new(loader),
    )
}

pub(crate) fn test_context(search_dir: &Path) -> ResolverContext {
    mock_context(search_dir).0
}

/// Install a new-style build of `module` under `root` whose binary exports
/// `marker` as its version. Returns the module root.
pub(crate) fn install_module(root: &Path, module: &str, version: &str, marker: &str) -> PathBuf {
    let target = test_target();
    let location = root.join(module).join(version).join(target.release_dir());
    let lib_dir = location.join("lib").join(&target.arch);
    fs::create_dir_all(&lib_dir).unwrap();
    fs::write(
        lib_dir.join(target.library_file_name(module)),
        format!("{}={marker}\n", version_marker_symbol(module)),
    )
    .unwrap();
    location
}
