//! Module resolution: find, load, register and initialise a module.
//!
//! A request goes through these steps, any of which may fail and end the
//! resolution:
//!
//! 1. An already registered module is only checked for version
//!    compatibility, then its paths are set up again and, if arguments were
//!    given, its startup script runs again.
//! 2. A module linked into the host (its version marker is already
//!    visible) is registered without a location.
//! 3. Otherwise the search path is searched for the best build, its
//!    dependency manifest is resolved, the binary is loaded and its version
//!    marker re-validated against the request, and the module is
//!    registered.
//! 4. The data file is loaded and the host's registration routine run.
//! 5. Template paths are exported and the startup script is run.
//!
//! A failed dependency is returned unchanged. Requiring a module again while
//! its own resolution is in progress fails with
//! [`ResolveError::CycleDetected`].

use crate::context::ResolverContext;
use crate::deps::read_manifest;
use crate::error::ResolveError;
use crate::host::{Host, HostPhase};
use crate::layout::{self, Candidate, SearchOutcome};
use crate::registry::ModuleRecord;
use crate::script::run_script;
use require_schema::{VersionSpec, compare_versions, version_marker_symbol};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Resolve `module` at `version` and run its startup script with `args`.
///
/// `version` may be a literal version, a minimum version ending in `+`,
/// `ifexists`, `none` or absent. When `version` contains `=` it is taken as
/// the arguments and `args` as the version.
pub fn require(
    ctx: &mut ResolverContext,
    host: &mut dyn Host,
    module: &str,
    version: Option<&str>,
    args: Option<&str>,
) -> Result<(), ResolveError> {
    let (version, args) = match (version, args) {
        (Some(v), other) if v.contains('=') => (other, Some(v)),
        pair => pair,
    };
    let args = args.filter(|a| !a.trim().is_empty());
    let spec = VersionSpec::parse(version);
    if spec == VersionSpec::Skip {
        debug!("{module}: skipped");
        return Ok(());
    }

    if let Some(record) = ctx.registry.find(module).cloned() {
        return already_loaded(ctx, host, &record, &spec, args);
    }

    if ctx.resolving().iter().any(|m| m == module) {
        let mut chain = ctx.resolving().to_vec();
        chain.push(module.to_string());
        return Err(ResolveError::CycleDetected { chain });
    }

    if let Some(version) = resident_version(ctx, module) {
        info!("{module} {version} is linked into the host");
        let record = ModuleRecord::new(module, version, None);
        ctx.registry
            .register(record.clone(), &mut ctx.env, &ctx.config.script_path_var);
        return already_loaded(ctx, host, &record, &spec, args);
    }

    ctx.begin_resolving(module);
    let result = resolve_from_disk(ctx, host, module, &spec, args);
    ctx.end_resolving(module);
    result
}

/// [`require`] with the host's failure policy applied: a failure while the
/// host is still initializing aborts startup.
pub fn require_command(
    ctx: &mut ResolverContext,
    host: &mut dyn Host,
    module: &str,
    version: Option<&str>,
    args: Option<&str>,
) -> Result<(), ResolveError> {
    let result = require(ctx, host, module, version, args);
    if let Err(e) = &result {
        error!("require {module}: {e}");
        if host.phase() == HostPhase::Initializing {
            host.abort_startup(e);
        }
    }
    result
}

fn already_loaded(
    ctx: &mut ResolverContext,
    host: &mut dyn Host,
    record: &ModuleRecord,
    spec: &VersionSpec,
    args: Option<&str>,
) -> Result<(), ResolveError> {
    let matched = compare_versions(&record.version, spec.as_request());
    if !matched.is_acceptable() {
        return Err(ResolveError::VersionConflict {
            module: record.name.clone(),
            requested: spec.to_string(),
            loaded: record.version.clone(),
        });
    }
    if matched.needs_warning() {
        warn!(
            "{} {} already loaded ({matched}, requested {spec})",
            record.name, record.version
        );
    } else {
        debug!("{} {} already loaded", record.name, record.version);
    }

    let Some(location) = &record.location else {
        return Ok(());
    };
    setup_paths(ctx, &record.name, location);
    if args.is_some() {
        run_startup_script(ctx, host, &record.name, location, args)?;
    }
    Ok(())
}

fn resident_version(ctx: &ResolverContext, module: &str) -> Option<String> {
    let loader = ctx.loader();
    let address = loader.probe_global(&version_marker_symbol(module))?;
    loader.read_marker(address)
}

fn resolve_from_disk(
    ctx: &mut ResolverContext,
    host: &mut dyn Host,
    module: &str,
    spec: &VersionSpec,
    args: Option<&str>,
) -> Result<(), ResolveError> {
    let search_path = ctx.config.search_path(&ctx.env);
    let request = spec.as_request();
    let candidate = match layout::search(&ctx.config.target, module, request, &search_path) {
        SearchOutcome::Found(candidate) => candidate,
        SearchOutcome::NotFound | SearchOutcome::NotForTarget { .. }
            if *spec == VersionSpec::IfExists =>
        {
            debug!("{module}: not available, skipped");
            return Ok(());
        }
        SearchOutcome::NotFound => {
            return Err(ResolveError::NotFound {
                module: module.to_string(),
                search_path,
            });
        }
        SearchOutcome::VersionUnavailable { available } => {
            return Err(ResolveError::VersionUnavailable {
                module: module.to_string(),
                requested: spec.to_string(),
                available,
            });
        }
        SearchOutcome::NotForTarget { versions } => {
            return Err(ResolveError::NotForTarget {
                module: module.to_string(),
                requested: spec.to_string(),
                arch: ctx.config.target.arch.clone(),
                versions,
            });
        }
    };
    if candidate.matched.needs_warning() {
        warn!(
            "{module}: using {} ({}, requested {spec})",
            candidate.version, candidate.matched
        );
    }

    resolve_dependencies(ctx, host, module, &candidate.dependency_manifest)?;
    let version = load_binary(ctx, module, spec, &candidate)?;

    let location =
        std::path::absolute(&candidate.location).unwrap_or_else(|_| candidate.location.clone());
    info!("{module} {version} loaded from {}", location.display());
    let record = ModuleRecord::new(module, version, Some(location.clone()));
    ctx.registry
        .register(record, &mut ctx.env, &ctx.config.script_path_var);

    load_data_file(ctx, host, module, &candidate)?;
    setup_paths(ctx, module, &location);
    run_startup_script(ctx, host, module, &location, args)
}

fn resolve_dependencies(
    ctx: &mut ResolverContext,
    host: &mut dyn Host,
    module: &str,
    manifest: &Path,
) -> Result<(), ResolveError> {
    let dependencies = read_manifest(manifest).map_err(|source| ResolveError::Manifest {
        path: manifest.to_path_buf(),
        source,
    })?;
    for dependency in dependencies {
        debug!(
            "{module} depends on {} {}",
            dependency.module,
            dependency.version.as_deref().unwrap_or("")
        );
        require(ctx, host, &dependency.module, dependency.version.as_deref(), None)
            .inspect_err(|e| error!("{module}: dependency {} failed: {e}", dependency.module))?;
    }
    Ok(())
}

/// Load the binary and return its authoritative version.
fn load_binary(
    ctx: &mut ResolverContext,
    module: &str,
    spec: &VersionSpec,
    candidate: &Candidate,
) -> Result<String, ResolveError> {
    debug!("loading {}", candidate.library.display());
    let handle = ctx
        .loader_mut()
        .load(&candidate.library)
        .map_err(|source| ResolveError::LoadFailure {
            module: module.to_string(),
            source,
        })?;

    let symbol = version_marker_symbol(module);
    let loader = ctx.loader();
    let marker = loader
        .resolve_symbol(handle, &symbol)
        .or_else(|| loader.probe_global(&symbol))
        .and_then(|address| loader.read_marker(address));
    let version = match marker {
        Some(version) => version,
        None => {
            warn!(
                "{} exports no {symbol}, assuming version {}",
                candidate.library.display(),
                candidate.version
            );
            candidate.version.clone()
        }
    };

    let matched = compare_versions(&version, spec.as_request());
    if !matched.is_acceptable() {
        return Err(ResolveError::MarkerMismatch {
            module: module.to_string(),
            path: candidate.library.clone(),
            requested: spec.to_string(),
            found: version,
        });
    }
    if version != candidate.version {
        debug!("{module}: directory {} holds version {version}", candidate.version);
    }
    Ok(version)
}

/// Name of the host routine run after a module's data file is loaded.
///
/// ```
/// use require_core::resolver::registration_routine;
///
/// assert_eq!(registration_routine("s7-plc"), "s7_plc_registerRecordDeviceDriver");
/// ```
pub fn registration_routine(module: &str) -> String {
    let name: String = module
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("{name}_registerRecordDeviceDriver")
}

fn load_data_file(
    ctx: &mut ResolverContext,
    host: &mut dyn Host,
    module: &str,
    candidate: &Candidate,
) -> Result<(), ResolveError> {
    let Some(path) = candidate.data_file(module) else {
        debug!("{module}: no data file");
        return Ok(());
    };
    info!("loading {}", path.display());
    host.load_data_file(ctx, &path)
        .map_err(|e| ResolveError::DataFileLoadFailure {
            module: module.to_string(),
            path: path.clone(),
            source: e.into(),
        })?;

    let routine = registration_routine(module);
    host.dispatch(ctx, &format!("{routine} pdbbase"))
        .map_err(|e| ResolveError::Registration {
            module: module.to_string(),
            routine,
            source: e.into(),
        })
}

fn setup_paths(ctx: &mut ResolverContext, module: &str, location: &Path) {
    let templates_var = ctx.config.templates_var.clone();
    match layout::template_dir(location) {
        Some(dir) => {
            let dir = dir.to_string_lossy().into_owned();
            debug!("{module}: templates in {dir}");
            ctx.env.set(format!("{module}_DB"), dir.as_str());
            ctx.env.set(format!("{module}_TEMPLATES"), dir.as_str());
            ctx.env.set(templates_var, dir.as_str());
            ctx.env.prepend_path(&ctx.config.db_include_path_var, &dir);
        }
        None => match ctx.initial_templates().map(str::to_string) {
            Some(initial) => ctx.env.set(templates_var, initial),
            None => {
                ctx.env.unset(&templates_var);
            }
        },
    }
}

fn run_startup_script(
    ctx: &mut ResolverContext,
    host: &mut dyn Host,
    module: &str,
    location: &Path,
    args: Option<&str>,
) -> Result<(), ResolveError> {
    let Some(script) = layout::startup_script(&ctx.config.target, location) else {
        return Ok(());
    };
    info!("{module}: running {}", script.display());
    run_script(ctx, host, &script, args).map_err(|e| ResolveError::ScriptFailure {
        module: module.to_string(),
        source: Box::new(e),
    })
}
