//! Shell commands and the host side of the resolver.

use anyhow::{Context, bail};
use require_core::expr::replace_expressions;
use require_core::macros::MacroScope;
use require_core::{
    Host, HostPhase, ResolveError, ResolverContext, probe, require_command, run_script,
};
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PROMPT: &str = "reqsh> ";
const REGISTRATION_SUFFIX: &str = "_registerRecordDeviceDriver";

/// Host that runs shell commands and writes their output to `out`.
#[derive(Debug)]
pub struct ShellHost<W: Write = io::Stdout> {
    out: W,
    phase: HostPhase,
    data_files: Vec<PathBuf>,
}

impl ShellHost<io::Stdout> {
    /// Host writing to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ShellHost<W> {
    /// Host in the initializing phase writing to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out,
            phase: HostPhase::Initializing,
            data_files: Vec::new(),
        }
    }

    /// Where command output and echoed lines go.
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Data files loaded so far, in load order.
    pub fn data_files(&self) -> &[PathBuf] {
        &self.data_files
    }

    fn libversion_show(&mut self, ctx: &ResolverContext, flags: &[&str]) -> anyhow::Result<()> {
        let mut show_location = false;
        let mut json = false;
        let mut file = None;
        for flag in flags {
            match *flag {
                "-l" => show_location = true,
                "-json" => json = true,
                other => file = Some(other),
            }
        }

        let mut out: Box<dyn Write + '_> = match file {
            Some(path) => {
                Box::new(File::create(path).with_context(|| format!("cannot create {path}"))?)
            }
            None => Box::new(&mut self.out),
        };
        if json {
            serde_json::to_writer_pretty(&mut out, &ctx.registry)?;
            writeln!(out)?;
        } else {
            ctx.registry.write_table(&mut out, show_location)?;
        }
        Ok(())
    }
}

impl<W: Write> Host for ShellHost<W> {
    fn dispatch(&mut self, ctx: &mut ResolverContext, line: &str) -> anyhow::Result<()> {
        let words = tokenize(line);
        let Some((command, args)) = words.split_first() else {
            return Ok(());
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        match (command.as_str(), args.as_slice()) {
            ("require", [module, rest @ ..]) => {
                let (version, macros) = (rest.first().copied(), rest.get(1).copied());
                require_command(ctx, self, module, version, macros)?;
            }
            ("runScript", [name, rest @ ..]) => {
                let path = locate_script(ctx, name);
                run_script(ctx, self, &path, rest.first().copied())?;
            }
            ("libversionShow", flags) => self.libversion_show(ctx, flags)?,
            ("getLibVersion", [module]) => {
                writeln!(self.out, "{}", ctx.registry.version_of(module).unwrap_or(""))?;
            }
            ("getLibLocation", [module]) => {
                let location = ctx.registry.location_of(module).map(|l| l.display().to_string());
                writeln!(self.out, "{}", location.unwrap_or_default())?;
            }
            ("epicsEnvSet", [name, value]) => ctx.env.set(*name, *value),
            ("epicsEnvShow", []) => {
                for (name, value) in ctx.env.iter() {
                    writeln!(self.out, "{name}={value}")?;
                }
            }
            ("epicsEnvShow", [name]) => match ctx.env.get(name) {
                Some(value) => writeln!(self.out, "{name}={value}")?,
                None => writeln!(self.out, "{name} is not an environment variable.")?,
            },
            ("echo", words) => writeln!(self.out, "{}", words.join(" "))?,
            ("calc", words) => writeln!(self.out, "{}", replace_expressions(&words.join(" ")))?,
            ("iocInit", []) => {
                self.phase = HostPhase::Running;
                info!("initialization complete, {} modules loaded", ctx.registry.len());
            }
            ("exit", []) => {
                self.out.flush()?;
                std::process::exit(0);
            }
            (routine, [_]) if routine.ends_with(REGISTRATION_SUFFIX) => {
                debug!("registered {}", routine.trim_end_matches(REGISTRATION_SUFFIX));
            }
            (command, _) => bail!("unknown command or wrong arguments: {command}"),
        }
        Ok(())
    }

    fn load_data_file(&mut self, _ctx: &mut ResolverContext, path: &Path) -> anyhow::Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        debug!("{}: {} lines", path.display(), text.lines().count());
        self.data_files.push(path.to_path_buf());
        Ok(())
    }

    fn phase(&self) -> HostPhase {
        self.phase
    }

    fn abort_startup(&mut self, error: &ResolveError) {
        let _ = self.out.flush();
        eprintln!("reqsh: startup aborted: {error}");
        std::process::exit(1);
    }

    fn echo(&mut self, line: &str) {
        let _ = writeln!(self.out, "{line}");
    }
}

/// Split a command line into words.
///
/// Words are separated by whitespace, commas and parentheses, so both
/// `require foo 1.0` and `require("foo", "1.0")` give the same words.
/// Quotes group, a backslash escapes the next character.
///
/// ```
/// use require_cli::shell::tokenize;
///
/// assert_eq!(tokenize("epicsEnvSet(\"A\", \"x y\")"), vec!["epicsEnvSet", "A", "x y"]);
/// ```
pub fn tokenize(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut quote = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (_, '\\') => {
                if let Some(escaped) = chars.next() {
                    word.push(escaped);
                }
                in_word = true;
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => word.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() || matches!(c, ',' | '(' | ')') => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            (None, c) => {
                word.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(word);
    }
    words
}

/// `name` as given if it exists, otherwise the first match in the script
/// search list.
pub fn locate_script(ctx: &ResolverContext, name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() || probe::exists(path) {
        return path.to_path_buf();
    }
    probe::first_file(
        ctx.env
            .path_list(&ctx.config.script_path_var)
            .into_iter()
            .map(|dir| Path::new(&dir).join(name)),
    )
    .unwrap_or_else(|| path.to_path_buf())
}

/// Read commands from `input` until it ends.
///
/// Lines are expanded against the environment before dispatch. A failing
/// command is reported and the next line is read.
pub fn interact<R: BufRead, W: Write>(
    ctx: &mut ResolverContext,
    host: &mut ShellHost<W>,
    input: R,
    prompt: bool,
) -> anyhow::Result<()> {
    let mut lines = input.lines();
    loop {
        if prompt {
            print!("{PROMPT}");
            io::stdout().flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;

        let mut scope = MacroScope::new();
        scope.define_all(ctx.env.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        let expanded = scope.expand(&line);
        let text = expanded.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        if let Err(e) = host.dispatch(ctx, text) {
            eprintln!("{text}: {e:#}");
        }
    }
    Ok(())
}
