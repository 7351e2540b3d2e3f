//! reqsh - require host shell

use anyhow::Result;
use clap::Parser;
use std::io::{self, IsTerminal};
use tracing_subscriber::EnvFilter;

use require_cli::{Cli, ShellHost, shell};
use require_core::config::{ARCH_VAR, RELEASE_VAR, SEARCH_PATH_VAR};
use require_core::{Environment, ResolverContext, run_script};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Script echo goes to stdout, logs to stderr
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut env = Environment::from_process();
    if let Some(path) = &cli.path {
        env.set(SEARCH_PATH_VAR, path.as_str());
    }
    if let Some(arch) = &cli.arch {
        env.set(ARCH_VAR, arch.as_str());
    }
    if let Some(release) = &cli.release {
        env.set(RELEASE_VAR, release.as_str());
    }

    let mut ctx = ResolverContext::native(env);
    let mut host = ShellHost::stdout();
    tracing::debug!(
        "target {} for release {}",
        ctx.config.target.arch,
        ctx.config.target.host_release
    );

    match &cli.script {
        Some(script) => run_script(&mut ctx, &mut host, script, cli.macros.as_deref())?,
        None => {
            let stdin = io::stdin();
            let prompt = stdin.is_terminal();
            shell::interact(&mut ctx, &mut host, stdin.lock(), prompt)?;
        }
    }
    Ok(())
}
