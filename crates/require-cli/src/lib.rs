//! reqsh - a host shell for the require module loader
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Runs startup scripts (or reads commands from stdin) and dispatches each
//! line to a small set of shell commands, `require` among them. Modules
//! loaded this way may run their own startup scripts, which come back
//! through the same shell.

pub mod shell;

use clap::Parser;
use std::path::PathBuf;

pub use shell::ShellHost;

/// Command line of `reqsh`.
#[derive(Debug, Parser)]
#[command(name = "reqsh", version, about = "Load modules and run startup scripts")]
pub struct Cli {
    /// Startup script to run; commands are read from stdin when omitted
    pub script: Option<PathBuf>,

    /// Macro definitions for the script: NAME=value[,NAME=value...]
    #[arg(short, long)]
    pub macros: Option<String>,

    /// Module search path, overriding EPICS_DRIVER_PATH
    #[arg(long)]
    pub path: Option<String>,

    /// Target architecture, overriding EPICS_HOST_ARCH
    #[arg(long)]
    pub arch: Option<String>,

    /// Host release the modules must be built for
    #[arg(long, env = "EPICS_RELEASE")]
    pub release: Option<String>,

    /// Raise the log level (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}
