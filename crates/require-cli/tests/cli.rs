//! Integration tests for the `require` CLI binary.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Temporary module tree and working directory for one run of `reqsh`.
struct TestContext {
    temp_dir: TempDir,
    modules: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let modules = temp_dir.path().join("modules");
        fs::create_dir_all(&modules).expect("failed to create module dir");
        Self { temp_dir, modules }
    }

    fn reqsh_cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_reqsh"));
        cmd.current_dir(self.temp_dir.path())
            .env_remove("RUST_LOG")
            .env_remove("EPICS_DRIVER_PATH")
            .env_remove("SCRIPT_PATH")
            .arg("--path")
            .arg(&self.modules)
            .arg("--arch")
            .arg("linux-x86_64")
            .arg("--release")
            .arg("3.14.12");
        cmd
    }

    fn script(&self, name: &str, text: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, text).expect("failed to write script");
        path
    }

    fn run_script(&self, path: &Path, macros: Option<&str>) -> Output {
        let mut cmd = self.reqsh_cmd();
        cmd.arg(path);
        if let Some(macros) = macros {
            cmd.arg("--macros").arg(macros);
        }
        cmd.output().expect("failed to run reqsh")
    }
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.reqsh_cmd().arg("--help").output().expect("failed to run reqsh");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
}

#[test]
fn test_script_transcript() {
    let ctx = TestContext::new();
    let script = ctx.script(
        "st.cmd",
        "# startup\n\
         #- not shown\n\
         N=$(COUNT)*2\n\
         epicsEnvSet(\"CH\", \"$(N)\")\n\
         calc $(CH)+1\n\
         require optional ifexists\n\
         iocInit\n",
    );

    let output = ctx.run_script(&script, Some("COUNT=4"));

    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout,
        "# startup\n\
         N=4*2\n\
         epicsEnvSet(\"CH\", \"8\")\n\
         calc 8+1\n\
         9\n\
         require optional ifexists\n\
         iocInit\n"
    );
}

#[test]
fn test_missing_module_aborts_startup() {
    let ctx = TestContext::new();
    let script = ctx.script("st.cmd", "require nothing 1.0\necho unreachable\n");

    let output = ctx.run_script(&script, None);

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("unreachable\n"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("module nothing not found"), "{stderr}");
}

#[test]
fn test_failure_after_init_is_reported() {
    let ctx = TestContext::new();
    let script = ctx.script("st.cmd", "iocInit\nrequire nothing\necho unreachable\n");

    let output = ctx.run_script(&script, None);

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("unreachable\n"));
}

#[cfg(target_os = "linux")]
#[test]
fn test_unloadable_binary() {
    let ctx = TestContext::new();
    let lib_dir = ctx.modules.join("broken/1.0/R3.14.12/lib/linux-x86_64");
    fs::create_dir_all(&lib_dir).unwrap();
    fs::write(lib_dir.join("libbroken.so"), "not a shared object").unwrap();
    let script = ctx.script("st.cmd", "require broken 1.0\n");

    let output = ctx.run_script(&script, None);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("loading module broken failed"), "{stderr}");
}

#[test]
fn test_interactive_mode() {
    let ctx = TestContext::new();
    let mut child = ctx
        .reqsh_cmd()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run reqsh");
    child
        .stdin
        .take()
        .expect("no stdin")
        .write_all(b"epicsEnvSet X 5\ncalc $(X)*$(X)\nbogus\ngetLibVersion foo\n")
        .unwrap();

    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "25\n\n");
    assert!(String::from_utf8_lossy(&output.stderr).contains("bogus"));
}
