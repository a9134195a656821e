//! Install script execution.

use crate::context::RunContext;
use crate::credentials::Redactor;
use crate::runner::{ProcessExit, run_streaming};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Executes a rendered install script.
///
/// The installer only talks to this trait, so tests can count invocations
/// without spawning anything.
pub trait ScriptRunner {
    fn run_script(
        &self,
        script_path: &Path,
        log_path: &Path,
        env: &BTreeMap<String, String>,
        ctx: &RunContext,
    ) -> io::Result<ProcessExit>;
}

impl<T: ScriptRunner + ?Sized> ScriptRunner for &T {
    fn run_script(
        &self,
        script_path: &Path,
        log_path: &Path,
        env: &BTreeMap<String, String>,
        ctx: &RunContext,
    ) -> io::Result<ProcessExit> {
        (**self).run_script(script_path, log_path, env, ctx)
    }
}

/// Runs scripts with `sh` in the sandbox, streaming to the install log.
#[derive(Debug, Clone)]
pub struct ShellScriptRunner {
    pub kill_grace: Duration,
}

impl Default for ShellScriptRunner {
    fn default() -> Self {
        Self {
            kill_grace: Duration::from_secs(10),
        }
    }
}

impl ScriptRunner for ShellScriptRunner {
    fn run_script(
        &self,
        script_path: &Path,
        log_path: &Path,
        env: &BTreeMap<String, String>,
        ctx: &RunContext,
    ) -> io::Result<ProcessExit> {
        let mut command = Command::new("sh");
        command
            .arg(script_path)
            .current_dir(&ctx.sandbox_dir)
            .env_clear()
            .envs(env);

        run_streaming(command, log_path, Redactor::default(), ctx, self.kill_grace)
    }
}
