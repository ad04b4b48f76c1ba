use anyhow::{Result, anyhow};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

#[derive(Debug, Clone)]
pub struct ShellRunResult {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ShellRunResult {
    /// Render for feeding back to the model as a tool result.
    pub fn render(&self) -> String {
        let mut out = String::new();
        match (self.timed_out, self.status) {
            (true, _) => out.push_str("command timed out\n"),
            (false, Some(0)) => {}
            (false, Some(code)) => out.push_str(&format!("exit status: {code}\n")),
            (false, None) => out.push_str("terminated by signal\n"),
        }
        if !self.stdout.is_empty() {
            out.push_str(&self.stdout);
        }
        if !self.stderr.is_empty() {
            out.push_str("\n[stderr]\n");
            out.push_str(&self.stderr);
        }
        if out.is_empty() {
            out.push_str("(no output)");
        }
        out
    }
}

pub trait ShellRunner: Send + Sync {
    fn run(&self, cmd: &str, cwd: &Path, timeout: Duration) -> Result<ShellRunResult>;
}

#[derive(Debug, Default)]
pub struct PlatformShellRunner;

impl ShellRunner for PlatformShellRunner {
    fn run(&self, cmd: &str, cwd: &Path, timeout: Duration) -> Result<ShellRunResult> {
        let mut child = spawn_shell(cmd, cwd)?;

        let timed_out = child.wait_timeout(timeout)?.is_none();
        if timed_out {
            child.kill()?;
        }
        let output = child.wait_with_output()?;
        Ok(ShellRunResult {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            timed_out,
        })
    }
}

#[cfg(target_os = "windows")]
const SHELL_CANDIDATES: &[(&str, &str)] = &[("cmd", "/C"), ("powershell", "-Command")];

#[cfg(not(target_os = "windows"))]
const SHELL_CANDIDATES: &[(&str, &str)] = &[("sh", "-c"), ("bash", "-c")];

/// Spawn `cmd` under the first candidate shell that starts. Spawn
/// failures accumulate so the final error names every shell tried.
fn spawn_shell(cmd: &str, cwd: &Path) -> Result<std::process::Child> {
    let mut errors = Vec::new();
    for (shell, flag) in SHELL_CANDIDATES {
        let spawned = Command::new(shell)
            .arg(flag)
            .arg(cmd)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        match spawned {
            Ok(child) => return Ok(child),
            Err(e) => errors.push(format!("{shell}: {e}")),
        }
    }
    Err(anyhow!(
        "no usable shell to run '{cmd}': {}",
        errors.join("; ")
    ))
}
