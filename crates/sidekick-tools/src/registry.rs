//! Capability-gated tool registry and dispatcher.
//!
//! Entries are immutable for a session's lifetime; enablement is resolved
//! once at construction from the capability flags. Dispatch never
//! propagates an error into the session loop; a failed or disallowed
//! tool is reported back to the model as an error string, since the
//! model can rephrase and continue.

use anyhow::{Result, anyhow};
use serde_json::Value;
use sidekick_core::{ToolCall, ToolsConfig};
use std::sync::Arc;
use std::time::Duration;

use crate::{PlatformShellRunner, ShellRunner, Workspace, fetch_url};

/// What a dispatched tool produced: the text fed back to the model, and
/// any workspace files the tool wrote (for the session's modified set).
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub output: String,
    pub files_modified: Vec<String>,
}

impl ToolOutcome {
    fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            files_modified: Vec::new(),
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            output: format!("Error: {}", msg.into()),
            files_modified: Vec::new(),
        }
    }
}

type Handler = Box<dyn Fn(&Value) -> Result<ToolOutcome> + Send + Sync>;

struct ToolDescriptor {
    name: &'static str,
    enabled: bool,
    handler: Handler,
}

pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new(workspace: Workspace, cfg: &ToolsConfig) -> Self {
        Self::with_runner(workspace, cfg, Arc::new(PlatformShellRunner))
    }

    pub fn with_runner(
        workspace: Workspace,
        cfg: &ToolsConfig,
        runner: Arc<dyn ShellRunner>,
    ) -> Self {
        let mut tools: Vec<ToolDescriptor> = Vec::new();
        let fs_on = cfg.allow_filesystem;
        let shell_timeout = Duration::from_secs(cfg.shell_timeout_seconds);
        let fetch_max = cfg.fetch_max_bytes;

        let ws = workspace.clone();
        tools.push(tool("save_file", fs_on, move |args| save_file(&ws, args)));

        let ws = workspace.clone();
        tools.push(tool("read_file", fs_on, move |args| {
            let path = req_str(args, &["file_name", "path"])?;
            let content = ws.read(path)?;
            Ok(ToolOutcome::text(content))
        }));

        let ws = workspace.clone();
        tools.push(tool("list_files", fs_on, move |args| {
            let dir = opt_str(args, &["dir", "path"]).unwrap_or(".");
            let entries = ws.list(dir)?;
            if entries.is_empty() {
                Ok(ToolOutcome::text("(empty directory)"))
            } else {
                Ok(ToolOutcome::text(entries.join("\n")))
            }
        }));

        let ws = workspace.clone();
        tools.push(tool("make_dir", fs_on, move |args| {
            let dir = req_str(args, &["dir", "path"])?;
            ws.ensure_dir(dir)?;
            Ok(ToolOutcome::text(format!("Created directory {dir}")))
        }));

        let ws = workspace.clone();
        tools.push(tool("delete_file", fs_on, move |args| {
            let pattern = req_str(args, &["pattern", "file_name", "path"])?;
            let deleted = ws.delete(pattern)?;
            if deleted.is_empty() {
                Ok(ToolOutcome::text(format!("No files matched {pattern}")))
            } else {
                Ok(ToolOutcome::text(format!("Deleted: {}", deleted.join(", "))))
            }
        }));

        let ws = workspace.clone();
        tools.push(tool("move_file", fs_on, move |args| {
            let src = req_str(args, &["src", "source"])?;
            let dst = req_str(args, &["dst", "destination"])?;
            ws.rename(src, dst)?;
            Ok(ToolOutcome {
                output: format!("Moved {src} to {dst}"),
                files_modified: vec![dst.to_string()],
            })
        }));

        let ws = workspace.clone();
        tools.push(tool("copy_file", fs_on, move |args| {
            let src = req_str(args, &["src", "source"])?;
            let dst = req_str(args, &["dst", "destination"])?;
            ws.copy(src, dst)?;
            Ok(ToolOutcome {
                output: format!("Copied {src} to {dst}"),
                files_modified: vec![dst.to_string()],
            })
        }));

        let ws = workspace.clone();
        tools.push(tool("replace_text_in_file", fs_on, move |args| {
            let path = req_str(args, &["file_name", "path"])?;
            let find = req_str(args, &["find", "search"])?;
            let replace = req_str(args, &["replace", "replacement"])?;
            let all = args.get("all").and_then(|v| v.as_bool()).unwrap_or(false);
            let count = ws.replace_text(path, find, replace, all)?;
            if count == 0 {
                Ok(ToolOutcome::text(format!("Find text not found in {path}")))
            } else {
                Ok(ToolOutcome {
                    output: format!("Replaced {count} occurrence(s) in {path}"),
                    files_modified: vec![path.to_string()],
                })
            }
        }));

        let ws = workspace.clone();
        tools.push(tool("run_shell", cfg.allow_code, move |args| {
            let cmd = req_str(args, &["cmd", "command"])?;
            let timeout = args
                .get("timeout")
                .and_then(|v| v.as_u64())
                .map(Duration::from_secs)
                .unwrap_or(shell_timeout);
            let result = runner.run(cmd, ws.root(), timeout)?;
            Ok(ToolOutcome::text(result.render()))
        }));

        tools.push(tool("web_fetch", cfg.allow_web, move |args| {
            let url = req_str(args, &["url"])?;
            let body = fetch_url(url, fetch_max, Duration::from_secs(30))?;
            Ok(ToolOutcome::text(body))
        }));

        Self { tools }
    }

    /// Names of the tools the model is allowed to call this session.
    pub fn enabled_names(&self) -> Vec<&'static str> {
        self.tools
            .iter()
            .filter(|t| t.enabled)
            .map(|t| t.name)
            .collect()
    }

    /// Execute a normalized tool call. Always returns an outcome; lookup
    /// failures, gating, and handler errors all become error strings.
    pub fn dispatch(&self, call: &ToolCall) -> ToolOutcome {
        let Some(descriptor) = self.tools.iter().find(|t| t.name == call.name) else {
            return ToolOutcome::error(format!(
                "unknown tool '{}'. Available tools: {}",
                call.name,
                self.enabled_names().join(", ")
            ));
        };
        if !descriptor.enabled {
            return ToolOutcome::error(format!(
                "tool '{}' is not enabled for this session",
                call.name
            ));
        }
        match (descriptor.handler)(&call.args) {
            Ok(outcome) => outcome,
            Err(e) => ToolOutcome::error(e.to_string()),
        }
    }
}

fn tool(
    name: &'static str,
    enabled: bool,
    handler: impl Fn(&Value) -> Result<ToolOutcome> + Send + Sync + 'static,
) -> ToolDescriptor {
    ToolDescriptor {
        name,
        enabled,
        handler: Box::new(handler),
    }
}

/// First present string value among the accepted argument keys.
fn req_str<'a>(args: &'a Value, keys: &[&str]) -> Result<&'a str> {
    opt_str(args, keys).ok_or_else(|| anyhow!("{} missing", keys[0]))
}

fn opt_str<'a>(args: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| args.get(*k).and_then(|v| v.as_str()))
}

/// Pull a `(path, content)` pair out of one batch-save entry. Accepts the
/// key aliases models actually emit.
pub fn batch_file_entry(value: &Value) -> Option<(&str, &str)> {
    let path = opt_str(value, &["path", "file_name", "name"])?;
    let content = opt_str(value, &["content", "data", "code"])?;
    Some((path, content))
}

fn save_file(ws: &Workspace, args: &Value) -> Result<ToolOutcome> {
    // Batch form: {"files": [{path, content}, …]}.
    if let Some(files) = args.get("files").and_then(|v| v.as_array()) {
        let mut written = Vec::new();
        for entry in files {
            let (path, content) = batch_file_entry(entry)
                .ok_or_else(|| anyhow!("each files[] entry needs a path and content"))?;
            ws.write(path, content)?;
            written.push(path.to_string());
        }
        if written.is_empty() {
            return Err(anyhow!("files array is empty"));
        }
        return Ok(ToolOutcome {
            output: format!("Saved {} file(s): {}", written.len(), written.join(", ")),
            files_modified: written,
        });
    }

    let path = req_str(args, &["file_name", "path"])?;
    let content = req_str(args, &["content", "data"])?;
    ws.write(path, content)?;
    Ok(ToolOutcome {
        output: format!("Saved {path}"),
        files_modified: vec![path.to_string()],
    })
}
