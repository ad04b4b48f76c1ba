//! Workspace-scoped collaborators and the tool registry/dispatcher.
//!
//! Every path-bearing operation goes through [`Workspace::resolve`], which
//! enforces the containment invariant: resolved paths never leave the
//! session's working directory.

mod registry;
mod shell;

use anyhow::{Result, anyhow};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub use registry::{ToolOutcome, ToolRegistry, batch_file_entry};
pub use shell::{PlatformShellRunner, ShellRunResult, ShellRunner};

/// A session's working directory. All file effects are scoped under it.
///
/// Cloned freely; holds only the root path. If a host runs multiple
/// sessions against the same root concurrently, writes are not mutually
/// exclusive across sessions; sequence sessions or give each its own
/// directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: &Path) -> Result<Self> {
        let root = if root.exists() {
            fs::canonicalize(root)?
        } else {
            return Err(anyhow!("working directory does not exist: {}", root.display()));
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path against the root, rejecting anything that
    /// could escape it: absolute paths, drive prefixes, and `..`
    /// components. The check is lexical; the target need not exist yet.
    pub fn resolve(&self, rel: &str) -> Result<PathBuf> {
        let candidate = Path::new(rel);
        for component in candidate.components() {
            match component {
                Component::RootDir | Component::Prefix(_) => {
                    return Err(anyhow!("path must be relative to the working directory: {rel}"));
                }
                Component::ParentDir => {
                    return Err(anyhow!("path escapes the working directory: {rel}"));
                }
                Component::Normal(_) | Component::CurDir => {}
            }
        }
        Ok(self.root.join(candidate))
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        let full = self.resolve(rel)?;
        Ok(fs::read_to_string(full)?)
    }

    /// Write a file, creating parent directories as needed.
    pub fn write(&self, rel: &str, content: &str) -> Result<()> {
        let full = self.resolve(rel)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, content)?;
        Ok(())
    }

    /// List entry names in a directory (non-recursive), sorted.
    pub fn list(&self, rel: &str) -> Result<Vec<String>> {
        let full = self.resolve(rel)?;
        let mut out = Vec::new();
        for entry in fs::read_dir(full)? {
            let e = entry?;
            let mut name = e.file_name().to_string_lossy().to_string();
            if e.path().is_dir() {
                name.push('/');
            }
            out.push(name);
        }
        out.sort();
        Ok(out)
    }

    pub fn ensure_dir(&self, rel: &str) -> Result<()> {
        let full = self.resolve(rel)?;
        fs::create_dir_all(full)?;
        Ok(())
    }

    /// Delete files matching a glob pattern. Returns the deleted paths
    /// relative to the root. Directories are left alone.
    pub fn delete(&self, pattern: &str) -> Result<Vec<String>> {
        // Containment applies to the pattern too.
        self.resolve(pattern)?;
        let full_pattern = self.root.join(pattern);
        let mut deleted = Vec::new();
        for entry in glob::glob(&full_pattern.to_string_lossy())? {
            let path = entry?;
            if path.is_file() {
                fs::remove_file(&path)?;
                if let Ok(rel) = path.strip_prefix(&self.root) {
                    deleted.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        Ok(deleted)
    }

    pub fn rename(&self, src: &str, dst: &str) -> Result<()> {
        let from = self.resolve(src)?;
        let to = self.resolve(dst)?;
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(from, to)?;
        Ok(())
    }

    pub fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let from = self.resolve(src)?;
        let to = self.resolve(dst)?;
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(from, to)?;
        Ok(())
    }

    /// Replace occurrences of `find` with `replace` in a file.
    /// Returns the replacement count (0 when `find` is absent).
    pub fn replace_text(&self, rel: &str, find: &str, replace: &str, all: bool) -> Result<usize> {
        if find.is_empty() {
            return Err(anyhow!("find text must not be empty"));
        }
        let before = self.read(rel)?;
        let count = before.matches(find).count();
        if count == 0 {
            return Ok(0);
        }
        let (after, replaced) = if all {
            (before.replace(find, replace), count)
        } else {
            (before.replacen(find, replace, 1), 1)
        };
        self.write(rel, &after)?;
        Ok(replaced)
    }
}

/// Fetch a URL over HTTP GET, capping the returned body size.
pub fn fetch_url(url: &str, max_bytes: usize, timeout: Duration) -> Result<String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()?;
    let resp = client.get(url).send()?;
    let status = resp.status();
    if !status.is_success() {
        return Err(anyhow!("fetch failed with status {status} for {url}"));
    }
    let body = resp.text()?;
    if body.len() > max_bytes {
        let cut = body
            .char_indices()
            .take_while(|(i, _)| *i < max_bytes)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        return Ok(format!("{}\n[truncated at {max_bytes} bytes]", &body[..cut]));
    }
    Ok(body)
}
