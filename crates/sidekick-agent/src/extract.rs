//! Post-hoc code-artifact extraction.
//!
//! After a session ends, the final response often still contains fenced
//! code blocks the model narrated instead of saving. This pass walks
//! the blocks in reverse order, persists the ones it can attribute to a
//! file path, and splices a short marker over each saved block so the
//! returned text no longer carries the code. Reverse order keeps the
//! byte spans of unprocessed blocks valid while splicing, and makes
//! "last occurrence wins" fall out naturally when two blocks target the
//! same path.

use regex::Regex;
use serde_json::Value;
use sidekick_tools::{Workspace, batch_file_entry};
use std::sync::OnceLock;

/// Trimmed block bodies shorter than this are treated as illustrative
/// snippets, not files.
const MIN_CONTENT_LEN: usize = 50;

/// How far back (in bytes) to scan the prose before a block for a
/// filename mention.
const LOOKBACK_BYTES: usize = 500;

const KNOWN_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "tsx", "jsx", "mjs", "cjs", "json", "toml", "yaml", "yml", "md",
    "html", "htm", "css", "scss", "sh", "bash", "go", "java", "c", "cc", "cpp", "h", "hpp", "cs",
    "rb", "php", "swift", "kt", "sql", "txt", "xml", "ini", "cfg", "conf", "bat", "ps1", "proto",
    "vue", "svelte", "dockerfile", "gitignore", "env",
];

#[derive(Debug, Default)]
pub struct ExtractOutcome {
    /// The response with saved blocks replaced by markers.
    pub text: String,
    /// Paths written, relative to the workspace root, in the order the
    /// blocks appeared in the text.
    pub files_modified: Vec<String>,
}

struct Block {
    lang: String,
    body_text: String,
    span: std::ops::Range<usize>,
}

/// Scan `text` for fenced code blocks and persist the attributable
/// ones into `workspace`. Running the pass again on its own output is
/// a no-op: saved and superseded blocks alike are replaced by markers.
pub fn extract_artifacts(text: &str, workspace: &Workspace) -> ExtractOutcome {
    let blocks: Vec<Block> = fence_re()
        .captures_iter(text)
        .map(|caps| Block {
            lang: caps.get(1).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default(),
            body_text: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
            span: caps.get(0).map(|m| m.range()).unwrap_or_default(),
        })
        .collect();

    let mut updated = text.to_string();
    let mut written: Vec<String> = Vec::new();

    // Strictly back to front so earlier spans stay valid after splicing.
    for i in (0..blocks.len()).rev() {
        let block = &blocks[i];
        // Lookback must not reach into a preceding block, or a filename
        // comment there would claim this block too.
        let window_floor = if i > 0 { blocks[i - 1].span.end } else { 0 };
        if let Some(saved) = save_batch(block, workspace, &written) {
            let marker = format!(
                "[saved {} file(s): {}]",
                saved.len(),
                saved.join(", ")
            );
            updated.replace_range(block.span.clone(), &marker);
            for path in saved.into_iter().rev() {
                written.push(path);
            }
            continue;
        }

        if block.body_text.trim().len() < MIN_CONTENT_LEN {
            continue;
        }
        let Some(path) = infer_path(text, block, window_floor) else {
            // Covers unlabeled shell transcripts too: no path, no save.
            continue;
        };
        if written.contains(&path) {
            // A later block already wrote this path; neutralize the
            // superseded copy so a second pass cannot resurrect it.
            updated.replace_range(block.span.clone(), &format!("[superseded copy of {path}]"));
            continue;
        }
        if workspace.write(&path, &block.body_text).is_err() {
            continue;
        }
        updated.replace_range(block.span.clone(), &format!("[saved to {path}]"));
        written.push(path);
    }

    written.reverse();
    ExtractOutcome {
        text: updated,
        files_modified: written,
    }
}

/// A ```json block whose body is an array of file objects is a batch
/// save. Returns the paths written, in array order, or None when the
/// block is not a well-formed batch.
fn save_batch(block: &Block, workspace: &Workspace, already: &[String]) -> Option<Vec<String>> {
    if block.lang != "json" {
        return None;
    }
    let value: Value = serde_json::from_str(block.body_text.trim()).ok()?;
    let entries = value.as_array()?;
    if entries.is_empty() {
        return None;
    }
    let files: Vec<(&str, &str)> = entries
        .iter()
        .map(batch_file_entry)
        .collect::<Option<Vec<_>>>()?;

    let mut saved = Vec::new();
    for (path, content) in files {
        if already.iter().any(|p| p == path) || saved.iter().any(|p: &String| p == path) {
            continue;
        }
        if workspace.write(path, content).is_ok() {
            saved.push(path.to_string());
        }
    }
    if saved.is_empty() {
        return None;
    }
    Some(saved)
}

fn infer_path(text: &str, block: &Block, window_floor: usize) -> Option<String> {
    if let Some(path) = path_from_lookback(text, block.span.start, window_floor) {
        return Some(path);
    }
    path_from_first_line(&block.body_text)
}

/// Scan up to [`LOOKBACK_BYTES`] of prose before the block for a
/// filename-looking token with a known extension; the mention closest
/// to the block wins.
fn path_from_lookback(text: &str, block_start: usize, window_floor: usize) -> Option<String> {
    let mut from = block_start.saturating_sub(LOOKBACK_BYTES).max(window_floor);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let window = &text[from..block_start];
    filename_re()
        .find_iter(window)
        .filter(|m| !window[..m.start()].ends_with("://") && !m.as_str().contains("://"))
        .last()
        .map(|m| m.as_str().to_string())
}

/// A first line like `# fib.py` or `// src/lib.rs` names the file.
fn path_from_first_line(body: &str) -> Option<String> {
    const COMMENT_PREFIXES: &[&str] = &["//", "#", "--", ";", "/*", "<!--", "*", "%"];
    let first = body.lines().next()?.trim();
    if !COMMENT_PREFIXES.iter().any(|p| first.starts_with(p)) {
        return None;
    }
    filename_re().find(first).map(|m| m.as_str().to_string())
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```([A-Za-z0-9_+#.\-]*)[^\n]*\n(.*?)```").expect("fence regex")
    })
}

fn filename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Leading `../` segments are matched on purpose so escape
        // attempts reach the containment check and get refused there,
        // instead of silently resolving to a different in-tree path.
        let pattern = format!(
            r"(?:\.\./)*[A-Za-z0-9_][A-Za-z0-9_./\-]*\.(?:{})\b",
            KNOWN_EXTENSIONS.join("|")
        );
        Regex::new(&pattern).expect("filename regex")
    })
}
