//! Append-only delegation history under the runtime directory.
//!
//! Best-effort by contract: callers swallow the error so a read-only
//! runtime directory can never fail a delegation that otherwise
//! succeeded.

use anyhow::Result;
use chrono::Utc;
use sidekick_core::runtime_dir;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

const TASK_SUMMARY_LEN: usize = 120;

pub fn record(workspace: &Path, file_name: &str, task: &str, files: &[String]) -> Result<()> {
    let dir = runtime_dir(workspace);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(file_name);
    let fresh = !path.exists();

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if fresh {
        writeln!(file, "# Sidekick history\n")?;
    }
    let files_note = if files.is_empty() {
        "(none)".to_string()
    } else {
        files.join(", ")
    };
    writeln!(
        file,
        "- {} | {} | files: {}",
        Utc::now().to_rfc3339(),
        summarize(task),
        files_note
    )?;
    Ok(())
}

fn summarize(task: &str) -> String {
    let flat = task.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= TASK_SUMMARY_LEN {
        return flat;
    }
    let cut: String = flat.chars().take(TASK_SUMMARY_LEN).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_file_with_header_then_appends() {
        let dir = tempfile::TempDir::new().unwrap();
        record(dir.path(), "history.md", "first task", &["a.txt".to_string()]).unwrap();
        record(dir.path(), "history.md", "second task", &[]).unwrap();

        let content =
            std::fs::read_to_string(runtime_dir(dir.path()).join("history.md")).unwrap();
        assert!(content.starts_with("# Sidekick history"));
        assert_eq!(content.matches("# Sidekick history").count(), 1);
        assert!(content.contains("first task | files: a.txt"));
        assert!(content.contains("second task | files: (none)"));
    }

    #[test]
    fn long_tasks_are_summarized_on_one_line() {
        let dir = tempfile::TempDir::new().unwrap();
        let task = "multi\nline\n".to_string() + &"word ".repeat(100);
        record(dir.path(), "history.md", &task, &[]).unwrap();
        let content =
            std::fs::read_to_string(runtime_dir(dir.path()).join("history.md")).unwrap();
        let entry = content.lines().last().unwrap();
        assert!(entry.contains("multi line word"));
        assert!(entry.chars().count() < 200);
    }
}
