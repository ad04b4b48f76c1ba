use anyhow::Result;
use chrono::Utc;
use sidekick_core::runtime_dir;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only session log plus optional verbose stderr echo.
/// Logging failures are swallowed: observability never aborts a run.
pub struct Observer {
    log_path: PathBuf,
    verbose: bool,
}

impl Observer {
    pub fn new(workspace: &Path) -> Result<Self> {
        let dir = runtime_dir(workspace);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            log_path: dir.join("observe.log"),
            verbose: false,
        })
    }

    /// Enable or disable verbose logging to stderr.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Record a session event: one timestamped line in the log file,
    /// echoed to stderr when verbose mode is on.
    pub fn event(&self, msg: &str) {
        if self.verbose {
            eprintln!("[sidekick] {msg}");
        }
        let _ = self.append_log_line(&format!("{} EVENT {msg}", Utc::now().to_rfc3339()));
    }

    /// Log a warning, written to both the log file and stderr.
    pub fn warn(&self, msg: &str) {
        eprintln!("[sidekick WARN] {msg}");
        let _ = self.append_log_line(&format!("{} WARN {msg}", Utc::now().to_rfc3339()));
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn append_log_line(&self, line: &str) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_appends_to_log_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let observer = Observer::new(dir.path()).expect("observer");
        observer.event("session started");
        observer.event("turn 1 complete");

        let log = fs::read_to_string(observer.log_path()).expect("read log");
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("EVENT session started"));
        assert!(lines[1].contains("EVENT turn 1 complete"));
    }

    #[test]
    fn warn_appends_to_log_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let observer = Observer::new(dir.path()).expect("observer");
        observer.warn("tool dispatch failed");

        let log = fs::read_to_string(observer.log_path()).expect("read log");
        assert!(log.contains("WARN tool dispatch failed"));
    }

    #[test]
    fn verbose_defaults_off_and_toggles() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut observer = Observer::new(dir.path()).expect("observer");
        assert!(!observer.is_verbose());
        observer.set_verbose(true);
        assert!(observer.is_verbose());
    }
}
