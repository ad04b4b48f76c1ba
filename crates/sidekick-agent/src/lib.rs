//! Task delegation: hand a natural-language task to the model and
//! drive it to completion inside a working directory.
//!
//! [`delegate`] runs the whole pipeline: primary session loop, post-hoc
//! artifact extraction from the final response, an optional auto-debug
//! review pass over everything that was written, a history entry, and
//! a `[GENERATED_FILES]` trailer for the caller.

mod autodebug;
mod extract;
mod history;
mod parser;
mod prompts;
mod refusal;
mod session;
#[cfg(test)]
pub(crate) mod testutil;

pub use extract::{ExtractOutcome, extract_artifacts};
pub use parser::parse_tool_call;
pub use refusal::is_refusal;
pub use session::{Session, SessionOptions};

use sidekick_core::{AppConfig, Persona, Result, SessionOutcome};
use sidekick_llm::ChatClient;
use sidekick_observe::Observer;
use sidekick_tools::{ToolRegistry, Workspace};
use std::path::PathBuf;

/// One delegated task.
///
/// `working_dir` is the session's whole world: tool effects and
/// extracted artifacts land under it, and nothing outside it is
/// touched. Concurrent delegations against the same directory are not
/// synchronized; give each its own directory or run them in sequence.
pub struct DelegateRequest {
    pub task: String,
    pub working_dir: PathBuf,
    /// Overrides the configured turn budget when set.
    pub turn_limit: Option<usize>,
    /// When false the session runs conversation-only: no tool
    /// dispatch, no artifact extraction, no review pass.
    pub allow_tools: bool,
}

pub fn delegate(
    client: &dyn ChatClient,
    cfg: &AppConfig,
    observer: &Observer,
    req: &DelegateRequest,
) -> Result<SessionOutcome> {
    let workspace = Workspace::new(&req.working_dir)?;
    let registry = ToolRegistry::new(workspace.clone(), &cfg.tools);
    let session = Session {
        client,
        registry: &registry,
        observer,
        refusal_phrases: &cfg.agent.refusal_phrases,
    };

    let turn_limit = req.turn_limit.unwrap_or(cfg.agent.turn_limit).max(1);
    let project_context = workspace.read(&cfg.agent.context_file).ok();

    let mut outcome = session.run(&SessionOptions {
        persona: Persona::Coder,
        task: req.task.clone(),
        project_context,
        turn_limit,
        allow_tools: req.allow_tools,
    });

    if outcome.error.is_none() && req.allow_tools {
        let extracted = extract_artifacts(&outcome.response, &workspace);
        outcome.response = extracted.text;
        for file in extracted.files_modified {
            if !outcome.files_modified.contains(&file) {
                outcome.files_modified.push(file);
            }
        }

        if cfg.agent.auto_debug && !outcome.files_modified.is_empty() {
            let budget =
                autodebug::review_turn_budget(turn_limit, cfg.agent.review_turn_limit);
            if let Some(review) = autodebug::review(
                &session,
                &workspace,
                &req.task,
                &outcome.files_modified,
                budget,
            ) {
                match review.error {
                    Some(e) => observer.warn(&format!("auto-debug pass failed: {e}")),
                    None => {
                        if !review.response.is_empty() {
                            outcome.response.push_str("\n\n## Auto-Debug Report\n\n");
                            outcome.response.push_str(&review.response);
                        }
                        for file in review.files_modified {
                            if !outcome.files_modified.contains(&file) {
                                outcome.files_modified.push(file);
                            }
                        }
                    }
                }
            }
        }
    }

    if cfg.history.enabled {
        if let Err(e) = history::record(
            workspace.root(),
            &cfg.history.file_name,
            &req.task,
            &outcome.files_modified,
        ) {
            observer.warn(&format!("history append failed: {e}"));
        }
    }

    if !outcome.files_modified.is_empty() {
        let absolute: Vec<String> = outcome
            .files_modified
            .iter()
            .map(|f| workspace.root().join(f).display().to_string())
            .collect();
        outcome
            .response
            .push_str(&format!("\n\n[GENERATED_FILES]: {}", absolute.join(", ")));
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockChatClient;

    fn config() -> AppConfig {
        AppConfig::default()
    }

    fn request(dir: &std::path::Path) -> DelegateRequest {
        DelegateRequest {
            task: "write a fibonacci module".into(),
            working_dir: dir.to_path_buf(),
            turn_limit: None,
            allow_tools: true,
        }
    }

    #[test]
    fn narrated_code_is_extracted_and_trailer_added() {
        let dir = tempfile::TempDir::new().unwrap();
        let observer = Observer::new(dir.path()).unwrap();
        let mut cfg = config();
        cfg.agent.auto_debug = false;
        let client = MockChatClient::replies(vec![
            "### fib.py\n\n```python\ndef fib(n):\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\n```\n\nTASK_COMPLETED",
        ]);

        let outcome = delegate(&client, &cfg, &observer, &request(dir.path())).unwrap();
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.files_modified, vec!["fib.py"]);
        assert!(dir.path().join("fib.py").exists());
        assert!(outcome.response.contains("[saved to fib.py]"));
        let trailer = outcome.response.lines().last().unwrap();
        assert!(trailer.starts_with("[GENERATED_FILES]: "));
        assert!(trailer.contains("fib.py"));
    }

    #[test]
    fn auto_debug_report_is_appended() {
        let dir = tempfile::TempDir::new().unwrap();
        let observer = Observer::new(dir.path()).unwrap();
        let cfg = config();
        let client = MockChatClient::replies(vec![
            // Primary session saves a file via tool call, then finishes.
            "{\"tool\": \"save_file\", \"args\": {\"file_name\": \"calc.py\", \"content\": \"def add(a, b):\\n    return a - b\\n\"}}",
            "Wrote calc.py. TASK_COMPLETED",
            // Reviewer fixes it.
            "{\"tool\": \"replace_text_in_file\", \"args\": {\"file_name\": \"calc.py\", \"find\": \"a - b\", \"replace\": \"a + b\"}}",
            "Corrected add() to actually add. TASK_COMPLETED",
        ]);

        let outcome = delegate(&client, &cfg, &observer, &request(dir.path())).unwrap();
        assert_eq!(outcome.files_modified, vec!["calc.py"]);
        assert!(outcome.response.contains("## Auto-Debug Report"));
        assert!(outcome.response.contains("Corrected add()"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("calc.py")).unwrap(),
            "def add(a, b):\n    return a + b\n"
        );
    }

    #[test]
    fn no_files_skips_auto_debug() {
        let dir = tempfile::TempDir::new().unwrap();
        let observer = Observer::new(dir.path()).unwrap();
        let cfg = config();
        let client =
            MockChatClient::replies(vec!["The answer is 42. TASK_COMPLETED"]);

        let outcome = delegate(&client, &cfg, &observer, &request(dir.path())).unwrap();
        assert_eq!(outcome.response, "The answer is 42.");
        // One call only: no reviewer session was started.
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn history_entry_is_written() {
        let dir = tempfile::TempDir::new().unwrap();
        let observer = Observer::new(dir.path()).unwrap();
        let mut cfg = config();
        cfg.agent.auto_debug = false;
        let client = MockChatClient::replies(vec!["Done. TASK_COMPLETED"]);

        delegate(&client, &cfg, &observer, &request(dir.path())).unwrap();
        let history = std::fs::read_to_string(
            sidekick_core::runtime_dir(dir.path()).join("history.md"),
        )
        .unwrap();
        assert!(history.contains("write a fibonacci module"));
    }

    #[test]
    fn project_context_file_reaches_the_prompt() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("SIDEKICK.md"), "This project uses Python 3.12.")
            .unwrap();
        let observer = Observer::new(dir.path()).unwrap();
        let mut cfg = config();
        cfg.agent.auto_debug = false;
        let client = MockChatClient::replies(vec!["Noted. TASK_COMPLETED"]);

        delegate(&client, &cfg, &observer, &request(dir.path())).unwrap();
        let transcripts = client.transcripts();
        assert!(transcripts[0][0].content.contains("Python 3.12"));
    }

    #[test]
    fn transport_error_is_reported_not_raised() {
        let dir = tempfile::TempDir::new().unwrap();
        let observer = Observer::new(dir.path()).unwrap();
        let cfg = config();
        let client = MockChatClient::script(vec![Err("api status 500".to_string())]);

        let outcome = delegate(&client, &cfg, &observer, &request(dir.path())).unwrap();
        assert_eq!(outcome.error.as_deref(), Some("api status 500"));
        assert!(outcome.files_modified.is_empty());
    }

    #[test]
    fn missing_working_dir_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let observer = Observer::new(dir.path()).unwrap();
        let cfg = config();
        let client = MockChatClient::replies(vec![]);
        let mut req = request(dir.path());
        req.working_dir = dir.path().join("does-not-exist");

        assert!(delegate(&client, &cfg, &observer, &req).is_err());
    }

    #[test]
    fn tools_disabled_means_no_extraction() {
        let dir = tempfile::TempDir::new().unwrap();
        let observer = Observer::new(dir.path()).unwrap();
        let cfg = config();
        let client = MockChatClient::replies(vec![
            "### fib.py\n\n```python\ndef fib(n):\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\n```\n\nTASK_COMPLETED",
        ]);
        let mut req = request(dir.path());
        req.allow_tools = false;

        let outcome = delegate(&client, &cfg, &observer, &req).unwrap();
        assert!(outcome.files_modified.is_empty());
        assert!(!dir.path().join("fib.py").exists());
        assert!(outcome.response.contains("def fib"));
    }
}
