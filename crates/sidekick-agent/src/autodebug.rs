//! Auto-debug: a second, smaller session that reviews what the first
//! one wrote.
//!
//! The reviewer gets the touched files inlined into its task, runs with
//! tools forced on so it can apply fixes directly, and its output is
//! NOT re-extracted; anything it wants persisted has to go through a
//! tool call.

use sidekick_core::{Persona, SessionOutcome};
use sidekick_tools::Workspace;

use crate::session::{Session, SessionOptions};

/// Per-file cap when inlining content into the review task. Keeps one
/// oversized artifact from starving the rest of the context.
const REVIEW_FILE_CAP: usize = 20_000;

const REVIEW_FLOOR: usize = 4;

/// The reviewer runs on a fraction of the primary budget, but never
/// below a floor that still allows a read/fix/confirm exchange. The
/// result always stays strictly below the primary budget (down to a
/// minimum of one turn), so the review pass can never outlast the pass
/// it is reviewing.
pub fn review_turn_budget(primary: usize, cap: usize) -> usize {
    (primary / 2)
        .max(REVIEW_FLOOR)
        .min(cap.max(1))
        .min(primary.saturating_sub(1).max(1))
}

/// Run the review session over `files`. Returns None when there is
/// nothing to review.
pub fn review(
    session: &Session<'_>,
    workspace: &Workspace,
    task: &str,
    files: &[String],
    turn_limit: usize,
) -> Option<SessionOutcome> {
    if files.is_empty() {
        return None;
    }

    let mut body = format!(
        "The following files were just written for this task:\n\n> {task}\n\n"
    );
    for path in files {
        match workspace.read(path) {
            Ok(content) => {
                body.push_str(&format!("### {path}\n```\n"));
                body.push_str(truncated(&content));
                if !content.ends_with('\n') {
                    body.push('\n');
                }
                body.push_str("```\n\n");
            }
            // Deleted or binary since the session wrote it; the
            // reviewer can still read_file if it cares.
            Err(_) => body.push_str(&format!("### {path}\n(unreadable)\n\n")),
        }
    }
    body.push_str(
        "Review them for bugs, syntax errors, and unfinished stubs. Apply any fixes with \
         save_file or replace_text_in_file, then summarize what you changed and end with \
         TASK_COMPLETED.",
    );

    let opts = SessionOptions {
        persona: Persona::Reviewer,
        task: body,
        project_context: None,
        turn_limit,
        allow_tools: true,
    };
    Some(session.run(&opts))
}

fn truncated(content: &str) -> &str {
    if content.len() <= REVIEW_FILE_CAP {
        return content;
    }
    let mut cut = REVIEW_FILE_CAP;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    &content[..cut]
}
