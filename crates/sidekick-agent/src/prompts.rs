//! System prompt assembly per persona.

use sidekick_core::{Persona, TASK_COMPLETED_MARKER};

const CODER_BASE: &str = "You are Sidekick, a coding agent working inside the user's project directory. \
You complete the task yourself using the tools listed below; you never tell the user to do it manually. \
All file paths are relative to the project directory.";

const REVIEWER_BASE: &str = "You are Sidekick in review mode. You are given files that were just written \
for a task. Read them critically, find bugs, missing edge cases, and syntax errors, and fix them \
directly with the tools listed below. Report what you changed and why.";

/// Build the session system prompt: persona base, optional project
/// context, the allow-listed tools, and the call grammar.
pub fn build_system_prompt(
    persona: Persona,
    project_context: Option<&str>,
    tool_names: &[&str],
) -> String {
    let mut prompt = String::new();
    prompt.push_str(match persona {
        Persona::Coder => CODER_BASE,
        Persona::Reviewer => REVIEWER_BASE,
    });

    if let Some(context) = project_context {
        let context = context.trim();
        if !context.is_empty() {
            prompt.push_str("\n\n## Project context\n\n");
            prompt.push_str(context);
        }
    }

    if tool_names.is_empty() {
        prompt.push_str("\n\nNo tools are available in this session. Answer in plain text");
    } else {
        prompt.push_str("\n\n## Available tools\n");
        for name in tool_names {
            prompt.push_str("- ");
            prompt.push_str(name);
            prompt.push('\n');
        }
        prompt.push_str(
            "\nTo use a tool, reply with exactly one JSON object and nothing else:\n\
             {\"tool\": \"<tool name>\", \"args\": {...}}\n\
             One tool call per reply. The tool result comes back in the next message.\n\
             save_file takes {\"file_name\": ..., \"content\": ...} or {\"files\": [...]} for several files",
        );
    }

    prompt.push_str(&format!(
        ".\n\nWhen the task is fully done, end your final reply with {TASK_COMPLETED_MARKER}."
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coder_prompt_lists_tools_and_grammar() {
        let prompt = build_system_prompt(Persona::Coder, None, &["save_file", "read_file"]);
        assert!(prompt.contains("- save_file"));
        assert!(prompt.contains("- read_file"));
        assert!(prompt.contains("{\"tool\""));
        assert!(prompt.contains(TASK_COMPLETED_MARKER));
    }

    #[test]
    fn project_context_is_injected() {
        let prompt = build_system_prompt(Persona::Coder, Some("Always use tabs."), &[]);
        assert!(prompt.contains("## Project context"));
        assert!(prompt.contains("Always use tabs."));
    }

    #[test]
    fn no_tools_prompt_says_so() {
        let prompt = build_system_prompt(Persona::Reviewer, None, &[]);
        assert!(prompt.contains("No tools are available"));
        assert!(!prompt.contains("## Available tools"));
    }
}
