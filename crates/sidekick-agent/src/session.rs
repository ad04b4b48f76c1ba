//! The multi-turn session loop.
//!
//! One session drives one persona against one task: call the model,
//! strip end-of-turn markers, check for a refusal, parse and dispatch
//! at most one tool call, feed the result back, repeat until the model
//! signals completion or the turn budget runs out. Every model response
//! consumes one turn, so the loop is bounded by construction.

use sidekick_core::{Message, Persona, SessionOutcome, TASK_COMPLETED_MARKER, strip_end_markers};
use sidekick_llm::ChatClient;
use sidekick_observe::Observer;
use sidekick_tools::ToolRegistry;
use uuid::Uuid;

use crate::parser::parse_tool_call;
use crate::prompts::build_system_prompt;
use crate::refusal::is_refusal;

const REFUSAL_CORRECTION: &str = "You DO have access to the tools listed in the system prompt, \
and they run in the user's project directory. Do not claim otherwise. \
Call a tool now, or finish the task and end with TASK_COMPLETED.";

const TOOL_NUDGE: &str = "No tool call detected in your reply. Either call a tool with a single \
JSON object {\"tool\": \"<name>\", \"args\": {...}}, or finish your answer and end with TASK_COMPLETED.";

const PLAIN_NUDGE: &str =
    "If the task is done, repeat your final answer and end with TASK_COMPLETED.";

pub struct SessionOptions {
    pub persona: Persona,
    pub task: String,
    pub project_context: Option<String>,
    pub turn_limit: usize,
    pub allow_tools: bool,
}

pub struct Session<'a> {
    pub client: &'a dyn ChatClient,
    pub registry: &'a ToolRegistry,
    pub observer: &'a Observer,
    pub refusal_phrases: &'a [String],
}

impl Session<'_> {
    pub fn run(&self, opts: &SessionOptions) -> SessionOutcome {
        let session_id = Uuid::now_v7();
        let tool_names = if opts.allow_tools {
            self.registry.enabled_names()
        } else {
            Vec::new()
        };
        let system = build_system_prompt(opts.persona, opts.project_context.as_deref(), &tool_names);
        let mut messages = vec![Message::system(system), Message::user(&opts.task)];
        let mut files_modified: Vec<String> = Vec::new();
        let mut turns_used = 0usize;

        self.observer.event(&format!(
            "session {session_id} start persona={} turn_limit={}",
            opts.persona.as_str(),
            opts.turn_limit
        ));

        loop {
            let raw = match self.client.complete(&messages) {
                Ok(raw) => raw,
                Err(e) => {
                    self.observer
                        .warn(&format!("session {session_id} transport failure: {e}"));
                    return SessionOutcome {
                        response: String::new(),
                        files_modified,
                        error: Some(e.to_string()),
                    };
                }
            };
            let text = strip_end_markers(&raw);
            turns_used += 1;
            let budget_exhausted = turns_used >= opts.turn_limit;

            // A refusal is a capability claim; with no tools granted
            // there is nothing to correct, so it reads as plain prose.
            if opts.allow_tools && is_refusal(&text, self.refusal_phrases) {
                self.observer
                    .event(&format!("session {session_id} turn {turns_used} refusal"));
                if budget_exhausted {
                    return self.finish(session_id, turns_used, text, files_modified);
                }
                messages.push(Message::assistant(&text));
                messages.push(Message::system(REFUSAL_CORRECTION));
                continue;
            }

            if opts.allow_tools {
                if let Some(call) = parse_tool_call(&text) {
                    self.observer.event(&format!(
                        "session {session_id} turn {turns_used} tool {}",
                        call.name
                    ));
                    let outcome = self.registry.dispatch(&call);
                    for file in outcome.files_modified {
                        if !files_modified.contains(&file) {
                            files_modified.push(file);
                        }
                    }
                    if budget_exhausted {
                        return self.finish(session_id, turns_used, text, files_modified);
                    }
                    messages.push(Message::assistant(&text));
                    messages.push(Message::system(format!(
                        "Tool result for {}:\n{}",
                        call.name, outcome.output
                    )));
                    continue;
                }
            }

            if text.contains(TASK_COMPLETED_MARKER) || budget_exhausted {
                return self.finish(session_id, turns_used, text, files_modified);
            }

            messages.push(Message::assistant(&text));
            messages.push(Message::system(if opts.allow_tools {
                TOOL_NUDGE
            } else {
                PLAIN_NUDGE
            }));
        }
    }

    fn finish(
        &self,
        session_id: Uuid,
        turns_used: usize,
        text: String,
        files_modified: Vec<String>,
    ) -> SessionOutcome {
        self.observer.event(&format!(
            "session {session_id} done turns={turns_used} files={}",
            files_modified.len()
        ));
        let response = text.replace(TASK_COMPLETED_MARKER, "").trim().to_string();
        SessionOutcome {
            response,
            files_modified,
            error: None,
        }
    }
}
