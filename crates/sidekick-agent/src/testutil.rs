use anyhow::anyhow;
use sidekick_core::{Message, Result};
use sidekick_llm::ChatClient;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Scripted stand-in for the chat transport. Replays a fixed sequence
/// of replies (or failures) and records every transcript it was sent.
/// When the script runs dry it completes the task, so a test never
/// spins until the turn limit unless it means to.
pub struct MockChatClient {
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
    transcripts: Mutex<Vec<Vec<Message>>>,
}

impl MockChatClient {
    pub fn script(steps: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    pub fn replies(texts: Vec<&str>) -> Self {
        Self::script(texts.into_iter().map(|t| Ok(t.to_string())).collect())
    }

    pub fn repeating(text: &str, times: usize) -> Self {
        Self::script(vec![Ok(text.to_string()); times])
    }

    pub fn calls(&self) -> usize {
        self.transcripts.lock().unwrap().len()
    }

    pub fn transcripts(&self) -> Vec<Vec<Message>> {
        self.transcripts.lock().unwrap().clone()
    }
}

impl ChatClient for MockChatClient {
    fn complete(&self, messages: &[Message]) -> Result<String> {
        self.transcripts.lock().unwrap().push(messages.to_vec());
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(e)) => Err(anyhow!("{e}")),
            None => Ok("TASK_COMPLETED".to_string()),
        }
    }
}
