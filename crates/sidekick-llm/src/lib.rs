//! Blocking client for the OpenAI-style chat-completions protocol.
//!
//! The session loop treats any `Err` from `ChatClient::complete` as fatal
//! for the current run; retries for transient statuses happen here, inside
//! the transport, not in the loop's state machine.

use anyhow::{Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::RETRY_AFTER;
use serde_json::{Value, json};
use sidekick_core::{LlmConfig, Message};
use std::thread;
use std::time::Duration;

/// The seam the loop driver talks through; mocked in agent tests.
pub trait ChatClient {
    /// Send the full transcript, return the assistant's raw text.
    fn complete(&self, messages: &[Message]) -> Result<String>;
}

/// Error from the remote chat-completion endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat endpoint returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("empty or malformed completion payload: {0}")]
    MalformedPayload(String),
}

#[derive(Debug, Clone)]
pub struct HttpChatClient {
    cfg: LlmConfig,
    api_key: String,
    client: Client,
}

impl HttpChatClient {
    pub fn new(cfg: LlmConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()?;
        Ok(Self {
            cfg,
            api_key,
            client,
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.cfg.endpoint.trim_end_matches('/')
        )
    }

    fn build_payload(&self, messages: &[Message]) -> Value {
        json!({
            "model": self.cfg.model,
            "messages": messages,
            "temperature": self.cfg.temperature,
            "stream": false,
        })
    }
}

impl ChatClient for HttpChatClient {
    fn complete(&self, messages: &[Message]) -> Result<String> {
        let url = self.completions_url();
        let payload = self.build_payload(messages);

        let mut last_err: Option<anyhow::Error> = None;
        let mut attempt: u8 = 0;
        while attempt <= self.cfg.max_retries {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send();

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let retry_after = parse_retry_after_seconds(resp.headers().get(RETRY_AFTER));
                    let body = resp.text()?;
                    if status.is_success() {
                        return parse_completion(&body);
                    }
                    last_err = Some(
                        ChatError::Api {
                            status: status.as_u16(),
                            body: truncate_body(&body),
                        }
                        .into(),
                    );
                    if should_retry_status(status) && attempt < self.cfg.max_retries {
                        thread::sleep(retry_delay(
                            self.cfg.retry_base_ms,
                            attempt,
                            retry_after,
                        ));
                        attempt = attempt.saturating_add(1);
                        continue;
                    }
                    break;
                }
                Err(e) => {
                    last_err = Some(anyhow!("chat transport error: {e}"));
                    if attempt < self.cfg.max_retries {
                        thread::sleep(retry_delay(self.cfg.retry_base_ms, attempt, None));
                        attempt = attempt.saturating_add(1);
                        continue;
                    }
                    break;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("chat request failed without detailed error")))
    }
}

/// Extract `choices[0].message.content` from a completion body.
fn parse_completion(body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ChatError::MalformedPayload(format!("invalid JSON: {e}")))?;
    let content = value
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| ChatError::MalformedPayload("no choices[0].message.content".into()))?;
    Ok(content.to_string())
}

fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn parse_retry_after_seconds(header: Option<&reqwest::header::HeaderValue>) -> Option<u64> {
    header
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

fn retry_delay(base_ms: u64, attempt: u8, retry_after_secs: Option<u64>) -> Duration {
    if let Some(secs) = retry_after_secs {
        return Duration::from_secs(secs);
    }
    Duration::from_millis(base_ms.saturating_mul(1 << attempt.min(6)))
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 600;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let cut = body
            .char_indices()
            .take_while(|(i, _)| *i < MAX)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}…", &body[..cut])
    }
}
