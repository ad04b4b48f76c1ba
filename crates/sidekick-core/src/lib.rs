use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub type Result<T> = anyhow::Result<T>;

/// Literal token that ends a session loop successfully when it appears
/// anywhere in assistant text.
pub const TASK_COMPLETED_MARKER: &str = "TASK_COMPLETED";

/// End-of-turn sentinel tokens some models leak into their text output.
/// Stripped from raw completions before any parsing.
pub const END_OF_TURN_MARKERS: &[&str] = &[
    "<|EOT|>",
    "<|eot_id|>",
    "<|im_end|>",
    "<|endoftext|>",
    "<|end▁of▁sentence|>",
    "</s>",
];

/// Remove end-of-turn sentinel tokens from raw model text.
pub fn strip_end_markers(text: &str) -> String {
    let mut out = text.to_string();
    for marker in END_OF_TURN_MARKERS {
        if out.contains(marker) {
            out = out.replace(marker, "");
        }
    }
    out
}

pub fn runtime_dir(workspace: &Path) -> PathBuf {
    workspace.join(".sidekick")
}

/// A message role in the chat transcript.
///
/// There is no `tool` role: tool output is fed back to the model as a
/// system message, since tool calls arrive as plain assistant text in
/// this protocol rather than as structured API tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a session transcript. Append-only, owned by one
/// session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A normalized tool invocation parsed from assistant text.
/// Lives for one loop turn; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Fetch a required string argument, or a descriptive error.
    pub fn str_arg(&self, key: &str) -> Result<&str> {
        self.args
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("{key} missing"))
    }
}

/// The system-prompt role assumed by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    Coder,
    Reviewer,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Coder => "coder",
            Persona::Reviewer => "reviewer",
        }
    }
}

/// Result of one end-to-end delegated run, always returned to the
/// caller. Partial success (some files saved, one tool failing) is
/// normal and reported inline rather than thrown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub response: String,
    pub files_modified: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ── Configuration ──

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub tools: ToolsConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    /// Base endpoint; the client appends `/chat/completions`.
    pub endpoint: String,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
    pub max_retries: u8,
    pub retry_base_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            endpoint: "https://api.deepseek.com".to_string(),
            api_key: None,
            api_key_env: "SIDEKICK_API_KEY".to_string(),
            temperature: 0.2,
            timeout_seconds: 120,
            max_retries: 2,
            retry_base_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Turn budget for the primary session.
    pub turn_limit: usize,
    /// Turn budget cap for the auto-debug reviewer session.
    pub review_turn_limit: usize,
    /// Run the reviewer pass over modified files after the primary pass.
    pub auto_debug: bool,
    /// Literal lower-case substrings that mark a capability refusal.
    /// Any superset works; the matching stays a substring test.
    pub refusal_phrases: Vec<String>,
    /// Project context file injected into the system prompt when present.
    pub context_file: String,
}

/// Default refusal phrase list. Models sometimes hedge and still emit a
/// non-functional tool call, so refusal detection runs before parsing.
pub const DEFAULT_REFUSAL_PHRASES: &[&str] = &[
    "i cannot browse",
    "i can't browse",
    "no internet access",
    "i do not have internet",
    "i don't have internet",
    "as an ai",
    "as a language model",
    "i do not have the ability",
    "i don't have the ability",
    "i cannot access your",
    "i can't access your",
    "i am unable to access",
    "i cannot execute",
    "i cannot run commands",
];

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            turn_limit: 12,
            review_turn_limit: 6,
            auto_debug: true,
            refusal_phrases: DEFAULT_REFUSAL_PHRASES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            context_file: "SIDEKICK.md".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub allow_filesystem: bool,
    pub allow_web: bool,
    pub allow_code: bool,
    pub shell_timeout_seconds: u64,
    pub fetch_max_bytes: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            allow_filesystem: true,
            allow_web: false,
            allow_code: false,
            shell_timeout_seconds: 120,
            fetch_max_bytes: 500_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub file_name: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file_name: "history.md".to_string(),
        }
    }
}

impl AppConfig {
    pub fn project_settings_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("settings.json")
    }

    pub fn project_local_settings_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("settings.local.json")
    }

    pub fn legacy_toml_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("config.toml")
    }

    /// Load configuration by layering project settings over defaults.
    /// Merge order: defaults ← legacy config.toml ← settings.json ←
    /// settings.local.json. Missing files are skipped.
    pub fn load(workspace: &Path) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;

        let legacy = Self::legacy_toml_path(workspace);
        if legacy.exists() {
            let raw = fs::read_to_string(legacy)?;
            let legacy_cfg: AppConfig = toml::from_str(&raw)?;
            merge_json_value(&mut merged, &serde_json::to_value(legacy_cfg)?);
        }

        for path in [
            Self::project_settings_path(workspace),
            Self::project_local_settings_path(workspace),
        ] {
            if !path.exists() {
                continue;
            }
            let raw = fs::read_to_string(path)?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            merge_json_value(&mut merged, &value);
        }

        Ok(serde_json::from_value(merged)?)
    }

    pub fn save(&self, workspace: &Path) -> Result<()> {
        let path = Self::project_settings_path(workspace);
        fs::create_dir_all(
            path.parent()
                .ok_or_else(|| anyhow::anyhow!("invalid config path"))?,
        )?;
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Resolve the API key: inline config value first, then environment.
    pub fn api_key(&self) -> Option<String> {
        self.llm
            .api_key
            .clone()
            .or_else(|| std::env::var(&self.llm.api_key_env).ok())
    }
}

fn merge_json_value(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_obj), serde_json::Value::Object(overlay_obj)) => {
            for (key, overlay_value) in overlay_obj {
                if let Some(base_value) = base_obj.get_mut(key) {
                    merge_json_value(base_value, overlay_value);
                } else {
                    base_obj.insert(key.clone(), overlay_value.clone());
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}
