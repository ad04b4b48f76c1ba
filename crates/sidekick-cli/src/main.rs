use anyhow::{Context, Result, anyhow};
use clap::Parser;
use sidekick_agent::{DelegateRequest, delegate};
use sidekick_core::AppConfig;
use sidekick_llm::HttpChatClient;
use sidekick_observe::Observer;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sidekick")]
#[command(about = "Delegate a coding task to an LLM agent in the current directory", long_about = None)]
struct Cli {
    /// The task to delegate, in natural language.
    task: Vec<String>,

    /// Working directory for the session (tool effects stay under it).
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Override the configured turn budget.
    #[arg(long)]
    turns: Option<usize>,

    /// Override the LLM model for this invocation.
    #[arg(long)]
    model: Option<String>,

    /// Conversation only: no tool dispatch, no files written.
    #[arg(long)]
    no_tools: bool,

    /// Skip the review pass over modified files.
    #[arg(long)]
    no_auto_debug: bool,

    /// Echo session events to stderr.
    #[arg(short, long)]
    verbose: bool,

    /// Print the outcome as JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("sidekick: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let task = cli.task.join(" ");
    if task.trim().is_empty() {
        return Err(anyhow!("no task given"));
    }
    let workspace = cli
        .dir
        .canonicalize()
        .with_context(|| format!("working directory {} not found", cli.dir.display()))?;

    let mut cfg = AppConfig::load(&workspace)?;
    if let Some(model) = cli.model {
        cfg.llm.model = model;
    }
    if cli.no_auto_debug {
        cfg.agent.auto_debug = false;
    }

    let api_key = cfg.api_key().ok_or_else(|| {
        anyhow!(
            "no API key: set {} or llm.api_key in .sidekick/settings.json",
            cfg.llm.api_key_env
        )
    })?;
    let client = HttpChatClient::new(cfg.llm.clone(), api_key)?;

    let mut observer = Observer::new(&workspace)?;
    observer.set_verbose(cli.verbose);

    let outcome = delegate(
        &client,
        &cfg,
        &observer,
        &DelegateRequest {
            task,
            working_dir: workspace,
            turn_limit: cli.turns,
            allow_tools: !cli.no_tools,
        },
    )?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.response);
        if let Some(e) = &outcome.error {
            eprintln!("sidekick: session ended with error: {e}");
        }
    }
    if outcome.error.is_some() {
        std::process::exit(2);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn task_words_and_flags_parse() {
        let cli = Cli::parse_from([
            "sidekick",
            "--turns",
            "5",
            "--no-auto-debug",
            "write",
            "a",
            "parser",
        ]);
        assert_eq!(cli.task.join(" "), "write a parser");
        assert_eq!(cli.turns, Some(5));
        assert!(cli.no_auto_debug);
        assert!(!cli.no_tools);
    }
}
