//! Orca CLI - Main entry point

mod cli;

use clap::{Parser, Subcommand};
use orca_foundation::OrcaConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Orca - autonomous agent runtime over local tools and MCP sessions
#[derive(Parser, Debug)]
#[command(name = "orca")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Task for the agent (read from stdin when omitted)
    prompt: Option<String>,

    /// Explicit config file (merged over global and project config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum number of steps
    #[arg(long)]
    max_steps: Option<u32>,

    /// Model to use
    #[arg(long)]
    model: Option<String>,

    /// Base URL for an OpenAI-compatible endpoint
    #[arg(long)]
    base_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect configured sessions, print their states and capabilities, then disconnect
    Servers,
}

impl Args {
    /// 명령행 옵션을 설정 위에 덮어씀
    fn apply(&self, config: &mut OrcaConfig) {
        if let Some(steps) = self.max_steps {
            config.agent.max_steps = steps;
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.llm.base_url = base_url.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging (stdout는 결과 전용)
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Load configuration
    let mut config = OrcaConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    if let Some(Command::Servers) = args.command {
        return cli::list_servers(&config).await;
    }

    let prompt = match args.prompt {
        Some(prompt) => prompt,
        None => cli::read_prompt().await?,
    };
    if prompt.trim().is_empty() {
        anyhow::bail!("No prompt given");
    }

    let report = cli::run_once(&config, &prompt).await?;
    if !report.outcome.is_done() {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prompt_and_overrides() {
        let args = Args::try_parse_from([
            "orca",
            "summarize README.md",
            "--max-steps",
            "5",
            "--model",
            "gpt-4o-mini",
            "--base-url",
            "http://localhost:11434/v1",
        ])
        .unwrap();

        assert_eq!(args.prompt.as_deref(), Some("summarize README.md"));
        assert!(args.command.is_none());

        let mut config = OrcaConfig::default();
        args.apply(&mut config);
        assert_eq!(config.agent.max_steps, 5);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_parse_servers_subcommand() {
        let args = Args::try_parse_from(["orca", "--debug", "servers"]).unwrap();
        assert!(matches!(args.command, Some(Command::Servers)));
        assert!(args.debug);
        assert!(args.prompt.is_none());
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let args = Args::try_parse_from(["orca"]).unwrap();
        let mut config = OrcaConfig::default();
        let before = config.agent.max_steps;
        args.apply(&mut config);
        assert_eq!(config.agent.max_steps, before);
    }
}
