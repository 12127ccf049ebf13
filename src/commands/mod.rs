pub mod health;
pub mod structured;
pub mod text;

use std::io::Read;
use std::time::Duration;

use anyhow::Context;
use clap::ArgMatches;
use envelope_runtime::{CliTool, EnvelopeConfig};

/// Configuration for one command: file, then `ENVELOPE_*` variables, then
/// command-line flags.
pub struct Settings {
    pub tool: CliTool,
    pub config: EnvelopeConfig,
}

impl Settings {
    pub fn load(matches: &ArgMatches) -> anyhow::Result<Self> {
        let tool: CliTool = matches
            .get_one::<String>("tool")
            .map(String::as_str)
            .unwrap_or("claude-code")
            .parse()
            .map_err(anyhow::Error::msg)?;

        let mut config = match matches.get_one::<String>("config") {
            Some(path) => EnvelopeConfig::from_file(path)
                .with_context(|| format!("failed to load config from {}", path))?,
            None => EnvelopeConfig::default(),
        };
        config.apply_env_overrides()?;

        let model = matches.get_one::<String>("model").cloned();
        let timeout = matches
            .get_one::<u64>("timeout")
            .map(|secs| Duration::from_secs(*secs));
        match tool {
            CliTool::ClaudeCode => {
                config.claude_code.model = model.or(config.claude_code.model.take());
                config.claude_code.timeout = timeout.or(config.claude_code.timeout);
            }
            CliTool::Codex => {
                config.codex.model = model.or(config.codex.model.take());
                config.codex.timeout = timeout.or(config.codex.timeout);
            }
        }

        config.validate()?;
        Ok(Self { tool, config })
    }

    /// Log to stderr; stdout carries only results.
    pub fn init_tracing(&self) {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&self.config.logging.level));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Model the selected backend will be invoked with.
    pub fn model(&self) -> String {
        match self.tool {
            CliTool::ClaudeCode => self.config.claude_code.resolve().model,
            CliTool::Codex => self.config.codex.resolve().model,
        }
    }
}

/// The prompt argument, reading stdin when it is `-`.
pub fn prompt_arg(matches: &ArgMatches) -> anyhow::Result<String> {
    let prompt = matches
        .get_one::<String>("prompt")
        .context("a prompt is required")?;
    if prompt != "-" {
        return Ok(prompt.clone());
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read prompt from stdin")?;
    Ok(buf)
}
