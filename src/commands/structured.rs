use anyhow::Context;
use clap::ArgMatches;
use envelope_runtime::language_model::{self, CallOptions, PromptMessage};
use envelope_runtime::LanguageModel;

use super::{prompt_arg, Settings};

pub async fn run(matches: &ArgMatches, settings: &Settings) -> anyhow::Result<()> {
    let schema_path = matches
        .get_one::<String>("schema")
        .context("--schema is required")?;
    let schema_text = std::fs::read_to_string(schema_path)
        .with_context(|| format!("failed to read schema file {}", schema_path))?;
    let schema: serde_json::Value = serde_json::from_str(&schema_text)
        .with_context(|| format!("schema file {} is not valid JSON", schema_path))?;
    let prompt = prompt_arg(matches)?;

    let model = language_model::cli_model(settings.tool, settings.model(), &settings.config);
    tracing::info!(
        tool = %settings.tool,
        model = model.model_id(),
        "Sending structured prompt"
    );

    let result = model
        .do_generate(CallOptions::object_json(
            vec![PromptMessage::user(prompt)],
            schema,
        ))
        .await?;

    let value: serde_json::Value = serde_json::from_str(&result.text)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
