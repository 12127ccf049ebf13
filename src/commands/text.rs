use std::io::Write;
use std::sync::Arc;

use clap::ArgMatches;
use envelope_runtime::language_model::{self, CallOptions, PromptMessage, StreamPart};
use envelope_runtime::{CliClient, GenerateTextArgs, LanguageModel, ToolClient};
use futures::StreamExt;

use super::{prompt_arg, Settings};

pub async fn run(matches: &ArgMatches, settings: &Settings) -> anyhow::Result<()> {
    let prompt = prompt_arg(matches)?;

    if matches.get_flag("stream") {
        let model = language_model::CliLanguageModel::new(Arc::new(ToolClient::from_config(
            settings.tool,
            &settings.config,
        )));
        let mut result = model
            .do_stream(CallOptions::regular(vec![PromptMessage::user(prompt)]))
            .await?;

        let mut stdout = std::io::stdout();
        while let Some(part) = result.stream.next().await {
            match part {
                StreamPart::TextDelta { text_delta } => {
                    stdout.write_all(text_delta.as_bytes())?;
                    stdout.flush()?;
                }
                StreamPart::Finish { finish_reason, .. } => {
                    tracing::debug!(?finish_reason, "Stream finished");
                }
            }
        }
        writeln!(stdout)?;
        return Ok(());
    }

    let client = ToolClient::from_config(settings.tool, &settings.config);
    tracing::info!(tool = %client.tool(), model = client.model(), "Sending text prompt");
    let response = client.text(GenerateTextArgs::new(prompt)).await?;
    println!("{}", response.text);
    Ok(())
}
