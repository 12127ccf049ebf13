use std::io::Write;

use envelope_runtime::ToolClient;

use super::Settings;

pub async fn run(settings: &Settings) -> anyhow::Result<()> {
    let client = ToolClient::from_config(settings.tool, &settings.config);
    print!("• Checking {}... ", settings.tool);
    std::io::stdout().flush()?;
    match client.health_check().await {
        Ok(version) => {
            println!("✓ {}", version);
            Ok(())
        }
        Err(e) => {
            println!("✗ not available");
            Err(e.into())
        }
    }
}
