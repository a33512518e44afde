use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};

/// Execute the `check` command: run one cycle and print the report as JSON.
pub async fn execute(creditor_id: &str, config: &MonitorConfig) -> Result<()> {
    let creditor = config
        .creditor(creditor_id)
        .ok_or_else(|| MonitorError::NotRegistered(creditor_id.to_string()))?;

    let pipeline = config.build_pipeline().await?;
    let report = pipeline.run_cycle(creditor).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
