use std::sync::Arc;

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::scheduler::MonitorScheduler;

/// Execute the `run` command: schedule every configured creditor and wait
/// for Ctrl-C.
pub async fn execute(config: &MonitorConfig) -> Result<()> {
    if config.creditors.is_empty() {
        println!("No creditors configured.");
        println!("Add [[creditor]] entries to the configuration file.");
        return Ok(());
    }

    let pipeline = Arc::new(config.build_pipeline().await?);
    let scheduler = MonitorScheduler::new(pipeline);

    for creditor in &config.creditors {
        scheduler.register(creditor.clone()).await?;
    }

    println!(
        "Monitoring {} creditor(s). Press Ctrl-C to stop.",
        config.creditors.len()
    );
    tokio::signal::ctrl_c().await?;

    scheduler.shutdown().await;

    let stats = scheduler.stats().await;
    println!(
        "Stopped after {} cycle(s): {} failed, {} change(s), {} escalation(s)",
        stats.cycles_completed + stats.cycles_failed,
        stats.cycles_failed,
        stats.changes_detected,
        stats.escalations_run,
    );
    Ok(())
}
