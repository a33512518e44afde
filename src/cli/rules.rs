use crate::config::MonitorConfig;
use crate::error::Result;

/// Execute the `rules` command: print the active rule table in order.
pub fn execute(config: &MonitorConfig) -> Result<()> {
    let table = config.rule_table()?;

    if table.is_empty() {
        println!("Rule table is empty.");
        return Ok(());
    }

    println!("{:<4} {:<24} {:<10} DESCRIPTION", "#", "RULE", "SEVERITY");
    for (idx, rule) in table.rules().enumerate() {
        println!(
            "{:<4} {:<24} {:<10} {}",
            idx + 1,
            rule.name,
            rule.severity.to_string(),
            rule.description,
        );
        if let Some(reference) = &rule.legal_reference {
            println!("{:<40} {}", "", reference);
        }
    }

    println!("\n{} rule(s) total", table.len());
    Ok(())
}
