//! `fnrouter prompt`: Print the system prompt a run starts with.

use fnrouter_agent::build_system_prompt;
use fnrouter_config::AppConfig;
use std::path::PathBuf;

pub async fn run(rules: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let (_, registry) = super::build_runtime(&config)?;

    // A rules file replaces the configured workflow rules
    let rules = match rules {
        Some(path) => Some(super::read_rules(&path)?),
        None => config.router.workflow_rules.clone(),
    };
    println!("{}", build_system_prompt(&registry, rules.as_deref()));
    Ok(())
}
