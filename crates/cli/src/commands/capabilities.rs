//! `fnrouter capabilities`: List the capabilities the router can call.

use fnrouter_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let (_, registry) = super::build_runtime(&config)?;

    println!("🧰 Capabilities ({})\n", registry.len());
    if registry.is_empty() {
        println!("  (none enabled; check [capabilities].enabled)");
        return Ok(());
    }
    for capability in registry.iter() {
        println!("  {}", capability.signature());
        println!("      {}", capability.description());
    }
    Ok(())
}
