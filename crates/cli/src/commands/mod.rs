pub mod capabilities;
pub mod config_cmd;
pub mod doctor;
pub mod onboard;
pub mod prompt;
pub mod run;

use fnrouter_capabilities::registry_from_config;
use fnrouter_config::AppConfig;
use fnrouter_core::capability::CapabilityRegistry;
use fnrouter_core::provider::Provider;
use std::path::Path;
use std::sync::Arc;

/// The default provider and the built-in registry for `config`.
pub(crate) fn build_runtime(
    config: &AppConfig,
) -> Result<(Arc<dyn Provider>, Arc<CapabilityRegistry>), Box<dyn std::error::Error>> {
    let providers = fnrouter_providers::build_from_config(config);
    let provider = providers
        .default()
        .ok_or("No default provider configured")?;
    let registry = registry_from_config(
        &config.capabilities,
        provider.clone(),
        config.active_model(),
    );
    Ok((provider, Arc::new(registry)))
}

/// Read a workflow rules file.
pub(crate) fn read_rules(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read rules file {}: {e}", path.display()).into())
}
