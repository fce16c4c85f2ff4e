//! `fnrouter config`: Configuration management commands.

use fnrouter_capabilities::BUILTIN_NAMES;
use fnrouter_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let mut warnings = Vec::new();
    if !config.has_api_key() && config.default_provider != "ollama" {
        warnings.push("No API key set (set FNROUTER_API_KEY or MISTRAL_API_KEY)".to_string());
    }
    for name in &config.capabilities.enabled {
        if !BUILTIN_NAMES.contains(&name.as_str()) {
            warnings.push(format!("Unknown capability '{name}' in [capabilities].enabled"));
        }
    }
    if config.capabilities.enabled.iter().any(|n| n == "runCommand")
        && config.capabilities.allowed_commands.is_empty()
    {
        warnings.push("runCommand is enabled with no allowed_commands; any command may run".into());
    }

    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Provider:      {}", config.default_provider);
    println!("   Model:         {}", config.active_model());
    println!("   Max steps:     {}", config.router.max_steps);
    println!("   Streaming:     {}", config.router.stream);
    println!("   Hints:         {}", config.hints.len());
    println!("   Capabilities:  {}", config.capabilities.enabled.join(", "));
    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some("[REDACTED]".into());
        }
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
    Ok(())
}
