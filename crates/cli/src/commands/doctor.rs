//! `fnrouter doctor`: Diagnose config and provider health.

use fnrouter_capabilities::BUILTIN_NAMES;
use fnrouter_config::AppConfig;
use std::time::Duration;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 fnrouter Doctor");
    println!("==================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file, using defaults (run `fnrouter onboard`)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  1 blocking issue found.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  ✅ API key configured");
    } else if config.default_provider == "ollama" {
        println!("  ✅ Local provider, no API key needed");
    } else {
        println!("  ⚠️  No API key; add api_key to config.toml or export MISTRAL_API_KEY");
        issues += 1;
    }

    let unknown: Vec<&str> = config
        .capabilities
        .enabled
        .iter()
        .map(String::as_str)
        .filter(|name| !BUILTIN_NAMES.contains(name))
        .collect();
    if unknown.is_empty() {
        println!(
            "  ✅ {} capabilities enabled",
            config.capabilities.enabled.len()
        );
    } else {
        println!("  ⚠️  Unknown capabilities enabled: {}", unknown.join(", "));
        issues += 1;
    }

    let (provider, _) = super::build_runtime(&config)?;
    match tokio::time::timeout(HEALTH_TIMEOUT, provider.health_check()).await {
        Ok(Ok(true)) => println!("  ✅ Provider '{}' reachable", config.default_provider),
        Ok(Ok(false)) => {
            println!("  ⚠️  Provider '{}' answered but is unhealthy", config.default_provider);
            issues += 1;
        }
        Ok(Err(e)) => {
            println!("  ❌ Provider '{}' check failed: {e}", config.default_provider);
            issues += 1;
        }
        Err(_) => {
            println!(
                "  ❌ Provider '{}' did not answer within {}s",
                config.default_provider,
                HEALTH_TIMEOUT.as_secs()
            );
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }
    Ok(())
}
