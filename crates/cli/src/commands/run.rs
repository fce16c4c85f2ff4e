//! `fnrouter run`: Route one request through the built-in capabilities.

use clap::Args;
use fnrouter_agent::{ActionRouter, CancellationToken, RuleHints, RunReport};
use fnrouter_config::AppConfig;
use fnrouter_core::event::{DomainEvent, EventBus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// The request handed to the model
    pub request: String,

    /// Step ceiling for this run
    #[arg(long)]
    pub max_steps: Option<u32>,

    /// Query the model in streaming mode
    #[arg(long)]
    pub stream: bool,

    /// Model override
    #[arg(short, long)]
    pub model: Option<String>,

    /// Hint template variable, e.g. `--var url=https://example.com`
    #[arg(long = "var", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    /// Workflow rules file appended to the system prompt
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Print the step records as JSON
    #[arg(long)]
    pub json: bool,

    /// Print the full conversation after the run
    #[arg(long)]
    pub transcript: bool,
}

/// Parse a `key=value` pair.
pub(crate) fn parse_var(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(model) = &args.model {
        config.override_model(model);
    }

    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!("❌ No API key configured.");
        eprintln!("   Set FNROUTER_API_KEY or MISTRAL_API_KEY, or run `fnrouter onboard`.");
        return Err("missing API key".into());
    }

    let (provider, registry) = super::build_runtime(&config)?;
    debug!(
        provider = %config.default_provider,
        capabilities = registry.len(),
        vars = args.vars.len(),
        "Runtime ready"
    );

    let hints = RuleHints::from_config(&config.hints).with_vars(args.vars.iter().cloned());
    let event_bus = Arc::new(EventBus::default());

    let mut router = ActionRouter::from_config(provider, registry, &config)
        .with_hints(Arc::new(hints))
        .with_event_bus(event_bus.clone());
    if let Some(max) = args.max_steps {
        router = router.with_max_steps(max);
    }
    if args.stream {
        router = router.with_streaming(true);
    }
    if let Some(path) = &args.rules {
        router = router.with_workflow_rules(super::read_rules(path)?);
    }

    eprintln!(
        "🔀 fnrouter — {} via {} (max {} steps)\n",
        router.model(),
        config.default_provider,
        router.max_steps()
    );

    let mut events = event_bus.subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.as_ref() {
                DomainEvent::CapabilityInvoked {
                    step,
                    capability,
                    success,
                    duration_ms,
                    ..
                } => {
                    let mark = if *success { "✅" } else { "⚠️ " };
                    eprintln!("  {mark} step {step}: {capability} ({duration_ms}ms)");
                }
                DomainEvent::RunFinished { .. } => break,
                _ => {}
            }
        }
    });

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Cancelling...");
            on_signal.cancel();
        }
    });

    let report = router.run_with_cancel(&args.request, cancel).await;
    finish_progress(progress).await;

    print_report(&report, &args)?;
    report.into_result()?;
    Ok(())
}

/// Wait for the progress reporter, logging instead of failing if it died.
async fn finish_progress(progress: JoinHandle<()>) -> bool {
    match progress.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Progress reporter stopped abnormally");
            false
        }
    }
}

fn print_report(report: &RunReport, args: &RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.steps)?);
    } else {
        println!();
        for step in &report.steps {
            println!(
                "[{}] {}({}) status={}",
                step.index,
                step.action.function,
                serde_json::Value::Object(step.action.args.clone()),
                step.action.status
            );
            println!("    {}", step.result.trim_end());
            if let Some(hint) = &step.hint {
                println!("    hint: {hint}");
            }
        }
    }

    if args.transcript {
        println!("\n--- transcript ---");
        for message in report.conversation.messages() {
            println!("[{}] {}", message.role.as_str(), message.content);
        }
    }

    let tokens = report.usage.total_tokens;
    if report.is_complete() {
        eprintln!("\n🎉 Done in {} step(s), {tokens} tokens", report.steps_taken());
    } else {
        eprintln!(
            "\n❌ Stopped after {} step(s), {tokens} tokens: {}",
            report.steps_taken(),
            report.stop_reason
        );
    }
    Ok(())
}
