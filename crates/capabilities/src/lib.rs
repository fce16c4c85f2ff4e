//! Built-in capabilities for fnrouter.
//!
//! Capabilities give the router the ability to act on the machine: create
//! folders and files, run commands, open applications, wait, fetch a URL, and
//! summarize text with a second model call.

pub mod fetch;
pub mod filesystem;
pub mod path_policy;
pub mod process;
pub mod sleep;
pub mod summarize;

use fnrouter_config::CapabilitiesConfig;
use fnrouter_core::capability::CapabilityRegistry;
use fnrouter_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub use fetch::FetchUrl;
pub use filesystem::{CreateFile, CreateFolder};
pub use path_policy::{PathPolicy, PathValidationError};
pub use process::{OpenApp, RunCommand};
pub use sleep::Sleep;
pub use summarize::DescribeAndSummarise;

/// Names of every built-in capability, in prompt order.
pub const BUILTIN_NAMES: &[&str] = &[
    "createFolder",
    "createFile",
    "openApp",
    "runCommand",
    "sleep",
    "fetchUrl",
    "describeAndSummarise",
];

/// Build a registry with the built-ins enabled in `config`.
///
/// `provider` and `model` back `describeAndSummarise`; `summary_model`
/// overrides the model when set. Unknown names are skipped with a warning.
pub fn registry_from_config(
    config: &CapabilitiesConfig,
    provider: Arc<dyn Provider>,
    model: &str,
) -> CapabilityRegistry {
    let policy = PathPolicy::new(config.allowed_roots.clone(), config.forbidden_paths.clone());
    let mut registry = CapabilityRegistry::new();

    for name in &config.enabled {
        match name.as_str() {
            "createFolder" => registry.register(Box::new(CreateFolder::new(policy.clone()))),
            "createFile" => registry.register(Box::new(CreateFile::new(policy.clone()))),
            "openApp" => registry.register(Box::new(OpenApp::new(Duration::from_millis(
                config.launch_delay_ms,
            )))),
            "runCommand" => {
                registry.register(Box::new(RunCommand::new(config.allowed_commands.clone())))
            }
            "sleep" => registry.register(Box::new(Sleep::new(config.max_sleep_ms))),
            "fetchUrl" => registry.register(Box::new(FetchUrl::new(Duration::from_secs(
                config.fetch_timeout_secs,
            )))),
            "describeAndSummarise" => {
                let summary_model = config.summary_model.as_deref().unwrap_or(model);
                registry.register(Box::new(DescribeAndSummarise::new(
                    provider.clone(),
                    summary_model,
                )))
            }
            other => warn!(capability = %other, "Unknown built-in capability, skipping"),
        }
    }

    registry
}
