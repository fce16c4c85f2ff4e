//! Process capabilities: `runCommand` and `openApp`.

use async_trait::async_trait;
use fnrouter_core::capability::{Capability, CapabilityArgs, CapabilityOutput, ParamKind, ParamSpec};
use fnrouter_core::error::CapabilityError;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

fn shell(command: &str) -> Command {
    if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

/// Run a shell command and return its stdout.
pub struct RunCommand {
    /// If non-empty, only these base commands are allowed.
    allowed_commands: Vec<String>,
}

impl RunCommand {
    pub fn new(allowed_commands: Vec<String>) -> Self {
        Self { allowed_commands }
    }

    /// Check `command` against the allowlist.
    ///
    /// With an allowlist set, the command must be one invocation with no
    /// shell operators.
    fn check_command(&self, command: &str) -> Result<(), String> {
        if self.allowed_commands.is_empty() {
            return Ok(());
        }

        if let Some(meta) = SHELL_METACHARACTERS.iter().find(|m| command.contains(**m)) {
            return Err(format!(
                "shell operator '{}' not allowed with a command allowlist",
                meta.escape_default()
            ));
        }

        let base_cmd = command.split_whitespace().next().unwrap_or("");
        if self.allowed_commands.iter().any(|a| a == base_cmd) {
            Ok(())
        } else {
            Err(format!("command '{base_cmd}' not in allowlist"))
        }
    }
}

/// Fragments that let one shell string run more than the allowlisted command.
const SHELL_METACHARACTERS: &[&str] = &[";", "&", "|", "`", "$(", ">", "<", "\n", "\r"];

#[async_trait]
impl Capability for RunCommand {
    fn name(&self) -> &str {
        "runCommand"
    }

    fn description(&self) -> &str {
        "Run a shell command and return its output."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required(
            "command",
            ParamKind::String,
            "The shell command to run",
        )]
    }

    async fn invoke(&self, args: CapabilityArgs) -> Result<CapabilityOutput, CapabilityError> {
        let command = args.str("command")?;

        if let Err(reason) = self.check_command(command) {
            warn!(command = %command, reason = %reason, "Command rejected");
            return Err(CapabilityError::PermissionDenied {
                capability: self.name().into(),
                reason,
            });
        }

        debug!(command = %command, "Executing shell command");

        let output = shell(command)
            .output()
            .await
            .map_err(|e| CapabilityError::failed(self.name(), e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            let detail = if stderr.is_empty() { stdout } else { stderr };
            return Err(CapabilityError::failed(
                self.name(),
                format!("exit code {code}: {detail}"),
            ));
        }

        if stderr.is_empty() {
            Ok(stdout.into())
        } else {
            Ok(format!("{stdout}\n[stderr]: {stderr}").trim().to_string().into())
        }
    }
}

/// Launch an application without waiting for it to exit.
pub struct OpenApp {
    launch_delay: Duration,
}

impl OpenApp {
    pub fn new(launch_delay: Duration) -> Self {
        Self { launch_delay }
    }

    fn launcher(app: &str) -> Command {
        if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", "", app]);
            cmd
        } else if cfg!(target_os = "macos") {
            let mut cmd = Command::new("open");
            cmd.args(["-a", app]);
            cmd
        } else {
            shell(app)
        }
    }
}

#[async_trait]
impl Capability for OpenApp {
    fn name(&self) -> &str {
        "openApp"
    }

    fn description(&self) -> &str {
        "Open an application by name (e.g. notepad, code, firefox)."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required(
            "appName",
            ParamKind::String,
            "Application name or launch command",
        )]
    }

    async fn invoke(&self, args: CapabilityArgs) -> Result<CapabilityOutput, CapabilityError> {
        let app = args.str("appName")?;

        debug!(app = %app, "Launching application");
        Self::launcher(app)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| CapabilityError::failed(self.name(), format!("error opening app: {e}")))?;

        // Give the application time to show up before the next step
        if !self.launch_delay.is_zero() {
            tokio::time::sleep(self.launch_delay).await;
        }

        Ok(format!("Opened {app}").into())
    }
}
