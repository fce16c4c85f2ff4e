//! The action-router loop.
//!
//! Each step sends the whole conversation to the model, parses exactly one
//! action from the reply, invokes the named capability, and folds the result
//! back as a user turn. The run stops on `done`, on a reply that is not a
//! valid action, on an unknown capability name, at the step ceiling, on a
//! provider failure, or when cancelled.

use chrono::Utc;
use fnrouter_config::AppConfig;
use fnrouter_core::capability::{CapabilityOutput, CapabilityRegistry};
use fnrouter_core::error::{CapabilityError, ProviderError};
use fnrouter_core::event::{DomainEvent, EventBus};
use fnrouter_core::message::{Conversation, Message};
use fnrouter_core::provider::{Provider, ProviderRequest, Usage, collect_stream};
use serde::Serialize;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::{Action, Status, normalize_fences, parse_action};
use crate::hints::{HintPolicy, NoHints, RuleHints};
use crate::prompt::build_system_prompt;

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// The model marked an action `done` and it ran
    Done,
    /// The reply was not exactly one valid action object
    MalformedResponse { raw: String, reason: String },
    /// The reply named a capability that is not registered
    UnknownCapability { name: String },
    /// The step ceiling was reached without `done`
    StepCeilingExceeded { steps: u32 },
    /// The caller cancelled the run
    Cancelled,
    /// The model request itself failed
    ProviderFailed { message: String },
}

impl StopReason {
    /// Stable label for events and logs.
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::Done => "done",
            StopReason::MalformedResponse { .. } => "malformed_response",
            StopReason::UnknownCapability { .. } => "unknown_capability",
            StopReason::StepCeilingExceeded { .. } => "step_ceiling_exceeded",
            StopReason::Cancelled => "cancelled",
            StopReason::ProviderFailed { .. } => "provider_failed",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Done => write!(f, "workflow complete"),
            StopReason::MalformedResponse { raw, reason } => {
                write!(f, "malformed model response ({reason}): {raw}")
            }
            StopReason::UnknownCapability { name } => write!(f, "unknown capability '{name}'"),
            StopReason::StepCeilingExceeded { steps } => {
                write!(f, "step ceiling reached after {steps} steps without done")
            }
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::ProviderFailed { message } => write!(f, "provider failed: {message}"),
        }
    }
}

/// A run that did not finish with `done`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RouterError {
    #[error("malformed model response ({reason}): {raw}")]
    MalformedResponse { raw: String, reason: String },

    #[error("unknown capability '{name}'")]
    UnknownCapability { name: String },

    #[error("step ceiling reached after {steps} steps without done")]
    StepCeilingExceeded { steps: u32 },

    #[error("run cancelled")]
    Cancelled,

    #[error("provider failed: {0}")]
    Provider(String),
}

/// One executed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// 1-based step number
    pub index: u32,
    pub action: Action,
    /// Folded result text, without the result prefix
    pub result: String,
    pub success: bool,
    pub hint: Option<String>,
    pub duration_ms: u64,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub conversation: Conversation,
    pub steps: Vec<StepRecord>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl RunReport {
    /// True only when the run ended with `done`.
    pub fn is_complete(&self) -> bool {
        self.stop_reason == StopReason::Done
    }

    pub fn steps_taken(&self) -> usize {
        self.steps.len()
    }

    /// Turn any stop other than `done` into an error.
    pub fn into_result(self) -> Result<Self, RouterError> {
        let error = match &self.stop_reason {
            StopReason::Done => return Ok(self),
            StopReason::MalformedResponse { raw, reason } => RouterError::MalformedResponse {
                raw: raw.clone(),
                reason: reason.clone(),
            },
            StopReason::UnknownCapability { name } => {
                RouterError::UnknownCapability { name: name.clone() }
            }
            StopReason::StepCeilingExceeded { steps } => {
                RouterError::StepCeilingExceeded { steps: *steps }
            }
            StopReason::Cancelled => RouterError::Cancelled,
            StopReason::ProviderFailed { message } => RouterError::Provider(message.clone()),
        };
        Err(error)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

struct ModelReply {
    text: String,
    usage: Option<Usage>,
    model: String,
}

/// Drives one model through a bounded sequence of routed actions.
pub struct ActionRouter {
    provider: Arc<dyn Provider>,
    registry: Arc<CapabilityRegistry>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_steps: u32,
    streaming: bool,
    hints: Arc<dyn HintPolicy>,
    event_bus: Arc<EventBus>,
    workflow_rules: Option<String>,
    result_prefix: String,
}

impl ActionRouter {
    pub const DEFAULT_MAX_STEPS: u32 = 15;

    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<CapabilityRegistry>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            registry,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_steps: Self::DEFAULT_MAX_STEPS,
            streaming: false,
            hints: Arc::new(NoHints),
            event_bus: Arc::new(EventBus::default()),
            workflow_rules: None,
            result_prefix: "Result: ".into(),
        }
    }

    /// Build a router with model, sampling, loop and hint settings from config.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        registry: Arc<CapabilityRegistry>,
        config: &AppConfig,
    ) -> Self {
        let mut router = Self::new(provider, registry, config.active_model())
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_max_steps(config.router.max_steps)
            .with_streaming(config.router.stream)
            .with_result_prefix(&config.router.result_prefix);
        if let Some(rules) = &config.router.workflow_rules {
            router = router.with_workflow_rules(rules);
        }
        if !config.hints.is_empty() {
            router = router.with_hints(Arc::new(RuleHints::from_config(&config.hints)));
        }
        router
    }

    /// Set the step ceiling. Values below 1 are raised to 1.
    pub fn with_max_steps(mut self, max: u32) -> Self {
        self.max_steps = max.max(1);
        self
    }

    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.streaming = enabled;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_hints(mut self, hints: Arc<dyn HintPolicy>) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_workflow_rules(mut self, rules: impl Into<String>) -> Self {
        self.workflow_rules = Some(rules.into());
        self
    }

    pub fn with_result_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.result_prefix = prefix.into();
        self
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The system turn every run starts with.
    pub fn system_prompt(&self) -> String {
        build_system_prompt(&self.registry, self.workflow_rules.as_deref())
    }

    /// Invoke the action's capability, turning a panic into a capability failure.
    async fn invoke_isolated(&self, action: &Action) -> Result<CapabilityOutput, CapabilityError> {
        AssertUnwindSafe(self.registry.invoke(&action.function, &action.args))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                warn!(capability = %action.function, panic = %message, "Capability panicked");
                Err(CapabilityError::failed(
                    &action.function,
                    format!("capability panicked: {message}"),
                ))
            })
    }

    /// Run one request to completion.
    pub async fn run(&self, request: &str) -> RunReport {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Run one request, stopping early when `cancel` fires.
    ///
    /// Cancellation is observed while waiting on the model and while a
    /// capability runs. An interrupted step appends nothing.
    pub async fn run_with_cancel(&self, request: &str, cancel: CancellationToken) -> RunReport {
        let mut conversation = Conversation::seeded(self.system_prompt(), request);
        let conversation_id = conversation.id.to_string();
        let mut steps: Vec<StepRecord> = Vec::new();
        let mut usage = Usage::default();

        info!(
            conversation_id = %conversation_id,
            capabilities = self.registry.len(),
            max_steps = self.max_steps,
            streaming = self.streaming,
            "Starting routed run"
        );
        self.event_bus.publish(DomainEvent::RunStarted {
            conversation_id: conversation_id.clone(),
            capabilities: self.registry.len(),
            max_steps: self.max_steps,
            timestamp: Utc::now(),
        });

        let mut step: u32 = 0;
        let stop_reason = loop {
            if step >= self.max_steps {
                break StopReason::StepCeilingExceeded { steps: step };
            }
            step += 1;
            debug!(
                conversation_id = %conversation_id,
                step,
                turns = conversation.len(),
                approx_tokens = conversation.estimated_tokens(),
                "Querying model"
            );

            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => break StopReason::Cancelled,
                reply = self.query_model(&conversation) => reply,
            };
            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(step, error = %e, "Model request failed");
                    break StopReason::ProviderFailed {
                        message: e.to_string(),
                    };
                }
            };

            if let Some(u) = &reply.usage {
                usage.add(u);
            }
            self.event_bus.publish(DomainEvent::ModelResponded {
                conversation_id: conversation_id.clone(),
                step,
                model: reply.model.clone(),
                tokens_used: reply.usage.map(|u| u.total_tokens).unwrap_or(0),
                timestamp: Utc::now(),
            });

            let payload = normalize_fences(&reply.text);
            debug!(step, payload = %payload, "Cleaned model output");

            let action = match parse_action(&payload) {
                Ok(action) => action,
                Err(e) => {
                    warn!(step, payload = %reply.text, error = %e, "Invalid action from model");
                    break StopReason::MalformedResponse {
                        raw: reply.text,
                        reason: e.to_string(),
                    };
                }
            };

            if !self.registry.contains(&action.function) {
                warn!(step, capability = %action.function, "Unknown capability");
                break StopReason::UnknownCapability {
                    name: action.function,
                };
            }

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break StopReason::Cancelled,
                outcome = self.invoke_isolated(&action) => outcome,
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            let (result, success, hint) = match outcome {
                Ok(output) => {
                    let hint = self.hints.hint(&action.function, &output);
                    (output.text, true, hint)
                }
                Err(e) => {
                    warn!(step, capability = %action.function, error = %e, "Capability failed");
                    (format!("Error: {e}"), false, None)
                }
            };

            conversation.push(Message::assistant(&payload));
            conversation.push(Message::user(format!("{}{result}", self.result_prefix)));
            if let Some(hint) = &hint {
                debug!(step, hint = %hint, "Appending routing hint");
                conversation.push(Message::user(hint));
            }

            info!(
                step,
                capability = %action.function,
                status = %action.status,
                success,
                duration_ms,
                "Ran capability"
            );
            self.event_bus.publish(DomainEvent::CapabilityInvoked {
                conversation_id: conversation_id.clone(),
                step,
                capability: action.function.clone(),
                success,
                duration_ms,
                timestamp: Utc::now(),
            });

            let done = action.status == Status::Done;
            steps.push(StepRecord {
                index: step,
                action,
                result,
                success,
                hint,
                duration_ms,
            });

            if done {
                break StopReason::Done;
            }
        };

        match &stop_reason {
            StopReason::Done => info!(steps = steps.len(), "Workflow complete"),
            other => warn!(steps = steps.len(), reason = %other, "Run stopped before done"),
        }
        self.event_bus.publish(DomainEvent::RunFinished {
            conversation_id,
            steps: steps.len() as u32,
            reason: stop_reason.label().into(),
            timestamp: Utc::now(),
        });

        RunReport {
            conversation,
            steps,
            stop_reason,
            usage,
        }
    }

    async fn query_model(&self, conversation: &Conversation) -> Result<ModelReply, ProviderError> {
        let mut request = ProviderRequest::new(&self.model, conversation.messages().to_vec());
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        request.stream = self.streaming;

        if self.streaming {
            let rx = self.provider.stream(request).await?;
            let (text, usage) = collect_stream(rx).await?;
            Ok(ModelReply {
                text,
                usage,
                model: self.model.clone(),
            })
        } else {
            let response = self.provider.complete(request).await?;
            Ok(ModelReply {
                text: response.message.content,
                usage: response.usage,
                model: response.model,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{RecordingCapability, ScriptedProvider};
    use fnrouter_core::capability::{ParamKind, ParamSpec};
    use fnrouter_core::message::Role;
    use serde_json::json;
    use std::time::Duration;

    fn action(function: &str, args: serde_json::Value, status: &str) -> String {
        json!({ "function": function, "args": args, "status": status }).to_string()
    }

    fn router(provider: Arc<ScriptedProvider>, registry: CapabilityRegistry) -> ActionRouter {
        ActionRouter::new(provider, Arc::new(registry), "scripted-model")
    }

    #[tokio::test]
    async fn well_formed_action_invokes_with_exact_args_and_appends_two_turns() {
        let folder = RecordingCapability::new("createFolder", &["name"]);
        let calls = folder.calls();
        let provider = Arc::new(ScriptedProvider::new([
            action("createFolder", json!({"name": "test123"}), "continue"),
            action("createFolder", json!({"name": "other"}), "done"),
        ]));
        let r = router(provider.clone(), CapabilityRegistry::new().with(folder));

        let report = r.run("Create a folder test123").await;
        assert!(report.is_complete());

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].get("name"), Some(&json!("test123")));
        assert_eq!(calls[0].len(), 1);

        // Second request = system + user + exactly two folded turns
        let requests = provider.requests();
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[1].messages[2].role, Role::Assistant);
        assert_eq!(
            requests[1].messages[2].content,
            action("createFolder", json!({"name": "test123"}), "continue")
        );
        assert_eq!(requests[1].messages[3].role, Role::User);
        assert_eq!(requests[1].messages[3].content, "Result: createFolder ok");
    }

    #[tokio::test]
    async fn each_request_sees_full_history() {
        let provider = Arc::new(ScriptedProvider::new([
            action("noop", json!({}), "continue"),
            action("noop", json!({}), "continue"),
            action("noop", json!({}), "done"),
        ]));
        let r = router(
            provider.clone(),
            CapabilityRegistry::new().with(RecordingCapability::new("noop", &[])),
        );

        let report = r.run("go").await;
        let sizes: Vec<usize> = provider.requests().iter().map(|r| r.messages.len()).collect();
        assert_eq!(sizes, vec![2, 4, 6]);
        assert_eq!(report.conversation.len(), 8);
        for (i, req) in provider.requests().iter().enumerate().skip(1) {
            let prev = &provider.requests()[i - 1];
            for (a, b) in prev.messages.iter().zip(&req.messages) {
                assert_eq!(a.content, b.content);
            }
        }
    }

    #[tokio::test]
    async fn array_payload_stops_without_invocation_or_turns() {
        let cap = RecordingCapability::new("createFolder", &["name"]);
        let calls = cap.calls();
        let one = action("createFolder", json!({"name": "a"}), "continue");
        let provider = Arc::new(ScriptedProvider::new([format!("[{one},{one}]")]));
        let r = router(provider, CapabilityRegistry::new().with(cap));

        let report = r.run("go").await;
        assert!(matches!(report.stop_reason, StopReason::MalformedResponse { .. }));
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(report.conversation.len(), 2);
        assert!(report.steps.is_empty());
    }

    #[tokio::test]
    async fn truncated_and_prose_payloads_stop() {
        for payload in [
            r#"{"function":"createFolder","args":{"name":"#.to_string(),
            "I will now create the folder for you.".to_string(),
        ] {
            let cap = RecordingCapability::new("createFolder", &["name"]);
            let calls = cap.calls();
            let provider = Arc::new(ScriptedProvider::new([payload.clone()]));
            let report = router(provider, CapabilityRegistry::new().with(cap))
                .run("go")
                .await;

            match &report.stop_reason {
                StopReason::MalformedResponse { raw, .. } => assert_eq!(raw, &payload),
                other => panic!("expected malformed, got {other:?}"),
            }
            assert!(calls.lock().unwrap().is_empty());
            assert_eq!(report.conversation.len(), 2);
        }
    }

    #[tokio::test]
    async fn unknown_capability_stops() {
        let cap = RecordingCapability::new("createFolder", &["name"]);
        let calls = cap.calls();
        let provider = Arc::new(ScriptedProvider::new([action(
            "deleteEverything",
            json!({}),
            "continue",
        )]));
        let report = router(provider.clone(), CapabilityRegistry::new().with(cap))
            .run("go")
            .await;

        assert_eq!(
            report.stop_reason,
            StopReason::UnknownCapability {
                name: "deleteEverything".into()
            }
        );
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(provider.call_count(), 1);
        assert_eq!(report.conversation.len(), 2);
    }

    #[tokio::test]
    async fn fenced_reply_dispatches_like_plain() {
        let plain = action("createFolder", json!({"name": "a"}), "done");
        let fenced = format!("```json\n{plain}\n```");

        let mut records = vec![];
        for payload in [plain.clone(), fenced] {
            let cap = RecordingCapability::new("createFolder", &["name"]);
            let calls = cap.calls();
            let provider = Arc::new(ScriptedProvider::new([payload]));
            let report = router(provider, CapabilityRegistry::new().with(cap))
                .run("go")
                .await;
            assert!(report.is_complete());
            // The assistant turn holds the normalized payload
            assert_eq!(report.conversation.messages()[2].content, plain);
            records.push((calls.lock().unwrap().clone(), report.steps[0].action.clone()));
        }
        assert_eq!(records[0], records[1]);
    }

    #[tokio::test]
    async fn always_continue_stops_at_ceiling() {
        let cap = RecordingCapability::new("noop", &[]);
        let calls = cap.calls();
        let provider = Arc::new(ScriptedProvider::new([action("noop", json!({}), "continue")]));
        let report = router(provider.clone(), CapabilityRegistry::new().with(cap))
            .with_max_steps(4)
            .run("loop forever")
            .await;

        assert_eq!(report.stop_reason, StopReason::StepCeilingExceeded { steps: 4 });
        assert!(!report.is_complete());
        assert_eq!(provider.call_count(), 4);
        assert_eq!(calls.lock().unwrap().len(), 4);
        assert_eq!(report.steps_taken(), 4);
        assert!(matches!(
            report.into_result(),
            Err(RouterError::StepCeilingExceeded { steps: 4 })
        ));
    }

    #[tokio::test]
    async fn default_ceiling_is_fifteen() {
        let provider = Arc::new(ScriptedProvider::new([action("noop", json!({}), "retry")]));
        let report = router(
            provider.clone(),
            CapabilityRegistry::new().with(RecordingCapability::new("noop", &[])),
        )
        .run("go")
        .await;
        assert_eq!(report.stop_reason, StopReason::StepCeilingExceeded { steps: 15 });
        assert_eq!(provider.call_count(), 15);
    }

    #[tokio::test]
    async fn done_on_last_allowed_step_is_complete() {
        let provider = Arc::new(ScriptedProvider::new([
            action("noop", json!({}), "continue"),
            action("noop", json!({}), "done"),
        ]));
        let report = router(
            provider,
            CapabilityRegistry::new().with(RecordingCapability::new("noop", &[])),
        )
        .with_max_steps(2)
        .run("go")
        .await;
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn retry_is_not_reinvoked_by_the_loop() {
        let cap = RecordingCapability::new("createFolder", &["name"]);
        let calls = cap.calls();
        let provider = Arc::new(ScriptedProvider::new([
            action("createFolder", json!({"name": "a"}), "retry"),
            action("createFolder", json!({"name": "b"}), "done"),
        ]));
        let report = router(provider, CapabilityRegistry::new().with(cap))
            .run("go")
            .await;
        assert!(report.is_complete());
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].get("name"), Some(&json!("b")));
    }

    #[tokio::test]
    async fn capability_failure_is_folded_and_loop_continues() {
        let failing = RecordingCapability::new("runCommand", &["command"]).failing("exit code 1: boom");
        let after = RecordingCapability::new("createFolder", &["name"]);
        let after_calls = after.calls();
        let provider = Arc::new(ScriptedProvider::new([
            action("runCommand", json!({"command": "false"}), "continue"),
            action("createFolder", json!({"name": "x"}), "done"),
        ]));
        let report = router(
            provider.clone(),
            CapabilityRegistry::new().with(failing).with(after),
        )
        .run("go")
        .await;

        assert!(report.is_complete());
        assert!(!report.steps[0].success);
        let folded = &provider.requests()[1].messages[3].content;
        assert!(folded.starts_with("Result: Error: "), "{folded}");
        assert!(folded.contains("boom"));
        assert_eq!(after_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn panicking_capability_is_folded_and_loop_continues() {
        let boom = RecordingCapability::new("boom", &[]).panicking("index out of bounds");
        let after = RecordingCapability::new("createFolder", &["name"]);
        let after_calls = after.calls();
        let provider = Arc::new(ScriptedProvider::new([
            action("boom", json!({}), "continue"),
            action("createFolder", json!({"name": "x"}), "done"),
        ]));
        let report = router(provider.clone(), CapabilityRegistry::new().with(boom).with(after))
            .run("go")
            .await;

        assert!(report.is_complete());
        assert!(!report.steps[0].success);
        assert!(report.steps[0].result.starts_with("Error: "));
        assert!(report.steps[0].result.contains("capability panicked: index out of bounds"));
        let folded = &provider.requests()[1].messages[3].content;
        assert!(folded.contains("capability panicked"), "{folded}");
        assert_eq!(after_calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }

    #[tokio::test]
    async fn invalid_arguments_are_folded_as_errors() {
        let typed = RecordingCapability::new("sleep", &[]).typed(vec![ParamSpec::required(
            "duration",
            ParamKind::Number,
            "ms",
        )]);
        let calls = typed.calls();
        let provider = Arc::new(ScriptedProvider::new([
            action("sleep", json!({"duration": "soon"}), "continue"),
            action("sleep", json!({"duration": 10}), "done"),
        ]));
        let report = router(provider, CapabilityRegistry::new().with(typed))
            .run("go")
            .await;

        assert!(report.is_complete());
        assert!(report.steps[0].result.starts_with("Error: "));
        assert!(report.steps[0].result.contains("must be of type number"));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retrieval_fallback_hint_appends_extra_turn() {
        let retrieve = RecordingCapability::new("retrieve", &["query"]).replying("");
        let raw_docs = RecordingCapability::new("getRawDocs", &["url"]).replying("<docs>");
        let raw_calls = raw_docs.calls();
        let provider = Arc::new(ScriptedProvider::new([
            action("retrieve", json!({"querry": "What is Task Decomposition?"}), "continue"),
            action("getRawDocs", json!({"url": "https://lilianweng.github.io/posts/2023-06-23-agent"}), "done"),
        ]));
        let report = router(
            provider.clone(),
            CapabilityRegistry::new().with(retrieve).with(raw_docs),
        )
        .with_hints(Arc::new(RuleHints::retrieval(
            "https://lilianweng.github.io/posts/2023-06-23-agent",
        )))
        .run("What is Task Decomposition?")
        .await;

        assert!(report.is_complete());
        let second = &provider.requests()[1].messages;
        assert_eq!(second.len(), 5);
        assert_eq!(second[3].content, "Result: ");
        assert_eq!(
            second[4].content,
            "No docs found. Use getRawDocs with url: https://lilianweng.github.io/posts/2023-06-23-agent"
        );
        assert_eq!(second[4].role, Role::User);
        assert_eq!(report.steps[0].hint.as_deref(), Some(second[4].content.as_str()));
        assert_eq!(
            raw_calls.lock().unwrap()[0].get("url"),
            Some(&json!("https://lilianweng.github.io/posts/2023-06-23-agent"))
        );
    }

    #[tokio::test]
    async fn no_hint_for_failed_step() {
        let retrieve = RecordingCapability::new("retrieve", &["query"]).failing("store offline");
        let provider = Arc::new(ScriptedProvider::new([action(
            "retrieve",
            json!({"query": "q"}),
            "done",
        )]));
        let report = router(provider, CapabilityRegistry::new().with(retrieve))
            .with_hints(Arc::new(RuleHints::retrieval("https://x")))
            .run("q")
            .await;
        assert!(report.steps[0].hint.is_none());
        assert_eq!(report.conversation.len(), 4);
    }

    #[tokio::test]
    async fn streaming_and_single_shot_runs_match() {
        let script = [
            action("createFile", json!({"path": "a.txt", "content": "abcdefghijklmnopqrstuvwxyz1"}), "continue"),
            format!("```json\n{}\n```", action("openApp", json!({"appName": "notepad"}), "done")),
        ];

        let mut transcripts = vec![];
        for streaming in [false, true] {
            let file = RecordingCapability::new("createFile", &["path", "content"]);
            let app = RecordingCapability::new("openApp", &["appName"]);
            let (file_calls, app_calls) = (file.calls(), app.calls());
            let provider = Arc::new(ScriptedProvider::new(script.clone()));
            let report = router(provider, CapabilityRegistry::new().with(file).with(app))
                .with_streaming(streaming)
                .run("write and open")
                .await;

            assert!(report.is_complete());
            let turns: Vec<(Role, String)> = report
                .conversation
                .messages()
                .iter()
                .map(|m| (m.role, m.content.clone()))
                .collect();
            transcripts.push((
                turns,
                file_calls.lock().unwrap().clone(),
                app_calls.lock().unwrap().clone(),
            ));
        }
        assert_eq!(transcripts[0], transcripts[1]);
    }

    #[tokio::test]
    async fn provider_failure_stops_run() {
        let provider = Arc::new(
            ScriptedProvider::new([action("noop", json!({}), "continue")])
                .then_fail(ProviderError::RateLimited { retry_after_secs: 5 }),
        );
        let report = router(
            provider,
            CapabilityRegistry::new().with(RecordingCapability::new("noop", &[])),
        )
        .run("go")
        .await;

        assert_eq!(report.stop_reason.label(), "provider_failed");
        assert_eq!(report.steps_taken(), 1);
        assert_eq!(report.conversation.len(), 4);
        assert!(matches!(report.into_result(), Err(RouterError::Provider(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_capability_leaves_state_folded() {
        let slow = RecordingCapability::new("sleep", &["duration"]).slow(Duration::from_secs(60));
        let slow_calls = slow.calls();
        let provider = Arc::new(ScriptedProvider::new([
            action("noop", json!({}), "continue"),
            action("sleep", json!({"duration": 60000}), "continue"),
        ]));
        let r = router(
            provider,
            CapabilityRegistry::new()
                .with(RecordingCapability::new("noop", &[]))
                .with(slow),
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let report = r.run_with_cancel("go", cancel).await;
        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.steps_taken(), 1);
        // system + user + the one completed step
        assert_eq!(report.conversation.len(), 4);
        assert_eq!(report.conversation.last().unwrap().content, "Result: noop ok");
        assert!(slow_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_start_sends_nothing() {
        let provider = Arc::new(ScriptedProvider::new([action("noop", json!({}), "done")]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = router(
            provider.clone(),
            CapabilityRegistry::new().with(RecordingCapability::new("noop", &[])),
        )
        .run_with_cancel("go", cancel)
        .await;
        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn events_trace_the_run() {
        let bus = Arc::new(EventBus::new(32));
        let mut rx = bus.subscribe();
        let provider = Arc::new(ScriptedProvider::new([action("noop", json!({}), "done")]));
        router(
            provider,
            CapabilityRegistry::new().with(RecordingCapability::new("noop", &[])),
        )
        .with_event_bus(bus.clone())
        .run("go")
        .await;

        let mut kinds = vec![];
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event.as_ref() {
                DomainEvent::RunStarted { .. } => "started".to_string(),
                DomainEvent::ModelResponded { tokens_used, .. } => format!("model:{tokens_used}"),
                DomainEvent::CapabilityInvoked { capability, .. } => format!("invoked:{capability}"),
                DomainEvent::RunFinished { reason, .. } => format!("finished:{reason}"),
            });
        }
        assert_eq!(kinds, vec!["started", "model:15", "invoked:noop", "finished:done"]);
    }

    #[tokio::test]
    async fn usage_accumulates_across_steps() {
        let provider = Arc::new(ScriptedProvider::new([
            action("noop", json!({}), "continue"),
            action("noop", json!({}), "done"),
        ]));
        let report = router(
            provider,
            CapabilityRegistry::new().with(RecordingCapability::new("noop", &[])),
        )
        .run("go")
        .await;
        assert_eq!(report.usage.total_tokens, 30);
    }

    #[tokio::test]
    async fn request_carries_sampling_settings() {
        let provider = Arc::new(ScriptedProvider::new([action("noop", json!({}), "done")]));
        router(
            provider.clone(),
            CapabilityRegistry::new().with(RecordingCapability::new("noop", &[])),
        )
        .with_temperature(0.1)
        .with_max_tokens(128)
        .with_model("mistral-small-latest")
        .run("go")
        .await;

        let request = &provider.requests()[0];
        assert_eq!(request.model, "mistral-small-latest");
        assert_eq!(request.max_tokens, Some(128));
        assert!((request.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].content, "go");
    }

    #[test]
    fn from_config_applies_router_settings() {
        let mut config = AppConfig::default();
        config.router.max_steps = 3;
        config.router.stream = true;
        config.router.workflow_rules = Some("Always start with retrieve(query).".into());
        let provider = Arc::new(ScriptedProvider::new(Vec::<String>::new()));
        let r = ActionRouter::from_config(
            provider,
            Arc::new(CapabilityRegistry::new().with(RecordingCapability::new("retrieve", &["query"]))),
            &config,
        );
        assert_eq!(r.max_steps(), 3);
        assert_eq!(r.model(), "mistral-small-latest");
        assert!(r.system_prompt().contains("Workflow rules:\nAlways start with retrieve(query)."));
    }

    #[test]
    fn stop_reason_display_names_the_cause() {
        let reason = StopReason::UnknownCapability {
            name: "fly".into(),
        };
        assert_eq!(reason.to_string(), "unknown capability 'fly'");
        assert_eq!(StopReason::StepCeilingExceeded { steps: 15 }.label(), "step_ceiling_exceeded");
    }
}
