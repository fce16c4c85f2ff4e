//! Shared test doubles for router tests.

use async_trait::async_trait;
use fnrouter_core::capability::{Capability, CapabilityArgs, CapabilityOutput, ParamKind, ParamSpec};
use fnrouter_core::error::{CapabilityError, ProviderError};
use fnrouter_core::message::Message;
use fnrouter_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A provider that replays scripted payloads and records every request.
///
/// Once the script runs out it repeats the last payload, which makes
/// "always continue" models a one-liner.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    last: Mutex<Option<String>>,
    requests: Mutex<Vec<ProviderRequest>>,
    /// Stream chunk size, in chars
    chunk_size: usize,
}

impl ScriptedProvider {
    pub fn new<I, S>(payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(payloads.into_iter().map(|p| Ok(p.into())).collect()),
            last: Mutex::new(None),
            requests: Mutex::new(vec![]),
            chunk_size: 4,
        }
    }

    /// Queue a provider failure after the current script.
    pub fn then_fail(self, error: ProviderError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next(&self, request: ProviderRequest) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let mut last = self.last.lock().unwrap();
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(payload)) => {
                *last = Some(payload.clone());
                Ok(payload)
            }
            Some(Err(e)) => Err(e),
            None => last.clone().ok_or_else(|| ProviderError::ApiError {
                status_code: 500,
                message: "script is empty".into(),
            }),
        }
    }
}

fn usage() -> Usage {
    Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let payload = self.next(request)?;
        Ok(ProviderResponse {
            message: Message::assistant(payload),
            usage: Some(usage()),
            model: "scripted-model".into(),
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let payload = self.next(request)?;
        let chars: Vec<char> = payload.chars().collect();
        let (tx, rx) = tokio::sync::mpsc::channel(chars.len() / self.chunk_size + 2);
        for piece in chars.chunks(self.chunk_size) {
            let _ = tx
                .send(Ok(StreamChunk {
                    content: Some(piece.iter().collect()),
                    ..Default::default()
                }))
                .await;
        }
        let _ = tx
            .send(Ok(StreamChunk {
                content: None,
                done: true,
                usage: Some(usage()),
            }))
            .await;
        Ok(rx)
    }
}

/// A capability that records its bound arguments and returns fixed text.
#[derive(Clone)]
pub struct RecordingCapability {
    name: String,
    description: String,
    params: Vec<ParamSpec>,
    reply: Result<String, String>,
    delay: Duration,
    panic_with: Option<String>,
    calls: Arc<Mutex<Vec<CapabilityArgs>>>,
}

impl RecordingCapability {
    pub fn new(name: &str, params: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: format!("Test capability {name}"),
            params: params
                .iter()
                .map(|p| ParamSpec::required(*p, ParamKind::Any, ""))
                .collect(),
            reply: Ok(format!("{name} ok")),
            delay: Duration::ZERO,
            panic_with: None,
            calls: Arc::new(Mutex::new(vec![])),
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.into();
        self
    }

    pub fn typed(mut self, params: Vec<ParamSpec>) -> Self {
        self.params = params;
        self
    }

    pub fn replying(mut self, text: &str) -> Self {
        self.reply = Ok(text.into());
        self
    }

    pub fn failing(mut self, reason: &str) -> Self {
        self.reply = Err(reason.into());
        self
    }

    pub fn panicking(mut self, message: &str) -> Self {
        self.panic_with = Some(message.into());
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Handle to the recorded calls; survives moving the capability into a registry.
    pub fn calls(&self) -> Arc<Mutex<Vec<CapabilityArgs>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl Capability for RecordingCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        self.params.clone()
    }

    async fn invoke(&self, args: CapabilityArgs) -> Result<CapabilityOutput, CapabilityError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.panic_with {
            panic!("{message}");
        }
        self.calls.lock().unwrap().push(args);
        match &self.reply {
            Ok(text) => Ok(CapabilityOutput::text(text.clone())),
            Err(reason) => Err(CapabilityError::failed(&self.name, reason)),
        }
    }
}
