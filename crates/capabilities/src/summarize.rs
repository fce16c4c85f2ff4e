//! `describeAndSummarise`: a second model call that condenses text.

use async_trait::async_trait;
use fnrouter_core::capability::{Capability, CapabilityArgs, CapabilityOutput, ParamKind, ParamSpec};
use fnrouter_core::error::CapabilityError;
use fnrouter_core::message::Message;
use fnrouter_core::provider::{Provider, ProviderRequest};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub const SUMMARIZER_PROMPT: &str = "You are a helpful assistant that summarizes text.";

pub struct DescribeAndSummarise {
    provider: Arc<dyn Provider>,
    model: String,
}

impl DescribeAndSummarise {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

/// Flatten whatever the model passed into plain text.
///
/// Strings pass through; arrays of documents join their `pageContent` (or
/// string elements) with blank lines; anything else is serialized as JSON.
fn text_to_summarize(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other
                    .get("pageContent")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        other => other.to_string(),
    }
}

#[async_trait]
impl Capability for DescribeAndSummarise {
    fn name(&self) -> &str {
        "describeAndSummarise"
    }

    fn description(&self) -> &str {
        "Summarize the given text or documents."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required(
            "data",
            ParamKind::Any,
            "Text, or a list of documents, to summarize",
        )]
    }

    async fn invoke(&self, args: CapabilityArgs) -> Result<CapabilityOutput, CapabilityError> {
        let data = args
            .get("data")
            .ok_or_else(|| CapabilityError::invalid_args(self.name(), "missing 'data'"))?;
        let text = text_to_summarize(data);

        if text.trim().is_empty() {
            return Err(CapabilityError::invalid_args(
                self.name(),
                "nothing to summarize",
            ));
        }

        debug!(model = %self.model, chars = text.len(), "Requesting summary");

        let request = ProviderRequest::new(
            self.model.clone(),
            vec![Message::system(SUMMARIZER_PROMPT), Message::user(text)],
        );
        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| CapabilityError::failed(self.name(), e))?;

        if response.message.content.trim().is_empty() {
            return Err(CapabilityError::failed(self.name(), "no content returned"));
        }

        Ok(response.message.content.into())
    }
}
