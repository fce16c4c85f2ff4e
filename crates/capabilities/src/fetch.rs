//! `fetchUrl`: raw HTTP GET.
//!
//! Returns the response body as text. No HTML parsing or extraction happens
//! here; a caller that wants document loading registers its own capability.

use async_trait::async_trait;
use fnrouter_core::capability::{Capability, CapabilityArgs, CapabilityOutput, ParamKind, ParamSpec};
use fnrouter_core::error::CapabilityError;
use std::time::Duration;
use tracing::{debug, warn};

pub struct FetchUrl {
    client: reqwest::Client,
    timeout: Duration,
}

impl FetchUrl {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self { client, timeout }
    }
}

#[async_trait]
impl Capability for FetchUrl {
    fn name(&self) -> &str {
        "fetchUrl"
    }

    fn description(&self) -> &str {
        "Fetch a URL with HTTP GET and return the raw response body."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required(
            "url",
            ParamKind::String,
            "An http:// or https:// URL",
        )]
    }

    async fn invoke(&self, args: CapabilityArgs) -> Result<CapabilityOutput, CapabilityError> {
        let url = args.str("url")?;

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(CapabilityError::invalid_args(
                self.name(),
                "URL must start with http:// or https://",
            ));
        }

        debug!(url = %url, "Fetching URL");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                CapabilityError::Timeout {
                    capability: self.name().into(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                CapabilityError::failed(self.name(), e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::failed(
                self.name(),
                format!("HTTP {} from {url}", status.as_u16()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CapabilityError::failed(self.name(), e))?;

        Ok(CapabilityOutput::text(body).with_data(serde_json::json!({
            "url": url,
            "status": status.as_u16(),
        })))
    }
}
