//! `sleep`: pause the workflow, e.g. while an opened app starts up.

use async_trait::async_trait;
use fnrouter_core::capability::{Capability, CapabilityArgs, CapabilityOutput, ParamKind, ParamSpec};
use fnrouter_core::error::CapabilityError;
use std::time::Duration;
use tracing::debug;

pub struct Sleep {
    max_ms: u64,
}

impl Sleep {
    pub fn new(max_ms: u64) -> Self {
        Self { max_ms }
    }
}

#[async_trait]
impl Capability for Sleep {
    fn name(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "Sleep for a duration in milliseconds."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required(
            "duration",
            ParamKind::Number,
            "Duration in milliseconds",
        )]
    }

    async fn invoke(&self, args: CapabilityArgs) -> Result<CapabilityOutput, CapabilityError> {
        let requested = args.u64("duration")?;
        let ms = requested.min(self.max_ms);
        if ms < requested {
            debug!(requested, capped = ms, "Sleep duration capped");
        }

        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(format!("Slept for {ms} ms").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn sleeps_for_requested_duration() {
        let cap = Sleep::new(60_000);
        let start = tokio::time::Instant::now();
        let out = cap
            .invoke(CapabilityArgs::new("sleep").with("duration", json!(1500)))
            .await
            .unwrap();
        assert_eq!(out.text, "Slept for 1500 ms");
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn duration_is_capped() {
        let cap = Sleep::new(100);
        let out = cap
            .invoke(CapabilityArgs::new("sleep").with("duration", json!(999_999)))
            .await
            .unwrap();
        assert_eq!(out.text, "Slept for 100 ms");
    }

    #[tokio::test]
    async fn negative_duration_rejected() {
        let cap = Sleep::new(100);
        let err = cap
            .invoke(CapabilityArgs::new("sleep").with("duration", json!(-5)))
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidArguments { .. }));
    }
}
