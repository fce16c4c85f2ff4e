//! Filesystem capabilities: `createFolder` and `createFile`.

use async_trait::async_trait;
use fnrouter_core::capability::{Capability, CapabilityArgs, CapabilityOutput, ParamKind, ParamSpec};
use fnrouter_core::error::CapabilityError;
use tracing::debug;

use crate::path_policy::PathPolicy;

fn denied(capability: &str, reason: impl ToString) -> CapabilityError {
    CapabilityError::PermissionDenied {
        capability: capability.into(),
        reason: reason.to_string(),
    }
}

/// Create a directory (and any missing parents).
pub struct CreateFolder {
    policy: PathPolicy,
}

impl CreateFolder {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Capability for CreateFolder {
    fn name(&self) -> &str {
        "createFolder"
    }

    fn description(&self) -> &str {
        "Create a folder at the given path. Reports if it already exists."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required(
            "name",
            ParamKind::String,
            "Folder path, relative to the working directory or absolute",
        )]
    }

    async fn invoke(&self, args: CapabilityArgs) -> Result<CapabilityOutput, CapabilityError> {
        let name = args.str("name")?;
        let target = self
            .policy
            .validate(name)
            .map_err(|e| denied(self.name(), e))?;

        if let Ok(meta) = tokio::fs::metadata(&target).await {
            if meta.is_dir() {
                return Ok(format!("Folder '{name}' already exists.").into());
            }
            return Err(CapabilityError::failed(
                self.name(),
                format!("'{name}' exists and is not a folder"),
            ));
        }

        debug!(path = %target.display(), "Creating folder");
        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|e| CapabilityError::failed(self.name(), format!("error creating folder: {e}")))?;

        Ok(format!("Folder '{name}' created.").into())
    }
}

/// Write UTF-8 content to a file, creating parent directories as needed.
pub struct CreateFile {
    policy: PathPolicy,
}

impl CreateFile {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Capability for CreateFile {
    fn name(&self) -> &str {
        "createFile"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file with the given text content."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("path", ParamKind::String, "File path to write"),
            ParamSpec::required("content", ParamKind::String, "Text to write into the file"),
        ]
    }

    async fn invoke(&self, args: CapabilityArgs) -> Result<CapabilityOutput, CapabilityError> {
        let path = args.str("path")?;
        let content = args.str("content")?;
        let target = self
            .policy
            .validate(path)
            .map_err(|e| denied(self.name(), e))?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CapabilityError::failed(self.name(), format!("failed to create directory: {e}"))
            })?;
        }

        debug!(path = %target.display(), bytes = content.len(), "Writing file");
        tokio::fs::write(&target, content)
            .await
            .map_err(|e| CapabilityError::failed(self.name(), format!("error creating file: {e}")))?;

        Ok(format!("File '{path}' created with {} bytes.", content.len()).into())
    }
}
