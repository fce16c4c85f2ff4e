//! Path policy for the filesystem capabilities.
//!
//! A target path is resolved against the nearest existing ancestor (so paths
//! that do not exist yet can still be checked), then compared component-wise
//! against forbidden prefixes and, when configured, allowed roots.

use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside allowed roots")]
    OutsideAllowedRoots { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Failed to resolve path '{path}': {reason}")]
    ResolveFailed { path: String, reason: String },
}

/// Where the filesystem capabilities are allowed to write.
#[derive(Debug, Clone, Default)]
pub struct PathPolicy {
    /// Empty = anywhere not forbidden
    allowed_roots: Vec<String>,
    forbidden_paths: Vec<String>,
}

impl PathPolicy {
    pub fn new(allowed_roots: Vec<String>, forbidden_paths: Vec<String>) -> Self {
        Self {
            allowed_roots,
            forbidden_paths,
        }
    }

    /// A policy that allows every path.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Validate `path`, returning its resolved absolute form.
    pub fn validate(&self, path: &str) -> Result<PathBuf, PathValidationError> {
        let input = Path::new(path);

        if input.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(PathValidationError::PathTraversal { path: path.into() });
        }

        let resolved = resolve(input).map_err(|reason| PathValidationError::ResolveFailed {
            path: path.into(),
            reason,
        })?;

        for forbidden in &self.forbidden_paths {
            if resolved.starts_with(resolve_prefix(forbidden)) {
                return Err(PathValidationError::ForbiddenPath {
                    path: path.into(),
                    pattern: forbidden.clone(),
                });
            }
        }

        if !self.allowed_roots.is_empty()
            && !self
                .allowed_roots
                .iter()
                .any(|root| resolved.starts_with(resolve_prefix(root)))
        {
            return Err(PathValidationError::OutsideAllowedRoots { path: path.into() });
        }

        Ok(resolved)
    }
}

/// Make `input` absolute and canonicalize its longest existing prefix.
fn resolve(input: &Path) -> Result<PathBuf, String> {
    let absolute = if input.is_absolute() {
        input.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| format!("current directory: {e}"))?
            .join(input)
    };

    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute),
        }
    }

    let mut resolved = existing.canonicalize().map_err(|e| e.to_string())?;
    for part in rest.into_iter().rev() {
        resolved.push(part);
    }
    Ok(resolved)
}

/// Resolve a configured prefix. Prefixes that cannot be resolved are used as written.
fn resolve_prefix(prefix: &str) -> PathBuf {
    let expanded = PathBuf::from(expand_tilde(prefix));
    resolve(&expanded).unwrap_or(expanded)
}

/// Expand ~ to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = home_dir()
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}

fn home_dir() -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok()
    }
}
