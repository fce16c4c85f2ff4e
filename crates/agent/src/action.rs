//! The action a model emits each step, and how its text is turned into one.
//!
//! Two separate steps: [`normalize_fences`] is total and only strips Markdown
//! code fencing; [`parse_action`] is strict and reports exactly what was wrong.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// What the model wants to happen after this action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Run the action, then ask for the next one
    Continue,
    /// The model is re-attempting with adjusted arguments
    Retry,
    /// Run the action, then stop
    Done,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Continue => "continue",
            Status::Retry => "retry",
            Status::Done => "done",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "continue" => Some(Status::Continue),
            "retry" => Some(Status::Retry),
            "done" => Some(Status::Done),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One routed action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    /// Capability name
    pub function: String,
    /// Arguments in the order the model wrote them
    pub args: Map<String, Value>,
    pub status: Status,
}

/// Why a payload is not a valid action.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionParseError {
    #[error("empty response")]
    Empty,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("expected a single JSON object, found {found}")]
    NotAnObject { found: &'static str },

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("unknown status '{0}' (expected continue, retry or done)")]
    UnknownStatus(String),
}

/// Strip surrounding triple-backtick fencing from a model reply.
///
/// Trims whitespace, then removes an opening fence (with an optional language
/// tag such as `json`) and its closing fence, repeatedly, so the result never
/// starts with a fence. Text that is not fenced is returned trimmed.
pub fn normalize_fences(raw: &str) -> String {
    let mut text = raw.trim();

    while let Some(rest) = text.strip_prefix("```") {
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        let body = rest[tag_len..].trim_end();
        let body = body.strip_suffix("```").unwrap_or(body);
        text = body.trim();
    }

    text.to_string()
}

/// Parse a fence-normalized payload as exactly one action object.
///
/// `function` and `status` are required. A missing or null `args` means no
/// arguments. Unknown extra keys are ignored.
pub fn parse_action(payload: &str) -> Result<Action, ActionParseError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(ActionParseError::Empty);
    }

    let value: Value =
        serde_json::from_str(payload).map_err(|e| ActionParseError::InvalidJson(e.to_string()))?;

    let mut object = match value {
        Value::Object(object) => object,
        other => {
            return Err(ActionParseError::NotAnObject {
                found: json_kind(&other),
            });
        }
    };

    let function = match object.remove("function") {
        None | Some(Value::Null) => return Err(ActionParseError::MissingField("function")),
        Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
        Some(Value::String(_)) => {
            return Err(ActionParseError::InvalidField {
                field: "function",
                reason: "must not be empty".into(),
            });
        }
        Some(other) => {
            return Err(ActionParseError::InvalidField {
                field: "function",
                reason: format!("expected a string, found {}", json_kind(&other)),
            });
        }
    };

    let args = match object.remove("args") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(args)) => args,
        Some(other) => {
            return Err(ActionParseError::InvalidField {
                field: "args",
                reason: format!("expected an object, found {}", json_kind(&other)),
            });
        }
    };

    let status = match object.remove("status") {
        None | Some(Value::Null) => return Err(ActionParseError::MissingField("status")),
        Some(Value::String(s)) => {
            Status::parse(s.trim()).ok_or(ActionParseError::UnknownStatus(s))?
        }
        Some(other) => {
            return Err(ActionParseError::InvalidField {
                field: "status",
                reason: format!("expected a string, found {}", json_kind(&other)),
            });
        }
    };

    Ok(Action {
        function,
        args,
        status,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
