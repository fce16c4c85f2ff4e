//! Capability trait: the abstraction over the functions a router may call.
//!
//! A capability is a named, externally implemented operation with a fixed,
//! ordered parameter list. The router looks capabilities up by the name the
//! model emits, validates the model's `args` against the declared parameters,
//! and invokes them one at a time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::CapabilityError;

/// The JSON type a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    /// Any JSON value (e.g. documents handed from one step to the next)
    Any,
}

impl ParamKind {
    /// Whether `value` is acceptable for this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Number => value.is_number(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Object => value.is_object(),
            ParamKind::Array => value.is_array(),
            ParamKind::Any => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
            ParamKind::Object => "object",
            ParamKind::Array => "array",
            ParamKind::Any => "any",
        }
    }
}

/// One declared parameter of a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: description.into(),
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            description: description.into(),
        }
    }
}

/// Arguments bound to a capability's parameters, in declared order.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityArgs {
    capability: String,
    values: Vec<(String, Value)>,
}

impl CapabilityArgs {
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            values: Vec::new(),
        }
    }

    /// Builder-style insert, mostly for tests and direct invocation.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.push((name.into(), value));
        self
    }

    /// The capability these arguments were bound for.
    pub fn capability(&self) -> &str {
        &self.capability
    }

    /// Look up a bound argument by parameter name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Bound values in declared parameter order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// A required string argument.
    pub fn str(&self, name: &str) -> Result<&str, CapabilityError> {
        self.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| self.missing(name, "string"))
    }

    /// An optional string argument.
    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// A required non-negative integer argument.
    pub fn u64(&self, name: &str) -> Result<u64, CapabilityError> {
        let value = self.get(name).ok_or_else(|| self.missing(name, "integer"))?;
        value
            .as_u64()
            .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .ok_or_else(|| self.missing(name, "non-negative number"))
    }

    fn missing(&self, name: &str, expected: &str) -> CapabilityError {
        CapabilityError::invalid_args(
            &self.capability,
            format!("expected {expected} argument '{name}'"),
        )
    }
}

/// The result of one capability invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityOutput {
    /// Text folded back into the conversation
    pub text: String,

    /// Optional structured data (e.g. retrieved documents)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CapabilityOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// True when the text carries no content.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

impl From<String> for CapabilityOutput {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

impl From<&str> for CapabilityOutput {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

/// The core Capability trait.
///
/// Each capability (createFolder, runCommand, retrieve, ...) implements this
/// trait and is registered in a [`CapabilityRegistry`] before a run starts.
#[async_trait]
pub trait Capability: Send + Sync {
    /// The name the model uses to call this capability.
    fn name(&self) -> &str;

    /// A description of what this capability does (sent to the model).
    fn description(&self) -> &str;

    /// Declared parameters, in positional order.
    fn parameters(&self) -> Vec<ParamSpec>;

    /// Invoke the capability with validated, ordered arguments.
    async fn invoke(&self, args: CapabilityArgs) -> Result<CapabilityOutput, CapabilityError>;

    /// Render as `name(param1, param2?)` for the system prompt.
    fn signature(&self) -> String {
        let params: Vec<String> = self
            .parameters()
            .iter()
            .map(|p| {
                if p.required {
                    p.name.clone()
                } else {
                    format!("{}?", p.name)
                }
            })
            .collect();
        format!("{}({})", self.name(), params.join(", "))
    }
}

/// Validate raw model `args` against a parameter list and bind them.
///
/// Keys that name a declared parameter bind to it. Remaining keys, in the
/// order the model wrote them, fill the still-unbound parameters in declared
/// order. Bound values come back in declared order.
pub fn bind_args(
    capability: &str,
    params: &[ParamSpec],
    args: &Map<String, Value>,
) -> Result<CapabilityArgs, CapabilityError> {
    // Explicit nulls mean "not supplied".
    let supplied: Vec<(&String, &Value)> = args.iter().filter(|(_, v)| !v.is_null()).collect();
    let is_declared = |key: &str| params.iter().any(|p| p.name == key);

    let mut slots: Vec<Option<&Value>> = params
        .iter()
        .map(|param| {
            supplied
                .iter()
                .find(|(k, _)| **k == param.name)
                .map(|(_, v)| *v)
        })
        .collect();

    let strays: Vec<(&String, &Value)> = supplied
        .iter()
        .filter(|(k, _)| !is_declared(k))
        .copied()
        .collect();
    let open: Vec<usize> = (0..params.len()).filter(|&i| slots[i].is_none()).collect();

    if let Some((key, _)) = strays.get(open.len()) {
        return Err(CapabilityError::invalid_args(
            capability,
            format!("unexpected argument '{key}'"),
        ));
    }
    for (&index, (_, value)) in open.iter().zip(strays.iter()) {
        slots[index] = Some(*value);
    }

    let mut bound = CapabilityArgs::new(capability);
    for (param, slot) in params.iter().zip(slots) {
        match slot {
            Some(value) => {
                check_kind(capability, param, value)?;
                bound.values.push((param.name.clone(), value.clone()));
            }
            None if param.required => {
                return Err(CapabilityError::invalid_args(
                    capability,
                    format!("missing required argument '{}'", param.name),
                ));
            }
            None => {}
        }
    }
    Ok(bound)
}

fn check_kind(capability: &str, param: &ParamSpec, value: &Value) -> Result<(), CapabilityError> {
    if param.kind.accepts(value) {
        Ok(())
    } else {
        Err(CapabilityError::invalid_args(
            capability,
            format!("argument '{}' must be of type {}", param.name, param.kind.as_str()),
        ))
    }
}

/// The static table of capabilities available to a run.
///
/// Built before the run starts and shared behind an `Arc`; nothing mutates it
/// while a run is in progress. Keeps registration order for the prompt.
pub struct CapabilityRegistry {
    capabilities: Vec<Box<dyn Capability>>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            capabilities: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a capability. Replaces any existing capability with the same name.
    pub fn register(&mut self, capability: Box<dyn Capability>) {
        let name = capability.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => self.capabilities[slot] = capability,
            None => {
                self.index.insert(name, self.capabilities.len());
                self.capabilities.push(capability);
            }
        }
    }

    /// Builder-style registration.
    pub fn with(mut self, capability: impl Capability + 'static) -> Self {
        self.register(Box::new(capability));
        self
    }

    /// Get a capability by name.
    pub fn get(&self, name: &str) -> Option<&dyn Capability> {
        self.index
            .get(name)
            .map(|&slot| self.capabilities[slot].as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Iterate capabilities in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Capability> {
        self.capabilities.iter().map(|c| c.as_ref())
    }

    /// List all registered capability names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Look up, validate, and invoke a capability.
    pub async fn invoke(
        &self,
        name: &str,
        args: &Map<String, Value>,
    ) -> Result<CapabilityOutput, CapabilityError> {
        let capability = self
            .get(name)
            .ok_or_else(|| CapabilityError::NotFound(name.to_string()))?;
        let bound = bind_args(name, &capability.parameters(), args)?;
        capability.invoke(bound).await
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
