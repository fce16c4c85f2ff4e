//! The action-router loop: the heart of fnrouter.
//!
//! The router follows a strict **one action per turn** cycle:
//!
//! 1. **Seed** the conversation with the system prompt and the user's request
//! 2. **Ask** the model for the next action (single-shot or streamed)
//! 3. **Parse** exactly one JSON object `{function, args, status}`
//! 4. **Invoke** the named capability with validated arguments
//! 5. **Fold** the result back as `Result: ...`, plus an optional routing hint
//! 6. **Stop** on `done`, otherwise loop back to step 2
//!
//! Malformed replies and unknown capability names end the run immediately.
//! The step ceiling bounds how long a model can keep going.

pub mod action;
pub mod hints;
pub mod prompt;
pub mod router;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use action::{Action, ActionParseError, Status, normalize_fences, parse_action};
pub use hints::{HintPolicy, HintRule, NoHints, RuleHints};
pub use prompt::build_system_prompt;
pub use router::{ActionRouter, RouterError, RunReport, StepRecord, StopReason};
pub use tokio_util::sync::CancellationToken;
