//! # fnrouter Core
//!
//! Domain types, traits, and error definitions for the fnrouter action-routing
//! loop. This crate has **no framework dependencies**: it defines the model
//! (turns, conversations, providers, capabilities) that every other crate
//! implements against.
//!
//! ## Design Philosophy
//!
//! Each collaborator of the loop is a trait here. Implementations live in
//! their own crates, so the loop can be driven by a real HTTP model client
//! or by a scripted test double without changing a line of it.

pub mod capability;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use capability::{
    Capability, CapabilityArgs, CapabilityOutput, CapabilityRegistry, ParamKind, ParamSpec,
    bind_args,
};
pub use error::{CapabilityError, Error, ProviderError, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, Role};
pub use provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage, collect_stream,
};
