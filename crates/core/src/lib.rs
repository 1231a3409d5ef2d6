//! # Wayfinder Core
//!
//! Domain types, traits, and error definitions for the Wayfinder agent engine.
//! This crate has **no framework dependencies**; it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is defined as a trait here. Implementations live in their
//! respective crates:
//! - [`Provider`] backends are chained by the router in `wayfinder-providers`
//! - [`KnowledgeStore`] and [`Embedder`] are implemented in `wayfinder-knowledge`
//! - [`Tool`]s are registered by `wayfinder-tools` and the application
//! - [`TokenCounter`] is picked by configuration

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod knowledge;
pub mod token;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Conversation, ConversationId, LoopState, Message, PendingCall, PendingConfirmation, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Purpose, ToolDefinition};
pub use tool::{Confirmation, Tool, ToolCall, ToolKind, ToolRegistry, ToolResult, ToolSpec};
pub use knowledge::{Chunk, Embedder, IndexedRecord, KnowledgeStats, KnowledgeStore, ScoredRecord, Section};
pub use token::{CharEstimate, TokenCounter, WordEstimate};
pub use event::{DomainEvent, EventBus};
