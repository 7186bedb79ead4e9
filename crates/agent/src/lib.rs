//! Conversational order agent.
//!
//! A user message becomes one turn: the model sees the session history plus a
//! fixed tool catalog, any requested tools run against the record store in
//! order, and the model summarizes the results. Customer resolution and order
//! mutation live here as well, serialized per key with an in-process lock
//! table.
//!
//! The model never writes to the store directly. Every state change goes
//! through a typed tool call.

pub mod conversation;
pub mod llm;
pub mod locks;
pub mod openai;
pub mod orders;
pub mod prompt;
pub mod resolution;
pub mod runtime;
pub mod session;
pub mod tools;

pub use conversation::{Orchestrator, TurnState};
pub use llm::{
    ChatMessage, ChatRequest, LlmClient, LlmError, ModelReply, ToolInvocation, ToolSpec,
};
pub use runtime::{llm_from_config, AgentRuntime, LLM_NOT_CONFIGURED_REPLY};
pub use session::{SessionLog, SessionStore};
pub use tools::{ToolKind, ToolRegistry, ToolResult};
