//! Todochat library crate
//!
//! A todo list you talk to: chat messages are forwarded to a hosted
//! chat-completion API, the model edits the list through a fixed set of
//! tools, and the resulting state is re-rendered for the user. The list
//! itself lives in a local SQLite database.

pub mod agent;
pub mod api;
pub mod cli;
pub mod core;
pub mod llm;
pub mod models;
pub mod store;
pub mod tools;

// Re-export the types most callers need
pub use agent::{run_turn, AgentError, TurnOutcome};
pub use api::{Client, ClientConfig, ClientError, ServerConfig};
pub use core::Core;
pub use llm::{ChatModel, LlmError, ModelConfig, OpenAiClient};
pub use models::{ChatMessage, ChatRole, NewTodo, Subtask, SubtaskRef, Todo};
pub use store::{StoreError, TodoStore};
