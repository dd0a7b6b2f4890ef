//! Core models for the todochat library
//!
//! This module contains the data types shared between the store, the tool
//! dispatch loop, and the API surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A top-level todo entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub id: i64,
    pub text: String,
    pub completed: bool,
    pub subtasks: Vec<Subtask>,
    pub created_at: DateTime<Utc>,
}

/// A child task belonging to exactly one todo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: i64,
    pub todo_id: i64,
    pub text: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a todo together with its initial subtasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTodo {
    pub text: String,
    #[serde(default)]
    pub subtasks: Vec<String>,
}

/// Addresses a subtask within its parent todo.
///
/// The store only consults `subtask_id`, but the pair form is what the model
/// is asked to produce, so both ids travel together.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubtaskRef {
    pub todo_id: i64,
    pub subtask_id: i64,
}

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in the running conversation.
///
/// The shape matches the chat-completion wire format: assistant messages may
/// carry tool calls, and tool messages carry the id of the call they answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// A tool-result message keyed to the invocation it answers.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// A structured tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

/// The function half of a tool call: a name plus JSON-encoded arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// System prompt establishing the assistant's job and register.
pub const SYSTEM_PROMPT: &str = "You are an AI assistant that helps manage a todo list. You can \
add new todos with subtasks, add subtasks to existing todos, mark todos or subtasks as completed \
or incomplete, or delete todos and subtasks. I will provide you with the current state of the \
todo list in each interaction. Keep your responses to the user short and sweet, without \
unnecessary details.";

/// Renders the current todo list as the context string sent to the model
/// once per turn.
pub fn render_todo_context(todos: &[Todo]) -> String {
    if todos.is_empty() {
        return "Current todo list:\nNo todos currently.".to_string();
    }

    let lines: Vec<String> = todos
        .iter()
        .map(|todo| {
            let subtasks = todo
                .subtasks
                .iter()
                .map(|st| {
                    format!(
                        "{{ID: {}, Text: \"{}\", Completed: {}}}",
                        st.id, st.text, st.completed
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "ID: {}, Text: \"{}\", Completed: {}, Subtasks: [{}]",
                todo.id, todo.text, todo.completed, subtasks
            )
        })
        .collect();

    format!(
        "Current todo list:\n{}\n\nPlease use the todo IDs when referring to specific todos.",
        lines.join("\n")
    )
}

/// Parses a comma-separated list of ids (e.g., "1,2,3") as used by the CLI.
pub fn parse_id_list(ids_str: &str) -> Result<Vec<i64>, std::num::ParseIntError> {
    ids_str
        .split(',')
        .map(|s| s.trim().parse::<i64>())
        .collect()
}
