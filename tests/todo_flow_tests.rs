use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use todochat::llm::{ChatModel, LlmError};
use todochat::models::{ChatMessage, ChatRole, FunctionCall, NewTodo, SubtaskRef, ToolCall};
use todochat::{Core, TodoStore};

/// A model that replays a fixed sequence of turns.
struct ScriptedModel {
    turns: Mutex<VecDeque<ChatMessage>>,
}

impl ScriptedModel {
    fn new(turns: Vec<ChatMessage>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
        })
    }
}

#[async_trait::async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _tools: &[serde_json::Value],
    ) -> Result<ChatMessage, LlmError> {
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::EmptyResponse)
    }
}

fn reply(content: &str) -> ChatMessage {
    ChatMessage {
        role: ChatRole::Assistant,
        content: Some(content.to_string()),
        tool_calls: None,
        tool_call_id: None,
    }
}

fn tool_call(id: &str, name: &str, arguments: &str) -> ChatMessage {
    ChatMessage {
        role: ChatRole::Assistant,
        content: None,
        tool_calls: Some(vec![ToolCall {
            id: id.to_string(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }]),
        tool_call_id: None,
    }
}

fn core_with(turns: Vec<ChatMessage>) -> Core {
    let store = TodoStore::open_in_memory().unwrap();
    Core::new(store, ScriptedModel::new(turns))
}

#[tokio::test]
async fn test_direct_crud_flow() {
    let core = core_with(vec![]);

    let added = core
        .add_todos(&[
            NewTodo {
                text: "Plan trip".to_string(),
                subtasks: vec!["Book flights".to_string(), "Reserve hotel".to_string()],
            },
            NewTodo {
                text: "Water plants".to_string(),
                subtasks: vec![],
            },
        ])
        .await;
    assert_eq!(added, vec!["Plan trip", "Water plants"]);

    let todos = core.list_todos().await.unwrap();
    assert_eq!(todos.len(), 2);
    let trip = &todos[0];
    assert_eq!(trip.subtasks.len(), 2);

    // Completing the parent cascades to its subtasks.
    let affected = core.complete_todos(&[trip.id]).await;
    assert_eq!(affected, vec!["Plan trip"]);
    let todos = core.list_todos().await.unwrap();
    assert!(todos[0].completed);
    assert!(todos[0].subtasks.iter().all(|st| st.completed));

    // Un-completing one subtask leaves the parent flag alone.
    let st = SubtaskRef {
        todo_id: todos[0].id,
        subtask_id: todos[0].subtasks[0].id,
    };
    let affected = core.uncomplete_subtasks(&[st]).await;
    assert_eq!(affected, vec!["Book flights"]);
    let todos = core.list_todos().await.unwrap();
    assert!(todos[0].completed);
    assert!(!todos[0].subtasks[0].completed);

    // Deleting the parent takes the subtasks with it.
    let deleted = core.delete_todos(&[todos[0].id]).await;
    assert_eq!(deleted, vec!["Plan trip"]);
    let todos = core.list_todos().await.unwrap();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].text, "Water plants");
}

#[tokio::test]
async fn test_chat_turn_applies_tool_calls() {
    let core = core_with(vec![
        tool_call(
            "call_1",
            "add_todos",
            r#"{"todos": [{"text": "Learn Rust", "subtasks": ["Read the book", "Write a crate"]}]}"#,
        ),
        reply("Added \"Learn Rust\" with two subtasks."),
    ]);

    let outcome = core.send_message("add a todo for learning rust").await.unwrap();
    assert_eq!(outcome.reply, "Added \"Learn Rust\" with two subtasks.");
    assert_eq!(outcome.todos.len(), 1);
    assert_eq!(outcome.todos[0].subtasks.len(), 2);

    // The transcript records the whole exchange in order.
    let messages = core.messages().await;
    let roles: Vec<ChatRole> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            ChatRole::System,
            ChatRole::User,
            ChatRole::Assistant,
            ChatRole::Tool,
            ChatRole::Assistant,
        ]
    );
    assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_1"));
}

#[tokio::test]
async fn test_chat_turns_share_state_with_direct_api() {
    let core = core_with(vec![reply("You have one todo: Ship it.")]);

    core.add_todos(&[NewTodo {
        text: "Ship it".to_string(),
        subtasks: vec![],
    }])
    .await;

    let outcome = core.send_message("what's on my list?").await.unwrap();
    assert_eq!(outcome.reply, "You have one todo: Ship it.");
    assert_eq!(outcome.todos.len(), 1);
    assert_eq!(outcome.todos[0].text, "Ship it");
}

#[tokio::test]
async fn test_model_error_leaves_list_untouched() {
    let store = TodoStore::open_in_memory().unwrap();
    let core = Core::new(store, ScriptedModel::new(vec![]));

    core.add_todos(&[NewTodo {
        text: "Keep me".to_string(),
        subtasks: vec![],
    }])
    .await;

    // The scripted model is exhausted, so the turn fails.
    let err = core.send_message("hello").await.unwrap_err();
    assert!(matches!(
        err,
        todochat::AgentError::Llm(LlmError::EmptyResponse)
    ));

    let todos = core.list_todos().await.unwrap();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].text, "Keep me");
}

#[tokio::test]
async fn test_update_notifications_fire_on_mutation() {
    let core = core_with(vec![]);
    let mut rx = core.subscribe();

    core.add_todos(&[NewTodo {
        text: "Notify me".to_string(),
        subtasks: vec![],
    }])
    .await;

    rx.recv().await.unwrap();
}
