//! The tool-dispatch turn loop
//!
//! One user message triggers a loop of model turns: each turn re-sends the
//! conversation plus a snapshot of the todo list, dispatches any tool calls
//! the model requested (in declared order, one result message per call),
//! refreshes the snapshot once, and repeats until the model answers in plain
//! text. A remote error aborts the whole turn.

use crate::llm::{ChatModel, LlmError};
use crate::models::{render_todo_context, ChatMessage, Todo};
use crate::store::TodoStore;
use crate::tools::{dispatch, TOOL_SCHEMAS};

/// Upper bound on model turns per user message, so a model that keeps
/// requesting tools cannot spin forever.
const MAX_MODEL_TURNS: usize = 16;

/// Turn loop errors
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("model kept requesting tools without producing an answer")]
    TurnLimit,
}

/// The result of a completed turn: the assistant's reply and the refreshed
/// todo snapshot.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub todos: Vec<Todo>,
}

/// Runs one full user turn against the model.
///
/// The transcript is extended in place with the user message, every
/// assistant message, and one tool-result message per tool call. The
/// per-turn context message is sent to the model but never persisted.
pub async fn run_turn(
    store: &mut TodoStore,
    transcript: &mut Vec<ChatMessage>,
    model: &dyn ChatModel,
    user_input: &str,
) -> Result<TurnOutcome, AgentError> {
    transcript.push(ChatMessage::user(user_input));

    let mut todos = refresh_or_empty(store);

    for _ in 0..MAX_MODEL_TURNS {
        let mut request_messages = transcript.clone();
        request_messages.push(ChatMessage::system(render_todo_context(&todos)));

        let assistant = model.complete(&request_messages, &TOOL_SCHEMAS).await?;
        transcript.push(assistant.clone());

        let calls = assistant.tool_calls.unwrap_or_default();
        if calls.is_empty() {
            return Ok(TurnOutcome {
                reply: assistant.content.unwrap_or_default(),
                todos,
            });
        }

        for call in &calls {
            tracing::debug!(
                "Dispatching tool call {} ({})",
                call.function.name,
                call.id
            );
            let content = match dispatch(store, &call.function.name, &call.function.arguments) {
                Ok(texts) => {
                    serde_json::to_string(&texts).unwrap_or_else(|_| "[]".to_string())
                }
                Err(e) => {
                    tracing::error!("Tool call {} failed: {}", call.function.name, e);
                    format!("{{\"error\": \"{}\"}}", e)
                }
            };
            transcript.push(ChatMessage::tool_result(&call.id, content));
        }

        // One snapshot refresh per turn, after the turn's calls are done.
        todos = refresh_or_empty(store);
    }

    Err(AgentError::TurnLimit)
}

fn refresh_or_empty(store: &TodoStore) -> Vec<Todo> {
    match store.refresh_todos() {
        Ok(todos) => todos,
        Err(e) => {
            tracing::error!("Error refreshing todos: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatRole, FunctionCall, ToolCall};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A scripted model: pops a canned turn per call and records every
    /// request it receives.
    struct ScriptedModel {
        turns: Mutex<VecDeque<Result<ChatMessage, LlmError>>>,
        requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        fn new(turns: Vec<Result<ChatMessage, LlmError>>) -> Self {
            Self {
                turns: Mutex::new(turns.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<Vec<ChatMessage>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _tools: &[serde_json::Value],
        ) -> Result<ChatMessage, LlmError> {
            self.requests.lock().unwrap().push(messages.to_vec());
            self.turns
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse))
        }
    }

    fn assistant_reply(content: &str) -> ChatMessage {
        ChatMessage {
            role: ChatRole::Assistant,
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    fn assistant_tool_call(id: &str, name: &str, arguments: &str) -> ChatMessage {
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

    #[tokio::test]
    async fn test_plain_answer_ends_turn() {
        let mut store = TodoStore::open_in_memory().unwrap();
        let model = ScriptedModel::new(vec![Ok(assistant_reply("Nothing to do!"))]);
        let mut transcript = vec![ChatMessage::system("test prompt")];

        let outcome = run_turn(&mut store, &mut transcript, &model,"hi")
            .await
            .unwrap();

        assert_eq!(outcome.reply, "Nothing to do!");
        assert!(outcome.todos.is_empty());
        // system prompt, user, assistant; the context message is not persisted.
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[1].role, ChatRole::User);
        assert_eq!(transcript[2].role, ChatRole::Assistant);

        // The request carried the context message as its final system entry.
        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        let last = requests[0].last().unwrap();
        assert_eq!(last.role, ChatRole::System);
        assert!(last.content.as_deref().unwrap().contains("No todos currently."));
    }

    #[tokio::test]
    async fn test_tool_call_dispatch_and_refresh() {
        let mut store = TodoStore::open_in_memory().unwrap();
        let model = ScriptedModel::new(vec![
            Ok(assistant_tool_call(
                "call_1",
                "add_todos",
                r#"{"todos": [{"text": "Buy milk", "subtasks": []}]}"#,
            )),
            Ok(assistant_reply("Added it.")),
        ]);
        let mut transcript = Vec::new();

        let outcome = run_turn(&mut store, &mut transcript, &model,"add milk")
            .await
            .unwrap();

        assert_eq!(outcome.reply, "Added it.");
        assert_eq!(outcome.todos.len(), 1);
        assert_eq!(outcome.todos[0].text, "Buy milk");

        // user, assistant(tool_calls), tool result, assistant.
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[2].role, ChatRole::Tool);
        assert_eq!(transcript[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(transcript[2].content.as_deref(), Some("[\"Buy milk\"]"));

        // The second request saw the refreshed snapshot.
        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        let context = requests[1].last().unwrap().content.clone().unwrap();
        assert!(context.contains("Buy milk"));
    }

    #[tokio::test]
    async fn test_multiple_calls_processed_in_declared_order() {
        let mut store = TodoStore::open_in_memory().unwrap();
        let mut turn = assistant_tool_call(
            "call_a",
            "add_todos",
            r#"{"todos": [{"text": "First", "subtasks": []}]}"#,
        );
        turn.tool_calls.as_mut().unwrap().push(ToolCall {
            id: "call_b".to_string(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: "add_todos".to_string(),
                arguments: r#"{"todos": [{"text": "Second", "subtasks": []}]}"#.to_string(),
            },
        });
        let model = ScriptedModel::new(vec![Ok(turn), Ok(assistant_reply("done"))]);
        let mut transcript = Vec::new();

        let outcome = run_turn(&mut store, &mut transcript, &model,"add both")
            .await
            .unwrap();

        let texts: Vec<&str> = outcome.todos.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["First", "Second"]);
        assert_eq!(transcript[2].tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(transcript[3].tool_call_id.as_deref(), Some("call_b"));
    }

    #[tokio::test]
    async fn test_model_error_aborts_turn() {
        let mut store = TodoStore::open_in_memory().unwrap();
        let model = ScriptedModel::new(vec![Err(LlmError::Api {
            status: 500,
            body: "boom".to_string(),
        })]);
        let mut transcript = Vec::new();

        let err = run_turn(&mut store, &mut transcript, &model,"hello")
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Llm(LlmError::Api { status: 500, .. })));
        // The user message stays recorded; no assistant turn was appended.
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].role, ChatRole::User);
    }

    #[tokio::test]
    async fn test_unknown_tool_reports_error_and_continues() {
        let mut store = TodoStore::open_in_memory().unwrap();
        let model = ScriptedModel::new(vec![
            Ok(assistant_tool_call("call_1", "format_disk", "{}")),
            Ok(assistant_reply("sorry, can't do that")),
        ]);
        let mut transcript = Vec::new();

        let outcome = run_turn(&mut store, &mut transcript, &model,"do something odd")
            .await
            .unwrap();

        assert_eq!(outcome.reply, "sorry, can't do that");
        let tool_msg = &transcript[2];
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_msg.content.as_deref().unwrap().contains("error"));
    }

    #[tokio::test]
    async fn test_turn_limit() {
        let mut store = TodoStore::open_in_memory().unwrap();
        let turns = (0..MAX_MODEL_TURNS + 1)
            .map(|i| {
                Ok(assistant_tool_call(
                    &format!("call_{}", i),
                    "complete_todos",
                    r#"{"ids": []}"#,
                ))
            })
            .collect();
        let model = ScriptedModel::new(turns);
        let mut transcript = Vec::new();

        let err = run_turn(&mut store, &mut transcript, &model,"loop forever")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::TurnLimit));
    }
}
