//! API Server module
//!
//! This module provides the HTTP API server for todochat: a JSON API over
//! the core, a server-rendered HTML UI showing the todo list and the
//! conversation, and an SSE stream that nudges the browser to re-render
//! after every store change.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::agent::AgentError;
use crate::core::Core;
use crate::models::{ChatMessage, ChatRole, NewTodo, SubtaskRef, Todo};

/// Request to run one chat turn
#[derive(Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// Reply from a chat turn: the assistant's answer plus the refreshed list
#[derive(Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    pub todos: Vec<Todo>,
}

/// Request to add todos (each with optional initial subtasks)
#[derive(Serialize, Deserialize)]
pub struct AddTodosRequest {
    pub todos: Vec<NewTodo>,
}

/// Request to add subtasks to an existing todo
#[derive(Serialize, Deserialize)]
pub struct AddSubtasksRequest {
    pub subtasks: Vec<String>,
}

/// Request addressing a batch of todos by id
#[derive(Serialize, Deserialize)]
pub struct TodoIdsRequest {
    pub ids: Vec<i64>,
}

/// Request addressing a batch of subtasks
#[derive(Serialize, Deserialize)]
pub struct SubtaskRefsRequest {
    pub subtask_ids: Vec<SubtaskRef>,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 3000).into(),
        }
    }
}

/// API responses
#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Builds the application router; split out of `serve` so tests can drive
/// handlers through `tower::ServiceExt::oneshot`.
pub fn router(core: Core) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { Redirect::temporary("/ui") }))
        // --- Todos --- //
        .route(
            "/api/todos",
            get(list_todos).post(add_todos).delete(delete_todos),
        )
        .route("/api/todos/complete", post(complete_todos))
        .route("/api/todos/uncomplete", post(uncomplete_todos))
        // --- Subtasks --- //
        .route("/api/todos/:id/subtasks", post(add_subtasks))
        .route("/api/subtasks/complete", post(complete_subtasks))
        .route("/api/subtasks/uncomplete", post(uncomplete_subtasks))
        .route("/api/subtasks", delete(delete_subtasks))
        // --- Chat --- //
        .route("/api/messages", get(list_messages))
        .route("/api/chat", post(chat))
        // --- UI --- //
        .route("/ui", get(ui_handler))
        .route("/ui/events", get(events_handler))
        .layer(cors)
        .with_state(core)
}

/// Starts the API server
pub async fn serve(core: Core, config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let app = router(core);

    tracing::info!("Starting server on {}", config.address);
    let listener = TcpListener::bind(config.address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Todo Handlers --- //

async fn list_todos(State(core): State<Core>) -> Response {
    match core.list_todos().await {
        Ok(todos) => (StatusCode::OK, Json(ApiResponse::success(todos))).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<Vec<Todo>>::error(format!(
                "Failed to load todos: {}",
                e
            ))),
        )
            .into_response(),
    }
}

async fn add_todos(
    State(core): State<Core>,
    Json(payload): Json<AddTodosRequest>,
) -> impl IntoResponse {
    let added = core.add_todos(&payload.todos).await;
    (StatusCode::OK, Json(ApiResponse::success(added)))
}

async fn complete_todos(
    State(core): State<Core>,
    Json(payload): Json<TodoIdsRequest>,
) -> impl IntoResponse {
    let affected = core.complete_todos(&payload.ids).await;
    (StatusCode::OK, Json(ApiResponse::success(affected)))
}

async fn uncomplete_todos(
    State(core): State<Core>,
    Json(payload): Json<TodoIdsRequest>,
) -> impl IntoResponse {
    let affected = core.uncomplete_todos(&payload.ids).await;
    (StatusCode::OK, Json(ApiResponse::success(affected)))
}

async fn delete_todos(
    State(core): State<Core>,
    Json(payload): Json<TodoIdsRequest>,
) -> impl IntoResponse {
    let deleted = core.delete_todos(&payload.ids).await;
    (StatusCode::OK, Json(ApiResponse::success(deleted)))
}

// --- Subtask Handlers --- //

async fn add_subtasks(
    State(core): State<Core>,
    Path(todo_id): Path<i64>,
    Json(payload): Json<AddSubtasksRequest>,
) -> impl IntoResponse {
    let added = core.add_subtasks(todo_id, &payload.subtasks).await;
    (StatusCode::OK, Json(ApiResponse::success(added)))
}

async fn complete_subtasks(
    State(core): State<Core>,
    Json(payload): Json<SubtaskRefsRequest>,
) -> impl IntoResponse {
    let affected = core.complete_subtasks(&payload.subtask_ids).await;
    (StatusCode::OK, Json(ApiResponse::success(affected)))
}

async fn uncomplete_subtasks(
    State(core): State<Core>,
    Json(payload): Json<SubtaskRefsRequest>,
) -> impl IntoResponse {
    let affected = core.uncomplete_subtasks(&payload.subtask_ids).await;
    (StatusCode::OK, Json(ApiResponse::success(affected)))
}

async fn delete_subtasks(
    State(core): State<Core>,
    Json(payload): Json<SubtaskRefsRequest>,
) -> impl IntoResponse {
    let deleted = core.delete_subtasks(&payload.subtask_ids).await;
    (StatusCode::OK, Json(ApiResponse::success(deleted)))
}

// --- Chat Handlers --- //

async fn list_messages(State(core): State<Core>) -> impl IntoResponse {
    let messages = core.messages().await;
    (StatusCode::OK, Json(ApiResponse::success(messages)))
}

async fn chat(State(core): State<Core>, Json(payload): Json<ChatRequest>) -> Response {
    if payload.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<ChatReply>::error(
                "Message must not be empty".to_string(),
            )),
        )
            .into_response();
    }

    match core.send_message(&payload.message).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ApiResponse::success(ChatReply {
                reply: outcome.reply,
                todos: outcome.todos,
            })),
        )
            .into_response(),
        Err(e @ AgentError::Llm(_)) => {
            tracing::error!("Chat turn failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(ApiResponse::<ChatReply>::error(format!(
                    "Model call failed: {}",
                    e
                ))),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Chat turn failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<ChatReply>::error(format!("{}", e))),
            )
                .into_response()
        }
    }
}

// --- UI and Event Handlers --- //

async fn events_handler(State(core): State<Core>) -> impl IntoResponse {
    let receiver = core.subscribe();
    let stream = EventStream::new(core.clone(), receiver);

    let headers = [
        (
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("text/event-stream"),
        ),
        (
            axum::http::header::CACHE_CONTROL,
            axum::http::HeaderValue::from_static("no-cache"),
        ),
    ];

    (headers, axum::body::Body::from_stream(stream))
}

struct EventStream {
    core: Core,
    receiver: tokio::sync::broadcast::Receiver<()>,
}

impl EventStream {
    fn new(core: Core, receiver: tokio::sync::broadcast::Receiver<()>) -> Self {
        Self { core, receiver }
    }
}

impl Stream for EventStream {
    type Item = Result<String, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.try_recv() {
            Ok(()) => Poll::Ready(Some(Ok("event: update\ndata: change\n\n".to_string()))),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty) => {
                // No updates yet; re-poll shortly.
                let waker = cx.waker().clone();
                tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    waker.wake();
                });
                Poll::Pending
            }
            Err(tokio::sync::broadcast::error::TryRecvError::Lagged(_)) => {
                // Missed notifications collapse into a single update event.
                Poll::Ready(Some(Ok("event: update\ndata: change\n\n".to_string())))
            }
            Err(tokio::sync::broadcast::error::TryRecvError::Closed) => {
                self.receiver = self.core.subscribe();
                Poll::Pending
            }
        }
    }
}

async fn ui_handler(State(core): State<Core>) -> Response {
    let todos = match core.list_todos().await {
        Ok(todos) => todos,
        Err(e) => {
            tracing::error!("Failed to load todos for UI: {}", e);
            return Html(format!(
                "<!DOCTYPE html><html><head><title>Error</title></head><body><h1>Error</h1><p>Could not load todos: {}</p></body></html>",
                e
            ))
            .into_response();
        }
    };
    let messages = core.messages().await;

    Html(render_ui_template(&todos, &messages)).into_response()
}

// --- Template Rendering --- //

fn render_ui_template(todos: &[Todo], messages: &[ChatMessage]) -> String {
    let mut html = String::from(HTML_TEMPLATE_HEADER);

    // --- Todo list panel --- //
    html.push_str("<div class='todos-section'>");
    html.push_str("<h2>Todos</h2>");
    if todos.is_empty() {
        html.push_str("<p>No todos yet. Ask the assistant to add some.</p>");
    } else {
        html.push_str("<ul class='todo-list'>");
        for todo in todos {
            let class = if todo.completed { "completed" } else { "" };
            html.push_str(&format!("<li class='{}'><div class='todo-item'>", class));
            html.push_str(&format!("<span class='todo-id'>#{}</span>", todo.id));
            html.push_str(&format!(
                "<span class='todo-text'>{}</span>",
                html_escape::encode_text(&todo.text)
            ));
            html.push_str(&format!(
                "<span class='todo-status'>{}</span>",
                if todo.completed { "✓" } else { "○" }
            ));
            html.push_str("</div>");

            if !todo.subtasks.is_empty() {
                html.push_str("<ul class='subtask-list'>");
                for subtask in &todo.subtasks {
                    let class = if subtask.completed { "completed" } else { "" };
                    html.push_str(&format!(
                        "<li class='{}'><span class='todo-id'>#{}</span><span class='todo-text'>{}</span><span class='todo-status'>{}</span></li>",
                        class,
                        subtask.id,
                        html_escape::encode_text(&subtask.text),
                        if subtask.completed { "✓" } else { "○" }
                    ));
                }
                html.push_str("</ul>");
            }

            html.push_str("</li>");
        }
        html.push_str("</ul>");
    }
    html.push_str("</div>");

    // --- Conversation panel --- //
    html.push_str("<div class='chat-section'>");
    html.push_str("<h2>Conversation</h2>");
    html.push_str("<div class='chat-log'>");
    let visible = messages.iter().filter(|m| {
        matches!(m.role, ChatRole::User | ChatRole::Assistant)
            && m.content.as_deref().is_some_and(|c| !c.is_empty())
    });
    for message in visible {
        let (class, who) = match message.role {
            ChatRole::User => ("user", "You"),
            _ => ("assistant", "Assistant"),
        };
        html.push_str(&format!(
            "<div class='chat-message {}'><span class='chat-who'>{}</span><span class='chat-text'>{}</span></div>",
            class,
            who,
            html_escape::encode_text(message.content.as_deref().unwrap_or(""))
        ));
    }
    html.push_str("</div>");

    // Input form; submission is wired up in the footer script.
    html.push_str(
        "<form id='chat-form'><input id='chat-input' type='text' placeholder='Tell the assistant what to do...' autocomplete='off'/><button id='chat-send' type='submit'>Send</button></form>",
    );
    html.push_str("<div id='chat-error' class='chat-error'></div>");
    html.push_str("</div>");

    html.push_str(HTML_TEMPLATE_FOOTER);
    html
}

// HTML template header with CSS styles
const HTML_TEMPLATE_HEADER: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Todochat</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, Cantarell, 'Open Sans', 'Helvetica Neue', sans-serif;
            line-height: 1.6;
            color: #333;
            max-width: 1000px;
            margin: 0 auto;
            padding: 20px;
            background-color: #f7f9fc;
        }
        h1 {
            color: #2c3e50;
            border-bottom: 2px solid #3498db;
            padding-bottom: 10px;
        }
        h2 {
            color: #3498db;
            margin-top: 0;
        }
        .container {
            display: flex;
            flex-wrap: wrap;
            gap: 20px;
            align-items: flex-start;
        }
        .todos-section,
        .chat-section {
            flex: 1;
            min-width: 300px;
            background: white;
            padding: 20px;
            border-radius: 8px;
            box-shadow: 0 2px 10px rgba(0,0,0,0.1);
        }
        .todo-list, .subtask-list {
            list-style-type: none;
            padding-left: 0;
        }
        .subtask-list {
            padding-left: 28px;
        }
        .todo-item {
            display: flex;
            align-items: center;
            gap: 10px;
            padding: 6px 0;
        }
        .subtask-list li {
            display: flex;
            align-items: center;
            gap: 10px;
            padding: 3px 0;
        }
        .todo-id {
            font-family: monospace;
            color: #7f8c8d;
            min-width: 34px;
        }
        .todo-text {
            flex-grow: 1;
        }
        .todo-status {
            color: #7f8c8d;
            font-weight: bold;
        }
        .completed > .todo-item .todo-text,
        li.completed > .todo-text {
            text-decoration: line-through;
            color: #95a5a6;
        }
        .completed .todo-status {
            color: #27ae60;
        }
        .chat-log {
            max-height: 400px;
            overflow-y: auto;
            margin-bottom: 12px;
        }
        .chat-message {
            padding: 8px 12px;
            border-radius: 6px;
            margin-bottom: 8px;
        }
        .chat-message.user {
            background: #e8f4fc;
        }
        .chat-message.assistant {
            background: #f0f4f8;
        }
        .chat-who {
            font-weight: bold;
            margin-right: 8px;
            color: #2c3e50;
        }
        #chat-form {
            display: flex;
            gap: 8px;
        }
        #chat-input {
            flex-grow: 1;
            padding: 8px;
            border: 1px solid #bdc3c7;
            border-radius: 4px;
        }
        #chat-send {
            padding: 8px 16px;
            background: #3498db;
            color: white;
            border: none;
            border-radius: 4px;
            cursor: pointer;
        }
        #chat-send:disabled {
            background: #95a5a6;
        }
        .chat-error {
            color: #c0392b;
            margin-top: 8px;
        }
    </style>
</head>
<body>
    <h1>Todochat</h1>
    <div class="container">
"#;

// Footer: closing tags plus the chat form and live-update wiring
const HTML_TEMPLATE_FOOTER: &str = r#"
    </div>
    <script>
        let chatPending = false;

        const form = document.getElementById('chat-form');
        const input = document.getElementById('chat-input');
        const send = document.getElementById('chat-send');
        const errorBox = document.getElementById('chat-error');

        form.addEventListener('submit', async (ev) => {
            ev.preventDefault();
            const message = input.value.trim();
            if (!message || chatPending) return;

            chatPending = true;
            send.disabled = true;
            input.disabled = true;
            errorBox.textContent = '';

            try {
                const resp = await fetch('/api/chat', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({ message }),
                });
                const body = await resp.json();
                if (!body.success) {
                    errorBox.textContent = body.error || 'Something went wrong';
                    chatPending = false;
                    send.disabled = false;
                    input.disabled = false;
                    return;
                }
                location.reload();
            } catch (e) {
                errorBox.textContent = 'Request failed: ' + e;
                chatPending = false;
                send.disabled = false;
                input.disabled = false;
            }
        });

        const events = new EventSource('/ui/events');
        events.addEventListener('update', () => {
            // Don't reload out from under an in-flight chat turn.
            if (!chatPending) location.reload();
        });
    </script>
</body>
</html>
"#;
