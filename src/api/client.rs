//! API client module
//!
//! This module provides HTTP client functionality to interact with the
//! todochat API server. The CLI is built on top of it.

use std::sync::Arc;

use reqwest::{Client as ReqwestClient, Error as ReqwestError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, NewTodo, SubtaskRef, Todo};

use super::server::ChatReply;

/// API client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Generic API response structure
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] ReqwestError),

    #[error("API error: {0}")]
    Api(String),

    #[error("Missing data in response")]
    MissingData,
}

/// API client for the todochat service
#[derive(Debug, Clone)]
pub struct Client {
    http_client: Arc<ReqwestClient>,
    config: ClientConfig,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Create a new client with default configuration
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            http_client: Arc::new(ReqwestClient::new()),
            config,
        }
    }

    fn unwrap_response<T>(api_response: ApiResponse<T>) -> Result<T, ClientError> {
        if api_response.success {
            api_response.data.ok_or(ClientError::MissingData)
        } else {
            Err(ClientError::Api(
                api_response
                    .error
                    .unwrap_or_else(|| "Unknown API error".to_string()),
            ))
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self.http_client.get(&url).send().await?;
        let api_response: ApiResponse<T> = response.json().await?;
        Self::unwrap_response(api_response)
    }

    async fn send_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .http_client
            .request(method, &url)
            .json(body)
            .send()
            .await?;
        let api_response: ApiResponse<T> = response.json().await?;
        Self::unwrap_response(api_response)
    }

    /// List the todos with their subtasks
    pub async fn list_todos(&self) -> Result<Vec<Todo>, ClientError> {
        self.get("/api/todos").await
    }

    /// The conversation so far
    pub async fn list_messages(&self) -> Result<Vec<ChatMessage>, ClientError> {
        self.get("/api/messages").await
    }

    /// Send a chat message and wait for the assistant's reply
    pub async fn chat(&self, message: String) -> Result<ChatReply, ClientError> {
        #[derive(Serialize)]
        struct ChatRequest {
            message: String,
        }

        self.send_json(
            reqwest::Method::POST,
            "/api/chat",
            &ChatRequest { message },
        )
        .await
    }

    /// Add todos directly, bypassing the model
    pub async fn add_todos(&self, todos: Vec<NewTodo>) -> Result<Vec<String>, ClientError> {
        #[derive(Serialize)]
        struct AddTodosRequest {
            todos: Vec<NewTodo>,
        }

        self.send_json(
            reqwest::Method::POST,
            "/api/todos",
            &AddTodosRequest { todos },
        )
        .await
    }

    /// Add subtasks to an existing todo
    pub async fn add_subtasks(
        &self,
        todo_id: i64,
        subtasks: Vec<String>,
    ) -> Result<Vec<String>, ClientError> {
        #[derive(Serialize)]
        struct AddSubtasksRequest {
            subtasks: Vec<String>,
        }

        self.send_json(
            reqwest::Method::POST,
            &format!("/api/todos/{}/subtasks", todo_id),
            &AddSubtasksRequest { subtasks },
        )
        .await
    }

    /// Mark todos as completed
    pub async fn complete_todos(&self, ids: Vec<i64>) -> Result<Vec<String>, ClientError> {
        self.todo_ids(reqwest::Method::POST, "/api/todos/complete", ids)
            .await
    }

    /// Mark todos as incomplete
    pub async fn uncomplete_todos(&self, ids: Vec<i64>) -> Result<Vec<String>, ClientError> {
        self.todo_ids(reqwest::Method::POST, "/api/todos/uncomplete", ids)
            .await
    }

    /// Delete todos (their subtasks go with them)
    pub async fn delete_todos(&self, ids: Vec<i64>) -> Result<Vec<String>, ClientError> {
        self.todo_ids(reqwest::Method::DELETE, "/api/todos", ids)
            .await
    }

    /// Mark subtasks as completed
    pub async fn complete_subtasks(
        &self,
        subtask_ids: Vec<SubtaskRef>,
    ) -> Result<Vec<String>, ClientError> {
        self.subtask_refs(reqwest::Method::POST, "/api/subtasks/complete", subtask_ids)
            .await
    }

    /// Mark subtasks as incomplete
    pub async fn uncomplete_subtasks(
        &self,
        subtask_ids: Vec<SubtaskRef>,
    ) -> Result<Vec<String>, ClientError> {
        self.subtask_refs(
            reqwest::Method::POST,
            "/api/subtasks/uncomplete",
            subtask_ids,
        )
        .await
    }

    /// Delete subtasks
    pub async fn delete_subtasks(
        &self,
        subtask_ids: Vec<SubtaskRef>,
    ) -> Result<Vec<String>, ClientError> {
        self.subtask_refs(reqwest::Method::DELETE, "/api/subtasks", subtask_ids)
            .await
    }

    async fn todo_ids(
        &self,
        method: reqwest::Method,
        path: &str,
        ids: Vec<i64>,
    ) -> Result<Vec<String>, ClientError> {
        #[derive(Serialize)]
        struct TodoIdsRequest {
            ids: Vec<i64>,
        }

        self.send_json(method, path, &TodoIdsRequest { ids }).await
    }

    async fn subtask_refs(
        &self,
        method: reqwest::Method,
        path: &str,
        subtask_ids: Vec<SubtaskRef>,
    ) -> Result<Vec<String>, ClientError> {
        #[derive(Serialize)]
        struct SubtaskRefsRequest {
            subtask_ids: Vec<SubtaskRef>,
        }

        self.send_json(method, path, &SubtaskRefsRequest { subtask_ids })
            .await
    }
}
