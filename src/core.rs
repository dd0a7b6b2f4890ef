//! Shared application state
//!
//! `Core` wraps the store, the running conversation, and the model client
//! behind `Arc` so the server, the turn loop, and the CLI wiring can share
//! one instance. Observers (the SSE stream) are notified through a broadcast
//! channel after every mutation.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use crate::agent::{run_turn, AgentError, TurnOutcome};
use crate::llm::ChatModel;
use crate::models::{ChatMessage, NewTodo, SubtaskRef, Todo, SYSTEM_PROMPT};
use crate::store::{StoreError, TodoStore};

#[derive(Clone)]
pub struct Core {
    store: Arc<Mutex<TodoStore>>,
    transcript: Arc<Mutex<Vec<ChatMessage>>>,
    model: Arc<dyn ChatModel>,
    update_tx: Arc<broadcast::Sender<()>>,
}

impl Core {
    pub fn new(store: TodoStore, model: Arc<dyn ChatModel>) -> Self {
        let (tx, _rx) = broadcast::channel(100);

        Self {
            store: Arc::new(Mutex::new(store)),
            transcript: Arc::new(Mutex::new(vec![ChatMessage::system(SYSTEM_PROMPT)])),
            model,
            update_tx: Arc::new(tx),
        }
    }

    fn notify(&self) {
        // Nobody listening is fine.
        let _ = self.update_tx.send(());
    }

    /// Subscribe to state-change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.update_tx.subscribe()
    }

    /// Current snapshot of all todos.
    pub async fn list_todos(&self) -> Result<Vec<Todo>, StoreError> {
        self.store.lock().await.refresh_todos()
    }

    /// The running conversation.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.transcript.lock().await.clone()
    }

    pub async fn add_todos(&self, items: &[NewTodo]) -> Vec<String> {
        let added = self.store.lock().await.add_todos(items);
        self.notify();
        added
    }

    pub async fn add_subtasks(&self, todo_id: i64, subtasks: &[String]) -> Vec<String> {
        let added = self.store.lock().await.add_subtasks(todo_id, subtasks);
        self.notify();
        added
    }

    pub async fn complete_todos(&self, ids: &[i64]) -> Vec<String> {
        let affected = self.store.lock().await.complete_todos(ids);
        self.notify();
        affected
    }

    pub async fn uncomplete_todos(&self, ids: &[i64]) -> Vec<String> {
        let affected = self.store.lock().await.uncomplete_todos(ids);
        self.notify();
        affected
    }

    pub async fn complete_subtasks(&self, refs: &[SubtaskRef]) -> Vec<String> {
        let affected = self.store.lock().await.complete_subtasks(refs);
        self.notify();
        affected
    }

    pub async fn uncomplete_subtasks(&self, refs: &[SubtaskRef]) -> Vec<String> {
        let affected = self.store.lock().await.uncomplete_subtasks(refs);
        self.notify();
        affected
    }

    pub async fn delete_todos(&self, ids: &[i64]) -> Vec<String> {
        let deleted = self.store.lock().await.delete_todos(ids);
        self.notify();
        deleted
    }

    pub async fn delete_subtasks(&self, refs: &[SubtaskRef]) -> Vec<String> {
        let deleted = self.store.lock().await.delete_subtasks(refs);
        self.notify();
        deleted
    }

    /// Runs one full chat turn.
    ///
    /// Both locks are held for the duration of the turn: there is a single
    /// logical writer, and a slow model call simply stalls the next caller.
    pub async fn send_message(&self, text: &str) -> Result<TurnOutcome, AgentError> {
        let mut store = self.store.lock().await;
        let mut transcript = self.transcript.lock().await;

        let result = run_turn(&mut store, &mut transcript, self.model.as_ref(), text).await;
        self.notify();
        result
    }
}
