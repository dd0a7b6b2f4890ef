//! SQLite-backed todo store
//!
//! Two tables, `todos` and `subtasks`, joined by a cascading foreign key.
//! All mutating operations take batches and return the texts of the items
//! that were actually applied: a failing item is logged and skipped so the
//! rest of the batch still goes through.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{NewTodo, Subtask, SubtaskRef, Todo};

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The persistent todo store.
pub struct TodoStore {
    conn: Connection,
}

impl TodoStore {
    /// Opens (creating if necessary) the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Opens an in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        // foreign_keys is per-connection; the cascade delete depends on it.
        self.conn.pragma_update(None, "foreign_keys", "ON")?;

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS todos (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              text TEXT NOT NULL,
              completed INTEGER NOT NULL DEFAULT 0,
              created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS subtasks (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              todo_id INTEGER NOT NULL REFERENCES todos(id) ON DELETE CASCADE,
              text TEXT NOT NULL,
              completed INTEGER NOT NULL DEFAULT 0,
              created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_subtasks_todo_id ON subtasks(todo_id);
            "#,
        )?;
        Ok(())
    }

    /// Loads the full snapshot: all todos with their subtasks, ordered by id.
    pub fn refresh_todos(&self) -> Result<Vec<Todo>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, text, completed, created_at FROM todos ORDER BY id")?;
        let mut todos: Vec<Todo> = stmt
            .query_map([], |row| {
                Ok(Todo {
                    id: row.get(0)?,
                    text: row.get(1)?,
                    completed: row.get(2)?,
                    subtasks: Vec::new(),
                    created_at: parse_timestamp(row, 3)?,
                })
            })?
            .collect::<Result<_, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT id, todo_id, text, completed, created_at FROM subtasks ORDER BY id",
        )?;
        let subtasks: Vec<Subtask> = stmt
            .query_map([], |row| {
                Ok(Subtask {
                    id: row.get(0)?,
                    todo_id: row.get(1)?,
                    text: row.get(2)?,
                    completed: row.get(3)?,
                    created_at: parse_timestamp(row, 4)?,
                })
            })?
            .collect::<Result<_, _>>()?;

        for subtask in subtasks {
            if let Some(todo) = todos.iter_mut().find(|t| t.id == subtask.todo_id) {
                todo.subtasks.push(subtask);
            }
        }

        Ok(todos)
    }

    /// Adds a batch of todos with their initial subtasks.
    ///
    /// Blank texts are skipped; a failing insert is logged and the loop
    /// continues. Returns the texts of the todos actually inserted.
    pub fn add_todos(&self, items: &[NewTodo]) -> Vec<String> {
        let mut added = Vec::new();

        for item in items {
            let text = item.text.trim();
            if text.is_empty() {
                continue;
            }

            match self.insert_todo(text, &item.subtasks) {
                Ok(()) => added.push(text.to_string()),
                Err(e) => tracing::error!("Error adding todo \"{}\": {}", text, e),
            }
        }

        added
    }

    fn insert_todo(&self, text: &str, subtasks: &[String]) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO todos (text, completed, created_at) VALUES (?1, 0, ?2)",
            params![text, Utc::now().to_rfc3339()],
        )?;
        let todo_id = self.conn.last_insert_rowid();

        for subtext in subtasks {
            let subtext = subtext.trim();
            if subtext.is_empty() {
                continue;
            }
            self.conn.execute(
                "INSERT INTO subtasks (todo_id, text, completed, created_at) VALUES (?1, ?2, 0, ?3)",
                params![todo_id, subtext, Utc::now().to_rfc3339()],
            )?;
        }

        Ok(())
    }

    /// Adds subtasks to an existing todo, returning the texts actually added.
    pub fn add_subtasks(&self, todo_id: i64, subtasks: &[String]) -> Vec<String> {
        let mut added = Vec::new();

        for subtext in subtasks {
            let subtext = subtext.trim();
            if subtext.is_empty() {
                continue;
            }

            let result = self.conn.execute(
                "INSERT INTO subtasks (todo_id, text, completed, created_at) VALUES (?1, ?2, 0, ?3)",
                params![todo_id, subtext, Utc::now().to_rfc3339()],
            );
            match result {
                Ok(_) => added.push(subtext.to_string()),
                Err(e) => {
                    tracing::error!(
                        "Error adding subtask \"{}\" to todo {}: {}",
                        subtext,
                        todo_id,
                        e
                    );
                }
            }
        }

        added
    }

    /// Marks todos as completed, cascading the flag to their subtasks.
    pub fn complete_todos(&self, ids: &[i64]) -> Vec<String> {
        self.set_todos_completed(ids, true)
    }

    /// Marks todos as incomplete, cascading the flag to their subtasks.
    pub fn uncomplete_todos(&self, ids: &[i64]) -> Vec<String> {
        self.set_todos_completed(ids, false)
    }

    fn set_todos_completed(&self, ids: &[i64], completed: bool) -> Vec<String> {
        let mut affected = Vec::new();

        for &id in ids {
            match self.set_todo_completed(id, completed) {
                Ok(Some(text)) => affected.push(text),
                Ok(None) => {}
                Err(e) => tracing::error!(
                    "Error {} todo {}: {}",
                    if completed { "completing" } else { "uncompleting" },
                    id,
                    e
                ),
            }
        }

        affected
    }

    fn set_todo_completed(&self, id: i64, completed: bool) -> Result<Option<String>, StoreError> {
        self.conn.execute(
            "UPDATE todos SET completed = ?1 WHERE id = ?2",
            params![completed, id],
        )?;
        self.conn.execute(
            "UPDATE subtasks SET completed = ?1 WHERE todo_id = ?2",
            params![completed, id],
        )?;
        let text = self
            .conn
            .query_row("SELECT text FROM todos WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(text)
    }

    /// Marks subtasks as completed.
    pub fn complete_subtasks(&self, refs: &[SubtaskRef]) -> Vec<String> {
        self.set_subtasks_completed(refs, true)
    }

    /// Marks subtasks as incomplete.
    pub fn uncomplete_subtasks(&self, refs: &[SubtaskRef]) -> Vec<String> {
        self.set_subtasks_completed(refs, false)
    }

    fn set_subtasks_completed(&self, refs: &[SubtaskRef], completed: bool) -> Vec<String> {
        let mut affected = Vec::new();

        for r in refs {
            let result: Result<Option<String>, StoreError> = (|| {
                self.conn.execute(
                    "UPDATE subtasks SET completed = ?1 WHERE id = ?2",
                    params![completed, r.subtask_id],
                )?;
                Ok(self
                    .conn
                    .query_row(
                        "SELECT text FROM subtasks WHERE id = ?1",
                        params![r.subtask_id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })();

            match result {
                Ok(Some(text)) => affected.push(text),
                Ok(None) => {}
                Err(e) => tracing::error!(
                    "Error {} subtask {}: {}",
                    if completed { "completing" } else { "uncompleting" },
                    r.subtask_id,
                    e
                ),
            }
        }

        affected
    }

    /// Deletes todos (and, via the cascade, their subtasks), returning the
    /// texts of the todos that existed.
    pub fn delete_todos(&self, ids: &[i64]) -> Vec<String> {
        let mut deleted = Vec::new();

        for &id in ids {
            let result: Result<Option<String>, StoreError> = (|| {
                let text: Option<String> = self
                    .conn
                    .query_row("SELECT text FROM todos WHERE id = ?1", params![id], |row| {
                        row.get(0)
                    })
                    .optional()?;
                if text.is_some() {
                    self.conn
                        .execute("DELETE FROM todos WHERE id = ?1", params![id])?;
                }
                Ok(text)
            })();

            match result {
                Ok(Some(text)) => deleted.push(text),
                Ok(None) => tracing::debug!("Todo with id {} not found", id),
                Err(e) => tracing::error!("Error deleting todo {}: {}", id, e),
            }
        }

        deleted
    }

    /// Deletes subtasks, returning the texts of the subtasks that existed.
    pub fn delete_subtasks(&self, refs: &[SubtaskRef]) -> Vec<String> {
        let mut deleted = Vec::new();

        for r in refs {
            let result: Result<Option<String>, StoreError> = (|| {
                let text: Option<String> = self
                    .conn
                    .query_row(
                        "SELECT text FROM subtasks WHERE id = ?1",
                        params![r.subtask_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if text.is_some() {
                    self.conn
                        .execute("DELETE FROM subtasks WHERE id = ?1", params![r.subtask_id])?;
                }
                Ok(text)
            })();

            match result {
                Ok(Some(text)) => deleted.push(text),
                Ok(None) => tracing::debug!("Subtask with id {} not found", r.subtask_id),
                Err(e) => tracing::error!("Error deleting subtask {}: {}", r.subtask_id, e),
            }
        }

        deleted
    }
}

fn parse_timestamp(row: &rusqlite::Row<'_>, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
