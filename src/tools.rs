//! Tool definitions and dispatch
//!
//! The model is offered a fixed set of eight CRUD tools over the todo store.
//! Each tool takes a strict JSON object; dispatch decodes the arguments and
//! hands them to the corresponding store operation, returning the texts of
//! the affected items as the tool result.

use lazy_static::lazy_static;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{NewTodo, SubtaskRef};
use crate::store::TodoStore;

/// Tool dispatch errors
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {name}: {source}")]
    BadArguments {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

lazy_static! {
    /// The tool schemas sent with every chat-completion request.
    pub static ref TOOL_SCHEMAS: Vec<Value> = vec![
        function_tool(
            "add_todos",
            "Add multiple new todo items to the list with subtasks",
            json!({
                "type": "object",
                "properties": {
                    "todos": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "text": {
                                    "type": "string",
                                    "description": "The title of the todo item"
                                },
                                "subtasks": {
                                    "type": "array",
                                    "items": { "type": "string" },
                                    "description": "An array of subtasks for the todo item"
                                }
                            },
                            "required": ["text", "subtasks"],
                            "additionalProperties": false
                        },
                        "description": "An array of todo items to add"
                    }
                },
                "required": ["todos"],
                "additionalProperties": false
            }),
        ),
        function_tool(
            "add_subtasks",
            "Add subtasks to an existing todo item",
            json!({
                "type": "object",
                "properties": {
                    "todo_id": {
                        "type": "number",
                        "description": "The ID of the todo item to add subtasks to"
                    },
                    "subtasks": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "An array of subtasks to add"
                    }
                },
                "required": ["todo_id", "subtasks"],
                "additionalProperties": false
            }),
        ),
        function_tool(
            "complete_todos",
            "Mark todo items as completed",
            todo_ids_schema("An array of todo item IDs to mark as completed"),
        ),
        function_tool(
            "complete_subtasks",
            "Mark subtasks as completed",
            subtask_refs_schema(
                "An array of subtask IDs to mark as completed, with their parent todo IDs"
            ),
        ),
        function_tool(
            "uncomplete_todos",
            "Mark todo items as incomplete",
            todo_ids_schema("An array of todo item IDs to mark as incomplete"),
        ),
        function_tool(
            "uncomplete_subtasks",
            "Mark subtasks as incomplete",
            subtask_refs_schema(
                "An array of subtask IDs to mark as incomplete, with their parent todo IDs"
            ),
        ),
        function_tool(
            "delete_todos",
            "Delete todo items from the list",
            todo_ids_schema("An array of todo item IDs to delete"),
        ),
        function_tool(
            "delete_subtasks",
            "Delete subtasks from todo items",
            subtask_refs_schema("An array of subtask IDs to delete, with their parent todo IDs"),
        ),
    ];
}

fn function_tool(name: &str, description: &str, parameters: Value) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "strict": true,
            "parameters": parameters,
        }
    })
}

fn todo_ids_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "ids": {
                "type": "array",
                "items": { "type": "number" },
                "description": description
            }
        },
        "required": ["ids"],
        "additionalProperties": false
    })
}

fn subtask_refs_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "subtask_ids": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "todo_id": { "type": "number" },
                        "subtask_id": { "type": "number" }
                    },
                    "required": ["todo_id", "subtask_id"],
                    "additionalProperties": false
                },
                "description": description
            }
        },
        "required": ["subtask_ids"],
        "additionalProperties": false
    })
}

#[derive(Deserialize)]
struct AddTodosArgs {
    todos: Vec<NewTodo>,
}

#[derive(Deserialize)]
struct AddSubtasksArgs {
    todo_id: i64,
    subtasks: Vec<String>,
}

#[derive(Deserialize)]
struct TodoIdsArgs {
    ids: Vec<i64>,
}

#[derive(Deserialize)]
struct SubtaskRefsArgs {
    subtask_ids: Vec<SubtaskRef>,
}

fn parse_args<'a, T: Deserialize<'a>>(name: &str, arguments: &'a str) -> Result<T, ToolError> {
    serde_json::from_str(arguments).map_err(|source| ToolError::BadArguments {
        name: name.to_string(),
        source,
    })
}

/// Dispatches a tool invocation by name against the store.
///
/// Returns the texts of the items the operation applied to, which become the
/// tool-result message fed back to the model.
pub fn dispatch(store: &TodoStore, name: &str, arguments: &str) -> Result<Vec<String>, ToolError> {
    match name {
        "add_todos" => {
            let args: AddTodosArgs = parse_args(name, arguments)?;
            Ok(store.add_todos(&args.todos))
        }
        "add_subtasks" => {
            let args: AddSubtasksArgs = parse_args(name, arguments)?;
            Ok(store.add_subtasks(args.todo_id, &args.subtasks))
        }
        "complete_todos" => {
            let args: TodoIdsArgs = parse_args(name, arguments)?;
            Ok(store.complete_todos(&args.ids))
        }
        "complete_subtasks" => {
            let args: SubtaskRefsArgs = parse_args(name, arguments)?;
            Ok(store.complete_subtasks(&args.subtask_ids))
        }
        "uncomplete_todos" => {
            let args: TodoIdsArgs = parse_args(name, arguments)?;
            Ok(store.uncomplete_todos(&args.ids))
        }
        "uncomplete_subtasks" => {
            let args: SubtaskRefsArgs = parse_args(name, arguments)?;
            Ok(store.uncomplete_subtasks(&args.subtask_ids))
        }
        "delete_todos" => {
            let args: TodoIdsArgs = parse_args(name, arguments)?;
            Ok(store.delete_todos(&args.ids))
        }
        "delete_subtasks" => {
            let args: SubtaskRefsArgs = parse_args(name, arguments)?;
            Ok(store.delete_subtasks(&args.subtask_ids))
        }
        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_names() {
        let names: Vec<&str> = TOOL_SCHEMAS
            .iter()
            .map(|t| t["function"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "add_todos",
                "add_subtasks",
                "complete_todos",
                "complete_subtasks",
                "uncomplete_todos",
                "uncomplete_subtasks",
                "delete_todos",
                "delete_subtasks",
            ]
        );
        for tool in TOOL_SCHEMAS.iter() {
            assert_eq!(tool["type"], "function");
            assert_eq!(tool["function"]["strict"], true);
            assert_eq!(
                tool["function"]["parameters"]["additionalProperties"],
                false
            );
        }
    }

    #[test]
    fn test_dispatch_add_and_complete() {
        let store = TodoStore::open_in_memory().unwrap();

        let added = dispatch(
            &store,
            "add_todos",
            r#"{"todos": [{"text": "Ship release", "subtasks": ["Tag", "Announce"]}]}"#,
        )
        .unwrap();
        assert_eq!(added, vec!["Ship release"]);

        let id = store.refresh_todos().unwrap()[0].id;
        let completed = dispatch(
            &store,
            "complete_todos",
            &format!(r#"{{"ids": [{}]}}"#, id),
        )
        .unwrap();
        assert_eq!(completed, vec!["Ship release"]);
        assert!(store.refresh_todos().unwrap()[0].completed);
    }

    #[test]
    fn test_dispatch_subtask_tools() {
        let store = TodoStore::open_in_memory().unwrap();
        dispatch(
            &store,
            "add_todos",
            r#"{"todos": [{"text": "Parent", "subtasks": []}]}"#,
        )
        .unwrap();
        let todo_id = store.refresh_todos().unwrap()[0].id;

        let added = dispatch(
            &store,
            "add_subtasks",
            &format!(r#"{{"todo_id": {}, "subtasks": ["Child"]}}"#, todo_id),
        )
        .unwrap();
        assert_eq!(added, vec!["Child"]);

        let subtask_id = store.refresh_todos().unwrap()[0].subtasks[0].id;
        let args = format!(
            r#"{{"subtask_ids": [{{"todo_id": {}, "subtask_id": {}}}]}}"#,
            todo_id, subtask_id
        );
        assert_eq!(
            dispatch(&store, "complete_subtasks", &args).unwrap(),
            vec!["Child"]
        );
        assert_eq!(
            dispatch(&store, "uncomplete_subtasks", &args).unwrap(),
            vec!["Child"]
        );
        assert_eq!(
            dispatch(&store, "delete_subtasks", &args).unwrap(),
            vec!["Child"]
        );
    }

    #[test]
    fn test_dispatch_unknown_tool() {
        let store = TodoStore::open_in_memory().unwrap();
        let err = dispatch(&store, "drop_tables", "{}").unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(name) if name == "drop_tables"));
    }

    #[test]
    fn test_dispatch_bad_arguments() {
        let store = TodoStore::open_in_memory().unwrap();
        let err = dispatch(&store, "complete_todos", r#"{"ids": "not-a-list"}"#).unwrap_err();
        assert!(matches!(err, ToolError::BadArguments { name, .. } if name == "complete_todos"));
    }
}
