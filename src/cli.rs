//! CLI module
//!
//! This module provides the command-line interface for todochat: starting
//! the server, chatting with the assistant, and driving the todo CRUD
//! endpoints directly.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;

use crate::{
    api::{serve, Client, ClientConfig, ServerConfig},
    core::Core,
    llm::{ModelConfig, OpenAiClient},
    models::{parse_id_list, NewTodo, SubtaskRef, Todo},
    store::TodoStore,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API server URL
    #[arg(short, long, default_value = "http://localhost:3000")]
    server: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the todochat API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,

        /// Path to the SQLite database file
        #[arg(long, default_value = "todochat.db")]
        db: PathBuf,

        /// API key for the chat-completion service
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Model to request
        #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
        model: String,

        /// Base URL of the chat-completion service
        #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
        base_url: String,
    },

    /// Chat with the assistant (one message, or interactively)
    Chat {
        /// Message to send; omit for an interactive session
        message: Option<String>,
    },

    /// Todo management commands
    Todo {
        #[command(subcommand)]
        command: TodoCommands,
    },

    /// Subtask management commands
    Sub {
        #[command(subcommand)]
        command: SubCommands,
    },

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum TodoCommands {
    /// Add a new todo
    Add {
        /// Todo text
        text: String,

        /// Initial subtasks (repeatable)
        #[arg(short = 'u', long = "subtask")]
        subtasks: Vec<String>,
    },

    /// List all todos with their subtasks
    List,

    /// Mark todos as completed (comma-separated ids, e.g. 1,2,3)
    Done { ids: String },

    /// Mark todos as incomplete (comma-separated ids)
    Undone { ids: String },

    /// Delete todos (comma-separated ids); their subtasks are deleted too
    Rm { ids: String },
}

#[derive(Subcommand)]
enum SubCommands {
    /// Add subtasks to a todo
    Add {
        /// Parent todo id
        todo_id: i64,

        /// Subtask texts
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// Mark subtasks of a todo as completed (comma-separated subtask ids)
    Done { todo_id: i64, ids: String },

    /// Mark subtasks of a todo as incomplete (comma-separated subtask ids)
    Undone { todo_id: i64, ids: String },

    /// Delete subtasks of a todo (comma-separated subtask ids)
    Rm { todo_id: i64, ids: String },
}

/// Run the CLI application
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve {
            port,
            db,
            api_key,
            model,
            base_url,
        } => {
            println!("Starting todochat API server on port {}...", port);

            let store = TodoStore::open(db)?;
            let model = OpenAiClient::new(ModelConfig::new(
                api_key.clone(),
                model.clone(),
                base_url.clone(),
            ));
            let core = Core::new(store, Arc::new(model));

            let config = ServerConfig {
                address: ([127, 0, 0, 1], *port).into(),
            };

            serve(core, config).await?;
            Ok(())
        }

        Commands::Chat { message } => {
            let client = create_client(&cli.server);

            match message {
                Some(message) => {
                    let reply = client.chat(message.clone()).await?;
                    println!("{} {}", "assistant:".green().bold(), reply.reply);
                    Ok(())
                }
                None => run_chat_repl(&client).await,
            }
        }

        Commands::Todo { command } => {
            let client = create_client(&cli.server);
            match command {
                TodoCommands::Add { text, subtasks } => {
                    let added = client
                        .add_todos(vec![NewTodo {
                            text: text.clone(),
                            subtasks: subtasks.clone(),
                        }])
                        .await?;
                    for text in added {
                        println!("Added todo: \"{}\"", text);
                    }
                    Ok(())
                }

                TodoCommands::List => {
                    let todos = client.list_todos().await?;
                    print_todos(&todos);
                    Ok(())
                }

                TodoCommands::Done { ids } => {
                    let affected = client.complete_todos(parse_id_list(ids)?).await?;
                    report("Completed", &affected);
                    Ok(())
                }

                TodoCommands::Undone { ids } => {
                    let affected = client.uncomplete_todos(parse_id_list(ids)?).await?;
                    report("Marked incomplete", &affected);
                    Ok(())
                }

                TodoCommands::Rm { ids } => {
                    let deleted = client.delete_todos(parse_id_list(ids)?).await?;
                    report("Deleted", &deleted);
                    Ok(())
                }
            }
        }

        Commands::Sub { command } => {
            let client = create_client(&cli.server);
            match command {
                SubCommands::Add { todo_id, texts } => {
                    let added = client.add_subtasks(*todo_id, texts.clone()).await?;
                    for text in added {
                        println!("Added subtask to todo {}: \"{}\"", todo_id, text);
                    }
                    Ok(())
                }

                SubCommands::Done { todo_id, ids } => {
                    let refs = subtask_refs(*todo_id, ids)?;
                    let affected = client.complete_subtasks(refs).await?;
                    report("Completed", &affected);
                    Ok(())
                }

                SubCommands::Undone { todo_id, ids } => {
                    let refs = subtask_refs(*todo_id, ids)?;
                    let affected = client.uncomplete_subtasks(refs).await?;
                    report("Marked incomplete", &affected);
                    Ok(())
                }

                SubCommands::Rm { todo_id, ids } => {
                    let refs = subtask_refs(*todo_id, ids)?;
                    let deleted = client.delete_subtasks(refs).await?;
                    report("Deleted", &deleted);
                    Ok(())
                }
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn create_client(server: &str) -> Client {
    Client::with_config(ClientConfig {
        base_url: server.to_string(),
    })
}

fn subtask_refs(todo_id: i64, ids: &str) -> Result<Vec<SubtaskRef>, std::num::ParseIntError> {
    Ok(parse_id_list(ids)?
        .into_iter()
        .map(|subtask_id| SubtaskRef {
            todo_id,
            subtask_id,
        })
        .collect())
}

fn report(verb: &str, texts: &[String]) {
    if texts.is_empty() {
        println!("No matching items.");
        return;
    }
    for text in texts {
        println!("{}: \"{}\"", verb, text);
    }
}

fn print_todos(todos: &[Todo]) {
    if todos.is_empty() {
        println!("No todos currently.");
        return;
    }

    for todo in todos {
        let status = if todo.completed {
            "✓".green()
        } else {
            "○".yellow()
        };
        let text = if todo.completed {
            todo.text.strikethrough().dimmed()
        } else {
            todo.text.normal()
        };
        println!("{} #{} {}", status, todo.id, text);

        for subtask in &todo.subtasks {
            let status = if subtask.completed {
                "✓".green()
            } else {
                "○".yellow()
            };
            let text = if subtask.completed {
                subtask.text.strikethrough().dimmed()
            } else {
                subtask.text.normal()
            };
            println!("    {} #{} {}", status, subtask.id, text);
        }
    }
}

async fn run_chat_repl(client: &Client) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "todochat interactive session (ctrl-d to exit)".bold());

    let stdin = io::stdin();
    loop {
        print!("{} ", "you:".cyan().bold());
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            return Ok(());
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        match client.chat(message.to_string()).await {
            Ok(reply) => {
                println!("{} {}", "assistant:".green().bold(), reply.reply);
                print_todos(&reply.todos);
            }
            Err(e) => {
                eprintln!("{} {}", "error:".red().bold(), e);
            }
        }
    }
}
