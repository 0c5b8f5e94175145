use std::path::PathBuf;

use clap::Parser;

/// Server-rendered todo list backed by SQLite.
#[derive(Parser, Debug, Clone)]
#[command(name = "todo-web", version, about, long_about = None)]
pub struct Config {
    /// SQLite database file, created on first start
    #[arg(long, env = "TODO_DB_PATH", default_value = "./todos.db")]
    pub db_path: PathBuf,

    /// Address the HTTP server listens on
    #[arg(long, env = "TODO_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Number of HTTP worker threads (defaults to one per core)
    #[arg(long, env = "TODO_WORKERS")]
    pub workers: Option<usize>,
}
