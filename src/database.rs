use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::model::{Filter, Todo};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rusqlite::{params, types::Type, Connection, ErrorCode, Row};
use thiserror::Error;
use tracing::{debug, info, warn, Span};

/// Fixed width so that text ordering in SQL is chronological ordering.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";
/// Layouts written by other SQLite clients (Go's database/sql among them),
/// read so that pre-existing databases keep working.
const ZONED_LAYOUTS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%:z"];
const NAIVE_LAYOUTS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_TODOS: &str = "SELECT id, text, completed, created_at, priority, category FROM todos";

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("todo '{0}' not found")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid todo: {0}")]
    Validation(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(error: rusqlite::Error) -> Self {
        match error {
            rusqlite::Error::SqliteFailure(ref failure, ref message)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                DatabaseError::ConstraintViolation(
                    message.clone().unwrap_or_else(|| failure.to_string()),
                )
            }
            other => DatabaseError::StorageUnavailable(Box::new(other)),
        }
    }
}

impl From<std::io::Error> for DatabaseError {
    fn from(error: std::io::Error) -> Self {
        DatabaseError::StorageUnavailable(Box::new(error))
    }
}

pub type SqlResult<T> = std::result::Result<T, DatabaseError>;

/// Durable store for todo records backed by a single SQLite file.
///
/// Every operation opens its own connection, so a `TodoStore` can be cloned
/// freely into concurrent requests. Log events are emitted inside the span
/// handed to [`TodoStore::open`].
#[derive(Debug, Clone)]
pub struct TodoStore {
    path: PathBuf,
    span: Span,
}

impl TodoStore {
    /// Opens (creating if needed) the database file and its schema.
    pub fn open(path: impl Into<PathBuf>, span: Span) -> SqlResult<Self> {
        let store = TodoStore {
            path: path.into(),
            span,
        };
        let entered = store.span.enter();

        ensure_parent_dir(&store.path)?;
        let conn = store.connect()?;
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", params![], |row| row.get(0))?;
        init_db(&conn)?;
        let rewritten = normalize_timestamps(&conn)?;
        if rewritten > 0 {
            info!(rewritten, "normalized legacy created_at values");
        }
        info!(path = %store.path.display(), %journal_mode, "todo store ready");
        drop(entered);

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> SqlResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    pub fn insert(&self, todo: &Todo) -> SqlResult<()> {
        let _entered = self.span.enter();
        if todo.text.trim().is_empty() {
            warn!(id = %todo.id, "rejecting todo with empty text");
            return Err(DatabaseError::Validation("text must not be empty".to_string()));
        }

        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO todos (id, text, completed, created_at, priority, category) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                todo.id,
                todo.text,
                todo.completed,
                format_timestamp(&todo.created_at),
                todo.priority,
                todo.category
            ],
        )?;
        debug!(id = %todo.id, "inserted todo");

        Ok(())
    }

    pub fn list_all(&self) -> SqlResult<Vec<Todo>> {
        self.list_filtered(Filter::All)
    }

    pub fn list_filtered(&self, filter: Filter) -> SqlResult<Vec<Todo>> {
        let _entered = self.span.enter();
        let conn = self.connect()?;

        let sql = match filter {
            Filter::All => format!("{SELECT_TODOS} ORDER BY created_at DESC"),
            Filter::Active => format!("{SELECT_TODOS} WHERE completed = 0 ORDER BY created_at DESC"),
            Filter::Completed => {
                format!("{SELECT_TODOS} WHERE completed = 1 ORDER BY created_at DESC")
            }
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![], todo_from_row)?;
        let todos = rows.collect::<rusqlite::Result<Vec<Todo>>>()?;
        debug!(filter = filter.as_str(), count = todos.len(), "listed todos");

        Ok(todos)
    }

    pub fn get_by_id(&self, id: &str) -> SqlResult<Todo> {
        let _entered = self.span.enter();
        let conn = self.connect()?;

        let sql = format!("{SELECT_TODOS} WHERE id = ?1");
        match conn.query_row(&sql, params![id], todo_from_row) {
            Ok(todo) => Ok(todo),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(DatabaseError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Flips `completed`. A missing id is reported as `NotFound`.
    pub fn toggle_completion(&self, id: &str) -> SqlResult<()> {
        let _entered = self.span.enter();
        let conn = self.connect()?;

        let changed = conn.execute(
            "UPDATE todos SET completed = NOT completed WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound(id.to_string()));
        }
        debug!(%id, "toggled todo");

        Ok(())
    }

    /// Removes the record. A missing id is reported as `NotFound`.
    pub fn delete(&self, id: &str) -> SqlResult<()> {
        let _entered = self.span.enter();
        let conn = self.connect()?;

        let changed = conn.execute("DELETE FROM todos WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(DatabaseError::NotFound(id.to_string()));
        }
        debug!(%id, "deleted todo");

        Ok(())
    }
}

fn ensure_parent_dir(path: &Path) -> SqlResult<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.is_dir() {
            fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

fn init_db(conn: &Connection) -> SqlResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS todos (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            completed INTEGER NOT NULL,
            created_at DATETIME NOT NULL,
            priority TEXT,
            category TEXT
        )",
        params![],
    )?;

    Ok(())
}

/// Rewrites `created_at` values stored in any readable layout to
/// `TIMESTAMP_FORMAT`. Unreadable values are left alone and logged.
fn normalize_timestamps(conn: &Connection) -> SqlResult<usize> {
    let mut stmt = conn.prepare("SELECT id, created_at FROM todos")?;
    let rows = stmt.query_map(params![], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let stored = rows.collect::<rusqlite::Result<Vec<(String, String)>>>()?;

    let mut rewritten = 0;
    for (id, created_at) in stored {
        if NaiveDateTime::parse_from_str(&created_at, TIMESTAMP_FORMAT).is_ok() {
            continue;
        }
        match parse_timestamp(&created_at) {
            Ok(at) => {
                conn.execute(
                    "UPDATE todos SET created_at = ?2 WHERE id = ?1",
                    params![id, format_timestamp(&at)],
                )?;
                rewritten += 1;
            }
            Err(e) => warn!(%id, %created_at, error = %e, "unreadable created_at"),
        }
    }

    Ok(rewritten)
}

fn todo_from_row(row: &Row<'_>) -> rusqlite::Result<Todo> {
    let created_at: String = row.get(3)?;
    Ok(Todo {
        id: row.get(0)?,
        text: row.get(1)?,
        completed: row.get(2)?,
        created_at: parse_timestamp(&created_at)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
        priority: row.get::<_, Option<String>>(4)?.filter(|v| !v.is_empty()),
        category: row.get::<_, Option<String>>(5)?.filter(|v| !v.is_empty()),
    })
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Ok(at.with_timezone(&Utc));
    }
    for layout in ZONED_LAYOUTS {
        if let Ok(at) = DateTime::parse_from_str(text, layout) {
            return Ok(at.with_timezone(&Utc));
        }
    }
    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, layout) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(|date| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}
