use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Todo {
    pub id: String,
    pub text: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub priority: Option<String>,
    pub category: Option<String>,
}

/// A todo as submitted by the add form, before it has an id or a timestamp.
#[derive(Debug, Clone, Default)]
pub struct NewTodo {
    pub text: String,
    pub priority: Option<String>,
    pub category: Option<String>,
}

impl NewTodo {
    pub fn new(text: impl Into<String>, priority: Option<String>, category: Option<String>) -> Self {
        NewTodo {
            text: text.into(),
            priority: non_blank(priority),
            category: non_blank(category),
        }
    }

    pub fn into_todo(self, id: String, created_at: DateTime<Utc>) -> Todo {
        Todo {
            id,
            text: self.text,
            completed: false,
            created_at,
            priority: self.priority,
            category: self.category,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    All,
    Active,
    Completed,
}

impl Filter {
    /// Unknown or empty names fall back to `All`.
    pub fn parse(name: &str) -> Filter {
        match name {
            "active" => Filter::Active,
            "completed" => Filter::Completed,
            _ => Filter::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Filter::All => "all",
            Filter::Active => "active",
            Filter::Completed => "completed",
        }
    }
}
