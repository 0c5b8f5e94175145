use std::{future::Future, sync::Arc};

use actix_web::{
    delete, get,
    http::{header::ContentType, StatusCode},
    post, web, App, HttpResponse, HttpServer, ResponseError,
};
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument, Span};

use crate::config::Config;
use crate::database::{DatabaseError, SqlResult, TodoStore};
use crate::id::IdGenerator;
use crate::model::{Filter, NewTodo};
use crate::views::Views;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

pub struct AppState {
    pub store: TodoStore,
    pub views: Views,
    pub ids: Arc<dyn IdGenerator>,
    /// Parent of every request span; handlers log only inside it.
    pub span: Span,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("failed to render page: {0}")]
    Render(#[from] tera::Error),

    #[error("worker pool unavailable: {0}")]
    Blocking(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(DatabaseError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Database(DatabaseError::ConstraintViolation(_)) => StatusCode::CONFLICT,
            AppError::Database(DatabaseError::Validation(_)) => StatusCode::BAD_REQUEST,
            AppError::Database(DatabaseError::StorageUnavailable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Server-side detail stays in the log written by `traced`.
        let body = if status.is_server_error() {
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status)
            .content_type(ContentType::plaintext())
            .body(body)
    }
}

#[derive(Debug, Deserialize)]
struct AddTodoForm {
    #[serde(rename = "todoText", default)]
    todo_text: String,
    priority: Option<String>,
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilterQuery {
    filter: Option<String>,
}

/// Runs a store operation on the blocking pool.
async fn with_store<T, F>(state: &AppState, op: F) -> Result<T>
where
    F: FnOnce(&TodoStore) -> SqlResult<T> + Send + 'static,
    T: Send + 'static,
{
    let store = state.store.clone();
    let outcome = web::block(move || op(&store))
        .await
        .map_err(|e| AppError::Blocking(e.to_string()))?;
    Ok(outcome?)
}

/// Runs a handler body inside a request span parented on `AppState::span`
/// and logs its failure there.
async fn traced<F>(state: &AppState, route: &'static str, handler: F) -> Result<HttpResponse>
where
    F: Future<Output = Result<HttpResponse>>,
{
    let span = info_span!(parent: &state.span, "request", route);
    let outcome = handler.instrument(span.clone()).await;
    if let Err(e) = &outcome {
        span.in_scope(|| {
            if e.status_code().is_server_error() {
                error!(error = ?e, "request failed");
            } else {
                warn!(error = %e, "request rejected");
            }
        });
    }
    outcome
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok().content_type(ContentType::html()).body(body)
}

#[get("/")]
async fn index(state: web::Data<AppState>) -> Result<HttpResponse> {
    traced(&state, "GET /", async {
        info!("request received");
        let todos = with_store(&state, |store| store.list_all()).await?;
        Ok(html(state.views.index(&todos, Filter::All)?))
    })
    .await
}

#[post("/add-todo")]
async fn add_todo(state: web::Data<AppState>, form: web::Form<AddTodoForm>) -> Result<HttpResponse> {
    let form = form.into_inner();
    traced(&state, "POST /add-todo", async {
        let todo = NewTodo::new(form.todo_text, form.priority, form.category)
            .into_todo(state.ids.next_id(), Utc::now());
        info!(id = %todo.id, text = %todo.text, "adding todo");

        let todos = with_store(&state, move |store| {
            store.insert(&todo)?;
            store.list_all()
        })
        .await?;
        Ok(html(state.views.list(&todos)?))
    })
    .await
}

#[post("/toggle-todo/{id}")]
async fn toggle_todo(state: web::Data<AppState>, id: web::Path<String>) -> Result<HttpResponse> {
    let id = id.into_inner();
    traced(&state, "POST /toggle-todo", async {
        info!(%id, "request received");

        let todo = with_store(&state, move |store| {
            store.toggle_completion(&id)?;
            store.get_by_id(&id)
        })
        .await?;
        info!(id = %todo.id, completed = todo.completed, "toggled todo");
        Ok(html(state.views.item(&todo)?))
    })
    .await
}

#[delete("/delete-todo/{id}")]
async fn delete_todo(state: web::Data<AppState>, id: web::Path<String>) -> Result<HttpResponse> {
    let id = id.into_inner();
    traced(&state, "DELETE /delete-todo", async {
        info!(%id, "request received");

        let todos = with_store(&state, move |store| {
            store.delete(&id)?;
            store.list_all()
        })
        .await?;
        Ok(html(state.views.list(&todos)?))
    })
    .await
}

#[get("/todos")]
async fn list_todos(state: web::Data<AppState>, query: web::Query<FilterQuery>) -> Result<HttpResponse> {
    let filter = Filter::parse(query.filter.as_deref().unwrap_or_default());
    traced(&state, "GET /todos", async {
        info!(filter = filter.as_str(), "request received");

        let todos = with_store(&state, move |store| store.list_filtered(filter)).await?;
        Ok(html(state.views.list(&todos)?))
    })
    .await
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(add_todo)
        .service(toggle_todo)
        .service(delete_todo)
        .service(list_todos);
}

pub async fn run(config: &Config, state: AppState) -> std::io::Result<()> {
    let state = web::Data::new(state);

    let mut server = HttpServer::new(move || App::new().app_data(state.clone()).configure(self::config));
    if let Some(workers) = config.workers {
        server = server.workers(workers);
    }
    let server = server.bind(&config.bind)?.run();

    info!(bind = %config.bind, "server starting");
    server.await
}
