use std::{error::Error, sync::Arc};

use clap::Parser;
use tracing::{error, info, info_span};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::database::TodoStore;
use crate::id::UuidGenerator;
use crate::server::AppState;
use crate::views::Views;

mod config;
mod database;
mod id;
mod model;
mod server;
mod views;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::parse();
    init_tracing();

    // Without its table the app cannot serve anything.
    let span = info_span!("todo_store", db = %config.db_path.display());
    let store = TodoStore::open(config.db_path.clone(), span).map_err(|e| {
        error!("failed to open database: {e}");
        e
    })?;
    let views = Views::new()?;
    info!(path = %store.path().display(), "database opened");

    let state = AppState {
        store,
        views,
        ids: Arc::new(UuidGenerator),
        span: info_span!("http"),
    };
    server::run(&config, state).await?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(true).with_line_number(true))
        .init();
}
