//! Process entry point: parses config, builds the connection pool and
//! `AppState`, and runs the `actix_web::HttpServer` the way the teacher's
//! `ServicesBuilder::run` does (§services/mod.rs) -- minus the websocket
//! and extractor-handle wiring this core has no use for.

mod auth;
mod config;
mod dto;
mod error;
mod routes;
mod state;

use actix_web::{web, App, HttpServer};
use clap::Parser;

use crate::config::Config;
use crate::state::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::parse();
    let bind_addr = config.bind_addr.clone();

    let pool = chronograph_storage::connect(&config.database_url).await?;
    let state = web::Data::new(AppState::new(pool, config));

    tracing::info!(%bind_addr, "starting chronograph-api");
    HttpServer::new(move || App::new().app_data(state.clone()).configure(routes::configure))
        .bind(&bind_addr)?
        .run()
        .await?;

    Ok(())
}
