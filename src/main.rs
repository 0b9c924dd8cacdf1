// src/main.rs
use actix_web::{App, HttpServer, middleware, web};
use log::{info, warn};
use std::sync::Arc;

mod canvas;
mod config;
mod errors;
mod handlers;
mod models;
mod services;
mod session;

use crate::config::Config;
use crate::services::HttpBackend;
use crate::session::DesignSession;

#[derive(Clone)]
pub struct AppState {
    session: Arc<DesignSession>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting tee-canvas service...");

    let config = Config::from_env()?;
    let backend = Arc::new(HttpBackend::from_config(&config)?);
    let session = Arc::new(DesignSession::from_config(backend, &config));

    if !session.preflight().await {
        warn!(
            "Design service at {} is not answering, continuing anyway",
            config.design_api_url
        );
    }

    let app_state = AppState {
        session: Arc::clone(&session),
    };

    info!("Starting HTTP server on {}", config.bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await?;

    session.dispose().await;
    info!("Canvas session disposed");
    Ok(())
}
