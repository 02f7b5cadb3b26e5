//! HTTP entry point for the network diagnostics toolbox.
//!
//! Serves `/api/{ping,whois,nslookup,fast}` and the static page under `/static`.

mod config;
mod error;
mod handlers;
mod logging;
mod state;

use std::process::ExitCode;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::{Method, header};
use actix_web::{App, HttpServer, middleware, web};
use config::AppConfig;
use state::{AppState, DefaultToolboxGateway};

/// Preflight cache lifetime (12h).
const CORS_MAX_AGE_SECS: usize = 12 * 60 * 60;

#[actix_web::main]
async fn main() -> ExitCode {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    // guard 需存活到进程退出
    let _log_guard = match logging::init(&config.log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    match serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Server error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let gateway = DefaultToolboxGateway::from_config(&config)?;
    let state = web::Data::new(AppState::new(Arc::new(gateway), &config));

    let static_path = config.server.static_path.clone();
    if !static_path.is_dir() {
        tracing::warn!("Static directory {} does not exist", static_path.display());
    }
    let workers = config.server.workers.unwrap_or_else(num_cpus::get);

    tracing::info!(
        "Starting netdiag on {} ({workers} workers, static files from {})",
        config.server.bind,
        static_path.display()
    );

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods([Method::GET, Method::POST, Method::HEAD])
            .allowed_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
            .max_age(CORS_MAX_AGE_SECS);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(handlers::configure)
            .service(actix_files::Files::new("/static", &static_path))
    })
    .workers(workers)
    .bind(&config.server.bind)?
    .run()
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}
