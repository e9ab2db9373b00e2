use std::io;

use actix_web::{middleware::Logger, web, App, HttpServer};
use log::{error, info, warn};

use partition_gate::api;
use partition_gate::app_state::AppState;
use partition_gate::config::AppConfig;
use partition_gate::service::SweepWorker;

/// log4rs from the configured file, stderr via env_logger otherwise
fn init_logging(config_file: &str) {
    if let Err(e) = log4rs::init_file(config_file, Default::default()) {
        let _ = env_logger::try_init();
        warn!("Could not load log config {}: {}; logging to stderr", config_file, e);
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            let _ = env_logger::try_init();
            error!("Failed to load configuration: {}", e);
            return Err(io::Error::new(io::ErrorKind::InvalidInput, e.to_string()));
        }
    };
    init_logging(&config.logging.config_file);

    let state = AppState::from_config(config).map_err(|e| {
        error!("Failed to initialize backends: {}", e);
        io::Error::new(io::ErrorKind::Other, e.to_string())
    })?;

    if state.config.sweep.enabled {
        SweepWorker::new(state.sweeper.clone(), &state.config.sweep).start_background();
    }

    let host = state.config.server.host.clone();
    let port = state.config.server.port;
    let workers = state.config.server.workers;
    info!("Starting server on {}:{}", host, port);

    let data = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(data.clone())
            .configure(api::configure)
    })
    .workers(workers)
    .bind((host.as_str(), port))?
    .run()
    .await
}
