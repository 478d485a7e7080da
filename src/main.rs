use actix_web::{web, App, HttpServer};
use clap::Parser;
use log::info;

use chess_sync::config::RelayConfig;
use chess_sync::models::AppState;
use chess_sync::routes::configure_routes;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = RelayConfig::parse();
    let time_control = config.time_control();
    info!(
        "Starting chess relay at ws://{}:{}/ws ({} ms + {} ms per move)",
        config.host, config.port, time_control.initial_ms, time_control.increment_ms
    );

    let app_state = web::Data::new(AppState::from_config(&config));

    HttpServer::new(move || App::new().app_data(app_state.clone()).configure(configure_routes))
        .bind(config.bind_address())?
        .run()
        .await
}
