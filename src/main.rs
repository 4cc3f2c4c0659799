use std::sync::Arc;

use log::{error, info};
use rpg_persistence_sqlite::{
    characters::SqliteCharacterRepository, create_db_pool, fights::SqliteFightRepository,
    migrations::run_migrations,
};
use rpg_server_domain::{
    app::construct_app, character::ArcCharacterRepository, fight::ArcFightRepository,
};

mod config;
mod logs;

use config::Config;

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received. Preparing graceful exit...");
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env().expect("Invalid configuration");
    logs::init_logger(&config.log_file_path, &config.log_archive_pattern)
        .expect("Failed to initialize logger");

    let pool = create_db_pool(&config.db_path, config.db_max_connections)
        .await
        .expect("Failed to open database");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let character_repo: ArcCharacterRepository =
        Arc::new(Box::new(SqliteCharacterRepository::new(pool.clone())));
    let fight_repo: ArcFightRepository =
        Arc::new(Box::new(SqliteFightRepository::new(pool.clone())));
    let app = construct_app(character_repo, fight_repo);

    info!("Starting application");

    if let Err(e) = rpg_server_http_api::run(app, config.http_api_port, shutdown_signal()).await {
        error!("HTTP API failed: {}", e);
    }

    pool.close().await;
}
