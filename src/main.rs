use std::error::Error;
use std::sync::Arc;

use slog::info;
use url::Url;

use backend::config::{get_variable, get_variable_or};
use backend::db::PgDb;
use backend::environment::{Config, Environment};
use backend::external::Unintegrated;
use backend::log::initialize_logger;
use backend::routes;
use backend::store::DiskStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let logger = Arc::new(initialize_logger());

    let port: u16 = get_variable_or("BACKEND_PORT", "8080")
        .parse()
        .expect("parse BACKEND_PORT as u16");
    let environment_name = get_variable_or("BACKEND_ENVIRONMENT", "production");

    info!(logger, "Starting..."; "port" => port, "environment" => environment_name.as_str());

    info!(logger, "Creating database pool...");
    let connection_string = get_variable("BACKEND_DB_CONNECTION_STRING");
    let pool = sqlx::postgres::PgPool::connect(&connection_string)
        .await
        .expect("create database pool from BACKEND_DB_CONNECTION_STRING");
    let db = PgDb::new(pool);
    db.ensure_schema().await.expect("ensure diagnoses schema");

    let store = Arc::new(
        DiskStore::new(get_variable_or("BACKEND_UPLOADS_PATH", "uploads"))
            .expect("create evidence staging directory"),
    );

    let audio_base = Url::parse(&get_variable_or(
        "BACKEND_AUDIO_BASE_URL",
        &format!("http://localhost:{}/", port),
    ))
    .expect("parse BACKEND_AUDIO_BASE_URL");
    let engines = Arc::new(Unintegrated::new(audio_base));

    let config = Config::new(environment_name != "production");
    let environment = Environment::new(
        logger.clone(),
        Arc::new(db),
        store,
        engines.clone(),
        engines,
        config,
    );

    let routes = routes::make_api(environment);

    let (address, server) =
        warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async {
            tokio::signal::ctrl_c()
                .await
                .expect("listen for shutdown signal");
        });

    info!(logger, "Listening..."; "address" => %address);

    server.await;

    info!(logger, "Exiting gracefully...");

    Ok(())
}
