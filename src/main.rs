use anyhow::Context;
use axum::ServiceExt;
use axum::extract::Request;
use dotenv::dotenv;
use std::sync::Arc;
use todo_web::config::AppConfig;
use todo_web::{SharedData, build_app, db, logging};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv().ok();

    let otel_exporters = logging::OtelEndpoints::from_env()
        .map(|endpoints| logging::init_exporters(&endpoints))
        .transpose()?;
    logging::setup_logging_and_tracing(logging::init_env_filter()?, otel_exporters)?;

    let config = AppConfig::from_env()?;
    info!(listen_addr = %config.listen_addr, "Starting todo-web");

    let pool = db::connect_sqlx(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let shared_data = Arc::new(SharedData::new(pool, config.session));
    let app = build_app(shared_data);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding to {}", config.listen_addr))?;
    info!("Listening for requests");
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .await
        .context("serving HTTP requests")?;

    Ok(())
}
