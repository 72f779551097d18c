mod config;
mod db;
mod domain;
mod middleware;
mod state;
mod time_utils;
mod web;

use crate::config::Config;
use crate::db::seed;
use crate::state::{AppState, SharedState};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to run database migrations: {}", e);
            e
        })?;
    tracing::info!("Database migrations completed");

    seed::seed_all(&pool, &config.admin_password).await?;

    let bind_addr = config.bind_addr.clone();
    let shared: SharedState = Arc::new(AppState::new(pool, config));

    let scheduler = JobScheduler::new().await?;

    // Nightly ranking rebuild for the current local year
    let shared_for_ranking = shared.clone();
    scheduler
        .add(Job::new_async("0 30 1 * * *", move |_uuid, _l| {
            let state = shared_for_ranking.clone();
            Box::pin(async move {
                let year = time_utils::local_year(state.config.timezone, chrono::Utc::now());
                if let Err(e) = web::stats::recompute_year(&state, year).await {
                    tracing::error!("Scheduled ranking recompute for {} failed: {}", year, e);
                }
            })
        })?)
        .await?;

    // Unpublish surveys whose window has ended
    let shared_for_close = shared.clone();
    scheduler
        .add(Job::new_async("0 */15 * * * *", move |_uuid, _l| {
            let state = shared_for_close.clone();
            Box::pin(async move {
                match db::close_expired_surveys(&state.pool, chrono::Utc::now()).await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!("Closed {} expired surveys", n),
                    Err(e) => tracing::error!("Failed to close expired surveys: {}", e),
                }
            })
        })?)
        .await?;

    let shared_for_cleanup = shared.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let state = shared_for_cleanup.clone();
            Box::pin(async move {
                let active = state.login_limiter.cleanup().await;
                tracing::debug!("Login limiter tracking {} clients", active);
            })
        })?)
        .await?;

    scheduler.start().await?;
    tracing::info!("Scheduler started:");
    tracing::info!("  - Ranking recompute: 01:30 daily");
    tracing::info!("  - Expired survey close: every 15 min");
    tracing::info!("  - Login limiter cleanup: hourly");

    let app = Router::new()
        .merge(web::routes(shared.clone()))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on {bind_addr}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
