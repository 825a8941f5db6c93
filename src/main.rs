use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yourturn_backend::domain::archive;
use yourturn_backend::domain::schedule::ContestConfig;
use yourturn_backend::domain::voting::VoteCache;
use yourturn_backend::middleware::rate_limit::AttemptThrottle;
use yourturn_backend::services::notifier::RealtimeNotifier;
use yourturn_backend::state::{AppState, SharedState};
use yourturn_backend::web;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL missing");
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&database_url)
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

    let config = ContestConfig::from_env();
    tracing::info!("Contest timezone: {}", config.timezone);
    tracing::info!(
        "Daily activation times: {}",
        config
            .daily_times
            .iter()
            .map(|t| t.format("%H:%M").to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    tracing::info!("Activation window: {}s", config.window_secs);

    let shared: SharedState = Arc::new(AppState {
        pool,
        config,
        notifier: RealtimeNotifier::new(),
        throttle: AttemptThrottle::new(5, 10),
        vote_cache: VoteCache::new(),
    });

    let scheduler = JobScheduler::new().await?;

    // Day rollover shortly after midnight: expire unresolved slots from prior
    // days and copy closed ones into history.
    let shared_for_rollover = shared.clone();
    scheduler
        .add(Job::new_async("0 5 0 * * *", move |_uuid, _l| {
            let state = shared_for_rollover.clone();
            Box::pin(async move {
                match archive::run_day_rollover(&state.pool, &state.config, &state.notifier).await
                {
                    Ok(count) => tracing::info!("Day rollover done, {} slots archived", count),
                    Err(e) => tracing::error!("Day rollover failed: {}", e),
                }
            })
        })?)
        .await?;

    // Attempt throttle cleanup every hour.
    let shared_for_cleanup = shared.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let state = shared_for_cleanup.clone();
            Box::pin(async move {
                state.throttle.cleanup().await;
            })
        })?)
        .await?;

    scheduler.start().await?;
    tracing::info!("Scheduler started:");
    tracing::info!("  - Day rollover: 00:05");
    tracing::info!("  - Throttle cleanup: hourly");

    let app = web::routes(shared.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| {
        let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        format!("0.0.0.0:{}", port)
    });
    tracing::info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
