//! Lingopath Placement Server

use std::sync::Arc;
use std::time::Instant;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lingopath_api::{AppState, build_router};
use lingopath_config::AppConfig;
use lingopath_domain::{CatService, PlacementService, SystemClock, TwoPlModel};
use lingopath_storage::{
    PgAssignmentRepository, PgConfigRepository, PgItemRepository, PgTemplateRepository,
    create_pool, run_migrations,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Lingopath Placement Server...");

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!("Binding to {}", config.bind_address);
    tracing::info!(
        min_questions = config.assessment.min_questions,
        max_questions = config.assessment.max_questions,
        stopping_standard_error = config.assessment.standard_error,
        time_limit_minutes = config.assessment.time_limit_minutes,
        "Assessment defaults loaded"
    );

    // Create database pool
    let pool = create_pool(&config.database_url, config.database_pool_size).await?;
    tracing::info!("Database connection pool created");

    // Run migrations
    run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    // Wire the placement engine
    let placement = PlacementService::new(
        Arc::new(PgAssignmentRepository::new(pool.clone())),
        Arc::new(PgItemRepository::new(pool.clone())),
        Arc::new(PgConfigRepository::new(pool.clone())),
        Arc::new(PgTemplateRepository::new(pool.clone())),
        CatService::new(Arc::new(TwoPlModel::new())),
        Arc::new(SystemClock),
    );

    // Create app state
    let state = Arc::new(AppState {
        pool,
        placement,
        config: config.clone(),
        start_time: Instant::now(),
    });

    // Build router and start server
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("Server listening on {}", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
