use anyhow::Result;
use aws_config::BehaviorVersion;
use std::{sync::Arc, time::Duration};
use tracing::info;

use blog::{
    MIGRATOR,
    app::AppOptions,
    blob::S3BlobStore,
    config::BlogConfig,
    identity::{IdentityProvider, TokenIdentityProvider, TokenVerifier},
    repositories::PgBlogRepository,
    routes,
    state::{AppState, IdentityFactory},
};
use common::database::{DatabaseConfig, init_pool, run_migrations};

#[tokio::main]
async fn main() -> Result<()> {
    common::telemetry::init_tracing("info")?;

    info!("Starting blog service");

    let config = BlogConfig::from_env()?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;
    run_migrations(&pool, &MIGRATOR).await?;

    if common::database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    // Initialize AWS S3 client
    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let s3_client = aws_sdk_s3::Client::new(&aws_config);
    let blob = Arc::new(S3BlobStore::new(
        s3_client,
        config.media_bucket_name.clone(),
        config.media_public_url.clone(),
    ));

    let repository = Arc::new(PgBlogRepository::new(pool.clone()));

    let verifier = Arc::new(TokenVerifier::from_config(&config.identity)?);
    let identity_factory: IdentityFactory = Arc::new(move || {
        Arc::new(TokenIdentityProvider::new(verifier.clone(), pool.clone()))
            as Arc<dyn IdentityProvider>
    });

    let state = AppState::new(
        repository,
        blob,
        identity_factory,
        AppOptions {
            request_timeout: config.request_timeout,
        },
    );

    let sweep_every = config.session_idle_timeout.min(Duration::from_secs(60));
    state.spawn_session_sweeper(config.session_idle_timeout, sweep_every);

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Blog service listening on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down blog service");
            }
        })
        .await?;

    Ok(())
}
