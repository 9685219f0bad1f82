use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use registrar::api::router;
use registrar::config::AppConfig;
use registrar::db;
use registrar::services::{EnrollmentService, fixtures};
use registrar::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "registrar=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::new_from_env()?;

    let pool = db::connect(&config.database_url).await?;
    db::MIGRATOR.run(&pool).await?;

    if let Some(path) = &config.seed_file {
        let fixture = fixtures::load_file(path).await?;
        if let Some(stats) = fixtures::import(&pool, &fixture).await? {
            info!(users = stats.users, courses = stats.courses, "seeded from {}", path.display());
        }
    }

    info!(
        min_registrations = config.policy.min_registrations_to_validate,
        revoke_on_cancel = config.policy.revoke_completions_on_cancel,
        "enrollment policy"
    );
    let enrollment = EnrollmentService::new(pool.clone(), config.policy.clone());
    let state = AppState::new(pool, enrollment, config.core_courses);

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
