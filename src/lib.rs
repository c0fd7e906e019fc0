pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

use anyhow::Context;

use crate::core::{config::Settings, redis::RedisHandle, state::AppState, telemetry};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    // Redis carries the event queues and the grading locks, so unlike a
    // plain cache it is not optional here.
    let redis = RedisHandle::new(settings.redis().redis_url());
    redis.connect().await.context("Failed to connect to Redis")?;
    tracing::info!("Redis connected successfully");

    let state = AppState::new(settings, db_pool, redis.clone());

    tracing::info!(
        environment = %state.settings().runtime().environment.as_str(),
        "Gradeflow worker starting"
    );

    let result = tasks::scheduler::run(state).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}
