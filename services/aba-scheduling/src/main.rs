mod availability_cache;
mod business_calendar;
mod cancellation_service;
mod config;
mod constraint_engine;
mod continuity_scorer;
mod event_log;
mod handlers;
mod models;
mod optimization_service;
mod routes;
mod scheduling_service;
mod team_manager;
#[cfg(test)]
mod test_support;
mod unavailability_service;
mod updates;

use std::sync::Arc;

use axum::{
    http::{Method, StatusCode},
    response::Json,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aba_auth::JwtService;
use aba_common::{ApiResponse, CacheClient, Clock, SystemClock};
use aba_database::{
    create_pool, run_migrations, PgAvailabilityRepository, PgClientRepository, PgEventLogRepository,
    PgRbtRepository, PgSessionRepository, PgTeamRepository,
};

use crate::availability_cache::AvailabilityCache;
use crate::business_calendar::BusinessCalendar;
use crate::cancellation_service::CancellationService;
use crate::config::SchedulingConfig;
use crate::constraint_engine::SchedulingConstraints;
use crate::continuity_scorer::ContinuityScorer;
use crate::event_log::EventLog;
use crate::optimization_service::OptimizationService;
use crate::scheduling_service::SchedulingService;
use crate::team_manager::TeamManager;
use crate::unavailability_service::UnavailabilityService;
use crate::updates::{RedisUpdatePublisher, UpdatePublisher};

#[derive(Clone)]
pub struct AppState {
    pub config: SchedulingConfig,
    pub db_pool: sqlx::PgPool,
    pub cache_client: CacheClient,
    pub jwt_service: JwtService,
    pub scheduling_service: SchedulingService,
    pub cancellation_service: CancellationService,
    pub unavailability_service: UnavailabilityService,
    pub optimization_service: OptimizationService,
    pub team_manager: TeamManager,
    pub event_log: EventLog,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aba_scheduling=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = SchedulingConfig::from_env()?;

    let db_pool = create_pool(&config.database).await?;
    run_migrations(&db_pool).await?;

    let cache_client = CacheClient::connect(&config.redis).await?;
    let jwt_service = JwtService::new(&config.jwt.secret);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let sessions = Arc::new(PgSessionRepository::new(db_pool.clone()));
    let teams = Arc::new(PgTeamRepository::new(db_pool.clone()));
    let rbts = Arc::new(PgRbtRepository::new(db_pool.clone()));
    let availability = Arc::new(PgAvailabilityRepository::new(db_pool.clone()));
    let event_log_repository = Arc::new(PgEventLogRepository::new(db_pool.clone()));
    let clients = Arc::new(PgClientRepository::new(db_pool.clone()));

    let calendar = BusinessCalendar::new(clock.clone(), config.scheduling.clone());
    let constraints = SchedulingConstraints::from_policy(&config.scheduling);
    let scorer = ContinuityScorer::new(config.scheduling.continuity_recency_window_days);
    let cache = AvailabilityCache::new(cache_client.clone(), config.scheduling.cache_ttl);
    let event_log = EventLog::new(event_log_repository, clock.clone());
    let publisher: Arc<dyn UpdatePublisher> = Arc::new(RedisUpdatePublisher::new(cache_client.clone()));

    let scheduling_service = SchedulingService::new(
        sessions.clone(),
        teams.clone(),
        rbts.clone(),
        availability.clone(),
        cache.clone(),
        event_log.clone(),
        publisher.clone(),
        scorer.clone(),
        calendar.clone(),
        constraints.clone(),
        clock.clone(),
    );

    let cancellation_service = CancellationService::new(
        sessions.clone(),
        teams.clone(),
        cache.clone(),
        event_log.clone(),
        publisher.clone(),
        scorer.clone(),
        clock.clone(),
    );

    let unavailability_service = UnavailabilityService::new(
        sessions.clone(),
        teams.clone(),
        rbts.clone(),
        availability.clone(),
        cache.clone(),
        event_log.clone(),
        publisher.clone(),
        scorer.clone(),
        calendar.clone(),
        constraints.clone(),
        config.scheduling.reassignment.clone(),
        clock.clone(),
    );

    let optimization_service = OptimizationService::new(
        sessions.clone(),
        teams.clone(),
        availability.clone(),
        scorer.clone(),
        calendar.clone(),
        constraints.clone(),
        clock.clone(),
    );

    let team_manager = TeamManager::new(teams.clone(), rbts.clone(), clients.clone(), event_log.clone(), clock.clone());

    let app_state = AppState {
        config: config.clone(),
        db_pool,
        cache_client,
        jwt_service: jwt_service.clone(),
        scheduling_service,
        cancellation_service,
        unavailability_service,
        optimization_service,
        team_manager,
        event_log,
    };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any)
        .allow_credentials(true);

    let app = routes::create_routes(jwt_service)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(app_state)
        .fallback(handler_404);

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.server.host, config.server.port)).await?;

    tracing::info!("Scheduling service listening on {}:{}", config.server.host, config.server.port);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn handler_404() -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error("Endpoint not found".to_string())),
    )
}
