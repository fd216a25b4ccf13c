use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use aba_auth::middleware::{auth_middleware, require_scheduling_admin};
use aba_auth::JwtService;

use crate::{handlers, AppState};

/// Routes gated behind `require_scheduling_admin` on top of the base auth
/// layer: team composition and rbt-unavailability reporting are coordinator
/// actions, never exposed to client families or individual rbts.
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/teams", post(handlers::assign_team))
        .route("/teams/:team_id/members", post(handlers::add_rbt_to_team))
        .route(
            "/teams/:team_id/members/:rbt_id",
            axum::routing::delete(handlers::remove_rbt_from_team),
        )
        .route("/teams/:team_id/primary", put(handlers::change_primary_rbt))
        .route("/teams/:team_id/end", post(handlers::end_team))
        .route("/rbts/unavailability", post(handlers::process_rbt_unavailability))
        .layer(middleware::from_fn(require_scheduling_admin))
}

pub fn create_routes(jwt_service: JwtService) -> Router<AppState> {
    let protected = Router::new()
        .route("/sessions", post(handlers::schedule_session))
        .route("/sessions/bulk", post(handlers::bulk_schedule_sessions))
        .route("/sessions/:session_id/reschedule", put(handlers::reschedule_session))
        .route("/sessions/:session_id/cancel", post(handlers::cancel_session))
        .route("/sessions/cancel/bulk", post(handlers::cancel_sessions_bulk))
        .route(
            "/sessions/:session_id/rescheduling-options",
            post(handlers::find_optimal_rescheduling_options),
        )
        .route(
            "/sessions/:session_id/rescheduling-impact",
            post(handlers::analyze_rescheduling_impact),
        )
        .route("/availability/alternatives", get(handlers::find_alternative_time_slots))
        .route("/reports/cancellations", get(handlers::cancellation_stats))
        .route("/events", get(handlers::query_events))
        .merge(admin_routes());

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest(
            "/api/v1",
            protected.layer(middleware::from_fn_with_state(jwt_service, auth_middleware)),
        )
}
