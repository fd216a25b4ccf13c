use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use aba_auth::Claims;
use aba_common::{ApiResponse, AppError};
use aba_database::EventLogFilter;

use crate::cancellation_service::BulkCancellationResult;
use crate::models::{
    AlternativeSlot, BulkScheduleRequest, BulkScheduleResult, CancelSessionRequest, CancellationOutcome,
    CancellationStats, ImpactAnalysis, OptimizationResult, ProcessUnavailabilityRequest,
    RescheduleImpactRequest, RescheduleSessionRequest, ReschedulingConstraints, ReschedulingPreferences,
    ScheduleSessionRequest, SchedulingOutcome, UnavailabilityOutcome,
};
use crate::team_manager::TeamAssignmentResult;
use crate::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

pub async fn health_check() -> Json<ApiResponse<String>> {
    Json(ApiResponse::success("ok".to_string()))
}

pub async fn schedule_session(
    State(state): State<AppState>,
    claims: Claims,
    Json(request): Json<ScheduleSessionRequest>,
) -> ApiResult<SchedulingOutcome> {
    request.validate().map_err(|e| AppError::Validation(e.to_string()))?;
    let outcome = state
        .scheduling_service
        .schedule_session(request, claims.actor_id())
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

pub async fn bulk_schedule_sessions(
    State(state): State<AppState>,
    claims: Claims,
    Json(request): Json<BulkScheduleRequest>,
) -> ApiResult<BulkScheduleResult> {
    request.validate().map_err(|e| AppError::Validation(e.to_string()))?;
    let result = state
        .scheduling_service
        .bulk_schedule_sessions(request, claims.actor_id())
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

#[derive(Debug, Deserialize)]
pub struct AlternativesQuery {
    pub client_id: Uuid,
    pub preferred_date: chrono::NaiveDate,
    #[serde(default = "default_days_ahead")]
    pub days_ahead: i64,
}

fn default_days_ahead() -> i64 {
    7
}

pub async fn find_alternative_time_slots(
    State(state): State<AppState>,
    _claims: Claims,
    Query(query): Query<AlternativesQuery>,
) -> ApiResult<Vec<AlternativeSlot>> {
    let alternatives = state
        .scheduling_service
        .find_alternative_time_slots(query.client_id, query.preferred_date, query.days_ahead)
        .await?;
    Ok(Json(ApiResponse::success(alternatives)))
}

pub async fn reschedule_session(
    State(state): State<AppState>,
    claims: Claims,
    Path(session_id): Path<Uuid>,
    Json(request): Json<RescheduleSessionRequest>,
) -> ApiResult<SchedulingOutcome> {
    let outcome = state
        .scheduling_service
        .reschedule_session(session_id, request.new_start_time, claims.actor_id(), request.reason)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

pub async fn cancel_session(
    State(state): State<AppState>,
    claims: Claims,
    Path(session_id): Path<Uuid>,
    Json(request): Json<CancelSessionRequest>,
) -> ApiResult<CancellationOutcome> {
    let outcome = state
        .cancellation_service
        .cancel_session(session_id, request, claims.actor_id())
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct BulkCancelRequest {
    pub sessions: Vec<(Uuid, CancelSessionRequest)>,
}

pub async fn cancel_sessions_bulk(
    State(state): State<AppState>,
    claims: Claims,
    Json(request): Json<BulkCancelRequest>,
) -> ApiResult<BulkCancellationResult> {
    let result = state
        .cancellation_service
        .cancel_sessions_bulk(request.sessions, claims.actor_id())
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

pub async fn cancellation_stats(
    State(state): State<AppState>,
    _claims: Claims,
    Query(query): Query<StatsQuery>,
) -> ApiResult<CancellationStats> {
    let stats = state
        .cancellation_service
        .cancellation_stats(query.start, query.end)
        .await?;
    Ok(Json(ApiResponse::success(stats)))
}

pub async fn process_rbt_unavailability(
    State(state): State<AppState>,
    claims: Claims,
    Json(request): Json<ProcessUnavailabilityRequest>,
) -> ApiResult<UnavailabilityOutcome> {
    let outcome = state
        .unavailability_service
        .process_rbt_unavailability(request, claims.actor_id())
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[derive(Debug, Deserialize, Default)]
pub struct RescheduleOptionsRequest {
    #[serde(default)]
    pub preferences: ReschedulingPreferences,
    #[serde(default)]
    pub constraints: Option<ReschedulingConstraints>,
}

pub async fn find_optimal_rescheduling_options(
    State(state): State<AppState>,
    _claims: Claims,
    Path(session_id): Path<Uuid>,
    Json(request): Json<RescheduleOptionsRequest>,
) -> ApiResult<OptimizationResult> {
    let constraints = request.constraints.unwrap_or_default();
    let result = state
        .optimization_service
        .find_optimal_rescheduling_options(session_id, request.preferences, constraints)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

pub async fn analyze_rescheduling_impact(
    State(state): State<AppState>,
    _claims: Claims,
    Path(session_id): Path<Uuid>,
    Json(request): Json<RescheduleImpactRequest>,
) -> ApiResult<ImpactAnalysis> {
    let analysis = state
        .optimization_service
        .analyze_rescheduling_impact(session_id, request.new_start, request.new_rbt_id)
        .await?;
    Ok(Json(ApiResponse::success(analysis)))
}

#[derive(Debug, Deserialize)]
pub struct AssignTeamRequest {
    pub client_id: Uuid,
    pub rbt_ids: Vec<Uuid>,
    pub primary_rbt_id: Uuid,
    pub effective_date: DateTime<Utc>,
    #[serde(default)]
    pub required_qualifications: Vec<String>,
}

pub async fn assign_team(
    State(state): State<AppState>,
    claims: Claims,
    Json(request): Json<AssignTeamRequest>,
) -> ApiResult<TeamAssignmentResult> {
    let result = state
        .team_manager
        .assign_team(
            request.client_id,
            request.rbt_ids,
            request.primary_rbt_id,
            request.effective_date,
            &request.required_qualifications,
            claims.actor_id(),
        )
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

#[derive(Debug, Deserialize)]
pub struct TeamMemberRequest {
    pub rbt_id: Uuid,
}

pub async fn add_rbt_to_team(
    State(state): State<AppState>,
    claims: Claims,
    Path(team_id): Path<Uuid>,
    Json(request): Json<TeamMemberRequest>,
) -> ApiResult<aba_database::Team> {
    let team = state
        .team_manager
        .add_rbt(team_id, request.rbt_id, claims.actor_id())
        .await?;
    Ok(Json(ApiResponse::success(team)))
}

pub async fn remove_rbt_from_team(
    State(state): State<AppState>,
    claims: Claims,
    Path((team_id, rbt_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<aba_database::Team> {
    let team = state
        .team_manager
        .remove_rbt(team_id, rbt_id, claims.actor_id())
        .await?;
    Ok(Json(ApiResponse::success(team)))
}

pub async fn change_primary_rbt(
    State(state): State<AppState>,
    claims: Claims,
    Path(team_id): Path<Uuid>,
    Json(request): Json<TeamMemberRequest>,
) -> ApiResult<aba_database::Team> {
    let team = state
        .team_manager
        .change_primary_rbt(team_id, request.rbt_id, claims.actor_id())
        .await?;
    Ok(Json(ApiResponse::success(team)))
}

#[derive(Debug, Deserialize)]
pub struct EndTeamRequest {
    pub end_date: DateTime<Utc>,
}

pub async fn end_team(
    State(state): State<AppState>,
    claims: Claims,
    Path(team_id): Path<Uuid>,
    Json(request): Json<EndTeamRequest>,
) -> ApiResult<aba_database::Team> {
    let team = state
        .team_manager
        .end_team(team_id, request.end_date, claims.actor_id())
        .await?;
    Ok(Json(ApiResponse::success(team)))
}

#[derive(Debug, Deserialize)]
pub struct EventLogQuery {
    pub session_id: Option<Uuid>,
    pub rbt_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl From<EventLogQuery> for EventLogFilter {
    fn from(query: EventLogQuery) -> Self {
        Self {
            event_type: None,
            session_id: query.session_id,
            rbt_id: query.rbt_id,
            client_id: query.client_id,
            since: query.since,
            until: query.until,
        }
    }
}

pub async fn query_events(
    State(state): State<AppState>,
    _claims: Claims,
    Query(filter): Query<EventLogQuery>,
) -> ApiResult<Vec<aba_database::ScheduleEvent>> {
    let events = state.event_log.query(filter.into()).await?;
    Ok(Json(ApiResponse::success(events)))
}
