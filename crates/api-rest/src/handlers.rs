use crate::error::ApiError;
use crate::{ApiDoc, AppState};
use api_shared::{
    auth::{parse_user_id, USER_ID_HEADER},
    ActivityIdsRes, ActivityRes, AssignReq, CancelReq, CreateActivityReq, DataRefRes,
    DataTypeRes, HealthRes, HealthService, ListDataTypesRes, ScheduleReq, SubmitReq,
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use careflow_core::{
    Activity, ActivityEngine, ActivityId, ActivityState, CoreError, Fields, LocationId,
    NewActivity, RecordId, ScheduleDate, UserId,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::MutexGuard;
use utoipa::OpenApi;

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Helpers
// ============================================================================

fn lock(state: &AppState) -> ApiResult<MutexGuard<'_, ActivityEngine>> {
    state
        .engine
        .lock()
        .map_err(|_| ApiError::internal("activity engine lock poisoned"))
}

fn acting_user(headers: &HeaderMap) -> ApiResult<UserId> {
    let header = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok());
    Ok(parse_user_id(header)?)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn schedule_date(text: String) -> ScheduleDate {
    match DateTime::parse_from_rfc3339(&text) {
        Ok(at) => ScheduleDate::At(at.with_timezone(&Utc)),
        Err(_) => ScheduleDate::Text(text),
    }
}

fn activity_res(engine: &ActivityEngine, activity: Activity) -> ApiResult<ActivityRes> {
    let data = engine.data_record(&activity)?.map(Value::Object);
    Ok(ActivityRes {
        id: activity.id.get(),
        summary: activity.summary,
        state: activity.state.to_string(),
        data_model: activity.data_model,
        data_ref: activity.data_ref.map(|data_ref| DataRefRes {
            model: data_ref.model,
            id: data_ref.id.get(),
        }),
        parent_id: activity.parent_id.map(ActivityId::get),
        creator_id: activity.creator_id.map(ActivityId::get),
        user_id: activity.user_id.map(UserId::get),
        user_ids: activity.user_ids.into_iter().map(UserId::get).collect(),
        assign_locked: activity.assign_locked,
        patient_id: activity.patient_id.map(RecordId::get),
        location_id: activity.location_id.map(LocationId::get),
        spell_activity_id: activity.spell_activity_id.map(ActivityId::get),
        sequence: activity.sequence,
        date_scheduled: activity.date_scheduled.map(timestamp),
        date_started: activity.date_started.map(timestamp),
        date_terminated: activity.date_terminated.map(timestamp),
        terminate_uid: activity.terminate_uid.map(UserId::get),
        create_date: timestamp(activity.create_date),
        write_date: timestamp(activity.write_date),
        data,
    })
}

fn reply(engine: &ActivityEngine, id: ActivityId) -> ApiResult<Json<ActivityRes>> {
    let activity = engine.activity(id)?;
    Ok(Json(activity_res(engine, activity)?))
}

// ============================================================================
// Handlers
// ============================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks.
#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthRes>> {
    let engine = lock(&state)?;
    Ok(Json(HealthService::check_health(engine.registry().len())))
}

/// Serve the OpenAPI document.
pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    get,
    path = "/types",
    responses(
        (status = 200, description = "Registered data types", body = ListDataTypesRes)
    )
)]
/// List registered data types with their transition tables and policy targets.
#[axum::debug_handler]
pub async fn list_types(State(state): State<AppState>) -> ApiResult<Json<ListDataTypesRes>> {
    let engine = lock(&state)?;
    let types = engine
        .registry()
        .iter()
        .map(|data_type| {
            let transitions: BTreeMap<String, Vec<String>> = ActivityState::ALL
                .into_iter()
                .map(|s| {
                    let actions = data_type
                        .transitions()
                        .allowed(s)
                        .iter()
                        .map(ToString::to_string)
                        .collect();
                    (s.to_string(), actions)
                })
                .collect();
            DataTypeRes {
                name: data_type.name().to_owned(),
                description: data_type.description().to_owned(),
                transitions,
                policy: data_type
                    .policy()
                    .iter()
                    .map(|trigger| trigger.model.clone())
                    .collect(),
            }
        })
        .collect();
    Ok(Json(ListDataTypesRes { types }))
}

#[utoipa::path(
    post,
    path = "/activities",
    request_body = CreateActivityReq,
    params(("x-user-id" = i64, Header, description = "Acting user")),
    responses(
        (status = 201, description = "Activity created", body = ActivityRes),
        (status = 400, description = "Unknown data type or malformed identifier", body = ErrorRes),
        (status = 404, description = "Parent or creator does not exist", body = ErrorRes),
        (status = 422, description = "Invalid data", body = ErrorRes)
    )
)]
/// Create an activity, submitting `data` to it when given.
///
/// # Errors
/// Returns `422 Unprocessable Entity` if `data` is not a JSON object.
#[axum::debug_handler]
pub async fn create_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateActivityReq>,
) -> ApiResult<(StatusCode, Json<ActivityRes>)> {
    let uid = acting_user(&headers)?;
    let new = NewActivity {
        data_model: req.data_model.clone(),
        summary: req.summary,
        notes: req.notes,
        parent_id: req.parent_id.map(ActivityId::new).transpose()?,
        creator_id: req.creator_id.map(ActivityId::new).transpose()?,
        patient_id: req.patient_id.map(RecordId::new).transpose()?,
        location_id: req.location_id.map(LocationId::new).transpose()?,
        ..NewActivity::default()
    };
    let data: Fields = match req.data {
        None | Some(Value::Null) => Fields::new(),
        Some(Value::Object(data)) => data,
        Some(other) => {
            return Err(CoreError::Validation(format!(
                "data must be an object, found to be {other}"
            ))
            .into());
        }
    };

    let mut engine = lock(&state)?;
    let id = engine.create_activity(uid, &req.data_model, new, data)?;
    tracing::info!("Created {} activity {}", req.data_model, id);
    Ok((StatusCode::CREATED, reply(&engine, id)?))
}

#[utoipa::path(
    get,
    path = "/activities/{id}",
    params(("id" = i64, Path, description = "Activity id")),
    responses(
        (status = 200, description = "The activity and its data", body = ActivityRes),
        (status = 404, description = "Activity does not exist", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn get_activity(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ActivityRes>> {
    let id = ActivityId::new(id)?;
    let engine = lock(&state)?;
    reply(&engine, id)
}

#[utoipa::path(
    post,
    path = "/activities/{id}/submit",
    request_body = SubmitReq,
    params(
        ("id" = i64, Path, description = "Activity id"),
        ("x-user-id" = i64, Header, description = "Acting user")
    ),
    responses(
        (status = 200, description = "Data submitted", body = ActivityRes),
        (status = 409, description = "Not allowed from the current state", body = ErrorRes),
        (status = 422, description = "Invalid values", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<SubmitReq>,
) -> ApiResult<Json<ActivityRes>> {
    let uid = acting_user(&headers)?;
    let id = ActivityId::new(id)?;
    let mut engine = lock(&state)?;
    engine.submit(uid, id, req.values)?;
    reply(&engine, id)
}

#[utoipa::path(
    post,
    path = "/activities/{id}/schedule",
    request_body = ScheduleReq,
    params(
        ("id" = i64, Path, description = "Activity id"),
        ("x-user-id" = i64, Header, description = "Acting user")
    ),
    responses(
        (status = 200, description = "Activity scheduled", body = ActivityRes),
        (status = 400, description = "Unparseable date", body = ErrorRes),
        (status = 409, description = "Not allowed from the current state", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<ScheduleReq>,
) -> ApiResult<Json<ActivityRes>> {
    let uid = acting_user(&headers)?;
    let id = ActivityId::new(id)?;
    let mut engine = lock(&state)?;
    engine.schedule(uid, id, req.date.map(schedule_date))?;
    reply(&engine, id)
}

#[utoipa::path(
    post,
    path = "/activities/{id}/assign",
    request_body = AssignReq,
    params(
        ("id" = i64, Path, description = "Activity id"),
        ("x-user-id" = i64, Header, description = "Acting user")
    ),
    responses(
        (status = 200, description = "Activity assigned", body = ActivityRes),
        (status = 409, description = "Assigned to somebody else", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn assign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<AssignReq>,
) -> ApiResult<Json<ActivityRes>> {
    let uid = acting_user(&headers)?;
    let id = ActivityId::new(id)?;
    let user_id = UserId::new(req.user_id)?;
    let mut engine = lock(&state)?;
    engine.assign(uid, id, user_id)?;
    reply(&engine, id)
}

#[utoipa::path(
    post,
    path = "/activities/{id}/unassign",
    params(
        ("id" = i64, Path, description = "Activity id"),
        ("x-user-id" = i64, Header, description = "Acting user")
    ),
    responses(
        (status = 200, description = "Activity unassigned", body = ActivityRes),
        (status = 404, description = "Activity does not exist", body = ErrorRes),
        (status = 409, description = "Not assigned to the acting user", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn unassign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<ActivityRes>> {
    let uid = acting_user(&headers)?;
    let id = ActivityId::new(id)?;
    let mut engine = lock(&state)?;
    engine.unassign(uid, id)?;
    reply(&engine, id)
}

/// Start the activity, stamping `date_started`.
#[utoipa::path(
    post,
    path = "/activities/{id}/start",
    params(
        ("id" = i64, Path, description = "Activity id"),
        ("x-user-id" = i64, Header, description = "Acting user")
    ),
    responses(
        (status = 200, description = "Activity started", body = ActivityRes),
        (status = 404, description = "Activity does not exist", body = ErrorRes),
        (status = 409, description = "Not allowed from the current state", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn start(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<ActivityRes>> {
    let uid = acting_user(&headers)?;
    let id = ActivityId::new(id)?;
    let mut engine = lock(&state)?;
    engine.start(uid, id)?;
    reply(&engine, id)
}

/// Complete the activity and run its policy triggers.
///
/// # Errors
/// Returns `409 Conflict` if completion is not allowed from the current state.
#[utoipa::path(
    post,
    path = "/activities/{id}/complete",
    params(
        ("id" = i64, Path, description = "Activity id"),
        ("x-user-id" = i64, Header, description = "Acting user")
    ),
    responses(
        (status = 200, description = "Activity completed", body = ActivityRes),
        (status = 404, description = "Activity does not exist", body = ErrorRes),
        (status = 409, description = "Not allowed from the current state", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<ActivityRes>> {
    let uid = acting_user(&headers)?;
    let id = ActivityId::new(id)?;
    let mut engine = lock(&state)?;
    engine.complete(uid, id)?;
    reply(&engine, id)
}

#[utoipa::path(
    post,
    path = "/activities/{id}/cancel",
    request_body(content = CancelReq, description = "Optional cancellation reason"),
    params(
        ("id" = i64, Path, description = "Activity id"),
        ("x-user-id" = i64, Header, description = "Acting user")
    ),
    responses(
        (status = 200, description = "Activity cancelled", body = ActivityRes),
        (status = 409, description = "Not allowed from the current state", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn cancel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    req: Option<Json<CancelReq>>,
) -> ApiResult<Json<ActivityRes>> {
    let uid = acting_user(&headers)?;
    let id = ActivityId::new(id)?;
    let reason_id = req
        .and_then(|Json(req)| req.reason_id)
        .map(RecordId::new)
        .transpose()?;
    let mut engine = lock(&state)?;
    match reason_id {
        Some(reason_id) => engine.cancel_with_reason(uid, id, reason_id)?,
        None => engine.cancel(uid, id)?,
    }
    reply(&engine, id)
}

#[utoipa::path(
    get,
    path = "/activities/{id}/created",
    params(("id" = i64, Path, description = "Activity id")),
    responses(
        (status = 200, description = "The activity and everything it created, depth first", body = ActivityIdsRes),
        (status = 404, description = "Activity does not exist", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn created(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ActivityIdsRes>> {
    let id = ActivityId::new(id)?;
    let engine = lock(&state)?;
    let ids = engine
        .get_recursive_created_ids(id)?
        .into_iter()
        .map(ActivityId::get)
        .collect();
    Ok(Json(ActivityIdsRes { ids }))
}
