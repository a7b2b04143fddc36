//! # API REST
//!
//! REST API for the careflow activity engine.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI documentation
//! - REST-specific concerns (JSON serialisation, CORS, API key and acting user headers)
//!
//! Uses `api-shared` for request/response bodies and header handling.

#![warn(rust_2018_idioms)]

pub mod error;
pub mod handlers;

use api_shared::auth::{validate_api_key, API_KEY_HEADER};
use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use careflow_core::ActivityEngine;
use error::ApiError;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;

/// Application state for the REST API server
///
/// The engine is synchronous and mutates its store, so requests take turns on a mutex.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<Mutex<ActivityEngine>>,
    api_key: Option<Arc<str>>,
}

impl AppState {
    /// # Arguments
    /// * `engine` - Engine backing every activity route.
    /// * `api_key` - Key required in `x-api-key`; `None` leaves the API open.
    pub fn new(engine: ActivityEngine, api_key: Option<String>) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            api_key: api_key.map(Arc::from),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::list_types,
        handlers::create_activity,
        handlers::get_activity,
        handlers::submit,
        handlers::schedule,
        handlers::assign,
        handlers::unassign,
        handlers::start,
        handlers::complete,
        handlers::cancel,
        handlers::created,
    ),
    components(schemas(
        api_shared::HealthRes,
        api_shared::ErrorRes,
        api_shared::DataTypeRes,
        api_shared::ListDataTypesRes,
        api_shared::CreateActivityReq,
        api_shared::DataRefRes,
        api_shared::ActivityRes,
        api_shared::SubmitReq,
        api_shared::ScheduleReq,
        api_shared::AssignReq,
        api_shared::CancelReq,
        api_shared::ActivityIdsRes,
    ))
)]
pub struct ApiDoc;

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    validate_api_key(provided, state.api_key.as_deref())?;
    Ok(next.run(request).await)
}

/// Build the REST router.
///
/// `/health` and `/openapi.json` are always open; every other route checks the API key.
pub fn router(state: AppState) -> Router {
    let activities = Router::new()
        .route("/types", get(handlers::list_types))
        .route("/activities", post(handlers::create_activity))
        .route("/activities/:id", get(handlers::get_activity))
        .route("/activities/:id/submit", post(handlers::submit))
        .route("/activities/:id/schedule", post(handlers::schedule))
        .route("/activities/:id/assign", post(handlers::assign))
        .route("/activities/:id/unassign", post(handlers::unassign))
        .route("/activities/:id/start", post(handlers::start))
        .route("/activities/:id/complete", post(handlers::complete))
        .route("/activities/:id/cancel", post(handlers::cancel))
        .route("/activities/:id/created", get(handlers::created))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/openapi.json", get(handlers::openapi))
        .merge(activities)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use careflow_core::{
        clinical::register_clinical_types,
        constants::{ADMISSION_MODEL, PATIENT_MODEL},
        CoreConfig, Fields, LocationId, LocationUsage, MemoryDirectory, MemoryStore,
        SimpleDataType, TypeRegistry,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn setup_test_engine() -> ActivityEngine {
        let cfg = CoreConfig::default();
        let mut registry = TypeRegistry::new();
        register_clinical_types(&mut registry, &cfg).unwrap();
        registry.register(SimpleDataType::new("test.task")).unwrap();
        let mut directory = MemoryDirectory::new();
        directory.add_location(
            LocationId::new(1).unwrap(),
            "Ward A",
            LocationUsage::Ward,
            None,
        );
        ActivityEngine::new(
            Arc::new(cfg),
            Arc::new(registry),
            Arc::new(directory),
            Box::new(MemoryStore::new()),
        )
    }

    fn setup_router(api_key: Option<&str>) -> Router {
        router(AppState::new(setup_test_engine(), api_key.map(String::from)))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-user-id", "1")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_empty(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("x-user-id", "1")
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn health_is_open() {
        let app = setup_router(Some("secret"));
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], json!(true));
    }

    #[tokio::test]
    async fn activity_routes_require_api_key_when_configured() {
        let app = setup_router(Some("secret"));
        let (status, body) = send(&app, post_json("/activities", json!({"data_model": "test.task"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], json!("auth"));

        let mut request = post_json("/activities", json!({"data_model": "test.task"}));
        request
            .headers_mut()
            .insert("x-api-key", "secret".parse().unwrap());
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn missing_user_header_is_rejected() {
        let app = setup_router(None);
        let request = Request::builder()
            .method("POST")
            .uri("/activities")
            .header("content-type", "application/json")
            .body(Body::from(json!({"data_model": "test.task"}).to_string()))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], json!("auth"));
    }

    #[tokio::test]
    async fn lists_registered_types_with_transitions() {
        let app = setup_router(None);
        let request = Request::builder().uri("/types").body(Body::empty()).unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);

        let types = body["types"].as_array().unwrap();
        let task = types
            .iter()
            .find(|t| t["name"] == json!("test.task"))
            .unwrap();
        assert_eq!(task["transitions"]["cancelled"], json!([]));
        assert_eq!(task["transitions"]["completed"], json!(["cancel"]));
    }

    #[tokio::test]
    async fn task_lifecycle_over_http() {
        let app = setup_router(None);

        let (status, created) = send(
            &app,
            post_json(
                "/activities",
                json!({"data_model": "test.task", "summary": "Check drains", "data": {"note": "left"}}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["state"], json!("new"));
        assert_eq!(created["summary"], json!("Check drains"));
        assert_eq!(created["data"]["note"], json!("left"));
        let id = created["id"].as_u64().unwrap();

        let (status, scheduled) = send(
            &app,
            post_json(
                &format!("/activities/{id}/schedule"),
                json!({"date": "2026-03-01 10:30"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(scheduled["state"], json!("scheduled"));
        assert_eq!(scheduled["date_scheduled"], json!("2026-03-01T10:30:00Z"));

        let (status, started) = send(&app, post_empty(&format!("/activities/{id}/start"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(started["state"], json!("started"));
        assert!(started["date_started"].is_string());

        let (status, completed) =
            send(&app, post_empty(&format!("/activities/{id}/complete"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(completed["state"], json!("completed"));
        assert_eq!(completed["terminate_uid"], json!(1));

        let (status, body) = send(&app, post_empty(&format!("/activities/{id}/start"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], json!("transition"));
    }

    #[tokio::test]
    async fn cancel_accepts_optional_reason() {
        let app = setup_router(None);
        let (_, created) = send(&app, post_json("/activities", json!({"data_model": "test.task"}))).await;
        let id = created["id"].as_u64().unwrap();

        let (status, cancelled) = send(
            &app,
            post_json(&format!("/activities/{id}/cancel"), json!({"reason_id": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cancelled["state"], json!("cancelled"));

        let (_, other) = send(&app, post_json("/activities", json!({"data_model": "test.task"}))).await;
        let other = other["id"].as_u64().unwrap();
        let (status, cancelled) = send(&app, post_empty(&format!("/activities/{other}/cancel"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cancelled["state"], json!("cancelled"));
    }

    #[tokio::test]
    async fn errors_map_to_status_codes() {
        let app = setup_router(None);

        let (status, body) = send(&app, post_json("/activities", json!({"data_model": "nope"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], json!("unknown_type"));

        let request = Request::builder()
            .uri("/activities/999")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], json!("not_found"));

        let (_, created) = send(&app, post_json("/activities", json!({"data_model": "test.task"}))).await;
        let id = created["id"].as_u64().unwrap();
        let (status, _) = send(
            &app,
            post_json(&format!("/activities/{id}/submit"), json!({"values": [1, 2]})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = send(
            &app,
            post_json(&format!("/activities/{id}/schedule"), json!({"date": "soon"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], json!("format"));
    }

    #[tokio::test]
    async fn admission_cascade_is_visible_through_created() {
        let mut engine = setup_test_engine();
        let patient = engine
            .store_mut()
            .create_record(PATIENT_MODEL, Fields::new())
            .unwrap();
        let app = router(AppState::new(engine, None));

        let (status, admission) = send(
            &app,
            post_json(
                "/activities",
                json!({
                    "data_model": ADMISSION_MODEL,
                    "data": {"patient_id": patient.get(), "location_id": 1}
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{admission}");
        assert_eq!(admission["patient_id"], json!(patient.get()));
        let id = admission["id"].as_u64().unwrap();

        let (status, completed) = send(&app, post_empty(&format!("/activities/{id}/complete"))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(completed["parent_id"].is_u64());

        let request = Request::builder()
            .uri(format!("/activities/{id}/created"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let ids = body["ids"].as_array().unwrap();
        assert_eq!(ids[0], json!(id));
        // spell, move and placement
        assert_eq!(ids.len(), 4);
    }

    #[tokio::test]
    async fn serves_openapi_document() {
        let app = setup_router(Some("secret"));
        let request = Request::builder()
            .uri("/openapi.json")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/activities/{id}/complete"].is_object());
    }
}
