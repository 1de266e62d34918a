use axum::{
    extract::{rejection::JsonRejection, Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    analytics::{AnalyticsOptions, DashboardSummary, IssueFilter, Tally},
    annotations::{CaseAnnotation, CaseStatus},
    app_state::AppState,
    error::TriageError,
    hotspot::{locate_ward, root_cause, HotspotLayer, MapPoint, RootCause, ROOT_CAUSE_RADIUS_KM},
    models::{sla_hours, IssueRecord, TriageRequest},
};

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads y Respuestas de la API ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    total: usize,
    category_count: Tally,
    dept_count: Tally,
    issues: Vec<IssueRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    search: Option<String>,
    department: Option<String>,
    category: Option<String>,
    urgency: Option<String>,
    #[serde(default)]
    only_hotspots: bool,
    use_demo_fallback: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    summary: DashboardSummary,
    issues: Vec<IssueRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotQuery {
    urgency: Option<String>,
    use_demo_fallback: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueDetail {
    issue: IssueRecord,
    sla_hours: u32,
    ward: Option<String>,
    root_cause: String,
    cluster: Option<RootCause>,
    annotation: CaseAnnotation,
}

#[derive(Deserialize)]
pub struct AssignPayload {
    officer: String,
}

#[derive(Deserialize)]
pub struct NotePayload {
    note: String,
}

#[derive(Deserialize)]
pub struct StatusPayload {
    status: CaseStatus,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/triage", post(triage_handler))
        .route("/api/dashboard", get(dashboard_handler))
        .route("/api/analytics", get(analytics_handler))
        .route("/api/hotspots", get(hotspots_handler))
        .route("/api/issues/:id", get(issue_detail_handler))
        .route("/api/issues/:id/annotation", get(annotation_handler))
        .route("/api/issues/:id/assign", post(assign_handler))
        .route("/api/issues/:id/notes", post(note_handler))
        .route("/api/issues/:id/status", post(status_handler))
        .route("/api/health", get(health_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn triage_handler(
    State(state): State<AppState>,
    payload: Result<Json<TriageRequest>, JsonRejection>,
) -> Result<Json<IssueRecord>, ApiError> {
    let Json(payload) = payload.map_err(body_rejection)?;
    match state.triage.triage(payload).await {
        Ok(record) => Ok(Json(record)),
        Err(e) => Err(triage_error_response(e)),
    }
}

// Cuerpo ilegible o sin `content-type`: mismo formato `{error}` que el resto.
fn body_rejection(rejection: JsonRejection) -> ApiError {
    warn!("Cuerpo JSON rechazado: {}", rejection.body_text());
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": rejection.body_text() })),
    )
}

fn triage_error_response(e: TriageError) -> ApiError {
    if e.is_validation() {
        warn!("Petición de triaje rechazada: {}", e);
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })));
    }
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "AI failed",
            "details": e.to_string(),
            "kind": e.kind(),
        })),
    )
}

fn store_error_response(context: &str, e: impl std::fmt::Display) -> ApiError {
    error!("{}: {}", context, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": context, "details": e.to_string() })),
    )
}

async fn load_issues(state: &AppState) -> Result<Vec<IssueRecord>, ApiError> {
    state
        .store
        .list_all()
        .await
        .map_err(|e| store_error_response("Failed to load dashboard", e))
}

#[axum::debug_handler]
async fn dashboard_handler(
    State(state): State<AppState>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let issues = load_issues(&state).await?;
    Ok(Json(DashboardResponse {
        total: issues.len(),
        category_count: crate::analytics::category_count(&issues),
        dept_count: crate::analytics::department_count(&issues),
        issues,
    }))
}

#[axum::debug_handler]
async fn analytics_handler(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    let issues = load_issues(&state).await?;
    let options = AnalyticsOptions {
        use_demo_fallback: query
            .use_demo_fallback
            .unwrap_or(state.config.use_demo_fallback),
        prediction: state.config.prediction.clone(),
    };
    let summary = DashboardSummary::build(&issues, Utc::now(), &options, &mut rand::thread_rng());

    let filter = IssueFilter {
        search: query.search,
        department: query.department,
        category: query.category,
        urgency: query.urgency,
        only_hotspots: query.only_hotspots,
    };
    let filtered = filter.apply(&issues).into_iter().cloned().collect();

    Ok(Json(AnalyticsResponse {
        summary,
        issues: filtered,
    }))
}

#[axum::debug_handler]
async fn hotspots_handler(
    State(state): State<AppState>,
    Query(query): Query<HotspotQuery>,
) -> Result<Json<HotspotLayer>, ApiError> {
    let issues = load_issues(&state).await?;
    let use_demo_fallback = query
        .use_demo_fallback
        .unwrap_or(state.config.use_demo_fallback);
    let layer = HotspotLayer::build(
        &issues,
        &state.wards,
        query.urgency.as_deref(),
        use_demo_fallback,
        &mut rand::thread_rng(),
    );
    if layer.demo_points_added > 0 {
        info!("Capa de calor con {} puntos de demo añadidos", layer.demo_points_added);
    }
    Ok(Json(layer))
}

async fn find_issue(state: &AppState, id: &str) -> Result<IssueRecord, ApiError> {
    let issues = load_issues(state).await?;
    issues.into_iter().find(|i| i.id == id).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Issue not found: {id}") })),
        )
    })
}

#[axum::debug_handler]
async fn issue_detail_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<IssueDetail>, ApiError> {
    let issues = load_issues(&state).await?;
    let Some(issue) = issues.iter().find(|i| i.id == id).cloned() else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Issue not found: {id}") })),
        ));
    };

    let points: Vec<MapPoint> = issues.iter().map(MapPoint::from).collect();
    let cluster = root_cause(&points, &issue.location(), ROOT_CAUSE_RADIUS_KM);
    let ward = locate_ward(&issue.location(), &state.wards).map(|w| w.name.clone());
    let annotation = state.annotations.get(&issue.id).await;

    Ok(Json(IssueDetail {
        sla_hours: sla_hours(&issue.urgency),
        ward,
        root_cause: RootCause::describe(cluster.as_ref()),
        cluster,
        annotation,
        issue,
    }))
}

#[axum::debug_handler]
async fn annotation_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CaseAnnotation>, ApiError> {
    let issue = find_issue(&state, &id).await?;
    Ok(Json(state.annotations.get(&issue.id).await))
}

fn required_text(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("{field} missing") })),
        ));
    }
    Ok(value.to_string())
}

#[axum::debug_handler]
async fn assign_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<AssignPayload>, JsonRejection>,
) -> Result<Json<CaseAnnotation>, ApiError> {
    let Json(payload) = payload.map_err(body_rejection)?;
    let officer = required_text("Officer", &payload.officer)?;
    let issue = find_issue(&state, &id).await?;
    info!("Incidencia {} asignada a {}", issue.id, officer);
    Ok(Json(state.annotations.assign(&issue.id, &officer).await))
}

#[axum::debug_handler]
async fn note_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<NotePayload>, JsonRejection>,
) -> Result<Json<CaseAnnotation>, ApiError> {
    let Json(payload) = payload.map_err(body_rejection)?;
    let note = required_text("Note", &payload.note)?;
    let issue = find_issue(&state, &id).await?;
    Ok(Json(state.annotations.add_note(&issue.id, &note).await))
}

#[axum::debug_handler]
async fn status_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<StatusPayload>, JsonRejection>,
) -> Result<Json<CaseAnnotation>, ApiError> {
    let Json(payload) = payload.map_err(body_rejection)?;
    let issue = find_issue(&state, &id).await?;
    Ok(Json(state.annotations.set_status(&issue.id, payload.status).await))
}

#[axum::debug_handler]
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "store": state.store.backend_name() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::annotations::AnnotationBook;
    use crate::config::AppConfig;
    use crate::hotspot::default_wards;
    use crate::llm::tests::FakeCompletion;
    use crate::store::{IssueStore, MemoryIssueStore};
    use crate::triage::TriageService;

    const COMPLETION: &str =
        "Department: Electrical\nCategory: Lighting\nUrgency: High\nDraft: Please repair...";

    fn state_with(fake: FakeCompletion) -> AppState {
        let config = AppConfig::default();
        let store: Arc<dyn IssueStore> = Arc::new(MemoryIssueStore::new());
        AppState {
            triage: TriageService {
                store: store.clone(),
                completion: Arc::new(fake),
                city_bounds: config.city_bounds,
                timeout: Duration::from_secs(5),
            },
            config,
            store,
            annotations: Arc::new(AnnotationBook::new()),
            wards: Arc::new(default_wards()),
        }
    }

    async fn send(
        state: &AppState,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn triage(state: &AppState, description: &str) -> serde_json::Value {
        let (status, body) = send(
            state,
            Method::POST,
            "/api/triage",
            Some(json!({ "description": description })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "respuesta inesperada: {body}");
        body
    }

    #[tokio::test]
    async fn triage_returns_enriched_record() {
        let state = state_with(FakeCompletion::replying(COMPLETION));
        let body = triage(&state, "Streetlight broken on 5th Ave").await;
        assert_eq!(body["department"], "Electrical");
        assert_eq!(body["category"], "Lighting");
        assert_eq!(body["urgency"], "High");
        assert_eq!(body["draft"], "Please repair...");
        let lat = body["lat"].as_f64().unwrap();
        let lng = body["lng"].as_f64().unwrap();
        assert!((19.07..=19.15).contains(&lat));
        assert!((72.85..=72.93).contains(&lng));
        assert!(body["id"].is_string());
        assert!(body["createdAt"].is_string());
    }

    #[tokio::test]
    async fn missing_description_is_400() {
        let state = state_with(FakeCompletion::replying(COMPLETION));
        let (status, body) = send(&state, Method::POST, "/api/triage", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Description missing");
    }

    async fn post_raw(
        state: &AppState,
        uri: &str,
        content_type: Option<&str>,
        body: &'static str,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(Method::POST).uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header("content-type", ct);
        }
        let request = builder.body(Body::from(body)).unwrap();
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn malformed_bodies_are_400_with_error_field() {
        let state = state_with(FakeCompletion::replying(COMPLETION));
        let cases = [
            (Some("application/json"), "{not json"),
            (None, r#"{"description":"Leak"}"#),
            (Some("text/plain"), r#"{"description":"Leak"}"#),
            (Some("application/json"), r#"{"description":42}"#),
        ];
        for (content_type, body) in cases {
            let (status, json) = post_raw(&state, "/api/triage", content_type, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "cuerpo {body:?}");
            assert!(json["error"].is_string(), "sin campo error: {json}");
        }
        assert!(state.store.list_all().await.unwrap().is_empty());

        let (status, json) =
            post_raw(&state, "/api/issues/x/notes", Some("application/json"), "[").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn upstream_failure_is_500_with_details() {
        let state = state_with(FakeCompletion::failing("rate limit exceeded (429)"));
        let (status, body) = send(
            &state,
            Method::POST,
            "/api/triage",
            Some(json!({ "description": "Water leakage" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "AI failed");
        assert_eq!(body["kind"], "rate_limited");
        assert!(body["details"].as_str().unwrap().contains("429"));
    }

    #[tokio::test]
    async fn dashboard_lists_newest_first_with_counts() {
        let state = state_with(FakeCompletion::replying(COMPLETION));
        let first = triage(&state, "Streetlight one").await;
        let second = triage(&state, "Streetlight two").await;

        let (status, body) = send(&state, Method::GET, "/api/dashboard", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["categoryCount"]["Lighting"], 2);
        assert_eq!(body["deptCount"]["Electrical"], 2);
        assert_eq!(body["issues"][0]["id"], second["id"]);
        assert_eq!(body["issues"][1]["id"], first["id"]);
    }

    #[tokio::test]
    async fn analytics_applies_filters_and_demo_flag() {
        let state = state_with(FakeCompletion::replying(COMPLETION));
        triage(&state, "Streetlight broken").await;

        let (status, body) = send(
            &state,
            Method::GET,
            "/api/analytics?search=nothing-matches&useDemoFallback=false",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"]["total"], 1);
        assert_eq!(body["summary"]["criticalCount"], 1);
        assert_eq!(body["summary"]["weeklyHistogram"]["buckets"][6], 2);
        assert_eq!(body["issues"].as_array().unwrap().len(), 0);

        let (_, body) = send(&state, Method::GET, "/api/analytics?onlyHotspots=true", None).await;
        assert_eq!(body["issues"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_analytics_uses_waveform_only_on_request() {
        let state = state_with(FakeCompletion::replying(COMPLETION));
        let (_, off) = send(&state, Method::GET, "/api/analytics", None).await;
        assert_eq!(off["summary"]["weeklyHistogram"]["synthetic"], false);

        let (_, on) = send(&state, Method::GET, "/api/analytics?useDemoFallback=true", None).await;
        assert_eq!(on["summary"]["weeklyHistogram"]["synthetic"], true);
        assert_eq!(on["summary"]["weeklyHistogram"]["buckets"], json!([3, 4, 6, 8, 6, 9, 10]));
    }

    #[tokio::test]
    async fn hotspots_feed() {
        let state = state_with(FakeCompletion::replying(COMPLETION));
        triage(&state, "Streetlight broken").await;

        let (status, body) = send(&state, Method::GET, "/api/hotspots?urgency=High", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["shown"], 1);
        assert_eq!(body["heat"][0][2], 4);
        assert_eq!(body["demoPointsAdded"], 0);
        assert_eq!(body["wards"].as_array().unwrap().len(), 2);

        let (_, body) = send(&state, Method::GET, "/api/hotspots?urgency=Low", None).await;
        assert_eq!(body["shown"], 0);
    }

    #[tokio::test]
    async fn issue_detail_and_annotations() {
        let state = state_with(FakeCompletion::replying(COMPLETION));
        let record = triage(&state, "Streetlight broken").await;
        let id = record["id"].as_str().unwrap();

        let (status, detail) = send(&state, Method::GET, &format!("/api/issues/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["slaHours"], 24);
        assert_eq!(detail["rootCause"], "Likely cause: Lighting issues (cluster size 1)");
        assert_eq!(detail["annotation"]["status"], "Pending");

        let (status, a) = send(
            &state,
            Method::POST,
            &format!("/api/issues/{id}/assign"),
            Some(json!({ "officer": "S. Kulkarni" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(a["assignedTo"], "S. Kulkarni");

        send(
            &state,
            Method::POST,
            &format!("/api/issues/{id}/notes"),
            Some(json!({ "note": "Site visited" })),
        )
        .await;
        let (_, a) = send(
            &state,
            Method::POST,
            &format!("/api/issues/{id}/status"),
            Some(json!({ "status": "In Progress" })),
        )
        .await;
        assert_eq!(a["status"], "In Progress");
        assert_eq!(a["notes"], json!(["Assigned to S. Kulkarni", "Site visited"]));

        // Las anotaciones no tocan el registro de triaje.
        let (_, dash) = send(&state, Method::GET, "/api/dashboard", None).await;
        assert!(dash["issues"][0].get("status").is_none());

        let (status, _) = send(&state, Method::GET, "/api/issues/nope/annotation", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &state,
            Method::POST,
            &format!("/api/issues/{id}/notes"),
            Some(json!({ "note": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_backend() {
        let state = state_with(FakeCompletion::replying(COMPLETION));
        let (status, body) = send(&state, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["store"], "memory");
    }
}
