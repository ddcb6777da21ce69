//! REST + WebSocket endpoints for onboarding sessions.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::SessionEvent;
use super::model::ProfileUpdate;
use super::registry::SessionRegistry;
use super::session::OnboardingSession;
use super::state::OnboardingStep;
use crate::error::{Error, IdentityError, OnboardingError};

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub registry: Arc<SessionRegistry>,
}

type ApiError = (StatusCode, Json<Value>);
type ApiResult = Result<(StatusCode, Json<Value>), ApiError>;

/// Build the onboarding REST and WebSocket routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/sessions/{id}/auth/sign-up", post(sign_up))
        .route("/api/sessions/{id}/auth/sign-in", post(sign_in))
        .route("/api/sessions/{id}/auth/google", post(google_sign_in))
        .route("/api/sessions/{id}/auth/sign-out", post(sign_out))
        .route(
            "/api/sessions/{id}/auth/verification/resend",
            post(resend_verification),
        )
        .route(
            "/api/sessions/{id}/auth/verification/check",
            post(check_verification),
        )
        .route(
            "/api/sessions/{id}/auth/verification/watch",
            post(watch_verification),
        )
        .route("/api/sessions/{id}/profile", patch(update_profile))
        .route("/api/sessions/{id}/insights", post(fetch_insights))
        .route("/api/sessions/{id}/scan", post(start_scan))
        .route("/api/sessions/{id}/scan/retry", post(retry_scan))
        .route("/api/sessions/{id}/scan/cancel", post(cancel_scan))
        .route("/api/sessions/{id}/submit", post(submit_organization))
        .route("/api/sessions/{id}/navigate", post(navigate))
        .route("/api/sessions/{id}/embed", get(embed_snippet))
        .route("/api/sessions/{id}/detection", post(start_detection))
        .route("/api/sessions/{id}/detection/retry", post(retry_detection))
        .route("/api/sessions/{id}/detection/cancel", post(cancel_detection))
        .route(
            "/api/sessions/{id}/integration/instructions",
            post(send_instructions),
        )
        .route("/api/sessions/{id}/complete", post(complete))
        .route("/ws/sessions/{id}", get(ws_handler))
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────────

fn api_error(err: Error) -> ApiError {
    let status = match &err {
        Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::Identity(IdentityError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Identity(_) => StatusCode::UNAUTHORIZED,
        Error::Onboarding(OnboardingError::Validation { .. }) => StatusCode::BAD_REQUEST,
        Error::Onboarding(OnboardingError::SessionNotFound { .. }) => StatusCode::NOT_FOUND,
        Error::Onboarding(_) => StatusCode::CONFLICT,
    };
    let message = match &err {
        Error::Identity(e) => e.user_message(),
        Error::Onboarding(e) => e.to_string(),
        Error::Config(e) => e.to_string(),
    };
    (status, Json(json!({ "error": message })))
}

fn onboarding_error(err: OnboardingError) -> ApiError {
    api_error(err.into())
}

fn ok(value: Value) -> ApiResult {
    Ok((StatusCode::OK, Json(value)))
}

async fn lookup(
    state: &OnboardingRouteState,
    id: &str,
) -> Result<Arc<OnboardingSession>, ApiError> {
    let id = Uuid::parse_str(id).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid session ID" })),
        )
    })?;
    state.registry.get(id).await.map_err(onboarding_error)
}

async fn snapshot_json(session: &OnboardingSession) -> Value {
    serde_json::to_value(session.snapshot().await).unwrap_or_default()
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "chatbot-onboarding"
    }))
}

// ── Sessions ────────────────────────────────────────────────────────────

async fn create_session(State(state): State<OnboardingRouteState>) -> ApiResult {
    let session = state.registry.create().await;
    Ok((StatusCode::CREATED, Json(snapshot_json(&session).await)))
}

async fn get_session(State(state): State<OnboardingRouteState>, Path(id): Path<String>) -> ApiResult {
    let session = lookup(&state, &id).await?;
    ok(snapshot_json(&session).await)
}

async fn delete_session(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> ApiResult {
    let session = lookup(&state, &id).await?;
    state
        .registry
        .remove(session.id())
        .await
        .map_err(onboarding_error)?;
    ok(json!({ "status": "closed" }))
}

// ── Identity ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SignUpRequest {
    email: String,
    password: String,
    name: String,
}

#[derive(Deserialize)]
struct SignInRequest {
    email: String,
    password: String,
}

async fn sign_up(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(body): Json<SignUpRequest>,
) -> ApiResult {
    let session = lookup(&state, &id).await?;
    let password = SecretString::from(body.password);
    session
        .sign_up(&body.email, &password, &body.name)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(snapshot_json(&session).await)))
}

async fn sign_in(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(body): Json<SignInRequest>,
) -> ApiResult {
    let session = lookup(&state, &id).await?;
    let password = SecretString::from(body.password);
    session
        .sign_in(&body.email, &password)
        .await
        .map_err(api_error)?;
    ok(snapshot_json(&session).await)
}

async fn google_sign_in(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> ApiResult {
    let session = lookup(&state, &id).await?;
    session.sign_in_with_google().await.map_err(api_error)?;
    ok(snapshot_json(&session).await)
}

async fn sign_out(State(state): State<OnboardingRouteState>, Path(id): Path<String>) -> ApiResult {
    let session = lookup(&state, &id).await?;
    session.sign_out().await.map_err(api_error)?;
    ok(json!({ "status": "signed_out" }))
}

async fn resend_verification(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> ApiResult {
    let session = lookup(&state, &id).await?;
    session.resend_verification().await.map_err(api_error)?;
    ok(json!({ "status": "sent" }))
}

async fn check_verification(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> ApiResult {
    let session = lookup(&state, &id).await?;
    let verified = session.check_verification().await.map_err(api_error)?;
    ok(json!({ "verified": verified, "step": session.step().await }))
}

async fn watch_verification(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> ApiResult {
    let session = lookup(&state, &id).await?;
    if session.current_user().await.is_none() {
        return Err(api_error(IdentityError::NotSignedIn.into()));
    }
    session.watch_verification();
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "watching" }))))
}

// ── Organization ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct WebsiteRequest {
    website_url: String,
}

async fn update_profile(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult {
    let session = lookup(&state, &id).await?;
    let profile = session.update_profile(update).await;
    ok(json!(profile))
}

async fn fetch_insights(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(body): Json<WebsiteRequest>,
) -> ApiResult {
    let session = lookup(&state, &id).await?;
    let insight = session
        .fetch_insights(&body.website_url)
        .await
        .map_err(onboarding_error)?;
    ok(json!(insight))
}

async fn start_scan(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(body): Json<WebsiteRequest>,
) -> ApiResult {
    let session = lookup(&state, &id).await?;
    session
        .start_scan(&body.website_url)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::ACCEPTED, Json(snapshot_json(&session).await)))
}

async fn retry_scan(State(state): State<OnboardingRouteState>, Path(id): Path<String>) -> ApiResult {
    let session = lookup(&state, &id).await?;
    session.retry_training().await.map_err(api_error)?;
    Ok((StatusCode::ACCEPTED, Json(snapshot_json(&session).await)))
}

async fn cancel_scan(State(state): State<OnboardingRouteState>, Path(id): Path<String>) -> ApiResult {
    let session = lookup(&state, &id).await?;
    let cancelled = session.cancel_scan().await;
    ok(json!({ "cancelled": cancelled }))
}

async fn submit_organization(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> ApiResult {
    let session = lookup(&state, &id).await?;
    let submission = session
        .submit_organization()
        .await
        .map_err(onboarding_error)?;
    ok(json!(submission))
}

// ── Flow + integration ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct NavigateRequest {
    step: OnboardingStep,
}

async fn navigate(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Json(body): Json<NavigateRequest>,
) -> ApiResult {
    let session = lookup(&state, &id).await?;
    let step = session.navigate(body.step).await.map_err(api_error)?;
    ok(json!({ "step": step }))
}

async fn embed_snippet(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> ApiResult {
    let session = lookup(&state, &id).await?;
    ok(json!({ "snippet": session.embed_snippet() }))
}

async fn start_detection(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> ApiResult {
    let session = lookup(&state, &id).await?;
    session.start_detection().await.map_err(api_error)?;
    Ok((StatusCode::ACCEPTED, Json(snapshot_json(&session).await)))
}

async fn retry_detection(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> ApiResult {
    let session = lookup(&state, &id).await?;
    session.retry_detection().await.map_err(api_error)?;
    Ok((StatusCode::ACCEPTED, Json(snapshot_json(&session).await)))
}

async fn cancel_detection(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> ApiResult {
    let session = lookup(&state, &id).await?;
    let cancelled = session.cancel_detection().await;
    ok(json!({ "cancelled": cancelled }))
}

#[derive(Deserialize, Default)]
struct InstructionsRequest {
    #[serde(default)]
    email: Option<String>,
}

async fn send_instructions(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    body: Option<Json<InstructionsRequest>>,
) -> ApiResult {
    let session = lookup(&state, &id).await?;
    let Json(body) = body.unwrap_or_default();
    let recipient = session
        .send_developer_instructions(body.email.as_deref())
        .await
        .map_err(api_error)?;
    ok(json!({
        "status": "sent",
        "recipient": recipient,
        "message": "Instructions sent to developer!"
    }))
}

async fn complete(State(state): State<OnboardingRouteState>, Path(id): Path<String>) -> ApiResult {
    let session = lookup(&state, &id).await?;
    session.complete().await.map_err(onboarding_error)?;
    ok(snapshot_json(&session).await)
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = lookup(&state, &id).await?;
    info!(session_id = %session.id(), "WebSocket client connecting");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, session)))
}

async fn send_sync(socket: &mut WebSocket, session: &OnboardingSession) -> bool {
    let sync = SessionEvent::SessionSync {
        snapshot: Box::new(session.snapshot().await),
    };
    send_event(socket, &sync).await
}

async fn send_event(socket: &mut WebSocket, event: &SessionEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize session event");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, session: Arc<OnboardingSession>) {
    let session_id = session.id();
    // Subscribe before the sync so nothing between the two is lost.
    let mut rx = session.subscribe();
    let closed = session.closed();

    if !send_sync(&mut socket, &session).await {
        warn!(%session_id, "Failed to send initial sync, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        session.touch();
                        if !send_event(&mut socket, &event).await {
                            debug!(%session_id, "Client disconnected during send");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(%session_id, missed = n, "WS client lagged behind broadcast");
                        if !send_sync(&mut socket, &session).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!(%session_id, "Broadcast channel closed");
                        break;
                    }
                }
            }

            _ = closed.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(%session_id, "WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(%session_id, error = %e, "WebSocket error");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!(%session_id, text = text.as_str(), "Ignoring client message");
                    }
                    _ => {}
                }
            }
        }
    }

    info!(%session_id, "WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::config::OnboardingConfig;
    use crate::identity::InMemoryIdentity;
    use crate::onboarding::session::SessionDeps;

    fn app() -> Router {
        let config = OnboardingConfig::with_time_unit(Duration::from_millis(5));
        let identity =
            Arc::new(InMemoryIdentity::new().with_google_account("grace@example.com", "Grace"));
        let deps = SessionDeps::simulated(&config, identity);
        onboarding_routes(OnboardingRouteState {
            registry: SessionRegistry::new(config, deps),
        })
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn new_session(app: &Router) -> String {
        let (status, json) = call(app, "POST", "/api/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        json["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_ok() {
        let (status, json) = call(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn new_session_starts_at_register() {
        let app = app();
        let id = new_session(&app).await;
        let (status, json) = call(&app, "GET", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["step"], "register");
        assert_eq!(json["training"]["status"], "not_started");
        assert!(json["user"].is_null());
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids() {
        let app = app();
        let (status, json) = call(&app, "GET", "/api/sessions/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid session ID");

        let uri = format!("/api/sessions/{}", Uuid::new_v4());
        let (status, _) = call(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_url_is_bad_request() {
        let app = app();
        let id = new_session(&app).await;
        call(&app, "POST", &format!("/api/sessions/{id}/auth/google"), None).await;
        let (status, json) = call(
            &app,
            "POST",
            &format!("/api/sessions/{id}/scan"),
            Some(json!({ "website_url": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Please enter a website URL");
    }

    #[tokio::test]
    async fn identity_failures_are_unauthorized() {
        let app = app();
        let id = new_session(&app).await;
        let (status, json) = call(
            &app,
            "POST",
            &format!("/api/sessions/{id}/auth/sign-in"),
            Some(json!({ "email": "nobody@example.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid credentials");
    }

    #[tokio::test]
    async fn flow_preconditions_conflict() {
        let app = app();
        let id = new_session(&app).await;

        let (status, json) = call(&app, "POST", &format!("/api/sessions/{id}/auth/google"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["step"], "setup_organization");

        let (status, json) = call(&app, "POST", &format!("/api/sessions/{id}/submit"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"], "Please complete website training");

        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/sessions/{id}/navigate"),
            Some(json!({ "step": "complete" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&app, "POST", &format!("/api/sessions/{id}/scan/retry"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn scan_without_user_is_unauthorized() {
        let app = app();
        let id = new_session(&app).await;
        let (status, json) = call(
            &app,
            "POST",
            &format!("/api/sessions/{id}/scan"),
            Some(json!({ "website_url": "https://example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "No user is signed in");

        let (status, _) = call(&app, "POST", &format!("/api/sessions/{id}/detection"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn instructions_wait_for_integration_steps() {
        let app = app();
        let id = new_session(&app).await;
        call(&app, "POST", &format!("/api/sessions/{id}/auth/google"), None).await;
        let (status, json) = call(
            &app,
            "POST",
            &format!("/api/sessions/{id}/integration/instructions"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"], "Finish setting up your organization first");
    }

    #[tokio::test]
    async fn embed_snippet_is_served() {
        let app = app();
        let id = new_session(&app).await;
        let (status, json) = call(&app, "GET", &format!("/api/sessions/{id}/embed"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json["snippet"].as_str().unwrap(),
            crate::onboarding::embed::REFERENCE_SNIPPET
        );
    }

    #[tokio::test]
    async fn delete_closes_session() {
        let app = app();
        let id = new_session(&app).await;
        let (status, _) = call(&app, "DELETE", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, "GET", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
