//! HTML surface: license gate, planner form and health check
//!
//! Every handler reads the session cookie and derives an explicit
//! [`SessionState`]; only `/login` and `/health` are reachable without an
//! authenticated session.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::licensing::LicenseVerifier;
use crate::planner::{BindingStatus, PlanError, PlanService, TripRequest};
use crate::session::{SessionState, SessionStore};
use crate::types::{LicenseError, SessionId};

pub mod render;
pub mod server;

pub use render::{markdown_to_html, PlanResult};
pub use server::WebServer;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub planner: Arc<dyn PlanService>,
    pub verifier: Arc<dyn LicenseVerifier>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    fn session_id(&self, headers: &HeaderMap) -> Option<SessionId> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| self.sessions.session_from_cookie(value))
    }

    fn session(&self, headers: &HeaderMap) -> (Option<SessionId>, SessionState) {
        let id = self.session_id(headers);
        let state = self.sessions.state(id.as_ref());
        (id, state)
    }
}

/// Build the application router
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/", get(index))
        .route("/login", post(login))
        .route("/plan", post(plan))
        .route("/resolve", post(resolve))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .with_state(state);

    if config.request_tracing {
        router = router.layer(TraceLayer::new_for_http());
    }

    router
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    #[serde(default)]
    license_key: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub binding: BindingStatus,
}

async fn index(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    let (_, session) = state.session(&headers);
    if !session.is_authenticated() {
        return Html(render::login_page(None));
    }

    let status = state.planner.status().await;
    Html(render::planner_page(
        &status,
        &TripRequest::default(),
        PlanResult::None,
    ))
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let (previous, _) = state.session(&headers);

    match state.verifier.verify(&form.license_key).await {
        Ok(grant) => {
            let id = state.sessions.login(previous.as_ref(), &grant);
            (
                [(header::SET_COOKIE, state.sessions.set_cookie(&id))],
                Redirect::to("/"),
            )
                .into_response()
        }
        Err(e) => {
            let (status, message) = login_failure(&e);
            (status, Html(render::login_page(Some(&message)))).into_response()
        }
    }
}

fn login_failure(error: &LicenseError) -> (StatusCode, String) {
    if error.is_denial() {
        (StatusCode::UNAUTHORIZED, "Invalid License Key.".to_string())
    } else {
        (
            StatusCode::BAD_GATEWAY,
            format!("Connection Error: {}", error),
        )
    }
}

async fn plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(request): Form<TripRequest>,
) -> Response {
    let (_, session) = state.session(&headers);
    if !session.is_authenticated() {
        return Redirect::to("/").into_response();
    }

    let outcome = state.planner.plan(&request).await;
    let status = state.planner.status().await;

    let page = match &outcome {
        Ok(generation) => {
            render::planner_page(&status, &request, PlanResult::Itinerary(generation))
        }
        Err(e) => render::planner_page(&status, &request, PlanResult::Error(plan_failure(e))),
    };
    Html(page).into_response()
}

fn plan_failure(error: &PlanError) -> String {
    if error.is_transient() {
        format!("Error: {}. Please try again.", error)
    } else {
        format!("Error: {}", error)
    }
}

async fn resolve(State(state): State<AppState>, headers: HeaderMap) -> Redirect {
    let (_, session) = state.session(&headers);
    if session.is_authenticated() {
        let status = state.planner.resolve().await;
        tracing::info!("Discovery retried: bound={}", status.is_bound());
    }
    Redirect::to("/")
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::VERSION.to_string(),
        timestamp: chrono::Utc::now(),
        binding: state.planner.status().await,
    })
}
