use anyhow::{Context, Result};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use axum_extra::extract::cookie::{Cookie, SameSite};
use tower_http::services::ServeDir;

use axum::{
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::enhance_routes::{enhance_routes, ErrorResponse};
use super::metrics::{metrics_handler, record_login_attempt};
use super::session::{Session, COOKIE_SESSION_TOKEN_KEY};
use super::{log_requests, state::*, ServerConfig};
use crate::enhancement::EngineAvailability;
use crate::user::auth::AuthTokenValue;

pub const SERVICE_NAME: &str = "audio-humanizer";

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub session_token: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: String,
    pub engine: EngineAvailability,
    pub checked_at: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize)]
struct CredentialsBody {
    pub user_handle: String,
    pub password: String,
}

impl std::fmt::Debug for CredentialsBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsBody")
            .field("user_handle", &self.user_handle)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct LoginSuccessResponse {
    token: String,
}

#[derive(Serialize)]
struct RegisterSuccessResponse {
    user_id: usize,
}

#[derive(Deserialize, Debug)]
struct SubscriptionBody {
    pub active: bool,
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        session_token: session.map(|s| s.token),
    };
    Json(stats)
}

async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: state.hash.clone(),
        engine: state.pipeline.availability().await,
        checked_at: chrono::Utc::now().to_rfc3339(),
    })
}

async fn register(
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<CredentialsBody>,
) -> Response {
    debug!("register() called with {:?}", body);
    match user_manager.add_user(&body.user_handle, &body.password) {
        Ok(user_id) => (
            StatusCode::CREATED,
            Json(RegisterSuccessResponse { user_id }),
        )
            .into_response(),
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: err.to_string(),
                details: None,
            }),
        )
            .into_response(),
    }
}

async fn login(
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<CredentialsBody>,
) -> Response {
    debug!("login() called with {:?}", body);
    let start = Instant::now();
    match user_manager.login(&body.user_handle, &body.password) {
        Ok(Some(auth_token)) => {
            record_login_attempt("success", start.elapsed());
            let cookie = Cookie::build((COOKIE_SESSION_TOKEN_KEY, auth_token.value.0.clone()))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .build();
            (
                StatusCode::CREATED,
                [(header::SET_COOKIE, cookie.to_string())],
                Json(LoginSuccessResponse {
                    token: auth_token.value.0,
                }),
            )
                .into_response()
        }
        Ok(None) => {
            record_login_attempt("failure", start.elapsed());
            StatusCode::FORBIDDEN.into_response()
        }
        Err(err) => {
            record_login_attempt("error", start.elapsed());
            error!("Error with auth token generation: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn logout(State(user_manager): State<GuardedUserManager>, session: Session) -> Response {
    match user_manager.delete_auth_token(session.user_id, &AuthTokenValue(session.token)) {
        Ok(()) => {
            let cookie = Cookie::build((COOKIE_SESSION_TOKEN_KEY, ""))
                .path("/")
                .expires(time::OffsetDateTime::now_utc() - time::Duration::days(1))
                .same_site(SameSite::Lax)
                .build();

            (StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]).into_response()
        }
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn get_me(session: Session, State(user_manager): State<GuardedUserManager>) -> Response {
    match user_manager.get_user_profile(session.user_id) {
        Ok(Some(profile)) => Json(profile).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to load profile of user {}: {}", session.user_id, err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn post_subscription(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<SubscriptionBody>,
) -> Response {
    if let Err(err) = user_manager.set_subscription_active(session.user_id, body.active) {
        error!(
            "Failed to update subscription of user {}: {}",
            session.user_id, err
        );
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    get_me(session, State(user_manager)).await
}

pub fn make_app(
    config: ServerConfig,
    user_manager: GuardedUserManager,
    pipeline: GuardedPipeline,
) -> Result<Router> {
    let state = ServerState::new(config.clone(), user_manager, pipeline);

    let auth_routes: Router = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .with_state(state.clone());

    let user_routes: Router = Router::new()
        .route("/me", get(get_me))
        .route("/subscription", post(post_subscription))
        .with_state(state.clone());

    let api_routes: Router = Router::new()
        .route("/v1/health", get(health))
        .merge(enhance_routes(config.max_upload_bytes))
        .with_state(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new().route("/", get(home)).with_state(state.clone()),
    };

    let app: Router = home_router
        .merge(api_routes)
        .nest("/v1/auth", auth_routes)
        .nest("/v1/user", user_routes)
        .layer(middleware::from_fn_with_state(state, log_requests));

    Ok(app)
}

pub fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

pub async fn run_server(
    config: ServerConfig,
    user_manager: GuardedUserManager,
    pipeline: GuardedPipeline,
    metrics_port: u16,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, user_manager, pipeline)?;

    let metrics_listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", metrics_port))
        .await
        .with_context(|| format!("Could not bind metrics port {}", metrics_port))?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(metrics_listener, make_metrics_app()).await {
            error!("Metrics server stopped: {}", err);
        }
    });

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Could not bind port {}", port))?;
    info!("Listening on {:?}", listener.local_addr()?);

    Ok(axum::serve(listener, app).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enhancement::{
        AudioEngine, EngineObserver, EnhancementPipeline, FilterChain, ProcessingError,
        TempFileManager,
    };
    use crate::user::{SqliteUserStore, UserManager};
    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct OfflineEngine;

    #[async_trait]
    impl AudioEngine for OfflineEngine {
        async fn probe(&self) -> EngineAvailability {
            EngineAvailability::Unavailable
        }

        async fn process(
            &self,
            _input: &Path,
            _output: &Path,
            _chain: &FilterChain,
            _observer: &dyn EngineObserver,
        ) -> Result<PathBuf, ProcessingError> {
            unreachable!("offline engine is never invoked")
        }
    }

    fn test_app(temp_dir: &TempDir) -> Router {
        let store = SqliteUserStore::new(temp_dir.path().join("user.db")).unwrap();
        let user_manager = Arc::new(UserManager::new(Arc::new(store), 3));
        let temp_files = Arc::new(TempFileManager::new(
            temp_dir.path().join("tmp"),
            Duration::from_secs(60),
        ));
        let pipeline = Arc::new(EnhancementPipeline::new(
            Arc::new(OfflineEngine),
            Duration::ZERO,
            temp_files,
        ));
        let config = ServerConfig {
            requests_logging_level: super::super::RequestsLoggingLevel::None,
            ..Default::default()
        };
        make_app(config, user_manager, pipeline).unwrap()
    }

    #[test]
    fn formats_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(
            format_uptime(Duration::from_secs(86_400 + 3600 * 2 + 60 * 3 + 4)),
            "1d 02:03:04"
        );
    }

    #[tokio::test]
    async fn responds_forbidden_on_protected_routes() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(&temp_dir);

        for route in ["/v1/auth/logout", "/v1/user/me"] {
            let request = Request::builder().uri(route).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", route);
        }

        let request = Request::builder()
            .method("POST")
            .uri("/v1/enhance")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=x")
            .body(Body::from("--x--\r\n"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn health_reports_engine_state() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(&temp_dir);

        let request = Request::builder()
            .uri("/v1/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["service"], SERVICE_NAME);
        assert_eq!(json["engine"], "unavailable");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn home_is_public() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_app(&temp_dir);

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
