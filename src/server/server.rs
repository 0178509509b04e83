use anyhow::Result;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{error, info};

use axum_extra::extract::cookie::{Cookie, SameSite};
use tower_http::services::ServeDir;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{response, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{
    api_error::ExpiredAsMissing, log_requests, metrics, session::Session, state::*, ServerConfig,
};
use crate::lifecycle::LifecycleResult;
use crate::store::{FullStore, User, VlogUpload};
use crate::user::{auth::AuthTokenValue, NewAccount, UserManager};
use crate::vlog::VlogManager;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub session_token: Option<String>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize, Debug)]
struct LoginBody {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
struct LoginSuccessResponse {
    token: String,
}

#[derive(Deserialize, Debug)]
struct DiscoverQuery {
    q: Option<String>,
}

#[derive(Deserialize, Debug)]
struct FeedQuery {
    tag: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CommentBody {
    content: String,
}

/// A user as shown to other users. The email stays private to `/auth/me`.
#[derive(Serialize)]
struct ProfilePayload {
    id: usize,
    handle: String,
    display_name: String,
    avatar_url: Option<String>,
    bio: Option<String>,
    created: i64,
    followers_count: i64,
    following_count: i64,
    is_following: bool,
}

impl ProfilePayload {
    fn new(user: User, is_following: bool) -> Self {
        ProfilePayload {
            id: user.id,
            handle: user.handle,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
            bio: user.bio,
            created: user.created,
            followers_count: user.followers_count,
            following_count: user.following_count,
            is_following,
        }
    }
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        session_token: session.map(|s| s.token),
    };
    Json(stats)
}

async fn register(
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<NewAccount>,
) -> LifecycleResult<impl IntoResponse> {
    let user = user_manager.register(&body)?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<LoginBody>,
) -> Response {
    match user_manager.login(&body.email, &body.password) {
        Ok(Some((_user, auth_token))) => {
            metrics::record_login_attempt("success");

            let response_body = LoginSuccessResponse {
                token: auth_token.value.0.clone(),
            };
            let response_body = match serde_json::to_string(&response_body) {
                Ok(body) => body,
                Err(err) => {
                    error!("Failed to serialize login response: {}", err);
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            };

            let cookie_value = HeaderValue::from_str(&format!(
                "session_token={}; Path=/; HttpOnly",
                auth_token.value.0
            ))
            .expect("Session token is always a valid header value");
            response::Builder::new()
                .status(StatusCode::CREATED)
                .header(axum::http::header::SET_COOKIE, cookie_value)
                .body(Body::from(response_body))
                .expect("Login response is always well-formed")
        }
        Ok(None) => {
            metrics::record_login_attempt("failure");
            StatusCode::FORBIDDEN.into_response()
        }
        Err(err) => {
            error!("Error during login: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn logout(State(user_manager): State<GuardedUserManager>, session: Session) -> Response {
    match user_manager.logout(&AuthTokenValue(session.token)) {
        Ok(()) => {
            let cookie_value = Cookie::build(Cookie::new("session_token", ""))
                .path("/")
                .expires(time::OffsetDateTime::now_utc() - time::Duration::days(1))
                .same_site(SameSite::Lax)
                .build();

            response::Builder::new()
                .status(StatusCode::OK)
                .header(axum::http::header::SET_COOKIE, cookie_value.to_string())
                .body(Body::empty())
                .expect("Logout response is always well-formed")
        }
        Err(err) => err.into_response(),
    }
}

async fn me(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
) -> LifecycleResult<Json<User>> {
    Ok(Json(user_manager.get_user(session.user_id)?))
}

async fn discover_users(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Query(query): Query<DiscoverQuery>,
) -> LifecycleResult<Json<Vec<ProfilePayload>>> {
    let users = user_manager.discover(session.user_id, query.q.as_deref())?;
    Ok(Json(
        users
            .into_iter()
            .map(|(user, is_following)| ProfilePayload::new(user, is_following))
            .collect(),
    ))
}

async fn get_profile(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(handle): Path<String>,
) -> LifecycleResult<Json<ProfilePayload>> {
    let (user, is_following) = user_manager.profile(&handle, session.user_id)?;
    Ok(Json(ProfilePayload::new(user, is_following)))
}

async fn follow_user(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(handle): Path<String>,
) -> LifecycleResult<impl IntoResponse> {
    let target = user_manager.user_by_handle(&handle)?;
    user_manager.follow(session.user_id, target.id)?;
    Ok(StatusCode::CREATED)
}

async fn unfollow_user(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(handle): Path<String>,
) -> LifecycleResult<impl IntoResponse> {
    let target = user_manager.user_by_handle(&handle)?;
    user_manager.unfollow(session.user_id, target.id)?;
    Ok(StatusCode::OK)
}

async fn user_active_vlogs(
    session: Session,
    State(vlog_manager): State<GuardedVlogManager>,
    Path(handle): Path<String>,
) -> LifecycleResult<impl IntoResponse> {
    Ok(Json(vlog_manager.active_vlogs(&handle, session.user_id)?))
}

async fn user_expired_vlogs(
    session: Session,
    State(vlog_manager): State<GuardedVlogManager>,
    Path(handle): Path<String>,
) -> LifecycleResult<impl IntoResponse> {
    Ok(Json(vlog_manager.expired_vlogs(&handle, session.user_id)?))
}

async fn feed(
    session: Session,
    State(vlog_manager): State<GuardedVlogManager>,
    Query(query): Query<FeedQuery>,
) -> LifecycleResult<impl IntoResponse> {
    Ok(Json(
        vlog_manager.feed(session.user_id, query.tag.as_deref())?,
    ))
}

async fn post_vlog(
    session: Session,
    State(vlog_manager): State<GuardedVlogManager>,
    Json(body): Json<VlogUpload>,
) -> LifecycleResult<impl IntoResponse> {
    let view = vlog_manager.register_upload(session.user_id, &body)?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_vlog(
    session: Session,
    State(vlog_manager): State<GuardedVlogManager>,
    Path(id): Path<usize>,
) -> LifecycleResult<impl IntoResponse> {
    Ok(Json(vlog_manager.vlog_view(id, session.user_id)?))
}

async fn like_vlog(
    session: Session,
    State(vlog_manager): State<GuardedVlogManager>,
    Path(id): Path<usize>,
) -> Result<impl IntoResponse, ExpiredAsMissing> {
    vlog_manager
        .set_liked(id, session.user_id, true)
        .map_err(ExpiredAsMissing)?;
    Ok(StatusCode::CREATED)
}

async fn unlike_vlog(
    session: Session,
    State(vlog_manager): State<GuardedVlogManager>,
    Path(id): Path<usize>,
) -> Result<impl IntoResponse, ExpiredAsMissing> {
    vlog_manager
        .set_liked(id, session.user_id, false)
        .map_err(ExpiredAsMissing)?;
    Ok(StatusCode::OK)
}

async fn get_comments(
    session: Session,
    State(vlog_manager): State<GuardedVlogManager>,
    Path(id): Path<usize>,
) -> LifecycleResult<impl IntoResponse> {
    Ok(Json(vlog_manager.comments(id, session.user_id)?))
}

async fn post_comment(
    session: Session,
    State(vlog_manager): State<GuardedVlogManager>,
    Path(id): Path<usize>,
    Json(body): Json<CommentBody>,
) -> Result<impl IntoResponse, ExpiredAsMissing> {
    let comment = vlog_manager
        .add_comment(id, session.user_id, &body.content)
        .map_err(ExpiredAsMissing)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn republish_vlog(
    session: Session,
    State(vlog_manager): State<GuardedVlogManager>,
    Path(id): Path<usize>,
) -> LifecycleResult<impl IntoResponse> {
    Ok(Json(vlog_manager.republish(id, session.user_id)?))
}

impl ServerState {
    fn new(config: ServerConfig, store: Arc<dyn FullStore>) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            user_manager: Arc::new(UserManager::new(store.clone())),
            vlog_manager: Arc::new(VlogManager::new(store)),
            hash: env!("GIT_HASH").to_owned(),
        }
    }
}

pub fn make_app(config: ServerConfig, store: Arc<dyn FullStore>) -> Result<Router> {
    let state = ServerState::new(config.clone(), store);

    let auth_routes: Router = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/me", get(me))
        .with_state(state.clone());

    let user_routes: Router = Router::new()
        .route("/discover", get(discover_users))
        .route("/{handle}", get(get_profile))
        .route("/{handle}/follow", post(follow_user))
        .route("/{handle}/follow", delete(unfollow_user))
        .route("/{handle}/vlogs/active", get(user_active_vlogs))
        .route("/{handle}/vlogs/expired", get(user_expired_vlogs))
        .with_state(state.clone());

    let vlog_routes: Router = Router::new()
        .route("/", post(post_vlog))
        .route("/feed", get(feed))
        .route("/{id}", get(get_vlog))
        .route("/{id}/like", post(like_vlog))
        .route("/{id}/like", delete(unlike_vlog))
        .route("/{id}/comments", get(get_comments))
        .route("/{id}/comments", post(post_comment))
        .route("/{id}/republish", post(republish_vlog))
        .with_state(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    let mut app: Router = home_router
        .nest("/v1/auth", auth_routes)
        .nest("/v1/users", user_routes)
        .nest("/v1/vlogs", vlog_routes);

    app = app.layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

pub async fn run_server(config: ServerConfig, store: Arc<dyn FullStore>) -> Result<()> {
    let port = config.port;
    let metrics_port = config.metrics_port;
    let app = make_app(config, store)?;

    let metrics_listener =
        tokio::net::TcpListener::bind(format!("127.0.0.1:{}", metrics_port)).await?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(metrics_listener, metrics::make_metrics_router()).await {
            error!("Metrics server failed: {}", err);
        }
    });
    info!("Metrics exposed on 127.0.0.1:{}/metrics", metrics_port);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("Listening on 127.0.0.1:{}", port);

    Ok(axum::serve(listener, app).await?)
}
