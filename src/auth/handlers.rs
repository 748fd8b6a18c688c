use axum::{
    extract::{FromRef, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{ChangePasswordRequest, LoginRequest, LoginResponse, PublicUser, RegisterRequest,
              UpdateProfileRequest},
        extractors::AuthUser,
        services,
        session::{self, JwtKeys},
    },
    error::{ApiJson, AppError},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me).put(update_me).delete(delete_me))
        .route("/me/password", post(change_password))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = services::register(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(PublicUser::from(&user))))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, token) = session::login(&state, &payload.username, &payload.password).await?;
    let keys = JwtKeys::from_ref(&state);
    let cookie = session::session_cookie(&token, keys.ttl);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            token,
            user: PublicUser::from(&user),
        }),
    ))
}

#[instrument(skip(state, principal), fields(user_id = %principal.user.id))]
pub async fn logout(State(state): State<AppState>, principal: AuthUser) -> impl IntoResponse {
    session::logout(&state, &principal);
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, session::cleared_cookie())],
    )
}

#[instrument(skip(principal), fields(user_id = %principal.user.id))]
pub async fn get_me(principal: AuthUser) -> Json<PublicUser> {
    Json(PublicUser::from(&principal.user))
}

#[instrument(skip(state, principal, payload), fields(user_id = %principal.user.id))]
pub async fn update_me(
    State(state): State<AppState>,
    principal: AuthUser,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> Result<Json<PublicUser>, AppError> {
    let user = services::update_profile(&state, principal.user.id, payload).await?;
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip(state, principal, payload), fields(user_id = %principal.user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    principal: AuthUser,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    services::change_password(
        &state,
        principal.user.id,
        &payload.new_password,
        Some(principal.session_id),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, principal), fields(user_id = %principal.user.id))]
pub async fn delete_me(
    State(state): State<AppState>,
    principal: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    services::delete_account(&state, principal.user.id).await?;
    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, session::cleared_cookie())],
    ))
}
