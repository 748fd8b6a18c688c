use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser,
    error::{ApiJson, ApiPath, ApiQuery, AppError},
    state::AppState,
    tasks::{
        dto::{CreateTaskRequest, MoveStatusRequest, StatusResponse, TaskQuery, UpdateTaskRequest},
        repo_types::Task,
        services,
    },
};

pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/tasks/:id/status", post(move_task))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/tasks/:id", delete(admin_delete_task))
}

#[instrument(skip(state, principal), fields(user_id = %principal.user.id))]
pub async fn list_tasks(
    State(state): State<AppState>,
    principal: AuthUser,
    ApiQuery(query): ApiQuery<TaskQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = services::list_filtered(
        &state,
        principal.user.id,
        query.q.as_deref(),
        query.status.as_deref(),
    )
    .await?;
    Ok(Json(tasks))
}

#[instrument(skip(state, principal, payload), fields(user_id = %principal.user.id))]
pub async fn create_task(
    State(state): State<AppState>,
    principal: AuthUser,
    ApiJson(payload): ApiJson<CreateTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    let task = services::create(&state, principal.user.id, payload).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/tasks/{}", task.id).parse() {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(task)))
}

#[instrument(skip(state, principal), fields(user_id = %principal.user.id))]
pub async fn get_task(
    State(state): State<AppState>,
    principal: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(services::get(&state, principal.user.id, id).await?))
}

#[instrument(skip(state, principal, payload), fields(user_id = %principal.user.id))]
pub async fn update_task(
    State(state): State<AppState>,
    principal: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateTaskRequest>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(services::update(&state, principal.user.id, id, payload).await?))
}

#[instrument(skip(state, principal), fields(user_id = %principal.user.id))]
pub async fn delete_task(
    State(state): State<AppState>,
    principal: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, AppError> {
    services::delete(&state, principal.user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, principal, payload), fields(user_id = %principal.user.id))]
pub async fn move_task(
    State(state): State<AppState>,
    principal: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<MoveStatusRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    let status = services::move_to_status(&state, principal.user.id, id, &payload.status).await?;
    Ok(Json(StatusResponse { id, status }))
}

#[instrument(skip(state, principal), fields(user_id = %principal.user.id))]
pub async fn admin_delete_task(
    State(state): State<AppState>,
    principal: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, AppError> {
    services::admin_delete(&state, &principal.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
