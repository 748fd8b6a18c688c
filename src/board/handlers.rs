use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;

use super::services::{self, Board};
use crate::{
    auth::extractors::AuthUser,
    error::{ApiQuery, AppError},
    state::AppState,
    tasks,
};

#[derive(Debug, Default, Deserialize)]
pub struct BoardQuery {
    #[serde(default)]
    pub q: String,
}

pub fn board_routes() -> Router<AppState> {
    Router::new().route("/board", get(get_board))
}

#[instrument(skip(state, principal), fields(user_id = %principal.user.id))]
pub async fn get_board(
    State(state): State<AppState>,
    principal: AuthUser,
    ApiQuery(query): ApiQuery<BoardQuery>,
) -> Result<Json<Board>, AppError> {
    let tasks = tasks::services::list_by_owner(&state, principal.user.id).await?;
    Ok(Json(services::project(
        &tasks,
        services::today(),
        state.config.upcoming_window_days,
        &query.q,
    )))
}
