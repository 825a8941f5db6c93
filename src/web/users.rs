use crate::db::{self, AttemptRow, VoteRow};
use crate::error::ContestError;
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct AttemptsQuery {
    date: NaiveDate,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/:id/attempts", get(get_user_attempts))
        .route("/:id/votes", get(get_user_votes))
        .with_state(state)
}

async fn get_user_attempts(
    State(state): State<SharedState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<AttemptsQuery>,
) -> Result<Json<Vec<AttemptRow>>, ContestError> {
    let attempts = db::attempts_for_user_date(&state.pool, user_id, query.date).await?;
    Ok(Json(attempts))
}

async fn get_user_votes(
    State(state): State<SharedState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<VoteRow>>, ContestError> {
    let votes = db::votes_for_user(&state.pool, user_id).await?;
    Ok(Json(votes))
}
