use crate::db::{self, QuestionRow};
use crate::domain::models::QuestionOption;
use crate::domain::voting::{self, OptionTally};
use crate::error::ContestError;
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct QuestionsQuery {
    date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct QuestionResponse {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    pub options: Vec<QuestionOption>,
    /// Live-aggregated from vote rows; the stored counter is display-only.
    pub tallies: Vec<OptionTally>,
    pub total_votes: i64,
    pub is_approved: bool,
    pub is_deleted: bool,
    pub deletion_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QuestionResponse {
    pub async fn from_row(pool: &PgPool, row: QuestionRow) -> Result<Self, ContestError> {
        let options = voting::parse_options(&row)?;
        let tallies = voting::tallies(pool, &row).await?;
        let total_votes = tallies.iter().map(|t| t.votes).sum();
        Ok(Self {
            id: row.id,
            slot_id: row.slot_id,
            user_id: row.user_id,
            text: row.text,
            options,
            tallies,
            total_votes,
            is_approved: row.is_approved,
            is_deleted: row.is_deleted,
            deletion_reason: row.deletion_reason,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct VotePayload {
    user_id: Uuid,
    option_id: String,
}

#[derive(Debug, Serialize)]
struct VoteResponse {
    accepted: bool,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(get_questions))
        .route("/:id/votes", post(vote))
        .with_state(state)
}

async fn get_questions(
    State(state): State<SharedState>,
    Query(query): Query<QuestionsQuery>,
) -> Result<Json<Vec<QuestionResponse>>, ContestError> {
    let rows = db::questions_for_date(&state.pool, query.date).await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(QuestionResponse::from_row(&state.pool, row).await?);
    }
    Ok(Json(out))
}

async fn vote(
    State(state): State<SharedState>,
    Path(question_id): Path<Uuid>,
    Json(payload): Json<VotePayload>,
) -> Result<Json<VoteResponse>, ContestError> {
    voting::vote(
        &state.pool,
        &state.notifier,
        &state.vote_cache,
        question_id,
        payload.user_id,
        &payload.option_id,
    )
    .await?;
    Ok(Json(VoteResponse { accepted: true }))
}
