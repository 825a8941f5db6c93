use crate::db::{self, HistoryRow};
use crate::domain::archive;
use crate::domain::models::RemovalReason;
use crate::domain::questions as questions_domain;
use crate::error::ContestError;
use crate::state::SharedState;
use crate::web::questions::QuestionResponse;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct ResetPayload {
    actor_id: Uuid,
}

#[derive(Debug, Serialize)]
struct ResetResponse {
    slot_id: Uuid,
    status: String,
    winner_id: Option<Uuid>,
    attempt_count: i32,
}

#[derive(Debug, Deserialize)]
struct RemovePayload {
    actor_id: Uuid,
    reason_code: String,
    free_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    date: Option<NaiveDate>,
    slot_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    id: Uuid,
    slot_id: Uuid,
    kind: String,
    snapshot: serde_json::Value,
    archived_at: DateTime<Utc>,
}

impl From<HistoryRow> for HistoryResponse {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: row.id,
            slot_id: row.slot_id,
            kind: row.kind,
            snapshot: row.snapshot,
            archived_at: row.archived_at,
        }
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/slots/:id/reset", post(reset_slot))
        .route("/slots/:id/question/remove", post(remove_question))
        .route("/history", get(get_history))
        .with_state(state)
}

/// Audited reset: the prior contest state lands in history before the slot
/// reopens.
async fn reset_slot(
    State(state): State<SharedState>,
    Path(slot_id): Path<Uuid>,
    Json(payload): Json<ResetPayload>,
) -> Result<Json<ResetResponse>, ContestError> {
    let fresh =
        archive::admin_reset_slot(&state.pool, &state.notifier, slot_id, payload.actor_id)
            .await?;
    Ok(Json(ResetResponse {
        slot_id: fresh.id,
        status: "PENDING".to_string(),
        winner_id: fresh.winner_id,
        attempt_count: fresh.attempt_count,
    }))
}

async fn remove_question(
    State(state): State<SharedState>,
    Path(slot_id): Path<Uuid>,
    Json(payload): Json<RemovePayload>,
) -> Result<Json<QuestionResponse>, ContestError> {
    let reason = RemovalReason::try_from(payload.reason_code.as_str()).map_err(|_| {
        ContestError::Validation(format!(
            "unknown reason code {:?}",
            payload.reason_code
        ))
    })?;
    let question = questions_domain::remove_question(
        &state.pool,
        &state.notifier,
        slot_id,
        reason,
        payload.free_text.as_deref(),
        payload.actor_id,
    )
    .await?;
    let response = QuestionResponse::from_row(&state.pool, question).await?;
    Ok(Json(response))
}

async fn get_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryResponse>>, ContestError> {
    let rows = match (query.slot_id, query.date) {
        (Some(slot_id), _) => db::history_for_slot(&state.pool, slot_id).await?,
        (None, Some(date)) => db::history_for_date(&state.pool, date).await?,
        (None, None) => {
            return Err(ContestError::Validation(
                "history queries take a date or slot_id".into(),
            ))
        }
    };
    Ok(Json(rows.into_iter().map(HistoryResponse::from).collect()))
}
