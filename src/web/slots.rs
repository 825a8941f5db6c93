use crate::db::SlotRow;
use crate::domain::contest;
use crate::domain::models::{JoinOutcome, SlotStatus};
use crate::domain::questions as questions_domain;
use crate::domain::schedule::{self, ContestConfig};
use crate::error::ContestError;
use crate::services::notifier::{ContestEvent, EventKind};
use crate::state::SharedState;
use crate::web::questions::QuestionResponse;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct SlotsQuery {
    date: NaiveDate,
}

#[derive(Debug, Serialize)]
struct SlotResponse {
    id: Uuid,
    date: NaiveDate,
    time: String,
    status: SlotStatus,
    winner_id: Option<Uuid>,
    attempt_count: i32,
    window_open: bool,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl SlotResponse {
    fn from_row(slot: SlotRow, config: &ContestConfig, now: NaiveDateTime) -> Self {
        let window_open = !slot.status.is_closed()
            && config.is_within_window(now, slot.slot_date, slot.slot_time);
        Self {
            id: slot.id,
            date: slot.slot_date,
            time: slot.slot_time.format("%H:%M").to_string(),
            status: slot.status,
            winner_id: slot.winner_id,
            attempt_count: slot.attempt_count,
            window_open,
            started_at: slot.started_at,
            ended_at: slot.ended_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AttemptPayload {
    user_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct QuestionPayload {
    user_id: Uuid,
    text: String,
    options: Vec<String>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(get_slots))
        .route("/:id/attempts", post(attempt_join))
        .route("/:id/question", post(submit_question))
        .with_state(state)
}

/// The date's full slot set, idempotently materialized and with statuses
/// lazily reconciled against the server clock.
async fn get_slots(
    State(state): State<SharedState>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Vec<SlotResponse>>, ContestError> {
    let slots = schedule::ensure_day(&state.pool, &state.config, query.date).await?;
    let now = state.config.local_now();

    let mut out = Vec::with_capacity(slots.len());
    for slot in slots {
        let (slot, expired_now) =
            schedule::reconcile_slot(&state.pool, &state.config, slot, now).await?;
        if expired_now {
            state
                .notifier
                .publish(ContestEvent::slot(
                    EventKind::SlotExpired,
                    slot.slot_date,
                    slot.id,
                ))
                .await;
        }
        out.push(SlotResponse::from_row(slot, &state.config, now));
    }
    Ok(Json(out))
}

async fn attempt_join(
    State(state): State<SharedState>,
    Path(slot_id): Path<Uuid>,
    Json(payload): Json<AttemptPayload>,
) -> Result<Json<JoinOutcome>, ContestError> {
    if !state.throttle.check(payload.user_id).await {
        return Err(ContestError::Throttled);
    }
    let outcome = contest::attempt_join(
        &state.pool,
        &state.config,
        &state.notifier,
        slot_id,
        payload.user_id,
    )
    .await?;
    Ok(Json(outcome))
}

async fn submit_question(
    State(state): State<SharedState>,
    Path(slot_id): Path<Uuid>,
    Json(payload): Json<QuestionPayload>,
) -> Result<Json<QuestionResponse>, ContestError> {
    let question = questions_domain::submit_question(
        &state.pool,
        &state.notifier,
        slot_id,
        payload.user_id,
        &payload.text,
        &payload.options,
    )
    .await?;
    let response = QuestionResponse::from_row(&state.pool, question).await?;
    Ok(Json(response))
}
