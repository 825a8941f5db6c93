use crate::domain::models::SlotStatus;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SlotRow {
    pub id: Uuid,
    pub slot_date: NaiveDate,
    pub slot_time: NaiveTime,
    pub status: SlotStatus,
    pub winner_id: Option<Uuid>,
    pub attempt_count: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AttemptRow {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub user_id: Uuid,
    pub attempted_at: DateTime<Utc>,
    pub is_winner: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuestionRow {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    pub options: serde_json::Value,
    pub total_votes: i32,
    pub is_approved: bool,
    pub is_deleted: bool,
    pub deletion_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VoteRow {
    pub id: Uuid,
    pub question_id: Uuid,
    pub user_id: Uuid,
    pub selected_option: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HistoryRow {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub kind: String,
    pub snapshot: serde_json::Value,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TallyRow {
    pub selected_option: String,
    pub votes: i64,
}

/// Classify a storage failure as a uniqueness-constraint rejection. The
/// constraints are the authoritative guard for attempt, question, and vote
/// uniqueness; callers translate this into the matching typed outcome.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

const SLOT_COLUMNS: &str =
    "id, slot_date, slot_time, status, winner_id, attempt_count, started_at, ended_at, created_at";

/// First half of the idempotent create-or-fetch: the conflict loser simply
/// inserts nothing and re-fetches.
pub async fn insert_slot_if_absent(
    pool: &PgPool,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO slots (slot_date, slot_time)
        VALUES ($1, $2)
        ON CONFLICT (slot_date, slot_time) DO NOTHING
        "#,
    )
    .bind(date)
    .bind(time)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn get_slot(pool: &PgPool, id: Uuid) -> Result<Option<SlotRow>, sqlx::Error> {
    sqlx::query_as::<_, SlotRow>(&format!(
        "SELECT {SLOT_COLUMNS} FROM slots WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn get_slot_by_key(
    pool: &PgPool,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<Option<SlotRow>, sqlx::Error> {
    sqlx::query_as::<_, SlotRow>(&format!(
        "SELECT {SLOT_COLUMNS} FROM slots WHERE slot_date = $1 AND slot_time = $2"
    ))
    .bind(date)
    .bind(time)
    .fetch_optional(pool)
    .await
}

pub async fn get_slots_for_date(
    pool: &PgPool,
    date: NaiveDate,
) -> Result<Vec<SlotRow>, sqlx::Error> {
    sqlx::query_as::<_, SlotRow>(&format!(
        "SELECT {SLOT_COLUMNS} FROM slots WHERE slot_date = $1 ORDER BY slot_time"
    ))
    .bind(date)
    .fetch_all(pool)
    .await
}

/// PENDING -> ACTIVE on the first in-window attempt. Not correctness-bearing;
/// the window check itself is recomputed from configuration on every call.
pub async fn mark_slot_active(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE slots
        SET status = 'ACTIVE', started_at = NOW()
        WHERE id = $1 AND status = 'PENDING'
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// The winner claim. One conditional statement; the store's write
/// serialization is the only tie-break. `false` means another caller already
/// holds the slot, a defined non-error outcome.
pub async fn claim_winner(
    pool: &PgPool,
    slot_id: Uuid,
    user_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE slots
        SET winner_id = $2, status = 'COMPLETED', ended_at = NOW()
        WHERE id = $1 AND winner_id IS NULL
        "#,
    )
    .bind(slot_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Persist a lazily-derived expiry. Guarded on `winner_id IS NULL` so a
/// concurrent winner claim can never be clobbered.
pub async fn expire_slot(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE slots
        SET status = 'EXPIRED', ended_at = NOW()
        WHERE id = $1
          AND winner_id IS NULL
          AND status IN ('PENDING', 'ACTIVE')
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Expire every unresolved slot from contest days before `before`.
pub async fn expire_stale_slots(pool: &PgPool, before: NaiveDate) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE slots
        SET status = 'EXPIRED', ended_at = NOW()
        WHERE slot_date < $1
          AND winner_id IS NULL
          AND status IN ('PENDING', 'ACTIVE')
        "#,
    )
    .bind(before)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn bump_attempt_count(pool: &PgPool, slot_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE slots SET attempt_count = attempt_count + 1 WHERE id = $1")
        .bind(slot_id)
        .execute(pool)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Attempts
// ---------------------------------------------------------------------------

const ATTEMPT_COLUMNS: &str = "id, slot_id, user_id, attempted_at, is_winner";

/// Uniqueness on (slot_id, user_id) rejects duplicates; the violation is
/// surfaced to the caller, not swallowed.
pub async fn insert_attempt(
    pool: &PgPool,
    slot_id: Uuid,
    user_id: Uuid,
) -> Result<AttemptRow, sqlx::Error> {
    sqlx::query_as::<_, AttemptRow>(&format!(
        r#"
        INSERT INTO attempts (slot_id, user_id)
        VALUES ($1, $2)
        RETURNING {ATTEMPT_COLUMNS}
        "#
    ))
    .bind(slot_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
}

pub async fn mark_winning_attempt(
    pool: &PgPool,
    slot_id: Uuid,
    user_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE attempts SET is_winner = TRUE WHERE slot_id = $1 AND user_id = $2")
        .bind(slot_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn attempts_for_user_date(
    pool: &PgPool,
    user_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<AttemptRow>, sqlx::Error> {
    sqlx::query_as::<_, AttemptRow>(
        r#"
        SELECT a.id, a.slot_id, a.user_id, a.attempted_at, a.is_winner
        FROM attempts a
        JOIN slots s ON s.id = a.slot_id
        WHERE a.user_id = $1 AND s.slot_date = $2
        ORDER BY a.attempted_at
        "#,
    )
    .bind(user_id)
    .bind(date)
    .fetch_all(pool)
    .await
}

pub async fn attempts_for_slot(
    pool: &PgPool,
    slot_id: Uuid,
) -> Result<Vec<AttemptRow>, sqlx::Error> {
    sqlx::query_as::<_, AttemptRow>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE slot_id = $1 ORDER BY attempted_at"
    ))
    .bind(slot_id)
    .fetch_all(pool)
    .await
}

// ---------------------------------------------------------------------------
// Questions
// ---------------------------------------------------------------------------

const QUESTION_COLUMNS: &str = "id, slot_id, user_id, text, options, total_votes, is_approved, is_deleted, deletion_reason, created_at";

/// The UNIQUE constraint on slot_id is the authoritative one-question-per-slot
/// guard; a violation surfaces to the caller as the already-submitted outcome.
pub async fn insert_question(
    pool: &PgPool,
    slot_id: Uuid,
    user_id: Uuid,
    text: &str,
    options: &serde_json::Value,
) -> Result<QuestionRow, sqlx::Error> {
    sqlx::query_as::<_, QuestionRow>(&format!(
        r#"
        INSERT INTO questions (slot_id, user_id, text, options)
        VALUES ($1, $2, $3, $4)
        RETURNING {QUESTION_COLUMNS}
        "#
    ))
    .bind(slot_id)
    .bind(user_id)
    .bind(text)
    .bind(options)
    .fetch_one(pool)
    .await
}

pub async fn get_question(pool: &PgPool, id: Uuid) -> Result<Option<QuestionRow>, sqlx::Error> {
    sqlx::query_as::<_, QuestionRow>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn get_question_for_slot(
    pool: &PgPool,
    slot_id: Uuid,
) -> Result<Option<QuestionRow>, sqlx::Error> {
    sqlx::query_as::<_, QuestionRow>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE slot_id = $1"
    ))
    .bind(slot_id)
    .fetch_optional(pool)
    .await
}

pub async fn questions_for_date(
    pool: &PgPool,
    date: NaiveDate,
) -> Result<Vec<QuestionRow>, sqlx::Error> {
    sqlx::query_as::<_, QuestionRow>(
        r#"
        SELECT q.id, q.slot_id, q.user_id, q.text, q.options, q.total_votes,
               q.is_approved, q.is_deleted, q.deletion_reason, q.created_at
        FROM questions q
        JOIN slots s ON s.id = q.slot_id
        WHERE s.slot_date = $1
        ORDER BY s.slot_time
        "#,
    )
    .bind(date)
    .fetch_all(pool)
    .await
}

/// Idempotent: only flips a live question. Returns false when the question
/// was already removed.
pub async fn mark_question_removed(
    pool: &PgPool,
    question_id: Uuid,
    reason: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE questions
        SET is_deleted = TRUE, is_approved = FALSE, deletion_reason = $2
        WHERE id = $1 AND is_deleted = FALSE
        "#,
    )
    .bind(question_id)
    .bind(reason)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Display-only counter. Tallies reported to readers are always aggregated
/// from vote rows; this never becomes the source of truth.
pub async fn bump_total_votes(pool: &PgPool, question_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE questions SET total_votes = total_votes + 1 WHERE id = $1")
        .bind(question_id)
        .execute(pool)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Votes
// ---------------------------------------------------------------------------

const VOTE_COLUMNS: &str = "id, question_id, user_id, selected_option, created_at";

pub async fn insert_vote(
    pool: &PgPool,
    question_id: Uuid,
    user_id: Uuid,
    option_id: &str,
) -> Result<VoteRow, sqlx::Error> {
    sqlx::query_as::<_, VoteRow>(&format!(
        r#"
        INSERT INTO votes (question_id, user_id, selected_option)
        VALUES ($1, $2, $3)
        RETURNING {VOTE_COLUMNS}
        "#
    ))
    .bind(question_id)
    .bind(user_id)
    .bind(option_id)
    .fetch_one(pool)
    .await
}

pub async fn has_vote(
    pool: &PgPool,
    question_id: Uuid,
    user_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM votes WHERE question_id = $1 AND user_id = $2",
    )
    .bind(question_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

pub async fn votes_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<VoteRow>, sqlx::Error> {
    sqlx::query_as::<_, VoteRow>(&format!(
        "SELECT {VOTE_COLUMNS} FROM votes WHERE user_id = $1 ORDER BY created_at"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Source of truth for tallies: aggregate the vote rows.
pub async fn tally_for_question(
    pool: &PgPool,
    question_id: Uuid,
) -> Result<Vec<TallyRow>, sqlx::Error> {
    sqlx::query_as::<_, TallyRow>(
        r#"
        SELECT selected_option, COUNT(*) AS votes
        FROM votes
        WHERE question_id = $1
        GROUP BY selected_option
        "#,
    )
    .bind(question_id)
    .fetch_all(pool)
    .await
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

const HISTORY_COLUMNS: &str = "id, slot_id, kind, snapshot, archived_at";

pub async fn insert_history(
    pool: &PgPool,
    slot_id: Uuid,
    kind: &str,
    snapshot: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO history_records (slot_id, kind, snapshot) VALUES ($1, $2, $3)")
        .bind(slot_id)
        .bind(kind)
        .bind(snapshot)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn history_for_slot(
    pool: &PgPool,
    slot_id: Uuid,
) -> Result<Vec<HistoryRow>, sqlx::Error> {
    sqlx::query_as::<_, HistoryRow>(&format!(
        "SELECT {HISTORY_COLUMNS} FROM history_records WHERE slot_id = $1 ORDER BY archived_at"
    ))
    .bind(slot_id)
    .fetch_all(pool)
    .await
}

pub async fn history_for_date(
    pool: &PgPool,
    date: NaiveDate,
) -> Result<Vec<HistoryRow>, sqlx::Error> {
    sqlx::query_as::<_, HistoryRow>(
        r#"
        SELECT h.id, h.slot_id, h.kind, h.snapshot, h.archived_at
        FROM history_records h
        JOIN slots s ON s.id = h.slot_id
        WHERE s.slot_date = $1
        ORDER BY h.archived_at
        "#,
    )
    .bind(date)
    .fetch_all(pool)
    .await
}

/// Closed slots from days before `before` that have not been rolled into
/// history yet.
pub async fn unarchived_closed_slots(
    pool: &PgPool,
    before: NaiveDate,
) -> Result<Vec<SlotRow>, sqlx::Error> {
    sqlx::query_as::<_, SlotRow>(&format!(
        r#"
        SELECT {SLOT_COLUMNS}
        FROM slots
        WHERE slot_date < $1
          AND status IN ('COMPLETED', 'EXPIRED')
          AND NOT EXISTS (
              SELECT 1 FROM history_records h
              WHERE h.slot_id = slots.id AND h.kind = 'day_rollover'
          )
        ORDER BY slot_date, slot_time
        "#
    ))
    .bind(before)
    .fetch_all(pool)
    .await
}

/// Immutable snapshot of a closed slot: the slot row, its question (if any),
/// and the final aggregated tally.
pub fn snapshot_json(
    slot: &SlotRow,
    question: Option<&QuestionRow>,
    tally: &[TallyRow],
) -> serde_json::Value {
    serde_json::json!({
        "slot": {
            "id": slot.id,
            "date": slot.slot_date,
            "time": slot.slot_time.format("%H:%M").to_string(),
            "status": slot.status,
            "winner_id": slot.winner_id,
            "attempt_count": slot.attempt_count,
            "started_at": slot.started_at,
            "ended_at": slot.ended_at,
        },
        "question": question.map(|q| serde_json::json!({
            "id": q.id,
            "user_id": q.user_id,
            "text": q.text,
            "options": q.options,
            "is_approved": q.is_approved,
            "is_deleted": q.is_deleted,
            "deletion_reason": q.deletion_reason,
        })),
        "tally": tally
            .iter()
            .map(|t| serde_json::json!({ "option_id": t.selected_option, "votes": t.votes }))
            .collect::<Vec<_>>(),
    })
}

/// Audited reset: snapshot the current contest state into history, then clear
/// the slot's votes, question, and attempts and return it to a fresh PENDING
/// state, all in one transaction. Returns the fresh row, or None for an
/// unknown slot.
pub async fn admin_reset_slot(
    pool: &PgPool,
    slot_id: Uuid,
) -> Result<Option<SlotRow>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let slot = sqlx::query_as::<_, SlotRow>(&format!(
        "SELECT {SLOT_COLUMNS} FROM slots WHERE id = $1 FOR UPDATE"
    ))
    .bind(slot_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(slot) = slot else {
        return Ok(None);
    };

    let question = sqlx::query_as::<_, QuestionRow>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE slot_id = $1"
    ))
    .bind(slot_id)
    .fetch_optional(&mut *tx)
    .await?;

    let tally = match &question {
        Some(q) => {
            sqlx::query_as::<_, TallyRow>(
                r#"
                SELECT selected_option, COUNT(*) AS votes
                FROM votes
                WHERE question_id = $1
                GROUP BY selected_option
                "#,
            )
            .bind(q.id)
            .fetch_all(&mut *tx)
            .await?
        }
        None => Vec::new(),
    };

    let snapshot = snapshot_json(&slot, question.as_ref(), &tally);
    sqlx::query("INSERT INTO history_records (slot_id, kind, snapshot) VALUES ($1, $2, $3)")
        .bind(slot_id)
        .bind("admin_reset")
        .bind(&snapshot)
        .execute(&mut *tx)
        .await?;

    if let Some(q) = &question {
        sqlx::query("DELETE FROM votes WHERE question_id = $1")
            .bind(q.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(q.id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("DELETE FROM attempts WHERE slot_id = $1")
        .bind(slot_id)
        .execute(&mut *tx)
        .await?;

    let fresh = sqlx::query_as::<_, SlotRow>(&format!(
        r#"
        UPDATE slots
        SET winner_id = NULL, status = 'PENDING', attempt_count = 0,
            started_at = NULL, ended_at = NULL
        WHERE id = $1
        RETURNING {SLOT_COLUMNS}
        "#
    ))
    .bind(slot_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(fresh))
}
