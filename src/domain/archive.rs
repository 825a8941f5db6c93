use crate::db::{self, SlotRow};
use crate::domain::schedule::ContestConfig;
use crate::error::ContestError;
use crate::services::notifier::{ContestEvent, EventKind, RealtimeNotifier};
use sqlx::PgPool;
use uuid::Uuid;

/// Day rollover: expire anything unresolved from prior contest days, then
/// copy every closed slot that is not in history yet, with its question and
/// final tally, into the append-only record. Runs from the scheduler shortly
/// after midnight, and is safe to re-run: archived slots are skipped.
pub async fn run_day_rollover(
    pool: &PgPool,
    config: &ContestConfig,
    notifier: &RealtimeNotifier,
) -> anyhow::Result<usize> {
    let today = config.local_today();

    let expired = db::expire_stale_slots(pool, today).await?;
    if expired > 0 {
        tracing::info!("expired {} unresolved slots from prior days", expired);
    }

    let slots = db::unarchived_closed_slots(pool, today).await?;
    let mut archived = 0;
    for slot in &slots {
        let question = db::get_question_for_slot(pool, slot.id).await?;
        let tally = match &question {
            Some(q) => db::tally_for_question(pool, q.id).await?,
            None => Vec::new(),
        };
        let snapshot = db::snapshot_json(slot, question.as_ref(), &tally);
        db::insert_history(pool, slot.id, "day_rollover", &snapshot).await?;
        archived += 1;
    }

    if archived > 0 {
        tracing::info!("archived {} closed slots into history", archived);
    }
    notifier.prune_before(today).await;
    Ok(archived)
}

/// Audited reset of a single slot back to a fresh contest. The transaction in
/// the storage layer snapshots the current state into history (the audit
/// record) before clearing votes, question, attempts, and the winner fields.
/// Distinct from day rollover, which never reopens slots.
pub async fn admin_reset_slot(
    pool: &PgPool,
    notifier: &RealtimeNotifier,
    slot_id: Uuid,
    actor_id: Uuid,
) -> Result<SlotRow, ContestError> {
    let fresh = db::admin_reset_slot(pool, slot_id)
        .await?
        .ok_or(ContestError::SlotNotFound)?;

    tracing::warn!(
        slot_id = %slot_id,
        actor = %actor_id,
        "slot reset by admin"
    );
    notifier
        .publish(
            ContestEvent::slot(EventKind::SlotReset, fresh.slot_date, fresh.id)
                .with_user(actor_id),
        )
        .await;

    Ok(fresh)
}
