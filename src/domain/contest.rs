use crate::db;
use crate::domain::models::{JoinOutcome, SlotStatus};
use crate::domain::schedule::{self, ContestConfig};
use crate::error::ContestError;
use crate::services::notifier::{ContestEvent, EventKind, RealtimeNotifier};
use sqlx::PgPool;
use uuid::Uuid;

/// Record an attempt and race for the winner slot.
///
/// The sequence is: uniqueness-guarded attempt insert, attempt-count bump,
/// then ONE conditional update that assigns the winner only while
/// `winner_id` is still null. No read of `winner_id` precedes that update as
/// an adjudication step; the store's write serialization is the tie-break.
/// A claim that affects zero rows means someone else won, which is a normal
/// outcome, not an error.
pub async fn attempt_join(
    pool: &PgPool,
    config: &ContestConfig,
    notifier: &RealtimeNotifier,
    slot_id: Uuid,
    user_id: Uuid,
) -> Result<JoinOutcome, ContestError> {
    let slot = db::get_slot(pool, slot_id)
        .await?
        .ok_or(ContestError::SlotNotFound)?;

    let now = config.local_now();
    let (slot, expired_now) = schedule::reconcile_slot(pool, config, slot, now).await?;
    if expired_now {
        notifier
            .publish(ContestEvent::slot(
                EventKind::SlotExpired,
                slot.slot_date,
                slot.id,
            ))
            .await;
    }

    if slot.status.is_closed()
        || !config.is_within_window(now, slot.slot_date, slot.slot_time)
    {
        return Err(ContestError::SlotNotActive);
    }

    if slot.status == SlotStatus::Pending && db::mark_slot_active(pool, slot.id).await? {
        notifier
            .publish(ContestEvent::slot(
                EventKind::SlotActivated,
                slot.slot_date,
                slot.id,
            ))
            .await;
    }

    if let Err(e) = db::insert_attempt(pool, slot.id, user_id).await {
        if db::is_unique_violation(&e) {
            return Err(ContestError::AlreadyAttempted);
        }
        return Err(e.into());
    }
    db::bump_attempt_count(pool, slot.id).await?;

    let won = db::claim_winner(pool, slot.id, user_id).await?;
    if won {
        db::mark_winning_attempt(pool, slot.id, user_id).await?;
        tracing::info!(
            slot_id = %slot.id,
            winner = %user_id,
            "slot claimed"
        );
        notifier
            .publish(
                ContestEvent::slot(EventKind::SlotCompleted, slot.slot_date, slot.id)
                    .with_user(user_id),
            )
            .await;
    }

    Ok(JoinOutcome {
        accepted: true,
        is_winner: won,
    })
}
