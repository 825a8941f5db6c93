use crate::db::{self, QuestionRow};
use crate::domain::models::{QuestionOption, RemovalReason, SlotStatus};
use crate::error::ContestError;
use crate::services::notifier::{ContestEvent, EventKind, RealtimeNotifier};
use sqlx::PgPool;
use uuid::Uuid;

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 4;
pub const MAX_TEXT_LEN: usize = 500;
pub const MAX_OPTION_LEN: usize = 80;

pub fn validate_submission(text: &str, labels: &[String]) -> Result<(), ContestError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ContestError::Validation("question text is empty".into()));
    }
    if text.len() > MAX_TEXT_LEN {
        return Err(ContestError::Validation(format!(
            "question text exceeds {MAX_TEXT_LEN} characters"
        )));
    }
    if labels.len() < MIN_OPTIONS || labels.len() > MAX_OPTIONS {
        return Err(ContestError::Validation(format!(
            "questions take {MIN_OPTIONS} to {MAX_OPTIONS} options, got {}",
            labels.len()
        )));
    }
    for label in labels {
        let label = label.trim();
        if label.is_empty() {
            return Err(ContestError::Validation("option label is empty".into()));
        }
        if label.len() > MAX_OPTION_LEN {
            return Err(ContestError::Validation(format!(
                "option label exceeds {MAX_OPTION_LEN} characters"
            )));
        }
    }
    Ok(())
}

/// Option ids are ordinal strings; voters send them back verbatim.
pub fn build_options(labels: &[String]) -> Vec<QuestionOption> {
    labels
        .iter()
        .enumerate()
        .map(|(idx, label)| QuestionOption {
            id: (idx + 1).to_string(),
            label: label.trim().to_string(),
        })
        .collect()
}

/// Publish the winner's question. The winner/status checks are advisory UX;
/// the UNIQUE constraint on slot_id is the authoritative one-question guard,
/// so a lost race still surfaces as AlreadySubmitted with no side effects.
pub async fn submit_question(
    pool: &PgPool,
    notifier: &RealtimeNotifier,
    slot_id: Uuid,
    user_id: Uuid,
    text: &str,
    labels: &[String],
) -> Result<QuestionRow, ContestError> {
    validate_submission(text, labels)?;

    let slot = db::get_slot(pool, slot_id)
        .await?
        .ok_or(ContestError::SlotNotFound)?;
    match slot.winner_id {
        Some(winner) if winner == user_id => {}
        _ => return Err(ContestError::NotWinner),
    }
    if slot.status != SlotStatus::Completed {
        return Err(ContestError::SlotNotActive);
    }

    let options = serde_json::to_value(build_options(labels))
        .map_err(|e| ContestError::Validation(e.to_string()))?;

    let question = match db::insert_question(pool, slot.id, user_id, text.trim(), &options).await
    {
        Ok(question) => question,
        Err(e) if db::is_unique_violation(&e) => return Err(ContestError::AlreadySubmitted),
        Err(e) => return Err(e.into()),
    };

    notifier
        .publish(
            ContestEvent::slot(EventKind::QuestionPublished, slot.slot_date, slot.id)
                .with_question(question.id)
                .with_user(user_id),
        )
        .await;

    Ok(question)
}

/// Moderation removal. Marks the question deleted with the composed reason
/// and notifies its author through the date channel; repeated removal of the
/// same question is a no-op.
pub async fn remove_question(
    pool: &PgPool,
    notifier: &RealtimeNotifier,
    slot_id: Uuid,
    reason: RemovalReason,
    free_text: Option<&str>,
    actor_id: Uuid,
) -> Result<QuestionRow, ContestError> {
    let question = db::get_question_for_slot(pool, slot_id)
        .await?
        .ok_or(ContestError::QuestionNotFound)?;

    let reason_text = compose_reason(reason, free_text);
    let removed_now = db::mark_question_removed(pool, question.id, &reason_text).await?;
    if !removed_now {
        tracing::debug!(question_id = %question.id, "question already removed");
        return db::get_question(pool, question.id)
            .await?
            .ok_or(ContestError::QuestionNotFound);
    }

    tracing::warn!(
        question_id = %question.id,
        slot_id = %slot_id,
        actor = %actor_id,
        reason = %reason_text,
        "question removed by moderator"
    );
    notifier
        .publish(
            ContestEvent::slot(EventKind::QuestionRemoved, question_date(pool, &question).await?, question.slot_id)
                .with_question(question.id)
                .with_user(question.user_id)
                .with_reason(reason_text),
        )
        .await;

    db::get_question(pool, question.id)
        .await?
        .ok_or(ContestError::QuestionNotFound)
}

async fn question_date(
    pool: &PgPool,
    question: &QuestionRow,
) -> Result<chrono::NaiveDate, ContestError> {
    let slot = db::get_slot(pool, question.slot_id)
        .await?
        .ok_or(ContestError::SlotNotFound)?;
    Ok(slot.slot_date)
}

pub fn compose_reason(reason: RemovalReason, free_text: Option<&str>) -> String {
    match free_text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => format!("{}: {}", reason.as_str(), text),
        None => reason.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("option {i}")).collect()
    }

    #[test]
    fn accepts_two_to_four_options() {
        assert!(validate_submission("Best sci-fi film?", &labels(2)).is_ok());
        assert!(validate_submission("Best sci-fi film?", &labels(4)).is_ok());
    }

    #[test]
    fn rejects_bad_option_counts() {
        assert!(matches!(
            validate_submission("q?", &labels(1)),
            Err(ContestError::Validation(_))
        ));
        assert!(matches!(
            validate_submission("q?", &labels(5)),
            Err(ContestError::Validation(_))
        ));
    }

    #[test]
    fn rejects_empty_text_and_labels() {
        assert!(validate_submission("  ", &labels(2)).is_err());

        let mut with_blank = labels(2);
        with_blank[1] = "   ".into();
        assert!(validate_submission("q?", &with_blank).is_err());
    }

    #[test]
    fn rejects_oversized_fields() {
        assert!(validate_submission(&"x".repeat(MAX_TEXT_LEN + 1), &labels(2)).is_err());

        let mut oversized = labels(2);
        oversized[0] = "y".repeat(MAX_OPTION_LEN + 1);
        assert!(validate_submission("q?", &oversized).is_err());
    }

    #[test]
    fn options_get_ordinal_ids() {
        let options = build_options(&vec!["  Alien ".to_string(), "Blade Runner".to_string()]);
        assert_eq!(options[0].id, "1");
        assert_eq!(options[0].label, "Alien");
        assert_eq!(options[1].id, "2");
        assert_eq!(options[1].label, "Blade Runner");
    }

    #[test]
    fn reasons_compose_with_free_text() {
        assert_eq!(compose_reason(RemovalReason::Spam, None), "spam");
        assert_eq!(
            compose_reason(RemovalReason::Other, Some(" off topic ")),
            "other: off topic"
        );
        assert_eq!(compose_reason(RemovalReason::Personal, Some("  ")), "personal");
    }
}
