use crate::db::{self, QuestionRow, TallyRow};
use crate::domain::models::QuestionOption;
use crate::error::ContestError;
use crate::services::notifier::{ContestEvent, EventKind, RealtimeNotifier};
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Per-option count, zero-filled for options nobody picked yet. Always built
/// by aggregating vote rows; `questions.total_votes` is display-only.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct OptionTally {
    pub option_id: String,
    pub label: String,
    pub votes: i64,
}

/// Local read-through cache over "has this user voted on this question".
/// Advisory UX only; the UNIQUE constraint on (question_id, user_id) is the
/// system of record. Every local vote write refreshes the entry.
#[derive(Clone, Default)]
pub struct VoteCache {
    inner: Arc<RwLock<HashMap<(Uuid, Uuid), bool>>>,
}

impl VoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, question_id: Uuid, user_id: Uuid) -> Option<bool> {
        self.inner.read().await.get(&(question_id, user_id)).copied()
    }

    pub async fn set(&self, question_id: Uuid, user_id: Uuid, voted: bool) {
        self.inner.write().await.insert((question_id, user_id), voted);
    }

    pub async fn invalidate(&self, question_id: Uuid, user_id: Uuid) {
        self.inner.write().await.remove(&(question_id, user_id));
    }
}

pub fn parse_options(question: &QuestionRow) -> Result<Vec<QuestionOption>, ContestError> {
    serde_json::from_value(question.options.clone())
        .map_err(|e| ContestError::Validation(format!("malformed options: {e}")))
}

/// Record one immutable vote. Votes have no update or retract path. The
/// duplicate outcome comes from the storage constraint and is reported to
/// the caller, never swallowed.
pub async fn vote(
    pool: &PgPool,
    notifier: &RealtimeNotifier,
    cache: &VoteCache,
    question_id: Uuid,
    user_id: Uuid,
    option_id: &str,
) -> Result<(), ContestError> {
    let question = db::get_question(pool, question_id)
        .await?
        .ok_or(ContestError::QuestionNotFound)?;
    if question.is_deleted {
        return Err(ContestError::QuestionNotFound);
    }

    let options = parse_options(&question)?;
    if !options.iter().any(|option| option.id == option_id) {
        return Err(ContestError::Validation(format!(
            "option {option_id:?} is not on this question"
        )));
    }

    if let Err(e) = db::insert_vote(pool, question_id, user_id, option_id).await {
        if db::is_unique_violation(&e) {
            // The store just told us the truth; keep the cache warm with it.
            cache.set(question_id, user_id, true).await;
            return Err(ContestError::DuplicateVote);
        }
        return Err(e.into());
    }

    db::bump_total_votes(pool, question_id).await?;
    cache.set(question_id, user_id, true).await;

    let slot = db::get_slot(pool, question.slot_id)
        .await?
        .ok_or(ContestError::SlotNotFound)?;
    notifier
        .publish(
            ContestEvent::slot(EventKind::VoteRecorded, slot.slot_date, slot.id)
                .with_question(question_id)
                .with_user(user_id),
        )
        .await;

    Ok(())
}

/// Read-through membership check.
pub async fn has_voted(
    pool: &PgPool,
    cache: &VoteCache,
    question_id: Uuid,
    user_id: Uuid,
) -> Result<bool, ContestError> {
    if let Some(cached) = cache.get(question_id, user_id).await {
        return Ok(cached);
    }
    let voted = db::has_vote(pool, question_id, user_id).await?;
    cache.set(question_id, user_id, voted).await;
    Ok(voted)
}

/// Live tallies for a question, zero-filled in option order.
pub async fn tallies(
    pool: &PgPool,
    question: &QuestionRow,
) -> Result<Vec<OptionTally>, ContestError> {
    let options = parse_options(question)?;
    let rows = db::tally_for_question(pool, question.id).await?;
    Ok(zero_filled_tally(&options, &rows))
}

pub fn zero_filled_tally(options: &[QuestionOption], rows: &[TallyRow]) -> Vec<OptionTally> {
    let counts: HashMap<&str, i64> = rows
        .iter()
        .map(|row| (row.selected_option.as_str(), row.votes))
        .collect();
    options
        .iter()
        .map(|option| OptionTally {
            option_id: option.id.clone(),
            label: option.label.clone(),
            votes: counts.get(option.id.as_str()).copied().unwrap_or(0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<QuestionOption> {
        vec![
            QuestionOption {
                id: "1".into(),
                label: "Yes".into(),
            },
            QuestionOption {
                id: "2".into(),
                label: "No".into(),
            },
            QuestionOption {
                id: "3".into(),
                label: "Maybe".into(),
            },
        ]
    }

    #[test]
    fn tally_zero_fills_unpicked_options() {
        let rows = vec![
            TallyRow {
                selected_option: "1".into(),
                votes: 4,
            },
            TallyRow {
                selected_option: "3".into(),
                votes: 1,
            },
        ];
        let tally = zero_filled_tally(&options(), &rows);
        assert_eq!(tally.len(), 3);
        assert_eq!(tally[0].votes, 4);
        assert_eq!(tally[1].votes, 0);
        assert_eq!(tally[2].votes, 1);
        // Option order is preserved for display.
        assert_eq!(tally[1].label, "No");
    }

    #[test]
    fn tally_ignores_rows_for_unknown_options() {
        let rows = vec![TallyRow {
            selected_option: "9".into(),
            votes: 7,
        }];
        let tally = zero_filled_tally(&options(), &rows);
        assert!(tally.iter().all(|t| t.votes == 0));
    }

    #[tokio::test]
    async fn cache_is_read_through_and_invalidatable() {
        let cache = VoteCache::new();
        let question = Uuid::new_v4();
        let user = Uuid::new_v4();

        assert_eq!(cache.get(question, user).await, None);

        cache.set(question, user, true).await;
        assert_eq!(cache.get(question, user).await, Some(true));

        cache.invalidate(question, user).await;
        assert_eq!(cache.get(question, user).await, None);

        // Entries are keyed per (question, user).
        cache.set(question, user, false).await;
        assert_eq!(cache.get(question, Uuid::new_v4()).await, None);
    }
}
