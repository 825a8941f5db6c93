//! End-to-end contest flows against a live PostgreSQL. Exported
//! `DATABASE_URL` points at a disposable test database; without it every
//! test is a no-op, since there is no store to exercise.

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use sqlx::PgPool;
use tokio::sync::OnceCell;
use uuid::Uuid;
use yourturn_backend::db;
use yourturn_backend::domain::models::{RemovalReason, SlotStatus};
use yourturn_backend::domain::schedule::{self, ContestConfig};
use yourturn_backend::domain::voting::VoteCache;
use yourturn_backend::domain::{archive, contest, questions, voting};
use yourturn_backend::error::ContestError;
use yourturn_backend::services::notifier::{EventKind, RealtimeNotifier};

static POOL: OnceCell<PgPool> = OnceCell::const_new();

async fn test_pool() -> Option<&'static PgPool> {
    if std::env::var("DATABASE_URL").is_err() {
        return None;
    }
    Some(
        POOL.get_or_init(|| async {
            let url = std::env::var("DATABASE_URL").unwrap();
            let pool = PgPool::connect(&url).await.expect("connect test database");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("run migrations");
            pool
        })
        .await,
    )
}

/// A config whose single daily time opened a few seconds ago, so the window
/// is live right now. Wall-clock anchoring gives every test its own
/// (date, time) key.
fn live_config() -> (ContestConfig, NaiveDate, NaiveTime) {
    let start = Utc::now().naive_utc() - Duration::seconds(10);
    let config = ContestConfig {
        timezone: Tz::UTC,
        daily_times: vec![start.time()],
        window_secs: 3600,
    };
    (config, start.date(), start.time())
}

async fn open_slot(pool: &PgPool) -> (ContestConfig, db::SlotRow) {
    let (config, date, time) = live_config();
    let slot = schedule::ensure_slot(pool, &config, date, time)
        .await
        .expect("ensure slot");
    (config, slot)
}

async fn claim_slot(
    pool: &PgPool,
    config: &ContestConfig,
    notifier: &RealtimeNotifier,
    slot_id: Uuid,
) -> Uuid {
    let winner = Uuid::new_v4();
    let outcome = contest::attempt_join(pool, config, notifier, slot_id, winner)
        .await
        .expect("attempt");
    assert!(outcome.is_winner);
    winner
}

#[tokio::test]
async fn concurrent_attempts_yield_exactly_one_winner() {
    let Some(pool) = test_pool().await else { return };
    let (config, slot) = open_slot(pool).await;
    let notifier = RealtimeNotifier::new();

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let pool = pool.clone();
            let config = config.clone();
            let notifier = notifier.clone();
            let slot_id = slot.id;
            tokio::spawn(async move {
                contest::attempt_join(&pool, &config, &notifier, slot_id, Uuid::new_v4()).await
            })
        })
        .collect();

    let outcomes: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert!(outcomes.iter().all(|o| o.accepted));
    assert_eq!(outcomes.iter().filter(|o| o.is_winner).count(), 1);

    let slot = db::get_slot(pool, slot.id).await.unwrap().unwrap();
    assert_eq!(slot.status, SlotStatus::Completed);
    assert!(slot.winner_id.is_some());
    assert_eq!(slot.attempt_count, 5);

    let attempts = db::attempts_for_slot(pool, slot.id).await.unwrap();
    assert_eq!(attempts.len(), 5);
    assert_eq!(attempts.iter().filter(|a| a.is_winner).count(), 1);
}

#[tokio::test]
async fn raw_winner_claim_is_exclusive_under_heavy_contention() {
    let Some(pool) = test_pool().await else { return };
    let (_, slot) = open_slot(pool).await;

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let pool = pool.clone();
            let slot_id = slot.id;
            tokio::spawn(async move { db::claim_winner(&pool, slot_id, Uuid::new_v4()).await })
        })
        .collect();

    let wins = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(wins, 1);
}

#[tokio::test]
async fn concurrent_ensure_calls_produce_one_slot_row() {
    let Some(pool) = test_pool().await else { return };
    let (config, date, time) = live_config();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            let config = config.clone();
            tokio::spawn(async move { schedule::ensure_slot(&pool, &config, date, time).await })
        })
        .collect();

    let slots: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().expect("ensure never errors"))
        .collect();

    let first_id = slots[0].id;
    assert!(slots.iter().all(|s| s.id == first_id));
}

#[tokio::test]
async fn duplicate_attempt_is_rejected_without_breaking_the_slot() {
    let Some(pool) = test_pool().await else { return };
    let (config, slot) = open_slot(pool).await;
    let notifier = RealtimeNotifier::new();
    let user = Uuid::new_v4();

    let first = contest::attempt_join(pool, &config, &notifier, slot.id, user)
        .await
        .unwrap();
    assert!(first.is_winner);

    let second = contest::attempt_join(pool, &config, &notifier, slot.id, user).await;
    assert!(matches!(second, Err(ContestError::AlreadyAttempted)));

    let slot = db::get_slot(pool, slot.id).await.unwrap().unwrap();
    assert_eq!(slot.attempt_count, 1);
    assert_eq!(slot.winner_id, Some(user));
}

#[tokio::test]
async fn question_submission_rules() {
    let Some(pool) = test_pool().await else { return };
    let (config, slot) = open_slot(pool).await;
    let notifier = RealtimeNotifier::new();
    let winner = claim_slot(pool, &config, &notifier, slot.id).await;

    // Losers cannot submit.
    let stranger = Uuid::new_v4();
    let denied = questions::submit_question(
        pool,
        &notifier,
        slot.id,
        stranger,
        "Best pizza topping?",
        &["Mushroom".into(), "Pineapple".into()],
    )
    .await;
    assert!(matches!(denied, Err(ContestError::NotWinner)));

    // One option is malformed.
    let malformed = questions::submit_question(
        pool,
        &notifier,
        slot.id,
        winner,
        "Best pizza topping?",
        &["Mushroom".into()],
    )
    .await;
    assert!(matches!(malformed, Err(ContestError::Validation(_))));

    // Three options succeed.
    let question = questions::submit_question(
        pool,
        &notifier,
        slot.id,
        winner,
        "Best pizza topping?",
        &["Mushroom".into(), "Pineapple".into(), "Olives".into()],
    )
    .await
    .unwrap();
    assert_eq!(question.slot_id, slot.id);

    // A second submission hits the unique constraint.
    let again = questions::submit_question(
        pool,
        &notifier,
        slot.id,
        winner,
        "Another one?",
        &["Yes".into(), "No".into()],
    )
    .await;
    assert!(matches!(again, Err(ContestError::AlreadySubmitted)));
}

#[tokio::test]
async fn double_votes_are_rejected_and_tallies_stay_consistent() {
    let Some(pool) = test_pool().await else { return };
    let (config, slot) = open_slot(pool).await;
    let notifier = RealtimeNotifier::new();
    let cache = VoteCache::new();
    let winner = claim_slot(pool, &config, &notifier, slot.id).await;

    let question = questions::submit_question(
        pool,
        &notifier,
        slot.id,
        winner,
        "Tabs or spaces?",
        &["Tabs".into(), "Spaces".into()],
    )
    .await
    .unwrap();

    let voter = Uuid::new_v4();
    voting::vote(pool, &notifier, &cache, question.id, voter, "2")
        .await
        .unwrap();

    let second = voting::vote(pool, &notifier, &cache, question.id, voter, "1").await;
    assert!(matches!(second, Err(ContestError::DuplicateVote)));

    // Unknown option ids never reach the store.
    let bogus = voting::vote(pool, &notifier, &cache, question.id, Uuid::new_v4(), "9").await;
    assert!(matches!(bogus, Err(ContestError::Validation(_))));

    let question = db::get_question(pool, question.id).await.unwrap().unwrap();
    let tally = voting::tallies(pool, &question).await.unwrap();
    assert_eq!(tally.iter().map(|t| t.votes).sum::<i64>(), 1);
    assert_eq!(tally[1].votes, 1);
    assert!(voting::has_voted(pool, &cache, question.id, voter)
        .await
        .unwrap());
}

#[tokio::test]
async fn admin_reset_reopens_the_contest_and_leaves_an_audit_record() {
    let Some(pool) = test_pool().await else { return };
    let (config, slot) = open_slot(pool).await;
    let notifier = RealtimeNotifier::new();
    let cache = VoteCache::new();
    let winner = claim_slot(pool, &config, &notifier, slot.id).await;

    let question = questions::submit_question(
        pool,
        &notifier,
        slot.id,
        winner,
        "Cats or dogs?",
        &["Cats".into(), "Dogs".into()],
    )
    .await
    .unwrap();
    voting::vote(pool, &notifier, &cache, question.id, Uuid::new_v4(), "1")
        .await
        .unwrap();

    let admin = Uuid::new_v4();
    let fresh = archive::admin_reset_slot(pool, &notifier, slot.id, admin)
        .await
        .unwrap();
    assert_eq!(fresh.status, SlotStatus::Pending);
    assert_eq!(fresh.winner_id, None);
    assert_eq!(fresh.attempt_count, 0);
    assert!(db::get_question_for_slot(pool, slot.id)
        .await
        .unwrap()
        .is_none());

    let history = db::history_for_slot(pool, slot.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, "admin_reset");
    assert_eq!(history[0].snapshot["question"]["text"], "Cats or dogs?");
    assert_eq!(history[0].snapshot["tally"][0]["votes"], 1);

    // The same user can race again and win.
    let outcome = contest::attempt_join(pool, &config, &notifier, slot.id, winner)
        .await
        .unwrap();
    assert!(outcome.is_winner);
}

#[tokio::test]
async fn moderation_removal_flags_the_question_and_notifies_the_author() {
    let Some(pool) = test_pool().await else { return };
    let (config, slot) = open_slot(pool).await;
    let notifier = RealtimeNotifier::new();
    let winner = claim_slot(pool, &config, &notifier, slot.id).await;

    let question = questions::submit_question(
        pool,
        &notifier,
        slot.id,
        winner,
        "Crypto tips?",
        &["Buy".into(), "Sell".into()],
    )
    .await
    .unwrap();

    let mut rx = notifier.subscribe(slot.slot_date).await;
    let removed = questions::remove_question(
        pool,
        &notifier,
        slot.id,
        RemovalReason::Spam,
        Some("promotional content"),
        Uuid::new_v4(),
    )
    .await
    .unwrap();
    assert!(removed.is_deleted);
    assert_eq!(
        removed.deletion_reason.as_deref(),
        Some("spam: promotional content")
    );

    let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
        .await
        .expect("event within deadline")
        .unwrap();
    assert_eq!(event.kind, EventKind::QuestionRemoved);
    assert_eq!(event.user_id, Some(winner));
    assert!(event.reason.unwrap().contains("spam"));

    // Removed questions take no further votes.
    let cache = VoteCache::new();
    let vote = voting::vote(pool, &notifier, &cache, question.id, Uuid::new_v4(), "1").await;
    assert!(matches!(vote, Err(ContestError::QuestionNotFound)));
}

#[tokio::test]
async fn closed_window_expires_the_slot_lazily() {
    let Some(pool) = test_pool().await else { return };
    let start = Utc::now().naive_utc() - Duration::hours(2);
    let config = ContestConfig {
        timezone: Tz::UTC,
        daily_times: vec![start.time()],
        window_secs: 90,
    };
    let slot = schedule::ensure_slot(pool, &config, start.date(), start.time())
        .await
        .unwrap();
    let notifier = RealtimeNotifier::new();

    let attempt =
        contest::attempt_join(pool, &config, &notifier, slot.id, Uuid::new_v4()).await;
    assert!(matches!(attempt, Err(ContestError::SlotNotActive)));

    // The read path persisted the expiry.
    let slot = db::get_slot(pool, slot.id).await.unwrap().unwrap();
    assert_eq!(slot.status, SlotStatus::Expired);
}

#[tokio::test]
async fn attempts_before_the_window_are_rejected() {
    let Some(pool) = test_pool().await else { return };
    let start = Utc::now().naive_utc() + Duration::hours(2);
    let config = ContestConfig {
        timezone: Tz::UTC,
        daily_times: vec![start.time()],
        window_secs: 90,
    };
    let slot = schedule::ensure_slot(pool, &config, start.date(), start.time())
        .await
        .unwrap();
    let notifier = RealtimeNotifier::new();

    let attempt =
        contest::attempt_join(pool, &config, &notifier, slot.id, Uuid::new_v4()).await;
    assert!(matches!(attempt, Err(ContestError::SlotNotActive)));

    let slot = db::get_slot(pool, slot.id).await.unwrap().unwrap();
    assert_eq!(slot.status, SlotStatus::Pending);
}

#[tokio::test]
async fn day_rollover_archives_closed_slots_once() {
    let Some(pool) = test_pool().await else { return };
    // A contest day in the past, already claimed.
    let start = Utc::now().naive_utc() - Duration::days(2);
    let config = ContestConfig {
        timezone: Tz::UTC,
        daily_times: vec![start.time()],
        window_secs: 90,
    };
    let slot = schedule::ensure_slot(pool, &config, start.date(), start.time())
        .await
        .unwrap();
    let winner = Uuid::new_v4();
    assert!(db::claim_winner(pool, slot.id, winner).await.unwrap());

    let notifier = RealtimeNotifier::new();
    archive::run_day_rollover(pool, &config, &notifier)
        .await
        .unwrap();
    let history = db::history_for_slot(pool, slot.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, "day_rollover");
    assert_eq!(
        history[0].snapshot["slot"]["winner_id"],
        serde_json::json!(winner)
    );

    // Re-running is idempotent.
    archive::run_day_rollover(pool, &config, &notifier)
        .await
        .unwrap();
    assert_eq!(db::history_for_slot(pool, slot.id).await.unwrap().len(), 1);
}
