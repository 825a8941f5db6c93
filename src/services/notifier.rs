use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SlotActivated,
    SlotCompleted,
    SlotExpired,
    SlotReset,
    QuestionPublished,
    QuestionRemoved,
    VoteRecorded,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SlotActivated => "slot_activated",
            EventKind::SlotCompleted => "slot_completed",
            EventKind::SlotExpired => "slot_expired",
            EventKind::SlotReset => "slot_reset",
            EventKind::QuestionPublished => "question_published",
            EventKind::QuestionRemoved => "question_removed",
            EventKind::VoteRecorded => "vote_recorded",
        }
    }
}

/// A state-change notification. Payloads are hints: subscribers re-fetch
/// authoritative state on receipt rather than trusting these fields as final
/// truth, which is what makes duplicate and out-of-order delivery harmless.
#[derive(Clone, Debug, Serialize)]
pub struct ContestEvent {
    pub kind: EventKind,
    pub date: NaiveDate,
    pub slot_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_id: Option<Uuid>,
    /// Winner, question author, or voter depending on `kind`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

impl ContestEvent {
    pub fn slot(kind: EventKind, date: NaiveDate, slot_id: Uuid) -> Self {
        Self {
            kind,
            date,
            slot_id,
            question_id: None,
            user_id: None,
            reason: None,
            at: Utc::now(),
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_question(mut self, question_id: Uuid) -> Self {
        self.question_id = Some(question_id);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

const CHANNEL_CAPACITY: usize = 256;

/// Fan-out of contest events on one broadcast channel per contest date.
/// Publishing is fire-and-forget; delivery is at-least-once and ordered only
/// within a channel. Correctness never depends on delivery; a missed event
/// is recovered by re-querying current state.
#[derive(Clone)]
pub struct RealtimeNotifier {
    channels: Arc<RwLock<HashMap<NaiveDate, broadcast::Sender<ContestEvent>>>>,
}

impl RealtimeNotifier {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn sender(&self, date: NaiveDate) -> broadcast::Sender<ContestEvent> {
        if let Some(sender) = self.channels.read().await.get(&date) {
            return sender.clone();
        }
        let mut channels = self.channels.write().await;
        channels
            .entry(date)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    pub async fn subscribe(&self, date: NaiveDate) -> broadcast::Receiver<ContestEvent> {
        self.sender(date).await.subscribe()
    }

    pub async fn publish(&self, event: ContestEvent) {
        let sender = self.sender(event.date).await;
        // A send with zero receivers is a normal outcome.
        let _ = sender.send(event);
    }

    /// Drop channels for dates that rolled into history.
    pub async fn prune_before(&self, date: NaiveDate) {
        let mut channels = self.channels.write().await;
        channels.retain(|channel_date, _| *channel_date >= date);
    }
}

impl Default for RealtimeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
