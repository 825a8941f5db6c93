use serde::{Deserialize, Serialize};

/// Slot lifecycle. Stored as the `slot_status` Postgres enum; the only
/// transitions are PENDING -> ACTIVE -> COMPLETED, PENDING/ACTIVE -> EXPIRED,
/// and the audited admin reset back to PENDING.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "slot_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SlotStatus {
    Pending,
    Active,
    Completed,
    Expired,
}

impl SlotStatus {
    /// COMPLETED and EXPIRED slots never transition again except via admin reset.
    pub fn is_closed(&self) -> bool {
        matches!(self, SlotStatus::Completed | SlotStatus::Expired)
    }
}

/// One answer choice on a published question. Ids are ordinal strings
/// assigned at submission time; voters reference them verbatim.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionOption {
    pub id: String,
    pub label: String,
}

/// Result of an attempt call. Losing the winner race is a normal outcome,
/// not an error: `accepted` records the attempt, `is_winner` the claim.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct JoinOutcome {
    pub accepted: bool,
    pub is_winner: bool,
}

/// Moderation reason codes for question removal.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    NonEntertainment,
    Personal,
    Spam,
    Inappropriate,
    Duplicate,
    Other,
}

impl RemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalReason::NonEntertainment => "non_entertainment",
            RemovalReason::Personal => "personal",
            RemovalReason::Spam => "spam",
            RemovalReason::Inappropriate => "inappropriate",
            RemovalReason::Duplicate => "duplicate",
            RemovalReason::Other => "other",
        }
    }
}

impl TryFrom<&str> for RemovalReason {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "non_entertainment" => Ok(RemovalReason::NonEntertainment),
            "personal" => Ok(RemovalReason::Personal),
            "spam" => Ok(RemovalReason::Spam),
            "inappropriate" => Ok(RemovalReason::Inappropriate),
            "duplicate" => Ok(RemovalReason::Duplicate),
            "other" => Ok(RemovalReason::Other),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_reason_round_trips() {
        for raw in [
            "non_entertainment",
            "personal",
            "spam",
            "inappropriate",
            "duplicate",
            "other",
        ] {
            let reason = RemovalReason::try_from(raw).unwrap();
            assert_eq!(reason.as_str(), raw);
        }
        assert!(RemovalReason::try_from("rude").is_err());
        assert_eq!(
            RemovalReason::try_from(" SPAM "),
            Ok(RemovalReason::Spam)
        );
    }

    #[test]
    fn closed_statuses() {
        assert!(SlotStatus::Completed.is_closed());
        assert!(SlotStatus::Expired.is_closed());
        assert!(!SlotStatus::Pending.is_closed());
        assert!(!SlotStatus::Active.is_closed());
    }
}
