use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Contest outcome taxonomy. Every failure a caller can act on gets its own
/// variant; `Store` is the transient retry-safe case. Losing the winner race
/// is NOT represented here, it is a normal `JoinOutcome`.
#[derive(Debug, Error)]
pub enum ContestError {
    #[error("{0}")]
    Validation(String),
    #[error("user already attempted this slot")]
    AlreadyAttempted,
    #[error("slot is not open for attempts")]
    SlotNotActive,
    #[error("only the slot winner may submit a question")]
    NotWinner,
    #[error("a question was already submitted for this slot")]
    AlreadySubmitted,
    #[error("user already voted on this question")]
    DuplicateVote,
    #[error("slot not found")]
    SlotNotFound,
    #[error("question not found")]
    QuestionNotFound,
    #[error("too many attempts, retry shortly")]
    Throttled,
    #[error("storage unavailable")]
    Store(#[from] sqlx::Error),
}

impl ContestError {
    pub fn code(&self) -> &'static str {
        match self {
            ContestError::Validation(_) => "validation",
            ContestError::AlreadyAttempted => "already_attempted",
            ContestError::SlotNotActive => "slot_not_active",
            ContestError::NotWinner => "not_winner",
            ContestError::AlreadySubmitted => "already_submitted",
            ContestError::DuplicateVote => "duplicate_vote",
            ContestError::SlotNotFound => "slot_not_found",
            ContestError::QuestionNotFound => "question_not_found",
            ContestError::Throttled => "throttled",
            ContestError::Store(_) => "store_unavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ContestError::Validation(_) => StatusCode::BAD_REQUEST,
            ContestError::AlreadyAttempted
            | ContestError::AlreadySubmitted
            | ContestError::DuplicateVote => StatusCode::CONFLICT,
            ContestError::SlotNotActive => StatusCode::UNPROCESSABLE_ENTITY,
            ContestError::NotWinner => StatusCode::FORBIDDEN,
            ContestError::SlotNotFound | ContestError::QuestionNotFound => StatusCode::NOT_FOUND,
            ContestError::Throttled => StatusCode::TOO_MANY_REQUESTS,
            ContestError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ContestError {
    fn into_response(self) -> Response {
        if let ContestError::Store(e) = &self {
            tracing::error!("storage error: {}", e);
        }
        let body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        (self.status(), Json(body)).into_response()
    }
}
