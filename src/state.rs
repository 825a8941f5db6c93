use crate::domain::schedule::ContestConfig;
use crate::domain::voting::VoteCache;
use crate::middleware::rate_limit::AttemptThrottle;
use crate::services::notifier::RealtimeNotifier;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: ContestConfig,
    pub notifier: RealtimeNotifier,
    pub throttle: AttemptThrottle,
    pub vote_cache: VoteCache,
}

pub type SharedState = Arc<AppState>;
