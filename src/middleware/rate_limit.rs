use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Per-user sliding-window throttle for attempt traffic. Advisory abuse
/// control only: winner adjudication and attempt uniqueness rest entirely on
/// the storage constraints, so rejecting here is always safe.
#[derive(Clone)]
pub struct AttemptThrottle {
    calls: Arc<RwLock<HashMap<Uuid, VecDeque<Instant>>>>,
    max_calls: usize,
    window: Duration,
}

impl AttemptThrottle {
    pub fn new(max_calls: usize, window_secs: u64) -> Self {
        Self {
            calls: Arc::new(RwLock::new(HashMap::new())),
            max_calls,
            window: Duration::from_secs(window_secs),
        }
    }

    pub async fn check(&self, user_id: Uuid) -> bool {
        let now = Instant::now();
        let mut calls = self.calls.write().await;
        let history = calls.entry(user_id).or_insert_with(VecDeque::new);

        while let Some(front) = history.front() {
            if now.duration_since(*front) < self.window {
                break;
            }
            history.pop_front();
        }

        if history.len() < self.max_calls {
            history.push_back(now);
            true
        } else {
            false
        }
    }

    /// Drop users with no calls inside the window. Run periodically.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut calls = self.calls.write().await;
        calls.retain(|_, history| {
            while let Some(front) = history.front() {
                if now.duration_since(*front) < self.window {
                    break;
                }
                history.pop_front();
            }
            !history.is_empty()
        });
        tracing::debug!("attempt throttle cleanup: {} active users", calls.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocks_after_limit_within_window() {
        let throttle = AttemptThrottle::new(3, 60);
        let user = Uuid::new_v4();

        assert!(throttle.check(user).await);
        assert!(throttle.check(user).await);
        assert!(throttle.check(user).await);
        assert!(!throttle.check(user).await);

        // Other users are unaffected.
        assert!(throttle.check(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn window_expiry_frees_the_user() {
        let throttle = AttemptThrottle::new(1, 1);
        let user = Uuid::new_v4();

        assert!(throttle.check(user).await);
        assert!(!throttle.check(user).await);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(throttle.check(user).await);
    }

    #[tokio::test]
    async fn cleanup_drops_idle_users() {
        let throttle = AttemptThrottle::new(5, 1);
        throttle.check(Uuid::new_v4()).await;
        throttle.check(Uuid::new_v4()).await;

        tokio::time::sleep(Duration::from_millis(1100)).await;
        throttle.cleanup().await;
        assert!(throttle.calls.read().await.is_empty());
    }
}
