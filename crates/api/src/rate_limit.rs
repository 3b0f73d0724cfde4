//! Per-caller request limits.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use common::UserId;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::ApiError;
use crate::extract::caller_id;

/// Token bucket per user id.
pub type CallerLimiter = DefaultKeyedRateLimiter<UserId>;

/// Creates a limiter allowing `per_minute` requests per caller, at least one.
pub fn caller_limiter(per_minute: u32) -> CallerLimiter {
    let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
    RateLimiter::keyed(Quota::per_minute(per_minute))
}

/// How often idle callers are dropped from the limiter.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Drops callers whose bucket has refilled completely, so ids seen once
/// do not stay in memory. Returns how many callers remain tracked.
pub fn prune_idle(limiter: &CallerLimiter) -> usize {
    limiter.retain_recent();
    limiter.shrink_to_fit();
    limiter.len()
}

/// Spawns a task pruning `limiter` every `every` until aborted.
pub fn spawn_limiter_pruner(limiter: Arc<CallerLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick is immediate; nothing to prune yet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let tracked = prune_idle(&limiter);
            tracing::debug!(tracked, "pruned idle rate limit entries");
        }
    })
}

/// Rejects requests from callers over their quota with 429.
///
/// Requests without a usable caller id pass through; the handlers reject
/// them anyway.
pub async fn limit_by_caller(
    State(limiter): State<Arc<CallerLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Ok(caller) = caller_id(request.headers())
        && limiter.check_key(&caller).is_err()
    {
        metrics::counter!("api_rate_limited_total").increment(1);
        tracing::debug!(%caller, "rate limited");
        return Err(ApiError::TooManyRequests);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_is_per_caller() {
        let limiter = caller_limiter(2);
        let alice = UserId::new();
        let bob = UserId::new();

        assert!(limiter.check_key(&alice).is_ok());
        assert!(limiter.check_key(&alice).is_ok());
        assert!(limiter.check_key(&alice).is_err());
        assert!(limiter.check_key(&bob).is_ok());
    }

    #[test]
    fn test_prune_drops_refilled_callers() {
        let quota = Quota::with_period(Duration::from_millis(1)).unwrap();
        let limiter: CallerLimiter = RateLimiter::keyed(quota);
        for _ in 0..3 {
            assert!(limiter.check_key(&UserId::new()).is_ok());
        }
        assert_eq!(limiter.len(), 3);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(prune_idle(&limiter), 0);
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_prune_keeps_callers_still_limited() {
        let limiter = caller_limiter(1);
        let caller = UserId::new();
        assert!(limiter.check_key(&caller).is_ok());

        assert_eq!(prune_idle(&limiter), 1);
        assert!(limiter.check_key(&caller).is_err());
    }

    #[test]
    fn test_zero_quota_still_admits_one() {
        let limiter = caller_limiter(0);
        assert!(limiter.check_key(&UserId::new()).is_ok());
    }
}
