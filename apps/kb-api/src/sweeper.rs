//! Background housekeeping for the in-memory caches.

use std::time::Duration;

use time::OffsetDateTime;

use crate::state::AppState;

/// Drops expired response cache entries and idle rate limit clients on a fixed interval. Runs
/// until the task is aborted.
pub async fn run_sweeper(state: AppState) {
	let period = Duration::from_secs(state.service.cfg.cache.responses.cleanup_interval_seconds);
	let mut ticker = tokio::time::interval(period);

	ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
	// The first tick completes immediately.
	ticker.tick().await;

	loop {
		ticker.tick().await;

		sweep_once(&state, OffsetDateTime::now_utc());
	}
}

pub fn sweep_once(state: &AppState, now: OffsetDateTime) -> (usize, usize) {
	let expired = state.service.responses.clear_expired_at(now);
	let idle = state.rate_limiter.evict_idle(now);

	if expired > 0 || idle > 0 {
		tracing::debug!(expired, idle, "Cache sweep completed.");
	}

	(expired, idle)
}
