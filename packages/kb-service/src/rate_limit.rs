//! Per-client sliding-window admission control.
//!
//! Each client keeps the timestamps of its admitted requests in two windows, one minute and one
//! hour. A request is admitted only while both windows are below their limits, and admission
//! records the request in both windows inside the same critical section as the check.

use std::{
	collections::{HashMap, VecDeque},
	sync::Mutex,
};

use serde::Serialize;
use time::{Duration, OffsetDateTime};

/// Seconds a denied client is told to wait, whichever window denied it.
pub const RETRY_AFTER_SECONDS: u64 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateWindow {
	Minute,
	Hour,
}
impl RateWindow {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Minute => "minute",
			Self::Hour => "hour",
		}
	}

	pub fn length(self) -> Duration {
		match self {
			Self::Minute => Duration::MINUTE,
			Self::Hour => Duration::HOUR,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitPolicy {
	pub per_minute: u32,
	pub per_hour: u32,
	pub max_tracked_clients: Option<usize>,
}
impl From<&kb_config::RateLimit> for RateLimitPolicy {
	fn from(cfg: &kb_config::RateLimit) -> Self {
		Self {
			per_minute: cfg.per_minute,
			per_hour: cfg.per_hour,
			max_tracked_clients: cfg.max_tracked_clients,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateDecision {
	pub allowed: bool,
	/// The window that denied the request, if any.
	pub window: Option<RateWindow>,
	pub limit: u32,
	pub remaining_minute: u32,
	/// Unix seconds at which the minute window is advertised to reset.
	pub reset_epoch: i64,
	pub retry_after_seconds: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RateLimitStats {
	pub tracked_clients: usize,
	pub per_minute: u32,
	pub per_hour: u32,
	pub max_tracked_clients: Option<usize>,
}

#[derive(Debug)]
struct ClientWindows {
	minute: VecDeque<OffsetDateTime>,
	hour: VecDeque<OffsetDateTime>,
	last_seen: OffsetDateTime,
}
impl ClientWindows {
	fn new(now: OffsetDateTime) -> Self {
		Self { minute: VecDeque::new(), hour: VecDeque::new(), last_seen: now }
	}

	fn prune(&mut self, now: OffsetDateTime) {
		prune_window(&mut self.minute, now - RateWindow::Minute.length());
		prune_window(&mut self.hour, now - RateWindow::Hour.length());
	}

	fn denying_window(&self, policy: &RateLimitPolicy) -> Option<RateWindow> {
		if self.minute.len() >= policy.per_minute as usize {
			Some(RateWindow::Minute)
		} else if self.hour.len() >= policy.per_hour as usize {
			Some(RateWindow::Hour)
		} else {
			None
		}
	}

	fn record(&mut self, now: OffsetDateTime) {
		self.minute.push_back(now);
		self.hour.push_back(now);
		self.last_seen = now;
	}
}

pub struct RateLimiter {
	policy: RateLimitPolicy,
	clients: Mutex<HashMap<String, ClientWindows>>,
}
impl RateLimiter {
	pub fn new(policy: RateLimitPolicy) -> Self {
		Self { policy, clients: Mutex::new(HashMap::new()) }
	}

	pub fn policy(&self) -> &RateLimitPolicy {
		&self.policy
	}

	/// Checks and, when allowed, records the request in one step.
	pub fn admit(&self, client_key: &str, now: OffsetDateTime) -> RateDecision {
		let mut clients = self.clients.lock().unwrap_or_else(|err| err.into_inner());

		if !clients.contains_key(client_key) {
			self.make_room(&mut clients, now);
		}

		let windows =
			clients.entry(client_key.to_string()).or_insert_with(|| ClientWindows::new(now));

		windows.prune(now);

		let denied = windows.denying_window(&self.policy);

		if denied.is_none() {
			windows.record(now);
		} else {
			windows.last_seen = now;
		}

		self.decision(windows, denied, now)
	}

	/// Checks without recording. Read-only apart from pruning timestamps that fell out of the
	/// windows.
	pub fn check(&self, client_key: &str, now: OffsetDateTime) -> RateDecision {
		let mut clients = self.clients.lock().unwrap_or_else(|err| err.into_inner());

		match clients.get_mut(client_key) {
			Some(windows) => {
				windows.prune(now);

				let denied = windows.denying_window(&self.policy);

				self.decision(windows, denied, now)
			},
			None => self.decision(&ClientWindows::new(now), None, now),
		}
	}

	/// Appends `now` to both windows unconditionally.
	pub fn record(&self, client_key: &str, now: OffsetDateTime) {
		let mut clients = self.clients.lock().unwrap_or_else(|err| err.into_inner());

		if !clients.contains_key(client_key) {
			self.make_room(&mut clients, now);
		}

		let windows =
			clients.entry(client_key.to_string()).or_insert_with(|| ClientWindows::new(now));

		windows.prune(now);
		windows.record(now);
	}

	/// Forgets clients with no requests left in their hour window. Returns how many were removed.
	pub fn evict_idle(&self, now: OffsetDateTime) -> usize {
		let mut clients = self.clients.lock().unwrap_or_else(|err| err.into_inner());
		let removed = evict_idle_locked(&mut clients, now);

		if removed > 0 {
			tracing::debug!(removed, "Idle rate limit clients evicted.");
		}

		removed
	}

	pub fn stats(&self) -> RateLimitStats {
		let clients = self.clients.lock().unwrap_or_else(|err| err.into_inner());

		RateLimitStats {
			tracked_clients: clients.len(),
			per_minute: self.policy.per_minute,
			per_hour: self.policy.per_hour,
			max_tracked_clients: self.policy.max_tracked_clients,
		}
	}

	// Scans the whole table, so a full table frees a tenth of its slots at once. The next scan
	// then waits for that many new clients.
	fn make_room(&self, clients: &mut HashMap<String, ClientWindows>, now: OffsetDateTime) {
		let Some(max) = self.policy.max_tracked_clients else {
			return;
		};

		if clients.len() < max {
			return;
		}

		evict_idle_locked(clients, now);

		if clients.len() < max {
			return;
		}

		let target = max.saturating_sub((max / 10).max(1));
		let excess = clients.len() - target;
		let Some(nth) = excess.checked_sub(1) else {
			return;
		};
		let mut by_age: Vec<(OffsetDateTime, &String)> =
			clients.iter().map(|(key, windows)| (windows.last_seen, key)).collect();

		by_age.select_nth_unstable(nth);

		let evicted: Vec<String> = by_age[..excess].iter().map(|(_, key)| (*key).clone()).collect();

		for key in &evicted {
			clients.remove(key);
		}

		tracing::warn!(
			evicted = evicted.len(),
			tracked = clients.len(),
			"Rate limit client table is full. Evicted the least recently seen clients."
		);
	}

	fn decision(
		&self,
		windows: &ClientWindows,
		denied: Option<RateWindow>,
		now: OffsetDateTime,
	) -> RateDecision {
		let used = u32::try_from(windows.minute.len()).unwrap_or(u32::MAX);

		RateDecision {
			allowed: denied.is_none(),
			window: denied,
			limit: self.policy.per_minute,
			remaining_minute: self.policy.per_minute.saturating_sub(used),
			reset_epoch: (now + RateWindow::Minute.length()).unix_timestamp(),
			retry_after_seconds: denied.map(|_| RETRY_AFTER_SECONDS),
		}
	}
}

fn prune_window(window: &mut VecDeque<OffsetDateTime>, cutoff: OffsetDateTime) {
	while window.front().is_some_and(|ts| *ts < cutoff) {
		window.pop_front();
	}
}

fn evict_idle_locked(clients: &mut HashMap<String, ClientWindows>, now: OffsetDateTime) -> usize {
	let before = clients.len();

	clients.retain(|_, windows| {
		windows.prune(now);

		!windows.hour.is_empty()
	});

	before - clients.len()
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	fn limiter(per_minute: u32, per_hour: u32, max_tracked_clients: Option<usize>) -> RateLimiter {
		RateLimiter::new(RateLimitPolicy { per_minute, per_hour, max_tracked_clients })
	}

	#[test]
	fn check_does_not_consume_quota() {
		let limiter = limiter(1, 10, None);
		let now = datetime!(2024-01-01 00:00:00 UTC);

		assert!(limiter.check("a", now).allowed);
		assert!(limiter.check("a", now).allowed);
		assert!(limiter.admit("a", now).allowed);
		assert!(!limiter.check("a", now).allowed);
	}

	#[test]
	fn record_then_check_matches_admit() {
		let limiter = limiter(2, 10, None);
		let now = datetime!(2024-01-01 00:00:00 UTC);

		limiter.record("a", now);
		limiter.record("a", now);

		let decision = limiter.check("a", now);

		assert!(!decision.allowed);
		assert_eq!(decision.window, Some(RateWindow::Minute));
		assert_eq!(decision.remaining_minute, 0);
	}

	#[test]
	fn timestamps_at_the_window_edge_still_count() {
		let limiter = limiter(1, 10, None);
		let t0 = datetime!(2024-01-01 00:00:00 UTC);

		assert!(limiter.admit("a", t0).allowed);
		assert!(!limiter.admit("a", t0 + Duration::seconds(60)).allowed);
		assert!(limiter.admit("a", t0 + Duration::seconds(61)).allowed);
	}

	#[test]
	fn idle_clients_are_evicted_after_an_hour() {
		let limiter = limiter(5, 10, None);
		let t0 = datetime!(2024-01-01 00:00:00 UTC);

		limiter.admit("a", t0);
		limiter.admit("b", t0 + Duration::minutes(30));

		assert_eq!(limiter.evict_idle(t0 + Duration::minutes(61)), 1);
		assert_eq!(limiter.stats().tracked_clients, 1);
	}

	#[test]
	fn full_table_drops_least_recently_seen_client() {
		let limiter = limiter(5, 10, Some(2));
		let t0 = datetime!(2024-01-01 00:00:00 UTC);

		limiter.admit("a", t0);
		limiter.admit("b", t0 + Duration::seconds(1));
		limiter.admit("a", t0 + Duration::seconds(2));
		limiter.admit("c", t0 + Duration::seconds(3));

		assert_eq!(limiter.stats().tracked_clients, 2);

		// "b" was forgotten, so its quota starts over.
		let decision = limiter.check("b", t0 + Duration::seconds(4));

		assert_eq!(decision.remaining_minute, 5);

		let decision = limiter.check("a", t0 + Duration::seconds(4));

		assert_eq!(decision.remaining_minute, 3);
	}

	#[test]
	fn full_table_evicts_in_batches() {
		let limiter = limiter(5, 10, Some(20));
		let t0 = datetime!(2024-01-01 00:00:00 UTC);

		for i in 0..20 {
			limiter.admit(&format!("client-{i}"), t0 + Duration::seconds(i));
		}

		limiter.admit("new-1", t0 + Duration::seconds(20));

		// The two oldest clients went, leaving room for the next newcomer without another scan.
		assert_eq!(limiter.stats().tracked_clients, 19);
		assert_eq!(limiter.check("client-0", t0 + Duration::seconds(21)).remaining_minute, 5);
		assert_eq!(limiter.check("client-1", t0 + Duration::seconds(21)).remaining_minute, 5);
		assert_eq!(limiter.check("client-2", t0 + Duration::seconds(21)).remaining_minute, 4);

		limiter.admit("new-2", t0 + Duration::seconds(21));

		assert_eq!(limiter.stats().tracked_clients, 20);
	}
}
