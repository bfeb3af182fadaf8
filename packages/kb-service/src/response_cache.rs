use std::{collections::HashMap, sync::Mutex};

use serde::Serialize;
use time::{Duration, OffsetDateTime};

const CACHE_KEY_PREFIX_LEN: usize = 12;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CacheStats {
	pub hits: u64,
	pub misses: u64,
	pub hit_rate_percent: f64,
	pub cache_size: usize,
}

#[derive(Clone, Debug)]
struct ResponseCacheEntry {
	value: String,
	stored_at: OffsetDateTime,
	ttl_seconds: u64,
}
impl ResponseCacheEntry {
	fn is_expired(&self, now: OffsetDateTime) -> bool {
		now - self.stored_at > Duration::seconds(self.ttl_seconds.min(i64::MAX as u64) as i64)
	}
}

#[derive(Default)]
struct Inner {
	entries: HashMap<String, ResponseCacheEntry>,
	hits: u64,
	misses: u64,
}

/// Query-keyed store of computed response text with per-entry expiry.
///
/// Keys are normalized by trimming and lowercasing, so `"  Hello "` and `"hello"` share an entry.
/// Expired entries are dropped lazily on lookup and in bulk by [`ResponseCache::clear_expired`].
pub struct ResponseCache {
	default_ttl_seconds: u64,
	inner: Mutex<Inner>,
}
impl ResponseCache {
	pub fn new(default_ttl_seconds: u64) -> Self {
		Self { default_ttl_seconds, inner: Mutex::new(Inner::default()) }
	}

	pub fn get(&self, query: &str) -> Option<String> {
		self.get_at(query, OffsetDateTime::now_utc())
	}

	pub fn get_at(&self, query: &str, now: OffsetDateTime) -> Option<String> {
		let key = cache_key(query);
		let mut guard = self.inner.lock().unwrap_or_else(|err| err.into_inner());
		let inner = &mut *guard;
		let expired = match inner.entries.get(&key) {
			Some(entry) if !entry.is_expired(now) => {
				let value = entry.value.clone();

				inner.hits += 1;

				tracing::debug!(cache_key_prefix = cache_key_prefix(&key), "Response cache hit.");

				return Some(value);
			},
			Some(_) => true,
			None => false,
		};

		if expired {
			inner.entries.remove(&key);
		}

		inner.misses += 1;

		tracing::debug!(cache_key_prefix = cache_key_prefix(&key), expired, "Response cache miss.");

		None
	}

	/// Stores `value`. A missing or zero `ttl_seconds` falls back to the default TTL.
	pub fn set(&self, query: &str, value: String, ttl_seconds: Option<u64>) {
		self.set_at(query, value, ttl_seconds, OffsetDateTime::now_utc());
	}

	pub fn set_at(
		&self,
		query: &str,
		value: String,
		ttl_seconds: Option<u64>,
		now: OffsetDateTime,
	) {
		let key = cache_key(query);
		let ttl_seconds = ttl_seconds.filter(|ttl| *ttl > 0).unwrap_or(self.default_ttl_seconds);
		let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());

		tracing::debug!(cache_key_prefix = cache_key_prefix(&key), ttl_seconds, "Response cached.");

		inner.entries.insert(key, ResponseCacheEntry { value, stored_at: now, ttl_seconds });
	}

	/// Drops every entry and resets the counters.
	pub fn clear(&self) {
		let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());
		let removed = inner.entries.len();

		*inner = Inner::default();

		tracing::info!(removed, "Response cache cleared.");
	}

	/// Removes expired entries and returns how many were removed.
	pub fn clear_expired(&self) -> usize {
		self.clear_expired_at(OffsetDateTime::now_utc())
	}

	pub fn clear_expired_at(&self, now: OffsetDateTime) -> usize {
		let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());
		let before = inner.entries.len();

		inner.entries.retain(|_, entry| !entry.is_expired(now));

		let removed = before - inner.entries.len();

		if removed > 0 {
			tracing::info!(removed, "Expired response cache entries removed.");
		}

		removed
	}

	pub fn stats(&self) -> CacheStats {
		let inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());
		let total = inner.hits + inner.misses;
		let hit_rate_percent = if total == 0 {
			0.0
		} else {
			((inner.hits as f64 / total as f64) * 10_000.0).round() / 100.0
		};

		CacheStats {
			hits: inner.hits,
			misses: inner.misses,
			hit_rate_percent,
			cache_size: inner.entries.len(),
		}
	}
}

pub fn cache_key(query: &str) -> String {
	let normalized = query.trim().to_lowercase();

	blake3::hash(normalized.as_bytes()).to_hex().to_string()
}

fn cache_key_prefix(key: &str) -> &str {
	key.get(..CACHE_KEY_PREFIX_LEN).unwrap_or(key)
}
